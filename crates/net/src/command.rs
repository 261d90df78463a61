//! Request and response types carried over the wire.

/// Operation codes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x01,
    Put = 0x02,
    Delete = 0x03,
    ReadRange = 0x04,
    BatchPut = 0x05,
    Ping = 0x06,
}

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Look up a key.
    Get { key: String },

    /// Insert or update a key. `value: None` deletes through the put path.
    Put { key: String, value: Option<Vec<u8>> },

    /// Delete a key.
    Delete { key: String },

    /// Inclusive range scan.
    ReadRange { start: String, end: String },

    /// Apply several puts in order under one engine write lock.
    BatchPut { pairs: Vec<(String, Option<Vec<u8>>)> },

    /// Health check.
    Ping,
}

impl Command {
    /// The opcode this command serializes under.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Get { .. } => Opcode::Get,
            Command::Put { .. } => Opcode::Put,
            Command::Delete { .. } => Opcode::Delete,
            Command::ReadRange { .. } => Opcode::ReadRange,
            Command::BatchPut { .. } => Opcode::BatchPut,
            Command::Ping => Opcode::Ping,
        }
    }
}

/// Response status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    NotFound = 0x01,
    Error = 0x02,
}

/// A server response: a status plus an optional payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub payload: Option<Vec<u8>>,
}

impl Response {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            payload: None,
        }
    }

    #[must_use]
    pub fn ok_with(payload: Vec<u8>) -> Self {
        Self {
            status: Status::Ok,
            payload: Some(payload),
        }
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            payload: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            payload: Some(message.into().into_bytes()),
        }
    }

    /// The error message carried by an `Error` response.
    #[must_use]
    pub fn message(&self) -> String {
        self.payload
            .as_deref()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default()
    }
}
