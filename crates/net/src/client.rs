//! Blocking client for the StrataKV wire protocol.

use std::collections::BTreeMap;
use std::net::{TcpStream, ToSocketAddrs};

use crate::{codec, Command, NetError, Response, Status};

/// A blocking connection to a StrataKV server. One request is in flight at a
/// time; responses are matched to requests by ordering.
pub struct Client {
    stream: TcpStream,
}

impl Client {
    /// Connects to a server.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, NetError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Inserts or updates a key. `None` deletes through the put path.
    pub fn put(&mut self, key: &str, value: Option<&[u8]>) -> Result<(), NetError> {
        let response = self.call(&Command::Put {
            key: key.to_string(),
            value: value.map(<[u8]>::to_vec),
        })?;
        expect_ok(response, "put")
    }

    /// Looks up a key; `Ok(None)` when absent or deleted.
    pub fn read(&mut self, key: &str) -> Result<Option<Vec<u8>>, NetError> {
        let response = self.call(&Command::Get {
            key: key.to_string(),
        })?;
        match response.status {
            Status::Ok => Ok(Some(response.payload.unwrap_or_default())),
            Status::NotFound => Ok(None),
            Status::Error => Err(NetError::Remote(response.message())),
        }
    }

    /// Inclusive range scan, returning a key-ordered map of live entries.
    pub fn read_range(
        &mut self,
        start: &str,
        end: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, NetError> {
        let response = self.call(&Command::ReadRange {
            start: start.to_string(),
            end: end.to_string(),
        })?;
        match response.status {
            Status::Ok => match response.payload {
                Some(payload) => codec::decode_entries(&payload),
                None => Ok(BTreeMap::new()),
            },
            Status::NotFound | Status::Error => Err(NetError::Remote(response.message())),
        }
    }

    /// Deletes a key.
    pub fn delete(&mut self, key: &str) -> Result<(), NetError> {
        let response = self.call(&Command::Delete {
            key: key.to_string(),
        })?;
        expect_ok(response, "delete")
    }

    /// Applies several puts in order; entries with a `None` value delete.
    pub fn batch_put(&mut self, pairs: &[(String, Option<Vec<u8>>)]) -> Result<(), NetError> {
        let response = self.call(&Command::BatchPut {
            pairs: pairs.to_vec(),
        })?;
        expect_ok(response, "batch put")
    }

    /// Round-trip health check.
    pub fn ping(&mut self) -> Result<(), NetError> {
        let response = self.call(&Command::Ping)?;
        expect_ok(response, "ping")
    }

    fn call(&mut self, command: &Command) -> Result<Response, NetError> {
        codec::write_command(&mut self.stream, command)?;
        codec::read_response(&mut self.stream)
    }
}

fn expect_ok(response: Response, operation: &str) -> Result<(), NetError> {
    match response.status {
        Status::Ok => Ok(()),
        Status::NotFound | Status::Error => {
            let message = response.message();
            if message.is_empty() {
                Err(NetError::Remote(format!("{operation} failed")))
            } else {
                Err(NetError::Remote(message))
            }
        }
    }
}
