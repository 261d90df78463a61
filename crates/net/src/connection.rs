//! Per-connection command loop.

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use engine::Engine;

use crate::{codec, Command, NetError, Response};

/// Handles a single client connection: read a command, run it against the
/// engine, write the response, repeat until the peer disconnects.
pub(crate) struct Connection {
    stream: TcpStream,
    engine: Arc<Engine>,
    peer: SocketAddr,
}

impl Connection {
    pub(crate) fn new(stream: TcpStream, engine: Arc<Engine>) -> Result<Self, NetError> {
        let peer = stream.peer_addr()?;
        Ok(Self {
            stream,
            engine,
            peer,
        })
    }

    pub(crate) fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Runs the command loop until EOF or an unrecoverable stream error.
    pub(crate) fn handle(&mut self) -> Result<(), NetError> {
        loop {
            let command = match codec::read_command(&mut self.stream) {
                Ok(command) => command,
                Err(NetError::Io(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    tracing::debug!(peer = %self.peer, "client disconnected");
                    return Ok(());
                }
                Err(NetError::Protocol(msg)) => {
                    // a malformed frame leaves the stream unsynchronized
                    tracing::warn!(peer = %self.peer, %msg, "protocol error, dropping connection");
                    let _ = codec::write_response(&mut self.stream, &Response::error(msg));
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            tracing::debug!(peer = %self.peer, ?command, "received command");
            let response = dispatch(&self.engine, command);
            codec::write_response(&mut self.stream, &response)?;
        }
    }
}

/// Maps one command onto the engine's synchronous API.
pub(crate) fn dispatch(engine: &Engine, command: Command) -> Response {
    match command {
        Command::Get { key } => match engine.read(&key) {
            Ok(Some(value)) => Response::ok_with(value),
            Ok(None) => Response::not_found(),
            Err(e) => Response::error(e.to_string()),
        },
        Command::Put { key, value } => {
            match engine.put(&key, value.as_deref()) {
                Ok(()) => Response::ok(),
                Err(e) => Response::error(e.to_string()),
            }
        }
        Command::Delete { key } => match engine.delete(&key) {
            Ok(()) => Response::ok(),
            Err(e) => Response::error(e.to_string()),
        },
        Command::ReadRange { start, end } => match engine.read_range(&start, &end) {
            Ok(entries) => Response::ok_with(codec::encode_entries(&entries)),
            Err(e) => Response::error(e.to_string()),
        },
        Command::BatchPut { pairs } => {
            let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
            let values: Vec<Option<&[u8]>> = pairs.iter().map(|(_, v)| v.as_deref()).collect();
            match engine.batch_put(&keys, &values) {
                Ok(()) => Response::ok(),
                Err(e) => Response::error(e.to_string()),
            }
        }
        Command::Ping => Response::ok(),
    }
}
