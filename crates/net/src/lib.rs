//! # Net — TCP transport for StrataKV
//!
//! Adapts the synchronous [`engine::Engine`] contract to a wire protocol:
//! a length-prefixed binary codec, a worker-pool TCP server, and a blocking
//! client.
//!
//! ## Wire Format
//!
//! ### Request
//! ```text
//! ┌──────────┬───────────────┬─────────────────────────┐
//! │ Op (1)   │ Len (4, BE)   │        Payload          │
//! └──────────┴───────────────┴─────────────────────────┘
//! ```
//!
//! ### Payload by operation
//! - `GET` / `DELETE`: `key_len (4) + key`
//! - `PUT`:            `key_len (4) + key + present (1) [+ value]`
//! - `READ_RANGE`:     `start_len (4) + start + end`
//! - `BATCH_PUT`:      `count (4)` then per pair
//!                     `key_len (4) + key + present (1) [+ val_len (4) + val]`
//! - `PING`:           empty
//!
//! ### Response
//! ```text
//! ┌──────────┬───────────────┬─────────────────────────┐
//! │Status (1)│ Len (4, BE)   │        Payload          │
//! └──────────┴───────────────┴─────────────────────────┘
//! ```
//!
//! Payload is the value bytes for `GET`, an encoded entry list for
//! `READ_RANGE`, an error message for `Error`, and empty otherwise.

mod client;
mod codec;
mod command;
mod connection;
mod server;

pub use client::Client;
pub use codec::{
    decode_command, decode_response, encode_command, encode_response, read_command,
    read_response, write_command, write_response, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use command::{Command, Opcode, Response, Status};
pub use server::{Server, ServerConfig, ShutdownHandle};

use std::io;
use thiserror::Error;

/// Errors produced by the transport layer.
#[derive(Debug, Error)]
pub enum NetError {
    /// An underlying socket or I/O failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A malformed or oversized frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server reported a failure for the request.
    #[error("{0}")]
    Remote(String),
}
