//! Purpose: Define the public Rust API boundary for the decoder service.
//! Exports: Decoding entry points, error types, history store, remote client.
//! Role: Single import path for the CLI, server, and integration tests.
//! Invariants: Core decoding stays I/O-free; persistence and HTTP live here.

mod history;
mod remote;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::decoder::{Normalized, decode, decode_normalized, normalize};
pub use crate::core::error::{Error, ErrorKind};
pub use history::{DEFAULT_HISTORY_LIMIT, HistoryEntry, HistoryStore};
pub use remote::{RemoteClient, RemoteHealth, RemoteHistory};
