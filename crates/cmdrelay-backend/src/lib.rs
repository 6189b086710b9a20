//! Restricted execution backend.
//!
//! Accepts one JSON request per TCP connection and answers with exactly one
//! JSON response: either the output of an allowlisted command or a bounded,
//! base64-encoded chunk of a file under the sandbox root.

#![deny(unsafe_code)]

pub mod dispatch;
pub mod exec;
pub mod file;
pub mod server;

pub use dispatch::{DispatchState, Dispatcher};
pub use exec::{CommandExecutor, CommandRejection};
pub use file::{FileChunkReader, PathRejection, Sandbox};
pub use server::{BackendServer, ServerError};
