//! Stdio protocol server and parent-side client.
//!
//! `StdioServer` runs one agent session over newline-delimited JSON-RPC on
//! stdin/stdout. `StdioClient` is the other end: it spawns `taor serve`,
//! correlates responses by id and surfaces notifications as they arrive.

pub mod client;
mod lines;
pub mod server;
pub mod session_store;

pub use client::{ClientError, DEFAULT_REQUEST_TIMEOUT, StdioClient};
pub use server::{ProviderFactory, StdioServer};
pub use session_store::FileSessionStore;
