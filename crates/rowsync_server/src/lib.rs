//! # rowsync server
//!
//! The trusted central authority of a rowsync deployment.
//!
//! The server services four procedures: `register` (node credentials),
//! `push` (validated, serialized, transactional application of client
//! operations with version assignment), `pull` (read-only message built
//! from the server journal) and `repair` (full snapshot). An optional
//! `query` endpoint serves application-defined remote reads.
//!
//! [`SyncServer`] exposes typed handlers plus a JSON dispatch layer
//! ([`SyncServer::dispatch_post`] / [`SyncServer::dispatch_get`]) that any
//! HTTP front end can mount; the HTTP listener itself is out of scope.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod handlers;
mod nodes;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::SyncServer;
