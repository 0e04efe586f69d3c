//! # rowsync client
//!
//! Client-side synchronization procedures for rowsync.
//!
//! A client keeps a full local relational database, serves application
//! transactions while offline, and reconciles with the central server
//! through [`push`], [`pull`] (which runs the merge engine) and
//! [`register`]. [`repair`] replaces the local store wholesale with a
//! server snapshot. [`synchronize`] drives the canonical loop: push, pull
//! on rejection, push again.
//!
//! The caller must serialize these procedures against ordinary application
//! transactions on the same store; concurrent local writers during a
//! push/pull lose or misattribute journal entries.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflicts;
mod error;
mod http;
mod pull;
mod push;
mod register;
mod repair;
mod status;
mod sync;
mod transport;

pub use conflicts::SwapStep;
pub use error::{ClientError, ClientResult, UniqueConflictEntry};
pub use http::{HttpClient, HttpResponse, HttpTransport, LoopbackClient, LoopbackServer};
pub use pull::{merge, pull, MergeReport};
pub use push::{push, PushReport};
pub use register::{is_registered, register, save_node, NodeState};
pub use repair::repair;
pub use status::unsynchronized_changes;
pub use sync::{synchronize, SyncOptions, SyncReport};
pub use transport::{MockTransport, Transport};
