//! # rowsync core
//!
//! Core synchronization model for rowsync.
//!
//! This crate provides:
//! - The tracking [`Registry`] of content types
//! - The operations [`journal`] and version ledger persisted in the store
//! - [`Context`] with transparent DML capture into the journal
//! - The [`compression`] grammars for per-row operation sequences
//! - Protocol [`messages`] with the canonical JSON envelope and HMAC signing
//!
//! The relational store itself is an external collaborator; its contract
//! lives in `rowsync_store`. Push/pull/merge flows live in `rowsync_client`
//! and `rowsync_server`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod compression;
mod context;
mod error;
pub mod journal;
pub mod messages;
mod operation;
mod registry;
pub mod sign;
pub mod version;

pub use compression::Advisory;
pub use context::{Context, Role, TrackedTx, NODES_TABLE};
pub use error::{CoreError, CoreResult};
pub use messages::{
    ErrorBody, Payloads, PullMessage, PullRequest, PushMessage, PushReply, RegisterReply,
    SnapshotMessage,
};
pub use operation::{OpKind, Operation, Ref};
pub use registry::Registry;
pub use version::{Version, VersionId};
