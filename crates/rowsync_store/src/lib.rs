//! # rowsync store
//!
//! Relational store contract and reference implementation for rowsync.
//!
//! This crate pins down the storage interface the synchronization engine
//! relies on. Stores are **plain relational row stores** - they keep typed
//! rows keyed by integer primary key and know nothing about journals,
//! versions or merge semantics. The sync layers own all of that.
//!
//! ## Design Principles
//!
//! - Tables are described by a [`TableSpec`] (pk column, typed columns,
//!   foreign-key edges, unique constraints)
//! - All writes happen inside a closure-scoped transaction; returning an
//!   error rolls the transaction back wholesale
//! - Unique constraints are enforced by the store; foreign keys drive
//!   cascade deletion but parent existence is not checked
//! - Must be `Send + Sync`; one writer at a time, readers may run
//!   concurrently
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - in-memory store for tests, tools and ephemeral nodes

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod schema;
mod store;
mod value;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, MemoryTx};
pub use schema::{Column, ColumnType, ForeignKey, TableSpec, UniqueConstraint};
pub use store::{CascadeDelete, RelationalStore, StoreRead, StoreTx};
pub use value::{Row, Value};
