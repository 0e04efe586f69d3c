//! # rowsync testkit
//!
//! Shared fixtures for rowsync tests: a small standard schema (cities and
//! people, with a foreign key and a unique constraint) and context
//! builders for both roles.

#![deny(unsafe_code)]

mod fixtures;

pub use fixtures::{
    city_row, client_context, person_row, server_context, standard_registry,
};
