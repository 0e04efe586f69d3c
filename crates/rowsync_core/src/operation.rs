//! Journal operations and row identity.

use crate::version::VersionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a journal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// Row was inserted.
    #[serde(rename = "i")]
    Insert,
    /// Row was updated.
    #[serde(rename = "u")]
    Update,
    /// Row was deleted.
    #[serde(rename = "d")]
    Delete,
}

impl OpKind {
    /// One-letter wire code.
    pub fn code(&self) -> &'static str {
        match self {
            OpKind::Insert => "i",
            OpKind::Update => "u",
            OpKind::Delete => "d",
        }
    }

    /// Parses the one-letter wire code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "i" => Some(OpKind::Insert),
            "u" => Some(OpKind::Update),
            "d" => Some(OpKind::Delete),
            _ => None,
        }
    }

    /// Returns true for deletes.
    pub fn is_delete(&self) -> bool {
        matches!(self, OpKind::Delete)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Canonical identity of a tracked row: content type plus primary key.
///
/// A `Ref` names the same row on every node for the row's whole lifetime;
/// primary keys are integers, never reused and never meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ref {
    /// Content type id (the tracked table name).
    #[serde(rename = "type")]
    pub content_type: String,
    /// Primary key value.
    pub pk: i64,
}

impl Ref {
    /// Creates a reference.
    pub fn new(content_type: impl Into<String>, pk: i64) -> Self {
        Self {
            content_type: content_type.into(),
            pk,
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.content_type, self.pk)
    }
}

/// A journal entry.
///
/// `order` is the per-journal append index. `version` is absent on local
/// (not yet pushed) operations and carries the server-assigned version on
/// versioned ones. Row payloads are never stored here; they are fetched
/// from the store when a message is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Append index within the journal.
    pub order: i64,
    /// Operation kind.
    pub kind: OpKind,
    /// Content type of the affected row.
    #[serde(rename = "type")]
    pub content_type: String,
    /// Primary key of the affected row.
    #[serde(rename = "pk")]
    pub row_pk: i64,
    /// Server-assigned version, if versioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionId>,
}

impl Operation {
    /// Creates an unversioned operation.
    pub fn new(order: i64, kind: OpKind, content_type: impl Into<String>, row_pk: i64) -> Self {
        Self {
            order,
            kind,
            content_type: content_type.into(),
            row_pk,
            version: None,
        }
    }

    /// Returns the identity of the affected row.
    pub fn reference(&self) -> Ref {
        Ref::new(self.content_type.clone(), self.row_pk)
    }

    /// Returns a copy tagged with a version.
    pub fn with_version(mut self, version: VersionId) -> Self {
        self.version = Some(version);
        self
    }
}
