//! Protocol messages.
//!
//! The wire format is a self-contained JSON envelope. Operations travel as
//! an ordered array of `{order, kind, type, pk, version?}`; row payloads as
//! `{type: {pk: {column: value}}}`. The signing input is the canonical
//! UTF-8 encoding of `{last_known_version, node_id, operations, payloads}` -
//! `serde_json` maps are key-sorted, which makes the encoding canonical.

use crate::error::CoreResult;
use crate::operation::{Operation, Ref};
use crate::sign;
use crate::version::VersionId;
use rowsync_store::Row;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Row payloads carried by a message, keyed by content type then primary
/// key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payloads(BTreeMap<String, BTreeMap<i64, Row>>);

impl Payloads {
    /// Creates an empty payload map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches the payload for a row, if present.
    pub fn get(&self, reference: &Ref) -> Option<&Row> {
        self.0
            .get(&reference.content_type)
            .and_then(|rows| rows.get(&reference.pk))
    }

    /// Returns true if a payload for the row is present.
    pub fn contains(&self, reference: &Ref) -> bool {
        self.get(reference).is_some()
    }

    /// Adds (or replaces) the payload for a row.
    pub fn insert(&mut self, reference: Ref, row: Row) {
        self.0
            .entry(reference.content_type)
            .or_default()
            .insert(reference.pk, row);
    }

    /// Iterates over all payloads as `(Ref, &Row)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Ref, &Row)> {
        self.0.iter().flat_map(|(content_type, rows)| {
            rows.iter()
                .map(move |(pk, row)| (Ref::new(content_type.clone(), *pk), row))
        })
    }

    /// Iterates over the payload rows of one content type.
    pub fn rows_of(&self, content_type: &str) -> impl Iterator<Item = (i64, &Row)> {
        self.0
            .get(content_type)
            .into_iter()
            .flat_map(|rows| rows.iter().map(|(pk, row)| (*pk, row)))
    }

    /// Total number of payload rows.
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    /// Returns true if no payloads are present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A push envelope: the client's unversioned operations plus the row
/// payloads needed to replay its inserts and updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    /// The pushing node.
    pub node_id: i64,
    /// The client's last known server version.
    pub last_known_version: VersionId,
    /// Compressed unversioned operations, in journal order.
    pub operations: Vec<Operation>,
    /// Row payloads for the insert/update operations.
    pub payloads: Payloads,
    /// HMAC signature over the canonical bytes, base64.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Application-defined extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<serde_json::Value>,
}

impl PushMessage {
    /// The canonical byte form the signature covers: key-sorted JSON of
    /// `{last_known_version, node_id, operations, payloads}`.
    pub fn canonical_bytes(&self) -> CoreResult<Vec<u8>> {
        let mut canonical = serde_json::Map::new();
        canonical.insert(
            "last_known_version".into(),
            serde_json::to_value(self.last_known_version)?,
        );
        canonical.insert("node_id".into(), serde_json::to_value(self.node_id)?);
        canonical.insert(
            "operations".into(),
            serde_json::to_value(&self.operations)?,
        );
        canonical.insert("payloads".into(), serde_json::to_value(&self.payloads)?);
        Ok(serde_json::to_vec(&serde_json::Value::Object(canonical))?)
    }

    /// Signs the envelope with the node secret.
    pub fn sign(&mut self, secret: &str) -> CoreResult<()> {
        let bytes = self.canonical_bytes()?;
        self.signature = Some(sign::sign(secret, &bytes));
        Ok(())
    }

    /// Verifies the envelope signature against the node secret.
    pub fn verify(&self, secret: &str) -> CoreResult<bool> {
        let Some(ref signature) = self.signature else {
            return Ok(false);
        };
        let bytes = self.canonical_bytes()?;
        Ok(sign::verify(secret, &bytes, signature))
    }
}

/// Reply to an accepted push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReply {
    /// The version assigned to the accepted push.
    pub latest_version: VersionId,
}

/// A pull request: the client advertises its position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// The pulling node.
    pub node_id: i64,
    /// The client's last known server version.
    pub last_known_version: VersionId,
    /// Application-defined extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<serde_json::Value>,
}

/// A pull envelope: everything the client merge needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullMessage {
    /// The server's latest version at build time.
    pub latest_version: VersionId,
    /// Compressed operations newer than the client's position, in
    /// ascending version order.
    pub operations: Vec<Operation>,
    /// Row payloads for the operations, plus parent rows the merge may
    /// need for conflict resolution.
    pub payloads: Payloads,
    /// Identities of payload rows included only as parents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included_parents: Vec<Ref>,
}

/// A full snapshot of the server's tracked tables, used by `repair`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMessage {
    /// The server's latest version at snapshot time.
    pub latest_version: VersionId,
    /// Every row of every tracked table.
    pub payloads: Payloads,
}

/// Reply to a registration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterReply {
    /// Server-issued node id.
    pub node_id: i64,
    /// Shared secret for push signing.
    pub secret: String,
}

/// Wire error codes.
pub mod error_codes {
    /// Push rejected: the client is behind the server.
    pub const PUSH_REJECTED: &str = "push_rejected";
    /// Signature mismatch or unknown node.
    pub const AUTH_FAILED: &str = "auth_failed";
    /// Push commit failed on a constraint.
    pub const INTEGRITY: &str = "integrity";
    /// Malformed request.
    pub const INVALID_REQUEST: &str = "invalid_request";
    /// Internal server failure.
    pub const INTERNAL: &str = "internal";
}

/// Error body returned by the server: a code followed by details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// `[code, detail...]`.
    pub error: Vec<String>,
}

impl ErrorBody {
    /// Creates an error body from a code and detail.
    pub fn new(code: &str, detail: impl Into<String>) -> Self {
        Self {
            error: vec![code.to_string(), detail.into()],
        }
    }

    /// The error code, if present.
    pub fn code(&self) -> Option<&str> {
        self.error.first().map(String::as_str)
    }

    /// The detail message, if present.
    pub fn detail(&self) -> Option<&str> {
        self.error.get(1).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OpKind;
    use rowsync_store::Value;

    fn city_row(pk: i64, name: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), Value::Integer(pk));
        row.insert("name".into(), Value::Text(name.to_string()));
        row
    }

    fn push_message() -> PushMessage {
        let mut payloads = Payloads::new();
        payloads.insert(Ref::new("city", 1), city_row(1, "A"));
        PushMessage {
            node_id: 4,
            last_known_version: 0,
            operations: vec![Operation::new(1, OpKind::Insert, "city", 1)],
            payloads,
            signature: None,
            extra_data: None,
        }
    }

    #[test]
    fn payload_lookup() {
        let mut payloads = Payloads::new();
        payloads.insert(Ref::new("city", 1), city_row(1, "A"));
        payloads.insert(Ref::new("city", 2), city_row(2, "B"));

        assert!(payloads.contains(&Ref::new("city", 1)));
        assert!(!payloads.contains(&Ref::new("city", 3)));
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads.rows_of("city").count(), 2);
    }

    #[test]
    fn push_roundtrip_preserves_wire_shape() {
        let message = push_message();
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["payloads"]["city"]["1"]["name"], "A");
        assert_eq!(json["operations"][0]["kind"], "i");
        assert!(json.get("signature").is_none());

        let back: PushMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn canonical_bytes_are_stable_and_key_sorted() {
        let message = push_message();
        let bytes = message.canonical_bytes().unwrap();
        assert_eq!(bytes, message.canonical_bytes().unwrap());

        let text = String::from_utf8(bytes).unwrap();
        let last = text.find("last_known_version").unwrap();
        let node = text.find("node_id").unwrap();
        let ops = text.find("operations").unwrap();
        let payloads = text.find("payloads").unwrap();
        assert!(last < node && node < ops && ops < payloads);
    }

    #[test]
    fn signature_covers_content() {
        let mut message = push_message();
        message.sign("secret").unwrap();
        assert!(message.verify("secret").unwrap());
        assert!(!message.verify("other").unwrap());

        message.last_known_version = 9;
        assert!(!message.verify("secret").unwrap());
    }

    #[test]
    fn signature_ignores_extra_data() {
        let mut message = push_message();
        message.sign("secret").unwrap();
        message.extra_data = Some(serde_json::json!({"user": "u"}));
        assert!(message.verify("secret").unwrap());
    }

    #[test]
    fn error_body_accessors() {
        let body = ErrorBody::new(error_codes::PUSH_REJECTED, "behind");
        assert_eq!(body.code(), Some("push_rejected"));
        assert_eq!(body.detail(), Some("behind"));
    }

    #[test]
    fn pull_message_defaults() {
        let json = serde_json::json!({
            "latest_version": 2,
            "operations": [],
            "payloads": {},
        });
        let message: PullMessage = serde_json::from_value(json).unwrap();
        assert!(message.included_parents.is_empty());
    }
}
