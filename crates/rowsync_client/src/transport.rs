//! Transport abstraction for the client.

use crate::error::{ClientError, ClientResult};
use parking_lot::RwLock;
use rowsync_core::{
    Payloads, PullMessage, PullRequest, PushMessage, PushReply, RegisterReply, SnapshotMessage,
};

/// Transport used by the client procedures.
///
/// Implement this to carry the protocol over a concrete channel. The
/// bundled [`crate::HttpTransport`] maps it onto the HTTP endpoints;
/// [`MockTransport`] serves tests.
pub trait Transport {
    /// Requests a node registration.
    fn register(&self, extra_data: Option<serde_json::Value>) -> ClientResult<RegisterReply>;

    /// Pushes a signed message; returns the newly assigned version.
    fn push(&self, message: &PushMessage) -> ClientResult<PushReply>;

    /// Pulls everything newer than the advertised version.
    fn pull(&self, request: &PullRequest) -> ClientResult<PullMessage>;

    /// Fetches a full snapshot for repair.
    fn repair(&self) -> ClientResult<SnapshotMessage>;

    /// Application-defined remote read of one content type.
    fn query(&self, content_type: &str) -> ClientResult<Payloads>;
}

/// A transport with canned responses, for tests.
#[derive(Default)]
pub struct MockTransport {
    register_reply: RwLock<Option<RegisterReply>>,
    push_reply: RwLock<Option<ClientResult<PushReply>>>,
    pull_reply: RwLock<Option<PullMessage>>,
    repair_reply: RwLock<Option<SnapshotMessage>>,
    pushed: RwLock<Vec<PushMessage>>,
    pulled: RwLock<Vec<PullRequest>>,
}

impl MockTransport {
    /// Creates a mock with no canned responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the registration reply.
    pub fn set_register_reply(&self, reply: RegisterReply) {
        *self.register_reply.write() = Some(reply);
    }

    /// Sets the push reply (or error).
    pub fn set_push_reply(&self, reply: ClientResult<PushReply>) {
        *self.push_reply.write() = Some(reply);
    }

    /// Sets the pull reply.
    pub fn set_pull_reply(&self, reply: PullMessage) {
        *self.pull_reply.write() = Some(reply);
    }

    /// Sets the repair reply.
    pub fn set_repair_reply(&self, reply: SnapshotMessage) {
        *self.repair_reply.write() = Some(reply);
    }

    /// Messages pushed so far.
    pub fn pushed(&self) -> Vec<PushMessage> {
        self.pushed.read().clone()
    }

    /// Pull requests issued so far.
    pub fn pulled(&self) -> Vec<PullRequest> {
        self.pulled.read().clone()
    }
}

impl Transport for MockTransport {
    fn register(&self, _extra_data: Option<serde_json::Value>) -> ClientResult<RegisterReply> {
        self.register_reply
            .read()
            .clone()
            .ok_or_else(|| ClientError::transport_retryable("no register reply set"))
    }

    fn push(&self, message: &PushMessage) -> ClientResult<PushReply> {
        self.pushed.write().push(message.clone());
        match &*self.push_reply.read() {
            Some(Ok(reply)) => Ok(*reply),
            Some(Err(err)) => Err(clone_error(err)),
            None => Err(ClientError::transport_retryable("no push reply set")),
        }
    }

    fn pull(&self, request: &PullRequest) -> ClientResult<PullMessage> {
        self.pulled.write().push(request.clone());
        self.pull_reply
            .read()
            .clone()
            .ok_or_else(|| ClientError::transport_retryable("no pull reply set"))
    }

    fn repair(&self) -> ClientResult<SnapshotMessage> {
        self.repair_reply
            .read()
            .clone()
            .ok_or_else(|| ClientError::transport_retryable("no repair reply set"))
    }

    fn query(&self, _content_type: &str) -> ClientResult<Payloads> {
        Ok(Payloads::new())
    }
}

/// Clones the mock's canned error shallowly (mock-only; errors carrying
/// sources are reduced to their message).
fn clone_error(err: &ClientError) -> ClientError {
    match err {
        ClientError::PushRejected { detail } => ClientError::PushRejected {
            detail: detail.clone(),
        },
        ClientError::Auth(message) => ClientError::Auth(message.clone()),
        ClientError::Transport { message, retryable } => ClientError::Transport {
            message: message.clone(),
            retryable: *retryable,
        },
        other => ClientError::Server(other.to_string()),
    }
}
