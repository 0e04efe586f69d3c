//! The sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handlers;
use parking_lot::Mutex;
use rowsync_core::{
    version, Context, Payloads, PullMessage, PullRequest, PushMessage, PushReply, RegisterReply,
    SnapshotMessage, VersionId,
};
use rowsync_store::RelationalStore;

/// The sync server.
///
/// Owns a server-role [`Context`] and serializes pushes over a global
/// lock so version assignment stays monotonic; pulls run concurrently on
/// read views. The JSON dispatch layer maps the canonical endpoints onto
/// the typed handlers so any HTTP front end (or an in-process loopback)
/// can mount it.
pub struct SyncServer<S: RelationalStore> {
    ctx: Context<S>,
    config: ServerConfig,
    push_lock: Mutex<()>,
}

impl<S: RelationalStore> SyncServer<S> {
    /// Creates a server with default configuration.
    pub fn new(ctx: Context<S>) -> Self {
        Self::with_config(ctx, ServerConfig::default())
    }

    /// Creates a server with the given configuration.
    pub fn with_config(ctx: Context<S>, config: ServerConfig) -> Self {
        Self {
            ctx,
            config,
            push_lock: Mutex::new(()),
        }
    }

    /// The server's context (registry, store, tracked transactions).
    pub fn context(&self) -> &Context<S> {
        &self.ctx
    }

    /// The server's latest version.
    pub fn latest_version(&self) -> ServerResult<VersionId> {
        self.ctx.with_read(|view| Ok(version::latest(view)?))
    }

    /// Issues fresh node credentials.
    pub fn handle_register(&self) -> ServerResult<RegisterReply> {
        handlers::handle_register(&self.ctx, &self.config)
    }

    /// Validates and applies a push. Serialized over the push lock.
    pub fn handle_push(&self, message: &PushMessage) -> ServerResult<PushReply> {
        let _serialized = self.push_lock.lock();
        handlers::handle_push(&self.ctx, &self.config, message)
    }

    /// Builds a pull message. Read-only and idempotent.
    pub fn handle_pull(&self, request: &PullRequest) -> ServerResult<PullMessage> {
        handlers::handle_pull(&self.ctx, request)
    }

    /// Builds a full snapshot for repair.
    pub fn handle_repair(&self) -> ServerResult<SnapshotMessage> {
        handlers::handle_repair(&self.ctx)
    }

    /// Application-defined remote read of one content type.
    pub fn handle_query(&self, content_type: &str) -> ServerResult<Payloads> {
        handlers::handle_query(&self.ctx, content_type)
    }

    /// Dispatches a POST request body to the matching handler, returning
    /// `(status, JSON body)`.
    pub fn dispatch_post(&self, path: &str, body: &[u8]) -> (u16, Vec<u8>) {
        match path {
            "/register" => respond(self.handle_register()),
            "/push" => match serde_json::from_slice::<PushMessage>(body) {
                Ok(message) => respond(self.handle_push(&message)),
                Err(e) => bad_request(e),
            },
            "/pull" => match serde_json::from_slice::<PullRequest>(body) {
                Ok(request) => respond(self.handle_pull(&request)),
                Err(e) => bad_request(e),
            },
            _ => not_found(path),
        }
    }

    /// Dispatches a GET request to the matching handler.
    pub fn dispatch_get(&self, path: &str) -> (u16, Vec<u8>) {
        match path {
            "/repair" => respond(self.handle_repair()),
            _ => match path.strip_prefix("/query?type=") {
                Some(content_type) => respond(self.handle_query(content_type)),
                None => not_found(path),
            },
        }
    }
}

fn respond<T: serde::Serialize>(result: ServerResult<T>) -> (u16, Vec<u8>) {
    match result {
        Ok(value) => (200, serde_json::to_vec(&value).unwrap_or_default()),
        Err(err) => (
            err.status(),
            serde_json::to_vec(&err.to_body()).unwrap_or_default(),
        ),
    }
}

fn bad_request(err: serde_json::Error) -> (u16, Vec<u8>) {
    let err = ServerError::InvalidRequest(err.to_string());
    (err.status(), serde_json::to_vec(&err.to_body()).unwrap_or_default())
}

fn not_found(path: &str) -> (u16, Vec<u8>) {
    let err = ServerError::InvalidRequest(format!("no such endpoint: {path}"));
    (404, serde_json::to_vec(&err.to_body()).unwrap_or_default())
}
