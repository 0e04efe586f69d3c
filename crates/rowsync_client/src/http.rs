//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted behind [`HttpClient`] so different
//! libraries (or no network at all, via [`LoopbackClient`]) can carry the
//! protocol. Bodies are the JSON envelopes from `rowsync_core::messages`.

use crate::error::{ClientError, ClientResult};
use crate::transport::Transport;
use rowsync_core::messages::error_codes;
use rowsync_core::{
    ErrorBody, Payloads, PullMessage, PullRequest, PushMessage, PushReply, RegisterReply,
    SnapshotMessage,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A raw HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// A 200 response with a JSON body.
    pub fn json<T: Serialize>(value: &T) -> Self {
        Self::new(200, serde_json::to_vec(value).unwrap_or_default())
    }
}

/// HTTP client abstraction.
///
/// Implement this over the HTTP library of your choice. Transport-level
/// failures (connection refused, timeouts) are reported as `Err`; HTTP
/// error statuses are regular responses.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with a JSON body.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;

    /// Sends a GET request.
    fn get(&self, url: &str) -> Result<HttpResponse, String>;
}

/// HTTP-based transport speaking the canonical endpoints.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport against a base URL (empty for loopback use).
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post_json<Req: Serialize, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: &Req,
    ) -> ClientResult<Res> {
        let body = serde_json::to_vec(request)
            .map_err(|e| ClientError::Protocol(format!("failed to encode request: {e}")))?;
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url, body)
            .map_err(ClientError::transport_retryable)?;
        decode_response(response)
    }

    fn get_json<Res: DeserializeOwned>(&self, endpoint: &str) -> ClientResult<Res> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .map_err(ClientError::transport_retryable)?;
        decode_response(response)
    }
}

fn decode_response<Res: DeserializeOwned>(response: HttpResponse) -> ClientResult<Res> {
    if response.status / 100 == 2 {
        return serde_json::from_slice(&response.body)
            .map_err(|e| ClientError::Protocol(format!("failed to decode response: {e}")));
    }
    Err(map_error_body(response))
}

/// Maps a non-2xx response onto the typed error taxonomy.
fn map_error_body(response: HttpResponse) -> ClientError {
    let Ok(body) = serde_json::from_slice::<ErrorBody>(&response.body) else {
        return ClientError::Server(format!("http status {}", response.status));
    };
    let detail = body.detail().unwrap_or("").to_string();
    match body.code() {
        Some(error_codes::PUSH_REJECTED) => ClientError::PushRejected { detail },
        Some(error_codes::AUTH_FAILED) => ClientError::Auth(detail),
        Some(code) => ClientError::Server(format!("{code}: {detail}")),
        None => ClientError::Server(format!("http status {}", response.status)),
    }
}

impl<C: HttpClient> Transport for HttpTransport<C> {
    fn register(&self, extra_data: Option<serde_json::Value>) -> ClientResult<RegisterReply> {
        let body = match extra_data {
            Some(extra) => serde_json::json!({ "extra_data": extra }),
            None => serde_json::json!({}),
        };
        self.post_json("/register", &body)
    }

    fn push(&self, message: &PushMessage) -> ClientResult<PushReply> {
        self.post_json("/push", message)
    }

    fn pull(&self, request: &PullRequest) -> ClientResult<PullMessage> {
        self.post_json("/pull", request)
    }

    fn repair(&self) -> ClientResult<SnapshotMessage> {
        self.get_json("/repair")
    }

    fn query(&self, content_type: &str) -> ClientResult<Payloads> {
        self.get_json(&format!("/query?type={content_type}"))
    }
}

/// A server that can answer loopback requests in-process.
pub trait LoopbackServer {
    /// Handles a POST request.
    fn handle_post(&self, path: &str, body: &[u8]) -> HttpResponse;

    /// Handles a GET request.
    fn handle_get(&self, path: &str) -> HttpResponse;
}

/// An [`HttpClient`] that routes requests straight into a
/// [`LoopbackServer`]. Pair with `HttpTransport::new("", client)` so the
/// URLs are bare endpoint paths.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a loopback client for the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        Ok(self.server.handle_post(url, &body))
    }

    fn get(&self, url: &str) -> Result<HttpResponse, String> {
        Ok(self.server.handle_get(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedServer {
        status: u16,
        body: Vec<u8>,
    }

    impl LoopbackServer for CannedServer {
        fn handle_post(&self, _path: &str, _body: &[u8]) -> HttpResponse {
            HttpResponse::new(self.status, self.body.clone())
        }

        fn handle_get(&self, _path: &str) -> HttpResponse {
            HttpResponse::new(self.status, self.body.clone())
        }
    }

    fn transport(status: u16, body: Vec<u8>) -> HttpTransport<LoopbackClient<CannedServer>> {
        HttpTransport::new("", LoopbackClient::new(CannedServer { status, body }))
    }

    #[test]
    fn register_decodes_reply() {
        let reply = RegisterReply {
            node_id: 7,
            secret: "s".into(),
        };
        let transport = transport(200, serde_json::to_vec(&reply).unwrap());
        assert_eq!(transport.register(None).unwrap(), reply);
    }

    #[test]
    fn push_rejection_maps_to_typed_error() {
        let body = ErrorBody::new(error_codes::PUSH_REJECTED, "client at 0, server at 3");
        let transport = transport(400, serde_json::to_vec(&body).unwrap());

        let message = PushMessage {
            node_id: 1,
            last_known_version: 0,
            operations: vec![],
            payloads: Payloads::new(),
            signature: None,
            extra_data: None,
        };
        match transport.push(&message) {
            Err(ClientError::PushRejected { detail }) => {
                assert!(detail.contains("server at 3"));
            }
            other => panic!("expected PushRejected, got {:?}", other.map(|r| r.latest_version)),
        }
    }

    #[test]
    fn auth_failure_maps_to_typed_error() {
        let body = ErrorBody::new(error_codes::AUTH_FAILED, "bad signature");
        let transport = transport(400, serde_json::to_vec(&body).unwrap());
        assert!(matches!(
            transport.pull(&PullRequest {
                node_id: 1,
                last_known_version: 0,
                extra_data: None,
            }),
            Err(ClientError::Auth(_))
        ));
    }

    #[test]
    fn garbage_error_body_degrades_to_server_error() {
        let transport = transport(500, b"oops".to_vec());
        assert!(matches!(
            transport.repair(),
            Err(ClientError::Server(_))
        ));
    }
}
