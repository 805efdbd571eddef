//! HTTP transport.
//!
//! Dispatcher calls are posted as signed JSON packets; upload chunks,
//! commits and aborts go to the uploader endpoint. Every request walks the
//! packet timeout ladder: one attempt per entry, each bounded by that
//! entry's timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use cumulus_protocol::constants::{
    CHECKSUM_HEADER, DEFAULT_PACKET_TIMEOUTS, DISPATCHER_PATH, SIGNATURE_HEADER, UPLOADER_PATH,
};
use cumulus_protocol::{
    ChunkAck, PrepareUserUploadRequest, PrepareUserUploadResponse, RequestPacket, ResponsePacket,
    ServerCall, ServerResponse, ServiceName, ServiceOperation, reason, status,
};
use cumulus_transfer::{RemoteError, ReplySender, Transport, TransportReply, TransportRequest};
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Signature of a dispatcher body: SHA-256 hex of `body` followed by `secret`.
pub fn sign(body: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Outcome of a single attempt.
enum Attempt {
    /// Worth another try on the next ladder step.
    Retry(String),
    Fatal(RemoteError),
}

/// reqwest-backed [`Transport`].
///
/// Cheap to clone; clones share the session, ladder and shutdown token.
#[derive(Clone)]
pub struct HttpTransport {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    server_url: String,
    app_id: String,
    secret: String,
    session_id: RwLock<String>,
    timeouts: RwLock<Vec<Duration>>,
    packet_id: AtomicU64,
    runtime: Handle,
    cancel: CancellationToken,
}

impl HttpTransport {
    /// Builds a transport that spawns its requests on the current tokio
    /// runtime.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let runtime = Handle::try_current()
            .map_err(|e| ClientError::Config(format!("no tokio runtime: {e}")))?;
        Self::with_runtime(config, runtime)
    }

    pub fn with_runtime(config: &ClientConfig, runtime: Handle) -> Result<Self, ClientError> {
        config.validate()?;
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                server_url: config.server_url.trim_end_matches('/').to_string(),
                app_id: config.app_id.clone(),
                secret: config.secret.clone(),
                session_id: RwLock::new(String::new()),
                timeouts: RwLock::new(config.packet_timeouts()),
                packet_id: AtomicU64::new(0),
                runtime,
                cancel: CancellationToken::new(),
            }),
        })
    }

    pub fn session_id(&self) -> String {
        self.inner
            .session_id
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn set_session_id(&self, session_id: &str) {
        if let Ok(mut guard) = self.inner.session_id.write() {
            *guard = session_id.to_string();
        }
    }

    /// Current retry ladder.
    pub fn packet_timeouts(&self) -> Vec<Duration> {
        self.inner
            .timeouts
            .read()
            .map(|t| t.clone())
            .unwrap_or_else(|_| DEFAULT_PACKET_TIMEOUTS.to_vec())
    }

    /// Replaces the retry ladder. An empty list restores the default.
    pub fn set_packet_timeouts(&self, timeouts: Vec<Duration>) {
        let timeouts = if timeouts.is_empty() {
            DEFAULT_PACKET_TIMEOUTS.to_vec()
        } else {
            timeouts
        };
        if let Ok(mut guard) = self.inner.timeouts.write() {
            *guard = timeouts;
        }
    }

    /// Fails every in-flight and future request with a network error.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Posts one call to the dispatcher and returns its response.
    ///
    /// Authentication calls get a single attempt on the first ladder step.
    pub async fn dispatch(&self, call: ServerCall) -> Result<ServerResponse, RemoteError> {
        let mut ladder = self.packet_timeouts();
        if call.service == ServiceName::Authentication {
            ladder.truncate(1);
        }
        let operation = call.operation;
        let packet = RequestPacket {
            packet_id: self.inner.packet_id.fetch_add(1, Ordering::Relaxed),
            session_id: self.session_id(),
            app_id: self.inner.app_id.clone(),
            messages: vec![call],
        };
        let body = serde_json::to_string(&packet).map_err(client_error)?;
        let signature = sign(&body, &self.inner.secret);
        let url = format!("{}{}", self.inner.server_url, DISPATCHER_PATH);

        debug!(
            operation = operation.as_str(),
            packet_id = packet.packet_id,
            "dispatching"
        );
        let text = self
            .send_with_ladder(&ladder, || {
                self.inner
                    .http
                    .post(&url)
                    .header(CONTENT_TYPE, "application/json")
                    .header(SIGNATURE_HEADER, &signature)
                    .body(body.clone())
            })
            .await?;

        let reply: ResponsePacket = serde_json::from_str(&text).map_err(client_error)?;
        reply
            .responses
            .into_iter()
            .next()
            .ok_or_else(|| client_error("empty response packet"))
    }

    /// Posts to the uploader endpoint and returns the parsed response and
    /// its raw body.
    async fn upload_action(
        &self,
        action: &str,
        token: &str,
        offset: Option<i64>,
        chunk: Option<(Vec<u8>, String)>,
    ) -> Result<(ServerResponse, String), RemoteError> {
        let ladder = self.packet_timeouts();
        let url = format!("{}{}", self.inner.server_url, UPLOADER_PATH);
        let mut query = vec![("action", action.to_string()), ("token", token.to_string())];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        let text = self
            .send_with_ladder(&ladder, || {
                let request = self.inner.http.post(&url).query(&query);
                match &chunk {
                    Some((data, checksum)) => request
                        .header(CONTENT_TYPE, "application/octet-stream")
                        .header(CHECKSUM_HEADER, checksum)
                        .body(data.clone()),
                    None => request,
                }
            })
            .await?;

        let response: ServerResponse = serde_json::from_str(&text).map_err(client_error)?;
        if !response.is_ok() {
            return Err(RemoteError::from_response(&response));
        }
        Ok((response, text))
    }

    /// Performs one upload engine request.
    async fn execute(&self, request: TransportRequest) -> Result<TransportReply, RemoteError> {
        match request {
            TransportRequest::BeginSession {
                cloud_path,
                cloud_filename,
                total_bytes,
                overwrite,
                shareable,
                local_path,
            } => {
                let payload = PrepareUserUploadRequest {
                    cloud_path,
                    cloud_filename,
                    shareable,
                    replace_if_exists: overwrite,
                    file_size: total_bytes,
                    local_path,
                };
                let call = ServerCall::new(ServiceOperation::PrepareUserUpload, &payload)
                    .map_err(client_error)?;
                let response = self.dispatch(call).await?;
                if !response.is_ok() {
                    return Err(RemoteError::from_response(&response));
                }
                let details = response
                    .parse_data::<PrepareUserUploadResponse>()
                    .map_err(client_error)?
                    .ok_or_else(|| client_error("prepare upload response has no data"))?
                    .file_details;
                let session_token = details
                    .upload_id
                    .ok_or_else(|| client_error("prepare upload response has no upload id"))?;
                Ok(TransportReply::SessionStarted {
                    session_token,
                    cloud_file_id: details.file_id.unwrap_or_default(),
                })
            }
            TransportRequest::SendChunk {
                session_token,
                offset,
                data,
                checksum,
            } => {
                let (response, _) = self
                    .upload_action("chunk", &session_token, Some(offset), Some((data, checksum)))
                    .await?;
                let ack = response
                    .parse_data::<ChunkAck>()
                    .map_err(client_error)?
                    .ok_or_else(|| client_error("chunk response has no ack"))?;
                Ok(TransportReply::ChunkAccepted {
                    ack_offset: ack.ack_offset,
                })
            }
            TransportRequest::FinalizeSession { session_token } => {
                let (_, body) = self
                    .upload_action("commit", &session_token, None, None)
                    .await?;
                Ok(TransportReply::Finalized {
                    response_body: body,
                })
            }
            TransportRequest::AbortSession { session_token } => {
                self.upload_action("abort", &session_token, None, None)
                    .await?;
                Ok(TransportReply::Aborted)
            }
        }
    }

    /// Runs `build` once per ladder step until an attempt succeeds or fails
    /// for good.
    async fn send_with_ladder<F>(
        &self,
        ladder: &[Duration],
        build: F,
    ) -> Result<String, RemoteError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        for (attempt, timeout) in ladder.iter().enumerate() {
            let outcome = tokio::select! {
                _ = self.inner.cancel.cancelled() => {
                    return Err(RemoteError::new(
                        status::CLIENT_NETWORK_ERROR,
                        reason::CLIENT_UPLOAD_FILE_UNKNOWN,
                        "transport shut down",
                    ));
                }
                result = tokio::time::timeout(*timeout, attempt_once(build())) => result,
            };

            let why = match outcome {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(Attempt::Fatal(err))) => return Err(err),
                Ok(Err(Attempt::Retry(why))) => why,
                Err(_) => format!("no response within {}ms", timeout.as_millis()),
            };
            warn!(
                attempt = attempt + 1,
                of = ladder.len(),
                reason = %why,
                "packet attempt failed"
            );
        }
        Err(RemoteError::network_timeout(format!(
            "no response after {} attempt(s)",
            ladder.len()
        )))
    }
}

async fn attempt_once(request: reqwest::RequestBuilder) -> Result<String, Attempt> {
    let resp = request.send().await.map_err(|e| {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            Attempt::Retry(e.to_string())
        } else {
            Attempt::Fatal(client_error(e))
        }
    })?;

    let code = resp.status();
    if matches!(code.as_u16(), 502..=504) {
        return Err(Attempt::Retry(format!("HTTP {code}")));
    }
    let text = resp
        .text()
        .await
        .map_err(|e| Attempt::Retry(e.to_string()))?;
    if !code.is_success() {
        return Err(Attempt::Fatal(RemoteError::new(
            i32::from(code.as_u16()),
            0,
            text,
        )));
    }
    trace!(status = code.as_u16(), bytes = text.len(), "response received");
    Ok(text)
}

/// Client-side failure that is not a timeout.
fn client_error(err: impl ToString) -> RemoteError {
    RemoteError::new(
        status::CLIENT_NETWORK_ERROR,
        reason::CLIENT_UPLOAD_FILE_UNKNOWN,
        err.to_string(),
    )
}

impl Transport for HttpTransport {
    fn submit(&self, request: TransportRequest, reply: ReplySender) {
        let transport = self.clone();
        self.inner.runtime.spawn(async move {
            let kind = request.kind();
            let result = transport.execute(request).await;
            if let Err(err) = &result {
                debug!(upload_id = reply.upload_id(), ?kind, error = %err, "transport request failed");
            }
            reply.send(result);
        });
    }
}
