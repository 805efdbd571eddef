//! Boundary between the upload engine and the network.
//!
//! A [`Transport`] accepts requests without blocking and answers each one
//! exactly once through its [`ReplySender`], from whatever thread or task
//! finishes the I/O. Replies are queued in the engine's inbox and applied
//! on the next update tick.

use cumulus_protocol::{ServerResponse, reason, status};
use tokio::sync::mpsc;
use tracing::trace;

/// Request issued by the engine for one upload.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportRequest {
    /// Opens a server-side session for a new upload.
    BeginSession {
        cloud_path: String,
        cloud_filename: String,
        total_bytes: i64,
        overwrite: bool,
        shareable: bool,
        local_path: String,
    },
    /// Sends the chunk starting at `offset`.
    SendChunk {
        session_token: String,
        offset: i64,
        data: Vec<u8>,
        checksum: String,
    },
    /// Commits the uploaded bytes as a file.
    FinalizeSession { session_token: String },
    /// Abandons the session. Best-effort; its reply is not awaited.
    AbortSession { session_token: String },
}

impl TransportRequest {
    /// Kind of this request.
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::BeginSession { .. } => RequestKind::BeginSession,
            Self::SendChunk { .. } => RequestKind::SendChunk,
            Self::FinalizeSession { .. } => RequestKind::FinalizeSession,
            Self::AbortSession { .. } => RequestKind::AbortSession,
        }
    }
}

/// Discriminant of a [`TransportRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    BeginSession,
    SendChunk,
    FinalizeSession,
    AbortSession,
}

/// Successful outcome of a [`TransportRequest`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportReply {
    SessionStarted {
        session_token: String,
        cloud_file_id: String,
    },
    /// The server now expects the chunk starting at `ack_offset`.
    ChunkAccepted { ack_offset: i64 },
    Finalized { response_body: String },
    Aborted,
}

/// Failure reported by the server or synthesized by the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("remote error {status_code}/{reason_code}: {message}")]
pub struct RemoteError {
    pub status_code: i32,
    pub reason_code: i32,
    pub message: String,
}

impl RemoteError {
    pub fn new(status_code: i32, reason_code: i32, message: impl Into<String>) -> Self {
        Self {
            status_code,
            reason_code,
            message: message.into(),
        }
    }

    /// Every attempt of the packet timeout ladder expired.
    pub fn network_timeout(message: impl Into<String>) -> Self {
        Self::new(
            status::CLIENT_NETWORK_ERROR,
            reason::CLIENT_NETWORK_ERROR_TIMEOUT,
            message,
        )
    }

    /// Builds an error from a non-OK server response.
    pub fn from_response(resp: &ServerResponse) -> Self {
        Self::new(
            resp.status,
            resp.reason(),
            resp.status_message.clone().unwrap_or_default(),
        )
    }
}

/// A transport reply routed back to its upload.
#[derive(Debug)]
pub(crate) struct Completion {
    pub(crate) upload_id: String,
    pub(crate) ticket: u64,
    pub(crate) result: Result<TransportReply, RemoteError>,
}

/// One-shot handle for answering a [`TransportRequest`].
///
/// Dropping it unanswered reports a client network error, so an upload
/// never waits forever on a request the transport lost.
#[derive(Debug)]
pub struct ReplySender {
    upload_id: String,
    ticket: u64,
    tx: Option<mpsc::UnboundedSender<Completion>>,
}

impl ReplySender {
    pub(crate) fn new(
        upload_id: String,
        ticket: u64,
        tx: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Self {
            upload_id,
            ticket,
            tx: Some(tx),
        }
    }

    /// Upload this reply belongs to.
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    /// Delivers the outcome to the engine's inbox.
    pub fn send(mut self, result: Result<TransportReply, RemoteError>) {
        self.deliver(result);
    }

    fn deliver(&mut self, result: Result<TransportReply, RemoteError>) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let completion = Completion {
            upload_id: std::mem::take(&mut self.upload_id),
            ticket: self.ticket,
            result,
        };
        if tx.send(completion).is_err() {
            trace!(ticket = self.ticket, "engine gone, reply discarded");
        }
    }
}

impl Drop for ReplySender {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.deliver(Err(RemoteError::new(
                status::CLIENT_NETWORK_ERROR,
                reason::CLIENT_UPLOAD_FILE_UNKNOWN,
                "transport dropped the request without replying",
            )));
        }
    }
}

/// Network capability consumed by the upload engine.
///
/// `submit` must not block: do the I/O elsewhere and answer through
/// `reply` when it finishes.
pub trait Transport: Send + Sync {
    fn submit(&self, request: TransportRequest, reply: ReplySender);
}

/// Thread-safe queue of transport completions, drained on the update tick.
pub(crate) struct Inbox {
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl Inbox {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub(crate) fn reply_sender(&self, upload_id: &str, ticket: u64) -> ReplySender {
        ReplySender::new(upload_id.to_string(), ticket, self.tx.clone())
    }

    /// Takes every completion queued so far without waiting.
    pub(crate) fn drain(&mut self) -> Vec<Completion> {
        let mut out = Vec::new();
        while let Ok(completion) = self.rx.try_recv() {
            out.push(completion);
        }
        out
    }
}
