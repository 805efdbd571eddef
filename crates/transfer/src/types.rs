use std::path::PathBuf;
use std::time::{Duration, Instant};

use cumulus_protocol::{ServerResponse, reason, status};
use serde::{Deserialize, Serialize};

use crate::DEFAULT_CHUNK_SIZE;
use crate::chunked::ChunkReader;
use crate::progress::SpeedCalculator;
use crate::transport::{RemoteError, RequestKind, TransportReply};

/// Lifecycle state of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadState {
    /// Waiting for the server to open a session.
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "in_progress")]
    InProgress,
    /// Cancel requested; applied on the next tick.
    #[serde(rename = "canceling")]
    Canceling,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "canceled")]
    Canceled,
}

impl UploadState {
    /// `Succeeded`, `Failed` or `Canceled`: no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// Parameters of a new upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub local_path: PathBuf,
    pub cloud_path: String,
    pub cloud_filename: String,
    /// Whether the committed file is publicly reachable by URL.
    pub shareable: bool,
    /// Replace an existing file with the same name.
    pub overwrite: bool,
}

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSettings {
    /// Bytes per chunk; 0 selects [`DEFAULT_CHUNK_SIZE`].
    pub chunk_size: usize,
    /// How long acknowledged throughput may stay below the threshold
    /// before the upload fails. Zero disables the check.
    pub low_transfer_rate_timeout: Duration,
    /// Minimum acceptable throughput in bytes per second.
    pub low_transfer_rate_threshold: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            low_transfer_rate_timeout: Duration::from_secs(120),
            low_transfer_rate_threshold: 50,
        }
    }
}

impl UploadSettings {
    /// Span the watchdog measures throughput over.
    ///
    /// At least `low_transfer_rate_timeout`, and never shorter than one
    /// chunk takes at the threshold rate, since progress only moves on
    /// chunk acknowledgements. Zero when the check is disabled.
    pub fn watchdog_window(&self) -> Duration {
        let timeout = self.low_transfer_rate_timeout;
        if timeout.is_zero() || self.low_transfer_rate_threshold == 0 {
            return timeout;
        }
        let chunk_size = if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        };
        let per_chunk =
            Duration::from_secs_f64(chunk_size as f64 / self.low_transfer_rate_threshold as f64);
        timeout.max(per_chunk)
    }
}

/// Server-side session opened by `BeginSession`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub token: String,
    pub cloud_file_id: String,
}

/// Step of the upload that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureStage {
    Session,
    ChunkTransfer,
    Finalize,
    /// Reading the local file failed mid-transfer.
    LocalRead,
    /// Throughput stayed below the configured threshold.
    TimedOut,
    Canceled,
}

/// Why an upload did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub stage: FailureStage,
    pub status_code: i32,
    pub reason_code: i32,
    pub message: String,
}

impl UploadFailure {
    pub fn remote(stage: FailureStage, err: RemoteError) -> Self {
        Self {
            stage,
            status_code: err.status_code,
            reason_code: err.reason_code,
            message: err.message,
        }
    }

    pub fn local(stage: FailureStage, reason_code: i32, message: impl Into<String>) -> Self {
        Self {
            stage,
            status_code: status::CLIENT_NETWORK_ERROR,
            reason_code,
            message: message.into(),
        }
    }

    pub fn canceled() -> Self {
        Self::local(
            FailureStage::Canceled,
            reason::CLIENT_UPLOAD_FILE_CANCELLED,
            "upload cancelled",
        )
    }

    /// JSON body handed to the failure callback.
    pub fn response_body(&self) -> String {
        ServerResponse::error(self.status_code, self.reason_code, self.message.clone()).to_json()
    }
}

/// Point-in-time view of an upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub upload_id: String,
    pub state: UploadState,
    pub total_bytes: i64,
    pub bytes_transferred: i64,
    pub fraction: f64,
    pub bytes_per_second: f64,
    #[serde(skip)]
    pub eta: Option<Duration>,
}

/// A request handed to the transport and not yet answered.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InFlight {
    pub(crate) ticket: u64,
    pub(crate) kind: RequestKind,
    /// Offset the server must acknowledge for a chunk request.
    pub(crate) chunk_end: i64,
}

/// One tracked upload.
///
/// The public fields are the data model; the crate-private ones are the
/// engine's driver state and are dropped once the record turns terminal.
#[derive(Debug)]
pub struct UploadRecord {
    pub upload_id: String,
    pub local_path: PathBuf,
    pub cloud_path: String,
    pub cloud_filename: String,
    pub shareable: bool,
    pub overwrite: bool,
    pub total_bytes: i64,
    pub bytes_transferred: i64,
    pub state: UploadState,
    pub session: Option<SessionInfo>,
    pub last_error: Option<UploadFailure>,
    /// Finalize response, set on success.
    pub response_body: Option<String>,
    pub created_at: Instant,
    pub started_at: Option<Instant>,
    /// When bytes were last acknowledged, or the session opened.
    pub last_progress_at: Option<Instant>,

    pub(crate) reader: Option<ChunkReader>,
    pub(crate) in_flight: Option<InFlight>,
    pub(crate) reply: Option<Result<TransportReply, RemoteError>>,
    pub(crate) chunks_acked: u32,
    pub(crate) speed: SpeedCalculator,
}

impl UploadRecord {
    /// Creates a pending record.
    pub fn new(upload_id: String, request: UploadRequest, total_bytes: i64, now: Instant) -> Self {
        Self {
            upload_id,
            local_path: request.local_path,
            cloud_path: request.cloud_path,
            cloud_filename: request.cloud_filename,
            shareable: request.shareable,
            overwrite: request.overwrite,
            total_bytes,
            bytes_transferred: 0,
            state: UploadState::Pending,
            session: None,
            last_error: None,
            response_body: None,
            created_at: now,
            started_at: None,
            last_progress_at: None,
            reader: None,
            in_flight: None,
            reply: None,
            chunks_acked: 0,
            speed: SpeedCalculator::default(),
        }
    }

    /// Marks the record as streaming chunks.
    pub(crate) fn start(&mut self, now: Instant) {
        self.state = UploadState::InProgress;
        self.started_at = Some(now);
        self.last_progress_at = Some(now);
    }

    /// Records acknowledged bytes. Never moves the counter backwards.
    pub(crate) fn add_progress(&mut self, acked_to: i64, now: Instant) {
        let acked_to = acked_to.min(self.total_bytes);
        if acked_to > self.bytes_transferred {
            self.speed.add_sample(acked_to - self.bytes_transferred, now);
            self.bytes_transferred = acked_to;
            self.last_progress_at = Some(now);
        }
        self.chunks_acked += 1;
    }

    pub(crate) fn succeed(&mut self, response_body: String) {
        self.bytes_transferred = self.total_bytes;
        self.response_body = Some(response_body);
        self.finish(UploadState::Succeeded);
    }

    pub(crate) fn fail(&mut self, failure: UploadFailure) {
        self.last_error = Some(failure);
        self.finish(UploadState::Failed);
    }

    pub(crate) fn mark_canceled(&mut self) {
        self.last_error = Some(UploadFailure::canceled());
        self.finish(UploadState::Canceled);
    }

    /// Moves `Pending`/`InProgress` to `Canceling`. Returns `false` when
    /// the record is already canceling or terminal.
    pub(crate) fn request_cancel(&mut self) -> bool {
        match self.state {
            UploadState::Pending | UploadState::InProgress => {
                self.state = UploadState::Canceling;
                true
            }
            _ => false,
        }
    }

    fn finish(&mut self, state: UploadState) {
        self.state = state;
        self.reader = None;
        self.in_flight = None;
        self.reply = None;
    }

    /// Completed fraction in `[0, 1]`.
    ///
    /// A zero-byte upload reports 0 until it succeeds.
    pub fn progress(&self) -> f64 {
        if self.state == UploadState::Succeeded {
            return 1.0;
        }
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.bytes_transferred as f64 / self.total_bytes as f64
    }

    /// Returns a snapshot suitable for display or serialization.
    pub fn snapshot(&self) -> UploadProgress {
        UploadProgress {
            upload_id: self.upload_id.clone(),
            state: self.state,
            total_bytes: self.total_bytes,
            bytes_transferred: self.bytes_transferred,
            fraction: self.progress(),
            bytes_per_second: self.speed.bytes_per_second(),
            eta: self
                .speed
                .eta(self.total_bytes - self.bytes_transferred),
        }
    }
}
