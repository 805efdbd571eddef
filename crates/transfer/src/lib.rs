//! Chunked file upload with progress tracking, cancellation and
//! callback delivery.
//!
//! The [`UploadEngine`] owns an [`UploadRegistry`] of in-flight uploads and
//! a [`CallbackDispatcher`]. Network I/O happens behind the [`Transport`]
//! trait; its completions land in a thread-safe inbox that the engine
//! drains only from [`UploadEngine::update`], so all record mutation and
//! callback delivery happen on the thread that drives the tick.

mod callbacks;
mod chunked;
mod engine;
mod progress;
mod registry;
mod transport;
mod types;
mod validation;

#[cfg(test)]
mod test_support;

pub use callbacks::{CallbackDispatcher, UploadFailureCallback, UploadSuccessCallback};
pub use chunked::{Chunk, ChunkReader, checksum_bytes};
pub use engine::UploadEngine;
pub use progress::SpeedCalculator;
pub use registry::UploadRegistry;
pub use transport::{
    RemoteError, ReplySender, RequestKind, Transport, TransportReply, TransportRequest,
};
pub use types::{
    FailureStage, SessionInfo, UploadFailure, UploadProgress, UploadRecord, UploadRequest,
    UploadSettings, UploadState,
};
pub use validation::{validate_cloud_filename, validate_cloud_path};

/// Default chunk size: 1 MiB.
///
/// Every chunk but the last is exactly this size; the last carries the
/// remainder.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Errors produced synchronously by the transfer crate.
///
/// Remote failures never appear here; they are delivered through the
/// failure callback as an [`UploadFailure`].
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("file unreadable: {path}: {reason}")]
    FileUnreadable { path: String, reason: String },

    #[error("invalid cloud path: {0}")]
    InvalidCloudPath(String),

    #[error("duplicate upload id: {0}")]
    DuplicateId(String),

    #[error("upload not found: {0}")]
    UploadNotFound(String),
}
