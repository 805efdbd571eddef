//! Wire vocabulary shared by the cumulus client crates.
//!
//! Service and operation identifiers, status/reason codes, the JSON
//! packet envelope posted to the dispatcher, and file-service payloads.

pub mod constants;
pub mod envelope;
pub mod messages;

// Re-export primary types for convenience.
pub use constants::{ServiceName, ServiceOperation, reason, status};
pub use envelope::{RequestPacket, ResponsePacket, ServerCall, ServerResponse};
pub use messages::{
    CdnUrl, ChunkAck, FileDetails, ListUserFilesRequest, PrepareUserUploadRequest,
    PrepareUserUploadResponse, UserFileList, UserFileRequest,
};
