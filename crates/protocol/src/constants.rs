use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Dispatcher endpoint, relative to the server URL.
pub const DISPATCHER_PATH: &str = "/dispatcherv2";

/// Chunk uploader endpoint, relative to the server URL.
pub const UPLOADER_PATH: &str = "/uploader";

/// Header carrying the packet signature.
pub const SIGNATURE_HEADER: &str = "X-SIG";

/// Header carrying the SHA-256 hex checksum of a chunk body.
pub const CHECKSUM_HEADER: &str = "X-Checksum";

/// Default packet timeout ladder: one entry per attempt.
pub const DEFAULT_PACKET_TIMEOUTS: [Duration; 3] = [
    Duration::from_secs(15),
    Duration::from_secs(10),
    Duration::from_secs(10),
];

/// Remote service a [`ServiceOperation`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceName {
    #[serde(rename = "authenticationV2")]
    Authentication,
    #[serde(rename = "file")]
    File,

    /// Forward compatibility: unknown service names deserialize here.
    #[serde(other)]
    Unknown,
}

impl ServiceName {
    /// Returns the wire key for this service.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authenticationV2",
            Self::File => "file",
            Self::Unknown => "unknown",
        }
    }
}

/// Server operation identifier.
///
/// Only the operations issued by this client are listed; anything else the
/// server sends back deserializes to [`ServiceOperation::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceOperation {
    // Authentication
    Authenticate,

    // File upload
    PrepareUserUpload,
    ListUserFiles,
    DeleteUserFile,
    DeleteUserFiles,
    GetCdnUrl,

    #[serde(other)]
    Unknown,
}

impl ServiceOperation {
    /// Returns the wire key for this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authenticate => "AUTHENTICATE",
            Self::PrepareUserUpload => "PREPARE_USER_UPLOAD",
            Self::ListUserFiles => "LIST_USER_FILES",
            Self::DeleteUserFile => "DELETE_USER_FILE",
            Self::DeleteUserFiles => "DELETE_USER_FILES",
            Self::GetCdnUrl => "GET_CDN_URL",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Service that handles this operation.
    pub fn service(&self) -> ServiceName {
        match self {
            Self::Authenticate => ServiceName::Authentication,
            Self::PrepareUserUpload
            | Self::ListUserFiles
            | Self::DeleteUserFile
            | Self::DeleteUserFiles
            | Self::GetCdnUrl => ServiceName::File,
            Self::Unknown => ServiceName::Unknown,
        }
    }
}

/// HTTP-like status codes carried in server responses.
pub mod status {
    pub const OK: i32 = 200;
    pub const BAD_REQUEST: i32 = 400;
    pub const FORBIDDEN: i32 = 403;
    pub const INTERNAL_SERVER_ERROR: i32 = 500;
    /// Synthesized client-side when the server could not be reached.
    pub const CLIENT_NETWORK_ERROR: i32 = 900;
}

/// Reason codes refining a failure status.
pub mod reason {
    /// Every attempt in the packet timeout ladder expired.
    pub const CLIENT_NETWORK_ERROR_TIMEOUT: i32 = 90001;
    pub const CLIENT_UPLOAD_FILE_CANCELLED: i32 = 90100;
    /// Transfer rate stayed below the configured threshold for too long.
    pub const CLIENT_UPLOAD_FILE_TIMED_OUT: i32 = 90101;
    pub const CLIENT_UPLOAD_FILE_UNKNOWN: i32 = 90102;
}
