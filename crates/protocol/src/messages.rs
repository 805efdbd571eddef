use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Opens an upload session (`PREPARE_USER_UPLOAD`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareUserUploadRequest {
    pub cloud_path: String,
    pub cloud_filename: String,
    pub shareable: bool,
    pub replace_if_exists: bool,
    pub file_size: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub local_path: String,
}

/// Lists files under a cloud path (`LIST_USER_FILES`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUserFilesRequest {
    pub cloud_path: String,
    pub recurse: bool,
}

/// Deletes a single file (`DELETE_USER_FILE`) or resolves its CDN URL
/// (`GET_CDN_URL`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFileRequest {
    pub cloud_path: String,
    pub cloud_filename: String,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Server-side description of a user file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    #[serde(default)]
    pub cloud_path: String,
    pub cloud_filename: String,
    #[serde(default)]
    pub file_size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default)]
    pub shareable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Reply to `PREPARE_USER_UPLOAD`: the upload id doubles as session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareUserUploadResponse {
    pub file_details: FileDetails,
}

/// Reply to `LIST_USER_FILES`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFileList {
    #[serde(default)]
    pub file_list: Vec<FileDetails>,
}

/// Uploader acknowledgement of a chunk: the next byte offset it expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAck {
    pub ack_offset: i64,
}

/// Reply to `GET_CDN_URL`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdnUrl {
    pub app_server_url: String,
    pub cdn_url: String,
}
