use std::path::{Component, Path};

use crate::TransferError;

/// Validates a cloud directory path.
///
/// Empty is the root of the user's file space and is accepted. Rejects:
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
pub fn validate_cloud_path(cloud_path: &str) -> Result<(), TransferError> {
    if cloud_path.is_empty() {
        return Ok(());
    }

    let path = Path::new(cloud_path);

    if path.is_absolute() {
        return Err(TransferError::InvalidCloudPath(format!(
            "absolute path not allowed: {cloud_path}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidCloudPath(format!(
                    "parent directory traversal not allowed: {cloud_path}"
                )));
            }
            Component::Prefix(_) => {
                return Err(TransferError::InvalidCloudPath(format!(
                    "path prefix not allowed: {cloud_path}"
                )));
            }
            Component::RootDir => {
                return Err(TransferError::InvalidCloudPath(format!(
                    "absolute path not allowed: {cloud_path}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}

/// Validates a cloud file name: non-empty, a single path segment.
pub fn validate_cloud_filename(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidCloudPath("empty file name".into()));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(TransferError::InvalidCloudPath(format!(
            "file name must not contain path separators: {name}"
        )));
    }
    if name == "." || name == ".." {
        return Err(TransferError::InvalidCloudPath(format!(
            "reserved file name: {name}"
        )));
    }
    Ok(())
}
