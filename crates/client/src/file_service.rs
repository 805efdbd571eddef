use cumulus_protocol::{
    CdnUrl, FileDetails, ListUserFilesRequest, ServerCall, ServerResponse, ServiceOperation,
    UserFileList, UserFileRequest,
};
use serde::Serialize;
use tracing::debug;

use crate::error::ClientError;
use crate::http::HttpTransport;

/// User file calls on the `file` service.
#[derive(Clone)]
pub struct FileService {
    transport: HttpTransport,
}

impl FileService {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }

    /// Lists files under `cloud_path`, descending into subdirectories when
    /// `recurse` is set.
    pub async fn list_user_files(
        &self,
        cloud_path: &str,
        recurse: bool,
    ) -> Result<Vec<FileDetails>, ClientError> {
        let response = self
            .call(
                ServiceOperation::ListUserFiles,
                &ListUserFilesRequest {
                    cloud_path: cloud_path.to_string(),
                    recurse,
                },
            )
            .await?;
        let files = response
            .parse_data::<UserFileList>()?
            .map(|list| list.file_list)
            .unwrap_or_default();
        debug!(cloud_path, files = files.len(), "listed user files");
        Ok(files)
    }

    pub async fn delete_user_file(
        &self,
        cloud_path: &str,
        cloud_filename: &str,
    ) -> Result<(), ClientError> {
        self.call(
            ServiceOperation::DeleteUserFile,
            &UserFileRequest {
                cloud_path: cloud_path.to_string(),
                cloud_filename: cloud_filename.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    /// Deletes every file under `cloud_path`.
    pub async fn delete_user_files(
        &self,
        cloud_path: &str,
        recurse: bool,
    ) -> Result<(), ClientError> {
        self.call(
            ServiceOperation::DeleteUserFiles,
            &ListUserFilesRequest {
                cloud_path: cloud_path.to_string(),
                recurse,
            },
        )
        .await?;
        Ok(())
    }

    pub async fn get_cdn_url(
        &self,
        cloud_path: &str,
        cloud_filename: &str,
    ) -> Result<CdnUrl, ClientError> {
        let response = self
            .call(
                ServiceOperation::GetCdnUrl,
                &UserFileRequest {
                    cloud_path: cloud_path.to_string(),
                    cloud_filename: cloud_filename.to_string(),
                },
            )
            .await?;
        response
            .parse_data::<CdnUrl>()?
            .ok_or_else(|| ClientError::Server {
                status: response.status,
                reason: response.reason(),
                message: "response has no CDN URL".into(),
            })
    }

    async fn call<T: Serialize>(
        &self,
        operation: ServiceOperation,
        data: &T,
    ) -> Result<ServerResponse, ClientError> {
        let response = self
            .transport
            .dispatch(ServerCall::new(operation, data)?)
            .await?;
        if !response.is_ok() {
            return Err(ClientError::Server {
                status: response.status,
                reason: response.reason(),
                message: response.status_message.clone().unwrap_or_default(),
            });
        }
        Ok(response)
    }
}
