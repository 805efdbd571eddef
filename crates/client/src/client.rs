use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cumulus_protocol::{ServerCall, ServiceOperation};
use cumulus_transfer::{UploadEngine, UploadProgress, UploadRequest, UploadState};
use serde::Deserialize;
use tokio::runtime::Handle;
use tracing::info;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::file_service::FileService;
use crate::http::HttpTransport;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionData {
    session_id: String,
    #[serde(default)]
    profile_id: String,
}

/// Entry point for embedding applications.
///
/// Uploads advance only when the host calls [`update`](Self::update);
/// callbacks fire from inside that call.
pub struct CloudClient {
    config: ClientConfig,
    transport: HttpTransport,
    engine: UploadEngine,
}

impl CloudClient {
    /// Creates a client whose network I/O runs on the current tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }

    /// Creates a client whose network I/O runs on `runtime`.
    pub fn with_runtime(config: ClientConfig, runtime: Handle) -> Result<Self, ClientError> {
        let transport = HttpTransport::with_runtime(&config, runtime)?;
        Ok(Self::with_transport(config, transport))
    }

    fn with_transport(config: ClientConfig, transport: HttpTransport) -> Self {
        let engine = UploadEngine::new(Arc::new(transport.clone()), config.upload.to_settings());
        Self {
            config,
            transport,
            engine,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The upload engine, for snapshots and registry inspection.
    pub fn engine(&self) -> &UploadEngine {
        &self.engine
    }

    /// Opens an anonymous session and returns the profile id.
    pub async fn authenticate_anonymous(
        &self,
        anonymous_id: &str,
        force_create: bool,
    ) -> Result<String, ClientError> {
        let call = ServerCall::new(
            ServiceOperation::Authenticate,
            &serde_json::json!({
                "externalId": anonymous_id,
                "authenticationType": "Anonymous",
                "forceCreate": force_create,
                "appId": self.config.app_id,
                "appVersion": self.config.app_version,
            }),
        )?;
        let response = self.transport.dispatch(call).await?;
        if !response.is_ok() {
            return Err(ClientError::Server {
                status: response.status,
                reason: response.reason(),
                message: response.status_message.clone().unwrap_or_default(),
            });
        }
        let session = response
            .parse_data::<SessionData>()?
            .ok_or_else(|| ClientError::Server {
                status: response.status,
                reason: response.reason(),
                message: "authentication response has no session".into(),
            })?;
        self.transport.set_session_id(&session.session_id);
        info!(profile_id = %session.profile_id, "authenticated");
        Ok(session.profile_id)
    }

    pub fn session_id(&self) -> String {
        self.transport.session_id()
    }

    pub fn set_session_id(&self, session_id: &str) {
        self.transport.set_session_id(session_id);
    }

    pub fn packet_timeouts(&self) -> Vec<Duration> {
        self.transport.packet_timeouts()
    }

    pub fn set_packet_timeouts(&self, timeouts: Vec<Duration>) {
        self.transport.set_packet_timeouts(timeouts);
    }

    pub fn set_packet_timeouts_to_default(&self) {
        self.transport.set_packet_timeouts(Vec::new());
    }

    /// Starts uploading `local_path` to `cloud_path/cloud_filename` and
    /// returns the upload id.
    pub fn upload_file(
        &mut self,
        cloud_path: &str,
        cloud_filename: &str,
        shareable: bool,
        replace_if_exists: bool,
        local_path: impl AsRef<Path>,
    ) -> Result<String, ClientError> {
        let upload_id = self.engine.start_upload(UploadRequest {
            local_path: local_path.as_ref().to_path_buf(),
            cloud_path: cloud_path.to_string(),
            cloud_filename: cloud_filename.to_string(),
            shareable,
            overwrite: replace_if_exists,
        })?;
        Ok(upload_id)
    }

    /// Fraction in `[0, 1]`, or -1 for an unknown upload.
    pub fn get_upload_progress(&self, upload_id: &str) -> f64 {
        self.engine.progress(upload_id)
    }

    pub fn get_upload_bytes_transferred(&self, upload_id: &str) -> i64 {
        self.engine.bytes_transferred(upload_id)
    }

    pub fn get_upload_total_bytes_to_transfer(&self, upload_id: &str) -> i64 {
        self.engine.total_bytes(upload_id)
    }

    pub fn get_upload_state(&self, upload_id: &str) -> Option<UploadState> {
        self.engine.state(upload_id)
    }

    pub fn get_upload_snapshot(&self, upload_id: &str) -> Option<UploadProgress> {
        self.engine.snapshot(upload_id)
    }

    /// Requests cancellation; applied on a later [`update`](Self::update).
    pub fn cancel_upload(&mut self, upload_id: &str) -> bool {
        self.engine.cancel_upload(upload_id)
    }

    pub fn register_file_upload_callbacks<S, F>(&mut self, on_success: S, on_failure: F)
    where
        S: FnMut(&str, &str) + Send + 'static,
        F: FnMut(&str, i32, i32, &str) + Send + 'static,
    {
        self.engine.register_callbacks(on_success, on_failure);
    }

    pub fn deregister_file_upload_callbacks(&mut self) {
        self.engine.deregister_callbacks();
    }

    /// Runs one tick: applies network replies, sends the next requests and
    /// delivers finished uploads to the callbacks.
    pub fn update(&mut self) {
        self.engine.update();
    }

    pub fn file_service(&self) -> FileService {
        FileService::new(self.transport.clone())
    }

    /// Fails every in-flight request. Uploads see a network error on the
    /// next tick.
    pub fn shutdown(&self) {
        self.transport.shutdown();
    }
}

impl Drop for CloudClient {
    fn drop(&mut self) {
        self.transport.shutdown();
    }
}
