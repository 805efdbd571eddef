use tracing::debug;

use crate::types::{UploadFailure, UploadRecord, UploadState};

/// Invoked with `(upload_id, response_body)` when an upload succeeds.
pub type UploadSuccessCallback = Box<dyn FnMut(&str, &str) + Send>;

/// Invoked with `(upload_id, status_code, reason_code, response_body)`
/// when an upload fails or is canceled.
pub type UploadFailureCallback = Box<dyn FnMut(&str, i32, i32, &str) + Send>;

/// Holds at most one `(on_success, on_failure)` pair; the last
/// registration wins.
#[derive(Default)]
pub struct CallbackDispatcher {
    callbacks: Option<(UploadSuccessCallback, UploadFailureCallback)>,
}

impl std::fmt::Debug for CallbackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackDispatcher")
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl CallbackDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the callback pair, replacing any previous one.
    pub fn register(&mut self, on_success: UploadSuccessCallback, on_failure: UploadFailureCallback) {
        self.callbacks = Some((on_success, on_failure));
    }

    /// Clears the callback pair. Terminal results are held until a new
    /// pair is registered.
    pub fn deregister(&mut self) {
        self.callbacks = None;
    }

    pub fn is_registered(&self) -> bool {
        self.callbacks.is_some()
    }

    /// Delivers the terminal result of `record`.
    ///
    /// Returns `false`, and delivers nothing, when no pair is registered or
    /// the record is not terminal yet.
    pub fn deliver(&mut self, record: &UploadRecord) -> bool {
        let Some((on_success, on_failure)) = self.callbacks.as_mut() else {
            return false;
        };

        match record.state {
            UploadState::Succeeded => {
                let body = record.response_body.as_deref().unwrap_or("{}");
                debug!(upload_id = %record.upload_id, "delivering upload success");
                on_success(&record.upload_id, body);
            }
            UploadState::Failed | UploadState::Canceled => {
                let failure = record.last_error.clone().unwrap_or_else(|| {
                    UploadFailure::local(
                        crate::types::FailureStage::ChunkTransfer,
                        cumulus_protocol::reason::CLIENT_UPLOAD_FILE_UNKNOWN,
                        "upload failed",
                    )
                });
                debug!(
                    upload_id = %record.upload_id,
                    status = failure.status_code,
                    reason = failure.reason_code,
                    "delivering upload failure"
                );
                on_failure(
                    &record.upload_id,
                    failure.status_code,
                    failure.reason_code,
                    &failure.response_body(),
                );
            }
            UploadState::Pending | UploadState::InProgress | UploadState::Canceling => {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UploadRequest;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(state: UploadState) -> UploadRecord {
        let mut r = UploadRecord::new(
            "u1".into(),
            UploadRequest {
                local_path: PathBuf::from("/tmp/a.dat"),
                cloud_path: String::new(),
                cloud_filename: "a.dat".into(),
                shareable: false,
                overwrite: true,
            },
            10,
            Instant::now(),
        );
        match state {
            UploadState::Succeeded => r.succeed(r#"{"status":200}"#.into()),
            UploadState::Canceled => r.mark_canceled(),
            other => r.state = other,
        }
        r
    }

    fn recording(dispatcher: &mut CallbackDispatcher, tag: &str) -> Log {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let (ok_log, err_log) = (Arc::clone(&log), Arc::clone(&log));
        let (ok_tag, err_tag) = (tag.to_string(), tag.to_string());
        dispatcher.register(
            Box::new(move |id, body| {
                ok_log
                    .lock()
                    .unwrap()
                    .push(format!("{ok_tag}:ok:{id}:{body}"));
            }),
            Box::new(move |id, status, reason, _body| {
                err_log
                    .lock()
                    .unwrap()
                    .push(format!("{err_tag}:err:{id}:{status}:{reason}"));
            }),
        );
        log
    }

    #[test]
    fn nothing_delivered_without_callbacks() {
        let mut dispatcher = CallbackDispatcher::new();
        assert!(!dispatcher.is_registered());
        assert!(!dispatcher.deliver(&record(UploadState::Succeeded)));
    }

    #[test]
    fn success_delivered_with_body() {
        let mut dispatcher = CallbackDispatcher::new();
        let log = recording(&mut dispatcher, "a");
        assert!(dispatcher.deliver(&record(UploadState::Succeeded)));
        assert_eq!(*log.lock().unwrap(), vec![r#"a:ok:u1:{"status":200}"#]);
    }

    #[test]
    fn cancel_delivered_as_failure() {
        let mut dispatcher = CallbackDispatcher::new();
        let log = recording(&mut dispatcher, "a");
        assert!(dispatcher.deliver(&record(UploadState::Canceled)));
        assert_eq!(*log.lock().unwrap(), vec!["a:err:u1:900:90100"]);
    }

    #[test]
    fn active_record_not_delivered() {
        let mut dispatcher = CallbackDispatcher::new();
        let log = recording(&mut dispatcher, "a");
        assert!(!dispatcher.deliver(&record(UploadState::InProgress)));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn last_registration_wins() {
        let mut dispatcher = CallbackDispatcher::new();
        let first = recording(&mut dispatcher, "first");
        let second = recording(&mut dispatcher, "second");
        dispatcher.deliver(&record(UploadState::Succeeded));
        assert!(first.lock().unwrap().is_empty());
        assert_eq!(second.lock().unwrap().len(), 1);
    }

    #[test]
    fn deregister_clears() {
        let mut dispatcher = CallbackDispatcher::new();
        let _log = recording(&mut dispatcher, "a");
        dispatcher.deregister();
        assert!(!dispatcher.is_registered());
    }
}
