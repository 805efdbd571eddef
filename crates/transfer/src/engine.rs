use std::sync::Arc;
use std::time::Instant;

use cumulus_protocol::reason;
use tracing::{debug, info, trace, warn};

use crate::TransferError;
use crate::callbacks::CallbackDispatcher;
use crate::chunked::{ChunkReader, checksum_bytes};
use crate::progress::SpeedCalculator;
use crate::registry::UploadRegistry;
use crate::transport::{Inbox, RemoteError, RequestKind, Transport, TransportReply, TransportRequest};
use crate::types::{
    FailureStage, InFlight, SessionInfo, UploadFailure, UploadProgress, UploadRecord,
    UploadRequest, UploadSettings, UploadState,
};
use crate::validation::{validate_cloud_filename, validate_cloud_path};

/// Drives chunked uploads through a [`Transport`].
///
/// Nothing here blocks. Each call to [`update`](Self::update) applies the
/// transport replies received since the previous tick, sends at most one
/// request per upload, and hands terminal results to the registered
/// callbacks before pruning them.
pub struct UploadEngine {
    settings: UploadSettings,
    transport: Arc<dyn Transport>,
    registry: UploadRegistry,
    dispatcher: CallbackDispatcher,
    inbox: Inbox,
    next_ticket: u64,
}

impl UploadEngine {
    pub fn new(transport: Arc<dyn Transport>, settings: UploadSettings) -> Self {
        Self {
            settings,
            transport,
            registry: UploadRegistry::new(),
            dispatcher: CallbackDispatcher::new(),
            inbox: Inbox::new(),
            next_ticket: 1,
        }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// Read-only view of the tracked uploads.
    pub fn registry(&self) -> &UploadRegistry {
        &self.registry
    }

    /// Accepts a new upload and asks the server for a session.
    ///
    /// Local problems (missing or unreadable file, bad cloud path) are
    /// returned here. Everything that goes wrong later arrives through the
    /// failure callback.
    pub fn start_upload(&mut self, request: UploadRequest) -> Result<String, TransferError> {
        validate_cloud_path(&request.cloud_path)?;
        validate_cloud_filename(&request.cloud_filename)?;
        let reader = ChunkReader::new(&request.local_path, self.settings.chunk_size)?;

        let upload_id = uuid::Uuid::new_v4().to_string();
        let total_bytes = reader.file_size();
        let mut record = UploadRecord::new(upload_id.clone(), request, total_bytes, Instant::now());
        record.reader = Some(reader);
        record.speed = SpeedCalculator::new(Some(self.settings.watchdog_window()), None);

        let begin = TransportRequest::BeginSession {
            cloud_path: record.cloud_path.clone(),
            cloud_filename: record.cloud_filename.clone(),
            total_bytes,
            overwrite: record.overwrite,
            shareable: record.shareable,
            local_path: record.local_path.display().to_string(),
        };

        self.registry.register(record)?;
        info!(
            upload_id = %upload_id,
            bytes = total_bytes,
            "upload accepted, opening session"
        );

        if let Some(record) = self.registry.get_mut(&upload_id) {
            let ticket = self.next_ticket;
            self.next_ticket += 1;
            submit(self.transport.as_ref(), &self.inbox, ticket, record, begin);
        }
        Ok(upload_id)
    }

    /// Applies pending replies and moves one upload forward.
    pub fn advance(&mut self, upload_id: &str) -> Result<UploadState, TransferError> {
        self.advance_at(upload_id, Instant::now())
    }

    /// [`advance`](Self::advance) with an explicit clock.
    pub fn advance_at(
        &mut self,
        upload_id: &str,
        now: Instant,
    ) -> Result<UploadState, TransferError> {
        self.drain_inbox();
        self.step_upload(upload_id, now);
        Ok(self.registry.get(upload_id)?.state)
    }

    /// One cooperative tick: advance every active upload, then deliver
    /// terminal results.
    pub fn update(&mut self) {
        self.update_at(Instant::now());
    }

    /// [`update`](Self::update) with an explicit clock.
    pub fn update_at(&mut self, now: Instant) {
        self.drain_inbox();
        for upload_id in self.registry.list_active() {
            self.step_upload(&upload_id, now);
        }
        self.deliver_results();
    }

    /// Requests cancellation. Takes effect on the next tick once any
    /// request already in flight has been answered.
    ///
    /// Returns `false` for unknown, canceling or terminal uploads.
    pub fn cancel_upload(&mut self, upload_id: &str) -> bool {
        let Some(record) = self.registry.get_mut(upload_id) else {
            return false;
        };
        let requested = record.request_cancel();
        if requested {
            info!(upload_id = %upload_id, "upload cancel requested");
        }
        requested
    }

    /// Completed fraction, or -1 for an unknown upload.
    pub fn progress(&self, upload_id: &str) -> f64 {
        self.registry
            .get(upload_id)
            .map_or(-1.0, UploadRecord::progress)
    }

    /// Acknowledged bytes, or -1 for an unknown upload.
    pub fn bytes_transferred(&self, upload_id: &str) -> i64 {
        self.registry
            .get(upload_id)
            .map_or(-1, |r| r.bytes_transferred)
    }

    /// File size, or -1 for an unknown upload.
    pub fn total_bytes(&self, upload_id: &str) -> i64 {
        self.registry.get(upload_id).map_or(-1, |r| r.total_bytes)
    }

    pub fn state(&self, upload_id: &str) -> Option<UploadState> {
        self.registry.get(upload_id).ok().map(|r| r.state)
    }

    pub fn snapshot(&self, upload_id: &str) -> Option<UploadProgress> {
        self.registry.get(upload_id).ok().map(UploadRecord::snapshot)
    }

    /// Registers the callback pair; the previous pair is replaced.
    pub fn register_callbacks<S, F>(&mut self, on_success: S, on_failure: F)
    where
        S: FnMut(&str, &str) + Send + 'static,
        F: FnMut(&str, i32, i32, &str) + Send + 'static,
    {
        self.dispatcher
            .register(Box::new(on_success), Box::new(on_failure));
    }

    /// Removes the callback pair. Results are held until a pair is
    /// registered again.
    pub fn deregister_callbacks(&mut self) {
        self.dispatcher.deregister();
    }

    /// Parks each awaited reply on its record; anything else is stale.
    fn drain_inbox(&mut self) {
        for completion in self.inbox.drain() {
            let Some(record) = self.registry.get_mut(&completion.upload_id) else {
                trace!(upload_id = %completion.upload_id, "reply for removed upload discarded");
                continue;
            };
            let awaited = !record.state.is_terminal()
                && record
                    .in_flight
                    .is_some_and(|f| f.ticket == completion.ticket);
            if !awaited {
                trace!(
                    upload_id = %completion.upload_id,
                    ticket = completion.ticket,
                    "stale reply discarded"
                );
                continue;
            }
            record.reply = Some(completion.result);
        }
    }

    fn step_upload(&mut self, upload_id: &str, now: Instant) {
        let Some(record) = self.registry.get_mut(upload_id) else {
            return;
        };
        let Some(request) = step(record, &self.settings, now) else {
            return;
        };
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        submit(self.transport.as_ref(), &self.inbox, ticket, record, request);
    }

    fn deliver_results(&mut self) {
        if !self.dispatcher.is_registered() {
            return;
        }
        for upload_id in self.registry.list_terminal() {
            let delivered = match self.registry.get(&upload_id) {
                Ok(record) => self.dispatcher.deliver(record),
                Err(_) => false,
            };
            if delivered {
                self.registry.remove(&upload_id);
                debug!(upload_id = %upload_id, "upload record pruned");
            }
        }
    }
}

/// Hands `request` to the transport. Aborts are fire-and-forget; every
/// other request becomes the record's single in-flight request.
fn submit(
    transport: &dyn Transport,
    inbox: &Inbox,
    ticket: u64,
    record: &mut UploadRecord,
    request: TransportRequest,
) {
    let kind = request.kind();
    if kind != RequestKind::AbortSession {
        let chunk_end = match &request {
            TransportRequest::SendChunk { offset, data, .. } => offset + data.len() as i64,
            _ => 0,
        };
        record.in_flight = Some(InFlight {
            ticket,
            kind,
            chunk_end,
        });
    }
    let reply = inbox.reply_sender(&record.upload_id, ticket);
    transport.submit(request, reply);
}

/// Moves one record forward and returns the request to send, if any.
fn step(
    record: &mut UploadRecord,
    settings: &UploadSettings,
    now: Instant,
) -> Option<TransportRequest> {
    if let Some(result) = record.reply.take() {
        apply_reply(record, result, now);
    }
    if record.state.is_terminal() {
        return None;
    }
    if check_watchdog(record, settings, now) {
        return abort_request(record);
    }
    if record.in_flight.is_some() {
        return None;
    }
    match record.state {
        UploadState::InProgress => next_request(record),
        UploadState::Canceling => finish_cancel(record),
        _ => None,
    }
}

fn apply_reply(
    record: &mut UploadRecord,
    result: Result<TransportReply, RemoteError>,
    now: Instant,
) {
    let Some(in_flight) = record.in_flight.take() else {
        return;
    };
    let canceling = record.state == UploadState::Canceling;

    match (in_flight.kind, result) {
        (
            RequestKind::BeginSession,
            Ok(TransportReply::SessionStarted {
                session_token,
                cloud_file_id,
            }),
        ) => {
            record.session = Some(SessionInfo {
                token: session_token,
                cloud_file_id,
            });
            if record.state == UploadState::Pending {
                record.start(now);
                info!(upload_id = %record.upload_id, "upload session opened");
            }
        }
        (RequestKind::BeginSession, Err(err)) if canceling => {
            debug!(upload_id = %record.upload_id, error = %err, "session failed while canceling");
            record.mark_canceled();
            info!(upload_id = %record.upload_id, "upload canceled");
        }
        (RequestKind::BeginSession, Err(err)) => {
            fail(record, UploadFailure::remote(FailureStage::Session, err));
        }
        (RequestKind::SendChunk, Ok(TransportReply::ChunkAccepted { ack_offset })) => {
            if ack_offset != in_flight.chunk_end {
                if !canceling {
                    fail(
                        record,
                        UploadFailure::local(
                            FailureStage::ChunkTransfer,
                            reason::CLIENT_UPLOAD_FILE_UNKNOWN,
                            format!(
                                "server acknowledged offset {ack_offset}, expected {}",
                                in_flight.chunk_end
                            ),
                        ),
                    );
                }
                return;
            }
            record.add_progress(ack_offset, now);
            debug!(
                upload_id = %record.upload_id,
                offset = ack_offset,
                bytes = record.bytes_transferred,
                total = record.total_bytes,
                "chunk acknowledged"
            );
        }
        (RequestKind::SendChunk, Err(err)) if canceling => {
            debug!(upload_id = %record.upload_id, error = %err, "chunk failed while canceling");
        }
        (RequestKind::SendChunk, Err(err)) => {
            fail(record, UploadFailure::remote(FailureStage::ChunkTransfer, err));
        }
        (RequestKind::FinalizeSession, Ok(TransportReply::Finalized { response_body })) => {
            // A commit that raced a cancel still stands.
            record.succeed(response_body);
            info!(
                upload_id = %record.upload_id,
                bytes = record.total_bytes,
                "upload succeeded"
            );
        }
        (RequestKind::FinalizeSession, Err(err)) if canceling => {
            debug!(upload_id = %record.upload_id, error = %err, "finalize failed while canceling");
            record.mark_canceled();
            info!(upload_id = %record.upload_id, "upload canceled");
        }
        (RequestKind::FinalizeSession, Err(err)) => {
            fail(record, UploadFailure::remote(FailureStage::Finalize, err));
        }
        (kind, Ok(reply)) => {
            fail(
                record,
                UploadFailure::local(
                    FailureStage::ChunkTransfer,
                    reason::CLIENT_UPLOAD_FILE_UNKNOWN,
                    format!("unexpected reply {reply:?} to {kind:?}"),
                ),
            );
        }
        (RequestKind::AbortSession, Err(_)) => {}
    }
}

/// Next chunk, or the finalize request once every byte is acknowledged.
fn next_request(record: &mut UploadRecord) -> Option<TransportRequest> {
    let Some(session_token) = record.session.as_ref().map(|s| s.token.clone()) else {
        fail(
            record,
            UploadFailure::local(
                FailureStage::Session,
                reason::CLIENT_UPLOAD_FILE_UNKNOWN,
                "no upload session",
            ),
        );
        return None;
    };

    if record.chunks_acked > 0 && record.bytes_transferred >= record.total_bytes {
        info!(upload_id = %record.upload_id, "all chunks acknowledged, finalizing");
        return Some(TransportRequest::FinalizeSession { session_token });
    }

    let total_bytes = record.total_bytes;
    let next = match record.reader.as_mut() {
        Some(reader) => reader.next_chunk(),
        None => Ok(None),
    };
    match next {
        Ok(Some(chunk)) => {
            debug!(
                upload_id = %record.upload_id,
                offset = chunk.offset,
                bytes = chunk.len(),
                "sending chunk"
            );
            Some(TransportRequest::SendChunk {
                session_token,
                offset: chunk.offset,
                data: chunk.data,
                checksum: chunk.checksum,
            })
        }
        Ok(None) if total_bytes == 0 => Some(TransportRequest::SendChunk {
            session_token,
            offset: 0,
            data: Vec::new(),
            checksum: checksum_bytes(&[]),
        }),
        Ok(None) => {
            let message = format!(
                "file ended at {} of {total_bytes} bytes",
                record.bytes_transferred
            );
            fail(
                record,
                UploadFailure::local(
                    FailureStage::LocalRead,
                    reason::CLIENT_UPLOAD_FILE_UNKNOWN,
                    message,
                ),
            );
            None
        }
        Err(e) => {
            fail(
                record,
                UploadFailure::local(
                    FailureStage::LocalRead,
                    reason::CLIENT_UPLOAD_FILE_UNKNOWN,
                    e.to_string(),
                ),
            );
            None
        }
    }
}

fn finish_cancel(record: &mut UploadRecord) -> Option<TransportRequest> {
    let abort = abort_request(record);
    record.mark_canceled();
    info!(
        upload_id = %record.upload_id,
        bytes = record.bytes_transferred,
        "upload canceled"
    );
    abort
}

fn abort_request(record: &UploadRecord) -> Option<TransportRequest> {
    record
        .session
        .as_ref()
        .map(|s| TransportRequest::AbortSession {
            session_token: s.token.clone(),
        })
}

/// Fails a streaming upload that has acknowledged nothing for a full
/// [`watchdog_window`](UploadSettings::watchdog_window) and whose
/// throughput over that window is below the threshold.
///
/// A finalize in flight is left to the transport timeout; the commit may
/// already be on its way.
fn check_watchdog(record: &mut UploadRecord, settings: &UploadSettings, now: Instant) -> bool {
    let window = settings.watchdog_window();
    if record.state != UploadState::InProgress || window.is_zero() {
        return false;
    }
    if record
        .in_flight
        .as_ref()
        .is_some_and(|f| f.kind == RequestKind::FinalizeSession)
    {
        return false;
    }
    if record.chunks_acked > 0 && record.bytes_transferred >= record.total_bytes {
        return false;
    }
    let Some(last_progress) = record.last_progress_at.or(record.started_at) else {
        return false;
    };
    if now.saturating_duration_since(last_progress) < window {
        return false;
    }

    let rate = record.speed.rate_over_window(now);
    if rate >= settings.low_transfer_rate_threshold as f64 {
        return false;
    }
    fail(
        record,
        UploadFailure::local(
            FailureStage::TimedOut,
            reason::CLIENT_UPLOAD_FILE_TIMED_OUT,
            format!(
                "transfer rate {rate:.1} B/s below {} B/s for {}s",
                settings.low_transfer_rate_threshold,
                window.as_secs()
            ),
        ),
    );
    true
}

fn fail(record: &mut UploadRecord, failure: UploadFailure) {
    warn!(
        upload_id = %record.upload_id,
        stage = ?failure.stage,
        status = failure.status_code,
        reason = failure.reason_code,
        error = %failure.message,
        "upload failed"
    );
    record.fail(failure);
}
