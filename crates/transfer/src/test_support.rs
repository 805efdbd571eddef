//! In-memory upload server for engine tests.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::transport::{RemoteError, ReplySender, Transport, TransportReply, TransportRequest};

/// A request as the server saw it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Begin { filename: String },
    Chunk { token: String, offset: i64, len: usize },
    Finalize { token: String },
    Abort { token: String },
}

#[derive(Debug)]
struct Session {
    filename: String,
    received: i64,
    outstanding: bool,
}

#[derive(Default)]
struct State {
    hold: bool,
    calls: Vec<Call>,
    held: Vec<(TransportRequest, ReplySender)>,
    sessions: HashMap<String, Session>,
    committed: Vec<String>,
    violations: Vec<String>,
    next_session: u32,
    fail_begin: Option<RemoteError>,
    fail_chunk_at: Option<(i64, RemoteError)>,
    fail_finalize: Option<RemoteError>,
    drop_next: bool,
    skew_acks: bool,
}

/// Answers requests immediately, or holds them until
/// [`release_all`](Self::release_all) when built with [`holding`](Self::holding).
#[derive(Default)]
pub(crate) struct FakeServer {
    state: Mutex<State>,
}

impl FakeServer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn holding() -> Self {
        let server = Self::default();
        server.state.lock().unwrap().hold = true;
        server
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// File names committed by a successful finalize.
    pub(crate) fn committed(&self) -> Vec<String> {
        self.state.lock().unwrap().committed.clone()
    }

    /// Chunks submitted while the same session still had one outstanding.
    pub(crate) fn violations(&self) -> Vec<String> {
        self.state.lock().unwrap().violations.clone()
    }

    pub(crate) fn fail_begin(&self, err: RemoteError) {
        self.state.lock().unwrap().fail_begin = Some(err);
    }

    pub(crate) fn fail_chunk_at(&self, offset: i64, err: RemoteError) {
        self.state.lock().unwrap().fail_chunk_at = Some((offset, err));
    }

    pub(crate) fn fail_finalize(&self, err: RemoteError) {
        self.state.lock().unwrap().fail_finalize = Some(err);
    }

    /// Drops the next reply handle without answering.
    pub(crate) fn drop_next_reply(&self) {
        self.state.lock().unwrap().drop_next = true;
    }

    /// Acknowledges one byte more than received.
    pub(crate) fn skew_acks(&self) {
        self.state.lock().unwrap().skew_acks = true;
    }

    /// Answers every held request in submission order.
    pub(crate) fn release_all(&self) {
        let held = std::mem::take(&mut self.state.lock().unwrap().held);
        for (request, reply) in held {
            let result = self.state.lock().unwrap().answer(request);
            reply.send(result);
        }
    }
}

impl Transport for FakeServer {
    fn submit(&self, request: TransportRequest, reply: ReplySender) {
        let mut state = self.state.lock().unwrap();
        state.record(&request);
        if state.drop_next {
            state.drop_next = false;
            drop(state);
            drop(reply);
            return;
        }
        if state.hold {
            state.held.push((request, reply));
            return;
        }
        let result = state.answer(request);
        drop(state);
        reply.send(result);
    }
}

impl State {
    fn record(&mut self, request: &TransportRequest) {
        let call = match request {
            TransportRequest::BeginSession { cloud_filename, .. } => Call::Begin {
                filename: cloud_filename.clone(),
            },
            TransportRequest::SendChunk {
                session_token,
                offset,
                data,
                ..
            } => {
                if let Some(session) = self.sessions.get_mut(session_token) {
                    if session.outstanding {
                        self.violations.push(format!(
                            "chunk at {offset} sent before previous ack on {session_token}"
                        ));
                    }
                    session.outstanding = true;
                }
                Call::Chunk {
                    token: session_token.clone(),
                    offset: *offset,
                    len: data.len(),
                }
            }
            TransportRequest::FinalizeSession { session_token } => Call::Finalize {
                token: session_token.clone(),
            },
            TransportRequest::AbortSession { session_token } => Call::Abort {
                token: session_token.clone(),
            },
        };
        self.calls.push(call);
    }

    fn answer(&mut self, request: TransportRequest) -> Result<TransportReply, RemoteError> {
        match request {
            TransportRequest::BeginSession { cloud_filename, .. } => {
                if let Some(err) = self.fail_begin.take() {
                    return Err(err);
                }
                self.next_session += 1;
                let token = format!("session-{}", self.next_session);
                self.sessions.insert(
                    token.clone(),
                    Session {
                        filename: cloud_filename,
                        received: 0,
                        outstanding: false,
                    },
                );
                Ok(TransportReply::SessionStarted {
                    cloud_file_id: format!("file-{}", self.next_session),
                    session_token: token,
                })
            }
            TransportRequest::SendChunk {
                session_token,
                offset,
                data,
                ..
            } => {
                let skew = i64::from(self.skew_acks);
                let fail_here = self
                    .fail_chunk_at
                    .as_ref()
                    .is_some_and(|(at, _)| *at == offset);
                let Some(session) = self.sessions.get_mut(&session_token) else {
                    return Err(RemoteError::new(400, 40400, "unknown session"));
                };
                session.outstanding = false;
                if fail_here {
                    if let Some((_, err)) = self.fail_chunk_at.take() {
                        return Err(err);
                    }
                }
                if offset != session.received {
                    return Err(RemoteError::new(400, 40401, "offset mismatch"));
                }
                session.received += data.len() as i64;
                Ok(TransportReply::ChunkAccepted {
                    ack_offset: session.received + skew,
                })
            }
            TransportRequest::FinalizeSession { session_token } => {
                if let Some(err) = self.fail_finalize.take() {
                    return Err(err);
                }
                let Some(session) = self.sessions.remove(&session_token) else {
                    return Err(RemoteError::new(400, 40400, "unknown session"));
                };
                let body = serde_json::json!({
                    "status": 200,
                    "data": {
                        "fileDetails": {
                            "cloudFilename": session.filename,
                            "fileSize": session.received,
                        }
                    }
                })
                .to_string();
                self.committed.push(session.filename);
                Ok(TransportReply::Finalized {
                    response_body: body,
                })
            }
            TransportRequest::AbortSession { session_token } => {
                self.sessions.remove(&session_token);
                Ok(TransportReply::Aborted)
            }
        }
    }
}
