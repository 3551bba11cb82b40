//! WebSocket message dispatch. Decodes incoming text as an
//! [`InboundRequest`] and routes it to the credential store or the session
//! registry.
//!
//! Per-connection state machine:
//!
//! | State | Request | Effect |
//! |-------|---------|--------|
//! | any | sign-in ok | bind identity, reply `signin`/success |
//! | any | sign-in / sign-up failure | reply with the reason, state unchanged |
//! | any | sign-up ok | reply `signup`/success, no auto sign-in |
//! | authenticated | chat | broadcast `"{identity}: {text}"` |
//! | unauthenticated | chat | reply `error` |
//! | any | `null` frame | reply `error` |
//! | any | anything else | echo the raw frame back |

use std::sync::Arc;

use metrics::counter;
use parley_auth::{AuthError, CredentialStore};
use tracing::{debug, error, info, instrument, warn};

use super::broadcast::{BroadcastReport, SessionRegistry};
use super::connection::{ClientConnection, SessionState};
use crate::metrics::{AUTH_FAILURES_TOTAL, REQUESTS_TOTAL};
use crate::protocol::{
    self, ControlResponse, INVALID_FORMAT, InboundRequest, LOGIN_REQUIRED, ResponseKind,
    SAVE_FAILED, SIGNED_IN, SIGNED_UP,
};

/// What the router did with one inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A control response was sent back to the originating connection.
    Responded(ControlResponse),
    /// A chat line was fanned out to the live connection set.
    Broadcast(BroadcastReport),
    /// The frame was not a chat request and was echoed back.
    Echoed(String),
}

/// Routes decoded requests for every connection.
///
/// Holds shared handles only; per-connection state lives on the
/// [`ClientConnection`] passed to each call.
pub struct MessageRouter {
    store: Arc<CredentialStore>,
    sessions: Arc<SessionRegistry>,
    echo_to_sender: bool,
}

impl MessageRouter {
    /// Create a router. Chat broadcasts include the sender.
    pub fn new(store: Arc<CredentialStore>, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            store,
            sessions,
            echo_to_sender: true,
        }
    }

    /// Whether chat broadcasts are also delivered to the sending connection.
    #[must_use]
    pub fn with_echo_to_sender(mut self, echo: bool) -> Self {
        self.echo_to_sender = echo;
        self
    }

    /// The session registry this router broadcasts through.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// The credential store this router authenticates against.
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Handle one inbound text frame from `conn`.
    #[instrument(skip_all, fields(conn_id = %conn.id, kind))]
    pub async fn handle_message(&self, conn: &ClientConnection, raw: &str) -> RouteOutcome {
        let request = InboundRequest::decode(raw);
        let kind = request.kind();
        let _ = tracing::Span::current().record("kind", kind);
        counter!(REQUESTS_TOTAL, "kind" => kind).increment(1);
        debug!(kind, "dispatching request");

        self.dispatch(conn, request).await
    }

    /// Route an already-decoded request.
    pub async fn dispatch(&self, conn: &ClientConnection, request: InboundRequest) -> RouteOutcome {
        match request {
            InboundRequest::SignIn { identity, secret } => {
                self.sign_in(conn, identity, &secret).await
            }
            InboundRequest::SignUp { identity, secret } => self.sign_up(conn, &identity, &secret),
            InboundRequest::ChatMessage { text } => self.chat(conn, &text).await,
            InboundRequest::Invalid => respond(conn, ControlResponse::error(INVALID_FORMAT)),
            InboundRequest::Unrecognized { raw } => {
                debug!(len = raw.len(), "echoing unrecognized frame");
                let line = protocol::echo_line(&raw);
                if !conn.send_text(line.clone()) {
                    warn!(conn_id = %conn.id, "failed to enqueue echo (channel full or closed)");
                }
                RouteOutcome::Echoed(line)
            }
        }
    }

    async fn sign_in(
        &self,
        conn: &ClientConnection,
        identity: String,
        secret: &str,
    ) -> RouteOutcome {
        match self.store.verify(&identity, secret) {
            Ok(()) => {
                if !self.sessions.bind_identity(&conn.id, &identity).await {
                    warn!(
                        conn_id = %conn.id,
                        identity = %identity,
                        "sign-in on unregistered connection"
                    );
                }
                info!(conn_id = %conn.id, identity = %identity, "user signed in");
                respond(conn, ControlResponse::new(ResponseKind::Signin, true, SIGNED_IN))
            }
            Err(e) => {
                counter!(AUTH_FAILURES_TOTAL, "kind" => "signin").increment(1);
                debug!(conn_id = %conn.id, identity = %identity, reason = %e, "sign-in rejected");
                respond(conn, ControlResponse::new(ResponseKind::Signin, false, e.to_string()))
            }
        }
    }

    fn sign_up(&self, conn: &ClientConnection, identity: &str, secret: &str) -> RouteOutcome {
        match self.store.register(identity, secret) {
            Ok(()) => {
                info!(conn_id = %conn.id, identity, "new user registered");
                respond(conn, ControlResponse::new(ResponseKind::Signup, true, SIGNED_UP))
            }
            Err(e) => {
                counter!(AUTH_FAILURES_TOTAL, "kind" => "signup").increment(1);
                let message = if e.is_rejection() {
                    debug!(conn_id = %conn.id, identity, reason = %e, "sign-up rejected");
                    e.to_string()
                } else {
                    log_storage_failure(identity, &e);
                    SAVE_FAILED.to_string()
                };
                respond(conn, ControlResponse::new(ResponseKind::Signup, false, message))
            }
        }
    }

    async fn chat(&self, conn: &ClientConnection, text: &str) -> RouteOutcome {
        let identity = match conn.state() {
            SessionState::Authenticated(identity) => identity,
            SessionState::Unauthenticated => {
                return respond(conn, ControlResponse::error(LOGIN_REQUIRED));
            }
        };

        let line = protocol::chat_line(&identity, text);
        let report = if self.echo_to_sender {
            self.sessions.broadcast(&line).await
        } else {
            self.sessions.broadcast_except(&line, Some(conn.id.as_str())).await
        };
        info!(identity = %identity, recipients = report.recipients(), "[{identity}]: {text}");
        RouteOutcome::Broadcast(report)
    }
}

fn log_storage_failure(identity: &str, err: &AuthError) {
    error!(identity, error = %err, "failed to persist new user");
}

fn respond(conn: &ClientConnection, response: ControlResponse) -> RouteOutcome {
    if !conn.send_json(&response) {
        warn!(conn_id = %conn.id, "failed to enqueue response (channel full or closed)");
    }
    RouteOutcome::Responded(response)
}
