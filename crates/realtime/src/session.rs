//! The session handle: `connect()` / `disconnect()` and the event loop.

use crate::credential::CredentialFetcher;
use crate::dispatch::{EventDispatcher, SessionCallbacks};
use crate::error::RealtimeError;
use crate::transport::{ServerEvents, Transport, TransportOptions};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// One voice call: owns the credential fetcher, the transport and the
/// speaking-state flags. At most one connection is active per value;
/// `connect()` while active fails with [`RealtimeError::AlreadyActive`].
///
/// The microphone stream and the transport belong exclusively to this
/// handle and are released on [`Session::disconnect`] or drop.
pub struct Session {
    fetcher: CredentialFetcher,
    options: TransportOptions,
    dispatcher: Arc<Mutex<EventDispatcher>>,
    cancel: CancellationToken,
    active: Option<ActiveSession>,
}

struct ActiveSession {
    transport: Transport,
    event_loop: JoinHandle<()>,
}

impl Session {
    pub fn new(
        token_endpoint: impl Into<String>,
        options: TransportOptions,
        callbacks: SessionCallbacks,
    ) -> Self {
        Self {
            fetcher: CredentialFetcher::new(token_endpoint),
            options,
            dispatcher: Arc::new(Mutex::new(EventDispatcher::new(callbacks))),
            cancel: CancellationToken::new(),
            active: None,
        }
    }

    /// Token that aborts an in-flight `connect()` from another task.
    /// Grab a clone before spawning the connect; `disconnect()` cancels
    /// and re-arms it.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    /// Brings the session up: credential fetch, then transport open, then
    /// event-loop attachment, strictly in that order. The first failure
    /// aborts the sequence and nothing stays partially running; whatever
    /// the transport had already acquired is released when its future is
    /// dropped or the error propagates.
    ///
    /// Nothing is retried here. The caller surfaces the error and may call
    /// `connect()` again.
    pub async fn connect(&mut self) -> Result<(), RealtimeError> {
        if self.active.is_some() {
            return Err(RealtimeError::AlreadyActive);
        }
        if self.cancel.is_cancelled() {
            // disconnect() re-arms the token itself; this covers a caller
            // cancelling the token directly between attempts.
            self.cancel = CancellationToken::new();
        }
        let cancel = self.cancel.clone();

        let credential = tokio::select! {
            _ = cancel.cancelled() => return Err(RealtimeError::Cancelled),
            result = self.fetcher.fetch() => result?,
        };

        let (transport, stream) = tokio::select! {
            _ = cancel.cancelled() => return Err(RealtimeError::Cancelled),
            result = Transport::open(&credential, &self.options) => result?,
        };

        let event_loop = tokio::spawn(run_event_loop(stream, self.dispatcher.clone(), cancel));
        self.active = Some(ActiveSession {
            transport,
            event_loop,
        });
        info!("realtime session connected");
        Ok(())
    }

    /// Tears the session down: cancels any in-flight `connect()`, stops
    /// the event loop, closes the transport (releasing the microphone) and
    /// clears the speaking flags without firing callbacks. Safe to call
    /// any number of times; repeat calls are no-ops.
    pub async fn disconnect(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        if let Some(mut active) = self.active.take() {
            active.event_loop.abort();
            active.transport.close();
            info!("realtime session disconnected");
        }
        self.dispatcher.lock().await.clear();
    }
}

async fn run_event_loop(
    stream: ServerEvents,
    dispatcher: Arc<Mutex<EventDispatcher>>,
    cancel: CancellationToken,
) {
    let ServerEvents {
        mut events,
        mut levels,
    } = stream;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                dispatcher.lock().await.handle(&event);
            }
            changed = levels.changed() => {
                if changed.is_err() {
                    break;
                }
                let level = *levels.borrow_and_update();
                dispatcher.lock().await.level(level);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_against(endpoint: String) -> Session {
        Session::new(endpoint, TransportOptions::default(), SessionCallbacks::new())
    }

    #[tokio::test]
    async fn credential_failure_rejects_connect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/realtime-session"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut session = session_against(format!("{}/api/realtime-session", server.uri()));
        let error = session.connect().await.unwrap_err();

        // The credential step runs before any media access, so the failure
        // kind must be Credential even on a machine with no audio devices.
        assert!(matches!(error, RealtimeError::Credential(_)));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn cancellation_aborts_an_inflight_connect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/realtime-session"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"client_secret": "ek_test"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let mut session = session_against(format!("{}/api/realtime-session", server.uri()));
        let token = session.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let error = session.connect().await.unwrap_err();
        assert!(matches!(error, RealtimeError::Cancelled));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_without_a_connection() {
        let mut session = session_against("http://127.0.0.1:9/api/realtime-session".to_string());
        session.disconnect().await;
        session.disconnect().await;
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn connect_after_disconnect_uses_a_fresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/realtime-session"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut session = session_against(format!("{}/api/realtime-session", server.uri()));
        session.disconnect().await;

        // The re-armed token must not make the next attempt look cancelled.
        let error = session.connect().await.unwrap_err();
        assert!(matches!(error, RealtimeError::Credential(_)));
    }
}
