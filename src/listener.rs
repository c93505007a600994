//! Push channel listener — connect/receive/reconnect state machine.
//!
//! DESIGN
//! ======
//! One dedicated task per client owns the socket, the receive buffer, and
//! the connection state; everything it learns is pushed out on a typed
//! event channel, so subscribers observe state transitions and messages in
//! exactly the order they happened (single writer, ordered channel).
//!
//! LIFECYCLE
//! =========
//! 1. `None → Connecting`: re-login through the shared session store, then
//!    (hub only) start the server-side log broadcast and negotiate a
//!    connection token.
//! 2. Open the socket (`→ Open`); hub sends the protocol handshake as its
//!    first outbound frame.
//! 3. Receive loop: text frames are decoded per variant and emitted; binary
//!    frames are ignored; a peer close or any receive fault emits the
//!    failure state, clears the buffer, sleeps a fixed second, and goes
//!    back to 1. Reconnects are unbounded by design — the channel is meant
//!    to stay up for the life of the process.
//! 4. Cancellation ends the loop; shutdown sends the hub stop-log call
//!    (failure logged, never fatal), closes the socket, and settles on
//!    `Closed`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::Method;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AuthError, ProtocolError, RequestError, SocketError};
use crate::executor::RequestExecutor;
use crate::protocol::{HUB_HANDSHAKE, InboundMessage, NegotiateResponse, Variant};
use crate::retry::{RetryMode, RetryPolicy};
use crate::session::{LoginProvider, SessionStore};
use crate::transport::{Socket, SocketConnector, SocketEvent};

/// Fixed pause between reconnect attempts. Deliberately constant and
/// uncapped: no jitter, no growth, no give-up.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Timeout for the listener's own control calls (negotiate, log broadcast).
const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

const START_LOG_PATH: &str = "/rest/ATFLogService/StartLogBroadcast";
const STOP_LOG_PATH: &str = "/rest/ATFLogService/ResetConfiguration";

/// Connection state of the push channel. Transitions are emitted as events
/// in the order they occur.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started, or torn down.
    None,
    /// Logging in, negotiating, opening the socket.
    Connecting,
    /// Socket open, receive loop running.
    Open,
    /// Peer closed the connection.
    Closed,
    /// Receive or connect fault.
    Aborted,
}

/// What the listener emits to its subscriber.
#[derive(Debug)]
pub enum ListenerEvent {
    /// The connection state changed.
    State(ConnectionState),
    /// One decoded inbound message. The subscriber owns it; the listener's
    /// buffer is reused for the next frame.
    Message(InboundMessage),
}

/// Handle to a running listener: the event stream plus shutdown control.
#[derive(Debug)]
pub struct ListenerHandle {
    events: mpsc::UnboundedReceiver<ListenerEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Next event, in emission order. `None` once the listener task has
    /// shut down and drained.
    pub async fn recv(&mut self) -> Option<ListenerEvent> {
        self.events.recv().await
    }

    /// Signal the loop to stop at its next iteration boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait for the task to finish its shutdown sequence.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// Everything the connect sequence can trip over. All of it means the same
/// thing to the loop: wait the backoff and try again.
#[derive(Debug, thiserror::Error)]
enum ConnectFailure {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("base URL is neither http nor https: {0}")]
    InvalidBaseUrl(String),
}

pub(crate) struct ListenerCore {
    base_url: String,
    variant: Variant,
    log_level: String,
    log_pattern: String,
    store: Arc<SessionStore>,
    login: Arc<dyn LoginProvider>,
    executor: Arc<RequestExecutor>,
    connector: Arc<dyn SocketConnector>,
    events: mpsc::UnboundedSender<ListenerEvent>,
    cancel: CancellationToken,
    state: ConnectionState,
    buffer: Vec<u8>,
}

impl ListenerCore {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        base_url: String,
        variant: Variant,
        log_level: String,
        log_pattern: String,
        store: Arc<SessionStore>,
        login: Arc<dyn LoginProvider>,
        executor: Arc<RequestExecutor>,
        connector: Arc<dyn SocketConnector>,
        events: mpsc::UnboundedSender<ListenerEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            base_url,
            variant,
            log_level,
            log_pattern,
            store,
            login,
            executor,
            connector,
            events,
            cancel,
            state: ConnectionState::None,
            buffer: Vec::new(),
        }
    }

    /// Spawn the receive loop on its own task. `running` is cleared when
    /// the loop exits so the owning client can start a new listener.
    pub(crate) fn spawn(
        self,
        events: mpsc::UnboundedReceiver<ListenerEvent>,
        running: Arc<AtomicBool>,
    ) -> ListenerHandle {
        let cancel = self.cancel.clone();
        let task = tokio::spawn(async move {
            self.run().await;
            running.store(false, Ordering::SeqCst);
        });
        ListenerHandle {
            events,
            cancel,
            task,
        }
    }

    async fn run(mut self) {
        let mut socket: Option<Box<dyn Socket>> = None;

        while !self.cancel.is_cancelled() {
            if socket.is_none() {
                match self.establish().await {
                    Ok(opened) => {
                        socket = Some(opened);
                        self.set_state(ConnectionState::Open);
                        info!(variant = ?self.variant, "push channel open");
                    }
                    Err(error) => {
                        warn!(error = %error, "push channel connect failed");
                        self.set_state(ConnectionState::Aborted);
                        self.backoff().await;
                        continue;
                    }
                }
            }
            let Some(open_socket) = socket.as_mut() else {
                continue;
            };

            let event = tokio::select! {
                () = self.cancel.cancelled() => break,
                event = open_socket.recv() => event,
            };

            match event {
                Ok(SocketEvent::Text(bytes)) => {
                    self.buffer.extend_from_slice(&bytes);
                    self.dispatch_frame();
                    self.buffer.clear();
                }
                Ok(SocketEvent::Binary(bytes)) => {
                    // Accepted as a protocol slot; nothing produces these.
                    debug!(len = bytes.len(), "ignoring binary frame");
                }
                Ok(SocketEvent::Closed) => {
                    if let Some(mut closed) = socket.take() {
                        closed.close().await;
                    }
                    self.set_state(ConnectionState::Closed);
                    self.buffer.clear();
                    self.backoff().await;
                }
                Err(error) => {
                    warn!(error = %error, "push channel receive failed");
                    socket = None;
                    self.set_state(ConnectionState::Aborted);
                    self.buffer.clear();
                    self.backoff().await;
                }
            }
        }

        self.shutdown(socket).await;
    }

    /// Full connect sequence: fresh login, hub control calls, socket open,
    /// hub handshake.
    async fn establish(&mut self) -> Result<Box<dyn Socket>, ConnectFailure> {
        self.set_state(ConnectionState::Connecting);
        self.buffer.clear();

        // The previous session is gone or suspect after any disconnect;
        // re-run the authenticator through the shared store so a concurrent
        // direct request does not trigger a second login.
        self.store.invalidate().await;
        self.store.get_or_login(self.login.as_ref()).await?;

        let url = match self.variant {
            Variant::Legacy => self.ws_url(None)?,
            Variant::Hub => {
                self.start_log_broadcast().await?;
                let negotiate = self.negotiate().await?;
                self.ws_url(Some(&negotiate.connection_token))?
            }
        };

        let cookie_header = self.store.cookie_header();
        let mut socket = self.connector.connect(&url, cookie_header).await?;
        if self.variant == Variant::Hub {
            socket.send_text(HUB_HANDSHAKE).await?;
        }
        Ok(socket)
    }

    /// Decode the assembled frame and emit its messages in wire order. A
    /// malformed frame is dropped with a warning; it never tears the
    /// connection down.
    fn dispatch_frame(&mut self) {
        match self.variant.decode_frame(&self.buffer) {
            Ok(messages) => {
                for message in messages {
                    let _ = self.events.send(ListenerEvent::Message(message));
                }
            }
            Err(error) => {
                warn!(error = %error, "dropping malformed frame");
            }
        }
    }

    async fn negotiate(&self) -> Result<NegotiateResponse, ConnectFailure> {
        let url = format!("{}/msg/negotiate?negotiateVersion=1", self.base_url);
        let body = self
            .executor
            .execute(
                Method::POST,
                &url,
                Some(String::new()),
                CONTROL_TIMEOUT,
                &RetryPolicy::default(),
            )
            .await?;
        Ok(NegotiateResponse::parse(&body)?)
    }

    /// Ask the server to broadcast its log over the push channel. The
    /// server may still be warming up right after login, hence the
    /// generous retry policy.
    async fn start_log_broadcast(&self) -> Result<(), ConnectFailure> {
        let url = format!("{}{START_LOG_PATH}", self.base_url);
        let payload = serde_json::json!({
            "logLevelStr": self.log_level,
            "bufferSize": 1,
            "loggerPattern": self.log_pattern,
        })
        .to_string();
        let policy = RetryPolicy::new(10, Duration::from_secs(3), RetryMode::Fixed);
        self.executor
            .execute(Method::POST, &url, Some(payload), CONTROL_TIMEOUT, &policy)
            .await?;
        info!("log broadcast started");
        Ok(())
    }

    /// Best-effort teardown call. A failure here is logged and swallowed;
    /// it must never block shutdown.
    async fn stop_log_broadcast(&self) {
        let url = format!("{}{STOP_LOG_PATH}", self.base_url);
        let result = self
            .executor
            .execute(
                Method::POST,
                &url,
                Some(String::new()),
                CONTROL_TIMEOUT,
                &RetryPolicy::default(),
            )
            .await;
        match result {
            Ok(_) => info!("log broadcast stopped"),
            Err(error) => warn!(error = %error, "failed to stop log broadcast during shutdown"),
        }
    }

    async fn shutdown(&mut self, socket: Option<Box<dyn Socket>>) {
        if self.variant == Variant::Hub {
            self.stop_log_broadcast().await;
        }
        if let Some(mut open) = socket {
            open.close().await;
        }
        self.buffer.clear();
        self.set_state(ConnectionState::Closed);
        info!("push channel listener stopped");
    }

    /// Sleep the reconnect backoff, returning early on cancellation.
    async fn backoff(&self) {
        tokio::select! {
            () = self.cancel.cancelled() => {}
            () = tokio::time::sleep(RECONNECT_BACKOFF) => {}
        }
    }

    /// Record and emit a state transition; repeats are collapsed so
    /// subscribers only see changes.
    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        self.state = next;
        let _ = self.events.send(ListenerEvent::State(next));
    }

    fn ws_url(&self, connection_token: Option<&str>) -> Result<String, ConnectFailure> {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else {
            return Err(ConnectFailure::InvalidBaseUrl(self.base_url.clone()));
        };

        Ok(match connection_token {
            None => format!("{ws_base}{}", self.variant.socket_path()),
            Some(token) => format!("{ws_base}{}?id={token}", self.variant.socket_path()),
        })
    }
}

#[cfg(test)]
#[path = "listener_test.rs"]
mod tests;
