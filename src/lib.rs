//! Async client for a BPM application server.
//!
//! The crate covers three concerns:
//!
//! - **Authentication**: form, OAuth2 client-credentials, or NTLM login
//!   populating one shared session per [`Client`], refreshed transparently
//!   when the server revokes it.
//! - **Requests**: GET/POST plus file transfer helpers, all routed through a
//!   retrying executor that injects the session's credential (cookie jar +
//!   CSRF header, or bearer token) on every attempt.
//! - **Push channel**: an auto-reconnecting websocket listener speaking
//!   either the legacy one-message-per-frame protocol or the hub protocol
//!   (negotiate, handshake, `0x1E`-delimited envelopes), emitting decoded
//!   messages and connection state transitions on an ordered event stream.
//!
//! ```no_run
//! use bpmclient::{Client, ClientConfig, ListenerEvent, LoginMethod};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new(
//!     "https://bpm.example.com",
//!     LoginMethod::Form {
//!         username: "Supervisor".into(),
//!         password: "Supervisor".into(),
//!     },
//! );
//! let client = Client::new(config)?;
//!
//! let reply = client
//!     .call_configuration_service("UsrGreeterService", "Hello", "{}")
//!     .await?;
//! println!("{reply}");
//!
//! let mut listener = client.start_listening()?;
//! while let Some(event) = listener.recv().await {
//!     if let ListenerEvent::Message(message) = event {
//!         println!("{}: {}", message.sender, message.body);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod listener;
pub mod protocol;
pub mod retry;
pub mod session;

mod files;
mod transport;

pub use client::Client;
pub use config::{ClientConfig, DEFAULT_REQUEST_TIMEOUT, LoginMethod};
pub use error::{AuthError, BuildError, ListenerError, ProtocolError, RequestError, SocketError};
pub use executor::RequestExecutor;
pub use listener::{ConnectionState, ListenerEvent, ListenerHandle};
pub use protocol::{InboundMessage, Variant};
pub use retry::{RetryMode, RetryPolicy};
pub use session::{Credential, LoginProvider, Session, SessionStore};
