//! Error taxonomy for the client.
//!
//! Four concerns, four types: authentication ([`AuthError`]), request
//! execution ([`RequestError`]), wire decoding ([`ProtocolError`]), and the
//! raw socket ([`SocketError`]). Retry exhaustion propagates the *last*
//! attempt's error unchanged so callers keep the original status code and
//! body for diagnostics.

/// Authentication failed. Fatal to the current login attempt; the push
/// channel listener treats it as a reconnect trigger, direct callers see it
/// as-is.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Credentials rejected — either an HTTP-level rejection or the
    /// soft-fail code embedded in a nominally successful response body.
    #[error("unauthorized {user} for {base_url}")]
    Rejected { user: String, base_url: String },
    /// NTLM/negotiate handshake ended with an unexpected HTTP status.
    #[error("ntlm handshake failed with status {0}")]
    Handshake(u16),
    /// Login reported success but the expected session cookie never showed
    /// up in the jar.
    #[error("login response did not set the `{0}` cookie")]
    MissingAuthCookie(&'static str),
    /// OAuth2 token endpoint failure (transport, status, or parse).
    #[error("token exchange failed: {0}")]
    Token(String),
    /// The liveness probe after login never came up.
    #[error("application did not answer the ping probe after login")]
    PingFailed,
    /// Transport-level failure during a login call.
    #[error("login request failed: {0}")]
    Transport(String),
}

/// A request through the resilient executor failed after its retry policy
/// was exhausted.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Network or protocol failure below HTTP.
    #[error("request transport failed: {0}")]
    Transport(String),
    /// Non-success HTTP status; carries the raw response body verbatim.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// Lazy login on first use failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Local file I/O during a download or upload helper.
    #[error("file transfer I/O failed: {0}")]
    Io(String),
}

/// An inbound frame (or a control-call response) could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("negotiate response carried no connection token")]
    MissingToken,
}

/// Raw websocket transport failure. Inside the listener this is only ever a
/// reconnect trigger, never fatal.
#[derive(Debug, thiserror::Error)]
#[error("socket transport failed: {0}")]
pub struct SocketError(pub String);

/// The client could not be constructed from its configuration.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid base URL `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("failed to build the HTTP client: {0}")]
    HttpClient(String),
}

/// The push channel listener could not be started.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// One receive loop per client instance; a second concurrent start is a
    /// caller bug.
    #[error("push channel listener is already running for this client")]
    AlreadyRunning,
}
