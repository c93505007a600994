//! Client configuration.
//!
//! Built either programmatically (builder-style methods) or from `BPM_*`
//! environment variables. The config is immutable once the client is
//! constructed; in particular the wire [`Variant`] and the login strategy
//! are fixed for the client's lifetime.

use std::time::Duration;

use crate::protocol::Variant;
use crate::retry::RetryPolicy;

/// Default per-request timeout (the historical 100 000 ms).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(100_000);

/// Which login strategy the authenticator runs.
#[derive(Clone, Debug)]
pub enum LoginMethod {
    /// JSON form login against the application's auth service.
    Form { username: String, password: String },
    /// OAuth2 client-credentials grant against an external token endpoint.
    OAuth {
        token_url: String,
        client_id: String,
        client_secret: String,
    },
    /// NTLM/negotiate handshake with OS-level credentials on the transport.
    Ntlm,
}

/// Everything the client needs to know, fixed at construction.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Application root, no trailing slash.
    pub base_url: String,
    pub login: LoginMethod,
    /// Wire framing for the push channel.
    pub variant: Variant,
    /// Default retry policy for direct requests.
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    /// Skip the post-login liveness probe.
    pub skip_ping: bool,
    /// Net-core targets use the hub push protocol and never answer the ping
    /// route, so the probe is skipped for them as well.
    pub is_net_core: bool,
    /// Disable TLS certificate verification. Off by default; only for
    /// development installations with self-signed certificates.
    pub accept_invalid_certs: bool,
    /// Log level requested from the server-side log broadcast (hub only).
    pub log_level: String,
    /// Logger name pattern for the log broadcast (hub only).
    pub log_pattern: String,
}

impl ClientConfig {
    /// Config with defaults: legacy variant, single-attempt retry policy,
    /// 100s request timeout, probe enabled.
    #[must_use]
    pub fn new(base_url: &str, login: LoginMethod) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            login,
            variant: Variant::Legacy,
            retry: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            skip_ping: false,
            is_net_core: false,
            accept_invalid_certs: false,
            log_level: "All".to_owned(),
            log_pattern: String::new(),
        }
    }

    /// Target a net-core installation: hub push protocol, no ping probe.
    #[must_use]
    pub fn net_core(mut self) -> Self {
        self.is_net_core = true;
        self.variant = Variant::Hub;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn skip_ping(mut self) -> Self {
        self.skip_ping = true;
        self
    }

    #[must_use]
    pub fn accept_invalid_certs(mut self) -> Self {
        self.accept_invalid_certs = true;
        self
    }

    /// Level and logger pattern forwarded to the server-side log broadcast.
    #[must_use]
    pub fn with_log_filter(mut self, level: &str, pattern: &str) -> Self {
        self.log_level = level.to_owned();
        self.log_pattern = pattern.to_owned();
        self
    }

    /// Load a form-login config from `BPM_URL`, `BPM_USER`, `BPM_PASSWORD`.
    /// `BPM_NET_CORE=1` switches to the net-core profile. Returns `None`
    /// when any required variable is missing.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("BPM_URL").ok()?;
        let username = std::env::var("BPM_USER").ok()?;
        let password = std::env::var("BPM_PASSWORD").ok()?;

        let config = Self::new(&base_url, LoginMethod::Form { username, password });
        let net_core = std::env::var("BPM_NET_CORE")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Some(if net_core { config.net_core() } else { config })
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
