//! Shared session state: credential, cookie jar, CSRF token.
//!
//! Exactly one session is live per client instance. It is shared between the
//! caller's direct requests and the listener's internal ones, so refresh is
//! serialized: the store holds its lock across the login await, collapsing
//! two concurrent "session missing" triggers into a single login call.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use tokio::sync::Mutex;

use crate::error::AuthError;
use crate::protocol::CSRF_TOKEN_NAME;

/// Which credential mode the live session carries. Chosen by the login
/// strategy and fixed for the client's lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credential {
    /// Session cookie obtained through the form login.
    FormCookie,
    /// OAuth2 bearer token; no cookie or CSRF flow applies.
    Bearer(String),
    /// Session cookie harvested after an NTLM/negotiate handshake.
    NtlmCookie,
}

/// An authenticated session. Cookie state lives in the store's shared jar;
/// this value only carries the credential mode and the CSRF token observed
/// at login time.
#[derive(Clone, Debug)]
pub struct Session {
    credential: Credential,
    csrf_token: Option<String>,
}

impl Session {
    #[must_use]
    pub fn new(credential: Credential, csrf_token: Option<String>) -> Self {
        Self { credential, csrf_token }
    }

    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    #[must_use]
    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }
}

/// A login strategy. The production implementation is
/// [`crate::auth::Authenticator`]; tests inject counting fakes.
#[async_trait]
pub trait LoginProvider: Send + Sync {
    /// Authenticate from scratch and return the new session.
    async fn login(&self) -> Result<Session, AuthError>;
}

/// Owner of the live session and the cookie jar backing every request.
pub struct SessionStore {
    base_url: Url,
    jar: Arc<Jar>,
    session: Mutex<Option<Session>>,
}

impl SessionStore {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            jar: Arc::new(Jar::default()),
            session: Mutex::new(None),
        }
    }

    /// The jar shared with the HTTP client, so login responses populate it
    /// and later requests send it automatically.
    #[must_use]
    pub fn jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    /// Base address the jar is keyed on.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Return the live session, logging in through `provider` if there is
    /// none. The store's lock is held across the login so concurrent callers
    /// wait for one login instead of racing their own.
    ///
    /// # Errors
    ///
    /// Propagates the provider's [`AuthError`] unchanged.
    pub async fn get_or_login(&self, provider: &dyn LoginProvider) -> Result<Session, AuthError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }
        let session = provider.login().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    /// Drop the live session so the next request re-authenticates. Called on
    /// authorization failures and fatal socket disconnects.
    pub async fn invalidate(&self) {
        *self.session.lock().await = None;
    }

    /// Current value of a cookie in the jar for the base address.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        let header = self.jar.cookies(&self.base_url)?;
        let header = header.to_str().ok()?;
        let prefix = format!("{name}=");
        header
            .split("; ")
            .find_map(|pair| pair.strip_prefix(prefix.as_str()).map(str::to_owned))
    }

    /// Live CSRF token, read from the jar on every call so rotation on the
    /// server side is picked up. Absent cookie means no header gets sent.
    #[must_use]
    pub fn csrf_token(&self) -> Option<String> {
        self.cookie(CSRF_TOKEN_NAME)
    }

    /// Full `Cookie` header value for the base address, used when opening
    /// the websocket outside of the HTTP client.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        let header = self.jar.cookies(&self.base_url)?;
        header.to_str().ok().map(str::to_owned)
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
