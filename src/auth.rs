//! Login strategies and the post-login liveness probe.
//!
//! Three strategies populate the shared [`SessionStore`]:
//!
//! - **Form**: POST JSON credentials to the auth service. The server can
//!   reject a login inside an HTTP 200 body (`"Code":1`), which must fail
//!   exactly like an HTTP-level rejection.
//! - **OAuth2**: client-credentials grant against an external token
//!   endpoint; the session is a bearer token, no cookies or CSRF.
//! - **NTLM**: GET the negotiate login route and let the transport carry
//!   the OS credentials; success is confirmed by the CSRF cookie landing in
//!   the jar.
//!
//! Cookie logins are followed by a ping probe with a short fixed backoff —
//! the server is sometimes not fully warm right after login.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::config::{ClientConfig, LoginMethod};
use crate::error::AuthError;
use crate::protocol::{AUTH_COOKIE_NAME, CSRF_TOKEN_NAME, TokenResponse};
use crate::retry::{RetryMode, RetryPolicy, retry};
use crate::session::{Credential, LoginProvider, Session, SessionStore};

const LOGIN_PATH: &str = "/ServiceModel/AuthService.svc/Login";
const NTLM_LOGIN_PATH: &str = "/Login/NuiLogin.aspx?ntlmlogin";
const PING_PATH: &str = "/0/ping";

const PING_ATTEMPTS: u32 = 3;
const PING_BACKOFF: Duration = Duration::from_secs(1);

/// Runs the configured login strategy and owns all session mutation.
pub struct Authenticator {
    http: reqwest::Client,
    store: Arc<SessionStore>,
    base_url: String,
    method: LoginMethod,
    skip_ping: bool,
    request_timeout: Duration,
}

impl Authenticator {
    pub(crate) fn new(
        http: reqwest::Client,
        store: Arc<SessionStore>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            http,
            store,
            base_url: config.base_url.clone(),
            method: config.login.clone(),
            // Net-core installations have no ping route.
            skip_ping: config.skip_ping || config.is_net_core,
            request_timeout: config.request_timeout,
        }
    }

    async fn form_login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let url = format!("{}{LOGIN_PATH}", self.base_url);
        let response = self
            .http
            .post(&url)
            .timeout(self.request_timeout)
            .json(&json!({ "UserName": username, "UserPassword": password }))
            .send()
            .await
            .map_err(|error| AuthError::Transport(error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| AuthError::Transport(error.to_string()))?;

        if !status.is_success() || login_soft_failed(&body) {
            return Err(AuthError::Rejected {
                user: username.to_owned(),
                base_url: self.base_url.clone(),
            });
        }
        if self.store.cookie(AUTH_COOKIE_NAME).is_none() {
            return Err(AuthError::MissingAuthCookie(AUTH_COOKIE_NAME));
        }

        self.ping_probe().await?;
        Ok(Session::new(Credential::FormCookie, self.store.csrf_token()))
    }

    async fn oauth_login(
        &self,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Session, AuthError> {
        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", "client_credentials"),
        ];
        let response = self
            .http
            .post(token_url)
            .timeout(self.request_timeout)
            .form(&params)
            .send()
            .await
            .map_err(|error| AuthError::Token(error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| AuthError::Token(error.to_string()))?;
        if !status.is_success() {
            return Err(AuthError::Token(format!("HTTP {}: {body}", status.as_u16())));
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|error| AuthError::Token(error.to_string()))?;
        Ok(Session::new(Credential::Bearer(token.access_token), None))
    }

    async fn ntlm_login(&self) -> Result<Session, AuthError> {
        let url = format!("{}{NTLM_LOGIN_PATH}", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|error| AuthError::Transport(error.to_string()))?;

        let status = response.status().as_u16();
        if status > 302 {
            return Err(AuthError::Handshake(status));
        }
        // The negotiate dance itself happens at the transport layer; the
        // CSRF cookie landing in the jar is what proves it worked.
        let csrf_token = self
            .store
            .csrf_token()
            .ok_or(AuthError::MissingAuthCookie(CSRF_TOKEN_NAME))?;

        self.ping_probe().await?;
        Ok(Session::new(Credential::NtlmCookie, Some(csrf_token)))
    }

    /// Probe the application after a cookie login. Retried a few times with
    /// a fixed pause; all attempts failing means the login is unusable.
    async fn ping_probe(&self) -> Result<(), AuthError> {
        if self.skip_ping {
            return Ok(());
        }
        let policy = RetryPolicy::new(PING_ATTEMPTS, PING_BACKOFF, RetryMode::Fixed);
        retry(&policy, || self.ping_once()).await.map_err(|error| {
            tracing::warn!(error = %error, "ping probe exhausted its attempts");
            AuthError::PingFailed
        })
    }

    async fn ping_once(&self) -> Result<(), AuthError> {
        let url = format!("{}{PING_PATH}", self.base_url);
        let mut request = self.http.get(&url).timeout(self.request_timeout);
        if let Some(token) = self.store.csrf_token() {
            request = request.header(CSRF_TOKEN_NAME, token);
        }
        let response = request
            .send()
            .await
            .map_err(|error| AuthError::Transport(error.to_string()))?;
        if !response.status().is_success() {
            return Err(AuthError::Transport(format!(
                "ping returned HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LoginProvider for Authenticator {
    async fn login(&self) -> Result<Session, AuthError> {
        match &self.method {
            LoginMethod::Form { username, password } => {
                self.form_login(username, password).await
            }
            LoginMethod::OAuth {
                token_url,
                client_id,
                client_secret,
            } => self.oauth_login(token_url, client_id, client_secret).await,
            LoginMethod::Ntlm => self.ntlm_login().await,
        }
    }
}

/// Application-level login rejection hidden inside a 200 response:
/// a JSON body whose `Code` field equals 1.
#[must_use]
pub fn login_soft_failed(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("Code").and_then(serde_json::Value::as_i64))
        == Some(1)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
