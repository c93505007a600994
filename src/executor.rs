//! Resilient request executor.
//!
//! Every outbound call — the caller's direct requests and the listener's
//! internal negotiate/log-control calls — goes through here. The executor
//! attaches exactly one credential mode per call (bearer header if the
//! session is a token, otherwise the cookie jar plus the CSRF header),
//! retries per the supplied [`RetryPolicy`], and after exhaustion propagates
//! the last failure unchanged.
//!
//! The executor never mutates the session itself; an authorization failure
//! only asks the store to invalidate, so the next attempt re-authenticates
//! through the store's single-flight login.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};

use crate::error::RequestError;
use crate::protocol::CSRF_TOKEN_NAME;
use crate::retry::{RetryPolicy, retry};
use crate::session::{Credential, LoginProvider, SessionStore};

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

pub struct RequestExecutor {
    http: reqwest::Client,
    store: Arc<SessionStore>,
    login: Arc<dyn LoginProvider>,
}

impl RequestExecutor {
    pub(crate) fn new(
        http: reqwest::Client,
        store: Arc<SessionStore>,
        login: Arc<dyn LoginProvider>,
    ) -> Self {
        Self { http, store, login }
    }

    /// Execute one GET or POST under the current session, lazily logging in
    /// first if no session is live.
    ///
    /// # Errors
    ///
    /// After the policy is exhausted, the error of the last attempt is
    /// returned as-is: [`RequestError::Status`] keeps the response body
    /// verbatim for the caller's diagnostics.
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<String>,
        timeout: Duration,
        policy: &RetryPolicy,
    ) -> Result<String, RequestError> {
        retry(policy, || {
            self.execute_once(method.clone(), url, body.as_deref(), timeout)
        })
        .await
    }

    async fn execute_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
        timeout: Duration,
    ) -> Result<String, RequestError> {
        let mut request = self.authenticated_builder(method, url).await?.timeout(timeout);
        if let Some(data) = body {
            request = request
                .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
                .body(data.to_owned());
        }
        let response = self.dispatch(request).await?;
        response
            .text()
            .await
            .map_err(|error| RequestError::Transport(error.to_string()))
    }

    /// Build a request with the session's credential attached. The cookie
    /// jar rides on the underlying HTTP client, so cookie sessions only add
    /// the CSRF header here. Upload/download helpers use this to put their
    /// own bodies on an authenticated request.
    pub(crate) async fn authenticated_builder(
        &self,
        method: Method,
        url: &str,
    ) -> Result<reqwest::RequestBuilder, RequestError> {
        let session = self.store.get_or_login(self.login.as_ref()).await?;
        let mut request = self.http.request(method, url);
        match session.credential() {
            Credential::Bearer(token) => {
                request = request.bearer_auth(token);
            }
            Credential::FormCookie | Credential::NtlmCookie => {
                if let Some(token) = self.store.csrf_token() {
                    request = request.header(CSRF_TOKEN_NAME, token);
                }
            }
        }
        Ok(request)
    }

    /// Send a built request and surface non-success statuses as errors. An
    /// authorization failure additionally clears the session so the next
    /// attempt logs in again.
    pub(crate) async fn dispatch(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, RequestError> {
        let response = request
            .send()
            .await
            .map_err(|error| RequestError::Transport(error.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.store.invalidate().await;
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RequestError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;
