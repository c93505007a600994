//! Client facade: one object wiring together the session store, the login
//! strategy, the resilient executor, and the push channel listener.
//!
//! Construction is cheap and does no I/O. The first request (or an explicit
//! [`Client::login`]) authenticates; afterwards the session is reused until
//! the server revokes it, at which point the executor re-authenticates
//! transparently.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::{Method, Url};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::auth::Authenticator;
use crate::config::ClientConfig;
use crate::error::{AuthError, BuildError, ListenerError, RequestError};
use crate::executor::RequestExecutor;
use crate::files;
use crate::listener::{ListenerCore, ListenerHandle};
use crate::retry::RetryPolicy;
use crate::session::{LoginProvider, SessionStore};
use crate::transport::TungsteniteConnector;

/// Workspace segment used by configuration service routes.
const WORKSPACE: &str = "0";

pub struct Client {
    config: ClientConfig,
    store: Arc<SessionStore>,
    authenticator: Arc<Authenticator>,
    executor: Arc<RequestExecutor>,
    listening: Arc<AtomicBool>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Build a client from its configuration. No network traffic happens
    /// here; the login runs lazily on first use.
    ///
    /// # Errors
    ///
    /// [`BuildError`] if the base URL does not parse or the HTTP client
    /// cannot be constructed.
    pub fn new(config: ClientConfig) -> Result<Self, BuildError> {
        let base_url = Url::parse(&config.base_url).map_err(|error| BuildError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: error.to_string(),
        })?;
        let store = Arc::new(SessionStore::new(base_url));

        let http = reqwest::Client::builder()
            .cookie_provider(store.jar())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|error| BuildError::HttpClient(error.to_string()))?;

        let authenticator = Arc::new(Authenticator::new(
            http.clone(),
            Arc::clone(&store),
            &config,
        ));
        let login: Arc<dyn LoginProvider> = Arc::clone(&authenticator) as Arc<dyn LoginProvider>;
        let executor = Arc::new(RequestExecutor::new(http, Arc::clone(&store), login));

        Ok(Self {
            config,
            store,
            authenticator,
            executor,
            listening: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Application root this client talks to, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Force a fresh login now, replacing any live session.
    ///
    /// # Errors
    ///
    /// The login strategy's [`AuthError`].
    pub async fn login(&self) -> Result<(), AuthError> {
        self.store.invalidate().await;
        self.store
            .get_or_login(self.authenticator.as_ref())
            .await
            .map(|_| ())
    }

    /// GET an absolute URL under the session, using the configured retry
    /// policy and timeout.
    ///
    /// # Errors
    ///
    /// The last attempt's [`RequestError`] once the policy is exhausted.
    pub async fn execute_get(&self, url: &str) -> Result<String, RequestError> {
        self.executor
            .execute(
                Method::GET,
                url,
                None,
                self.config.request_timeout,
                &self.config.retry,
            )
            .await
    }

    /// POST a JSON body to an absolute URL under the session.
    ///
    /// # Errors
    ///
    /// The last attempt's [`RequestError`] once the policy is exhausted.
    pub async fn execute_post(&self, url: &str, body: &str) -> Result<String, RequestError> {
        self.executor
            .execute(
                Method::POST,
                url,
                Some(body.to_owned()),
                self.config.request_timeout,
                &self.config.retry,
            )
            .await
    }

    /// Same as [`Client::execute_post`] with an explicit retry policy for
    /// this one call.
    ///
    /// # Errors
    ///
    /// The last attempt's [`RequestError`] once the policy is exhausted.
    pub async fn execute_post_with_retry(
        &self,
        url: &str,
        body: &str,
        policy: &RetryPolicy,
    ) -> Result<String, RequestError> {
        self.executor
            .execute(
                Method::POST,
                url,
                Some(body.to_owned()),
                self.config.request_timeout,
                policy,
            )
            .await
    }

    /// Invoke a configuration service method:
    /// `POST {base}/0/rest/{service}/{method}` with a JSON body.
    ///
    /// # Errors
    ///
    /// The last attempt's [`RequestError`] once the policy is exhausted.
    pub async fn call_configuration_service(
        &self,
        service: &str,
        method: &str,
        body: &str,
    ) -> Result<String, RequestError> {
        let url = configuration_service_url(&self.config.base_url, service, method);
        self.execute_post(&url, body).await
    }

    /// POST `body` to `url` and stream the response into the file at `path`.
    ///
    /// # Errors
    ///
    /// [`RequestError::Io`] for local file failures, otherwise the request's
    /// own error.
    pub async fn download_file(
        &self,
        url: &str,
        path: &Path,
        body: Option<String>,
    ) -> Result<(), RequestError> {
        files::download_file(&self.executor, url, path, body, self.config.request_timeout).await
    }

    /// Upload the file at `path` as a single multipart request.
    ///
    /// # Errors
    ///
    /// [`RequestError::Io`] for local file failures, otherwise the request's
    /// own error.
    pub async fn upload_file(&self, url: &str, path: &Path) -> Result<String, RequestError> {
        files::upload_file(&self.executor, url, path, self.config.request_timeout).await
    }

    /// Upload the file at `path` in sequential `Content-Range` chunks of
    /// `chunk_size` bytes (1 MiB when `None`). Each chunk retries under the
    /// configured policy.
    ///
    /// # Errors
    ///
    /// [`RequestError::Io`] for local file failures, otherwise the request's
    /// own error.
    pub async fn upload_file_by_chunks(
        &self,
        url: &str,
        path: &Path,
        chunk_size: Option<usize>,
    ) -> Result<String, RequestError> {
        files::upload_file_by_chunks(
            &self.executor,
            url,
            path,
            chunk_size.unwrap_or(files::DEFAULT_CHUNK_SIZE),
            self.config.request_timeout,
            &self.config.retry,
        )
        .await
    }

    /// Start the push channel listener and return its handle. At most one
    /// listener runs per client; the slot frees up once a previous listener
    /// has fully stopped.
    ///
    /// # Errors
    ///
    /// [`ListenerError::AlreadyRunning`] if a listener is still live.
    pub fn start_listening(&self) -> Result<ListenerHandle, ListenerError> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(ListenerError::AlreadyRunning);
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let core = ListenerCore::new(
            self.config.base_url.clone(),
            self.config.variant,
            self.config.log_level.clone(),
            self.config.log_pattern.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.authenticator) as Arc<dyn LoginProvider>,
            Arc::clone(&self.executor),
            Arc::new(TungsteniteConnector),
            sender,
            CancellationToken::new(),
        );
        Ok(core.spawn(receiver, Arc::clone(&self.listening)))
    }
}

/// `{base}/0/rest/{service}/{method}`
fn configuration_service_url(base_url: &str, service: &str, method: &str) -> String {
    format!("{base_url}/{WORKSPACE}/rest/{service}/{method}")
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
