//! Socket transport seam for the push channel.
//!
//! The listener only ever talks to these two traits, so tests drive the
//! whole connect/receive/reconnect machine with scripted fakes while
//! production uses tungstenite over the authenticated session's cookies.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::SocketError;

/// One received socket event. Ping/pong stay below this surface.
#[derive(Debug)]
pub(crate) enum SocketEvent {
    /// Complete text frame, raw bytes (record separators included).
    Text(Vec<u8>),
    /// Binary frame. Accepted as a protocol slot but never decoded; the
    /// server has no known binary producer.
    Binary(Vec<u8>),
    /// The peer closed the connection.
    Closed,
}

/// An open socket owned by the listener task.
#[async_trait]
pub(crate) trait Socket: Send {
    async fn send_text(&mut self, text: &str) -> Result<(), SocketError>;
    async fn recv(&mut self) -> Result<SocketEvent, SocketError>;
    async fn close(&mut self);
}

/// Opens sockets; one call per (re)connect.
#[async_trait]
pub(crate) trait SocketConnector: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        cookie_header: Option<String>,
    ) -> Result<Box<dyn Socket>, SocketError>;
}

/// Production connector backed by tokio-tungstenite.
pub(crate) struct TungsteniteConnector;

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn connect(
        &self,
        url: &str,
        cookie_header: Option<String>,
    ) -> Result<Box<dyn Socket>, SocketError> {
        let mut request = url
            .into_client_request()
            .map_err(|error| SocketError(error.to_string()))?;
        if let Some(cookies) = cookie_header {
            let value = HeaderValue::from_str(&cookies)
                .map_err(|error| SocketError(error.to_string()))?;
            request.headers_mut().insert(COOKIE, value);
        }

        let (stream, _) = connect_async(request)
            .await
            .map_err(|error| SocketError(error.to_string()))?;
        Ok(Box::new(TungsteniteSocket { inner: stream }))
    }
}

struct TungsteniteSocket {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Socket for TungsteniteSocket {
    async fn send_text(&mut self, text: &str) -> Result<(), SocketError> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|error| SocketError(error.to_string()))
    }

    async fn recv(&mut self) -> Result<SocketEvent, SocketError> {
        loop {
            match self.inner.next().await {
                None => return Ok(SocketEvent::Closed),
                Some(Err(error)) => return Err(SocketError(error.to_string())),
                Some(Ok(Message::Text(text))) => {
                    return Ok(SocketEvent::Text(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(SocketEvent::Binary(bytes.to_vec()));
                }
                Some(Ok(Message::Close(_))) => return Ok(SocketEvent::Closed),
                // Pings and pongs are answered by tungstenite itself.
                Some(Ok(_)) => {}
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.inner.close(None).await;
    }
}
