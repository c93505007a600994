//! Wire protocol for the push channel.
//!
//! Two incompatible framings share one socket surface:
//!
//! - **Legacy**: one JSON message per frame, optionally terminated by the
//!   record separator byte `0x1E`, which is stripped before parsing.
//! - **Hub**: frames hold one or more `0x1E`-delimited JSON envelopes
//!   (`{type, target, arguments}`); each non-empty `arguments` array carries
//!   the actual messages. The first outbound frame after connect must be the
//!   fixed protocol handshake, also `0x1E`-terminated.
//!
//! The variant is picked once per client instance, never per reconnect.

use serde::Deserialize;

use crate::error::ProtocolError;

/// ASCII record separator; delimits JSON records inside a hub frame.
pub const RECORD_SEPARATOR: u8 = 0x1E;

/// First outbound frame on a hub connection. The server closes the socket
/// if anything else arrives first.
pub const HUB_HANDSHAKE: &str = "{\"protocol\":\"json\",\"version\":1}\u{1e}";

/// Name of the CSRF cookie and of the header echoing it back.
pub const CSRF_TOKEN_NAME: &str = "BPMCSRF";

/// Name of the session cookie set by a successful form login.
pub const AUTH_COOKIE_NAME: &str = ".ASPXAUTH";

/// One decoded push message. Immutable once built; the listener hands
/// ownership to the subscriber and reuses its receive buffer for the next
/// frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// Opaque correlation identifier assigned by the server.
    pub id: String,
    /// Sender label from the message header.
    pub sender: String,
    /// Server-side type name of the body payload.
    pub body_type_name: String,
    /// Raw body payload, passed through verbatim.
    pub body: String,
}

/// Which wire framing this client speaks. Selected once at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    /// Direct connect to a fixed path, one JSON message per frame.
    Legacy,
    /// Negotiate-then-connect hub protocol with `0x1E`-delimited envelopes.
    Hub,
}

impl Variant {
    /// Websocket path for this variant, relative to the application root.
    #[must_use]
    pub(crate) fn socket_path(self) -> &'static str {
        match self {
            Self::Legacy => "/0/Nui/ViewModule.aspx.ashx",
            Self::Hub => "/msg",
        }
    }

    /// Decode one complete text frame into zero or more messages, in wire
    /// order.
    ///
    /// Hub envelopes that fail to parse are dropped with a warning rather
    /// than tearing the connection down; a malformed legacy frame is an
    /// error because the whole frame is the message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Json`] when a legacy frame is not valid
    /// message JSON.
    pub fn decode_frame(self, buffer: &[u8]) -> Result<Vec<InboundMessage>, ProtocolError> {
        match self {
            Self::Legacy => Ok(vec![decode_legacy_frame(buffer)?]),
            Self::Hub => Ok(decode_hub_frame(buffer)),
        }
    }
}

/// Decode a legacy frame: the entire buffer is one JSON message, with a
/// trailing record separator stripped when present.
fn decode_legacy_frame(buffer: &[u8]) -> Result<InboundMessage, ProtocolError> {
    let trimmed = buffer
        .strip_suffix(&[RECORD_SEPARATOR])
        .unwrap_or(buffer);
    let wire: WireMessage = serde_json::from_slice(trimmed)?;
    Ok(wire.into())
}

/// Decode a hub frame: split on the record separator, parse each record as
/// an envelope, and flatten the non-empty `arguments` arrays in order.
fn decode_hub_frame(buffer: &[u8]) -> Vec<InboundMessage> {
    let mut messages = Vec::new();
    for record in buffer.split(|byte| *byte == RECORD_SEPARATOR) {
        if record.is_empty() {
            continue;
        }
        match serde_json::from_slice::<HubEnvelope>(record) {
            Ok(envelope) => {
                // Keep-alives and handshake acks arrive with no arguments;
                // they are not subscriber-visible events.
                messages.extend(envelope.arguments.into_iter().map(InboundMessage::from));
            }
            Err(error) => {
                tracing::warn!(error = %error, "dropping malformed hub envelope");
            }
        }
    }
    messages
}

/// Reply to the hub negotiate call.
#[derive(Debug, Deserialize)]
pub struct NegotiateResponse {
    #[serde(rename = "connectionId", default)]
    pub connection_id: String,
    #[serde(rename = "connectionToken", default)]
    pub connection_token: String,
    #[serde(rename = "negotiateVersion", default)]
    pub negotiate_version: i32,
}

impl NegotiateResponse {
    /// Parse a negotiate reply and require a usable connection token.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Json`] for malformed JSON, or
    /// [`ProtocolError::MissingToken`] when the token field is absent or
    /// empty.
    pub fn parse(body: &str) -> Result<Self, ProtocolError> {
        let response: Self = serde_json::from_str(body)?;
        if response.connection_token.is_empty() {
            return Err(ProtocolError::MissingToken);
        }
        Ok(response)
    }
}

/// Reply from the OAuth2 token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: String,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(rename = "Id", default)]
    id: String,
    #[serde(rename = "Header", default)]
    header: Option<WireHeader>,
    #[serde(rename = "Body", default)]
    body: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireHeader {
    #[serde(rename = "Sender", default)]
    sender: Option<String>,
    #[serde(rename = "BodyTypeName", default)]
    body_type_name: Option<String>,
}

impl From<WireMessage> for InboundMessage {
    fn from(wire: WireMessage) -> Self {
        let header = wire.header.unwrap_or_default();
        Self {
            id: wire.id,
            sender: header.sender.unwrap_or_default(),
            body_type_name: header.body_type_name.unwrap_or_default(),
            body: wire.body.unwrap_or_default(),
        }
    }
}

/// Hub envelope wrapping zero or more messages.
#[derive(Debug, Deserialize)]
struct HubEnvelope {
    #[serde(rename = "type", default)]
    _kind: i32,
    #[serde(rename = "target", default)]
    _target: String,
    #[serde(default)]
    arguments: Vec<WireMessage>,
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;
