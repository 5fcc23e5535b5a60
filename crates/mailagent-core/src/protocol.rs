//! Realtime wire protocol.
//!
//! Every frame is one JSON object. Requests always carry `role: "user"` and
//! a `type` tag; optional fields are omitted when absent, never sent as
//! `null`. The backend answers each request with exactly one frame which may
//! echo the request's `requestId`.
//!
//! ```json
//! { "role": "user", "type": "email", "receiverEmail": "a@b.c",
//!   "prompt": "...", "tone": "formal", "token": "...", "requestId": "..." }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::RequestId;

/// Status code the backend uses for rejected credentials.
pub const STATUS_UNAUTHORIZED: u16 = 401;

/// Error string the backend uses for rejected credentials.
pub const ERROR_UNAUTHORIZED: &str = "Unauthorized";

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Request kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    /// Free-text chat turn.
    Chat,
    /// Email draft generation.
    Email,
}

impl FrameType {
    /// Wire tag, also used as a metrics label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Email => "email",
        }
    }
}

/// A request frame sent to the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundFrame {
    /// Sender role, always `"user"`.
    pub role: String,
    /// Request kind.
    #[serde(rename = "type")]
    pub kind: FrameType,
    /// Chat message text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Recipient address for email generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_email: Option<String>,
    /// Free-text instructions for email generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Optional tone hint (`formal`, `friendly`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    /// Bearer token, present only when the user is logged in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Correlation ID echoed by the reply.
    pub request_id: RequestId,
}

impl OutboundFrame {
    /// Build a chat request.
    pub fn chat(content: impl Into<String>, tone: Option<&str>) -> Self {
        Self {
            role: "user".into(),
            kind: FrameType::Chat,
            content: Some(content.into()),
            receiver_email: None,
            prompt: None,
            tone: normalize_tone(tone),
            token: None,
            request_id: RequestId::new(),
        }
    }

    /// Build an email-generation request.
    pub fn email(
        receiver_email: impl Into<String>,
        prompt: impl Into<String>,
        tone: Option<&str>,
    ) -> Self {
        Self {
            role: "user".into(),
            kind: FrameType::Email,
            content: None,
            receiver_email: Some(receiver_email.into()),
            prompt: Some(prompt.into()),
            tone: normalize_tone(tone),
            token: None,
            request_id: RequestId::new(),
        }
    }

    /// Attach the auth token. Empty tokens are treated as absent.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// The UI passes hashtags like `#formal`; strip the marker and drop blanks.
fn normalize_tone(tone: Option<&str>) -> Option<String> {
    let tone = tone?.trim().trim_start_matches('#').trim();
    (!tone.is_empty()).then(|| tone.to_owned())
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// Structured email produced by the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedEmail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub body: String,
}

/// A reply frame from the backend.
///
/// Chat replies carry `content` (or `message`), email replies carry
/// `success` / `email` / `error`. Unknown fields such as `timestamp` are
/// ignored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboundFrame {
    /// Echoed correlation ID, absent on backends that do not echo.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    /// Sender role (`assistant`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Chat reply text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Alternate chat reply field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Email generation outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Generated email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<GeneratedEmail>,
    /// Backend error string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Status code, numeric or string depending on the backend path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
}

/// A frame that could not be decoded.
///
/// `request_id` is recovered when the frame is valid JSON carrying a
/// `requestId` string, so the failure can still reach its owner.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("malformed frame: {message}")]
pub struct FrameDecodeError {
    /// Correlation ID salvaged from the raw frame.
    pub request_id: Option<RequestId>,
    /// Parser message.
    pub message: String,
}

impl InboundFrame {
    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, FrameDecodeError> {
        let raw: Value = serde_json::from_str(text).map_err(|e| FrameDecodeError {
            request_id: None,
            message: e.to_string(),
        })?;
        let request_id = raw
            .get("requestId")
            .and_then(Value::as_str)
            .map(RequestId::from);
        if !raw.is_object() {
            return Err(FrameDecodeError {
                request_id,
                message: "frame is not a JSON object".into(),
            });
        }
        serde_json::from_value(raw).map_err(|e| FrameDecodeError {
            request_id,
            message: e.to_string(),
        })
    }

    /// Numeric status, accepting `401` and `"401"`.
    pub fn status_code(&self) -> Option<u16> {
        match self.status.as_ref()? {
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Whether the backend rejected the request's credentials.
    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == Some(STATUS_UNAUTHORIZED)
            || self.error.as_deref() == Some(ERROR_UNAUTHORIZED)
    }

    /// Reply text, preferring `content` over `message`.
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().or(self.message.as_deref())
    }

    /// Interpret as a chat reply.
    pub fn into_chat_response(self) -> ChatResponse {
        let text = self.content.or(self.message);
        match text {
            Some(message) => ChatResponse {
                success: true,
                message: Some(message),
                error: self.error,
            },
            None => ChatResponse {
                success: false,
                message: None,
                error: Some(self.error.unwrap_or_else(|| "empty reply".into())),
            },
        }
    }

    /// Interpret as an email-generation reply.
    ///
    /// The backend's catch-all failure path answers with a plain
    /// `content` string and no `success` flag; that text becomes the error.
    pub fn into_email_response(self) -> EmailResponse {
        let success = self.success.unwrap_or(self.email.is_some());
        let error = if success {
            self.error
        } else {
            self.error.or(self.content).or(self.message)
        };
        EmailResponse {
            success,
            email: self.email,
            error,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Caller-facing results
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a chat request as seen by UI callers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Whether a reply text arrived.
    pub success: bool,
    /// Reply text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error text when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of an email-generation request.
///
/// Backend failures are data (`success: false`), not errors.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailResponse {
    /// Whether generation succeeded.
    pub success: bool,
    /// Generated email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<GeneratedEmail>,
    /// Error text when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
