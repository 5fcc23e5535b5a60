//! Chat transcript persistence (`/chat/messages`).
//!
//! The realtime socket does not store anything; clients that want the
//! conversation back later save each message here.

use chrono::{SecondsFormat, Utc};
use mailagent_core::{GeneratedEmail, MessageId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::MessageResponse;
use crate::de::null_default;
use crate::emails::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::errors::ApiError;
use crate::http::{AuthedHttp, Call};

/// Who wrote a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatSender {
    /// The signed-in user.
    User,
    /// The assistant.
    Assistant,
}

impl ChatSender {
    /// Wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// What a message renders as.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text.
    #[default]
    Text,
    /// A generated email card.
    Email,
    /// Any kind this client does not know.
    #[serde(other)]
    Other,
}

/// Body of `POST /chat/messages`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SaveChatMessage {
    /// Client-chosen ID.
    pub message_id: MessageId,
    /// Message text.
    pub content: String,
    /// Author.
    pub sender: ChatSender,
    /// ISO-8601 time the message was written.
    pub timestamp: String,
    /// Tone tag, if one was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    /// Render kind.
    pub message_type: MessageKind,
    /// Attached email for [`MessageKind::Email`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_data: Option<GeneratedEmail>,
}

impl SaveChatMessage {
    /// Text message stamped now.
    pub fn new(sender: ChatSender, content: impl Into<String>) -> Self {
        Self {
            message_id: MessageId::new(),
            content: content.into(),
            sender,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, false),
            tone: None,
            message_type: MessageKind::Text,
            email_data: None,
        }
    }

    /// Assistant message carrying a generated email.
    pub fn email(email: &GeneratedEmail) -> Self {
        Self {
            message_type: MessageKind::Email,
            email_data: Some(email.clone()),
            ..Self::new(ChatSender::Assistant, email.subject.clone())
        }
    }

    /// Tag the message with a tone.
    #[must_use]
    pub fn with_tone(mut self, tone: Option<&str>) -> Self {
        self.tone = tone.map(str::to_owned);
        self
    }
}

/// A stored message.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ChatMessage {
    /// Client-chosen ID.
    pub id: MessageId,
    /// Message text.
    #[serde(default, deserialize_with = "null_default")]
    pub content: String,
    /// Author.
    pub sender: ChatSender,
    /// ISO-8601 time.
    pub timestamp: String,
    /// Tone tag.
    #[serde(default)]
    pub hashtag: Option<String>,
    /// Render kind.
    #[serde(rename = "type", default, deserialize_with = "null_default")]
    pub kind: MessageKind,
    /// Attached email, as stored.
    #[serde(rename = "emailData", default)]
    pub email_data: Option<Value>,
}

impl ChatMessage {
    /// The attached email, when it has the generated-email shape.
    pub fn email(&self) -> Option<GeneratedEmail> {
        self.email_data
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// One page of transcript, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatPage {
    /// Messages on this page.
    pub messages: Vec<ChatMessage>,
    /// More messages exist past this page.
    pub has_more: bool,
    /// Total stored messages.
    pub total: u64,
}

#[derive(Deserialize)]
struct Saved {
    #[serde(default)]
    success: bool,
}

/// Client for the chat transcript.
#[derive(Clone, Copy, Debug)]
pub struct ChatHistoryClient<'a> {
    http: &'a AuthedHttp,
}

impl<'a> ChatHistoryClient<'a> {
    /// Borrow the shared HTTP wrapper.
    pub fn new(http: &'a AuthedHttp) -> Self {
        Self { http }
    }

    /// Store one message. Returns the backend's success flag.
    pub async fn save(&self, message: &SaveChatMessage) -> Result<bool, ApiError> {
        let saved: Saved = self
            .http
            .fetch(Call::post("/chat/messages").json(message)?)
            .await?;
        Ok(saved.success)
    }

    /// One page of transcript. `limit` is clamped to `1..=100`.
    pub async fn list(
        &self,
        limit: Option<u32>,
        before: Option<&str>,
        after: Option<&str>,
    ) -> Result<ChatPage, ApiError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let call = Call::get("/chat/messages")
            .query("limit", limit)
            .query_opt("before", before)
            .query_opt("after", after);
        self.http.fetch(call).await
    }

    /// Delete the whole transcript.
    pub async fn clear(&self) -> Result<MessageResponse, ApiError> {
        self.http.fetch(Call::delete("/chat/messages")).await
    }
}
