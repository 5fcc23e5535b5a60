//! Generated-email history and drafts (`/emails`, `/usage-stats`).

use std::fmt;

use chrono::{SecondsFormat, Utc};
use mailagent_core::{EmailId, GeneratedEmail};
use serde::{Deserialize, Serialize};

use crate::auth::MessageResponse;
use crate::de::null_default;
use crate::errors::ApiError;
use crate::http::{AuthedHttp, Call};

/// Default page size of [`EmailsClient::list`].
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Largest page the backend serves.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Lifecycle of a stored email.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    /// Generated or edited, not sent.
    #[default]
    Draft,
    /// Sent from the active mailbox.
    Sent,
    /// Discarded by the user.
    Deleted,
    /// Any status this client does not know.
    #[serde(other)]
    Other,
}

impl EmailStatus {
    /// Wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Deleted => "deleted",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /emails`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SaveEmail {
    /// Client-chosen ID; later updates address the email by it.
    pub email_id: EmailId,
    /// Recipient.
    pub to_email: String,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub body: String,
    /// ISO-8601 generation time.
    pub timestamp: String,
    /// Tone used for generation.
    pub tone: Option<String>,
    /// Prompt the email was generated from.
    pub prompt: Option<String>,
    /// Initial status.
    pub status: EmailStatus,
}

impl SaveEmail {
    /// Draft record for an email the realtime session just generated.
    pub fn from_generated(email: &GeneratedEmail, prompt: &str, tone: Option<&str>) -> Self {
        Self {
            email_id: EmailId::new(),
            to_email: email.to.clone(),
            subject: email.subject.clone(),
            body: email.body.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, false),
            tone: tone.map(str::to_owned),
            prompt: Some(prompt.to_owned()),
            status: EmailStatus::Draft,
        }
    }
}

/// Fields to change on a stored email. Editing `body` or `subject` bumps
/// the server-side version.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EmailPatch {
    /// New status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EmailStatus>,
    /// New body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// New subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// New recipient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_email: Option<String>,
}

/// A stored email.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct EmailRecord {
    /// Client-chosen ID.
    pub id: EmailId,
    /// Recipient.
    pub to_email: String,
    /// Subject line.
    #[serde(default, deserialize_with = "null_default")]
    pub subject: String,
    /// Body text.
    #[serde(default, deserialize_with = "null_default")]
    pub body: String,
    /// Tone used for generation.
    #[serde(default)]
    pub tone: Option<String>,
    /// Prompt the email was generated from.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: EmailStatus,
    /// ISO-8601 send time.
    #[serde(default)]
    pub sent_at: Option<String>,
    /// Times the email was regenerated.
    #[serde(default, deserialize_with = "null_default")]
    pub regeneration_count: u32,
    /// Edit version.
    #[serde(default, deserialize_with = "null_default")]
    pub version: u32,
    /// ISO-8601 generation time.
    pub timestamp: String,
}

/// One page of history, newest first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailPage {
    /// Emails on this page.
    pub emails: Vec<EmailRecord>,
    /// More emails exist past this page.
    pub has_more: bool,
    /// Total stored emails.
    pub total: u64,
}

/// Reply to `PATCH /emails/{id}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EmailUpdated {
    /// Backend success flag.
    pub success: bool,
    /// Updated email.
    pub email_id: Option<EmailId>,
}

/// Reply to `POST /emails/{id}/regenerate`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Regenerated {
    /// Backend success flag.
    pub success: bool,
    /// New regeneration count.
    pub regeneration_count: u32,
}

/// Entry of the recent-activity feed.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Activity {
    /// What happened.
    pub action: String,
    /// ISO-8601 time.
    #[serde(deserialize_with = "null_default")]
    pub time: String,
    /// Email status.
    #[serde(deserialize_with = "null_default")]
    pub status: String,
    /// Tone used.
    pub tone: Option<String>,
}

/// Usage dashboard numbers.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UsageStats {
    /// Emails generated.
    pub total_emails: u64,
    /// Percentage of generated emails that were sent.
    pub success_rate: f64,
    /// Estimated hours saved.
    pub time_saved_hours: f64,
    /// Latest activity.
    pub recent_activity: Vec<Activity>,
}

#[derive(Deserialize)]
struct Saved {
    #[serde(default)]
    success: bool,
}

/// Client for email history.
#[derive(Clone, Copy, Debug)]
pub struct EmailsClient<'a> {
    http: &'a AuthedHttp,
}

impl<'a> EmailsClient<'a> {
    /// Borrow the shared HTTP wrapper.
    pub fn new(http: &'a AuthedHttp) -> Self {
        Self { http }
    }

    /// Store an email. Returns the backend's success flag.
    pub async fn save(&self, email: &SaveEmail) -> Result<bool, ApiError> {
        let saved: Saved = self.http.fetch(Call::post("/emails").json(email)?).await?;
        Ok(saved.success)
    }

    /// One page of history. `limit` is clamped to `1..=100`; `before` and
    /// `after` are ISO-8601 timestamps bounding the page.
    pub async fn list(
        &self,
        limit: Option<u32>,
        before: Option<&str>,
        after: Option<&str>,
    ) -> Result<EmailPage, ApiError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let call = Call::get("/emails")
            .query("limit", limit)
            .query_opt("before", before)
            .query_opt("after", after);
        self.http.fetch(call).await
    }

    /// Drafts among the newest page of emails. The backend has no status
    /// filter, so this filters the largest page client-side.
    pub async fn drafts(&self) -> Result<Vec<EmailRecord>, ApiError> {
        let page = self.list(Some(MAX_PAGE_SIZE), None, None).await?;
        Ok(page
            .emails
            .into_iter()
            .filter(|e| e.status == EmailStatus::Draft)
            .collect())
    }

    /// Change fields of a stored email.
    pub async fn update(&self, id: &EmailId, patch: &EmailPatch) -> Result<EmailUpdated, ApiError> {
        let call = Call::patch("/emails").segment(id.as_str()).json(patch)?;
        self.http.fetch(call).await
    }

    /// Record that the email was regenerated.
    pub async fn regenerate(&self, id: &EmailId) -> Result<Regenerated, ApiError> {
        let call = Call::post("/emails").segment(id.as_str()).segment("regenerate");
        self.http.fetch(call).await
    }

    /// Delete the whole history.
    pub async fn clear(&self) -> Result<MessageResponse, ApiError> {
        self.http.fetch(Call::delete("/emails")).await
    }

    /// Usage dashboard numbers.
    pub async fn usage_stats(&self) -> Result<UsageStats, ApiError> {
        self.http.get_json("/usage-stats").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::fixture;
    use serde_json::{Value, json};
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    fn record(id: &str, status: &str) -> Value {
        json!({
            "id": id,
            "to_email": "bob@example.com",
            "subject": "Hi",
            "body": "Hello Bob",
            "tone": "casual",
            "prompt": "say hi",
            "status": status,
            "sent_at": null,
            "regeneration_count": 0,
            "version": 1,
            "timestamp": "2024-05-01T10:00:00"
        })
    }

    #[test]
    fn save_from_generated_is_draft() {
        let generated = GeneratedEmail {
            to: "bob@example.com".into(),
            subject: "Hi".into(),
            body: "Hello".into(),
        };
        let save = SaveEmail::from_generated(&generated, "say hi", Some("casual"));
        assert_eq!(save.status, EmailStatus::Draft);
        assert_eq!(save.prompt.as_deref(), Some("say hi"));
        assert!(chrono::DateTime::parse_from_rfc3339(&save.timestamp).is_ok());

        let wire = serde_json::to_value(&save).unwrap();
        assert_eq!(wire["status"], "draft");
        assert_eq!(wire["to_email"], "bob@example.com");
    }

    #[test]
    fn unknown_status_decodes_as_other() {
        let status: EmailStatus = serde_json::from_value(json!("archived")).unwrap();
        assert_eq!(status, EmailStatus::Other);
    }

    #[tokio::test]
    async fn list_clamps_limit_and_passes_bounds() {
        let f = fixture(Some("jwt")).await;
        Mock::given(method("GET"))
            .and(path("/api/emails"))
            .and(query_param("limit", "100"))
            .and(query_param("before", "2024-05-01T00:00:00"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "emails": [record("e1", "sent")],
                "hasMore": false,
                "total": 1
            })))
            .expect(1)
            .mount(&f.server)
            .await;

        let page = EmailsClient::new(&f.http)
            .list(Some(500), Some("2024-05-01T00:00:00"), None)
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.emails[0].status, EmailStatus::Sent);
    }

    #[tokio::test]
    async fn drafts_filters_by_status() {
        let f = fixture(Some("jwt")).await;
        Mock::given(method("GET"))
            .and(path("/api/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "emails": [record("e1", "sent"), record("e2", "draft"), record("e3", "deleted"), record("e4", "draft")],
                "hasMore": false,
                "total": 4
            })))
            .mount(&f.server)
            .await;

        let drafts = EmailsClient::new(&f.http).drafts().await.unwrap();
        let ids: Vec<&str> = drafts.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e4"]);
    }

    #[tokio::test]
    async fn save_update_regenerate_clear() {
        let f = fixture(Some("jwt")).await;
        Mock::given(method("POST"))
            .and(path("/api/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&f.server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/emails/e1"))
            .and(body_json(json!({"status": "sent"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": true, "email_id": "e1"})),
            )
            .expect(1)
            .mount(&f.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/emails/e1/regenerate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": true, "regeneration_count": 2})),
            )
            .expect(1)
            .mount(&f.server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/emails"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "message": "Email history cleared"})),
            )
            .expect(1)
            .mount(&f.server)
            .await;

        let client = EmailsClient::new(&f.http);
        let generated = GeneratedEmail {
            to: "bob@example.com".into(),
            subject: "Hi".into(),
            body: "Hello".into(),
        };
        assert!(client.save(&SaveEmail::from_generated(&generated, "say hi", None)).await.unwrap());

        let id = EmailId::from("e1".to_string());
        let patch = EmailPatch {
            status: Some(EmailStatus::Sent),
            ..Default::default()
        };
        let updated = client.update(&id, &patch).await.unwrap();
        assert_eq!(updated.email_id, Some(id.clone()));
        assert_eq!(client.regenerate(&id).await.unwrap().regeneration_count, 2);
        assert_eq!(client.clear().await.unwrap().message, "Email history cleared");
    }

    #[tokio::test]
    async fn usage_stats_decode() {
        let f = fixture(Some("jwt")).await;
        Mock::given(method("GET"))
            .and(path("/api/usage-stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_emails": 12,
                "success_rate": 75.0,
                "time_saved_hours": 1.5,
                "recent_activity": [
                    {"action": "Generated email to bob@example.com", "time": "2024-05-01T10:00:00", "status": "sent", "tone": null}
                ]
            })))
            .mount(&f.server)
            .await;

        let stats = EmailsClient::new(&f.http).usage_stats().await.unwrap();
        assert_eq!(stats.total_emails, 12);
        assert_eq!(stats.recent_activity.len(), 1);
        assert_eq!(stats.recent_activity[0].tone, None);
    }
}
