//! Authenticated HTTP wrapper over `reqwest`.
//!
//! Every call sends `Content-Type: application/json`. Authenticated calls
//! attach `Authorization: Bearer <token>` when the store holds a token and
//! omit the header otherwise. A 401 on an authenticated call fires the
//! login redirect once and surfaces [`ApiError::Unauthorized`]; it is never
//! retried. Public calls (login, registration, password reset) skip both the
//! header and the redirect, so a wrong password comes back as a plain
//! [`ApiError::Status`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mailagent_auth::{LoginRedirect, TokenStore};
use mailagent_settings::ClientSettings;
use metrics::counter;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::errors::ApiError;

// ─────────────────────────────────────────────────────────────────────────────
// Response
// ─────────────────────────────────────────────────────────────────────────────

/// Raw response from the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Body text.
    pub body: String,
    /// `Content-Type` header, if present.
    pub content_type: Option<String>,
}

impl HttpResponse {
    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Human-readable error text: the body's `detail`, `message`, or
    /// `error` field, else the raw body, else the status line.
    pub fn error_message(&self) -> String {
        if let Ok(value) = serde_json::from_str::<Value>(&self.body) {
            for key in ["detail", "message", "error"] {
                match value.get(key) {
                    Some(Value::String(s)) if !s.is_empty() => return s.clone(),
                    None | Some(Value::Null | Value::String(_)) => {}
                    Some(other) => return other.to_string(),
                }
            }
        }
        let raw = self.body.trim();
        if raw.is_empty() || raw.len() > 200 {
            format!("HTTP {}", self.status)
        } else {
            raw.to_owned()
        }
    }

    /// Map a non-2xx status to [`ApiError::Status`], else decode the body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        if !self.is_success() {
            return Err(ApiError::Status {
                status: self.status,
                message: self.error_message(),
            });
        }
        self.json()
    }

    /// Like [`decode`](Self::decode) for endpoints whose body is irrelevant.
    pub fn check(&self) -> Result<(), ApiError> {
        if self.is_success() {
            Ok(())
        } else {
            Err(ApiError::Status {
                status: self.status,
                message: self.error_message(),
            })
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Call
// ─────────────────────────────────────────────────────────────────────────────

/// One REST call, built up before execution.
///
/// Static path parts come from the path string; dynamic values such as an
/// email address go through [`segment`](Self::segment) so they are
/// percent-encoded as a single path segment.
#[derive(Clone, Debug)]
pub struct Call<'a> {
    method: Method,
    segments: Vec<&'a str>,
    query: Vec<(&'static str, String)>,
    body: Option<Value>,
    public: bool,
}

impl<'a> Call<'a> {
    /// Call `method` on `path`, relative to the API base URL. A trailing
    /// slash is preserved.
    pub fn new(method: Method, path: &'a str) -> Self {
        let path = path.strip_prefix('/').unwrap_or(path);
        Self {
            method,
            segments: path.split('/').collect(),
            query: Vec::new(),
            body: None,
            public: false,
        }
    }

    /// `GET path`.
    pub fn get(path: &'a str) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST path`.
    pub fn post(path: &'a str) -> Self {
        Self::new(Method::POST, path)
    }

    /// `PUT path`.
    pub fn put(path: &'a str) -> Self {
        Self::new(Method::PUT, path)
    }

    /// `PATCH path`.
    pub fn patch(path: &'a str) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// `DELETE path`.
    pub fn delete(path: &'a str) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append one encoded path segment.
    #[must_use]
    pub fn segment(mut self, value: &'a str) -> Self {
        if self.segments.last() == Some(&"") {
            let _ = self.segments.pop();
        }
        self.segments.push(value);
        self
    }

    /// Add a query parameter.
    #[must_use]
    pub fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    /// Add a query parameter when `value` is present.
    #[must_use]
    pub fn query_opt(self, key: &'static str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.query(key, v),
            None => self,
        }
    }

    /// Set the JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value =
            serde_json::to_value(body).map_err(|e| ApiError::Invalid(format!("body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Skip the bearer header and the login redirect.
    #[must_use]
    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    /// Slash-joined path, for logs.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// REST client bound to the API base URL, the token store, and the login
/// redirect.
#[derive(Clone)]
pub struct AuthedHttp {
    client: Client,
    base_url: Url,
    tokens: Arc<dyn TokenStore>,
    login: LoginRedirect,
}

impl fmt::Debug for AuthedHttp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthedHttp")
            .field("base_url", &self.base_url.as_str())
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

impl AuthedHttp {
    /// Build from settings: base URL, timeout, and user agent.
    pub fn new(
        settings: &ClientSettings,
        tokens: Arc<dyn TokenStore>,
        login: LoginRedirect,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.http.timeout_ms))
            .user_agent(settings.http.user_agent.clone())
            .build()?;
        Self::with_client(client, &settings.api_url, tokens, login)
    }

    /// Wrap an existing `reqwest` client.
    pub fn with_client(
        client: Client,
        base_url: &str,
        tokens: Arc<dyn TokenStore>,
        login: LoginRedirect,
    ) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ApiError::Invalid(format!("API URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Invalid(format!("API URL {base_url} cannot be a base")));
        }
        Ok(Self {
            client,
            base_url,
            tokens,
            login,
        })
    }

    /// API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Token store shared with the rest of the client.
    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ApiError::Invalid(format!("API URL {} cannot be a base", self.base_url)))?;
            let _ = path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    /// Execute a call and return the raw response.
    #[tracing::instrument(skip_all, fields(method = %call.method, path = %call.path()))]
    pub async fn execute(&self, call: Call<'_>) -> Result<HttpResponse, ApiError> {
        let url = self.endpoint(&call.segments)?;
        let mut request = self
            .client
            .request(call.method, url)
            .header(CONTENT_TYPE, "application/json");
        if !call.public {
            if let Some(token) = self.tokens.token().filter(|t| !t.is_empty()) {
                request = request.bearer_auth(token);
            }
        }
        if !call.query.is_empty() {
            request = request.query(&call.query);
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        debug!(status, "response");

        if status == 401 && !call.public {
            counter!("http_unauthorized_total").increment(1);
            warn!("session rejected by backend");
            self.login.trigger("http");
            return Err(ApiError::Unauthorized);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            body,
            content_type,
        })
    }

    /// Execute a call and decode a 2xx JSON body.
    pub async fn fetch<T: DeserializeOwned>(&self, call: Call<'_>) -> Result<T, ApiError> {
        self.execute(call).await?.decode()
    }

    /// `method path` with an optional JSON body, authenticated.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<HttpResponse, ApiError> {
        let mut call = Call::new(method, path);
        if let Some(body) = body {
            call = call.json(body)?;
        }
        self.execute(call).await
    }

    /// `GET path`, decoded.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.fetch(Call::get(path)).await
    }

    /// `method path` with a JSON body, decoded.
    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.fetch(Call::new(method, path).json(body)?).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use mailagent_auth::{LoginRedirect, MemoryTokenStore, RecordingNavigator};
    use wiremock::MockServer;

    use super::AuthedHttp;

    pub(crate) struct Fixture {
        pub server: MockServer,
        pub http: AuthedHttp,
        pub tokens: Arc<MemoryTokenStore>,
        pub nav: Arc<RecordingNavigator>,
    }

    pub(crate) async fn fixture(token: Option<&str>) -> Fixture {
        let server = MockServer::start().await;
        let tokens = Arc::new(token.map_or_else(MemoryTokenStore::new, MemoryTokenStore::with_token));
        let nav = Arc::new(RecordingNavigator::new());
        let http = AuthedHttp::with_client(
            reqwest::Client::new(),
            &format!("{}/api", server.uri()),
            tokens.clone(),
            LoginRedirect::new(nav.clone(), "/login"),
        )
        .unwrap();
        Fixture {
            server,
            http,
            tokens,
            nav,
        }
    }
}
