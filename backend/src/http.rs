use std::time::Duration;

use pamigrate_core::{
    Error, Result,
    error::REQUEST_FAILED,
    objects::ObjectRef,
    profiles::{ConnectionProfile, ProfileDraft, ProfileId},
};
use reqwest::{
    RequestBuilder, Response,
    header::{ACCEPT, HeaderValue},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{AuthReply, Backend, ConnectionCheck, MigrationResponse};

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Acknowledgement {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default, alias = "error")]
    message: Option<String>,
}

#[derive(Serialize)]
struct ScopedDraft<'a> {
    username: &'a str,
    #[serde(flatten)]
    draft: &'a ProfileDraft,
}

#[derive(Serialize)]
struct MigratePayload<'a> {
    source: &'a ConnectionProfile,
    target: &'a ConnectionProfile,
    objects: &'a [ObjectRef],
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

/// JSON-over-HTTP client for the migration backend.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                Error::unavailable(Some(format!("failed to initialise HTTP client: {err}")))
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await
            .map_err(|err| {
                warn!(error = %err, "backend request failed");
                Error::unavailable(None)
            })?;
        parse_response(response).await
    }
}

async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let url = response.url().path().to_string();
    let body = response.text().await.map_err(|err| {
        warn!(error = %err, %url, "failed to read backend response");
        Error::unavailable(None)
    })?;

    if !status.is_success() {
        debug!(%status, %url, "backend returned an error status");
        return Err(Error::unavailable(error_message(&body)));
    }

    serde_json::from_str(&body).map_err(|err| {
        debug!(error = %err, %url, "malformed backend response");
        let detail = error_message(&body)
            .unwrap_or_else(|| format!("{REQUEST_FAILED}: malformed response from {url}: {err}"));
        Error::unavailable(Some(detail))
    })
}

/// Human-readable message carried by an error body, if any.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let parsed: ApiErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .message
        .or(parsed.error)
        .filter(|message| !message.trim().is_empty())
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn test_connection(&self, draft: &ProfileDraft) -> Result<ConnectionCheck> {
        debug!(kind = %draft.kind(), "POST /test-connection");
        self.send(self.client.post(self.url("/test-connection")).json(draft))
            .await
    }

    async fn list_objects(&self, profile: &ConnectionProfile) -> Result<Vec<ObjectRef>> {
        debug!(profile = %profile.id(), "POST /list-objects");
        self.send(self.client.post(self.url("/list-objects")).json(profile))
            .await
    }

    async fn migrate_objects(
        &self,
        source: &ConnectionProfile,
        target: &ConnectionProfile,
        objects: &[ObjectRef],
    ) -> Result<MigrationResponse> {
        debug!(
            source = %source.id(),
            target = %target.id(),
            count = objects.len(),
            "POST /migrate"
        );
        let payload = MigratePayload {
            source,
            target,
            objects,
        };
        self.send(self.client.post(self.url("/migrate")).json(&payload))
            .await
    }

    async fn list_profiles(&self, username: &str) -> Result<Vec<ConnectionProfile>> {
        debug!(%username, "GET /environments");
        let request = self
            .client
            .get(self.url("/environments"))
            .query(&[("username", username)]);
        self.send(request).await
    }

    async fn create_profile(
        &self,
        username: &str,
        draft: &ProfileDraft,
    ) -> Result<ConnectionProfile> {
        debug!(%username, kind = %draft.kind(), "POST /environments");
        let payload = ScopedDraft { username, draft };
        self.send(self.client.post(self.url("/environments")).json(&payload))
            .await
    }

    async fn update_profile(
        &self,
        username: &str,
        id: ProfileId,
        draft: &ProfileDraft,
    ) -> Result<ConnectionProfile> {
        debug!(%username, %id, "PUT /environments/{{id}}");
        let payload = ScopedDraft { username, draft };
        let request = self
            .client
            .put(self.url(&format!("/environments/{id}")))
            .json(&payload);
        self.send(request).await
    }

    async fn delete_profile(&self, username: &str, id: ProfileId) -> Result<()> {
        debug!(%username, %id, "DELETE /environments/{{id}}");
        let request = self
            .client
            .delete(self.url(&format!("/environments/{id}")))
            .query(&[("username", username)]);
        let ack: Acknowledgement = self.send(request).await?;
        match ack.success {
            Some(false) => Err(Error::rejected(ack.message, "profile was not deleted")),
            _ => Ok(()),
        }
    }

    async fn login(&self, username: &str, password: &str) -> Result<AuthReply> {
        debug!(%username, "POST /auth/login");
        let payload = Credentials { username, password };
        self.send(self.client.post(self.url("/auth/login")).json(&payload))
            .await
    }

    async fn register(&self, username: &str, password: &str) -> Result<AuthReply> {
        debug!(%username, "POST /auth/register");
        let payload = Credentials { username, password };
        self.send(self.client.post(self.url("/auth/register")).json(&payload))
            .await
    }
}
