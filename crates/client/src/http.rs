//! Reqwest-backed implementation of [`LockApi`].

use async_trait::async_trait;
use mindgraph_core::locking::{AcquireOutcome, LockStatus, RefreshOutcome};
use mindgraph_core::types::DbId;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::api::{ClientError, LockApi, SaveOk};

/// The server's `{ "data": ... }` envelope.
#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

/// The server's `{ "error", "code", "details"? }` error body.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[allow(dead_code)]
    error: String,
    code: String,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

/// HTTP client for the lock/save surface, authenticated with a bearer token.
#[derive(Clone)]
pub struct HttpLockApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpLockApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, document_id: DbId, suffix: &str) -> String {
        format!("{}/api/v1/documents/{document_id}{suffix}", self.base_url)
    }

    /// Decode a response, mapping error statuses to typed [`ClientError`]s.
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            let envelope: DataEnvelope<T> = response.json().await?;
            return Ok(envelope.data);
        }

        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ClientError::Unauthorized);
        }

        let body: ErrorBody = response
            .json()
            .await
            .map_err(|e| ClientError::Unexpected(format!("unparseable {status} response: {e}")))?;

        match body.code.as_str() {
            "LOCK_NOT_HELD" => Err(ClientError::LockNotHeld {
                holder_id: body
                    .details
                    .as_ref()
                    .and_then(|d| d["locked_by_user_id"].as_i64()),
            }),
            "VERSION_CONFLICT" => {
                let details = body.details.unwrap_or_default();
                Err(ClientError::VersionConflict {
                    actual: details["actual_version"].as_i64().unwrap_or_default(),
                    expected: details["expected_version"].as_i64().unwrap_or_default(),
                })
            }
            code => Err(ClientError::Unexpected(format!("{status}: {code}"))),
        }
    }

    async fn post<T: DeserializeOwned>(&self, url: String) -> Result<T, ClientError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl LockApi for HttpLockApi {
    async fn acquire(&self, document_id: DbId) -> Result<AcquireOutcome, ClientError> {
        self.post(self.url(document_id, "/lock/acquire")).await
    }

    async fn refresh(&self, document_id: DbId) -> Result<RefreshOutcome, ClientError> {
        self.post(self.url(document_id, "/lock/refresh")).await
    }

    async fn release(&self, document_id: DbId) -> Result<bool, ClientError> {
        #[derive(Deserialize)]
        struct Released {
            released: bool,
        }
        let released: Released = self.post(self.url(document_id, "/lock/release")).await?;
        Ok(released.released)
    }

    fn release_beacon(&self, document_id: DbId) {
        // Spawned and forgotten: teardown must not wait on the network.
        let http = self.http.clone();
        let token = self.token.clone();
        let url = self.url(document_id, "/lock/release-beacon");
        tokio::spawn(async move {
            if let Err(err) = http.post(url).bearer_auth(token).send().await {
                tracing::debug!(document_id, error = %err, "Beacon release did not reach server");
            }
        });
    }

    async fn status(&self, document_id: DbId) -> Result<LockStatus, ClientError> {
        let response = self
            .http
            .get(self.url(document_id, "/lock"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn save(
        &self,
        document_id: DbId,
        body: &serde_json::Value,
        version: i64,
    ) -> Result<SaveOk, ClientError> {
        let response = self
            .http
            .put(self.url(document_id, ""))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "body": body, "version": version }))
            .send()
            .await?;
        Self::decode(response).await
    }
}
