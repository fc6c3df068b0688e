use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::Assignment;

/// Classified failure of a persistence call. `NotFound`/`Forbidden` are
/// fatal to a load; everything is recoverable for saves and submits.
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("assignment not found")]
    NotFound,
    #[error("access to assignment denied")]
    Forbidden,
    #[error("content rejected by server: {0}")]
    Validation(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for PersistenceError {
    fn from(err: reqwest::Error) -> Self {
        PersistenceError::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadedAssignment {
    pub assignment: Assignment,
    pub content: String,
    pub last_saved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveReceipt {
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitReceipt {
    pub completed_at: DateTime<Utc>,
}

/// Persistence collaborator consumed by the session core. The transport is
/// an implementation detail; `HttpPersistenceClient` below is the real one.
#[async_trait]
pub trait PersistenceClient: Send + Sync {
    async fn load_assignment(
        &self,
        assignment_id: &str,
    ) -> Result<LoadedAssignment, PersistenceError>;

    async fn save_content(
        &self,
        assignment_id: &str,
        content: &str,
    ) -> Result<SaveReceipt, PersistenceError>;

    async fn submit_assignment(
        &self,
        assignment_id: &str,
        content: &str,
        idempotency_key: &str,
    ) -> Result<SubmitReceipt, PersistenceError>;
}

#[derive(Debug, Serialize)]
struct SaveContentBody<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct SubmitAssignmentBody<'a> {
    content: &'a str,
    idempotency_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// JSON/HTTP implementation of the persistence contract.
pub struct HttpPersistenceClient {
    http: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpPersistenceClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        let base_url = base_url.into();
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(config.api_base_url.clone(), config.request_timeout())
    }

    fn assignment_url(&self, assignment_id: &str) -> String {
        format!("{}/api/v1/assignments/{}", self.base_url, assignment_id)
    }

    async fn read_error(response: reqwest::Response) -> PersistenceError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_status(status, &body)
    }
}

#[async_trait]
impl PersistenceClient for HttpPersistenceClient {
    async fn load_assignment(
        &self,
        assignment_id: &str,
    ) -> Result<LoadedAssignment, PersistenceError> {
        let url = self.assignment_url(assignment_id);
        tracing::debug!("Loading assignment from {}", url);

        let response = self
            .http
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        Ok(response.json::<LoadedAssignment>().await?)
    }

    async fn save_content(
        &self,
        assignment_id: &str,
        content: &str,
    ) -> Result<SaveReceipt, PersistenceError> {
        let url = format!("{}/content", self.assignment_url(assignment_id));
        tracing::debug!("Saving {} bytes of draft to {}", content.len(), url);

        let response = self
            .http
            .put(&url)
            .json(&SaveContentBody { content })
            .timeout(self.request_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        Ok(response.json::<SaveReceipt>().await?)
    }

    async fn submit_assignment(
        &self,
        assignment_id: &str,
        content: &str,
        idempotency_key: &str,
    ) -> Result<SubmitReceipt, PersistenceError> {
        let url = format!("{}/submit", self.assignment_url(assignment_id));
        tracing::debug!("Submitting assignment {} to {}", assignment_id, url);

        let response = self
            .http
            .post(&url)
            .json(&SubmitAssignmentBody {
                content,
                idempotency_key,
            })
            .timeout(self.request_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        Ok(response.json::<SubmitReceipt>().await?)
    }
}

fn classify_status(status: StatusCode, body: &str) -> PersistenceError {
    match status {
        StatusCode::NOT_FOUND => PersistenceError::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PersistenceError::Forbidden,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            PersistenceError::Validation(server_message(body))
        }
        _ => PersistenceError::Transport(format!(
            "server returned {}: {}",
            status,
            server_message(body)
        )),
    }
}

/// Pulls the `message` field out of a JSON error body, falling back to the
/// raw text.
fn server_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_not_found() {
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, ""),
            PersistenceError::NotFound
        ));
    }

    #[test]
    fn auth_failures_map_to_forbidden() {
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, ""),
            PersistenceError::Forbidden
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            PersistenceError::Forbidden
        ));
    }

    #[test]
    fn rejected_content_maps_to_validation_with_server_message() {
        let err = classify_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"content too large"}"#,
        );
        match err {
            PersistenceError::Validation(msg) => assert_eq!(msg, "content too large"),
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn server_errors_map_to_transport() {
        assert!(matches!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            PersistenceError::Transport(_)
        ));
    }

    #[test]
    fn plain_text_error_bodies_are_passed_through() {
        assert_eq!(server_message("  upstream exploded  "), "upstream exploded");
    }
}
