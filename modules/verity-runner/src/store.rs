//! Client for the authoritative job store: job source, status sink, and
//! result sink. Every job-state transition goes through here — terminal
//! state is never held only in memory.

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use verity_common::{AnalysisReport, Job, JobStatus, LogLevel, VerityError};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fetch the authoritative view of a job.
    async fn fetch(&self, id: Uuid) -> Result<Job, VerityError>;

    /// Report a status transition or progress/log event.
    async fn set_status(
        &self,
        id: Uuid,
        status: JobStatus,
        progress: u8,
        level: LogLevel,
        message: &str,
    ) -> Result<(), VerityError>;

    /// Write the terminal result payload.
    async fn put_result(&self, id: Uuid, report: &AnalysisReport) -> Result<(), VerityError>;
}

pub struct HttpJobStore {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl HttpJobStore {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.token)
        }
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response, VerityError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VerityError::Store(format!("{what} returned {status}: {body}")));
        }
        Ok(resp)
    }
}

#[async_trait]
impl JobStore for HttpJobStore {
    async fn fetch(&self, id: Uuid) -> Result<Job, VerityError> {
        let url = format!("{}/v1/jobs/{id}", self.base_url);
        let resp = self
            .authed(self.http.get(&url))
            .send()
            .await
            .map_err(|e| VerityError::Store(format!("fetch job: {e}")))?;
        let resp = Self::check(resp, "job fetch").await?;
        resp.json::<Job>()
            .await
            .map_err(|e| VerityError::Store(format!("decode job: {e}")))
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: JobStatus,
        progress: u8,
        level: LogLevel,
        message: &str,
    ) -> Result<(), VerityError> {
        let url = format!("{}/internal/analysis/jobs/{id}/status", self.base_url);
        let resp = self
            .authed(self.http.put(&url))
            .json(&json!({
                "status": status,
                "progress": progress.min(100),
                "level": level,
                "message": message,
            }))
            .send()
            .await
            .map_err(|e| VerityError::Store(format!("status update: {e}")))?;
        Self::check(resp, "status update").await?;
        Ok(())
    }

    async fn put_result(&self, id: Uuid, report: &AnalysisReport) -> Result<(), VerityError> {
        let url = format!("{}/internal/analysis/jobs/{id}/result", self.base_url);
        let resp = self
            .authed(self.http.put(&url))
            .json(&json!({ "resultPayload": report }))
            .send()
            .await
            .map_err(|e| VerityError::Store(format!("result update: {e}")))?;
        Self::check(resp, "result update").await?;
        Ok(())
    }
}
