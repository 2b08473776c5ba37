//! # vigil-client -- Typed client for the Exam Service
//!
//! Covers the five calls a proctored session makes:
//!
//! | Method | Path                          | Call                  |
//! |--------|-------------------------------|-----------------------|
//! | GET    | `/exams/{examId}`             | [`ExamServiceClient::get_exam`] |
//! | POST   | `/exams/{examId}/start`       | [`ExamServiceClient::start_exam`] |
//! | POST   | `/exams/answer/{resultId}`    | [`ExamServiceClient::record_answer`] |
//! | POST   | `/exams/submit/{resultId}`    | [`ExamServiceClient::submit`] |
//! | POST   | `/proctoring/log`             | [`ExamServiceClient::log_violation`] |
//!
//! Every request carries the student's bearer token. Only the metadata read
//! is retried with backoff. Writes are retried by their callers: answers on
//! the next change, submissions when the student asks.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub(crate) mod retry;
pub mod types;

use std::time::Duration;

pub use config::{ConfigError, ExamServiceConfig};
pub use error::ExamServiceError;
use vigil_core::{
    ExamId, ExamSettings, OpenedSession, ResultId, SubmissionReceipt, SubmissionRequest,
    SubmittedAnswer, ViolationReport,
};

use crate::types::{
    AnswerDto, ExamDto, ProctoringLogBody, StartExamResponse, SubmitBody, SubmitResponse,
};

/// Exam Service client.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ExamServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl ExamServiceClient {
    /// Create a client from configuration.
    pub fn new(config: ExamServiceConfig) -> Result<Self, ExamServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.api_token))
                        .map_err(|_| ExamServiceError::Config(ConfigError::InvalidToken))?,
                );
                headers
            })
            .build()
            .map_err(|e| ExamServiceError::Http { endpoint: "client_init".into(), source: e })?;

        let base_url = config.base_url.as_str().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    /// Fetch exam metadata.
    ///
    /// Calls `GET {base_url}/exams/{examId}`.
    pub async fn get_exam(&self, exam_id: &ExamId) -> Result<ExamSettings, ExamServiceError> {
        let endpoint = format!("GET /exams/{exam_id}");
        let url = format!("{}/exams/{exam_id}", self.base_url);

        let resp = crate::retry::retry_send(|| self.http.get(&url).send())
            .await
            .map_err(|e| ExamServiceError::Http { endpoint: endpoint.clone(), source: e })?;
        let resp = ensure_success(resp, &endpoint).await?;

        let dto: ExamDto = resp
            .json()
            .await
            .map_err(|e| ExamServiceError::Deserialization { endpoint, source: e })?;
        Ok(dto.into())
    }

    /// Open an attempt.
    ///
    /// Calls `POST {base_url}/exams/{examId}/start`. Not retried: each call
    /// may open a new attempt.
    pub async fn start_exam(&self, exam_id: &ExamId) -> Result<OpenedSession, ExamServiceError> {
        let endpoint = format!("POST /exams/{exam_id}/start");
        let url = format!("{}/exams/{exam_id}/start", self.base_url);

        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| ExamServiceError::Http { endpoint: endpoint.clone(), source: e })?;
        let resp = ensure_success(resp, &endpoint).await?;

        let dto: StartExamResponse = resp.json().await.map_err(|e| {
            ExamServiceError::Deserialization { endpoint: endpoint.clone(), source: e }
        })?;
        let session = OpenedSession::try_from(dto)
            .map_err(|reason| ExamServiceError::InvalidResponse { endpoint, reason })?;

        tracing::debug!(
            exam_id = %exam_id,
            result_id = %session.result_id,
            questions = session.questions.len(),
            "attempt opened"
        );
        Ok(session)
    }

    /// Persist one answer.
    ///
    /// Calls `POST {base_url}/exams/answer/{resultId}`.
    pub async fn record_answer(
        &self,
        result_id: &ResultId,
        answer: &SubmittedAnswer,
    ) -> Result<(), ExamServiceError> {
        let endpoint = "POST /exams/answer/{resultId}";
        let url = format!("{}/exams/answer/{result_id}", self.base_url);

        let resp = self
            .http
            .post(&url)
            .json(&AnswerDto::from(answer))
            .send()
            .await
            .map_err(|e| ExamServiceError::Http { endpoint: endpoint.into(), source: e })?;
        ensure_success(resp, endpoint).await?;
        Ok(())
    }

    /// Submit the attempt.
    ///
    /// Calls `POST {base_url}/exams/submit/{resultId}`.
    pub async fn submit(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionReceipt, ExamServiceError> {
        let endpoint = "POST /exams/submit/{resultId}";
        let url = format!("{}/exams/submit/{}", self.base_url, request.result_id);
        let body = SubmitBody { answers: request.answers.iter().map(AnswerDto::from).collect() };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExamServiceError::Http { endpoint: endpoint.into(), source: e })?;
        let resp = ensure_success(resp, endpoint).await?;

        let text = resp
            .text()
            .await
            .map_err(|e| ExamServiceError::Deserialization { endpoint: endpoint.into(), source: e })?;
        // Some deployments acknowledge with an empty body.
        let response: SubmitResponse = if text.trim().is_empty() {
            SubmitResponse::default()
        } else {
            serde_json::from_str(&text).map_err(|e| ExamServiceError::InvalidResponse {
                endpoint: endpoint.into(),
                reason: e.to_string(),
            })?
        };

        Ok(response.into_receipt(&request.result_id))
    }

    /// Forward a violation to the proctoring log.
    ///
    /// Calls `POST {base_url}/proctoring/log`.
    pub async fn log_violation(&self, report: &ViolationReport) -> Result<(), ExamServiceError> {
        let endpoint = "POST /proctoring/log";
        let url = format!("{}/proctoring/log", self.base_url);

        let resp = self
            .http
            .post(&url)
            .json(&ProctoringLogBody::from(report))
            .send()
            .await
            .map_err(|e| ExamServiceError::Http { endpoint: endpoint.into(), source: e })?;
        ensure_success(resp, endpoint).await?;
        Ok(())
    }
}

async fn ensure_success(
    resp: reqwest::Response,
    endpoint: &str,
) -> Result<reqwest::Response, ExamServiceError> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(ExamServiceError::Api { endpoint: endpoint.into(), status, body })
}
