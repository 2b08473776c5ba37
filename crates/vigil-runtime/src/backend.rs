//! [`ExamBackend`] over the HTTP client.

use async_trait::async_trait;
use vigil_client::ExamServiceClient;
use vigil_core::{
    ExamId, ExamSettings, OpenedSession, ResultId, SubmissionReceipt, SubmissionRequest,
    SubmittedAnswer, ViolationReport,
};

use crate::{error::BackendError, platform::ExamBackend};

#[async_trait]
impl ExamBackend for ExamServiceClient {
    async fn get_exam(&self, exam_id: &ExamId) -> Result<ExamSettings, BackendError> {
        Ok(Self::get_exam(self, exam_id).await?)
    }

    async fn start_exam(&self, exam_id: &ExamId) -> Result<OpenedSession, BackendError> {
        Ok(Self::start_exam(self, exam_id).await?)
    }

    async fn record_answer(
        &self,
        result_id: &ResultId,
        answer: &SubmittedAnswer,
    ) -> Result<(), BackendError> {
        Ok(Self::record_answer(self, result_id, answer).await?)
    }

    async fn submit(&self, request: &SubmissionRequest) -> Result<SubmissionReceipt, BackendError> {
        Ok(Self::submit(self, request).await?)
    }

    async fn log_violation(&self, report: &ViolationReport) -> Result<(), BackendError> {
        Ok(Self::log_violation(self, report).await?)
    }
}
