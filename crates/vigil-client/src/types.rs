//! Wire types for the Exam Service.
//!
//! Field names are camelCase on the wire. Identifiers may arrive as `id` or
//! as the document-store `_id`. Everything is converted into `vigil-core`
//! types at the edge; nothing outside this crate sees these structs.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_core::{
    AnswerOption, ExamId, ExamSettings, OpenedSession, OptionId, ProctoringSettings, Question,
    QuestionId, QuestionKind, ResultId, Snapshot, StudentId, SubmissionReceipt, SubmittedAnswer,
    ViolationReport, exam::DEFAULT_TAB_SWITCH_LIMIT,
};

// -- Exam metadata -----------------------------------------------------------

/// `GET /exams/{examId}` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamDto {
    /// Exam identifier.
    #[serde(alias = "_id")]
    pub id: String,
    /// Display title.
    pub title: String,
    /// Nominal duration in minutes.
    pub duration: u64,
    /// Instruction lines.
    #[serde(default)]
    pub instructions: Vec<String>,
    /// Proctoring configuration; absent means unproctored.
    #[serde(default)]
    pub proctoring: ProctoringDto,
}

/// Proctoring block of an exam.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProctoringDto {
    /// Monitoring enabled.
    pub enabled: bool,
    /// Camera mandatory.
    pub camera_required: bool,
    /// Identity stage required.
    pub identity_verification: bool,
    /// Tab switches tolerated.
    pub tab_switch_limit: Option<u32>,
}

impl From<ProctoringDto> for ProctoringSettings {
    fn from(dto: ProctoringDto) -> Self {
        Self {
            enabled: dto.enabled,
            camera_required: dto.camera_required,
            identity_verification: dto.identity_verification,
            tab_switch_limit: dto.tab_switch_limit.unwrap_or(DEFAULT_TAB_SWITCH_LIMIT),
        }
    }
}

impl From<ExamDto> for ExamSettings {
    fn from(dto: ExamDto) -> Self {
        Self {
            id: ExamId::new(dto.id),
            title: dto.title,
            duration: Duration::from_secs(dto.duration.saturating_mul(60)),
            instructions: dto.instructions,
            proctoring: dto.proctoring.into(),
        }
    }
}

// -- Start -------------------------------------------------------------------

/// `POST /exams/{examId}/start` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExamResponse {
    /// Exam metadata echoed back.
    pub exam: Option<ExamDto>,
    /// Questions in display order.
    pub questions: Vec<QuestionDto>,
    /// Attempt identifier.
    pub result_id: String,
    /// Time granted for this attempt. Authoritative.
    pub duration_seconds: u64,
    /// Student the attempt belongs to, when the service reports it.
    #[serde(default)]
    pub student_id: Option<String>,
}

/// A question on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDto {
    /// Question identifier.
    #[serde(alias = "_id")]
    pub id: String,
    /// Prompt text.
    #[serde(alias = "question")]
    pub text: String,
    /// `mcq` or `true_false`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Options for multiple-choice questions.
    #[serde(default)]
    pub options: Vec<OptionDto>,
}

/// An option is either a bare string or an `{id, text}` object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OptionDto {
    /// Bare string used as both id and text.
    Text(String),
    /// Full option object.
    Object {
        /// Option identifier.
        #[serde(alias = "_id")]
        id: String,
        /// Display text.
        text: String,
    },
}

impl From<OptionDto> for AnswerOption {
    fn from(dto: OptionDto) -> Self {
        match dto {
            OptionDto::Text(text) => Self { id: OptionId::new(text.clone()), text },
            OptionDto::Object { id, text } => Self { id: OptionId::new(id), text },
        }
    }
}

impl TryFrom<QuestionDto> for Question {
    type Error = String;

    fn try_from(dto: QuestionDto) -> Result<Self, Self::Error> {
        let kind = match dto.kind.to_ascii_lowercase().replace('-', "_").as_str() {
            "mcq" | "multiple_choice" => {
                if dto.options.is_empty() {
                    return Err(format!("question {} has no options", dto.id));
                }
                QuestionKind::Mcq { options: dto.options.into_iter().map(Into::into).collect() }
            },
            "true_false" | "truefalse" | "boolean" => QuestionKind::TrueFalse,
            other => return Err(format!("question {} has unsupported type {other:?}", dto.id)),
        };

        Ok(Self { id: QuestionId::new(dto.id), text: dto.text, kind })
    }
}

impl TryFrom<StartExamResponse> for OpenedSession {
    type Error = String;

    fn try_from(dto: StartExamResponse) -> Result<Self, Self::Error> {
        let questions =
            dto.questions.into_iter().map(Question::try_from).collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            result_id: ResultId::new(dto.result_id),
            student_id: StudentId::new(dto.student_id.unwrap_or_default()),
            duration: Duration::from_secs(dto.duration_seconds),
            questions,
        })
    }
}

// -- Answers and submission --------------------------------------------------

/// One answer, as persisted and as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerDto<'a> {
    /// Question answered.
    pub question_id: &'a str,
    /// Selected option.
    pub selected_option: &'a str,
}

impl<'a> From<&'a SubmittedAnswer> for AnswerDto<'a> {
    fn from(answer: &'a SubmittedAnswer) -> Self {
        Self {
            question_id: answer.question_id.as_str(),
            selected_option: answer.selected_option.as_str(),
        }
    }
}

/// `POST /exams/submit/{resultId}` body.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitBody<'a> {
    /// Answered questions only.
    pub answers: Vec<AnswerDto<'a>>,
}

/// `POST /exams/submit/{resultId}` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitResponse {
    /// Graded result, when available.
    #[serde(default)]
    pub result: Option<ResultDto>,
}

/// Result block of a submit response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResultDto {
    /// Attempt identifier.
    #[serde(alias = "_id")]
    pub id: Option<String>,
    /// Score.
    pub score: Option<u32>,
    /// Maximum score.
    #[serde(alias = "totalMarks")]
    pub max_score: Option<u32>,
}

impl SubmitResponse {
    /// Convert into a receipt, falling back to the submitted attempt id.
    pub fn into_receipt(self, submitted: &ResultId) -> SubmissionReceipt {
        let result = self.result.unwrap_or_default();
        SubmissionReceipt {
            result_id: result.id.map_or_else(|| submitted.clone(), ResultId::new),
            score: result.score,
            max_score: result.max_score,
        }
    }
}

// -- Proctoring log ----------------------------------------------------------

/// `POST /proctoring/log` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProctoringLogBody {
    /// Exam.
    pub exam_id: String,
    /// Attempt.
    pub result_id: String,
    /// Violation category.
    pub event_type: &'static str,
    /// Human-readable description.
    pub description: String,
    /// Severity.
    pub severity: &'static str,
    /// Evidence frame as a JPEG data URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    /// Ordering and deduplication metadata.
    pub metadata: LogMetadata,
}

/// Metadata attached to each proctoring log entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMetadata {
    /// When the violation was detected.
    pub timestamp: DateTime<Utc>,
    /// Position in the session's violation log.
    pub sequence: u64,
    /// Client-side identifier for deduplicating redeliveries.
    pub client_event_id: String,
    /// Escalating violations so far.
    pub violation_count: u32,
    /// Escalation limit.
    pub tab_switch_limit: u32,
}

impl From<&ViolationReport> for ProctoringLogBody {
    fn from(report: &ViolationReport) -> Self {
        let event = &report.event;
        Self {
            exam_id: report.exam_id.to_string(),
            result_id: report.result_id.to_string(),
            event_type: event.kind.as_str(),
            description: event.description.clone(),
            severity: event.severity.as_str(),
            screenshot: event.evidence.as_ref().map(jpeg_data_url),
            metadata: LogMetadata {
                timestamp: event.timestamp,
                sequence: report.sequence,
                client_event_id: format!("{:016x}", report.client_event_id),
                violation_count: report.violation_count,
                tab_switch_limit: report.tab_switch_limit,
            },
        }
    }
}

/// Encode a snapshot as `data:image/jpeg;base64,...`.
pub fn jpeg_data_url(snapshot: &Snapshot) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(&snapshot.image))
}
