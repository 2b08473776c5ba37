//! Model session - the reference implementation.
//!
//! Plain maps and counters, no timer object, no guard, no monitors. If the
//! real controller and this disagree, one of them is wrong.

use std::collections::{BTreeMap, BTreeSet};

use vigil_core::{SessionStatus, SubmitTrigger};

use super::operation::{
    ModelSignal, Operation, OperationError, OperationResult, option_label, option_valid,
    question_id,
};

/// One submit network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSubmission {
    /// What caused the submission.
    pub trigger: SubmitTrigger,
    /// Payload, question id to option id.
    pub answers: BTreeMap<String, String>,
}

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Current answers, question id to option id.
    pub answers: BTreeMap<String, String>,
    /// Flagged question ids.
    pub flagged: BTreeSet<String>,
    /// Escalating violations counted.
    pub violation_count: u32,
    /// Violations logged, escalating or not.
    pub violations_logged: usize,
    /// Submit calls sent, retries included.
    pub submissions: Vec<ModelSubmission>,
}

/// Reference session opened with integrity monitoring and no camera.
#[derive(Debug, Clone)]
pub struct ModelSession {
    questions: usize,
    duration_secs: u64,
    tab_switch_limit: u32,
    elapsed_secs: u64,
    status: SessionStatus,
    answers: BTreeMap<String, String>,
    flagged: BTreeSet<String>,
    violation_count: u32,
    violations_logged: usize,
    submissions: Vec<ModelSubmission>,
    in_flight: bool,
}

impl ModelSession {
    /// Session already open with `questions` questions.
    pub fn new(questions: usize, duration_secs: u64, tab_switch_limit: u32) -> Self {
        Self {
            questions,
            duration_secs,
            tab_switch_limit,
            elapsed_secs: 0,
            status: SessionStatus::InProgress,
            answers: BTreeMap::new(),
            flagged: BTreeSet::new(),
            violation_count: 0,
            violations_logged: 0,
            submissions: Vec::new(),
            in_flight: false,
        }
    }

    /// Number of questions.
    pub fn questions(&self) -> usize {
        self.questions
    }

    /// Lifecycle status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Apply an operation and return the result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        // One terminal transition; everything after is ignored.
        if self.status.is_terminal() {
            return OperationResult::Ok;
        }

        match *op {
            Operation::Answer { question, option } => self.apply_answer(question, option),
            Operation::ToggleFlag { question } => self.apply_toggle_flag(question),
            Operation::Signal(signal) => {
                self.apply_signal(signal);
                OperationResult::Ok
            },
            Operation::AdvanceTime { secs } => {
                self.elapsed_secs += u64::from(secs);
                if self.elapsed_secs >= self.duration_secs {
                    self.begin_submission(SubmitTrigger::TimerExpired);
                }
                OperationResult::Ok
            },
            Operation::Submit => {
                self.begin_submission(SubmitTrigger::Manual);
                OperationResult::Ok
            },
            Operation::SubmitOutcome { success } => {
                if self.status == SessionStatus::Submitting && self.in_flight {
                    self.in_flight = false;
                    if success {
                        self.status = SessionStatus::Submitted;
                    }
                }
                OperationResult::Ok
            },
            Operation::Retry => {
                if self.status == SessionStatus::Submitting && !self.in_flight {
                    if let Some(last) = self.submissions.last().cloned() {
                        self.submissions.push(last);
                        self.in_flight = true;
                    }
                }
                OperationResult::Ok
            },
            Operation::Teardown => {
                self.status = SessionStatus::Terminated;
                OperationResult::Ok
            },
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            status: self.status,
            answers: self.answers.clone(),
            flagged: self.flagged.clone(),
            violation_count: self.violation_count,
            violations_logged: self.violations_logged,
            submissions: self.submissions.clone(),
        }
    }

    fn resolve(&self, question: u8) -> Option<usize> {
        let index = usize::from(question) % (self.questions + 1);
        (index < self.questions).then_some(index)
    }

    fn apply_answer(&mut self, question: u8, option: u8) -> OperationResult {
        if self.status != SessionStatus::InProgress {
            return OperationResult::Error(OperationError::AnswersClosed);
        }
        let Some(index) = self.resolve(question) else {
            return OperationResult::Error(OperationError::UnknownQuestion);
        };

        let label = option_label(index, option);
        if !option_valid(index, &label) {
            return OperationResult::Error(OperationError::InvalidOption);
        }
        self.answers.insert(question_id(index), label);
        OperationResult::Ok
    }

    fn apply_toggle_flag(&mut self, question: u8) -> OperationResult {
        let Some(index) = self.resolve(question) else {
            return OperationResult::Error(OperationError::UnknownQuestion);
        };

        let id = question_id(index);
        if !self.flagged.remove(&id) {
            self.flagged.insert(id);
        }
        OperationResult::Ok
    }

    fn apply_signal(&mut self, signal: ModelSignal) {
        if self.status != SessionStatus::InProgress {
            return;
        }

        self.violations_logged += 1;
        if signal == ModelSignal::VisibilityLost {
            self.violation_count += 1;
            if self.violation_count >= self.tab_switch_limit {
                self.begin_submission(SubmitTrigger::ViolationLimit);
            }
        }
    }

    fn begin_submission(&mut self, trigger: SubmitTrigger) {
        if self.status != SessionStatus::InProgress {
            return;
        }
        self.status = SessionStatus::Submitting;
        self.in_flight = true;
        self.submissions.push(ModelSubmission { trigger, answers: self.answers.clone() });
    }
}
