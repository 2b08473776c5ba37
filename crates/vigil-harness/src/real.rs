//! Real controller behind the model's interface.
//!
//! Wraps a [`SessionController`] on a [`SimEnv`] and translates each
//! [`Operation`] into the events the runtime would deliver. Submit actions
//! are recorded instead of executed; the outcome arrives as a later
//! operation.

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use vigil_core::{
    IntegritySignal, OptionId, QuestionId, SessionAction, SessionController, SessionError,
    SessionEvent, SessionPolicy, SessionStatus, SubmissionReceipt, SubmittedAnswer,
};

use crate::{
    model::{
        ModelSignal, ModelSubmission, ObservableState, Operation, OperationError,
        OperationResult, option_label, question_id,
    },
    scenario::{self, RESULT_ID},
    sim_env::SimEnv,
};

/// Controller opened with integrity monitoring and no camera.
#[derive(Debug)]
pub struct RealSession {
    env: SimEnv,
    controller: SessionController<SimEnv>,
    questions: usize,
    submissions: Vec<ModelSubmission>,
}

impl RealSession {
    /// Open a session with `questions` questions lasting `duration_secs`.
    pub fn open(
        questions: usize,
        duration_secs: u64,
        tab_switch_limit: u32,
        seed: u64,
    ) -> Result<Self, SessionError> {
        let env = SimEnv::with_seed(seed);
        let exam = scenario::exam(scenario::signals_only(tab_switch_limit));
        let token = scenario::ready_token(&env, &exam).ok_or_else(|| SessionError::NotReady {
            reason: "scenario gate did not reach ready".to_string(),
        })?;

        let mut controller = SessionController::new(env.clone(), exam, SessionPolicy::default());
        controller.handle(SessionEvent::Open {
            token,
            session: scenario::opened(questions, Duration::from_secs(duration_secs)),
        })?;

        Ok(Self { env, controller, questions, submissions: Vec::new() })
    }

    /// The wrapped controller.
    pub fn controller(&self) -> &SessionController<SimEnv> {
        &self.controller
    }

    /// Apply an operation and return the result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        let event = match *op {
            Operation::Answer { question, option } => {
                let index = self.index(question);
                SessionEvent::Answer {
                    question_id: QuestionId::new(question_id(index)),
                    option_id: OptionId::new(option_label(index, option)),
                }
            },
            Operation::ToggleFlag { question } => SessionEvent::ToggleFlag {
                question_id: QuestionId::new(question_id(self.index(question))),
            },
            Operation::Signal(signal) => SessionEvent::Signal(match signal {
                ModelSignal::VisibilityLost => IntegritySignal::VisibilityLost,
                ModelSignal::ContextMenu => IntegritySignal::ContextMenu,
                ModelSignal::CopyAttempt => IntegritySignal::CopyAttempt,
            }),
            Operation::AdvanceTime { secs } => {
                self.env.advance(Duration::from_secs(u64::from(secs)));
                SessionEvent::Tick
            },
            Operation::Submit => SessionEvent::SubmitRequested,
            Operation::SubmitOutcome { success: true } => SessionEvent::SubmitConfirmed {
                receipt: SubmissionReceipt {
                    result_id: RESULT_ID.into(),
                    score: None,
                    max_score: None,
                },
            },
            Operation::SubmitOutcome { success: false } => {
                SessionEvent::SubmitFailed { reason: "service unavailable".to_string() }
            },
            Operation::Retry => SessionEvent::RetrySubmit,
            Operation::Teardown => SessionEvent::Teardown,
        };

        match self.controller.handle(event) {
            Ok(actions) => {
                self.record(actions);
                OperationResult::Ok
            },
            Err(err) => OperationResult::Error(classify(&err)),
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        let (answers, flagged) = self.controller.answers().map_or_else(
            || (BTreeMap::new(), BTreeSet::new()),
            |store| {
                let answers = store.snapshot().into_iter().map(pair).collect();
                let flagged = store
                    .questions()
                    .iter()
                    .filter(|q| store.is_flagged(&q.id))
                    .map(|q| q.id.as_str().to_string())
                    .collect();
                (answers, flagged)
            },
        );

        ObservableState {
            status: self.controller.status(),
            answers,
            flagged,
            violation_count: self.controller.violation_count(),
            violations_logged: self.controller.violation_log().len(),
            submissions: self.submissions.clone(),
        }
    }

    /// Lifecycle status.
    pub fn status(&self) -> SessionStatus {
        self.controller.status()
    }

    /// Same reduction the model applies; the top index is an unknown id.
    fn index(&self, question: u8) -> usize {
        usize::from(question) % (self.questions + 1)
    }

    fn record(&mut self, actions: Vec<SessionAction>) {
        for action in actions {
            if let SessionAction::Submit(request) = action {
                self.submissions.push(ModelSubmission {
                    trigger: request.trigger,
                    answers: request.answers.into_iter().map(pair).collect(),
                });
            }
        }
    }
}

fn pair(answer: SubmittedAnswer) -> (String, String) {
    (answer.question_id.as_str().to_string(), answer.selected_option.as_str().to_string())
}

fn classify(err: &SessionError) -> OperationError {
    match err {
        SessionError::UnknownQuestion { .. } => OperationError::UnknownQuestion,
        SessionError::InvalidOption { .. } => OperationError::InvalidOption,
        SessionError::AnswersClosed { .. } => OperationError::AnswersClosed,
        _ => OperationError::InvalidState,
    }
}
