//! Answer store.
//!
//! Holds the student's answers for the active session. Recording an answer
//! updates local state synchronously; the caller is handed the write to
//! persist. Navigation and review flags are local UI state and never leave
//! this module.

use std::collections::{BTreeSet, HashMap};

use crate::{
    error::SessionError,
    exam::{OptionId, Question, QuestionId},
};

/// A single answer as submitted to grading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedAnswer {
    /// Question answered.
    pub question_id: QuestionId,
    /// Selected option.
    pub selected_option: OptionId,
}

/// Question navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Move to the next question (stays on the last one).
    Next,
    /// Move to the previous question (stays on the first one).
    Previous,
    /// Jump to a 0-based question index.
    JumpTo(usize),
}

/// Counts shown in the question palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaletteSummary {
    /// Total questions.
    pub total: usize,
    /// Questions with an answer.
    pub answered: usize,
    /// Questions without an answer.
    pub unanswered: usize,
    /// Questions flagged for review.
    pub flagged: usize,
}

/// In-memory answer set for one session.
#[derive(Debug, Clone)]
pub struct AnswerStore {
    questions: Vec<Question>,
    positions: HashMap<QuestionId, usize>,
    answers: HashMap<QuestionId, OptionId>,
    flagged: BTreeSet<QuestionId>,
    cursor: usize,
}

impl AnswerStore {
    /// Create a store for the given questions (display order).
    pub fn new(questions: Vec<Question>) -> Self {
        let positions = questions.iter().enumerate().map(|(i, q)| (q.id.clone(), i)).collect();
        Self {
            questions,
            positions,
            answers: HashMap::new(),
            flagged: BTreeSet::new(),
            cursor: 0,
        }
    }

    /// Questions in display order.
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Record an answer, replacing any earlier answer to the same question.
    ///
    /// Returns the write the caller should persist.
    pub fn record(
        &mut self,
        question_id: QuestionId,
        option_id: OptionId,
    ) -> Result<SubmittedAnswer, SessionError> {
        let position = *self
            .positions
            .get(&question_id)
            .ok_or_else(|| SessionError::UnknownQuestion { question_id: question_id.clone() })?;

        if !self.questions[position].kind.accepts(&option_id) {
            return Err(SessionError::InvalidOption { question_id, option_id });
        }

        self.answers.insert(question_id.clone(), option_id.clone());
        Ok(SubmittedAnswer { question_id, selected_option: option_id })
    }

    /// Current answer to a question.
    pub fn answer(&self, question_id: &QuestionId) -> Option<&OptionId> {
        self.answers.get(question_id)
    }

    /// Number of answered questions.
    pub fn answered(&self) -> usize {
        self.answers.len()
    }

    /// Submission payload: one entry per answered question, in display order.
    /// Unanswered questions are absent.
    pub fn snapshot(&self) -> Vec<SubmittedAnswer> {
        self.questions
            .iter()
            .filter_map(|q| {
                self.answers.get(&q.id).map(|option| SubmittedAnswer {
                    question_id: q.id.clone(),
                    selected_option: option.clone(),
                })
            })
            .collect()
    }

    /// Index of the question on screen.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Question on screen.
    pub fn current(&self) -> Option<&Question> {
        self.questions.get(self.cursor)
    }

    /// Move the cursor.
    pub fn navigate(&mut self, navigation: Navigation) -> Result<usize, SessionError> {
        let last = self.questions.len().saturating_sub(1);
        self.cursor = match navigation {
            Navigation::Next => (self.cursor + 1).min(last),
            Navigation::Previous => self.cursor.saturating_sub(1),
            Navigation::JumpTo(index) if index < self.questions.len() => index,
            Navigation::JumpTo(index) => {
                return Err(SessionError::NavigationOutOfRange {
                    index,
                    total: self.questions.len(),
                });
            },
        };
        Ok(self.cursor)
    }

    /// Toggle the review flag. Returns whether the question is now flagged.
    pub fn toggle_flag(&mut self, question_id: QuestionId) -> Result<bool, SessionError> {
        if !self.positions.contains_key(&question_id) {
            return Err(SessionError::UnknownQuestion { question_id });
        }

        if self.flagged.remove(&question_id) {
            Ok(false)
        } else {
            self.flagged.insert(question_id);
            Ok(true)
        }
    }

    /// Whether a question is flagged for review.
    pub fn is_flagged(&self, question_id: &QuestionId) -> bool {
        self.flagged.contains(question_id)
    }

    /// Palette counts.
    pub fn summary(&self) -> PaletteSummary {
        let total = self.questions.len();
        let answered = self.answers.len();
        PaletteSummary {
            total,
            answered,
            unanswered: total - answered,
            flagged: self.flagged.len(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::exam::{AnswerOption, QuestionKind};

    fn questions(n: usize) -> Vec<Question> {
        (0..n)
            .map(|i| Question {
                id: QuestionId::new(format!("q{i}")),
                text: format!("Question {i}"),
                kind: if i % 2 == 0 {
                    QuestionKind::Mcq {
                        options: ["a", "b", "c", "d"]
                            .iter()
                            .map(|o| AnswerOption { id: (*o).into(), text: o.to_uppercase() })
                            .collect(),
                    }
                } else {
                    QuestionKind::TrueFalse
                },
            })
            .collect()
    }

    #[test]
    fn later_answer_wins() {
        let mut store = AnswerStore::new(questions(5));
        store.record("q0".into(), "a".into()).unwrap();
        store.record("q0".into(), "b".into()).unwrap();

        assert_eq!(
            store.snapshot(),
            vec![SubmittedAnswer { question_id: "q0".into(), selected_option: "b".into() }]
        );
    }

    #[test]
    fn snapshot_omits_unanswered_and_keeps_display_order() {
        let mut store = AnswerStore::new(questions(5));
        store.record("q3".into(), "true".into()).unwrap();
        store.record("q0".into(), "c".into()).unwrap();

        let ids: Vec<_> = store.snapshot().into_iter().map(|a| a.question_id).collect();
        assert_eq!(ids, vec![QuestionId::from("q0"), QuestionId::from("q3")]);
    }

    #[test]
    fn rejects_unknown_question_and_invalid_option() {
        let mut store = AnswerStore::new(questions(2));

        let err = store.record("q9".into(), "a".into()).unwrap_err();
        assert!(matches!(err, SessionError::UnknownQuestion { .. }));

        let err = store.record("q1".into(), "a".into()).unwrap_err();
        assert!(matches!(err, SessionError::InvalidOption { .. }));

        assert_eq!(store.answered(), 0);
    }

    #[test]
    fn navigation_clamps_and_validates() {
        let mut store = AnswerStore::new(questions(3));

        assert_eq!(store.navigate(Navigation::Previous).unwrap(), 0);
        assert_eq!(store.navigate(Navigation::Next).unwrap(), 1);
        assert_eq!(store.navigate(Navigation::Next).unwrap(), 2);
        assert_eq!(store.navigate(Navigation::Next).unwrap(), 2);
        assert_eq!(store.navigate(Navigation::JumpTo(0)).unwrap(), 0);
        assert!(matches!(
            store.navigate(Navigation::JumpTo(3)),
            Err(SessionError::NavigationOutOfRange { index: 3, total: 3 })
        ));
        assert_eq!(store.cursor(), 0);
    }

    #[test]
    fn flags_toggle_and_never_reach_payload() {
        let mut store = AnswerStore::new(questions(3));

        assert!(store.toggle_flag("q1".into()).unwrap());
        assert!(store.is_flagged(&"q1".into()));
        assert!(store.snapshot().is_empty());
        assert!(!store.toggle_flag("q1".into()).unwrap());
        assert!(!store.is_flagged(&"q1".into()));
    }

    #[test]
    fn summary_counts() {
        let mut store = AnswerStore::new(questions(4));
        store.record("q0".into(), "a".into()).unwrap();
        store.record("q1".into(), "false".into()).unwrap();
        store.toggle_flag("q2".into()).unwrap();

        assert_eq!(
            store.summary(),
            PaletteSummary { total: 4, answered: 2, unanswered: 2, flagged: 1 }
        );
    }

    proptest! {
        #[test]
        fn prop_one_entry_per_question_with_last_value(
            writes in proptest::collection::vec((0usize..6, 0usize..4), 0..40),
        ) {
            let mut store = AnswerStore::new(questions(6));
            let mut expected: HashMap<QuestionId, OptionId> = HashMap::new();

            for (q, o) in writes {
                let question_id = QuestionId::new(format!("q{q}"));
                let option_id = if q % 2 == 0 {
                    OptionId::from(["a", "b", "c", "d"][o])
                } else {
                    OptionId::from(if o % 2 == 0 { "true" } else { "false" })
                };
                store.record(question_id.clone(), option_id.clone()).unwrap();
                expected.insert(question_id, option_id);
            }

            let payload = store.snapshot();
            prop_assert_eq!(payload.len(), expected.len());
            for answer in payload {
                prop_assert_eq!(Some(&answer.selected_option), expected.get(&answer.question_id));
            }
        }
    }
}
