//! Reflection Form — the multi-section wizard run after a data entry raised
//! one or more event counters.
//!
//! Flow per section:
//! rating → [reject sub-type] → strengths → weaknesses → mood
//!        → [reject reasons → [reject other]] → next section
//!
//! Bracketed steps exist only for rejection sections; `SectionStep::Rejection`
//! is never entered for any other section. Nothing is persisted here: the
//! final transition hands back every record at once and the caller writes
//! them in one batch.

use std::collections::BTreeSet;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::funnel::triggers::ChangedSection;
use crate::models::feedback::{FeedbackRecord, RejectReason, RejectSubType};
use crate::models::funnel::FunnelShape;
use crate::reflection::prompts::{build_prompt, FormPrompt};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// Where the counters behind this form were written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormContext {
    pub user_id: i64,
    pub week_start: NaiveDate,
    pub channel: String,
    pub funnel_shape: FunnelShape,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectionStep {
    SubType,
    Reasons,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SectionStep {
    Rating,
    Strengths,
    Weaknesses,
    Mood,
    Rejection(RejectionStep),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FormState {
    OfferPending,
    Section { index: usize, step: SectionStep },
    Complete,
    Cancelled,
}

impl FormState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FormState::Complete | FormState::Cancelled)
    }
}

/// One user interaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormInput {
    Accept,
    Decline,
    Rating { value: u8 },
    SubType { sub_type: RejectSubType },
    Text { text: String },
    Skip,
    ToggleReason { reason: RejectReason },
    Done,
    Cancel,
}

impl FormInput {
    fn kind(&self) -> &'static str {
        match self {
            FormInput::Accept => "accept",
            FormInput::Decline => "decline",
            FormInput::Rating { .. } => "rating",
            FormInput::SubType { .. } => "sub_type",
            FormInput::Text { .. } => "text",
            FormInput::Skip => "skip",
            FormInput::ToggleReason { .. } => "toggle_reason",
            FormInput::Done => "done",
            FormInput::Cancel => "cancel",
        }
    }
}

/// Rejected input. The form state is left untouched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("rating must be between 1 and 5, got {0}")]
    RatingOutOfRange(u8),

    #[error("text must not be empty")]
    EmptyText,

    #[error("'{got}' is not accepted here, expected {expected}")]
    UnexpectedInput {
        expected: &'static str,
        got: &'static str,
    },

    #[error("the form is already finished")]
    Finished,
}

#[derive(Debug)]
pub enum Transition {
    Prompt(FormPrompt),
    /// The last section was answered; persist all records atomically.
    Completed(Vec<FeedbackRecord>),
    Cancelled,
}

/// Rejection-only answers.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RejectionDraft {
    pub sub_type: Option<RejectSubType>,
    pub reasons: BTreeSet<RejectReason>,
    pub other: Option<String>,
}

/// Answers collected so far for the current section.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SectionDraft {
    pub rating_overall: Option<u8>,
    pub strengths: Option<String>,
    pub weaknesses: Option<String>,
    pub rating_mood: Option<u8>,
    pub rejection: Option<RejectionDraft>,
}

/// A fully answered section.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SectionAnswer {
    rating_overall: u8,
    strengths: Option<String>,
    weaknesses: Option<String>,
    rating_mood: u8,
    reject_sub_type: Option<RejectSubType>,
    reject_reasons: Option<BTreeSet<RejectReason>>,
    reject_reason_other: Option<String>,
}

impl SectionDraft {
    fn for_section(section: &ChangedSection) -> Self {
        Self {
            rejection: section.is_rejection_kind.then(RejectionDraft::default),
            ..Default::default()
        }
    }

    fn finish(self) -> Option<SectionAnswer> {
        let (reject_sub_type, reject_reasons, reject_reason_other) = match self.rejection {
            Some(r) => (
                Some(r.sub_type?),
                (!r.reasons.is_empty()).then_some(r.reasons),
                r.other,
            ),
            None => (None, None, None),
        };
        Some(SectionAnswer {
            rating_overall: self.rating_overall?,
            strengths: self.strengths,
            weaknesses: self.weaknesses,
            rating_mood: self.rating_mood?,
            reject_sub_type,
            reject_reasons,
            reject_reason_other,
        })
    }
}

/// Working memory of one form run. Lives only in process memory.
#[derive(Debug, Clone)]
pub struct ReflectionForm {
    run_id: Uuid,
    context: FormContext,
    sections: Vec<ChangedSection>,
    answered: Vec<SectionAnswer>,
    draft: SectionDraft,
    state: FormState,
}

fn validate_rating(value: u8) -> Result<u8, FormError> {
    if (MIN_RATING..=MAX_RATING).contains(&value) {
        Ok(value)
    } else {
        Err(FormError::RatingOutOfRange(value))
    }
}

fn validate_text(text: &str) -> Result<String, FormError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(FormError::EmptyText)
    } else {
        Ok(trimmed.to_string())
    }
}

impl ReflectionForm {
    /// Opens a form in `OfferPending`. Returns `None` when nothing changed.
    pub fn offer(context: FormContext, sections: Vec<ChangedSection>) -> Option<Self> {
        if sections.is_empty() {
            return None;
        }
        Some(Self {
            run_id: Uuid::new_v4(),
            context,
            sections,
            answered: Vec::new(),
            draft: SectionDraft::default(),
            state: FormState::OfferPending,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn context(&self) -> &FormContext {
        &self.context
    }

    pub fn sections(&self) -> &[ChangedSection] {
        &self.sections
    }

    pub fn state(&self) -> FormState {
        self.state
    }

    pub fn draft(&self) -> &SectionDraft {
        &self.draft
    }

    /// True once the user has accepted the offer.
    pub fn is_started(&self) -> bool {
        matches!(self.state, FormState::Section { .. })
    }

    /// The question for the current state, or `None` once terminal.
    pub fn prompt(&self) -> Option<FormPrompt> {
        (!self.state.is_terminal()).then(|| build_prompt(self))
    }

    pub fn apply(&mut self, input: FormInput) -> Result<Transition, FormError> {
        if self.state.is_terminal() {
            return Err(FormError::Finished);
        }
        if input == FormInput::Cancel {
            self.state = FormState::Cancelled;
            return Ok(Transition::Cancelled);
        }

        let (index, step) = match self.state {
            FormState::OfferPending => {
                return match input {
                    FormInput::Accept => {
                        self.enter_section(0);
                        Ok(self.prompt_transition())
                    }
                    FormInput::Decline => {
                        self.state = FormState::Cancelled;
                        Ok(Transition::Cancelled)
                    }
                    other => Err(unexpected("accept or decline", &other)),
                };
            }
            FormState::Section { index, step } => (index, step),
            FormState::Complete | FormState::Cancelled => return Err(FormError::Finished),
        };
        let is_rejection = self.draft.rejection.is_some();

        match (step, input) {
            (SectionStep::Rating, FormInput::Rating { value }) => {
                self.draft.rating_overall = Some(validate_rating(value)?);
                let next = if is_rejection {
                    SectionStep::Rejection(RejectionStep::SubType)
                } else {
                    SectionStep::Strengths
                };
                self.goto(index, next);
            }
            (SectionStep::Rating, other) => return Err(unexpected("a rating", &other)),

            (SectionStep::Strengths, FormInput::Text { text }) => {
                self.draft.strengths = Some(validate_text(&text)?);
                self.goto(index, SectionStep::Weaknesses);
            }
            (SectionStep::Strengths, FormInput::Skip) => {
                self.draft.strengths = None;
                self.goto(index, SectionStep::Weaknesses);
            }
            (SectionStep::Strengths, other) => return Err(unexpected("text or skip", &other)),

            (SectionStep::Weaknesses, FormInput::Text { text }) => {
                self.draft.weaknesses = Some(validate_text(&text)?);
                self.goto(index, SectionStep::Mood);
            }
            (SectionStep::Weaknesses, FormInput::Skip) => {
                self.draft.weaknesses = None;
                self.goto(index, SectionStep::Mood);
            }
            (SectionStep::Weaknesses, other) => return Err(unexpected("text or skip", &other)),

            (SectionStep::Mood, FormInput::Rating { value }) => {
                self.draft.rating_mood = Some(validate_rating(value)?);
                if is_rejection {
                    self.goto(index, SectionStep::Rejection(RejectionStep::Reasons));
                } else {
                    return Ok(self.finish_section(index));
                }
            }
            (SectionStep::Mood, other) => return Err(unexpected("a rating", &other)),

            (SectionStep::Rejection(rejection_step), input) => {
                let Some(rejection) = self.draft.rejection.as_mut() else {
                    return Err(unexpected("a non-rejection step", &input));
                };
                match (rejection_step, input) {
                    (RejectionStep::SubType, FormInput::SubType { sub_type }) => {
                        rejection.sub_type = Some(sub_type);
                        self.goto(index, SectionStep::Strengths);
                    }
                    (RejectionStep::SubType, other) => {
                        return Err(unexpected("a rejection type", &other))
                    }

                    (RejectionStep::Reasons, FormInput::ToggleReason { reason }) => {
                        if !rejection.reasons.remove(&reason) {
                            rejection.reasons.insert(reason);
                        }
                    }
                    (RejectionStep::Reasons, FormInput::Done) => {
                        if rejection.reasons.contains(&RejectReason::Other) {
                            self.goto(index, SectionStep::Rejection(RejectionStep::Other));
                        } else {
                            return Ok(self.finish_section(index));
                        }
                    }
                    (RejectionStep::Reasons, other) => {
                        return Err(unexpected("a reason toggle or done", &other))
                    }

                    (RejectionStep::Other, FormInput::Text { text }) => {
                        rejection.other = Some(validate_text(&text)?);
                        return Ok(self.finish_section(index));
                    }
                    (RejectionStep::Other, other) => return Err(unexpected("text", &other)),
                }
            }
        }

        Ok(self.prompt_transition())
    }

    fn goto(&mut self, index: usize, step: SectionStep) {
        self.state = FormState::Section { index, step };
    }

    fn enter_section(&mut self, index: usize) {
        self.draft = SectionDraft::for_section(&self.sections[index]);
        self.goto(index, SectionStep::Rating);
    }

    fn prompt_transition(&self) -> Transition {
        Transition::Prompt(build_prompt(self))
    }

    /// Stores the current draft and moves to the next section, or completes.
    fn finish_section(&mut self, index: usize) -> Transition {
        let draft = std::mem::take(&mut self.draft);
        match draft.finish() {
            Some(answer) => self.answered.push(answer),
            None => {
                // Unreachable through `apply`; restart the section rather than
                // write an incomplete record.
                self.enter_section(index);
                return self.prompt_transition();
            }
        }

        let next = index + 1;
        if next < self.sections.len() {
            self.enter_section(next);
            self.prompt_transition()
        } else {
            self.state = FormState::Complete;
            Transition::Completed(self.records())
        }
    }

    fn records(&self) -> Vec<FeedbackRecord> {
        let created_at = Utc::now();
        self.sections
            .iter()
            .zip(self.answered.iter())
            .map(|(section, answer)| FeedbackRecord {
                id: Uuid::new_v4(),
                form_run_id: self.run_id,
                user_id: self.context.user_id,
                funnel_shape: self.context.funnel_shape,
                channel: self.context.channel.clone(),
                week_start: self.context.week_start,
                stage: section.stage,
                events_count: section.delta,
                rating_overall: answer.rating_overall,
                strengths: answer.strengths.clone(),
                weaknesses: answer.weaknesses.clone(),
                rating_mood: answer.rating_mood,
                reject_sub_type: answer.reject_sub_type,
                reject_reasons: answer.reject_reasons.clone(),
                reject_reason_other: answer.reject_reason_other.clone(),
                created_at,
            })
            .collect()
    }
}

fn unexpected(expected: &'static str, got: &FormInput) -> FormError {
    FormError::UnexpectedInput {
        expected,
        got: got.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::funnel::EventStage;

    fn context() -> FormContext {
        FormContext {
            user_id: 123,
            week_start: NaiveDate::from_ymd_opt(2025, 1, 20).unwrap(),
            channel: "LinkedIn".to_string(),
            funnel_shape: FunnelShape::Active,
        }
    }

    fn form(sections: Vec<ChangedSection>) -> ReflectionForm {
        let mut form = ReflectionForm::offer(context(), sections).unwrap();
        assert!(matches!(form.apply(FormInput::Accept), Ok(Transition::Prompt(_))));
        form
    }

    fn text(s: &str) -> FormInput {
        FormInput::Text {
            text: s.to_string(),
        }
    }

    fn rating(value: u8) -> FormInput {
        FormInput::Rating { value }
    }

    fn completed(transition: Transition) -> Vec<FeedbackRecord> {
        match transition {
            Transition::Completed(records) => records,
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn test_no_sections_no_form() {
        assert!(ReflectionForm::offer(context(), vec![]).is_none());
    }

    #[test]
    fn test_decline_cancels_without_records() {
        let mut form =
            ReflectionForm::offer(context(), vec![ChangedSection::new(EventStage::Offer, 1)])
                .unwrap();
        assert!(matches!(form.apply(FormInput::Decline), Ok(Transition::Cancelled)));
        assert_eq!(form.state(), FormState::Cancelled);
        assert_eq!(form.apply(FormInput::Accept).unwrap_err(), FormError::Finished);
    }

    #[test]
    fn test_skipped_strengths_and_weaknesses_are_null() {
        let mut form = form(vec![ChangedSection::new(EventStage::Screening, 2)]);
        form.apply(rating(4)).unwrap();
        form.apply(FormInput::Skip).unwrap();
        form.apply(FormInput::Skip).unwrap();
        let records = completed(form.apply(rating(3)).unwrap());

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.stage, EventStage::Screening);
        assert_eq!(record.events_count, 2);
        assert_eq!(record.rating_overall, 4);
        assert_eq!(record.strengths, None);
        assert_eq!(record.weaknesses, None);
        assert_eq!(record.rating_mood, 3);
        assert_eq!(record.reject_sub_type, None);
        assert_eq!(record.reject_reasons, None);
        assert_eq!(record.user_id, 123);
        assert_eq!(record.channel, "LinkedIn");
        assert_eq!(form.state(), FormState::Complete);
    }

    #[test]
    fn test_rejection_with_other_reason_collects_text() {
        let mut form = form(vec![ChangedSection::new(EventStage::Rejection, 1)]);
        form.apply(rating(2)).unwrap();
        assert_eq!(
            form.state(),
            FormState::Section {
                index: 0,
                step: SectionStep::Rejection(RejectionStep::SubType)
            }
        );
        form.apply(FormInput::SubType {
            sub_type: RejectSubType::AfterTechnicalInterview,
        })
        .unwrap();
        form.apply(text("  clear system design answers ")).unwrap();
        form.apply(FormInput::Skip).unwrap();
        form.apply(rating(2)).unwrap();
        form.apply(FormInput::ToggleReason {
            reason: RejectReason::Skill,
        })
        .unwrap();
        form.apply(FormInput::ToggleReason {
            reason: RejectReason::Other,
        })
        .unwrap();
        assert!(matches!(form.apply(FormInput::Done), Ok(Transition::Prompt(_))));
        assert_eq!(
            form.state(),
            FormState::Section {
                index: 0,
                step: SectionStep::Rejection(RejectionStep::Other)
            }
        );

        let records = completed(form.apply(text("team was reorganised")).unwrap());
        let record = &records[0];
        assert_eq!(
            record.reject_sub_type,
            Some(RejectSubType::AfterTechnicalInterview)
        );
        assert_eq!(
            record.reject_reasons,
            Some(BTreeSet::from([RejectReason::Skill, RejectReason::Other]))
        );
        assert_eq!(
            record.reject_reason_other.as_deref(),
            Some("team was reorganised")
        );
        assert_eq!(
            record.strengths.as_deref(),
            Some("clear system design answers")
        );
    }

    #[test]
    fn test_rejection_without_other_completes_on_done() {
        let mut form = form(vec![ChangedSection::new(EventStage::Rejection, 3)]);
        form.apply(rating(1)).unwrap();
        form.apply(FormInput::SubType {
            sub_type: RejectSubType::NoInterview,
        })
        .unwrap();
        form.apply(FormInput::Skip).unwrap();
        form.apply(FormInput::Skip).unwrap();
        form.apply(rating(2)).unwrap();
        form.apply(FormInput::ToggleReason {
            reason: RejectReason::Salary,
        })
        .unwrap();
        // toggled on then off again
        form.apply(FormInput::ToggleReason {
            reason: RejectReason::Other,
        })
        .unwrap();
        form.apply(FormInput::ToggleReason {
            reason: RejectReason::Other,
        })
        .unwrap();

        let records = completed(form.apply(FormInput::Done).unwrap());
        assert_eq!(records[0].events_count, 3);
        assert_eq!(
            records[0].reject_reasons,
            Some(BTreeSet::from([RejectReason::Salary]))
        );
        assert_eq!(records[0].reject_reason_other, None);
    }

    #[test]
    fn test_one_record_per_section_with_deltas() {
        let sections = vec![
            ChangedSection::new(EventStage::Response, 2),
            ChangedSection::new(EventStage::Offer, 1),
            ChangedSection::new(EventStage::Rejection, 4),
        ];
        let mut form = form(sections.clone());
        for _ in 0..2 {
            form.apply(rating(5)).unwrap();
            form.apply(text("good prep")).unwrap();
            form.apply(text("salary talk")).unwrap();
            form.apply(rating(5)).unwrap();
        }
        form.apply(rating(3)).unwrap();
        form.apply(FormInput::SubType {
            sub_type: RejectSubType::AfterRecruiterScreen,
        })
        .unwrap();
        form.apply(FormInput::Skip).unwrap();
        form.apply(FormInput::Skip).unwrap();
        form.apply(rating(3)).unwrap();
        let records = completed(form.apply(FormInput::Done).unwrap());

        assert_eq!(records.len(), sections.len());
        for (record, section) in records.iter().zip(sections.iter()) {
            assert_eq!(record.stage, section.stage);
            assert_eq!(record.events_count, section.delta);
            assert_eq!(record.form_run_id, form.run_id());
        }
        // empty reason set is stored as absent
        assert_eq!(records[2].reject_reasons, None);
    }

    #[test]
    fn test_non_rejection_section_never_enters_rejection_steps() {
        let mut form = form(vec![ChangedSection::new(EventStage::Onsite, 1)]);
        form.apply(rating(3)).unwrap();
        assert_eq!(
            form.state(),
            FormState::Section {
                index: 0,
                step: SectionStep::Strengths
            }
        );
        let err = form
            .apply(FormInput::SubType {
                sub_type: RejectSubType::NoInterview,
            })
            .unwrap_err();
        assert!(matches!(err, FormError::UnexpectedInput { .. }));
    }

    #[test]
    fn test_invalid_inputs_leave_state_unchanged() {
        let mut form = form(vec![ChangedSection::new(EventStage::Response, 1)]);
        let before = form.state();

        assert_eq!(form.apply(rating(0)).unwrap_err(), FormError::RatingOutOfRange(0));
        assert_eq!(form.apply(rating(6)).unwrap_err(), FormError::RatingOutOfRange(6));
        assert!(matches!(
            form.apply(FormInput::Skip).unwrap_err(),
            FormError::UnexpectedInput { .. }
        ));
        assert_eq!(form.state(), before);

        form.apply(rating(4)).unwrap();
        assert_eq!(form.apply(text("   ")).unwrap_err(), FormError::EmptyText);
        assert_eq!(
            form.state(),
            FormState::Section {
                index: 0,
                step: SectionStep::Strengths
            }
        );
    }

    #[test]
    fn test_other_reason_requires_text() {
        let mut form = form(vec![ChangedSection::new(EventStage::Rejection, 1)]);
        form.apply(rating(2)).unwrap();
        form.apply(FormInput::SubType {
            sub_type: RejectSubType::NoInterview,
        })
        .unwrap();
        form.apply(FormInput::Skip).unwrap();
        form.apply(FormInput::Skip).unwrap();
        form.apply(rating(2)).unwrap();
        form.apply(FormInput::ToggleReason {
            reason: RejectReason::Other,
        })
        .unwrap();
        form.apply(FormInput::Done).unwrap();

        assert!(matches!(
            form.apply(FormInput::Skip).unwrap_err(),
            FormError::UnexpectedInput { .. }
        ));
        assert_eq!(form.apply(text("")).unwrap_err(), FormError::EmptyText);
    }

    #[test]
    fn test_cancel_mid_form() {
        let mut form = form(vec![
            ChangedSection::new(EventStage::Response, 1),
            ChangedSection::new(EventStage::Screening, 1),
        ]);
        form.apply(rating(4)).unwrap();
        form.apply(FormInput::Skip).unwrap();
        assert!(matches!(form.apply(FormInput::Cancel), Ok(Transition::Cancelled)));
        assert!(form.prompt().is_none());
        assert_eq!(form.apply(rating(4)).unwrap_err(), FormError::Finished);
    }

    #[test]
    fn test_input_deserializes_from_tagged_json() {
        let input: FormInput =
            serde_json::from_str(r#"{"type":"toggle_reason","reason":"culture"}"#).unwrap();
        assert_eq!(
            input,
            FormInput::ToggleReason {
                reason: RejectReason::Culture
            }
        );
        let input: FormInput = serde_json::from_str(r#"{"type":"skip"}"#).unwrap();
        assert_eq!(input, FormInput::Skip);
    }
}
