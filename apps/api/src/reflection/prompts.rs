//! Questions shown for each form state. Pure rendering over `ReflectionForm`.

use serde::Serialize;
use uuid::Uuid;

use crate::models::feedback::{RejectReason, RejectSubType};
use crate::reflection::form::{
    FormState, ReflectionForm, RejectionStep, SectionStep, MAX_RATING, MIN_RATING,
};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChoiceOption {
    pub value: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
}

/// What kind of answer the current step accepts.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromptInput {
    Confirm,
    Rating { min: u8, max: u8 },
    SingleChoice { options: Vec<ChoiceOption> },
    FreeText,
    MultiSelect { options: Vec<ChoiceOption> },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SectionHeader {
    /// 1-based.
    pub number: usize,
    pub count: usize,
    pub label: String,
    pub delta: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FormPrompt {
    pub form_run_id: Uuid,
    pub step: &'static str,
    pub context_line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<SectionHeader>,
    pub question: String,
    pub input: PromptInput,
    pub skippable: bool,
}

fn rating() -> PromptInput {
    PromptInput::Rating {
        min: MIN_RATING,
        max: MAX_RATING,
    }
}

pub fn build_prompt(form: &ReflectionForm) -> FormPrompt {
    let context = form.context();
    let context_line = format!(
        "Week of {} • Channel: {} • Funnel: {}",
        context.week_start.format("%Y-%m-%d"),
        context.channel,
        context.funnel_shape.as_str()
    );

    let section = match form.state() {
        FormState::Section { index, .. } => form.sections().get(index).map(|s| SectionHeader {
            number: index + 1,
            count: form.sections().len(),
            label: s.display_label.clone(),
            delta: s.delta,
        }),
        _ => None,
    };

    let (step, question, input, skippable) = match form.state() {
        FormState::OfferPending => {
            let labels: Vec<String> = form
                .sections()
                .iter()
                .map(|s| format!("{} (+{})", s.display_label, s.delta))
                .collect();
            (
                "offer",
                format!(
                    "New events this week: {}. Take a minute to reflect on them?",
                    labels.join(", ")
                ),
                PromptInput::Confirm,
                false,
            )
        }
        FormState::Section { step, .. } => match step {
            SectionStep::Rating => (
                "rating_overall",
                "How did it go overall? Rate from 1 to 5.".to_string(),
                rating(),
                false,
            ),
            SectionStep::Strengths => (
                "strengths",
                "What went well?".to_string(),
                PromptInput::FreeText,
                true,
            ),
            SectionStep::Weaknesses => (
                "weaknesses",
                "What would you do differently?".to_string(),
                PromptInput::FreeText,
                true,
            ),
            SectionStep::Mood => (
                "rating_mood",
                "How do you feel about it? Rate from 1 to 5.".to_string(),
                rating(),
                false,
            ),
            SectionStep::Rejection(RejectionStep::SubType) => (
                "reject_sub_type",
                "At which point were you rejected?".to_string(),
                PromptInput::SingleChoice {
                    options: RejectSubType::ALL
                        .iter()
                        .map(|s| ChoiceOption {
                            value: s.as_str().to_string(),
                            label: s.label().to_string(),
                            selected: None,
                        })
                        .collect(),
                },
                false,
            ),
            SectionStep::Rejection(RejectionStep::Reasons) => {
                let selected = form
                    .draft()
                    .rejection
                    .as_ref()
                    .map(|r| r.reasons.clone())
                    .unwrap_or_default();
                (
                    "reject_reasons",
                    "What do you think the reasons were? Pick any, then press done.".to_string(),
                    PromptInput::MultiSelect {
                        options: RejectReason::ALL
                            .iter()
                            .map(|r| ChoiceOption {
                                value: reason_value(r),
                                label: r.label().to_string(),
                                selected: Some(selected.contains(r)),
                            })
                            .collect(),
                    },
                    false,
                )
            }
            SectionStep::Rejection(RejectionStep::Other) => (
                "reject_reason_other",
                "Describe the other reason.".to_string(),
                PromptInput::FreeText,
                false,
            ),
        },
        FormState::Complete | FormState::Cancelled => (
            "finished",
            "The form is finished.".to_string(),
            PromptInput::Confirm,
            false,
        ),
    };

    FormPrompt {
        form_run_id: form.run_id(),
        step,
        context_line,
        section,
        question,
        input,
        skippable,
    }
}

fn reason_value(reason: &RejectReason) -> String {
    serde_json::to_value(reason)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}
