use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::funnel::triggers::ChangedSection;
use crate::models::feedback::FeedbackRecord;
use crate::reflection::form::{FormContext, FormInput, ReflectionForm, Transition};
use crate::reflection::prompts::FormPrompt;
use crate::reflection::store::FeedbackStore;

/// What the entries endpoint did about reflection after a write.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReflectionOffer {
    Offered { prompt: FormPrompt },
    NothingChanged,
    /// Another form of this user is still open; the counters were written
    /// but no new form was offered.
    FormInProgress { form_run_id: Uuid },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FormReply {
    Prompt { prompt: FormPrompt },
    Completed { records: Vec<FeedbackRecord> },
    Cancelled,
}

/// One open form per user, plus the log completed forms are written to.
pub struct ReflectionService {
    forms: Mutex<HashMap<i64, ReflectionForm>>,
    feedback: Arc<dyn FeedbackStore>,
}

impl ReflectionService {
    pub fn new(feedback: Arc<dyn FeedbackStore>) -> Self {
        Self {
            forms: Mutex::new(HashMap::new()),
            feedback,
        }
    }

    pub fn feedback(&self) -> &Arc<dyn FeedbackStore> {
        &self.feedback
    }

    pub async fn offer(&self, context: FormContext, sections: Vec<ChangedSection>) -> ReflectionOffer {
        let user_id = context.user_id;
        let Some(form) = ReflectionForm::offer(context, sections) else {
            return ReflectionOffer::NothingChanged;
        };

        let mut forms = self.forms.lock().await;
        if let Some(open) = forms.get(&user_id) {
            if open.is_started() {
                info!("User {user_id} already has form {} open, not offering", open.run_id());
                return ReflectionOffer::FormInProgress {
                    form_run_id: open.run_id(),
                };
            }
            // An unanswered offer is superseded by the newer one.
            info!("Replacing unanswered offer {} for user {user_id}", open.run_id());
        }

        let prompt = form.prompt();
        info!(
            "Offering reflection form {} to user {user_id} ({} sections)",
            form.run_id(),
            form.sections().len()
        );
        forms.insert(user_id, form);
        match prompt {
            Some(prompt) => ReflectionOffer::Offered { prompt },
            None => ReflectionOffer::NothingChanged,
        }
    }

    pub async fn current(&self, user_id: i64) -> Option<FormPrompt> {
        self.forms.lock().await.get(&user_id).and_then(|f| f.prompt())
    }

    /// Drops the open form without writing anything.
    pub async fn abandon(&self, user_id: i64) -> bool {
        let removed = self.forms.lock().await.remove(&user_id);
        if let Some(form) = &removed {
            info!("Form {} of user {user_id} abandoned", form.run_id());
        }
        removed.is_some()
    }

    pub async fn apply(&self, user_id: i64, input: FormInput) -> Result<FormReply, AppError> {
        let mut forms = self.forms.lock().await;
        let form = forms
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("No open reflection form for user {user_id}")))?;

        let transition = match form.apply(input) {
            Ok(t) => t,
            Err(e) => {
                warn!("Rejected form input from user {user_id}: {e}");
                let prompt = form
                    .prompt()
                    .and_then(|p| serde_json::to_value(p).ok());
                return Err(AppError::InvalidInput {
                    message: e.to_string(),
                    prompt,
                });
            }
        };

        match transition {
            Transition::Prompt(prompt) => Ok(FormReply::Prompt { prompt }),
            Transition::Cancelled => {
                forms.remove(&user_id);
                info!("User {user_id} cancelled the reflection form");
                Ok(FormReply::Cancelled)
            }
            Transition::Completed(records) => {
                // The session ends here whether or not the write succeeds.
                forms.remove(&user_id);
                drop(forms);

                if let Err(e) = self.feedback.append_all(&records).await {
                    error!(
                        "Failed to store {} feedback records for user {user_id}: {e}",
                        records.len()
                    );
                    return Err(e.into());
                }
                Ok(FormReply::Completed { records })
            }
        }
    }
}
