use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use validator::Validate;

use crate::error::FunnelError;
use crate::models::quiz::ResolvedQuiz;
use crate::utils::utm::UtmParams;

/// Contact fields typed on the form step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ContactForm {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,

    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,

    pub email: Option<String>,

    pub telegram: Option<String>,
}

impl ContactForm {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            email: None,
            telegram: None,
        }
    }

    /// Copy with surrounding whitespace removed and blank optionals dropped.
    pub fn normalized(&self) -> Self {
        fn optional(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }

        Self {
            name: self.name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: optional(&self.email),
            telegram: optional(&self.telegram),
        }
    }

    /// Whether the submit action is enabled.
    pub fn is_complete(&self) -> bool {
        self.normalized().validate().is_ok()
    }
}

/// Answers keyed by 1-based step number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Answers(BTreeMap<usize, String>);

impl Answers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: usize, answer: impl Into<String>) {
        self.0.insert(step, answer.into());
    }

    pub fn get(&self, step: usize) -> Option<&str> {
        self.0.get(&step).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Answers sorted by step number.
    pub fn ordered(&self) -> Vec<String> {
        self.0.values().cloned().collect()
    }
}

/// Payload of `quiz.submitLead`. Built once, sent as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSubmission {
    pub quiz_name: String,
    /// JSON array of answers ordered by step.
    pub answers: String,
    /// JSON array of question texts.
    pub questions: String,
    pub name: String,
    pub phone: String,
    pub telegram: String,
    pub email: String,
    pub language: String,
    #[serde(flatten)]
    pub utm: UtmParams,
}

impl LeadSubmission {
    pub fn build(
        quiz: &ResolvedQuiz,
        answers: &Answers,
        form: &ContactForm,
        utm: &UtmParams,
    ) -> Result<Self, FunnelError> {
        let contact = form.normalized();
        contact.validate()?;

        Ok(Self {
            quiz_name: quiz.quiz_id.clone(),
            answers: serde_json::to_string(&answers.ordered())?,
            questions: serde_json::to_string(&quiz.question_texts())?,
            name: contact.name,
            phone: contact.phone,
            telegram: contact.telegram.unwrap_or_default(),
            email: contact.email.unwrap_or_default(),
            language: quiz.language.to_string(),
            utm: utm.clone(),
        })
    }
}

/// What the visitor sees after pressing submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Lead stored; navigate to `redirect_to` once `redirect_after` has elapsed.
    Submitted {
        notice: String,
        redirect_to: String,
        redirect_after: Duration,
    },
    /// Lead rejected; the form keeps its values for another attempt.
    Failed { message: String },
}
