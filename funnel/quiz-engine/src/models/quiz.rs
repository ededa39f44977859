use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::error::ContentError;
use crate::models::experiment::Variant;
use crate::utils::multilingual::MultilingualText;

/// Languages the funnel is translated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Uk,
    Ru,
    En,
    Pl,
    De,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::Uk,
        Language::Ru,
        Language::En,
        Language::Pl,
        Language::De,
    ];

    /// Language used when the requested translation is missing.
    pub const FALLBACK: Language = Language::En;

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Uk => "uk",
            Language::Ru => "ru",
            Language::En => "en",
            Language::Pl => "pl",
            Language::De => "de",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_lowercase();
        Language::ALL
            .into_iter()
            .find(|lang| lang.as_str() == code)
            .ok_or_else(|| ContentError::UnknownLanguage(s.to_string()))
    }
}

/// Where the quiz's traffic comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Meta,
    Google,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
}

/// Localized copy of one quiz in one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizContent {
    pub title: String,
    pub subtitle: String,
    #[serde(default)]
    pub bonus: String,
    #[serde(default)]
    pub description: String,
    pub questions: Vec<QuizQuestion>,
}

/// A quiz as declared in the content file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizDefinition {
    pub id: String,
    pub platform: Platform,
    pub niche: String,
    pub translations: std::collections::BTreeMap<Language, QuizContent>,
}

/// Quiz content picked for a visitor, after language fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedQuiz {
    pub quiz_id: String,
    pub language: Language,
    /// True when the requested language was unavailable and English was used.
    pub fell_back: bool,
    pub content: QuizContent,
}

impl ResolvedQuiz {
    pub fn question_count(&self) -> usize {
        self.content.questions.len()
    }

    /// Questions plus the contact form step.
    pub fn total_steps(&self) -> usize {
        self.question_count() + 1
    }

    /// 1-based question lookup.
    pub fn question(&self, step: usize) -> Option<&QuizQuestion> {
        step.checked_sub(1)
            .and_then(|index| self.content.questions.get(index))
    }

    pub fn question_texts(&self) -> Vec<String> {
        self.content
            .questions
            .iter()
            .map(|q| q.question.clone())
            .collect()
    }

    /// Apply a variant's content overrides.
    ///
    /// Title and subtitle are multilingual text; the question list replaces
    /// the localized one only when it parses and every question has options.
    pub fn with_variant(mut self, variant: &Variant) -> Self {
        if let Some(title) = override_text(variant.title.as_deref(), self.language) {
            self.content.title = title;
        }
        if let Some(subtitle) = override_text(variant.subtitle.as_deref(), self.language) {
            self.content.subtitle = subtitle;
        }

        if let Some(raw) = variant.questions.as_deref().filter(|raw| !raw.trim().is_empty()) {
            match serde_json::from_str::<Vec<QuizQuestion>>(raw) {
                Ok(questions)
                    if !questions.is_empty() && questions.iter().all(|q| !q.options.is_empty()) =>
                {
                    self.content.questions = questions;
                }
                Ok(_) => warn!(
                    "Variant {} of quiz '{}' has an empty question override, keeping quiz questions",
                    variant.id, self.quiz_id
                ),
                Err(e) => warn!(
                    "Variant {} of quiz '{}' has unreadable questions ({}), keeping quiz questions",
                    variant.id, self.quiz_id, e
                ),
            }
        }

        self
    }
}

fn override_text(raw: Option<&str>, language: Language) -> Option<String> {
    let text = MultilingualText::parse(raw?).text_for(language);
    (!text.is_empty()).then_some(text)
}

/// Outcome of looking a quiz up; missing content is a state, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizResolution {
    Found(ResolvedQuiz),
    NotFound { quiz_id: String },
}

impl QuizResolution {
    pub fn found(self) -> Option<ResolvedQuiz> {
        match self {
            QuizResolution::Found(quiz) => Some(quiz),
            QuizResolution::NotFound { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, QuizResolution::Found(_))
    }
}
