use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::ContentError;
use crate::models::quiz::{
    Language, Platform, QuizContent, QuizDefinition, QuizResolution, ResolvedQuiz,
};

const BUILTIN_CONTENT: &str = include_str!("../../content/quizzes.json");

/// Listing entry for one quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSummary {
    pub id: String,
    pub platform: Platform,
    pub niche: String,
    pub languages: Vec<Language>,
}

/// Localized quiz content keyed by `(quiz_id, language)`.
///
/// Loaded once and never mutated; share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct ContentRegistry {
    entries: HashMap<(String, Language), QuizContent>,
    catalog: BTreeMap<String, QuizSummary>,
}

impl ContentRegistry {
    pub fn builtin() -> Result<Self, ContentError> {
        Self::from_json_str(BUILTIN_CONTENT)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ContentError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let registry = Self::from_json_str(&raw)?;
        info!(
            "Loaded {} quizzes from {}",
            registry.catalog.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ContentError> {
        let definitions: Vec<QuizDefinition> = serde_json::from_str(raw)?;
        Self::from_definitions(definitions)
    }

    pub fn from_definitions(definitions: Vec<QuizDefinition>) -> Result<Self, ContentError> {
        let mut registry = Self::default();

        for definition in definitions {
            for (language, content) in &definition.translations {
                validate_content(&definition.id, *language, content)?;
            }

            if !definition.translations.contains_key(&Language::FALLBACK) {
                warn!(
                    "Quiz '{}' has no {} translation, other languages will not fall back",
                    definition.id,
                    Language::FALLBACK
                );
            }

            let summary = QuizSummary {
                id: definition.id.clone(),
                platform: definition.platform,
                niche: definition.niche.clone(),
                languages: definition.translations.keys().copied().collect(),
            };
            if registry
                .catalog
                .insert(definition.id.clone(), summary)
                .is_some()
            {
                warn!("Quiz '{}' is declared twice, last one wins", definition.id);
            }

            for (language, content) in definition.translations {
                registry
                    .entries
                    .insert((definition.id.clone(), language), content);
            }
        }

        Ok(registry)
    }

    /// Content in the requested language, else English, else not found.
    ///
    /// Unknown language codes are treated like a missing translation.
    pub fn resolve(&self, quiz_id: &str, requested_language: &str) -> QuizResolution {
        let requested = match requested_language.parse::<Language>() {
            Ok(language) => Some(language),
            Err(e) => {
                debug!("{}, using {}", e, Language::FALLBACK);
                None
            }
        };

        if let Some(language) = requested {
            if let Some(content) = self.get(quiz_id, language) {
                return QuizResolution::Found(ResolvedQuiz {
                    quiz_id: quiz_id.to_string(),
                    language,
                    fell_back: false,
                    content: content.clone(),
                });
            }
        }

        match self.get(quiz_id, Language::FALLBACK) {
            Some(content) => {
                debug!(
                    "Quiz '{}' has no '{}' content, falling back to {}",
                    quiz_id,
                    requested_language,
                    Language::FALLBACK
                );
                QuizResolution::Found(ResolvedQuiz {
                    quiz_id: quiz_id.to_string(),
                    language: Language::FALLBACK,
                    fell_back: true,
                    content: content.clone(),
                })
            }
            None => QuizResolution::NotFound {
                quiz_id: quiz_id.to_string(),
            },
        }
    }

    pub fn get(&self, quiz_id: &str, language: Language) -> Option<&QuizContent> {
        self.entries.get(&(quiz_id.to_string(), language))
    }

    pub fn quiz_ids(&self) -> impl Iterator<Item = &str> {
        self.catalog.keys().map(String::as_str)
    }

    pub fn summaries(&self) -> impl Iterator<Item = &QuizSummary> {
        self.catalog.values()
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }
}

fn validate_content(
    quiz_id: &str,
    language: Language,
    content: &QuizContent,
) -> Result<(), ContentError> {
    if content.questions.is_empty() {
        return Err(ContentError::EmptyQuiz {
            quiz_id: quiz_id.to_string(),
            language: language.to_string(),
        });
    }

    if let Some(index) = content.questions.iter().position(|q| q.options.is_empty()) {
        return Err(ContentError::EmptyQuestion {
            quiz_id: quiz_id.to_string(),
            language: language.to_string(),
            step: index + 1,
        });
    }

    Ok(())
}
