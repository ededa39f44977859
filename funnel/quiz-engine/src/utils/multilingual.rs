use serde::{Deserialize, Serialize};

use crate::models::quiz::Language;

/// Order in which languages are tried when the wanted one is empty.
const FALLBACK_ORDER: [Language; 5] = [
    Language::Uk,
    Language::Ru,
    Language::En,
    Language::Pl,
    Language::De,
];

/// Per-language text stored as a JSON object in a single text column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultilingualText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ru: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub de: Option<String>,
}

impl MultilingualText {
    /// Same text for every language.
    pub fn uniform(text: &str) -> Self {
        let text = Some(text.to_string());
        Self {
            uk: text.clone(),
            ru: text.clone(),
            en: text.clone(),
            pl: text.clone(),
            de: text,
        }
    }

    /// Parse either a JSON object of translations or plain text.
    ///
    /// Plain text (anything that is not a JSON object) applies to every language.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value @ serde_json::Value::Object(_)) => {
                serde_json::from_value(value).unwrap_or_else(|_| Self::uniform(raw))
            }
            _ => Self::uniform(raw),
        }
    }

    pub fn get(&self, language: Language) -> Option<&str> {
        let slot = match language {
            Language::Uk => &self.uk,
            Language::Ru => &self.ru,
            Language::En => &self.en,
            Language::Pl => &self.pl,
            Language::De => &self.de,
        };
        slot.as_deref().filter(|text| !text.is_empty())
    }

    /// Text for `language`, else the first non-empty text in fallback order, else "".
    pub fn text_for(&self, language: Language) -> String {
        self.get(language)
            .or_else(|| FALLBACK_ORDER.iter().find_map(|lang| self.get(*lang)))
            .unwrap_or_default()
            .to_string()
    }

    pub fn with_text(mut self, language: Language, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        match language {
            Language::Uk => self.uk = value,
            Language::Ru => self.ru = value,
            Language::En => self.en = value,
            Language::Pl => self.pl = value,
            Language::De => self.de = value,
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        FALLBACK_ORDER.iter().all(|lang| self.get(*lang).is_none())
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
