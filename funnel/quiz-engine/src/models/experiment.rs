use serde::{Deserialize, Serialize};

/// A/B test variant as served by `abTest.getVariants`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: i64,
    pub quiz_id: String,
    pub variant_name: String,
    /// Share of traffic in percent. Absent means equal split.
    #[serde(default)]
    pub traffic_percentage: Option<u32>,
    #[serde(default, with = "int_flag")]
    pub is_control: bool,
    #[serde(default = "default_active", with = "int_flag")]
    pub is_active: bool,
    /// Multilingual title override (JSON object or plain text).
    #[serde(default)]
    pub title: Option<String>,
    /// Multilingual subtitle override (JSON object or plain text).
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Question list override, JSON array of `{question, options}`.
    #[serde(default)]
    pub questions: Option<String>,
}

fn default_active() -> bool {
    true
}

impl Variant {
    pub fn new(id: i64, quiz_id: impl Into<String>, variant_name: impl Into<String>) -> Self {
        Self {
            id,
            quiz_id: quiz_id.into(),
            variant_name: variant_name.into(),
            traffic_percentage: None,
            is_control: false,
            is_active: true,
            title: None,
            subtitle: None,
            questions: None,
        }
    }

    pub fn with_traffic(mut self, percentage: u32) -> Self {
        self.traffic_percentage = Some(percentage);
        self
    }
}

/// The variant a session was bucketed into for one quiz.
///
/// Stored client-side as JSON; the backend receives a mirror of it once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub session_id: String,
    pub quiz_id: String,
    pub variant_id: i64,
    pub variant_name: String,
}

/// Result of a two-proportion significance test between control and variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignificanceResult {
    pub p_value: f64,
    pub is_significant: bool,
    pub confidence_level: f64,
    pub uplift: f64,
}

// The backend stores booleans as 0/1 integers
mod int_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bool(*value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Flag::deserialize(deserializer)? {
            Flag::Bool(value) => value,
            Flag::Int(value) => value != 0,
        })
    }
}
