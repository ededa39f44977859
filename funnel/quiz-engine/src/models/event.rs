use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::quiz::Language;

/// Points in the funnel that are reported to tracking sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FunnelEvent {
    QuizStarted {
        quiz_id: String,
        language: Language,
    },
    StepCompleted {
        quiz_id: String,
        step: usize,
        total_steps: usize,
        answer: String,
    },
    FormViewed {
        quiz_id: String,
    },
    QuizCompleted {
        quiz_id: String,
        language: Language,
    },
    FormSubmitted {
        quiz_id: String,
        language: Language,
    },
    DroppedOff {
        quiz_id: String,
        step: usize,
        total_steps: usize,
    },
}

impl FunnelEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            FunnelEvent::QuizStarted { .. } => "quiz_started",
            FunnelEvent::StepCompleted { .. } => "step_completed",
            FunnelEvent::FormViewed { .. } => "form_viewed",
            FunnelEvent::QuizCompleted { .. } => "quiz_completed",
            FunnelEvent::FormSubmitted { .. } => "form_submitted",
            FunnelEvent::DroppedOff { .. } => "dropped_off",
        }
    }

    pub fn quiz_id(&self) -> &str {
        match self {
            FunnelEvent::QuizStarted { quiz_id, .. }
            | FunnelEvent::StepCompleted { quiz_id, .. }
            | FunnelEvent::FormViewed { quiz_id }
            | FunnelEvent::QuizCompleted { quiz_id, .. }
            | FunnelEvent::FormSubmitted { quiz_id, .. }
            | FunnelEvent::DroppedOff { quiz_id, .. } => quiz_id,
        }
    }
}

/// A funnel event plus the context every sink needs.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub session_id: String,
    /// Unique per emission, lets sinks deduplicate.
    pub event_id: String,
    pub occurred_at: DateTime<Utc>,
    pub event: FunnelEvent,
}

impl EventEnvelope {
    pub fn new(session_id: impl Into<String>, event: FunnelEvent) -> Self {
        Self {
            session_id: session_id.into(),
            event_id: format!("{}_{}", event.kind(), Uuid::new_v4().simple()),
            occurred_at: Utc::now(),
            event,
        }
    }
}
