pub mod event;
pub mod experiment;
pub mod lead;
pub mod quiz;

pub use event::{EventEnvelope, FunnelEvent};
pub use experiment::{Assignment, SignificanceResult, Variant};
pub use lead::{Answers, ContactForm, LeadSubmission, SubmitOutcome};
pub use quiz::{
    Language, Platform, QuizContent, QuizDefinition, QuizQuestion, QuizResolution, ResolvedQuiz,
};
