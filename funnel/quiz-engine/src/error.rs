use thiserror::Error;

/// Errors raised by the local key-value storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage is unavailable")]
    Unavailable,

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors raised while loading the content registry.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to read content file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse content: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown language code '{0}'")]
    UnknownLanguage(String),

    #[error("quiz '{quiz_id}' ({language}) has no questions")]
    EmptyQuiz { quiz_id: String, language: String },

    #[error("quiz '{quiz_id}' ({language}) question {step} has no options")]
    EmptyQuestion {
        quiz_id: String,
        language: String,
        step: usize,
    },
}

/// Errors raised by the RPC backend client.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request to backend failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Server {
        status: u16,
        message: Option<String>,
    },

    #[error("failed to decode backend response: {0}")]
    Decode(String),

    #[error("invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl BackendError {
    /// Message the server attached to the failure, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            BackendError::Server {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => Some(message.as_str()),
            _ => None,
        }
    }
}

/// Errors raised by a single analytics sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink has no async runtime to deliver on")]
    NoRuntime,

    #[error("sink rejected event: {0}")]
    Rejected(String),
}

/// Errors surfaced by the quiz flow.
#[derive(Debug, Error)]
pub enum FunnelError {
    #[error("contact details are invalid: {0}")]
    InvalidContact(#[from] validator::ValidationErrors),

    #[error("quiz is not on a question step")]
    NotAtQuestion,

    #[error("quiz is not on the form step")]
    NotAtForm,

    #[error("'{answer}' is not an option of question {step}")]
    UnknownOption { step: usize, answer: String },

    #[error("no transition is pending")]
    NoPendingTransition,

    #[error("a submission is already in progress")]
    SubmissionInProgress,

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
