use thiserror::Error;

use crate::session::Phase;

pub type Result<T> = std::result::Result<T, SessionError>;

/// Failures reported by the external collaborators (settings, exercises,
/// attempt status, scoring).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("exercise not found: {id}")]
    NotFound { id: String },

    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The collaborator answered but refused the request. `message` is the
    /// server-provided explanation, when there is one.
    #[error("request rejected{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Rejected { message: Option<String> },
}

impl ServiceError {
    /// Message suitable for showing to the reader.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected { message: Some(m) } => m.clone(),
            Self::NotFound { id } => format!("exercise {id} does not exist"),
            _ => "could not save your result".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("exercise {id} contains no readable words")]
    EmptyText { id: String },

    #[error("failed to load exercise {id}: {source}")]
    ExerciseLoad {
        id: String,
        #[source]
        source: ServiceError,
    },

    #[error("pausing is disabled for ranked attempts")]
    PauseLocked,

    #[error("{action} is not available while {phase:?}")]
    InvalidPhase { action: &'static str, phase: Phase },
}
