use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session already exists: {session_id}")]
    AlreadyExists { session_id: String },
    #[error("session not found: {session_id}")]
    NotFound { session_id: String },
    #[error("session limit exceeded ({max_sessions} live sessions)")]
    CapacityExceeded { max_sessions: usize },
}

impl SessionError {
    pub fn already_exists(session_id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            session_id: session_id.into(),
        }
    }

    pub fn not_found(session_id: impl Into<String>) -> Self {
        Self::NotFound {
            session_id: session_id.into(),
        }
    }
}
