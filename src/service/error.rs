use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("no speech detected")]
    NoSpeechDetected,
    #[error("request failed: {message}")]
    Request { message: String },
    #[error("service returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed service response: {message}")]
    Malformed { message: String },
    #[error("audio encoding failed: {message}")]
    Encoding { message: String },
    #[error("service not configured: {message}")]
    Configuration { message: String },
}

impl ServiceError {
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}
