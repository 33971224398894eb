use std::time::Duration;

use thiserror::Error;

use crate::service::ServiceError;

/// どちらの締め切りで打ち切られたか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    Inner,
    Backup,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("transcription failed: {0}")]
    Transcription(ServiceError),
    #[error("no usable speech in utterance")]
    EmptyTranscript,
    #[error("translation failed: {0}")]
    Translation(ServiceError),
    #[error("speech synthesis failed: {0}")]
    Synthesis(ServiceError),
    #[error("{deadline:?} deadline of {after:?} elapsed")]
    Timeout { deadline: Deadline, after: Duration },
    #[error("pipeline worker aborted: {message}")]
    Aborted { message: String },
    #[error("translator busy: {pending} utterances already waiting")]
    Busy { pending: usize },
}

impl PipelineError {
    /// 文字起こし段の失敗を分類（発話なしは空の文字起こし扱い）
    pub fn from_transcription(err: ServiceError) -> Self {
        match err {
            ServiceError::NoSpeechDetected => Self::EmptyTranscript,
            other => Self::Transcription(other),
        }
    }
}
