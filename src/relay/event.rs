use crate::audio_pipeline::AudioClip;

/// 発話1つにつき1つ、クライアントへ通知するイベント
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    TranslationResult {
        session_id: String,
        english_text: String,
        target_text: String,
        /// サイドチャネル配信時のみ
        audio: Option<AudioClip>,
    },
    TranslationError {
        session_id: String,
        reason: String,
        /// サイドチャネル配信時のみ（元音声）
        fallback_audio: Option<AudioClip>,
    },
}

impl RelayEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::TranslationResult { session_id, .. } | Self::TranslationError { session_id, .. } => {
                session_id
            }
        }
    }

    pub fn audio(&self) -> Option<&AudioClip> {
        match self {
            Self::TranslationResult { audio, .. } => audio.as_ref(),
            Self::TranslationError { fallback_audio, .. } => fallback_audio.as_ref(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::TranslationError { .. })
    }
}
