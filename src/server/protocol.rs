//! WebSocket 上の JSON メッセージ
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::audio_pipeline::{encode_pcm16le, AudioClip, AudioFrame, DecodeError};
use crate::config::ProfileUpdate;
use crate::relay::RelayEvent;

/// 受け付ける音声チャンクの MIME 種別（`audio/pcm;rate=16000` なども可）
pub const PCM_MIME_TYPE: &str = "audio/pcm";

/// クライアント→サーバ
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// 言語プロファイルの上書き
    #[serde(rename = "setup")]
    Setup(ProfileUpdate),

    /// 音声チャンク
    #[serde(rename = "realtime_input")]
    RealtimeInput { media_chunks: Vec<MediaChunk> },

    #[serde(rename = "close")]
    Close,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaChunk {
    pub mime_type: String,
    /// base64 の PCM16LE
    pub data: String,
}

impl MediaChunk {
    pub fn is_pcm(&self) -> bool {
        self.mime_type
            .split(';')
            .next()
            .is_some_and(|base| base.trim().eq_ignore_ascii_case(PCM_MIME_TYPE))
    }

    pub fn decode(&self) -> Result<Vec<u8>, DecodeError> {
        STANDARD
            .decode(self.data.trim())
            .map_err(|e| DecodeError::Base64 {
                message: e.to_string(),
            })
    }
}

/// サーバ→クライアント
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "session_opened")]
    SessionOpened { session_id: String },

    #[serde(rename = "translation_result")]
    TranslationResult {
        session_id: String,
        english_text: String,
        target_text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sample_rate_hz: Option<u32>,
    },

    #[serde(rename = "translation_error")]
    TranslationError {
        session_id: String,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sample_rate_hz: Option<u32>,
    },

    /// 1発話分の応答の終わり
    #[serde(rename = "turn_complete")]
    TurnComplete { session_id: String },

    #[serde(rename = "audio_frame")]
    AudioFrame {
        session_id: String,
        timestamp: u64,
        sample_rate_hz: u32,
        data: String,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn audio_frame(session_id: &str, frame: &AudioFrame) -> Self {
        Self::AudioFrame {
            session_id: session_id.to_string(),
            timestamp: frame.timestamp(),
            sample_rate_hz: frame.sample_rate_hz(),
            data: STANDARD.encode(encode_pcm16le(frame.samples())),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error","message":"serialization failed"}"#.into())
    }
}

fn encode_clip(clip: Option<AudioClip>) -> (Option<String>, Option<u32>) {
    match clip {
        Some(clip) => (
            Some(STANDARD.encode(encode_pcm16le(clip.samples()))),
            Some(clip.sample_rate_hz()),
        ),
        None => (None, None),
    }
}

impl From<RelayEvent> for ServerMessage {
    fn from(event: RelayEvent) -> Self {
        match event {
            RelayEvent::TranslationResult {
                session_id,
                english_text,
                target_text,
                audio,
            } => {
                let (audio, sample_rate_hz) = encode_clip(audio);
                Self::TranslationResult {
                    session_id,
                    english_text,
                    target_text,
                    audio,
                    sample_rate_hz,
                }
            }
            RelayEvent::TranslationError {
                session_id,
                reason,
                fallback_audio,
            } => {
                let (audio, sample_rate_hz) = encode_clip(fallback_audio);
                Self::TranslationError {
                    session_id,
                    reason,
                    audio,
                    sample_rate_hz,
                }
            }
        }
    }
}
