//! Gemini（generateContent）ベースの翻訳サービス
//!
//! 文字起こし・翻訳・音声合成をそれぞれ1回の generateContent 呼び出しで行う。
//! 認証は APIキーのクエリパラメータ。
use std::io::Cursor;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::audio_pipeline::{decode_pcm16le, AudioClip};
use crate::config::{LanguageProfile, ServiceConfig};

use super::{parse_generate_response, ResponsePart, ServiceError, TranslationService, NOT_RECOGNIZABLE};

/// 音声合成応答にレート指定が無い場合の既定値
const DEFAULT_SYNTHESIS_RATE_HZ: u32 = 24_000;
/// エラー応答本文を保持する最大文字数
const MAX_ERROR_BODY: usize = 512;

const TRANSCRIBE_PROMPT: &str = "Generate a transcript of the speech. \
Please do not include any other text in the response. \
If you cannot hear the speech, please only say '<Not recognizable>'.";

pub struct GeminiService {
    base_url: String,
    api_key: String,
    config: ServiceConfig,
    client: reqwest::Client,
    synthesis_rate_hz: u32,
}

impl GeminiService {
    pub fn new(config: ServiceConfig, api_key: impl Into<String>) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ServiceError::Configuration {
                message: format!("http client build failed: {e}"),
            })?;
        Ok(Self {
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            config,
            client,
            synthesis_rate_hz: DEFAULT_SYNTHESIS_RATE_HZ,
        })
    }

    /// 合成音声の MIME にレートが無い場合に使う値
    pub fn with_synthesis_rate(mut self, rate_hz: u32) -> Self {
        if rate_hz > 0 {
            self.synthesis_rate_hz = rate_hz;
        }
        self
    }

    /// `api_key_env` で指定された環境変数からAPIキーを読んで作成
    pub fn from_env(config: ServiceConfig) -> Result<Self, ServiceError> {
        let key = std::env::var(&config.api_key_env).map_err(|_| ServiceError::Configuration {
            message: format!("environment variable {} is not set", config.api_key_env),
        })?;
        if key.trim().is_empty() {
            return Err(ServiceError::Configuration {
                message: format!("environment variable {} is empty", config.api_key_env),
            });
        }
        Self::new(config, key)
    }

    async fn generate(&self, model: &str, body: Value) -> Result<Vec<ResponsePart>, ServiceError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::request(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            let message = truncate_chars(text, MAX_ERROR_BODY);
            warn!(model, status = status.as_u16(), "generateContent request rejected");
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        debug!(model, bytes = text.len(), "generateContent response received");
        parse_generate_response(&text)
    }
}

#[async_trait]
impl TranslationService for GeminiService {
    async fn transcribe(
        &self,
        audio: &AudioClip,
        _profile: &LanguageProfile,
    ) -> Result<String, ServiceError> {
        let wav = encode_wav(audio)?;
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": TRANSCRIBE_PROMPT },
                    { "inlineData": { "mimeType": "audio/wav", "data": BASE64.encode(wav) } }
                ]
            }]
        });

        let parts = self.generate(&self.config.models.transcription, body).await?;
        let transcript = collect_text(parts);
        let trimmed = transcript.trim();
        if trimmed.is_empty() || trimmed == NOT_RECOGNIZABLE {
            return Err(ServiceError::NoSpeechDetected);
        }
        Ok(trimmed.to_string())
    }

    async fn translate(
        &self,
        text: &str,
        profile: &LanguageProfile,
    ) -> Result<String, ServiceError> {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": profile.system_prompt }] },
            "contents": [{
                "role": "user",
                "parts": [{
                    "text": format!(
                        "Translate the following {} text into {}. \
                         Answer with a JSON object whose only field is \"translation\".\n\n{}",
                        profile.source_language, profile.target_language, text
                    )
                }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": { "translation": { "type": "STRING" } },
                    "required": ["translation"]
                }
            }
        });

        let parts = self.generate(&self.config.models.translation, body).await?;
        let raw = collect_text(parts);
        if raw.trim().is_empty() {
            return Err(ServiceError::malformed("translation response has no text"));
        }
        Ok(raw)
    }

    async fn synthesize(
        &self,
        text: &str,
        profile: &LanguageProfile,
    ) -> Result<AudioClip, ServiceError> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{
                    "text": format!("Say clearly with a {} accent: {}", profile.target_accent, text)
                }]
            }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.config.voice_name }
                    }
                }
            }
        });

        let parts = self.generate(&self.config.models.synthesis, body).await?;
        collect_audio(parts, self.synthesis_rate_hz)
    }
}

fn collect_text(parts: Vec<ResponsePart>) -> String {
    let mut text = String::new();
    for part in parts {
        match part {
            ResponsePart::Text(t) => text.push_str(&t),
            ResponsePart::InlineAudio { mime_type, .. } => {
                debug!(%mime_type, "ignoring inline audio in text response");
            }
        }
    }
    text
}

fn collect_audio(parts: Vec<ResponsePart>, default_rate_hz: u32) -> Result<AudioClip, ServiceError> {
    let mut samples = Vec::new();
    let mut rate = None;
    for part in parts {
        match part {
            ResponsePart::InlineAudio { mime_type, data } => {
                let decoded = decode_pcm16le(&data)
                    .map_err(|e| ServiceError::malformed(format!("synthesized audio: {e}")))?;
                rate = rate.or_else(|| ResponsePart::audio_rate(&mime_type));
                samples.extend(decoded);
            }
            ResponsePart::Text(t) => {
                debug!(text = %t, "ignoring text in synthesis response");
            }
        }
    }
    if samples.is_empty() {
        return Err(ServiceError::malformed("synthesis response contains no audio"));
    }
    Ok(AudioClip::new(samples, rate.unwrap_or(default_rate_hz)))
}

/// 先頭 `max_chars` 文字まで残す（文字境界で切る）
fn truncate_chars(mut text: String, max_chars: usize) -> String {
    if let Some((cut, _)) = text.char_indices().nth(max_chars) {
        text.truncate(cut);
    }
    text
}

/// PCM16 モノラルを WAV コンテナへ
fn encode_wav(audio: &AudioClip) -> Result<Vec<u8>, ServiceError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate_hz(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut buffer = Vec::with_capacity(44 + audio.byte_len());
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buffer), spec).map_err(|e| {
            ServiceError::Encoding {
                message: e.to_string(),
            }
        })?;
        for sample in audio.samples() {
            writer.write_sample(*sample).map_err(|e| ServiceError::Encoding {
                message: e.to_string(),
            })?;
        }
        writer.finalize().map_err(|e| ServiceError::Encoding {
            message: e.to_string(),
        })?;
    }
    Ok(buffer)
}
