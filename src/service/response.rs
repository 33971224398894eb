//! generateContent 応答の解析
//!
//! 応答の各 part は「テキスト」か「インライン音声」のいずれか。
//! 形の判定はここで一度だけ行い、以降は `ResponsePart` を網羅的に match する。
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use super::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePart {
    Text(String),
    InlineAudio { mime_type: String, data: Vec<u8> },
}

impl ResponsePart {
    /// `audio/L16;codec=pcm;rate=24000` 形式からサンプルレートを取り出す
    pub fn audio_rate(mime_type: &str) -> Option<u32> {
        mime_type
            .split(';')
            .filter_map(|param| param.trim().strip_prefix("rate="))
            .find_map(|rate| rate.trim().parse().ok())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

/// 応答JSONを `ResponsePart` 列へ変換（最初の候補のみ）
pub fn parse_generate_response(body: &str) -> Result<Vec<ResponsePart>, ServiceError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::malformed(format!("invalid response JSON: {e}")))?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::malformed("response contains no candidates"))?;

    let content = candidate.content.ok_or_else(|| {
        ServiceError::malformed(format!(
            "candidate has no content (finish_reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        ))
    })?;

    let mut parts = Vec::with_capacity(content.parts.len());
    for part in content.parts {
        match (part.text, part.inline_data) {
            (Some(text), _) => parts.push(ResponsePart::Text(text)),
            (None, Some(inline)) => {
                let data = BASE64
                    .decode(inline.data.as_bytes())
                    .map_err(|e| ServiceError::malformed(format!("invalid inline data: {e}")))?;
                parts.push(ResponsePart::InlineAudio {
                    mime_type: inline.mime_type,
                    data,
                });
            }
            (None, None) => {}
        }
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_and_audio_parts() {
        let body = r#"{
            "candidates": [{
                "content": {"parts": [
                    {"text": "hello"},
                    {"inlineData": {"mimeType": "audio/L16;codec=pcm;rate=24000", "data": "AQACAA=="}}
                ]},
                "finishReason": "STOP"
            }]
        }"#;
        let parts = parse_generate_response(body).unwrap();
        assert_eq!(parts[0], ResponsePart::Text("hello".into()));
        assert_eq!(
            parts[1],
            ResponsePart::InlineAudio {
                mime_type: "audio/L16;codec=pcm;rate=24000".into(),
                data: vec![1, 0, 2, 0],
            }
        );
    }

    #[test]
    fn missing_candidates_is_malformed() {
        let err = parse_generate_response(r#"{"candidates": []}"#).unwrap_err();
        assert!(matches!(err, ServiceError::Malformed { .. }));
        let err = parse_generate_response("not json").unwrap_err();
        assert!(matches!(err, ServiceError::Malformed { .. }));
    }

    #[test]
    fn extracts_rate_from_mime_type() {
        assert_eq!(
            ResponsePart::audio_rate("audio/L16;codec=pcm;rate=24000"),
            Some(24_000)
        );
        assert_eq!(ResponsePart::audio_rate("audio/pcm"), None);
    }
}
