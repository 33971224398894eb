use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub backend: ServiceBackend,
    pub endpoint: String,
    /// APIキーを保持する環境変数名
    pub api_key_env: String,
    pub request_timeout_ms: u64,
    pub models: ModelNames,
    pub voice_name: String,
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceBackend {
    Gemini,
    Mock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelNames {
    pub transcription: String,
    pub translation: String,
    pub synthesis: String,
}
