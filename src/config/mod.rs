//! 設定モジュール（YAML 読み込み）
//!
//! `ConfigSet` はルートディレクトリ配下の複数YAMLファイルを読み込み、
//! 実行時に必要な設定値を型安全に提供します。読み込み後に値の整合性
//! （締め切りの大小関係、サンプルレート等）を検証します。
mod audio;
mod error;
mod pipeline;
mod server;
mod service;

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

pub use audio::*;
pub use error::ConfigError;
pub use pipeline::*;
pub use server::*;
pub use service::*;

/// 設定ディレクトリを指す環境変数名
pub const CONFIG_DIR_ENV: &str = "TRANSLATE_RELAY_CONFIG_DIR";

/// すべての設定をひとまとめにした構造体
#[derive(Debug, Clone)]
pub struct ConfigSet {
    pub audio: AudioProcessingConfig,
    pub pipeline: PipelineConfig,
    pub service: ServiceConfig,
    pub server: ServerConfig,
    root: PathBuf,
}

impl ConfigSet {
    /// ルートディレクトリから各YAMLを読み込み
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, ConfigError> {
        let root = dir.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(ConfigError::MissingRoot(root));
        }

        let audio = load_yaml(root.join("audio_processing.yaml"))?;
        let pipeline = load_yaml(root.join("pipeline.yaml"))?;
        let service = load_yaml(root.join("service.yaml"))?;
        let server = load_yaml(root.join("server.yaml"))?;

        let config = Self {
            audio,
            pipeline,
            service,
            server,
            root,
        };
        config.validate()?;
        Ok(config)
    }

    /// 環境変数（未設定時は `config/`）から設定を読み込み
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let dir = std::env::var(CONFIG_DIR_ENV).unwrap_or_else(|_| "config".to_string());
        Self::load_from_dir(dir)
    }

    /// 設定ルートのパス（デバッグ等に利用）
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let audio = &self.audio;
        let rates = [
            ("input.sample_rate_hz", audio.input.sample_rate_hz),
            ("transport.sample_rate_hz", audio.transport.sample_rate_hz),
            ("service.input_sample_rate_hz", audio.service.input_sample_rate_hz),
            (
                "service.synthesis_sample_rate_hz",
                audio.service.synthesis_sample_rate_hz,
            ),
        ];
        if let Some((name, _)) = rates.iter().find(|(_, rate)| *rate == 0) {
            return Err(ConfigError::invalid(format!("{name} must be non-zero")));
        }
        if audio.input.channels != 1 {
            return Err(ConfigError::invalid("input.channels must be 1 (mono PCM16)"));
        }
        if audio.transport_frame_samples() == 0 {
            return Err(ConfigError::invalid("transport frame holds no samples"));
        }
        if audio.vad_window_samples() == 0 || audio.vad.silence_windows == 0 {
            return Err(ConfigError::invalid("vad window and silence_windows must be non-zero"));
        }

        let pipeline = &self.pipeline;
        if pipeline.inner_deadline_ms == 0 {
            return Err(ConfigError::invalid("inner_deadline_ms must be non-zero"));
        }
        if pipeline.backup_deadline_ms <= pipeline.inner_deadline_ms {
            return Err(ConfigError::invalid(format!(
                "backup_deadline_ms ({}) must be greater than inner_deadline_ms ({})",
                pipeline.backup_deadline_ms, pipeline.inner_deadline_ms
            )));
        }
        if pipeline.max_pending_utterances == 0 {
            return Err(ConfigError::invalid("max_pending_utterances must be non-zero"));
        }
        Ok(())
    }
}

/// YAMLファイルを読み込み、型 `T` へデシリアライズ
fn load_yaml<T>(path: PathBuf) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let data = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse { path, source })
}
