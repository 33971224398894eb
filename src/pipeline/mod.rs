//! 時間制限付き翻訳パイプライン
//!
//! 1発話につき 文字起こし → 翻訳 → 音声合成 を別タスクで実行し、
//! 主締め切り（inner）とバックアップ締め切り（backup）の下で必ず1つの
//! `PipelineResult` を返します。
//!
//! - 成功: `Translated`
//! - 段階の失敗: `Degraded`（元音声をフォールバックとして返す）
//! - 締め切り超過: `TimedOut`（同上）
//!
//! バックアップ側は `supervise` の監視タスクで、結果セルへの最初の書き込み
//! だけが採用されます。
mod cell;
mod cleanup;
mod error;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::audio_pipeline::AudioClip;
use crate::config::{LanguageProfile, PipelineConfig};
use crate::service::{ServiceError, TranslationService};
use crate::vad::Utterance;

use cell::AbortOnDrop;

pub use cell::{supervise, ResultCell};
pub use cleanup::{clean_translation, normalize_transcript};
pub use error::{Deadline, PipelineError};

/// 翻訳チェーンが最後まで成功した場合の内容
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub english_text: String,
    pub target_text: String,
    pub audio: AudioClip,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineResult {
    Translated {
        english_text: String,
        target_text: String,
        audio: AudioClip,
    },
    Degraded {
        reason: PipelineError,
        fallback_audio: AudioClip,
    },
    TimedOut {
        deadline: Deadline,
        fallback_audio: AudioClip,
    },
}

impl PipelineResult {
    /// 呼び出し元へ返す音声（翻訳音声または元音声）
    pub fn audio(&self) -> &AudioClip {
        match self {
            Self::Translated { audio, .. } => audio,
            Self::Degraded { fallback_audio, .. } | Self::TimedOut { fallback_audio, .. } => {
                fallback_audio
            }
        }
    }

    /// 処理待ちが上限に達した発話を、翻訳せずに元音声で返す
    pub fn busy(utterance: Utterance, pending: usize) -> Self {
        Self::Degraded {
            reason: PipelineError::Busy { pending },
            fallback_audio: utterance.into_audio(),
        }
    }

    pub fn is_translated(&self) -> bool {
        matches!(self, Self::Translated { .. })
    }

    /// 利用者向けの状態文字列
    pub fn status_message(&self) -> String {
        match self {
            Self::Translated { .. } => "Translation complete".to_string(),
            Self::Degraded { reason, .. } => {
                format!("Translation unavailable ({reason}); playing back original audio")
            }
            Self::TimedOut { .. } => {
                "Translation timed out; playing back original audio".to_string()
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Translated { .. } => "translated",
            Self::Degraded { .. } => "degraded",
            Self::TimedOut { .. } => "timed_out",
        }
    }
}

impl From<(Result<Translation, PipelineError>, AudioClip)> for PipelineResult {
    fn from((outcome, fallback_audio): (Result<Translation, PipelineError>, AudioClip)) -> Self {
        match outcome {
            Ok(t) => Self::Translated {
                english_text: t.english_text,
                target_text: t.target_text,
                audio: t.audio,
            },
            Err(PipelineError::Timeout { deadline, .. }) => Self::TimedOut {
                deadline,
                fallback_audio,
            },
            Err(reason) => Self::Degraded {
                reason,
                fallback_audio,
            },
        }
    }
}

/// 言語プロファイルで切り替えるだけの単一パイプライン
pub struct BoundedPipeline<S>
where
    S: TranslationService + 'static,
{
    service: Arc<S>,
    config: Arc<PipelineConfig>,
}

impl<S> BoundedPipeline<S>
where
    S: TranslationService + 'static,
{
    pub fn new(service: Arc<S>, config: Arc<PipelineConfig>) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> Arc<PipelineConfig> {
        self.config.clone()
    }

    pub fn default_profile(&self) -> Arc<LanguageProfile> {
        Arc::new(self.config.profile.clone())
    }

    /// 1発話を処理する。戻り値は必ず1つで、`backup_deadline` を超えて待たせない
    pub async fn process(
        &self,
        utterance: Utterance,
        profile: Arc<LanguageProfile>,
    ) -> PipelineResult {
        let started = Instant::now();
        let inner = self.config.inner_deadline();
        let backup = self.config.backup_deadline();
        let windows = utterance.window_count();
        let spoken_at = utterance.started_at();
        let fallback_audio = utterance.audio().clone();

        let service = self.service.clone();
        let worker_fallback = fallback_audio.clone();
        let worker = async move {
            let chain = tokio::spawn(run_chain(service, profile, utterance.into_audio()));
            let _chain_guard = AbortOnDrop(chain.abort_handle());
            let outcome = match tokio::time::timeout(inner, chain).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(join_err)) => Err(PipelineError::Aborted {
                    message: join_err.to_string(),
                }),
                Err(_) => Err(PipelineError::Timeout {
                    deadline: Deadline::Inner,
                    after: inner,
                }),
            };
            PipelineResult::from((outcome, worker_fallback))
        };

        let backup_result = PipelineResult::TimedOut {
            deadline: Deadline::Backup,
            fallback_audio,
        };
        let result = supervise(worker, backup, backup_result).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let since_speech_ms = spoken_at.elapsed().as_millis() as u64;
        match &result {
            PipelineResult::Translated { target_text, .. } => {
                info!(
                    windows,
                    elapsed_ms,
                    since_speech_ms,
                    chars = target_text.chars().count(),
                    "utterance translated"
                );
            }
            PipelineResult::Degraded { reason, .. } => {
                warn!(windows, elapsed_ms, %reason, "pipeline degraded; echoing original audio");
            }
            PipelineResult::TimedOut { deadline, .. } => {
                warn!(windows, elapsed_ms, ?deadline, "pipeline timed out; echoing original audio");
            }
        }
        debug!(kind = result.kind(), "pipeline result produced");
        result
    }
}

async fn run_chain<S>(
    service: Arc<S>,
    profile: Arc<LanguageProfile>,
    audio: AudioClip,
) -> Result<Translation, PipelineError>
where
    S: TranslationService + 'static,
{
    let transcript = service
        .transcribe(&audio, &profile)
        .await
        .map_err(PipelineError::from_transcription)?;
    let english_text = normalize_transcript(&transcript).ok_or(PipelineError::EmptyTranscript)?;
    debug!(chars = english_text.chars().count(), "transcript received");

    let raw = service
        .translate(&english_text, &profile)
        .await
        .map_err(PipelineError::Translation)?;
    let target_text = clean_translation(&raw, &profile.target_language);
    if target_text.is_empty() {
        return Err(PipelineError::Translation(ServiceError::malformed(
            "translation is empty after cleanup",
        )));
    }

    let audio = service
        .synthesize(&target_text, &profile)
        .await
        .map_err(PipelineError::Synthesis)?;
    if audio.is_empty() {
        return Err(PipelineError::Synthesis(ServiceError::malformed(
            "synthesized audio is empty",
        )));
    }

    Ok(Translation {
        english_text,
        target_text,
        audio,
    })
}
