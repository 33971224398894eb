//! 翻訳パイプライン設定
use std::time::Duration;

use serde::Deserialize;

/// 締め切り、配信経路、言語プロファイルに関する設定
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub inner_deadline_ms: u64,
    pub backup_deadline_ms: u64,
    pub max_pending_utterances: usize,
    pub delivery_mode: DeliveryMode,
    pub profile: LanguageProfile,
}

impl PipelineConfig {
    /// 主締め切り（ミリ秒→Duration）
    pub fn inner_deadline(&self) -> Duration {
        Duration::from_millis(self.inner_deadline_ms)
    }

    /// バックアップ締め切り
    pub fn backup_deadline(&self) -> Duration {
        Duration::from_millis(self.backup_deadline_ms)
    }
}

/// 合成音声をクライアントへ届ける経路
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// セッションの送出キューに積み、フレームクロックで送る
    FrameScheduler,
    /// 結果イベントに音声を同梱する
    SideChannel,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LanguageProfile {
    pub source_language: String,
    pub target_language: String,
    pub target_accent: String,
    pub system_prompt: String,
}

/// セッション単位の上書き。`None` の項目は元の値を保つ
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub target_language: Option<String>,
    #[serde(default)]
    pub target_accent: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.target_language.is_none() && self.target_accent.is_none() && self.system_prompt.is_none()
    }
}

impl LanguageProfile {
    pub fn apply(&self, update: &ProfileUpdate) -> Self {
        let pick = |value: &Option<String>, current: &String| match value {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => current.clone(),
        };
        Self {
            source_language: self.source_language.clone(),
            target_language: pick(&update.target_language, &self.target_language),
            target_accent: pick(&update.target_accent, &self.target_accent),
            system_prompt: pick(&update.system_prompt, &self.system_prompt),
        }
    }
}
