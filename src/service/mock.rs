use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::audio_pipeline::AudioClip;
use crate::config::LanguageProfile;

use super::{ServiceError, TranslationService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Transcribe,
    Translate,
    Synthesize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// 定型の文字起こし・翻訳と短いトーンを返す
    Echo,
    /// 指定段階で失敗する
    FailAt(Stage),
    /// 文字起こしで発話なしを返す
    NoSpeech,
    /// 各段階の前に待機する
    Delay(Duration),
    /// 応答を返さない
    Hang,
}

/// ローカル動作確認・テスト用の翻訳サービス
#[derive(Debug)]
pub struct MockTranslationService {
    behavior: MockBehavior,
    synthesis_rate_hz: u32,
    calls: AtomicUsize,
}

impl MockTranslationService {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            synthesis_rate_hz: 24_000,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn echo() -> Self {
        Self::new(MockBehavior::Echo)
    }

    pub fn with_synthesis_rate(mut self, rate_hz: u32) -> Self {
        self.synthesis_rate_hz = rate_hz.max(1);
        self
    }

    /// 呼び出された段階の延べ数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, stage: Stage) -> Result<(), ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Echo | MockBehavior::NoSpeech => Ok(()),
            MockBehavior::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
            MockBehavior::Hang => std::future::pending().await,
            MockBehavior::FailAt(failing) if *failing == stage => Err(ServiceError::Status {
                status: 503,
                message: format!("mock failure at {stage:?}"),
            }),
            MockBehavior::FailAt(_) => Ok(()),
        }
    }
}

#[async_trait]
impl TranslationService for MockTranslationService {
    async fn transcribe(
        &self,
        audio: &AudioClip,
        _profile: &LanguageProfile,
    ) -> Result<String, ServiceError> {
        self.enter(Stage::Transcribe).await?;
        if self.behavior == MockBehavior::NoSpeech {
            return Err(ServiceError::NoSpeechDetected);
        }
        let millis = audio.len() as u64 * 1000 / audio.sample_rate_hz().max(1) as u64;
        Ok(format!("utterance of {millis} ms"))
    }

    async fn translate(
        &self,
        text: &str,
        profile: &LanguageProfile,
    ) -> Result<String, ServiceError> {
        self.enter(Stage::Translate).await?;
        Ok(serde_json::json!({
            "translation": format!("[{}] {}", profile.target_language, text)
        })
        .to_string())
    }

    async fn synthesize(
        &self,
        _text: &str,
        _profile: &LanguageProfile,
    ) -> Result<AudioClip, ServiceError> {
        self.enter(Stage::Synthesize).await?;
        // 440Hz, 250ms
        let rate = self.synthesis_rate_hz;
        let samples: Vec<i16> = (0..rate / 4)
            .map(|n| {
                let t = n as f64 / rate as f64;
                ((t * 440.0 * std::f64::consts::TAU).sin() * 8000.0) as i16
            })
            .collect();
        Ok(AudioClip::new(samples, rate))
    }
}
