//! 翻訳サービス（文字起こし→翻訳→音声合成）の抽象
//!
//! `TranslationService` は遠隔サービスの3操作を表す最小インタフェース。
//! 実装は Gemini HTTP クライアント（`GeminiService`）とモック
//! （`MockTranslationService`）。いずれも遅延・失敗しうる前提で扱います。
mod error;
pub mod gemini;
mod mock;
mod response;

use std::sync::Arc;

use async_trait::async_trait;

use crate::audio_pipeline::AudioClip;
use crate::config::LanguageProfile;

pub use error::ServiceError;
pub use gemini::GeminiService;
pub use mock::{MockBehavior, MockTranslationService, Stage};
pub use response::{parse_generate_response, ResponsePart};

/// 文字起こしサービスが「聞き取れない」時に返す定型文
pub const NOT_RECOGNIZABLE: &str = "<Not recognizable>";

#[async_trait]
pub trait TranslationService: Send + Sync {
    /// 発話音声（サービス入力レート）を元言語のテキストへ
    async fn transcribe(
        &self,
        audio: &AudioClip,
        profile: &LanguageProfile,
    ) -> Result<String, ServiceError>;

    /// テキストを目的言語へ翻訳。応答は構造化フィールドを含む生テキスト
    async fn translate(&self, text: &str, profile: &LanguageProfile)
        -> Result<String, ServiceError>;

    /// 目的言語テキストを音声へ
    async fn synthesize(
        &self,
        text: &str,
        profile: &LanguageProfile,
    ) -> Result<AudioClip, ServiceError>;
}

#[async_trait]
impl<T> TranslationService for Arc<T>
where
    T: TranslationService + ?Sized,
{
    async fn transcribe(
        &self,
        audio: &AudioClip,
        profile: &LanguageProfile,
    ) -> Result<String, ServiceError> {
        (**self).transcribe(audio, profile).await
    }

    async fn translate(
        &self,
        text: &str,
        profile: &LanguageProfile,
    ) -> Result<String, ServiceError> {
        (**self).translate(text, profile).await
    }

    async fn synthesize(
        &self,
        text: &str,
        profile: &LanguageProfile,
    ) -> Result<AudioClip, ServiceError> {
        (**self).synthesize(text, profile).await
    }
}
