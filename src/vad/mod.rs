//! 発話区間検出（VAD）
//!
//! - `VoiceClassifier` は1ウィンドウを 発話/無音 に分類する差し替え可能な判定器
//! - `EnergyClassifier` は RMS しきい値による既定実装
//! - `Segmenter` は判定結果から発話単位（`Utterance`）を切り出す状態機械
mod segmenter;

use thiserror::Error;

use crate::config::VadConfig;

pub use segmenter::{Segmenter, SegmenterState, Utterance};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("classification window is empty")]
    EmptyWindow,
    #[error("voice activity classifier failed: {message}")]
    Backend { message: String },
}

pub trait VoiceClassifier: Send {
    /// `true` なら発話
    fn is_speech(&mut self, window: &[i16]) -> Result<bool, ClassifierError>;
}

impl VoiceClassifier for Box<dyn VoiceClassifier> {
    fn is_speech(&mut self, window: &[i16]) -> Result<bool, ClassifierError> {
        (**self).is_speech(window)
    }
}

/// RMS エネルギーがしきい値を超えたウィンドウを発話とみなす
#[derive(Debug, Clone)]
pub struct EnergyClassifier {
    threshold: f64,
}

impl EnergyClassifier {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn from_config(config: &VadConfig) -> Self {
        Self::new(config.energy_threshold)
    }

    pub fn rms(samples: &[i16]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / samples.len() as f64).sqrt()
    }
}

impl VoiceClassifier for EnergyClassifier {
    fn is_speech(&mut self, window: &[i16]) -> Result<bool, ClassifierError> {
        if window.is_empty() {
            return Err(ClassifierError::EmptyWindow);
        }
        Ok(Self::rms(window) > self.threshold)
    }
}
