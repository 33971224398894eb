//! 音声前処理モジュール
//!
//! 受信フレーム（入力レート）をサービス側レートへリサンプルし、
//! 発話判定用の固定長ウィンドウへ組み直します。送出側で使う
//! `AudioFrame` / `AudioClip` もここで定義します。
mod frame;
mod resampler;
mod utils;
mod window_assembler;

use crate::config::AudioProcessingConfig;

pub use frame::{AudioClip, AudioFrame};
pub use resampler::{expected_len, resample, try_resample, LinearResampler, ResampleError};
pub use utils::{decode_pcm16le, encode_pcm16le, DecodeError};
pub use window_assembler::WindowAssembler;

#[derive(Debug)]
pub struct AudioPipeline {
    resampler: LinearResampler,
    assembler: WindowAssembler,
}

impl AudioPipeline {
    pub fn new(config: &AudioProcessingConfig) -> Self {
        Self {
            resampler: LinearResampler::new(
                config.input.sample_rate_hz,
                config.service.input_sample_rate_hz,
            ),
            assembler: WindowAssembler::new(config.vad_window_samples()),
        }
    }

    /// 入力レートのフレームを判定ウィンドウ列へ変換
    pub fn process(&mut self, frame: &[i16]) -> Vec<Vec<i16>> {
        let resampled = self.resampler.resample(frame);
        self.assembler.push(&resampled)
    }

    /// ウィンドウに満たない端数を破棄
    pub fn reset(&mut self) -> usize {
        self.assembler.discard_remainder()
    }

    pub fn service_rate(&self) -> u32 {
        self.resampler.output_rate()
    }
}
