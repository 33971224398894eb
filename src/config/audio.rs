//! 音声処理に関する設定値
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AudioProcessingConfig {
    pub input: InputFormat,
    pub transport: TransportFormat,
    pub service: ServiceFormat,
    pub vad: VadConfig,
}

impl AudioProcessingConfig {
    /// 伝送路の1フレームあたりサンプル数を計算（48kHz/20ms → 960）
    pub fn transport_frame_samples(&self) -> usize {
        samples_for(self.transport.sample_rate_hz, self.transport.frame_duration_ms)
    }

    /// 発話判定ウィンドウのサンプル数（16kHz/30ms → 480）
    pub fn vad_window_samples(&self) -> usize {
        samples_for(self.service.input_sample_rate_hz, self.vad.window_ms)
    }

    /// フレーム周期
    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.transport.frame_duration_ms as u64)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputFormat {
    pub sample_rate_hz: u32,
    pub channels: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportFormat {
    pub sample_rate_hz: u32,
    pub frame_duration_ms: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceFormat {
    pub input_sample_rate_hz: u32,
    pub synthesis_sample_rate_hz: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VadConfig {
    pub window_ms: u32,
    pub silence_windows: usize,
    pub energy_threshold: f64,
}

fn samples_for(sample_rate_hz: u32, duration_ms: u32) -> usize {
    (sample_rate_hz as u64 * duration_ms as u64 / 1000) as usize
}
