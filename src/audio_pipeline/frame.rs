use std::sync::Arc;

/// 伝送路へ送る固定長フレーム（PCM16 モノラル）。生成後は不変
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Arc<[i16]>,
    sample_rate_hz: u32,
    timestamp: u64,
}

impl AudioFrame {
    /// `timestamp` はセッション開始からのサンプル数（提示時刻）
    pub fn new(samples: impl Into<Arc<[i16]>>, sample_rate_hz: u32, timestamp: u64) -> Self {
        Self {
            samples: samples.into(),
            sample_rate_hz,
            timestamp,
        }
    }

    pub fn silence(sample_count: usize, sample_rate_hz: u32, timestamp: u64) -> Self {
        Self::new(vec![0_i16; sample_count], sample_rate_hz, timestamp)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|s| *s == 0)
    }
}

/// サンプルレート付きの音声片。複製は参照カウントのみ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    samples: Arc<[i16]>,
    sample_rate_hz: u32,
}

impl AudioClip {
    pub fn new(samples: impl Into<Arc<[i16]>>, sample_rate_hz: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate_hz,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// PCM16 としてのバイト長
    pub fn byte_len(&self) -> usize {
        self.samples.len() * std::mem::size_of::<i16>()
    }
}
