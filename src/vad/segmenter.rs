use std::time::Instant;

use tracing::{debug, warn};

use crate::audio_pipeline::AudioClip;

use super::VoiceClassifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    Idle,
    Speaking,
}

/// 発話中に溜めたウィンドウを連結した1発話分の音声
#[derive(Debug, Clone)]
pub struct Utterance {
    audio: AudioClip,
    started_at: Instant,
    window_count: usize,
}

impl Utterance {
    pub fn new(audio: AudioClip, started_at: Instant, window_count: usize) -> Self {
        Self {
            audio,
            started_at,
            window_count,
        }
    }

    pub fn audio(&self) -> &AudioClip {
        &self.audio
    }

    pub fn into_audio(self) -> AudioClip {
        self.audio
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn window_count(&self) -> usize {
        self.window_count
    }

    pub fn byte_len(&self) -> usize {
        self.audio.byte_len()
    }
}

/// IDLE / SPEAKING の2状態で発話を切り出す
///
/// SPEAKING 中は無音ウィンドウも含めてすべて蓄積し、連続無音が
/// `silence_threshold` に達した時点で1発話を確定する。
#[derive(Debug)]
pub struct Segmenter<C> {
    classifier: C,
    window_samples: usize,
    silence_threshold: usize,
    sample_rate_hz: u32,
    state: SegmenterState,
    buffer: Vec<i16>,
    silent_windows: usize,
    buffered_windows: usize,
    started_at: Option<Instant>,
}

impl<C> Segmenter<C>
where
    C: VoiceClassifier,
{
    pub fn new(
        classifier: C,
        window_samples: usize,
        silence_threshold: usize,
        sample_rate_hz: u32,
    ) -> Self {
        Self {
            classifier,
            window_samples,
            silence_threshold: silence_threshold.max(1),
            sample_rate_hz,
            state: SegmenterState::Idle,
            buffer: Vec::new(),
            silent_windows: 0,
            buffered_windows: 0,
            started_at: None,
        }
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    pub fn window_samples(&self) -> usize {
        self.window_samples
    }

    /// 1ウィンドウを投入し、発話が確定したら返す
    pub fn push_window(&mut self, window: &[i16]) -> Option<Utterance> {
        if window.len() < self.window_samples {
            debug!(
                samples = window.len(),
                required = self.window_samples,
                "window too short to classify; discarded"
            );
            return None;
        }

        let is_speech = match self.classifier.is_speech(window) {
            Ok(is_speech) => is_speech,
            Err(err) => {
                warn!(error = %err, "voice activity check failed; treating window as silence");
                false
            }
        };

        match self.state {
            SegmenterState::Idle => {
                if is_speech {
                    self.state = SegmenterState::Speaking;
                    self.buffer.clear();
                    self.buffer.extend_from_slice(window);
                    self.buffered_windows = 1;
                    self.silent_windows = 0;
                    self.started_at = Some(Instant::now());
                }
                None
            }
            SegmenterState::Speaking => {
                self.buffer.extend_from_slice(window);
                self.buffered_windows += 1;
                if is_speech {
                    self.silent_windows = 0;
                    return None;
                }
                self.silent_windows += 1;
                if self.silent_windows >= self.silence_threshold {
                    Some(self.complete())
                } else {
                    None
                }
            }
        }
    }

    /// 複数ウィンドウをまとめて投入
    pub fn push_windows<I, W>(&mut self, windows: I) -> Vec<Utterance>
    where
        I: IntoIterator<Item = W>,
        W: AsRef<[i16]>,
    {
        windows
            .into_iter()
            .filter_map(|w| self.push_window(w.as_ref()))
            .collect()
    }

    /// 状態を初期化（蓄積中の音声は破棄）
    pub fn reset(&mut self) {
        self.state = SegmenterState::Idle;
        self.buffer.clear();
        self.silent_windows = 0;
        self.buffered_windows = 0;
        self.started_at = None;
    }

    fn complete(&mut self) -> Utterance {
        let samples = std::mem::take(&mut self.buffer);
        let started_at = self.started_at.take().unwrap_or_else(Instant::now);
        let utterance = Utterance::new(
            AudioClip::new(samples, self.sample_rate_hz),
            started_at,
            self.buffered_windows,
        );
        debug!(
            windows = utterance.window_count(),
            bytes = utterance.byte_len(),
            "utterance completed"
        );
        self.state = SegmenterState::Idle;
        self.silent_windows = 0;
        self.buffered_windows = 0;
        utterance
    }
}
