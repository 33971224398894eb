//! 送出フレームスケジューラ（ジッタバッファ）
//!
//! パイプラインが不定期に積む音声バッチを、伝送路の固定周期で
//! 固定長フレームとして取り出します。キューが空なら無音フレームを返し、
//! バッチ末尾の端数はゼロ詰めして次のバッチと混ぜません。
//!
//! `enqueue`（パイプライン完了側）と `next_frame`（フレームクロック側）は
//! 別の実行コンテキストから呼ばれるため、キューは Mutex で保護します。
//! ロック区間は数百サンプルのコピーのみで、I/O は行いません。
mod clock;

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::audio_pipeline::{resample, AudioClip, AudioFrame};

pub use clock::{FrameClock, FrameSource};

#[derive(Debug)]
struct Batch {
    samples: Vec<i16>,
    offset: usize,
}

impl Batch {
    fn remaining(&self) -> usize {
        self.samples.len() - self.offset
    }
}

#[derive(Debug, Default)]
struct QueueState {
    batches: VecDeque<Batch>,
    queued_samples: usize,
    next_timestamp: u64,
}

#[derive(Debug)]
pub struct OutboundScheduler {
    state: Mutex<QueueState>,
    frame_samples: usize,
    sample_rate_hz: u32,
}

impl OutboundScheduler {
    /// 伝送路のレートと1フレームのサンプル数（48kHz/20ms なら 960）
    pub fn new(sample_rate_hz: u32, frame_samples: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            frame_samples: frame_samples.max(1),
            sample_rate_hz,
        }
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// 音声片を伝送路レートへリサンプルしてから末尾へ積む。積んだサンプル数を返す
    pub fn enqueue(&self, clip: &AudioClip) -> usize {
        let samples = resample(clip.samples(), clip.sample_rate_hz(), self.sample_rate_hz);
        self.enqueue_samples(samples)
    }

    /// 既に伝送路レートのサンプル列を積む
    pub fn enqueue_samples(&self, samples: Vec<i16>) -> usize {
        let len = samples.len();
        if len == 0 {
            return 0;
        }
        let mut state = self.state.lock();
        state.queued_samples += len;
        state.batches.push_back(Batch { samples, offset: 0 });
        len
    }

    /// 次の1フレームを返す。ブロックしない
    pub fn next_frame(&self) -> AudioFrame {
        let frame_samples = self.frame_samples;
        let mut state = self.state.lock();
        let timestamp = state.next_timestamp;
        state.next_timestamp += frame_samples as u64;

        let Some(head) = state.batches.front_mut() else {
            return AudioFrame::silence(frame_samples, self.sample_rate_hz, timestamp);
        };

        let start = head.offset;
        let (samples, consumed, exhausted) = if head.remaining() >= frame_samples {
            head.offset += frame_samples;
            (
                head.samples[start..start + frame_samples].to_vec(),
                frame_samples,
                head.remaining() == 0,
            )
        } else {
            let mut padded = Vec::with_capacity(frame_samples);
            padded.extend_from_slice(&head.samples[start..]);
            let consumed = padded.len();
            padded.resize(frame_samples, 0);
            (padded, consumed, true)
        };

        if exhausted {
            state.batches.pop_front();
        }
        state.queued_samples -= consumed;
        AudioFrame::new(samples, self.sample_rate_hz, timestamp)
    }

    /// 未送出のサンプル数
    pub fn queued_samples(&self) -> usize {
        self.state.lock().queued_samples
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().batches.is_empty()
    }

    /// 未送出の音声をすべて破棄
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.queued_samples;
        state.batches.clear();
        state.queued_samples = 0;
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: usize = 960;

    fn scheduler() -> OutboundScheduler {
        OutboundScheduler::new(48_000, FRAME)
    }

    #[test]
    fn empty_queue_yields_silence_with_advancing_timestamps() {
        let sched = scheduler();
        let first = sched.next_frame();
        let second = sched.next_frame();
        assert_eq!(first.samples().len(), FRAME);
        assert!(first.is_silent());
        assert_eq!(first.sample_rate_hz(), 48_000);
        assert_eq!(second.timestamp(), first.timestamp() + FRAME as u64);
    }

    #[test]
    fn one_and_a_half_frames_yield_full_then_padded() {
        let sched = scheduler();
        let batch: Vec<i16> = (1..=(FRAME * 3 / 2) as i16).collect();
        sched.enqueue_samples(batch.clone());

        let full = sched.next_frame();
        assert_eq!(full.samples(), &batch[..FRAME]);

        let padded = sched.next_frame();
        assert_eq!(&padded.samples()[..FRAME / 2], &batch[FRAME..]);
        assert!(padded.samples()[FRAME / 2..].iter().all(|s| *s == 0));

        assert!(sched.is_empty());
        assert_eq!(sched.queued_samples(), 0);
        assert!(sched.next_frame().is_silent());
    }

    #[test]
    fn partial_batch_is_not_merged_with_next_batch() {
        let sched = scheduler();
        sched.enqueue_samples(vec![7; 100]);
        sched.enqueue_samples(vec![9; FRAME]);

        let first = sched.next_frame();
        assert_eq!(&first.samples()[..100], &[7; 100][..]);
        assert!(first.samples()[100..].iter().all(|s| *s == 0));
        assert_eq!(sched.next_frame().samples(), &[9; FRAME][..]);
    }

    #[test]
    fn enqueue_resamples_to_transport_rate() {
        let sched = scheduler();
        let clip = AudioClip::new(vec![500_i16; 480], 24_000);
        assert_eq!(sched.enqueue(&clip), 960);
        assert_eq!(sched.next_frame().samples(), &[500; FRAME][..]);
    }

    #[test]
    fn clear_discards_pending_audio() {
        let sched = scheduler();
        sched.enqueue_samples(vec![1; FRAME * 2]);
        sched.next_frame();
        assert_eq!(sched.clear(), FRAME);
        assert!(sched.next_frame().is_silent());
    }
}
