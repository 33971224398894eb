//! 固定周期でフレームを引き出して送出先へ流すクロック
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::OutboundScheduler;
use crate::audio_pipeline::AudioFrame;

/// フレームの取り出し元。`None` を返すとクロックは停止する
pub trait FrameSource: Send + Sync + 'static {
    fn pull_frame(&self) -> Option<AudioFrame>;
}

impl FrameSource for OutboundScheduler {
    fn pull_frame(&self) -> Option<AudioFrame> {
        Some(self.next_frame())
    }
}

impl<T: FrameSource> FrameSource for Arc<T> {
    fn pull_frame(&self) -> Option<AudioFrame> {
        (**self).pull_frame()
    }
}

/// 動作中のクロック。drop で停止する
#[derive(Debug)]
pub struct FrameClock {
    handle: JoinHandle<u64>,
}

impl FrameClock {
    /// `period` ごとに1フレーム取り出して `sink` へ送る
    ///
    /// 送出先が詰まっている間のフレームは捨てる。
    /// 送出先が閉じられるか、取り出し元が `None` を返したら終了する。
    pub fn spawn<F>(source: F, period: Duration, sink: mpsc::Sender<AudioFrame>) -> Self
    where
        F: FrameSource,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sent = 0_u64;
            let mut dropped = 0_u64;
            loop {
                ticker.tick().await;
                let Some(frame) = source.pull_frame() else {
                    debug!(sent, dropped, "frame source gone; clock stopped");
                    break;
                };
                match sink.try_send(frame) {
                    Ok(()) => sent += 1,
                    Err(TrySendError::Full(_)) => {
                        dropped += 1;
                        trace!(dropped, "frame sink full; frame dropped");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(sent, dropped, "frame sink closed; clock stopped");
                        break;
                    }
                }
            }
            sent
        });
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    /// 停止を待って送出済みフレーム数を返す。中断された場合は `None`
    pub async fn join(mut self) -> Option<u64> {
        (&mut self.handle).await.ok()
    }
}

impl Drop for FrameClock {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Countdown {
        remaining: AtomicUsize,
    }

    impl FrameSource for Countdown {
        fn pull_frame(&self) -> Option<AudioFrame> {
            let left = self.remaining.load(Ordering::SeqCst);
            if left == 0 {
                return None;
            }
            self.remaining.store(left - 1, Ordering::SeqCst);
            Some(AudioFrame::silence(4, 48_000, 0))
        }
    }

    #[tokio::test]
    async fn clock_delivers_scheduled_audio_then_silence() {
        let scheduler = Arc::new(OutboundScheduler::new(48_000, 960));
        scheduler.enqueue_samples(vec![3; 960]);
        let (tx, mut rx) = mpsc::channel(8);
        let clock = FrameClock::spawn(scheduler.clone(), Duration::from_millis(5), tx);

        let first = rx.recv().await.expect("frame");
        let second = rx.recv().await.expect("frame");
        assert_eq!(first.samples(), &[3; 960][..]);
        assert!(second.is_silent());
        assert_eq!(second.timestamp(), 960);
        clock.stop();
    }

    #[tokio::test]
    async fn clock_stops_when_source_is_exhausted() {
        let source = Countdown {
            remaining: AtomicUsize::new(3),
        };
        let (tx, mut rx) = mpsc::channel(8);
        let clock = FrameClock::spawn(source, Duration::from_millis(1), tx);
        assert_eq!(clock.join().await, Some(3));
        let mut received = 0;
        while rx.recv().await.is_some() {
            received += 1;
        }
        assert_eq!(received, 3);
    }

    #[tokio::test]
    async fn clock_stops_when_sink_closes() {
        let scheduler = Arc::new(OutboundScheduler::new(48_000, 960));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let clock = FrameClock::spawn(scheduler, Duration::from_millis(1), tx);
        assert_eq!(clock.join().await, Some(0));
    }
}
