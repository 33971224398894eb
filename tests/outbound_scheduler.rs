use std::sync::Arc;
use std::time::Duration;

use realtime_translate_api::audio_pipeline::AudioClip;
use realtime_translate_api::scheduler::{FrameClock, OutboundScheduler};
use tokio::sync::mpsc;

const FRAME: usize = 960;

fn batch(id: i16, len: usize) -> Vec<i16> {
    // 0 を含まない値で埋め、ゼロ詰めと区別できるようにする
    (0..len).map(|n| id * 1000 + (n % 997) as i16 + 1).collect()
}

#[test]
fn every_sample_is_emitted_exactly_once_in_order() {
    let lengths = [1_usize, 959, 960, 961, 1440, 2880, 37, 5000];
    let sched = OutboundScheduler::new(48_000, FRAME);
    let mut expected = Vec::new();
    for (i, &len) in lengths.iter().enumerate() {
        let samples = batch(i as i16 + 1, len);
        // バッチ末尾の端数フレームはゼロ詰めされる
        let padded = len.div_ceil(FRAME) * FRAME;
        expected.extend_from_slice(&samples);
        expected.resize(expected.len() + (padded - len), 0);
        assert_eq!(sched.enqueue_samples(samples), len);
    }

    let mut emitted = Vec::new();
    let mut last_timestamp = None;
    while !sched.is_empty() {
        let frame = sched.next_frame();
        assert_eq!(frame.samples().len(), FRAME);
        if let Some(prev) = last_timestamp {
            assert_eq!(frame.timestamp(), prev + FRAME as u64);
        }
        last_timestamp = Some(frame.timestamp());
        emitted.extend_from_slice(frame.samples());
    }
    assert_eq!(emitted, expected);
    assert_eq!(sched.queued_samples(), 0);
    assert!(sched.next_frame().is_silent());
}

#[test]
fn one_and_a_half_frames_then_empty() {
    let sched = OutboundScheduler::new(48_000, FRAME);
    sched.enqueue_samples(batch(1, FRAME + FRAME / 2));

    let first = sched.next_frame();
    assert!(first.samples().iter().all(|s| *s != 0));
    let second = sched.next_frame();
    assert!(second.samples()[..FRAME / 2].iter().all(|s| *s != 0));
    assert!(second.samples()[FRAME / 2..].iter().all(|s| *s == 0));
    assert!(sched.is_empty());
}

#[test]
fn synthesized_audio_is_resampled_on_enqueue() {
    let sched = OutboundScheduler::new(48_000, FRAME);
    // 24kHz 250ms -> 48kHz 12000 サンプル = 12.5 フレーム
    let clip = AudioClip::new(vec![321_i16; 6_000], 24_000);
    assert_eq!(sched.enqueue(&clip), 12_000);
    let frames: Vec<_> = (0..13).map(|_| sched.next_frame()).collect();
    assert!(frames[..12].iter().all(|f| f.samples().iter().all(|s| *s == 321)));
    assert_eq!(frames[12].samples().iter().filter(|s| **s == 321).count(), 480);
    assert!(sched.is_empty());
}

#[test]
fn concurrent_enqueue_and_drain_lose_nothing() {
    let sched = Arc::new(OutboundScheduler::new(48_000, FRAME));
    let producers: Vec<_> = (0..4)
        .map(|p| {
            let sched = sched.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    sched.enqueue_samples(vec![p + 1; FRAME]);
                }
            })
        })
        .collect();

    let mut non_silent = 0;
    while non_silent < 100 {
        let frame = sched.next_frame();
        if !frame.is_silent() {
            let first = frame.samples()[0];
            assert!(frame.samples().iter().all(|s| *s == first));
            non_silent += 1;
        }
        if producers.iter().all(|p| p.is_finished()) && sched.is_empty() {
            break;
        }
    }
    for p in producers {
        p.join().expect("producer");
    }
    while !sched.is_empty() {
        if !sched.next_frame().is_silent() {
            non_silent += 1;
        }
    }
    assert_eq!(non_silent, 100);
}

#[tokio::test]
async fn frame_clock_paces_silence_when_idle() {
    let sched = Arc::new(OutboundScheduler::new(48_000, FRAME));
    let (tx, mut rx) = mpsc::channel(16);
    let clock = FrameClock::spawn(sched.clone(), Duration::from_millis(20), tx);

    let first = rx.recv().await.expect("first frame");
    assert!(first.is_silent());
    sched.enqueue_samples(vec![5; FRAME]);
    let mut saw_audio = false;
    for _ in 0..5 {
        let frame = rx.recv().await.expect("frame");
        if !frame.is_silent() {
            saw_audio = true;
            break;
        }
    }
    assert!(saw_audio);
    clock.stop();
}
