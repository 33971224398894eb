use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use realtime_translate_api::audio_pipeline::{encode_pcm16le, AudioClip};
use realtime_translate_api::config::{ConfigSet, DeliveryMode, LanguageProfile, ProfileUpdate};
use realtime_translate_api::relay::{RelayError, RelayEvent, RelayService};
use realtime_translate_api::service::{
    MockBehavior, MockTranslationService, ServiceError, Stage, TranslationService,
};
use realtime_translate_api::session::SessionError;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// 16kHz 20ms
const FRAME: usize = 320;
const WAIT: Duration = Duration::from_secs(3);

fn config() -> ConfigSet {
    ConfigSet::load_from_dir("config").expect("config")
}

/// `speech_frames` 分の発話と、発話を確定させる 30 フレームの無音
fn spoken(speech_frames: usize) -> Vec<u8> {
    let mut samples = vec![4_000_i16; speech_frames * FRAME];
    samples.extend(vec![0_i16; 30 * FRAME]);
    encode_pcm16le(&samples)
}

async fn next_event(rx: &mut mpsc::Receiver<RelayEvent>) -> RelayEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("event in time")
        .expect("event channel open")
}

#[tokio::test]
async fn side_channel_delivers_translation_with_audio() {
    let relay = RelayService::new(&config(), Arc::new(MockTranslationService::echo()))
        .with_delivery_mode(DeliveryMode::SideChannel);
    let mut events = relay.open_session("s-1").expect("open");

    // 15 フレーム = 10 ウィンドウの発話 + 15 ウィンドウの無音 = 750ms
    assert_eq!(relay.audio_in("s-1", &spoken(15)).expect("audio"), 1);

    match next_event(&mut events).await {
        RelayEvent::TranslationResult {
            session_id,
            english_text,
            target_text,
            audio,
        } => {
            assert_eq!(session_id, "s-1");
            assert_eq!(english_text, "utterance of 750 ms");
            assert_eq!(target_text, "[Vietnamese] utterance of 750 ms");
            let audio = audio.expect("side channel audio");
            assert_eq!(audio.sample_rate_hz(), 24_000);
        }
        other => panic!("expected translation, got {other:?}"),
    }
    // 送出キューは使わない
    assert!(relay.next_frame("s-1").expect("frame").is_silent());
}

#[tokio::test]
async fn frame_scheduler_plays_translated_audio_through_frames() {
    let relay = RelayService::new(&config(), Arc::new(MockTranslationService::echo()))
        .with_delivery_mode(DeliveryMode::FrameScheduler);
    let mut events = relay.open_session("s-2").expect("open");
    relay.audio_in("s-2", &spoken(15)).expect("audio");

    let event = next_event(&mut events).await;
    assert!(!event.is_error());
    assert!(event.audio().is_none());

    // 24kHz 250ms のトーン -> 48kHz 12000 サンプル = 13 フレーム（最後はゼロ詰め）
    let mut audible = 0;
    for _ in 0..20 {
        let frame = relay.next_frame("s-2").expect("frame");
        assert_eq!(frame.samples().len(), 960);
        assert_eq!(frame.sample_rate_hz(), 48_000);
        if !frame.is_silent() {
            audible += 1;
        }
    }
    assert_eq!(audible, 13);
}

#[tokio::test]
async fn failed_translation_echoes_original_audio() {
    let service = MockTranslationService::new(MockBehavior::FailAt(Stage::Translate));
    let relay = RelayService::new(&config(), Arc::new(service))
        .with_delivery_mode(DeliveryMode::SideChannel);
    let mut events = relay.open_session("s-3").expect("open");
    relay.audio_in("s-3", &spoken(15)).expect("audio");

    match next_event(&mut events).await {
        RelayEvent::TranslationError {
            reason,
            fallback_audio,
            ..
        } => {
            assert!(!reason.is_empty());
            let audio = fallback_audio.expect("fallback audio");
            assert_eq!(audio.sample_rate_hz(), 16_000);
            assert_eq!(audio.len(), 25 * 480);
            assert!(audio.samples()[..480].iter().all(|s| *s == 4_000));
        }
        other => panic!("expected error event, got {other:?}"),
    }
}

/// 同時実行数を記録するサービス
#[derive(Default)]
struct Tracking {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl TranslationService for Tracking {
    async fn transcribe(&self, audio: &AudioClip, _: &LanguageProfile) -> Result<String, ServiceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("{} samples", audio.len()))
    }

    async fn translate(&self, text: &str, _: &LanguageProfile) -> Result<String, ServiceError> {
        Ok(text.to_string())
    }

    async fn synthesize(&self, _: &str, _: &LanguageProfile) -> Result<AudioClip, ServiceError> {
        Ok(AudioClip::new(vec![1_i16; 240], 24_000))
    }
}

#[tokio::test]
async fn utterances_are_processed_one_at_a_time_in_order() {
    let service = Arc::new(Tracking::default());
    let relay = RelayService::new(&config(), service.clone());
    let mut events = relay.open_session("s-4").expect("open");

    let mut payload = spoken(15);
    payload.extend(spoken(30));
    payload.extend(spoken(6));
    assert_eq!(relay.audio_in("s-4", &payload).expect("audio"), 3);

    let mut texts = Vec::new();
    for _ in 0..3 {
        match next_event(&mut events).await {
            RelayEvent::TranslationResult { english_text, .. } => texts.push(english_text),
            other => panic!("unexpected {other:?}"),
        }
    }
    // 10+15, 20+15, 4+15 ウィンドウ
    assert_eq!(texts, ["12000 samples", "16800 samples", "9120 samples"]);
    assert_eq!(service.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn destroying_a_session_mid_translation_drops_the_result() {
    let service = MockTranslationService::new(MockBehavior::Delay(Duration::from_millis(200)));
    let relay = RelayService::new(&config(), Arc::new(service));
    let mut events = relay.open_session("s-5").expect("open");
    relay.audio_in("s-5", &spoken(15)).expect("audio");
    tokio::time::sleep(Duration::from_millis(20)).await;

    relay.close_session("s-5").expect("close");
    let after = timeout(WAIT, events.recv()).await.expect("channel closes");
    assert!(after.is_none());

    assert_eq!(
        relay.audio_in("s-5", &spoken(1)).unwrap_err(),
        RelayError::Session(SessionError::not_found("s-5"))
    );
    assert!(relay.next_frame("s-5").unwrap_err().is_not_found());
    assert!(relay.close_session("s-5").unwrap_err().is_not_found());
}

#[tokio::test]
async fn utterances_beyond_the_queue_get_original_audio_back() {
    let service = MockTranslationService::new(MockBehavior::Delay(Duration::from_millis(10)));
    let relay = RelayService::new(&config(), Arc::new(service))
        .with_delivery_mode(DeliveryMode::SideChannel);
    let mut events = relay.open_session("s-6").expect("open");

    let payload: Vec<u8> = (0..6).flat_map(|_| spoken(6)).collect();
    // 上限4件。溢れた2件は翻訳せずに元音声で返る
    assert_eq!(relay.audio_in("s-6", &payload).expect("audio"), 4);

    let mut translated = 0;
    let mut busy = 0;
    for _ in 0..6 {
        match next_event(&mut events).await {
            RelayEvent::TranslationResult { .. } => translated += 1,
            RelayEvent::TranslationError {
                reason,
                fallback_audio,
                ..
            } => {
                assert!(reason.contains("busy"), "{reason}");
                let audio = fallback_audio.expect("fallback audio");
                // 4 + 15 ウィンドウ
                assert_eq!(audio.len(), 19 * 480);
                busy += 1;
            }
        }
    }
    assert_eq!((translated, busy), (4, 2));
    assert!(timeout(Duration::from_millis(200), events.recv()).await.is_err());
}

#[tokio::test]
async fn busy_fallback_is_scheduled_for_playback() {
    let service = MockTranslationService::new(MockBehavior::Hang);
    let relay = RelayService::new(&config(), Arc::new(service))
        .with_delivery_mode(DeliveryMode::FrameScheduler);
    let mut events = relay.open_session("s-9").expect("open");

    let payload: Vec<u8> = (0..5).flat_map(|_| spoken(6)).collect();
    assert_eq!(relay.audio_in("s-9", &payload).expect("audio"), 4);

    let event = next_event(&mut events).await;
    assert!(event.is_error());
    assert!(event.audio().is_none());
    // 元音声 16kHz 9120 サンプル -> 48kHz 27360 サンプル
    let session = relay.registry().get("s-9").expect("session");
    assert_eq!(session.scheduler().queued_samples(), 19 * 480 * 3);
    let first = relay.next_frame("s-9").expect("frame");
    assert!(first.samples().iter().any(|s| *s != 0));
    relay.close_session("s-9").expect("close");
}

#[tokio::test]
async fn profile_update_changes_target_language() {
    let relay = RelayService::new(&config(), Arc::new(MockTranslationService::echo()));
    let mut events = relay.open_session("s-7").expect("open");
    let update = ProfileUpdate {
        target_language: Some("Japanese".into()),
        ..ProfileUpdate::default()
    };
    let profile = relay.set_profile("s-7", &update).expect("profile");
    assert_eq!(profile.target_language, "Japanese");

    relay.audio_in("s-7", &spoken(15)).expect("audio");
    match next_event(&mut events).await {
        RelayEvent::TranslationResult { target_text, .. } => {
            assert!(target_text.starts_with("[Japanese]"), "{target_text}");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_and_malformed_input_is_rejected() {
    let relay = RelayService::new(&config(), Arc::new(MockTranslationService::echo()));
    let _events = relay.open_session("s-8").expect("open");
    assert_eq!(
        relay.open_session("s-8").unwrap_err(),
        RelayError::Session(SessionError::already_exists("s-8"))
    );
    assert!(matches!(
        relay.audio_in("s-8", &[1, 2, 3]),
        Err(RelayError::Decode(_))
    ));
    assert!(relay.audio_in("nobody", &spoken(1)).unwrap_err().is_not_found());
}

#[tokio::test]
async fn shutdown_closes_every_open_session() {
    let relay = RelayService::new(&config(), Arc::new(MockTranslationService::echo()));
    let mut first = relay.open_session("a").expect("open a");
    let mut second = relay.open_session("b").expect("open b");

    assert_eq!(relay.shutdown(), 2);
    assert!(relay.registry().is_empty());
    for events in [&mut first, &mut second] {
        let closed = timeout(WAIT, events.recv()).await.expect("channel closes");
        assert!(closed.is_none());
    }
    assert!(relay.next_frame("a").unwrap_err().is_not_found());
    assert_eq!(relay.shutdown(), 0);
}
