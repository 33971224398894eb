//! 中継サービス
//!
//! 受信音声 → 前処理 → 発話検出 → 発話キュー → 翻訳パイプライン → 配信
//! を結線します。発話はセッションごとに1つずつ先着順で処理され、
//! 結果はセッションがまだ登録されている場合だけ配信されます。
mod event;

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::audio_pipeline::{decode_pcm16le, AudioFrame, DecodeError};
use crate::config::{AudioProcessingConfig, ConfigSet, DeliveryMode, LanguageProfile, ProfileUpdate};
use crate::pipeline::{BoundedPipeline, PipelineResult};
use crate::scheduler::{FrameClock, FrameSource, OutboundScheduler};
use crate::service::TranslationService;
use crate::session::{Admission, Session, SessionError, SessionRegistry};
use crate::vad::{EnergyClassifier, Utterance, VoiceClassifier};

pub use event::RelayEvent;

/// 1セッションあたりの未読イベント上限
const EVENT_CAPACITY: usize = 32;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("audio payload rejected: {0}")]
    Decode(#[from] DecodeError),
}

impl RelayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Session(SessionError::NotFound { .. }))
    }
}

/// セッションごとに新しい判定器を作る
pub type ClassifierFactory = Arc<dyn Fn() -> Box<dyn VoiceClassifier> + Send + Sync>;

pub struct RelayService<S>
where
    S: TranslationService + 'static,
{
    audio: Arc<AudioProcessingConfig>,
    registry: Arc<SessionRegistry>,
    pipeline: Arc<BoundedPipeline<S>>,
    delivery: DeliveryMode,
    max_pending: usize,
    classifiers: ClassifierFactory,
}

impl<S> Clone for RelayService<S>
where
    S: TranslationService + 'static,
{
    fn clone(&self) -> Self {
        Self {
            audio: self.audio.clone(),
            registry: self.registry.clone(),
            pipeline: self.pipeline.clone(),
            delivery: self.delivery,
            max_pending: self.max_pending,
            classifiers: self.classifiers.clone(),
        }
    }
}

impl<S> RelayService<S>
where
    S: TranslationService + 'static,
{
    pub fn new(config: &ConfigSet, service: Arc<S>) -> Self {
        let vad = config.audio.vad.clone();
        Self {
            audio: Arc::new(config.audio.clone()),
            registry: Arc::new(SessionRegistry::new(config.server.max_sessions)),
            pipeline: Arc::new(BoundedPipeline::new(
                service,
                Arc::new(config.pipeline.clone()),
            )),
            delivery: config.pipeline.delivery_mode,
            max_pending: config.pipeline.max_pending_utterances,
            classifiers: Arc::new(move || -> Box<dyn VoiceClassifier> {
                Box::new(EnergyClassifier::from_config(&vad))
            }),
        }
    }

    /// 発話判定器を差し替える
    pub fn with_classifier<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn VoiceClassifier> + Send + Sync + 'static,
    {
        self.classifiers = Arc::new(factory);
        self
    }

    pub fn with_delivery_mode(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.delivery
    }

    /// 送出フレームの周期
    pub fn frame_duration(&self) -> Duration {
        self.audio.frame_duration()
    }

    /// セッションを作成し、発話処理タスクを起動する。戻り値はイベントの受信口
    pub fn open_session(&self, session_id: &str) -> Result<mpsc::Receiver<RelayEvent>, RelayError> {
        let (utterance_tx, utterance_rx) = mpsc::channel(self.max_pending);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let classifier = (self.classifiers)();
        let profile = self.pipeline.default_profile();
        let audio = &self.audio;
        let outlet = Outlet {
            session_id: session_id.to_string(),
            delivery: self.delivery,
            events: event_tx,
        };
        let pending = self.max_pending;

        let session = self.registry.create(session_id, |id| {
            let session = Session::new(id, audio, classifier, profile, utterance_tx);
            let overflow = outlet.clone();
            let scheduler = session.scheduler().clone();
            session.on_overflow(Box::new(move |utterance: Utterance| {
                overflow.reject_busy(&scheduler, utterance, pending)
            }));
            session
        })?;

        let worker = UtteranceWorker {
            session: Arc::downgrade(&session),
            registry: self.registry.clone(),
            pipeline: self.pipeline.clone(),
            outlet,
        };
        let handle = tokio::spawn(worker.run(utterance_rx));
        session.attach_worker(handle.abort_handle());
        Ok(event_rx)
    }

    /// PCM16LE の受信チャンクを取り込む。キューへ入った発話数を返す
    ///
    /// 処理待ちが上限に達している間に確定した発話は翻訳せず、
    /// 元音声付きの `TranslationError` としてすぐに返す。
    pub fn audio_in(&self, session_id: &str, payload: &[u8]) -> Result<usize, RelayError> {
        let session = self.registry.get(session_id)?;
        let samples = decode_pcm16le(payload)?;

        let mut queued = 0;
        for utterance in session.ingest(&samples) {
            let bytes = utterance.byte_len();
            match session.admit(utterance) {
                Admission::Queued => {
                    queued += 1;
                    debug!(session_id, bytes, "utterance queued");
                }
                Admission::Overflowed => {
                    debug!(session_id, bytes, "utterance queue full; original audio returned");
                }
                Admission::Dropped => {
                    warn!(session_id, bytes, "utterance queue full; utterance dropped");
                }
                Admission::Closed => {
                    debug!(session_id, "session closing; utterance discarded");
                }
            }
        }
        Ok(queued)
    }

    /// 送出キューから1フレーム取り出す（空なら無音）
    pub fn next_frame(&self, session_id: &str) -> Result<AudioFrame, RelayError> {
        let session = self.registry.get(session_id)?;
        Ok(session.scheduler().next_frame())
    }

    /// フレーム周期で `next_frame` を回すクロックを起動。セッション破棄で止まる
    pub fn spawn_frame_clock(
        &self,
        session_id: &str,
        sink: mpsc::Sender<AudioFrame>,
    ) -> Result<FrameClock, RelayError> {
        let session = self.registry.get(session_id)?;
        let source = SessionFrames {
            registry: self.registry.clone(),
            session: Arc::downgrade(&session),
        };
        Ok(FrameClock::spawn(source, self.frame_duration(), sink))
    }

    /// 言語プロファイルを部分的に上書きする
    pub fn set_profile(
        &self,
        session_id: &str,
        update: &ProfileUpdate,
    ) -> Result<Arc<LanguageProfile>, RelayError> {
        let session = self.registry.get(session_id)?;
        let profile = Arc::new(session.profile().apply(update));
        session.set_profile(profile.clone());
        info!(
            session_id,
            target_language = %profile.target_language,
            "language profile updated"
        );
        Ok(profile)
    }

    pub fn close_session(&self, session_id: &str) -> Result<(), RelayError> {
        self.registry.destroy(session_id)?;
        Ok(())
    }

    /// 全セッションを破棄する。破棄したセッション数を返す
    pub fn shutdown(&self) -> usize {
        let open = self.registry.session_ids();
        if !open.is_empty() {
            info!(sessions = ?open, "closing open sessions");
        }
        self.registry.destroy_all()
    }
}

/// 登録中の同一セッションからだけフレームを取り出す
struct SessionFrames {
    registry: Arc<SessionRegistry>,
    session: Weak<Session>,
}

impl FrameSource for SessionFrames {
    fn pull_frame(&self) -> Option<AudioFrame> {
        let session = self.session.upgrade()?;
        self.registry
            .is_current(&session)
            .then(|| session.scheduler().next_frame())
    }
}

/// 1セッション分の結果の出口（配信方式とイベント送信口）
#[derive(Clone)]
struct Outlet {
    session_id: String,
    delivery: DeliveryMode,
    events: mpsc::Sender<RelayEvent>,
}

impl Outlet {
    /// 配信方式に従って音声を振り分け、イベントへ変換する
    fn settle(&self, scheduler: &OutboundScheduler, result: PipelineResult) -> RelayEvent {
        let audio = match self.delivery {
            DeliveryMode::FrameScheduler => {
                let samples = scheduler.enqueue(result.audio());
                debug!(session_id = %self.session_id, samples, "audio scheduled for playback");
                None
            }
            DeliveryMode::SideChannel => Some(result.audio().clone()),
        };

        let session_id = self.session_id.clone();
        let reason = result.status_message();
        match result {
            PipelineResult::Translated {
                english_text,
                target_text,
                ..
            } => RelayEvent::TranslationResult {
                session_id,
                english_text,
                target_text,
                audio,
            },
            PipelineResult::Degraded { .. } | PipelineResult::TimedOut { .. } => {
                RelayEvent::TranslationError {
                    session_id,
                    reason,
                    fallback_audio: audio,
                }
            }
        }
    }

    /// 処理待ちから溢れた発話を元音声のまま返す。ブロックしない
    fn reject_busy(&self, scheduler: &OutboundScheduler, utterance: Utterance, pending: usize) {
        let session_id = self.session_id.as_str();
        let windows = utterance.window_count();
        let event = self.settle(scheduler, PipelineResult::busy(utterance, pending));
        match self.events.try_send(event) {
            Ok(()) => warn!(session_id, windows, pending, "translator busy; original audio returned"),
            Err(TrySendError::Full(_)) => {
                warn!(session_id, windows, "event queue full; busy result dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(session_id, "event receiver gone; busy result dropped");
            }
        }
    }
}

struct UtteranceWorker<S>
where
    S: TranslationService + 'static,
{
    session: Weak<Session>,
    registry: Arc<SessionRegistry>,
    pipeline: Arc<BoundedPipeline<S>>,
    outlet: Outlet,
}

impl<S> UtteranceWorker<S>
where
    S: TranslationService + 'static,
{
    fn live_session(&self) -> Option<Arc<Session>> {
        let session = self.session.upgrade()?;
        self.registry.is_current(&session).then_some(session)
    }

    async fn run(self, mut utterances: mpsc::Receiver<Utterance>) {
        let session_id = self.outlet.session_id.as_str();
        while let Some(utterance) = utterances.recv().await {
            let Some(session) = self.live_session() else {
                break;
            };
            let profile = session.profile();
            drop(session);

            let result = self.pipeline.process(utterance, profile).await;

            let Some(session) = self.live_session() else {
                debug!(session_id, "session destroyed while translating; result dropped");
                break;
            };
            let event = self.outlet.settle(session.scheduler(), result);
            if self.outlet.events.send(event).await.is_err() {
                debug!(session_id, "event receiver gone; worker stopped");
                break;
            }
        }
        debug!(session_id, "utterance worker finished");
    }
}
