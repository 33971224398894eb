//! セッション（接続ごとの状態）とレジストリ
//!
//! `Session` は受信側の前処理と発話検出、送出キュー、言語プロファイル、
//! 発話キューの送信口を持ちます。破棄は `alive` フラグと発話キューの
//! クローズで表し、処理中の結果は配信前の生存確認で捨てられます。
mod error;
mod registry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::AbortHandle;
use tracing::debug;

use crate::audio_pipeline::AudioPipeline;
use crate::config::{AudioProcessingConfig, LanguageProfile};
use crate::scheduler::OutboundScheduler;
use crate::vad::{Segmenter, Utterance, VoiceClassifier};

pub use error::SessionError;
pub use registry::SessionRegistry;

/// 発話キューへの投入結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Queued,
    /// 処理待ちが上限に達していたため溢れ先へ渡した
    Overflowed,
    /// 処理待ちが上限に達しており、溢れ先も無かったため捨てた
    Dropped,
    /// セッションが閉じられていた
    Closed,
}

/// 処理待ちキューから溢れた発話の受け取り先
pub type OverflowHandler = Box<dyn Fn(Utterance) + Send + Sync>;

struct Inbound {
    pipeline: AudioPipeline,
    segmenter: Segmenter<Box<dyn VoiceClassifier>>,
}

pub struct Session {
    id: String,
    created_at: Instant,
    alive: AtomicBool,
    inbound: Mutex<Inbound>,
    scheduler: Arc<OutboundScheduler>,
    profile: RwLock<Arc<LanguageProfile>>,
    utterances: Mutex<Option<mpsc::Sender<Utterance>>>,
    overflow: Mutex<Option<OverflowHandler>>,
    worker: Mutex<Option<AbortHandle>>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        audio: &AudioProcessingConfig,
        classifier: Box<dyn VoiceClassifier>,
        profile: Arc<LanguageProfile>,
        utterances: mpsc::Sender<Utterance>,
    ) -> Self {
        let segmenter = Segmenter::new(
            classifier,
            audio.vad_window_samples(),
            audio.vad.silence_windows,
            audio.service.input_sample_rate_hz,
        );
        Self {
            id: id.into(),
            created_at: Instant::now(),
            alive: AtomicBool::new(true),
            inbound: Mutex::new(Inbound {
                pipeline: AudioPipeline::new(audio),
                segmenter,
            }),
            scheduler: Arc::new(OutboundScheduler::new(
                audio.transport.sample_rate_hz,
                audio.transport_frame_samples(),
            )),
            profile: RwLock::new(profile),
            utterances: Mutex::new(Some(utterances)),
            overflow: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn scheduler(&self) -> &Arc<OutboundScheduler> {
        &self.scheduler
    }

    pub fn profile(&self) -> Arc<LanguageProfile> {
        self.profile.read().clone()
    }

    pub fn set_profile(&self, profile: Arc<LanguageProfile>) {
        *self.profile.write() = profile;
    }

    /// 入力レートの PCM フレームを取り込み、確定した発話を返す
    pub fn ingest(&self, samples: &[i16]) -> Vec<Utterance> {
        if !self.is_alive() {
            return Vec::new();
        }
        let mut inbound = self.inbound.lock();
        let Inbound {
            pipeline,
            segmenter,
        } = &mut *inbound;
        let windows = pipeline.process(samples);
        segmenter.push_windows(windows)
    }

    /// 発話を処理待ちキューへ入れる。ブロックしない
    ///
    /// キューが満杯なら `on_overflow` で登録した受け取り先へ発話を渡す。
    pub fn admit(&self, utterance: Utterance) -> Admission {
        let rejected = {
            let guard = self.utterances.lock();
            let Some(tx) = guard.as_ref() else {
                return Admission::Closed;
            };
            match tx.try_send(utterance) {
                Ok(()) => return Admission::Queued,
                Err(TrySendError::Closed(_)) => return Admission::Closed,
                Err(TrySendError::Full(utterance)) => utterance,
            }
        };
        match self.overflow.lock().as_ref() {
            Some(handler) => {
                handler(rejected);
                Admission::Overflowed
            }
            None => Admission::Dropped,
        }
    }

    /// 処理待ちキューから溢れた発話の受け取り先を登録する
    pub fn on_overflow(&self, handler: OverflowHandler) {
        if self.is_alive() {
            *self.overflow.lock() = Some(handler);
        }
    }

    /// 発話処理タスクを関連付ける。`close` 時に中断される
    pub fn attach_worker(&self, handle: AbortHandle) {
        if self.is_alive() {
            *self.worker.lock() = Some(handle);
        } else {
            handle.abort();
        }
    }

    /// 以後の入力と配信を止め、保持している音声を解放する
    pub(crate) fn close(&self) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        self.utterances.lock().take();
        self.overflow.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
        let dropped_outbound = self.scheduler.clear();
        let dropped_inbound = {
            let mut inbound = self.inbound.lock();
            inbound.segmenter.reset();
            inbound.pipeline.reset()
        };
        debug!(
            session_id = %self.id,
            dropped_outbound,
            dropped_inbound,
            "session closed"
        );
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .field("queued_samples", &self.scheduler.queued_samples())
            .finish()
    }
}
