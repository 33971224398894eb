//! 一度だけ書き込める結果セルと、それを使った締め切り監視
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// 最初の書き込みだけを受け付けるセル
#[derive(Debug)]
pub struct ResultCell<T> {
    slot: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> ResultCell<T> {
    pub fn channel() -> (Arc<Self>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let cell = Arc::new(Self {
            slot: Mutex::new(Some(tx)),
        });
        (cell, rx)
    }

    /// 書き込みに成功した（最初の書き込みだった）場合に `true`
    pub fn resolve(&self, value: T) -> bool {
        let sender = self.slot.lock().take();
        match sender {
            Some(tx) => {
                // 受信側が既に居なくても「最初の書き込み」であることに変わりはない
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// 以後の書き込みをすべて拒否する
    pub fn close(&self) {
        self.slot.lock().take();
    }
}

/// drop 時にタスクを中断するハンドル
#[derive(Debug)]
pub(crate) struct AbortOnDrop(pub(crate) AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// `worker` を別タスクで走らせ、`backup` 経過までに結果が無ければ `fallback` で確定する
///
/// 結果は `ResultCell` 経由で必ず1回だけ確定し、確定後は残った側のタスクを中断する。
pub async fn supervise<F, T>(worker: F, backup: Duration, fallback: T) -> T
where
    F: Future<Output = T> + Send + 'static,
    T: Clone + Send + 'static,
{
    let (cell, rx) = ResultCell::channel();

    let worker_cell = cell.clone();
    let worker_task = tokio::spawn(async move {
        let value = worker.await;
        if !worker_cell.resolve(value) {
            debug!("worker finished after the result was settled; discarded");
        }
    });
    let _worker_guard = AbortOnDrop(worker_task.abort_handle());

    let watchdog_cell = cell.clone();
    let watchdog_value = fallback.clone();
    let watchdog = tokio::spawn(async move {
        tokio::time::sleep(backup).await;
        if watchdog_cell.resolve(watchdog_value) {
            warn!(?backup, "backup deadline fired before the worker resolved");
        }
    });
    let _watchdog_guard = AbortOnDrop(watchdog.abort_handle());

    // 両タスクとも確定せずに消えた場合（panic 等）もフォールバックで確定する
    let value = rx.await.unwrap_or(fallback);
    cell.close();
    value
}
