use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::{Session, SessionError};

/// 生存中のセッションを ID で引く表
///
/// 読み取り（`get`）は全段から頻繁に呼ばれるため RwLock で保護する。
/// ロック中に await やセッション側のロック取得は行わない。
#[derive(Debug)]
pub struct SessionRegistry {
    max_sessions: usize,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            max_sessions,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// `build` は ID が未使用で上限内のときだけ呼ばれる
    pub fn create<F>(&self, session_id: &str, build: F) -> Result<Arc<Session>, SessionError>
    where
        F: FnOnce(&str) -> Session,
    {
        let mut guard = self.sessions.write();
        if guard.contains_key(session_id) {
            return Err(SessionError::already_exists(session_id));
        }
        if guard.len() >= self.max_sessions {
            return Err(SessionError::CapacityExceeded {
                max_sessions: self.max_sessions,
            });
        }
        let session = Arc::new(build(session_id));
        guard.insert(session_id.to_string(), session.clone());
        info!(session_id, live = guard.len(), "session created");
        Ok(session)
    }

    pub fn get(&self, session_id: &str) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::not_found(session_id))
    }

    /// 登録を外してから閉じる。処理中の結果は配信されなくなる
    pub fn destroy(&self, session_id: &str) -> Result<(), SessionError> {
        let removed = self.sessions.write().remove(session_id);
        let session = removed.ok_or_else(|| SessionError::not_found(session_id))?;
        session.close();
        info!(session_id, "session destroyed");
        Ok(())
    }

    /// `session` がまだ登録中の同一インスタンスか
    pub fn is_current(&self, session: &Arc<Session>) -> bool {
        match self.sessions.read().get(session.id()) {
            Some(live) => Arc::ptr_eq(live, session) && live.is_alive(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// すべてのセッションを破棄（シャットダウン用）
    pub fn destroy_all(&self) -> usize {
        let drained: Vec<Arc<Session>> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.close();
        }
        debug!(count = drained.len(), "all sessions destroyed");
        drained.len()
    }
}
