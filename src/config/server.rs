use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// WebSocketサーバのバインドアドレス（例: 127.0.0.1:9083）
    pub ws_bind_addr: String,
    /// 同時に保持できるセッション数の上限
    pub max_sessions: usize,
}
