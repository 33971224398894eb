//! WebSocket フロントエンド
//!
//! `/ws?session_id=<id>` で接続を受け付け、1接続を1セッションとして
//! `RelayService` へ結線します。ID が無い場合は UUID v4 を採番します。
mod connection;
pub mod protocol;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_tungstenite::{accept_hdr_async, tungstenite::handshake::server::Request};
use tracing::{info, warn};
use uuid::Uuid;

use crate::relay::RelayService;
use crate::service::TranslationService;

pub use protocol::{ClientMessage, MediaChunk, ServerMessage};

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("bind error: {0}")]
    Bind(std::io::Error),
    #[error("accept error: {0}")]
    Accept(std::io::Error),
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),
}

/// 指定アドレスにバインドしてWSサーバを起動
pub async fn bind_and_run<T>(bind_addr: &str, relay: RelayService<T>) -> Result<(), ServerError>
where
    T: TranslationService + 'static,
{
    let listener = TcpListener::bind(bind_addr).await.map_err(ServerError::Bind)?;
    run_with_listener(listener, relay).await
}

/// 既存の`TcpListener`でWSサーバを起動（テストでも使用）
pub async fn run_with_listener<T>(listener: TcpListener, relay: RelayService<T>) -> Result<(), ServerError>
where
    T: TranslationService + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, delivery = ?relay.delivery_mode(), "translation relay listening");
    }

    loop {
        let (stream, peer_addr) = listener.accept().await.map_err(ServerError::Accept)?;
        let relay = relay.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_ws_connection(stream, relay, peer_addr).await {
                warn!(%peer_addr, error = %e, "connection handling failed");
            }
        });
    }
}

async fn handle_ws_connection<S, T>(
    stream: S,
    relay: RelayService<T>,
    peer: SocketAddr,
) -> Result<(), ServerError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    T: TranslationService + 'static,
{
    // 接続時のHTTPリクエストから session_id を取得
    let mut extracted_session_id: Option<String> = None;
    let ws = accept_hdr_async(stream, |req: &Request, resp| {
        let path = req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        extracted_session_id = extract_session_id(path);
        Ok(resp)
    })
    .await?;

    let session_id = extracted_session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    info!(%peer, %session_id, "accepted websocket connection");
    connection::serve_session(relay, ws, session_id).await;
    Ok(())
}

fn extract_session_id(path_and_query: &str) -> Option<String> {
    // 例: "/ws?session_id=abc-123"
    let (_, query) = path_and_query.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == "session_id" && !v.is_empty()).then(|| v.to_string())
    })
}
