//! 1接続分の処理
//!
//! 送信タスク（サーバ→クライアント）、イベント転送、フレーム転送、受信ループで構成し、
//! 受信ループの終了（切断・close）でセッションを破棄します。
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::config::DeliveryMode;
use crate::relay::{RelayError, RelayService};
use crate::service::TranslationService;

use super::protocol::{ClientMessage, MediaChunk, ServerMessage};

/// 送信待ちメッセージの上限
const OUTBOUND_CAPACITY: usize = 64;
/// フレームクロックと転送タスクの間のバッファ
const FRAME_BUFFER: usize = 8;

pub(crate) async fn serve_session<S, T>(
    relay: RelayService<T>,
    ws_stream: WebSocketStream<S>,
    session_id: String,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    T: TranslationService + 'static,
{
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let mut events = match relay.open_session(&session_id) {
        Ok(events) => events,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "session rejected");
            let _ = ws_sender
                .send(Message::Text(ServerMessage::error(e.to_string()).to_json()))
                .await;
            let _ = ws_sender.close().await;
            return;
        }
    };

    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_CAPACITY);

    // 送信タスク
    let session_for_send = session_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if ws_sender.send(Message::Text(message.to_json())).await.is_err() {
                warn!(session_id = %session_for_send, "websocket send failed");
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let _ = out_tx
        .send(ServerMessage::SessionOpened {
            session_id: session_id.clone(),
        })
        .await;

    // 翻訳結果の転送。結果1件ごとに turn_complete を続ける
    let events_out = out_tx.clone();
    let session_for_events = session_id.clone();
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if events_out.send(ServerMessage::from(event)).await.is_err() {
                break;
            }
            let turn_complete = ServerMessage::TurnComplete {
                session_id: session_for_events.clone(),
            };
            if events_out.send(turn_complete).await.is_err() {
                break;
            }
        }
    });

    // 送出フレームの転送（frame_scheduler 配信時のみ）
    let frame_task = match relay.delivery_mode() {
        DeliveryMode::SideChannel => None,
        DeliveryMode::FrameScheduler => {
            let (frame_tx, mut frame_rx) = mpsc::channel(FRAME_BUFFER);
            match relay.spawn_frame_clock(&session_id, frame_tx) {
                Ok(clock) => {
                    let frames_out = out_tx.clone();
                    let session_for_frames = session_id.clone();
                    Some(tokio::spawn(async move {
                        let _clock = clock;
                        while let Some(frame) = frame_rx.recv().await {
                            let message = ServerMessage::audio_frame(&session_for_frames, &frame);
                            // 送信が詰まっている間のフレームは捨てる
                            if let Err(mpsc::error::TrySendError::Closed(_)) = frames_out.try_send(message) {
                                break;
                            }
                        }
                    }))
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "frame clock not started");
                    None
                }
            }
        }
    };

    // 受信ループ
    while let Some(msg) = ws_receiver.next().await {
        let reply = match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Close) => {
                    info!(session_id = %session_id, "client requested close");
                    break;
                }
                Ok(message) => handle_message(&relay, &session_id, message),
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "invalid client message");
                    Some(ServerMessage::error(format!("invalid message: {e}")))
                }
            },
            Ok(Message::Binary(payload)) => audio_reply(&session_id, relay.audio_in(&session_id, &payload)),
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "websocket closed by peer");
                break;
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "websocket error");
                break;
            }
            _ => None,
        };
        if let Some(reply) = reply {
            if out_tx.send(reply).await.is_err() {
                break;
            }
        }
    }

    if let Err(e) = relay.close_session(&session_id) {
        debug!(session_id = %session_id, error = %e, "session already gone");
    }
    if let Some(task) = frame_task {
        task.abort();
    }
    event_task.abort();
    drop(out_tx);
    let _ = send_task.await;
    info!(session_id = %session_id, "connection finished");
}

fn handle_message<T>(
    relay: &RelayService<T>,
    session_id: &str,
    message: ClientMessage,
) -> Option<ServerMessage>
where
    T: TranslationService + 'static,
{
    match message {
        ClientMessage::Setup(update) => match relay.set_profile(session_id, &update) {
            Ok(_) => None,
            Err(e) => Some(ServerMessage::error(e.to_string())),
        },
        ClientMessage::RealtimeInput { media_chunks } => {
            ingest_chunks(&media_chunks, |payload| relay.audio_in(session_id, payload))
                .into_iter()
                .filter_map(|outcome| audio_reply(session_id, outcome))
                .next()
        }
        ClientMessage::Close => None,
    }
}

/// PCM チャンクをすべて取り込み、チャンクごとの結果を返す。失敗したチャンクがあっても続ける
fn ingest_chunks<F>(chunks: &[MediaChunk], mut audio_in: F) -> Vec<Result<usize, RelayError>>
where
    F: FnMut(&[u8]) -> Result<usize, RelayError>,
{
    chunks
        .iter()
        .filter(|c| c.is_pcm())
        .map(|chunk| {
            chunk
                .decode()
                .map_err(RelayError::from)
                .and_then(|payload| audio_in(&payload))
        })
        .collect()
}

/// 音声取り込みの失敗を応答へ変換。セッション無しは黙って捨てる
fn audio_reply(session_id: &str, outcome: Result<usize, RelayError>) -> Option<ServerMessage> {
    match outcome {
        Ok(_) => None,
        Err(e) if e.is_not_found() => {
            debug!(session_id, "audio for unknown session dropped");
            None
        }
        Err(e) => {
            warn!(session_id, error = %e, "audio chunk rejected");
            Some(ServerMessage::error(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(mime_type: &str, data: &str) -> MediaChunk {
        MediaChunk {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    #[test]
    fn every_chunk_is_ingested_after_a_bad_one() {
        let chunks = [
            chunk("audio/pcm", "AQA="),
            chunk("audio/pcm", "!!not base64!!"),
            chunk("image/png", "AQA="),
            chunk("audio/pcm;rate=16000", "AQACAA=="),
        ];
        let mut seen = Vec::new();
        let outcomes = ingest_chunks(&chunks, |payload| {
            seen.push(payload.len());
            Ok(0)
        });

        assert_eq!(seen, [2, 4]);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_ok());
        assert!(matches!(outcomes[1], Err(RelayError::Decode(_))));
        assert!(outcomes[2].is_ok());

        let first_error = outcomes
            .into_iter()
            .filter_map(|outcome| audio_reply("s-1", outcome))
            .next();
        assert!(matches!(first_error, Some(ServerMessage::Error { .. })));
    }
}
