//! WebSocket Handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::domain::StoryId;
use crate::infrastructure::http::state::AppState;

/// 故事事件 WebSocket（生成进度、提交、回滚）
pub async fn story_websocket_handler(
    ws: WebSocketUpgrade,
    Path(story_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_story_socket(socket, StoryId::from_uuid(story_id), state))
}

async fn handle_story_socket(socket: WebSocket, story_id: StoryId, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // 验证故事存在
    match state.story_repo.find_by_id(story_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            tracing::warn!(story_id = %story_id, "WebSocket connection rejected: unknown story");
            let _ = sender.close().await;
            return;
        }
        Err(e) => {
            tracing::error!(story_id = %story_id, error = %e, "WebSocket connection rejected");
            let _ = sender.close().await;
            return;
        }
    }

    let mut event_rx = state.event_publisher.subscribe(story_id);
    tracing::info!(story_id = %story_id, "WebSocket connected");

    // 事件转发任务
    let forward_task = tokio::spawn(async move {
        loop {
            let event = match event_rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    // 慢客户端丢失部分进度，后续事件照常转发
                    tracing::debug!(story_id = %story_id, skipped = skipped, "WebSocket lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let msg = match serde_json::to_string(&event) {
                Ok(json) => Message::Text(json),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize event");
                    continue;
                }
            };

            if let Err(e) = sender.send(msg).await {
                tracing::debug!(story_id = %story_id, error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    // 接收客户端消息（心跳）
    let receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    tracing::info!(story_id = %story_id, "WebSocket closed by client");
                    break;
                }
                Err(e) => {
                    tracing::debug!(story_id = %story_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    // 等待任一任务完成，另一个随之中止
    let (mut forward_task, mut receive_task) = (forward_task, receive_task);
    tokio::select! {
        _ = &mut forward_task => receive_task.abort(),
        _ = &mut receive_task => {
            forward_task.abort();
            // 等待转发任务退出，事件接收端随之释放
            let _ = forward_task.await;
        }
    }
    state.event_publisher.remove_if_unsubscribed(story_id);

    tracing::info!(story_id = %story_id, "WebSocket disconnected");
}
