use crate::error::ServiceError;
use crate::service::TableService;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{stream::StreamExt, SinkExt};
use joker_table_core::{ClientMessage, ErrorKind, PlayerId, ServerMessage, TableId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub type SharedState = Arc<TableService>;

/// 处理 WebSocket 连接请求
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// 处理单个 WebSocket 连接的生命周期
async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();

    // 创建一个 MPSC 通道，用于从其他任务接收要发送的消息
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(64);

    // 启动一个新任务，专门负责将 MPSC 通道中的消息发送到 WebSocket
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let payload = match serde_json::to_string(&msg) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("序列化消息失败: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                // 发送失败，说明客户端已断开，退出任务
                break;
            }
        }
    });

    // 当前连接所在的桌子，入座成功后填充
    let mut player_context: Option<(TableId, PlayerId)> = None;

    // 主循环，处理从客户端接收到的消息
    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Text(text) = msg {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(client_msg, &state, &tx, &mut player_context).await;
                }
                Err(e) => {
                    warn!("解析消息失败: {}", e);
                }
            }
        }
    }

    // 客户端断开连接，执行清理工作
    if let Some((table_id, player_id)) = player_context {
        state.disconnect(table_id, player_id).await;
    }
    info!("客户端连接关闭");
}

/// 核心消息处理逻辑
async fn handle_client_message(
    msg: ClientMessage,
    state: &SharedState,
    tx: &mpsc::Sender<ServerMessage>,
    context: &mut Option<(TableId, PlayerId)>,
) {
    let action = msg.action_name();
    let result = match msg {
        ClientMessage::JoinTable { table_id, player_id, nickname } => {
            if context.is_some() {
                Err(ServiceError::AlreadyInTable)
            } else {
                let player_id = player_id.unwrap_or_else(Uuid::new_v4);
                let joined = state.join(table_id, player_id, &nickname, tx.clone()).await;
                if joined.is_ok() {
                    *context = Some((table_id, player_id));
                }
                joined
            }
        }
        msg => match *context {
            Some((table_id, player_id)) => {
                let leaving = matches!(msg, ClientMessage::LeaveTable);
                let result = state.perform(table_id, player_id, msg).await;
                // 余额写回失败时玩家也已经离开了桌子
                if leaving && !matches!(result, Err(ServiceError::Table(_)) | Err(ServiceError::TableNotFound)) {
                    *context = None;
                }
                result
            }
            None => Err(ServiceError::NotInTable),
        },
    };

    if let Err(e) = result {
        reject(tx, action, e).await;
    }
}

/// 错误消息只发给当前玩家
async fn reject(tx: &mpsc::Sender<ServerMessage>, action: &str, e: ServiceError) {
    let kind = e.kind();
    match kind {
        ErrorKind::Upstream => error!("操作 {} 失败: {}", action, e),
        _ => warn!("操作 {} 被拒绝: {}", action, e),
    }
    let _ = tx
        .send(ServerMessage::ActionRejected { action: action.to_string(), kind, reason: e.to_string() })
        .await;
}
