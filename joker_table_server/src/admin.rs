//! 管理接口：离线余额调整与卡牌目录刷新

use crate::error::ServiceError;
use crate::ws::SharedState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use joker_table_core::{ChipKind, ErrorKind, PlayerId, Wallet};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct AdjustBalanceRequest {
    #[serde(default)]
    pub kind: ChipKind,
    pub delta: i64,
}

#[derive(Debug, Serialize)]
struct AdminResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    wallet: Option<Wallet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    card_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl AdminResponse {
    fn failure(e: &ServiceError) -> (StatusCode, Json<AdminResponse>) {
        let status = match e.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::BusinessRule => StatusCode::CONFLICT,
            ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        };
        (status, Json(AdminResponse { success: false, wallet: None, card_count: None, reason: Some(e.to_string()) }))
    }
}

/// 调整离线玩家的余额
pub async fn adjust_balance(
    State(state): State<SharedState>,
    Path(player_id): Path<PlayerId>,
    Json(request): Json<AdjustBalanceRequest>,
) -> impl IntoResponse {
    match state.adjust_balance(player_id, request.kind, request.delta).await {
        Ok(wallet) => (
            StatusCode::OK,
            Json(AdminResponse { success: true, wallet: Some(wallet), card_count: None, reason: None }),
        ),
        Err(e) => {
            warn!("调整玩家 {} 余额失败: {}", player_id, e);
            AdminResponse::failure(&e)
        }
    }
}

/// 重新载入卡牌目录
pub async fn refresh_catalog(State(state): State<SharedState>) -> impl IntoResponse {
    match state.refresh_catalog().await {
        Ok(count) => (
            StatusCode::OK,
            Json(AdminResponse { success: true, wallet: None, card_count: Some(count), reason: None }),
        ),
        Err(e) => {
            warn!("刷新卡牌目录失败: {}", e);
            AdminResponse::failure(&e)
        }
    }
}
