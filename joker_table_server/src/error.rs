use joker_table_core::{ErrorKind, TableError};
use thiserror::Error;

/// 服务层错误：牌桌状态机的错误加上找不到桌子和外部依赖失败
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("桌子不存在")]
    TableNotFound,
    #[error("请先加入桌子")]
    NotInTable,
    #[error("你已经在一张桌子上了")]
    AlreadyInTable,
    #[error("玩家在线时不能调整余额")]
    PlayerOnline,
    #[error("外部服务不可用: {0}")]
    Upstream(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Table(e) => e.kind(),
            ServiceError::TableNotFound => ErrorKind::NotFound,
            ServiceError::NotInTable | ServiceError::AlreadyInTable | ServiceError::PlayerOnline => {
                ErrorKind::BusinessRule
            }
            ServiceError::Upstream(_) => ErrorKind::Upstream,
        }
    }
}
