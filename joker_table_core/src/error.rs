use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 错误分类，决定服务端如何记录日志以及客户端如何提示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// 输入格式或范围错误
    Validation,
    /// 找不到桌子、卡牌或玩家
    NotFound,
    /// 违反游戏规则
    BusinessRule,
    /// 外部存储或数据源不可用
    Upstream,
}

/// 牌桌状态机返回的错误
///
/// 所有操作先校验再修改，返回错误时桌子状态保持不变。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("昵称长度必须在 1 到 {max} 个字符之间")]
    InvalidNickname { max: usize },
    #[error("选择的牌数量无效: {0}")]
    InvalidCardCount(usize),
    #[error("选择的牌有重复")]
    DuplicateCards,
    #[error("需要选择 {expected} 张牌，实际选择了 {actual} 张")]
    WrongSelectionCount { expected: usize, actual: usize },
    #[error("小丑牌顺序必须是当前持有小丑牌的一个排列")]
    InvalidJokerOrder,

    #[error("玩家不在这张桌子上")]
    PlayerNotFound,
    #[error("未知的卡牌: {0}")]
    UnknownCard(String),
    #[error("没有持有卡牌: {0}")]
    CardNotOwned(String),
    #[error("卡牌 {0} 不在商店中")]
    CardNotInShop(String),
    #[error("牌 {0} 不在手牌中")]
    CardNotInHand(u32),
    #[error("牌 {0} 不在牌组中")]
    CardNotInDeck(u32),

    #[error("当前阶段不能执行该操作")]
    WrongPhase,
    #[error("玩家不在本局游戏中")]
    NotPlaying,
    #[error("资金不足：需要 {needed}，当前 {available}")]
    InsufficientFunds { needed: i64, available: i64 },
    #[error("筹码不足")]
    InsufficientChips,
    #[error("小丑牌栏位已满")]
    JokerSlotsFull,
    #[error("已经持有这张小丑牌")]
    DuplicateJoker,
    #[error("这张小丑牌已被其他玩家持有")]
    JokerOwnedElsewhere,
    #[error("塔罗牌栏位已满")]
    TarotSlotsFull,
    #[error("本回合弃牌次数已用完")]
    NoDiscardsLeft,
    #[error("本回合已经出过牌")]
    AlreadySubmitted,
    #[error("本回合已经下过注")]
    AlreadyBet,
    #[error("桌子已满")]
    TableFull,
    #[error("已经在桌子上了")]
    AlreadySeated,
}

impl TableError {
    pub fn kind(&self) -> ErrorKind {
        use TableError::*;
        match self {
            InvalidNickname { .. } | InvalidCardCount(_) | DuplicateCards | WrongSelectionCount { .. } | InvalidJokerOrder => {
                ErrorKind::Validation
            }
            PlayerNotFound | UnknownCard(_) | CardNotOwned(_) | CardNotInShop(_) | CardNotInHand(_) | CardNotInDeck(_) => {
                ErrorKind::NotFound
            }
            _ => ErrorKind::BusinessRule,
        }
    }
}
