use crate::card::Card;
use crate::error::ErrorKind;
use crate::hand::HandCategory;
use crate::pot::SeedPayment;
use crate::scoring::TriggeredEffect;
use crate::state::{PlayerId, TableId, TableState, Wallet};
use serde::{Deserialize, Serialize};

// --- 客户端 -> 服务器 的消息 ---
// 牌用 id 表示，服务器在玩家自己的手牌/牌组中查找。

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ClientMessage {
    /// 加入桌子，桌子不存在时创建。不带 player_id 时分配新的玩家 id
    JoinTable { table_id: TableId, player_id: Option<PlayerId>, nickname: String },
    LeaveTable,
    /// 准备开始新的一局
    MarkReady,
    SubmitDiscard { cards: Vec<u32> },
    SubmitPlay { cards: Vec<u32> },
    /// 商店阶段结束，准备下一回合
    MarkNextRoundReady,
    BuyCard { card_id: String },
    SellCard { card_id: String },
    ReorderJokers { order: Vec<String> },
    UseTarot { card_id: String, selected: Vec<u32> },
    PlaceBet,
    Fold,
    RerollShop,
}

impl ClientMessage {
    /// 动作名，用于日志和拒绝消息
    pub fn action_name(&self) -> &'static str {
        match self {
            ClientMessage::JoinTable { .. } => "join_table",
            ClientMessage::LeaveTable => "leave_table",
            ClientMessage::MarkReady => "mark_ready",
            ClientMessage::SubmitDiscard { .. } => "submit_discard",
            ClientMessage::SubmitPlay { .. } => "submit_play",
            ClientMessage::MarkNextRoundReady => "mark_next_round_ready",
            ClientMessage::BuyCard { .. } => "buy_card",
            ClientMessage::SellCard { .. } => "sell_card",
            ClientMessage::ReorderJokers { .. } => "reorder_jokers",
            ClientMessage::UseTarot { .. } => "use_tarot",
            ClientMessage::PlaceBet => "place_bet",
            ClientMessage::Fold => "fold",
            ClientMessage::RerollShop => "reroll_shop",
        }
    }
}

// --- 服务器 -> 客户端 的消息 ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ServerMessage {
    /// 成功加入桌子后私密发给该玩家
    TableJoined { your_id: PlayerId, table: TableState },
    /// 完整状态快照，发送前调用 for_client 净化
    TableSnapshot(TableState),

    PlayerJoined { player_id: PlayerId, nickname: String },
    PlayerLeft { player_id: PlayerId },
    PlayerReady { player_id: PlayerId },
    GameStarted { seat_order: Vec<PlayerId> },
    RoundStarted { round: u8, participants: Vec<PlayerId>, round_max_prize: i64 },
    /// 种子金缴纳情况
    SeedCollected { player_id: PlayerId, paid: SeedPayment, payment: SeedPayment, chips: i64 },

    /// 私密：发到手上的牌
    HandDealt { player_id: PlayerId, hand: Vec<Card>, deck_remaining: usize },
    PlayerDiscarded { player_id: PlayerId, count: usize, remaining_discards: u32 },
    /// 私密：弃牌换牌后的手牌
    HandUpdated { player_id: PlayerId, hand: Vec<Card>, remaining_discards: u32 },
    PlaySubmitted { player_id: PlayerId },
    RoundResolved {
        round: u8,
        results: Vec<RoundResult>,
        winners: Vec<PlayerId>,
        shop_offer: Vec<String>,
        consumable_offer: Vec<String>,
    },

    NextRoundReady { player_id: PlayerId },
    CardPurchased { player_id: PlayerId, card_id: String, funds: i64 },
    CardSold { player_id: PlayerId, card_id: String, funds: i64 },
    JokersReordered { player_id: PlayerId, order: Vec<String> },
    TarotUsed { player_id: PlayerId, card_id: String },
    /// 私密：塔罗牌修改后的牌组
    DeckUpdated { player_id: PlayerId, deck: Vec<Card> },
    /// 私密：刷新后的商店
    ShopRerolled { player_id: PlayerId, offer: Vec<String>, funds: i64 },
    BetPlaced { player_id: PlayerId, current_betting_amount: i64 },
    PlayerFolded { player_id: PlayerId },
    LastPlayerWon { player_id: PlayerId, chips_reward: i64, chips: i64 },
    GameEnded { final_chips: Vec<(PlayerId, i64)> },
    /// 需要写回外部存储的余额
    BalancesSettled { balances: Vec<(PlayerId, Wallet)> },

    /// 操作被拒绝，只发给发起者
    ActionRejected { action: String, kind: ErrorKind, reason: String },
    Info { message: String },
}

impl ServerMessage {
    /// 只应发给某一名玩家的消息
    pub fn private_to(&self) -> Option<PlayerId> {
        match self {
            ServerMessage::HandDealt { player_id, .. }
            | ServerMessage::HandUpdated { player_id, .. }
            | ServerMessage::DeckUpdated { player_id, .. }
            | ServerMessage::ShopRerolled { player_id, .. } => Some(*player_id),
            _ => None,
        }
    }
}

/// 回合结算中单个玩家的结果
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RoundResult {
    pub player_id: PlayerId,
    pub played: Vec<Card>,
    pub category: Option<HandCategory>,
    pub chips: f64,
    pub multiplier: f64,
    pub score: i64,
    pub triggered: Vec<TriggeredEffect>,
    /// 种子金结算返还的金额
    pub pot_gain: SeedPayment,
    pub discard_bonus: i64,
    /// 名次（并列同名次）
    pub placement: usize,
    pub placement_bonus: i64,
    pub chips_after: i64,
    pub funds_after: i64,
}
