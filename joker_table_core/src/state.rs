use crate::card::Card;
use crate::catalog::{CardCatalog, ROUND_COUNT};
use crate::paytable::Paytable;
use crate::pot::SeedPayment;
use crate::scoring::OwnedJoker;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

pub type TableId = Uuid;
pub type PlayerId = Uuid;

pub const HAND_SIZE: usize = 8;
pub const MAX_DISCARDS: u32 = 4;
pub const MAX_JOKERS: usize = 5;
pub const MAX_TAROTS: usize = 2;
pub const MAX_ROUNDS: u8 = ROUND_COUNT as u8;
pub const MIN_PLAYERS: usize = 2;
pub const MAX_NICKNAME_LEN: usize = 16;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TablePhase {
    /// 等待玩家准备
    Waiting,
    /// 出牌阶段
    Playing,
    /// 回合之间的商店阶段
    Shop,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SeatStatus {
    /// 观望或已弃权，等待下一局
    Waiting,
    /// 参与本局游戏
    Playing,
}

/// 桌子押注使用哪一种货币
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChipKind {
    #[default]
    Primary,
    Secondary,
}

/// 外部存储中的玩家余额
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wallet {
    pub primary: i64,
    pub secondary: i64,
}

impl Wallet {
    pub fn get(&self, kind: ChipKind) -> i64 {
        match kind {
            ChipKind::Primary => self.primary,
            ChipKind::Secondary => self.secondary,
        }
    }

    pub fn set(&mut self, kind: ChipKind, amount: i64) {
        match kind {
            ChipKind::Primary => self.primary = amount,
            ChipKind::Secondary => self.secondary = amount,
        }
    }
}

/// 桌子设置，多局游戏之间保持不变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TableSettings {
    pub chip_kind: ChipKind,
    /// 第 1 回合每人缴纳的种子金
    pub seed_amount: i64,
    /// 每次下注使下回合的追加金额增加多少
    pub betting_amount: i64,
    /// 第 2 回合起每人从资金中缴纳的底注
    pub funds_ante: i64,
    /// 每回合奖金上限
    pub round_max_prizes: [i64; ROUND_COUNT],
    pub reroll_cost: i64,
    /// 商店格子的固定卡牌，测试用
    pub shop_overrides: Vec<Option<String>>,
    pub max_players: usize,
}

impl TableSettings {
    /// 五个回合奖金上限之和，应当等于种子金
    pub fn prize_total(&self) -> i64 {
        self.round_max_prizes.iter().sum()
    }
}

impl Default for TableSettings {
    fn default() -> Self {
        TableSettings {
            chip_kind: ChipKind::Primary,
            seed_amount: 315,
            betting_amount: 10,
            funds_ante: 0,
            round_max_prizes: [15, 30, 60, 90, 120],
            reroll_cost: 5,
            shop_overrides: vec![],
            max_players: 4,
        }
    }
}

/// 回合奖励设置：剩余弃牌奖励与名次奖励
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoundRewards {
    pub discard_bonus: i64,
    /// placement[回合-1][名次-1]
    pub placement: Vec<Vec<i64>>,
}

impl Default for RoundRewards {
    fn default() -> Self {
        RoundRewards {
            discard_bonus: 50,
            placement: vec![
                vec![100, 50, 25, 10],
                vec![150, 75, 40, 15],
                vec![200, 100, 50, 20],
                vec![250, 125, 60, 25],
                vec![300, 150, 75, 30],
            ],
        }
    }
}

impl RoundRewards {
    pub fn placement_bonus(&self, round: u8, rank: usize) -> i64 {
        if round == 0 || rank == 0 {
            return 0;
        }
        self.placement
            .get(round as usize - 1)
            .and_then(|row| row.get(rank - 1))
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSeat {
    pub id: PlayerId,
    pub nickname: String,
    pub status: SeatStatus,
    /// 加入时从外部存储读取的余额，结算时写回
    pub wallet: Wallet,
    /// 押注货币的桌上余额
    pub chips: i64,
    /// 商店资金，只在一局游戏内有效
    pub funds: i64,
    pub payment: SeedPayment,
    pub deck: Vec<Card>,
    pub hand: Vec<Card>,
    /// 本回合开始时牌组的总张数
    pub deck_total: usize,
    pub discards_used: u32,
    pub submitted_play: Option<Vec<Card>>,
    pub jokers: Vec<OwnedJoker>,
    pub tarots: Vec<String>,
    /// 塔罗牌修改过的牌组，下回合开始时使用一次
    pub modified_deck: Option<Vec<Card>>,
    pub ready: bool,
    pub next_round_ready: bool,
}

impl PlayerSeat {
    pub fn new(id: PlayerId, nickname: String, wallet: Wallet, chip_kind: ChipKind) -> Self {
        PlayerSeat {
            id,
            nickname,
            status: SeatStatus::Waiting,
            wallet,
            chips: wallet.get(chip_kind),
            funds: 0,
            payment: SeedPayment::default(),
            deck: vec![],
            hand: vec![],
            deck_total: 0,
            discards_used: 0,
            submitted_play: None,
            jokers: vec![],
            tarots: vec![],
            modified_deck: None,
            ready: false,
            next_round_ready: false,
        }
    }

    pub fn remaining_discards(&self) -> u32 {
        MAX_DISCARDS.saturating_sub(self.discards_used)
    }

    pub fn is_playing(&self) -> bool {
        self.status == SeatStatus::Playing
    }

    /// 清空一局游戏内的所有数据
    pub fn reset_for_new_game(&mut self) {
        self.status = SeatStatus::Waiting;
        self.funds = 0;
        self.payment = SeedPayment::default();
        self.deck.clear();
        self.hand.clear();
        self.deck_total = 0;
        self.discards_used = 0;
        self.submitted_play = None;
        self.jokers.clear();
        self.tarots.clear();
        self.modified_deck = None;
        self.ready = false;
        self.next_round_ready = false;
    }
}

/// 一张牌桌的全部状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableState {
    pub table_id: TableId,
    pub settings: TableSettings,
    pub seats: HashMap<PlayerId, PlayerSeat>,
    // 座位顺序，决定结算时的先后
    pub seat_order: Vec<PlayerId>,
    pub phase: TablePhase,
    pub round: u8,
    pub shop_offer: Vec<String>,
    pub consumable_offer: Vec<String>,
    pub reroll_offers: HashMap<PlayerId, Vec<String>>,
    // 本局已经出现过的小丑牌
    pub seen_jokers: HashSet<String>,
    pub betting_players: HashSet<PlayerId>,
    // 下回合开始时每人追加的金额
    pub current_betting_amount: i64,
    // 本回合追加金额形成的奖池，计入奖金上限
    pub betting_pot: i64,
    pub paytable: Paytable,
    #[serde(skip)]
    pub catalog: Arc<CardCatalog>,
}

impl TableState {
    pub fn new(table_id: TableId, settings: TableSettings, catalog: Arc<CardCatalog>) -> Self {
        TableState {
            table_id,
            settings,
            seats: HashMap::new(),
            seat_order: vec![],
            phase: TablePhase::Waiting,
            round: 1,
            shop_offer: vec![],
            consumable_offer: vec![],
            reroll_offers: HashMap::new(),
            seen_jokers: HashSet::new(),
            betting_players: HashSet::new(),
            current_betting_amount: 0,
            betting_pot: 0,
            paytable: Paytable::default(),
            catalog,
        }
    }

    /// 按座位顺序返回参与本局的玩家
    pub fn playing_players(&self) -> Vec<PlayerId> {
        self.seat_order
            .iter()
            .filter(|id| self.seats.get(id).is_some_and(|s| s.is_playing()))
            .copied()
            .collect()
    }

    pub fn round_max_prize(&self) -> i64 {
        let idx = (self.round.clamp(1, MAX_ROUNDS) - 1) as usize;
        self.settings.round_max_prizes[idx] + self.betting_pot
    }

    pub fn set_catalog(&mut self, catalog: Arc<CardCatalog>) {
        self.catalog = catalog;
    }

    /// 为某个玩家生成净化后的状态
    ///
    /// 其他玩家的手牌、牌组、修改后的牌组以及未公开的出牌都会被隐藏。
    /// 自己的牌组按 id 排序，不暴露发牌顺序。
    pub fn for_client(&self, viewer: &PlayerId) -> Self {
        let mut client_state = self.clone();
        for (id, seat) in client_state.seats.iter_mut() {
            if id == viewer {
                seat.deck.sort_by_key(|c| c.id);
            } else {
                seat.deck.clear();
                seat.hand.clear();
                seat.modified_deck = None;
                seat.submitted_play = None;
            }
        }
        client_state.reroll_offers.retain(|id, _| id == viewer);
        client_state
    }
}
