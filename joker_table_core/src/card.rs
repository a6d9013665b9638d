use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;

// --- 核心数据结构定义 ---

/// 花色 (Suit)
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Suit {
    Clubs,    // 梅花 ♣️
    Diamonds, // 方块 ♦️
    Hearts,   // 红心 ♥️
    Spades,   // 黑桃 ♠️
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades];

    /// 解析规则文本中的花色关键字
    pub fn parse(token: &str) -> Option<Suit> {
        match token {
            "club" | "clubs" => Some(Suit::Clubs),
            "diamond" | "diamonds" => Some(Suit::Diamonds),
            "heart" | "hearts" => Some(Suit::Hearts),
            "spade" | "spades" => Some(Suit::Spades),
            _ => None,
        }
    }
}

pub const MIN_RANK: u8 = 1;
pub const MAX_RANK: u8 = 13;
pub const DECK_SIZE: usize = 52;

/// 单张扑克牌 (Card)
///
/// `id` 在一副牌内唯一，塔罗牌改变点数或花色时 `id` 保持不变。
/// 点数范围 1..=13，其中 1 为 A，11/12/13 为 J/Q/K。
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct Card {
    pub id: u32,
    pub suit: Suit,
    pub rank: u8,
}

impl Card {
    pub fn new(id: u32, suit: Suit, rank: u8) -> Card {
        Card { id, suit, rank }
    }

    /// 物理牌面标识 `花色_点数`，牌面强化按这个键记录
    pub fn identity_key(&self) -> String {
        format!("{:?}_{}", self.suit, self.rank)
    }

    /// 计分时这张牌本身提供的筹码：2-10 为牌面值，A 为 11，J/Q/K 为 10
    pub fn chip_value(&self) -> u32 {
        match self.rank {
            1 => 11,
            11..=13 => 10,
            r => r as u32,
        }
    }

    /// 比较大小时 A 视为最大
    pub fn high_rank(&self) -> u8 {
        if self.rank == 1 { 14 } else { self.rank }
    }
}

// --- 实现辅助功能 ---

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Suit::Spades => "♠️",
            Suit::Hearts => "♥️",
            Suit::Clubs => "♣️",
            Suit::Diamonds => "♦️",
        })
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rank = match self.rank {
            1 => "A".to_string(),
            10 => "T".to_string(),
            11 => "J".to_string(),
            12 => "Q".to_string(),
            13 => "K".to_string(),
            r => r.to_string(),
        };
        write!(f, "{}{}", self.suit, rank)
    }
}

// --- 牌组工具 ---

/// 创建一副完整的 52 张扑克牌，id 按 梅花/方块/红心/黑桃、点数从小到大依次为 0..52
pub fn create_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(DECK_SIZE);
    for suit in Suit::ALL {
        for rank in MIN_RANK..=MAX_RANK {
            deck.push(Card::new(deck.len() as u32, suit, rank));
        }
    }
    deck
}

/// 洗牌
pub fn shuffle_deck<R: Rng + ?Sized>(deck: &mut [Card], rng: &mut R) {
    deck.shuffle(rng);
}

/// 创建并洗好一副新牌
pub fn shuffled_deck<R: Rng + ?Sized>(rng: &mut R) -> Vec<Card> {
    let mut deck = create_deck();
    shuffle_deck(&mut deck, rng);
    deck
}

/// 从牌堆顶（末尾）发 `count` 张牌，牌堆不足时发完为止
pub fn deal(deck: &mut Vec<Card>, count: usize) -> Vec<Card> {
    let take = count.min(deck.len());
    let mut cards = deck.split_off(deck.len() - take);
    cards.reverse();
    cards
}

// --- 单元测试 ---
