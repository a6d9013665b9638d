use crate::card::{Card, Suit};
use crate::paytable::PlayerPaytable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// 牌型 (HandCategory)
/// 变体顺序从小到大排列，可以直接利用 `Ord` 比较牌型高低。
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum HandCategory {
    HighCard,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
}

impl HandCategory {
    pub const ALL: [HandCategory; 9] = [
        HandCategory::HighCard,
        HandCategory::OnePair,
        HandCategory::TwoPair,
        HandCategory::ThreeOfAKind,
        HandCategory::Straight,
        HandCategory::Flush,
        HandCategory::FullHouse,
        HandCategory::FourOfAKind,
        HandCategory::StraightFlush,
    ];

    /// 卡牌数据与规则文本里使用的关键字
    pub fn keyword(&self) -> &'static str {
        match self {
            HandCategory::HighCard => "highcard",
            HandCategory::OnePair => "onepair",
            HandCategory::TwoPair => "twopair",
            HandCategory::ThreeOfAKind => "triple",
            HandCategory::Straight => "straight",
            HandCategory::Flush => "flush",
            HandCategory::FullHouse => "fullhouse",
            HandCategory::FourOfAKind => "fourcard",
            HandCategory::StraightFlush => "straightflush",
        }
    }

    pub fn parse(token: &str) -> Option<HandCategory> {
        HandCategory::ALL.into_iter().find(|c| c.keyword() == token)
    }

    /// "包含该牌型" 时一并算作命中的更高牌型
    /// 例如打出葫芦也算包含一对和三条
    pub fn including(&self) -> Vec<HandCategory> {
        use HandCategory::*;
        let mut list = vec![*self];
        match self {
            OnePair => list.extend([TwoPair, ThreeOfAKind, FullHouse, FourOfAKind]),
            ThreeOfAKind => list.extend([FullHouse, FourOfAKind]),
            Straight | Flush => list.push(StraightFlush),
            _ => {}
        }
        list
    }
}

impl fmt::Display for HandCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            HandCategory::HighCard => "高牌",
            HandCategory::OnePair => "一对",
            HandCategory::TwoPair => "两对",
            HandCategory::ThreeOfAKind => "三条",
            HandCategory::Straight => "顺子",
            HandCategory::Flush => "同花",
            HandCategory::FullHouse => "葫芦",
            HandCategory::FourOfAKind => "四条",
            HandCategory::StraightFlush => "同花顺",
        })
    }
}

/// 一次出牌的评估结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandEvaluation {
    pub category: HandCategory,
    pub base_chips: f64,
    pub base_multiplier: f64,
    /// 构成牌型的牌
    pub used_cards: Vec<Card>,
    /// 手牌中除 used_cards 以外的牌（按 id 求补集）
    pub unused_cards: Vec<Card>,
    /// 未使用的牌能组成的牌型，没有剩余牌时为 None
    pub unused_category: Option<HandCategory>,
}

// --- 牌型评估逻辑 ---

/// 评估一手出牌
///
/// `played` 为本次打出的 1~8 张牌，`full_hand` 为玩家的完整手牌。
/// 基础筹码和倍率从玩家的 Paytable 读取，因此牌型升级后重复调用会得到更新后的值。
pub fn evaluate_hand(played: &[Card], full_hand: &[Card], paytable: &PlayerPaytable) -> Option<HandEvaluation> {
    let (category, used_cards) = classify_with_cards(played)?;

    let used_ids: HashSet<u32> = used_cards.iter().map(|c| c.id).collect();
    let unused_cards: Vec<Card> = full_hand.iter().filter(|c| !used_ids.contains(&c.id)).copied().collect();
    // 只向下评估一层
    let unused_category = classify(&unused_cards);

    let level = paytable.hand(category);
    Some(HandEvaluation {
        category,
        base_chips: level.chips,
        base_multiplier: level.multiplier,
        used_cards,
        unused_cards,
        unused_category,
    })
}

/// 只返回牌型，空牌组返回 None
pub fn classify(cards: &[Card]) -> Option<HandCategory> {
    classify_with_cards(cards).map(|(category, _)| category)
}

/// 按优先级依次检查牌型，命中即返回，同时给出构成牌型的牌
fn classify_with_cards(cards: &[Card]) -> Option<(HandCategory, Vec<Card>)> {
    if cards.is_empty() {
        return None;
    }

    // 1. 按点数分组，(数量, 点数) 从大到小排列
    let mut by_rank: BTreeMap<u8, Vec<Card>> = BTreeMap::new();
    for card in cards {
        by_rank.entry(card.rank).or_default().push(*card);
    }
    let mut groups: Vec<(usize, u8)> = by_rank.iter().map(|(r, cs)| (cs.len(), *r)).collect();
    groups.sort_by(|a, b| b.0.cmp(&a.0).then(high(b.1).cmp(&high(a.1))));

    let count_at = |i: usize| groups.get(i).map_or(0, |g| g.0);

    // 2. 同花必须正好 5 张且花色一致
    let first_suit: Suit = cards[0].suit;
    let is_flush = cards.len() == 5 && cards.iter().all(|c| c.suit == first_suit);
    let straight = find_straight(&by_rank);

    if is_flush && straight.is_some() {
        return Some((HandCategory::StraightFlush, cards.to_vec()));
    }
    if count_at(0) >= 4 {
        return Some((HandCategory::FourOfAKind, cards_of_ranks(cards, &[groups[0].1])));
    }
    if count_at(0) >= 3 && count_at(1) >= 2 {
        return Some((HandCategory::FullHouse, cards_of_ranks(cards, &[groups[0].1, groups[1].1])));
    }
    if is_flush {
        return Some((HandCategory::Flush, cards.to_vec()));
    }
    if let Some(run) = straight {
        // 每个点数只取一张
        let used = run.iter().filter_map(|r| by_rank.get(r).and_then(|cs| cs.first().copied())).collect();
        return Some((HandCategory::Straight, used));
    }
    if count_at(0) >= 3 {
        return Some((HandCategory::ThreeOfAKind, cards_of_ranks(cards, &[groups[0].1])));
    }
    if count_at(0) >= 2 && count_at(1) >= 2 {
        return Some((HandCategory::TwoPair, cards_of_ranks(cards, &[groups[0].1, groups[1].1])));
    }
    if count_at(0) >= 2 {
        return Some((HandCategory::OnePair, cards_of_ranks(cards, &[groups[0].1])));
    }

    // 高牌只使用点数最大的一张（A 最大）
    let top = cards.iter().max_by_key(|c| c.high_rank()).copied()?;
    Some((HandCategory::HighCard, vec![top]))
}

/// 寻找 5 张连续点数，A-2-3-4-5 和 10-J-Q-K-A 都算顺子
fn find_straight(by_rank: &BTreeMap<u8, Vec<Card>>) -> Option<Vec<u8>> {
    if by_rank.len() < 5 {
        return None;
    }
    let ranks: Vec<u8> = by_rank.keys().copied().collect();
    for window in ranks.windows(5) {
        if window[4] - window[0] == 4 {
            return Some(window.to_vec());
        }
    }
    let broadway = [1, 10, 11, 12, 13];
    if broadway.iter().all(|r| by_rank.contains_key(r)) {
        return Some(broadway.to_vec());
    }
    None
}

fn cards_of_ranks(cards: &[Card], ranks: &[u8]) -> Vec<Card> {
    cards.iter().filter(|c| ranks.contains(&c.rank)).copied().collect()
}

fn high(rank: u8) -> u8 {
    if rank == 1 { 14 } else { rank }
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Suit::*;
    use proptest::prelude::*;

    // 辅助函数，用于快速创建牌，id 由花色和点数推出
    fn card(rank: u8, suit: Suit) -> Card {
        let suit_idx = Suit::ALL.iter().position(|s| *s == suit).unwrap() as u32;
        Card::new(suit_idx * 13 + rank as u32 - 1, suit, rank)
    }

    fn category(cards: &[Card]) -> HandCategory {
        classify(cards).unwrap()
    }

    #[test]
    fn test_straight_flush_beats_flush_and_straight() {
        let hand = [card(9, Hearts), card(10, Hearts), card(8, Hearts), card(11, Hearts), card(7, Hearts)];
        assert_eq!(category(&hand), HandCategory::StraightFlush);
    }

    #[test]
    fn test_wheel_and_broadway() {
        let wheel = [card(1, Spades), card(2, Hearts), card(3, Diamonds), card(4, Clubs), card(5, Spades)];
        assert_eq!(category(&wheel), HandCategory::Straight);

        let broadway = [card(10, Spades), card(11, Hearts), card(12, Diamonds), card(13, Clubs), card(1, Spades)];
        assert_eq!(category(&broadway), HandCategory::Straight);

        let royal = [card(10, Clubs), card(11, Clubs), card(12, Clubs), card(13, Clubs), card(1, Clubs)];
        assert_eq!(category(&royal), HandCategory::StraightFlush);
    }

    #[test]
    fn test_no_wraparound_straight() {
        let hand = [card(11, Spades), card(12, Hearts), card(13, Diamonds), card(1, Clubs), card(2, Spades)];
        assert_eq!(category(&hand), HandCategory::HighCard);
    }

    #[test]
    fn test_flush_needs_exactly_five_cards() {
        let four = [card(2, Diamonds), card(5, Diamonds), card(8, Diamonds), card(11, Diamonds)];
        assert_eq!(category(&four), HandCategory::HighCard);

        let five = [card(2, Diamonds), card(5, Diamonds), card(8, Diamonds), card(11, Diamonds), card(1, Diamonds)];
        assert_eq!(category(&five), HandCategory::Flush);

        let six = [card(2, Diamonds), card(5, Diamonds), card(8, Diamonds), card(11, Diamonds), card(1, Diamonds), card(3, Diamonds)];
        assert_eq!(category(&six), HandCategory::HighCard);
    }

    #[test]
    fn test_group_categories() {
        let four = [card(1, Spades), card(1, Hearts), card(1, Diamonds), card(1, Clubs), card(13, Spades)];
        assert_eq!(category(&four), HandCategory::FourOfAKind);

        let full = [card(13, Spades), card(13, Hearts), card(13, Diamonds), card(12, Clubs), card(12, Spades)];
        assert_eq!(category(&full), HandCategory::FullHouse);

        let three = [card(10, Spades), card(10, Hearts), card(10, Diamonds), card(11, Clubs), card(2, Spades)];
        assert_eq!(category(&three), HandCategory::ThreeOfAKind);

        let two_pair = [card(11, Spades), card(11, Hearts), card(9, Diamonds), card(9, Clubs), card(10, Spades)];
        assert_eq!(category(&two_pair), HandCategory::TwoPair);

        let pair = [card(1, Spades), card(1, Hearts), card(13, Diamonds)];
        assert_eq!(category(&pair), HandCategory::OnePair);
    }

    #[test]
    fn test_used_cards_for_groups() {
        let paytable = PlayerPaytable::default();
        let played = [card(9, Spades), card(9, Hearts), card(4, Clubs)];
        let full = [played[0], played[1], played[2], card(12, Diamonds), card(12, Hearts)];

        let eval = evaluate_hand(&played, &full, &paytable).unwrap();
        assert_eq!(eval.category, HandCategory::OnePair);
        assert_eq!(eval.used_cards.len(), 2);
        assert!(eval.used_cards.iter().all(|c| c.rank == 9));
        // 未使用的牌包括没有计分的踢脚牌和没打出的牌
        assert_eq!(eval.unused_cards.len(), 3);
        assert_eq!(eval.unused_category, Some(HandCategory::OnePair));
        assert_eq!(eval.base_chips, 10.0);
        assert_eq!(eval.base_multiplier, 2.0);
    }

    #[test]
    fn test_high_card_uses_single_highest() {
        let paytable = PlayerPaytable::default();
        let played = [card(13, Spades), card(1, Hearts), card(4, Clubs)];
        let eval = evaluate_hand(&played, &played, &paytable).unwrap();
        assert_eq!(eval.category, HandCategory::HighCard);
        assert_eq!(eval.used_cards, vec![card(1, Hearts)]);
        assert_eq!(eval.unused_cards.len(), 2);
    }

    #[test]
    fn test_unused_complement_is_by_id() {
        // 两张牌面相同但 id 不同（塔罗牌复制后可能出现）
        let paytable = PlayerPaytable::default();
        let a = Card::new(1, Spades, 5);
        let b = Card::new(60, Spades, 5);
        let other = Card::new(2, Hearts, 8);
        let eval = evaluate_hand(&[a], &[a, b, other], &paytable).unwrap();
        assert_eq!(eval.unused_cards, vec![b, other]);
    }

    #[test]
    fn test_base_values_follow_paytable() {
        let mut paytable = PlayerPaytable::default();
        let played = [card(9, Spades), card(9, Hearts)];
        paytable.enhance_chips(HandCategory::OnePair, 15.0);
        paytable.enhance_multiplier(HandCategory::OnePair, 1.0);
        let eval = evaluate_hand(&played, &played, &paytable).unwrap();
        assert_eq!(eval.base_chips, 25.0);
        assert_eq!(eval.base_multiplier, 3.0);
        assert_eq!(eval.unused_category, None);
    }

    #[test]
    fn test_empty_play_has_no_category() {
        assert!(classify(&[]).is_none());
    }

    fn arb_hand() -> impl Strategy<Value = Vec<Card>> {
        proptest::sample::subsequence((0u32..52).collect::<Vec<_>>(), 1..=8).prop_map(|ids| {
            ids.into_iter()
                .map(|id| Card::new(id, Suit::ALL[(id / 13) as usize], (id % 13) as u8 + 1))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn test_used_and_unused_partition_hand(full in arb_hand(), split in 1usize..=8) {
            let played: Vec<Card> = full.iter().take(split.min(full.len())).copied().collect();
            let eval = evaluate_hand(&played, &full, &PlayerPaytable::default()).unwrap();

            let used: HashSet<u32> = eval.used_cards.iter().map(|c| c.id).collect();
            let unused: HashSet<u32> = eval.unused_cards.iter().map(|c| c.id).collect();
            let all: HashSet<u32> = full.iter().map(|c| c.id).collect();

            prop_assert!(used.is_disjoint(&unused));
            prop_assert_eq!(used.union(&unused).copied().collect::<HashSet<_>>(), all);
        }
    }
}
