use crate::card::Card;
use crate::hand::HandCategory;
use crate::state::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 单个牌型的等级与数值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HandLevel {
    pub level: u32,
    /// 该牌型被打出的次数
    pub count: u32,
    pub chips: f64,
    pub multiplier: f64,
}

impl HandLevel {
    /// 牌型的初始数值
    pub fn default_for(category: HandCategory) -> HandLevel {
        let (chips, multiplier) = match category {
            HandCategory::HighCard => (5.0, 1.0),
            HandCategory::OnePair => (10.0, 2.0),
            HandCategory::TwoPair => (20.0, 2.0),
            HandCategory::ThreeOfAKind => (30.0, 3.0),
            HandCategory::Straight => (30.0, 4.0),
            HandCategory::Flush => (35.0, 4.0),
            HandCategory::FullHouse => (50.0, 5.0),
            HandCategory::FourOfAKind => (60.0, 7.0),
            HandCategory::StraightFlush => (100.0, 8.0),
        };
        HandLevel { level: 1, count: 0, chips, multiplier }
    }
}

/// 某张物理牌（按 `花色_点数` 区分）的累计强化
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardEnhancement {
    pub chips: f64,
    pub multiplier: f64,
}

impl Default for CardEnhancement {
    fn default() -> Self {
        CardEnhancement { chips: 0.0, multiplier: 1.0 }
    }
}

/// 一名玩家的牌型表和牌面强化
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerPaytable {
    pub hands: HashMap<HandCategory, HandLevel>,
    pub cards: HashMap<String, CardEnhancement>,
}

impl Default for PlayerPaytable {
    fn default() -> Self {
        PlayerPaytable {
            hands: HandCategory::ALL.into_iter().map(|c| (c, HandLevel::default_for(c))).collect(),
            cards: HashMap::new(),
        }
    }
}

impl PlayerPaytable {
    pub fn hand(&self, category: HandCategory) -> HandLevel {
        self.hands.get(&category).copied().unwrap_or_else(|| HandLevel::default_for(category))
    }

    fn hand_mut(&mut self, category: HandCategory) -> &mut HandLevel {
        self.hands.entry(category).or_insert_with(|| HandLevel::default_for(category))
    }

    pub fn enhance_level(&mut self, category: HandCategory) {
        self.hand_mut(category).level += 1;
    }

    pub fn enhance_count(&mut self, category: HandCategory) {
        self.hand_mut(category).count += 1;
    }

    pub fn enhance_chips(&mut self, category: HandCategory, delta: f64) {
        self.hand_mut(category).chips += delta;
    }

    pub fn enhance_multiplier(&mut self, category: HandCategory, delta: f64) {
        self.hand_mut(category).multiplier += delta;
    }

    pub fn card(&self, card: &Card) -> CardEnhancement {
        self.cards.get(&card.identity_key()).copied().unwrap_or_default()
    }

    pub fn enhance_card_chips(&mut self, card: &Card, delta: f64) {
        self.cards.entry(card.identity_key()).or_default().chips += delta;
    }

    pub fn enhance_card_multiplier(&mut self, card: &Card, delta: f64) {
        self.cards.entry(card.identity_key()).or_default().multiplier += delta;
    }
}

/// 一张桌子上所有玩家的牌型表
///
/// 玩家第一次被访问时才创建默认牌型表。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Paytable {
    players: HashMap<PlayerId, PlayerPaytable>,
}

impl Paytable {
    pub fn player(&mut self, player_id: PlayerId) -> &mut PlayerPaytable {
        self.players.entry(player_id).or_default()
    }

    /// 只读查看，玩家不存在时返回默认牌型表
    pub fn snapshot(&self, player_id: &PlayerId) -> PlayerPaytable {
        self.players.get(player_id).cloned().unwrap_or_default()
    }

    /// 新一局游戏开始时清空所有玩家的数据
    pub fn reset_all_user_data(&mut self) {
        self.players.clear();
    }

    pub fn remove_player(&mut self, player_id: &PlayerId) {
        self.players.remove(player_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Suit;
    use uuid::Uuid;

    #[test]
    fn test_lazy_defaults() {
        let mut table = Paytable::default();
        let id = Uuid::new_v4();
        let level = table.player(id).hand(HandCategory::StraightFlush);
        assert_eq!(level, HandLevel { level: 1, count: 0, chips: 100.0, multiplier: 8.0 });
        assert_eq!(table.player(id).hand(HandCategory::HighCard).chips, 5.0);
    }

    #[test]
    fn test_enhance_hand() {
        let mut table = Paytable::default();
        let id = Uuid::new_v4();
        let pt = table.player(id);
        pt.enhance_level(HandCategory::Flush);
        pt.enhance_count(HandCategory::Flush);
        pt.enhance_chips(HandCategory::Flush, 15.0);
        pt.enhance_multiplier(HandCategory::Flush, 2.0);

        let flush = table.snapshot(&id).hand(HandCategory::Flush);
        assert_eq!(flush.level, 2);
        assert_eq!(flush.count, 1);
        assert_eq!(flush.chips, 50.0);
        assert_eq!(flush.multiplier, 6.0);
    }

    #[test]
    fn test_card_enhancement_by_identity() {
        let mut table = Paytable::default();
        let id = Uuid::new_v4();
        let seven = Card::new(6, Suit::Clubs, 7);
        let same_face = Card::new(99, Suit::Clubs, 7);

        assert_eq!(table.player(id).card(&seven), CardEnhancement { chips: 0.0, multiplier: 1.0 });
        table.player(id).enhance_card_chips(&seven, 5.0);
        table.player(id).enhance_card_multiplier(&seven, 0.5);
        assert_eq!(table.player(id).card(&same_face), CardEnhancement { chips: 5.0, multiplier: 1.5 });
    }

    #[test]
    fn test_players_are_isolated_and_reset() {
        let mut table = Paytable::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        table.player(a).enhance_chips(HandCategory::OnePair, 10.0);
        assert_eq!(table.snapshot(&b).hand(HandCategory::OnePair).chips, 10.0);
        assert_eq!(table.snapshot(&a).hand(HandCategory::OnePair).chips, 20.0);

        table.reset_all_user_data();
        assert_eq!(table.snapshot(&a).hand(HandCategory::OnePair).chips, 10.0);
    }
}
