//! 卡牌规则的语法与类型化表示
//!
//! 每条规则由 "时机:条件^效果" 组成，例如
//! `scoring:scoring_card_by_suite(diamond)^add_mults=[basevalue]`。
//! 规则在载入卡牌目录时解析并校验，计分时只处理类型化后的结构。

use crate::card::{Suit, MAX_RANK, MIN_RANK};
use crate::hand::HandCategory;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    /// 当前计分牌的花色
    CardSuit,
    /// 当前计分牌的点数
    CardRank,
    /// 打出的牌型
    HandType,
    /// 未使用的牌组成的牌型
    UnusedHandType,
    UsedSuitCount,
    UnusedSuitCount,
    UsedRankCount,
    /// 剩余牌堆中某点数的张数
    DeckRankCount,
    DeckRemainCount,
    DeckTotalCount,
    DiscardRemainCount,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionValue {
    Suit(Suit),
    Rank(u8),
    Hand(HandCategory),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    pub fn holds(&self, measure: i64, operand: i64) -> bool {
        match self {
            Comparison::Eq => measure == operand,
            Comparison::Gt => measure > operand,
            Comparison::Ge => measure >= operand,
            Comparison::Lt => measure < operand,
            Comparison::Le => measure <= operand,
        }
    }
}

/// 触发条件
///
/// `values` 之间是"或"的关系。没有比较运算时，度量值 >= 1 即视为成立。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: ConditionKind,
    pub values: Vec<ConditionValue>,
    pub comparison: Option<(Comparison, i64)>,
}

impl Condition {
    pub fn always() -> Condition {
        Condition { kind: ConditionKind::Always, values: vec![], comparison: None }
    }

    pub fn accepts(&self, measure: i64) -> bool {
        match self.comparison {
            Some((cmp, operand)) => cmp.holds(measure, operand),
            None => measure >= 1,
        }
    }

    pub fn has_suit(&self, suit: Suit) -> bool {
        self.values.is_empty() || self.values.contains(&ConditionValue::Suit(suit))
    }

    pub fn has_rank(&self, rank: u8) -> bool {
        self.values.is_empty() || self.values.contains(&ConditionValue::Rank(rank))
    }

    pub fn has_hand(&self, category: HandCategory) -> bool {
        self.values.contains(&ConditionValue::Hand(category))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectTiming {
    OnHandPlay,
    OnScoring,
    OnAfterScoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    AddMultiplier,
    MulMultiplier,
    AddChips,
    MulChips,
    IncreaseBaseValue,
    DecreaseBaseValue,
    GrowCardChips,
    GrowCardMultiplier,
    CopyLeftJoker,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EffectValue {
    Literal(f64),
    BaseValue,
    Increase,
    Decrease,
    /// 每次计分时在 [min, max] 内抽取一次
    Random { min: i64, max: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectTarget {
    Card,
    Joker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub timing: EffectTiming,
    pub kind: EffectKind,
    pub value: EffectValue,
    pub target: EffectTarget,
    /// 效果值再乘以条件的度量值
    pub by_count: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub condition: Condition,
    pub effect: Effect,
}

#[derive(Debug, Error, PartialEq)]
pub enum RuleParseError {
    #[error("规则缺少时机前缀: {0}")]
    MissingTiming(String),
    #[error("未知的时机: {0}")]
    UnknownTiming(String),
    #[error("规则缺少效果部分: {0}")]
    MissingEffect(String),
    #[error("未知的条件类型: {0}")]
    UnknownCondition(String),
    #[error("条件 {keyword} 不接受取值 {value}")]
    InvalidValue { keyword: String, value: String },
    #[error("条件 {0} 缺少取值")]
    MissingValue(String),
    #[error("无法解析的比较: {0}")]
    InvalidComparison(String),
    #[error("未知的效果类型: {0}")]
    UnknownEffect(String),
    #[error("无法解析的效果值: {0}")]
    InvalidAmount(String),
    #[error("未知的效果目标: {0}")]
    UnknownTarget(String),
    #[error("效果 {0} 不能作用于牌")]
    CardTargetNotAllowed(String),
}

// --- 解析 ---

/// 解析一条规则文本
pub fn parse_rule(text: &str) -> Result<Rule, RuleParseError> {
    let text = text.trim();
    let (timing, body) = text.split_once(':').ok_or_else(|| RuleParseError::MissingTiming(text.to_string()))?;
    let timing = match timing.trim() {
        "hand_play" => EffectTiming::OnHandPlay,
        "scoring" => EffectTiming::OnScoring,
        "after_scoring" => EffectTiming::OnAfterScoring,
        other => return Err(RuleParseError::UnknownTiming(other.to_string())),
    };
    let (condition, effect) = body.split_once('^').ok_or_else(|| RuleParseError::MissingEffect(text.to_string()))?;

    Ok(Rule {
        condition: parse_condition(condition.trim())?,
        effect: parse_effect(timing, effect.trim())?,
    })
}

/// 值的种类，决定括号内允许出现什么
enum ValueShape {
    None,
    Suits { required: bool },
    Ranks { required: bool },
    Hands { including: bool },
}

fn condition_keyword(keyword: &str) -> Option<(ConditionKind, ValueShape)> {
    use ConditionKind::*;
    let entry = match keyword {
        "scoring_card_by_suite" => (CardSuit, ValueShape::Suits { required: true }),
        "scoring_card_by_number" => (CardRank, ValueShape::Ranks { required: true }),
        "handplay_used_card_by_rank" => (HandType, ValueShape::Hands { including: false }),
        "handplay_used_card_include_rank" => (HandType, ValueShape::Hands { including: true }),
        "handplay_unused_card_by_rank" => (UnusedHandType, ValueShape::Hands { including: false }),
        "handplay_unused_card_include_rank" => (UnusedHandType, ValueShape::Hands { including: true }),
        "handplay_used_card_by_suite_count" => (UsedSuitCount, ValueShape::Suits { required: false }),
        "handplay_unused_card_by_suite_count" => (UnusedSuitCount, ValueShape::Suits { required: false }),
        "handplay_used_card_by_number_count" => (UsedRankCount, ValueShape::Ranks { required: true }),
        "deck_card_by_number_count" => (DeckRankCount, ValueShape::Ranks { required: true }),
        "deck_card_remain_count" => (DeckRemainCount, ValueShape::None),
        "deck_card_total_count" => (DeckTotalCount, ValueShape::None),
        "remain_discard_count" => (DiscardRemainCount, ValueShape::None),
        "no_condition" => (Always, ValueShape::None),
        _ => return None,
    };
    Some(entry)
}

fn parse_condition(text: &str) -> Result<Condition, RuleParseError> {
    let keyword_end = text.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_')).unwrap_or(text.len());
    let keyword = &text[..keyword_end];
    let mut rest = text[keyword_end..].trim_start();

    let (kind, shape) = condition_keyword(keyword).ok_or_else(|| RuleParseError::UnknownCondition(keyword.to_string()))?;

    // 1. 括号内的取值列表
    let mut raw_values: Vec<&str> = Vec::new();
    if let Some(inner) = rest.strip_prefix('(') {
        let close = inner.find(')').ok_or_else(|| RuleParseError::InvalidValue {
            keyword: keyword.to_string(),
            value: inner.to_string(),
        })?;
        raw_values = inner[..close].split('/').map(str::trim).filter(|v| !v.is_empty()).collect();
        rest = inner[close + 1..].trim_start();
    }

    let invalid = |value: &str| RuleParseError::InvalidValue { keyword: keyword.to_string(), value: value.to_string() };
    let mut values = Vec::new();
    match shape {
        ValueShape::None => {
            if let Some(v) = raw_values.first() {
                return Err(invalid(v));
            }
        }
        ValueShape::Suits { required } => {
            for v in &raw_values {
                values.push(ConditionValue::Suit(Suit::parse(v).ok_or_else(|| invalid(v))?));
            }
            if required && values.is_empty() {
                return Err(RuleParseError::MissingValue(keyword.to_string()));
            }
        }
        ValueShape::Ranks { required } => {
            for v in &raw_values {
                let rank: u8 = v.parse().map_err(|_| invalid(v))?;
                if !(MIN_RANK..=MAX_RANK).contains(&rank) {
                    return Err(invalid(v));
                }
                values.push(ConditionValue::Rank(rank));
            }
            if required && values.is_empty() {
                return Err(RuleParseError::MissingValue(keyword.to_string()));
            }
        }
        ValueShape::Hands { including } => {
            for v in &raw_values {
                let category = HandCategory::parse(v).ok_or_else(|| invalid(v))?;
                let expanded = if including { category.including() } else { vec![category] };
                for c in expanded {
                    if !values.contains(&ConditionValue::Hand(c)) {
                        values.push(ConditionValue::Hand(c));
                    }
                }
            }
            if values.is_empty() {
                return Err(RuleParseError::MissingValue(keyword.to_string()));
            }
        }
    }

    // 2. 可选的数值比较
    let comparison = if rest.is_empty() {
        None
    } else {
        let (cmp, number) = if let Some(n) = rest.strip_prefix(">=") {
            (Comparison::Ge, n)
        } else if let Some(n) = rest.strip_prefix("<=") {
            (Comparison::Le, n)
        } else if let Some(n) = rest.strip_prefix('>') {
            (Comparison::Gt, n)
        } else if let Some(n) = rest.strip_prefix('<') {
            (Comparison::Lt, n)
        } else if let Some(n) = rest.strip_prefix('=') {
            (Comparison::Eq, n)
        } else {
            return Err(RuleParseError::InvalidComparison(rest.to_string()));
        };
        let operand: i64 = number.trim().parse().map_err(|_| RuleParseError::InvalidComparison(rest.to_string()))?;
        Some((cmp, operand))
    };

    Ok(Condition { kind, values, comparison })
}

fn parse_effect(timing: EffectTiming, text: &str) -> Result<Effect, RuleParseError> {
    let (text, target) = match text.split_once("->") {
        Some((head, target)) => {
            let target = match target.trim() {
                "card" => EffectTarget::Card,
                "joker" => EffectTarget::Joker,
                other => return Err(RuleParseError::UnknownTarget(other.to_string())),
            };
            (head.trim(), Some(target))
        }
        None => (text, None),
    };
    let (verb, amount) = match text.split_once('=') {
        Some((verb, amount)) => (verb.trim(), Some(amount.trim())),
        None => (text.trim(), None),
    };
    let (verb, by_count) = match verb.strip_suffix("_by_count") {
        Some(stripped) => (stripped, true),
        None => (verb, false),
    };

    let kind = match verb {
        "add_mults" => EffectKind::AddMultiplier,
        "multiple_mults" => EffectKind::MulMultiplier,
        "add_chips" => EffectKind::AddChips,
        "multiple_chips" => EffectKind::MulChips,
        "increase_basevalue" => EffectKind::IncreaseBaseValue,
        "decrease_basevalue" => EffectKind::DecreaseBaseValue,
        "increase_chips" => EffectKind::GrowCardChips,
        "increase_mults" => EffectKind::GrowCardMultiplier,
        "copy_left_joker" => EffectKind::CopyLeftJoker,
        other => return Err(RuleParseError::UnknownEffect(other.to_string())),
    };

    let value = match amount {
        Some(amount) => parse_amount(amount)?,
        None => match kind {
            EffectKind::IncreaseBaseValue => EffectValue::Increase,
            EffectKind::DecreaseBaseValue => EffectValue::Decrease,
            _ => EffectValue::BaseValue,
        },
    };
    let grows_card = matches!(kind, EffectKind::GrowCardChips | EffectKind::GrowCardMultiplier);
    let target = match target {
        Some(EffectTarget::Card) if !grows_card => return Err(RuleParseError::CardTargetNotAllowed(verb.to_string())),
        Some(target) => target,
        None if grows_card => EffectTarget::Card,
        None => EffectTarget::Joker,
    };

    Ok(Effect { timing, kind, value, target, by_count })
}

fn parse_amount(amount: &str) -> Result<EffectValue, RuleParseError> {
    let invalid = || RuleParseError::InvalidAmount(amount.to_string());
    match amount {
        "[basevalue]" => return Ok(EffectValue::BaseValue),
        "[increase]" => return Ok(EffectValue::Increase),
        "[decrease]" => return Ok(EffectValue::Decrease),
        _ => {}
    }
    if let Some((min, max)) = amount.split_once('@') {
        let min: i64 = min.trim().parse().map_err(|_| invalid())?;
        let max: i64 = max.trim().parse().map_err(|_| invalid())?;
        if min > max {
            return Err(invalid());
        }
        return Ok(EffectValue::Random { min, max });
    }
    amount.parse::<f64>().map(EffectValue::Literal).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_suit_rule() {
        let rule = parse_rule("scoring:scoring_card_by_suite(diamond/heart)^add_mults=[basevalue]").unwrap();
        assert_eq!(rule.condition.kind, ConditionKind::CardSuit);
        assert_eq!(rule.condition.values, vec![ConditionValue::Suit(Suit::Diamonds), ConditionValue::Suit(Suit::Hearts)]);
        assert_eq!(rule.condition.comparison, None);
        assert_eq!(rule.effect.timing, EffectTiming::OnScoring);
        assert_eq!(rule.effect.kind, EffectKind::AddMultiplier);
        assert_eq!(rule.effect.value, EffectValue::BaseValue);
        assert_eq!(rule.effect.target, EffectTarget::Joker);
        assert!(!rule.effect.by_count);
    }

    #[test]
    fn test_parse_count_rule_with_comparison() {
        let rule = parse_rule("hand_play:handplay_used_card_by_suite_count(spade) >= 3 ^ add_chips_by_count=10").unwrap();
        assert_eq!(rule.condition.kind, ConditionKind::UsedSuitCount);
        assert_eq!(rule.condition.comparison, Some((Comparison::Ge, 3)));
        assert!(rule.effect.by_count);
        assert_eq!(rule.effect.value, EffectValue::Literal(10.0));
        assert!(rule.condition.accepts(3));
        assert!(!rule.condition.accepts(2));
    }

    #[test]
    fn test_include_rank_expands_upward() {
        let rule = parse_rule("hand_play:handplay_used_card_include_rank(onepair)^multiple_mults=2").unwrap();
        for c in [HandCategory::OnePair, HandCategory::TwoPair, HandCategory::ThreeOfAKind, HandCategory::FullHouse, HandCategory::FourOfAKind] {
            assert!(rule.condition.has_hand(c), "{:?}", c);
        }
        assert!(!rule.condition.has_hand(HandCategory::Straight));

        let exact = parse_rule("hand_play:handplay_used_card_by_rank(flush)^add_mults=4").unwrap();
        assert!(exact.condition.has_hand(HandCategory::Flush));
        assert!(!exact.condition.has_hand(HandCategory::StraightFlush));
    }

    #[test]
    fn test_effect_defaults_and_targets() {
        let grow = parse_rule("after_scoring:no_condition^increase_basevalue").unwrap();
        assert_eq!(grow.effect.value, EffectValue::Increase);

        let card = parse_rule("scoring:scoring_card_by_number(1/13)^increase_chips=5").unwrap();
        assert_eq!(card.effect.kind, EffectKind::GrowCardChips);
        assert_eq!(card.effect.target, EffectTarget::Card);

        let onto_joker = parse_rule("scoring:no_condition^increase_mults=1->joker").unwrap();
        assert_eq!(onto_joker.effect.target, EffectTarget::Joker);

        let random = parse_rule("hand_play:no_condition^add_mults=2@8->joker").unwrap();
        assert_eq!(random.effect.value, EffectValue::Random { min: 2, max: 8 });

        let copy = parse_rule("hand_play:no_condition^copy_left_joker").unwrap();
        assert_eq!(copy.effect.kind, EffectKind::CopyLeftJoker);
    }

    #[test]
    fn test_no_comparison_means_at_least_one() {
        let rule = parse_rule("hand_play:remain_discard_count^add_mults_by_count=1").unwrap();
        assert!(rule.condition.accepts(1));
        assert!(!rule.condition.accepts(0));

        let zero = parse_rule("hand_play:remain_discard_count=0^multiple_mults=3").unwrap();
        assert!(zero.condition.accepts(0));
        assert!(!zero.condition.accepts(1));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_rule("no_condition^add_mults=1"),
            Err(RuleParseError::MissingTiming("no_condition^add_mults=1".to_string()))
        );
        assert!(matches!(parse_rule("later:no_condition^add_mults=1"), Err(RuleParseError::UnknownTiming(_))));
        assert!(matches!(parse_rule("scoring:no_condition"), Err(RuleParseError::MissingEffect(_))));
        assert!(matches!(parse_rule("scoring:card_is_shiny^add_mults=1"), Err(RuleParseError::UnknownCondition(_))));
        assert!(matches!(parse_rule("scoring:scoring_card_by_suite(stars)^add_mults=1"), Err(RuleParseError::InvalidValue { .. })));
        assert!(matches!(parse_rule("scoring:scoring_card_by_number(14)^add_mults=1"), Err(RuleParseError::InvalidValue { .. })));
        assert!(matches!(parse_rule("scoring:scoring_card_by_suite^add_mults=1"), Err(RuleParseError::MissingValue(_))));
        assert!(matches!(parse_rule("scoring:deck_card_remain_count~3^add_mults=1"), Err(RuleParseError::InvalidComparison(_))));
        assert!(matches!(parse_rule("scoring:no_condition^explode=1"), Err(RuleParseError::UnknownEffect(_))));
        assert!(matches!(parse_rule("scoring:no_condition^add_mults=9@2"), Err(RuleParseError::InvalidAmount(_))));
        assert!(matches!(parse_rule("scoring:no_condition^add_mults=1->deck"), Err(RuleParseError::UnknownTarget(_))));
        assert_eq!(
            parse_rule("scoring:no_condition^add_mults=1->card"),
            Err(RuleParseError::CardTargetNotAllowed("add_mults".to_string()))
        );
        assert!(matches!(parse_rule("hand_play:no_condition^copy_left_joker->card"), Err(RuleParseError::CardTargetNotAllowed(_))));
    }
}
