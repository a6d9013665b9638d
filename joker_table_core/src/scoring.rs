//! 小丑牌效果引擎
//!
//! 计分流程：
//! 1. 预处理：展开 `CopyLeftJoker`，复制左侧小丑牌本回合生效的规则（不会写回目录）。
//! 2. `OnHandPlay` 时机触发一次。
//! 3. 对每张计分牌：先加上牌面筹码与强化，再以该牌为当前牌触发 `OnScoring`。
//! 4. `OnAfterScoring` 时机触发一次。
//!
//! 最终得分 = 筹码 × 倍率，向下取整。

use crate::card::Card;
use crate::catalog::{CardCatalog, SpecialCardDefinition};
use crate::hand::{HandCategory, HandEvaluation};
use crate::paytable::PlayerPaytable;
use crate::rules::{Condition, ConditionKind, ConditionValue, EffectKind, EffectTarget, EffectTiming, EffectValue, Rule};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// 玩家持有的一张小丑牌
///
/// `base_value` 属于这张牌的实例，会随成长/衰减效果变化。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedJoker {
    pub id: String,
    pub base_value: f64,
}

impl OwnedJoker {
    pub fn from_definition(def: &SpecialCardDefinition) -> OwnedJoker {
        OwnedJoker { id: def.id.clone(), base_value: def.base_value }
    }
}

/// 计分时需要的牌桌信息
#[derive(Debug, Clone, Copy)]
pub struct RoundContext<'a> {
    /// 玩家剩余的牌堆
    pub remaining_deck: &'a [Card],
    /// 玩家本回合牌组的总张数
    pub deck_total: usize,
    pub remaining_discards: u32,
}

/// 一次触发记录，用于客户端展示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredEffect {
    pub joker_id: String,
    pub timing: EffectTiming,
    pub kind: EffectKind,
    pub value: f64,
    pub card: Option<Card>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub category: HandCategory,
    pub chips: f64,
    pub multiplier: f64,
    pub score: i64,
    pub triggered: Vec<TriggeredEffect>,
}

/// 预处理后某个小丑牌位本回合生效的规则
struct ResolvedSlot<'c> {
    joker_id: String,
    /// 读取 base_value 等数值的来源牌位
    source_slot: usize,
    source_def: Option<&'c SpecialCardDefinition>,
    /// 复制来的规则不改变任何牌的 base_value
    mirrored: bool,
    rules: Vec<Rule>,
}

struct ScoringState {
    chips: f64,
    multiplier: f64,
    /// (来源牌位, 规则序号) -> 本次计分抽到的随机值
    random_values: HashMap<(usize, usize), f64>,
    triggered: Vec<TriggeredEffect>,
}

/// 计算一次出牌的得分
///
/// 会修改 `jokers` 的 base_value（成长/衰减）和 `paytable` 的牌面强化。
pub fn score_hand<R: Rng + ?Sized>(
    evaluation: &HandEvaluation,
    jokers: &mut [OwnedJoker],
    paytable: &mut PlayerPaytable,
    catalog: &CardCatalog,
    round: &RoundContext<'_>,
    rng: &mut R,
) -> ScoreOutcome {
    let slots = resolve_slots(jokers, catalog);
    let mut state = ScoringState {
        chips: evaluation.base_chips,
        multiplier: evaluation.base_multiplier,
        random_values: HashMap::new(),
        triggered: Vec::new(),
    };

    fire(EffectTiming::OnHandPlay, None, evaluation, &slots, jokers, paytable, round, &mut state, rng);

    for card in &evaluation.used_cards {
        let enhancement = paytable.card(card);
        state.chips += card.chip_value() as f64 + enhancement.chips;
        state.multiplier *= enhancement.multiplier;
        fire(EffectTiming::OnScoring, Some(card), evaluation, &slots, jokers, paytable, round, &mut state, rng);
    }

    fire(EffectTiming::OnAfterScoring, None, evaluation, &slots, jokers, paytable, round, &mut state, rng);

    let score = (state.chips * state.multiplier).floor().max(0.0) as i64;
    ScoreOutcome {
        category: evaluation.category,
        chips: state.chips,
        multiplier: state.multiplier,
        score,
        triggered: state.triggered,
    }
}

/// 展开复制左侧小丑牌的效果
///
/// 最左侧的复制牌没有左邻，只保留自己目录里的其他规则。
fn resolve_slots<'c>(jokers: &[OwnedJoker], catalog: &'c CardCatalog) -> Vec<ResolvedSlot<'c>> {
    let mut slots: Vec<ResolvedSlot<'c>> = Vec::with_capacity(jokers.len());
    for (i, joker) in jokers.iter().enumerate() {
        let def = catalog.get(&joker.id);
        if def.is_none() {
            warn!("小丑牌 {} 不在卡牌目录中，跳过", joker.id);
        }
        let own_rules: Vec<Rule> = def.map(|d| d.rules.clone()).unwrap_or_default();
        let copies_left = own_rules.iter().any(|r| r.effect.kind == EffectKind::CopyLeftJoker);

        let slot = match (copies_left, i.checked_sub(1).and_then(|l| slots.get(l))) {
            (true, Some(left)) => ResolvedSlot {
                joker_id: joker.id.clone(),
                source_slot: left.source_slot,
                source_def: left.source_def,
                mirrored: true,
                rules: left.rules.clone(),
            },
            _ => ResolvedSlot {
                joker_id: joker.id.clone(),
                source_slot: i,
                source_def: def,
                mirrored: false,
                rules: own_rules.into_iter().filter(|r| r.effect.kind != EffectKind::CopyLeftJoker).collect(),
            },
        };
        slots.push(slot);
    }
    slots
}

#[allow(clippy::too_many_arguments)]
fn fire<R: Rng + ?Sized>(
    timing: EffectTiming,
    current: Option<&Card>,
    evaluation: &HandEvaluation,
    slots: &[ResolvedSlot<'_>],
    jokers: &mut [OwnedJoker],
    paytable: &mut PlayerPaytable,
    round: &RoundContext<'_>,
    state: &mut ScoringState,
    rng: &mut R,
) {
    for slot in slots {
        for (rule_idx, rule) in slot.rules.iter().enumerate() {
            if rule.effect.timing != timing {
                continue;
            }
            let measure = measure(&rule.condition, current, evaluation, round);
            if !rule.condition.accepts(measure) {
                continue;
            }

            let base_value = jokers[slot.source_slot].base_value;
            let mut value = match rule.effect.value {
                EffectValue::Literal(v) => v,
                EffectValue::BaseValue => base_value,
                EffectValue::Increase => slot.source_def.map_or(0.0, |d| d.increase),
                EffectValue::Decrease => slot.source_def.map_or(0.0, |d| d.decrease),
                // 镜像与来源共用同一个随机值
                EffectValue::Random { min, max } => *state
                    .random_values
                    .entry((slot.source_slot, rule_idx))
                    .or_insert_with(|| rng.random_range(min..=max) as f64),
            };
            if rule.effect.by_count {
                value *= measure as f64;
            }

            match (rule.effect.kind, rule.effect.target) {
                (EffectKind::AddMultiplier, _) => state.multiplier += value,
                (EffectKind::MulMultiplier, _) => state.multiplier *= value,
                (EffectKind::AddChips, _) => state.chips += value,
                (EffectKind::MulChips, _) => state.chips *= value,
                (EffectKind::IncreaseBaseValue, _)
                | (EffectKind::GrowCardChips | EffectKind::GrowCardMultiplier, EffectTarget::Joker) => {
                    // 镜像不改变任何牌的 base_value
                    if slot.mirrored {
                        continue;
                    }
                    let max_value = slot.source_def.map_or(0.0, |d| d.max_value);
                    let mut grown = base_value + value;
                    if max_value > 0.0 {
                        grown = grown.min(max_value);
                    }
                    jokers[slot.source_slot].base_value = grown;
                }
                (EffectKind::DecreaseBaseValue, _) => {
                    if slot.mirrored {
                        continue;
                    }
                    jokers[slot.source_slot].base_value = (base_value - value).max(1.0);
                }
                (EffectKind::GrowCardChips | EffectKind::GrowCardMultiplier, EffectTarget::Card) => {
                    // 没有当前牌时作用于所有计分牌
                    let targets: Vec<Card> = match current {
                        Some(card) => vec![*card],
                        None => evaluation.used_cards.clone(),
                    };
                    for card in &targets {
                        if rule.effect.kind == EffectKind::GrowCardChips {
                            paytable.enhance_card_chips(card, value);
                        } else {
                            paytable.enhance_card_multiplier(card, value);
                        }
                    }
                }
                (EffectKind::CopyLeftJoker, _) => continue,
            }

            state.triggered.push(TriggeredEffect {
                joker_id: slot.joker_id.clone(),
                timing,
                kind: rule.effect.kind,
                value,
                card: current.copied(),
            });
        }
    }
}

/// 条件的度量值，布尔型条件为 0 或 1
fn measure(condition: &Condition, current: Option<&Card>, evaluation: &HandEvaluation, round: &RoundContext<'_>) -> i64 {
    let flag = |b: bool| if b { 1 } else { 0 };
    let count_suits = |cards: &[Card]| cards.iter().filter(|c| condition.has_suit(c.suit)).count() as i64;
    let count_ranks = |cards: &[Card]| cards.iter().filter(|c| condition.has_rank(c.rank)).count() as i64;

    match condition.kind {
        ConditionKind::CardSuit => flag(current.is_some_and(|c| condition.values.contains(&ConditionValue::Suit(c.suit)))),
        ConditionKind::CardRank => flag(current.is_some_and(|c| condition.values.contains(&ConditionValue::Rank(c.rank)))),
        ConditionKind::HandType => flag(condition.has_hand(evaluation.category)),
        ConditionKind::UnusedHandType => flag(evaluation.unused_category.is_some_and(|c| condition.has_hand(c))),
        ConditionKind::UsedSuitCount => count_suits(&evaluation.used_cards),
        ConditionKind::UnusedSuitCount => count_suits(&evaluation.unused_cards),
        ConditionKind::UsedRankCount => count_ranks(&evaluation.used_cards),
        ConditionKind::DeckRankCount => count_ranks(round.remaining_deck),
        ConditionKind::DeckRemainCount => round.remaining_deck.len() as i64,
        ConditionKind::DeckTotalCount => round.deck_total as i64,
        ConditionKind::DiscardRemainCount => round.remaining_discards as i64,
        ConditionKind::Always => 1,
    }
}
