use crate::card::Suit;
use crate::hand::HandCategory;
use crate::rules::{parse_rule, Rule, RuleParseError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// 内置卡牌目录
const BUILTIN_CARDS: &str = include_str!("../data/cards.json");

pub const ROUND_COUNT: usize = 5;

/// 每张卡牌最多的条件/效果对数
pub const MAX_RULES_PER_CARD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialCardKind {
    Joker,
    Planet,
    Tarot,
}

/// 塔罗牌对牌组的具体作用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TarotAction {
    /// 选中的牌点数加减，在 1..=13 内循环
    RankShift(i8),
    /// 随机选 5 张牌统一改成一种随机花色
    RandomSuit,
    ChangeSuit(Suit),
    /// 从牌组中删除选中的牌
    Remove,
    /// 在选中的牌中随机复制一张
    Duplicate,
    /// 立即获得一张随机行星牌的效果
    RandomPlanet,
}

/// 卡牌数据文件中的一条记录，规则仍是文本
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDefinitionRecord {
    pub id: String,
    pub kind: SpecialCardKind,
    pub name: String,
    pub price: i64,
    #[serde(default)]
    pub round_prob: [u32; ROUND_COUNT],
    #[serde(default)]
    pub base_value: f64,
    #[serde(default)]
    pub increase: f64,
    #[serde(default)]
    pub decrease: f64,
    #[serde(default)]
    pub max_value: f64,
    #[serde(default)]
    pub enhance_chips: f64,
    #[serde(default)]
    pub enhance_mul: f64,
    #[serde(default)]
    pub need_card_count: usize,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub hand_category: Option<HandCategory>,
    #[serde(default)]
    pub tarot_action: Option<TarotAction>,
    #[serde(default)]
    pub rules: Vec<String>,
}

fn default_active() -> bool {
    true
}

/// 校验后的卡牌定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialCardDefinition {
    pub id: String,
    pub kind: SpecialCardKind,
    pub name: String,
    pub price: i64,
    pub round_prob: [u32; ROUND_COUNT],
    pub base_value: f64,
    pub increase: f64,
    pub decrease: f64,
    pub max_value: f64,
    pub enhance_chips: f64,
    pub enhance_mul: f64,
    pub need_card_count: usize,
    pub is_active: bool,
    pub hand_category: Option<HandCategory>,
    pub tarot_action: Option<TarotAction>,
    pub rules: Vec<Rule>,
}

impl SpecialCardDefinition {
    /// 第 `round` 回合（从 1 开始）的出现权重
    pub fn weight_for_round(&self, round: u8) -> u32 {
        let idx = (round.clamp(1, ROUND_COUNT as u8) - 1) as usize;
        self.round_prob[idx]
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("卡牌数据格式错误: {0}")]
    Json(#[from] serde_json::Error),
    #[error("卡牌 {card_id} 的规则无效: {source}")]
    Rule {
        card_id: String,
        #[source]
        source: RuleParseError,
    },
    #[error("重复的卡牌 id: {0}")]
    DuplicateId(String),
    #[error("卡牌 {0} 缺少必要字段: {1}")]
    MissingField(String, &'static str),
    #[error("卡牌目录中没有任何小丑牌")]
    NoJokers,
    #[error("卡牌 {card_id} 有 {count} 条规则，超过上限 {max}", max = MAX_RULES_PER_CARD)]
    TooManyRules { card_id: String, count: usize },
}

impl TryFrom<CardDefinitionRecord> for SpecialCardDefinition {
    type Error = CatalogError;

    fn try_from(record: CardDefinitionRecord) -> Result<Self, Self::Error> {
        if record.rules.len() > MAX_RULES_PER_CARD {
            return Err(CatalogError::TooManyRules { card_id: record.id, count: record.rules.len() });
        }
        let rules = record
            .rules
            .iter()
            .map(|text| parse_rule(text))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| CatalogError::Rule { card_id: record.id.clone(), source })?;

        match record.kind {
            SpecialCardKind::Planet if record.hand_category.is_none() => {
                return Err(CatalogError::MissingField(record.id, "hand_category"));
            }
            SpecialCardKind::Tarot if record.tarot_action.is_none() => {
                return Err(CatalogError::MissingField(record.id, "tarot_action"));
            }
            _ => {}
        }

        Ok(SpecialCardDefinition {
            id: record.id,
            kind: record.kind,
            name: record.name,
            price: record.price,
            round_prob: record.round_prob,
            base_value: record.base_value,
            increase: record.increase,
            decrease: record.decrease,
            max_value: record.max_value,
            enhance_chips: record.enhance_chips,
            enhance_mul: record.enhance_mul,
            need_card_count: record.need_card_count,
            is_active: record.is_active,
            hand_category: record.hand_category,
            tarot_action: record.tarot_action,
            rules,
        })
    }
}

/// 卡牌目录
///
/// 保留载入时的顺序，第一张小丑牌同时作为商店没有可选牌时的兜底。
#[derive(Debug, Clone, Default)]
pub struct CardCatalog {
    cards: Vec<SpecialCardDefinition>,
    index: HashMap<String, usize>,
}

impl CardCatalog {
    pub fn new(definitions: Vec<SpecialCardDefinition>) -> Result<Self, CatalogError> {
        let mut index = HashMap::new();
        for (i, card) in definitions.iter().enumerate() {
            if index.insert(card.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateId(card.id.clone()));
            }
        }
        if !definitions.iter().any(|c| c.kind == SpecialCardKind::Joker) {
            return Err(CatalogError::NoJokers);
        }
        Ok(CardCatalog { cards: definitions, index })
    }

    pub fn from_records(records: Vec<CardDefinitionRecord>) -> Result<Self, CatalogError> {
        let definitions = records
            .into_iter()
            .map(SpecialCardDefinition::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        CardCatalog::new(definitions)
    }

    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let records: Vec<CardDefinitionRecord> = serde_json::from_str(text)?;
        CardCatalog::from_records(records)
    }

    /// 随库一起发布的内置卡牌
    pub fn builtin() -> Result<Self, CatalogError> {
        CardCatalog::from_json(BUILTIN_CARDS)
    }

    pub fn get(&self, id: &str) -> Option<&SpecialCardDefinition> {
        self.index.get(id).map(|&i| &self.cards[i])
    }

    pub fn of_kind(&self, kind: SpecialCardKind) -> impl Iterator<Item = &SpecialCardDefinition> {
        self.cards.iter().filter(move |c| c.kind == kind)
    }

    pub fn active_of_kind(&self, kind: SpecialCardKind) -> impl Iterator<Item = &SpecialCardDefinition> {
        self.of_kind(kind).filter(|c| c.is_active)
    }

    pub fn fallback_joker(&self) -> Option<&SpecialCardDefinition> {
        self.of_kind(SpecialCardKind::Joker).next()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}
