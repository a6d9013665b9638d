use crate::catalog::{CardCatalog, SpecialCardDefinition, SpecialCardKind};
use crate::state::PlayerId;
use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub const SHOP_SLOTS: usize = 5;

/// 按回合权重随机抽取一张小丑牌
///
/// 只考虑启用的、本局尚未出现过的、本回合权重 > 0 的小丑牌。
/// 使用整数累积分布：在 [0, 总权重) 内抽一个整数，返回第一个累积和超过它的牌。
pub fn pick_joker<'c, R: Rng + ?Sized>(
    catalog: &'c CardCatalog,
    round: u8,
    seen: &HashSet<String>,
    rng: &mut R,
) -> Option<&'c SpecialCardDefinition> {
    let candidates: Vec<(&SpecialCardDefinition, u64)> = catalog
        .active_of_kind(SpecialCardKind::Joker)
        .filter(|c| !seen.contains(&c.id))
        .map(|c| (c, c.weight_for_round(round) as u64))
        .filter(|(_, w)| *w > 0)
        .collect();

    let total: u64 = candidates.iter().map(|(_, w)| w).sum();
    if total == 0 {
        return None;
    }

    let draw = rng.random_range(0..total);
    let mut cumulative = 0;
    for (card, weight) in candidates {
        cumulative += weight;
        if cumulative > draw {
            return Some(card);
        }
    }
    None
}

/// 生成 5 个商店格子
///
/// 配置了覆盖 id 的格子原样使用。抽中的小丑牌立即加入排除集合。
/// 没有可抽的牌时使用目录中的第一张小丑牌兜底，兜底牌不受排除集合限制。
pub fn generate_shop_offer<R: Rng + ?Sized>(
    catalog: &CardCatalog,
    round: u8,
    overrides: &[Option<String>],
    seen: &mut HashSet<String>,
    rng: &mut R,
) -> Vec<String> {
    let mut offer = Vec::with_capacity(SHOP_SLOTS);
    for slot in 0..SHOP_SLOTS {
        if let Some(Some(id)) = overrides.get(slot) {
            seen.insert(id.clone());
            offer.push(id.clone());
            continue;
        }
        let picked = pick_joker(catalog, round, seen, rng).or_else(|| catalog.fallback_joker());
        if let Some(card) = picked {
            seen.insert(card.id.clone());
            offer.push(card.id.clone());
        }
    }
    debug!("第 {} 回合商店: {:?}", round, offer);
    offer
}

/// 行星牌与塔罗牌各一张，均匀抽取
pub fn generate_consumable_offer<R: Rng + ?Sized>(catalog: &CardCatalog, rng: &mut R) -> Vec<String> {
    let mut offer = Vec::new();
    for kind in [SpecialCardKind::Planet, SpecialCardKind::Tarot] {
        let pool: Vec<&SpecialCardDefinition> = catalog.active_of_kind(kind).collect();
        if let Some(card) = pool.choose(rng) {
            offer.push(card.id.clone());
        }
    }
    offer
}

/// 刷新商店
///
/// 每个玩家的刷新结果会被缓存；已经有其他玩家刷新过时，直接复制那份结果。
/// 返回值的第二项表示这次是否产生了新的报价（缓存命中时为 false）。
pub fn reroll_offer<R: Rng + ?Sized>(
    offers: &mut HashMap<PlayerId, Vec<String>>,
    player_id: PlayerId,
    catalog: &CardCatalog,
    round: u8,
    seen: &mut HashSet<String>,
    rng: &mut R,
) -> (Vec<String>, bool) {
    if let Some(cached) = offers.get(&player_id) {
        return (cached.clone(), false);
    }
    let offer = match offers.values().next() {
        Some(existing) => existing.clone(),
        None => generate_shop_offer(catalog, round, &[], seen, rng),
    };
    offers.insert(player_id, offer.clone());
    (offer, true)
}
