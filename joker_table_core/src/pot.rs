//! 种子金（底池）结算
//!
//! 每名参与者的缴纳记录分为 `chips` 和 `funds` 两部分，两部分按同一算法各自独立结算。
//! 对每名参与者先计算封顶金额 `a = min(自己的缴纳, 回合最大奖金)`：
//! - 没有赢家：每人拿回 `a`。
//! - 赢家（k 人）：拿回 `a`，再从每个输家那里分得 `min(赢家缴纳, 输家缴纳, 上限) / k`。
//! - 输家：拿回 `a`，再减去付给每个赢家的份额。
//!
//! 除法向下取整。每个输家付出的总额为 `⌊Σ份额 / k⌋`，
//! 各赢家先拿 `⌊份额 / k⌋`，余数交给座位顺序上的第一个赢家，保证总额守恒。

use crate::state::PlayerId;
use serde::{Deserialize, Serialize};

/// 一名玩家的种子金缴纳记录
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedPayment {
    pub chips: i64,
    pub funds: i64,
}

/// 结算结果：`gain` 为应返还到余额的金额，`consumed` 为从缴纳记录中扣除的部分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotShare {
    pub player_id: PlayerId,
    pub gain: SeedPayment,
    pub consumed: SeedPayment,
}

/// 结算一个回合的种子金
///
/// `payments` 按座位顺序排列；`winners` 为空表示没有赢家。
pub fn distribute(payments: &[(PlayerId, SeedPayment)], winners: &[PlayerId], round_max_prize: i64) -> Vec<PotShare> {
    let chips: Vec<i64> = payments.iter().map(|(_, p)| p.chips).collect();
    let funds: Vec<i64> = payments.iter().map(|(_, p)| p.funds).collect();
    let is_winner: Vec<bool> = payments.iter().map(|(id, _)| winners.contains(id)).collect();

    let chip_gains = distribute_component(&chips, &is_winner, round_max_prize);
    let fund_gains = distribute_component(&funds, &is_winner, round_max_prize);

    payments
        .iter()
        .enumerate()
        .map(|(i, (player_id, payment))| PotShare {
            player_id: *player_id,
            gain: SeedPayment { chips: chip_gains[i], funds: fund_gains[i] },
            consumed: SeedPayment {
                chips: capped(payment.chips, round_max_prize),
                funds: capped(payment.funds, round_max_prize),
            },
        })
        .collect()
}

fn capped(amount: i64, cap: i64) -> i64 {
    amount.min(cap).max(0)
}

fn distribute_component(amounts: &[i64], is_winner: &[bool], cap: i64) -> Vec<i64> {
    let mut gains: Vec<i64> = amounts.iter().map(|a| capped(*a, cap)).collect();

    let winner_idx: Vec<usize> = (0..amounts.len()).filter(|i| is_winner[*i]).collect();
    let k = winner_idx.len() as i64;
    if k == 0 {
        return gains;
    }

    for loser in (0..amounts.len()).filter(|i| !is_winner[*i]) {
        // 每个赢家从这个输家那里的份额
        let shares: Vec<i64> = winner_idx
            .iter()
            .map(|&w| amounts[w].min(amounts[loser]).min(cap).max(0))
            .collect();
        let loss = shares.iter().sum::<i64>() / k;
        gains[loser] -= loss;

        let mut paid = 0;
        for (&w, share) in winner_idx.iter().zip(&shares) {
            let part = share / k;
            gains[w] += part;
            paid += part;
        }
        gains[winner_idx[0]] += loss - paid;
    }
    gains
}
