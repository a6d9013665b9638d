use crate::card::*;
use crate::catalog::{SpecialCardKind, TarotAction};
use crate::error::TableError;
use crate::hand::evaluate_hand;
use crate::message::{RoundResult, ServerMessage};
use crate::pot::{distribute, SeedPayment};
use crate::scoring::{score_hand, OwnedJoker, RoundContext, ScoreOutcome};
use crate::shop::{generate_consumable_offer, generate_shop_offer, reroll_offer};
use crate::state::*;
use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

type Events = Result<Vec<ServerMessage>, TableError>;

// --- 核心游戏流程 ---
// 所有公开方法先完成校验再修改状态，返回 Err 时状态不变。

impl TableState {
    /// 玩家入座，游戏进行中加入的玩家等待下一局
    pub fn join(&mut self, player_id: PlayerId, nickname: &str, wallet: Wallet) -> Events {
        let nickname = nickname.trim();
        let len = nickname.chars().count();
        if len == 0 || len > MAX_NICKNAME_LEN {
            return Err(TableError::InvalidNickname { max: MAX_NICKNAME_LEN });
        }
        if self.seats.contains_key(&player_id) {
            return Err(TableError::AlreadySeated);
        }
        if self.seats.len() >= self.settings.max_players {
            return Err(TableError::TableFull);
        }

        let seat = PlayerSeat::new(player_id, nickname.to_string(), wallet, self.settings.chip_kind);
        self.seats.insert(player_id, seat);
        self.seat_order.push(player_id);
        info!("玩家 {} 入座桌子 {}", player_id, self.table_id);

        Ok(vec![ServerMessage::PlayerJoined { player_id, nickname: nickname.to_string() }])
    }

    /// 玩家离开桌子
    ///
    /// 未被结算的种子金退回给玩家，余额需要写回外部存储。
    /// 如果离开后只剩一名参与者，该玩家直接获胜。
    pub fn leave<R: Rng + ?Sized>(&mut self, player_id: PlayerId, rewards: &RoundRewards, rng: &mut R) -> Events {
        let mut seat = self.seats.remove(&player_id).ok_or(TableError::PlayerNotFound)?;
        let was_playing = seat.is_playing() && self.phase != TablePhase::Waiting;

        seat.chips += seat.payment.chips;
        seat.payment = SeedPayment::default();
        seat.wallet.set(self.settings.chip_kind, seat.chips);

        self.seat_order.retain(|id| *id != player_id);
        self.reroll_offers.remove(&player_id);
        self.betting_players.remove(&player_id);
        self.paytable.remove_player(&player_id);
        info!("玩家 {} 离开桌子 {}", player_id, self.table_id);

        let mut events = vec![
            ServerMessage::PlayerLeft { player_id },
            ServerMessage::BalancesSettled { balances: vec![(player_id, seat.wallet)] },
        ];

        if self.seats.is_empty() {
            self.reset_for_new_game();
            return Ok(events);
        }

        match self.phase {
            TablePhase::Waiting => events.extend(self.try_start_game(rng)),
            _ if !was_playing => {}
            _ => {
                if let Some(settled) = self.settle_if_last_player() {
                    events.extend(settled);
                } else if self.phase == TablePhase::Playing && self.all_submitted() {
                    events.extend(self.resolve_round(rewards, rng));
                } else if self.phase == TablePhase::Shop && self.all_next_round_ready() {
                    events.extend(self.start_round(rng));
                }
            }
        }
        Ok(events)
    }

    /// 准备开始新的一局，全部玩家准备且人数足够时开始
    pub fn mark_ready<R: Rng + ?Sized>(&mut self, player_id: PlayerId, rng: &mut R) -> Events {
        if self.phase != TablePhase::Waiting {
            return Err(TableError::WrongPhase);
        }
        let seat = self.seats.get_mut(&player_id).ok_or(TableError::PlayerNotFound)?;
        seat.ready = true;

        let mut events = vec![ServerMessage::PlayerReady { player_id }];
        events.extend(self.try_start_game(rng));
        Ok(events)
    }

    fn try_start_game<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<ServerMessage> {
        if self.seats.len() < MIN_PLAYERS || !self.seats.values().all(|s| s.ready) {
            return vec![];
        }

        // 新的一局：清空牌型表、排除集合和所有玩家的局内数据
        self.reset_for_new_game();
        for seat in self.seats.values_mut() {
            seat.status = SeatStatus::Playing;
        }
        info!("桌子 {} 开始新的一局，玩家 {:?}", self.table_id, self.seat_order);

        let mut events = vec![ServerMessage::GameStarted { seat_order: self.seat_order.clone() }];
        events.extend(self.start_round(rng));
        events
    }

    /// 开始一个回合：发牌、生成商店、收取种子金
    fn start_round<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<ServerMessage> {
        let participants = if self.round == 1 { self.seat_order.clone() } else { self.playing_players() };

        let catalog = Arc::clone(&self.catalog);
        self.shop_offer = generate_shop_offer(&catalog, self.round, &self.settings.shop_overrides, &mut self.seen_jokers, rng);
        self.consumable_offer = generate_consumable_offer(&catalog, rng);
        self.reroll_offers.clear();

        let betting_amount = if self.round > 1 { self.current_betting_amount } else { 0 };
        self.betting_pot = 0;

        let mut seat_events = Vec::new();
        for id in &participants {
            let Some(seat) = self.seats.get_mut(id) else { continue };

            let mut deck = match seat.modified_deck.take() {
                Some(mut modified) => {
                    shuffle_deck(&mut modified, rng);
                    modified
                }
                None => shuffled_deck(rng),
            };
            seat.hand = deal(&mut deck, HAND_SIZE);
            seat.deck_total = deck.len() + seat.hand.len();
            seat.deck = deck;
            seat.discards_used = 0;
            seat.submitted_play = None;
            seat.next_round_ready = false;
            seat.status = SeatStatus::Playing;

            let paid = if self.round == 1 {
                seat.funds = 0;
                SeedPayment { chips: self.settings.seed_amount.min(seat.chips).max(0), funds: 0 }
            } else {
                SeedPayment {
                    chips: betting_amount.min(seat.chips).max(0),
                    funds: self.settings.funds_ante.min(seat.funds).max(0),
                }
            };
            seat.chips -= paid.chips;
            seat.funds -= paid.funds;
            seat.payment.chips += paid.chips;
            seat.payment.funds += paid.funds;
            if self.round > 1 {
                self.betting_pot += paid.chips;
            }

            seat_events.push(ServerMessage::HandDealt { player_id: *id, hand: seat.hand.clone(), deck_remaining: seat.deck.len() });
            seat_events.push(ServerMessage::SeedCollected { player_id: *id, paid, payment: seat.payment, chips: seat.chips });
        }

        self.current_betting_amount = 0;
        self.betting_players.clear();
        self.phase = TablePhase::Playing;
        debug!("桌子 {} 第 {} 回合开始，奖金上限 {}", self.table_id, self.round, self.round_max_prize());

        let mut events = vec![ServerMessage::RoundStarted {
            round: self.round,
            participants,
            round_max_prize: self.round_max_prize(),
        }];
        events.extend(seat_events);
        events
    }

    /// 弃牌并从牌堆补牌，每回合最多 4 次
    pub fn submit_discard(&mut self, player_id: PlayerId, card_ids: &[u32]) -> Events {
        let seat = self.active_seat(player_id, TablePhase::Playing)?;
        if seat.submitted_play.is_some() {
            return Err(TableError::AlreadySubmitted);
        }
        if seat.remaining_discards() == 0 {
            return Err(TableError::NoDiscardsLeft);
        }
        if card_ids.is_empty() || card_ids.len() > HAND_SIZE {
            return Err(TableError::InvalidCardCount(card_ids.len()));
        }
        select_cards(&seat.hand, card_ids, TableError::CardNotInHand)?;

        let seat = self.seat_mut(player_id)?;
        seat.hand.retain(|c| !card_ids.contains(&c.id));
        let drawn = deal(&mut seat.deck, card_ids.len());
        seat.hand.extend(drawn);
        seat.discards_used += 1;

        let remaining_discards = seat.remaining_discards();
        Ok(vec![
            ServerMessage::PlayerDiscarded { player_id, count: card_ids.len(), remaining_discards },
            ServerMessage::HandUpdated { player_id, hand: seat.hand.clone(), remaining_discards },
        ])
    }

    /// 提交本回合的出牌，所有参与者都提交后立即结算
    pub fn submit_play<R: Rng + ?Sized>(&mut self, player_id: PlayerId, card_ids: &[u32], rewards: &RoundRewards, rng: &mut R) -> Events {
        let seat = self.active_seat(player_id, TablePhase::Playing)?;
        if seat.submitted_play.is_some() {
            return Err(TableError::AlreadySubmitted);
        }
        if card_ids.is_empty() || card_ids.len() > HAND_SIZE {
            return Err(TableError::InvalidCardCount(card_ids.len()));
        }
        let played = select_cards(&seat.hand, card_ids, TableError::CardNotInHand)?;

        self.seat_mut(player_id)?.submitted_play = Some(played);
        let mut events = vec![ServerMessage::PlaySubmitted { player_id }];
        if self.all_submitted() {
            events.extend(self.resolve_round(rewards, rng));
        }
        Ok(events)
    }

    /// 结算回合：计分、分配种子金、发放资金奖励，然后进入商店或结束游戏
    fn resolve_round<R: Rng + ?Sized>(&mut self, rewards: &RoundRewards, rng: &mut R) -> Vec<ServerMessage> {
        let participants = self.playing_players();
        let catalog = Arc::clone(&self.catalog);

        // 1. 计分
        let mut scored: Vec<(PlayerId, Vec<Card>, Option<ScoreOutcome>)> = Vec::with_capacity(participants.len());
        for id in &participants {
            let Some(seat) = self.seats.get_mut(id) else { continue };
            let played = seat.submitted_play.clone().unwrap_or_default();
            let paytable = self.paytable.player(*id);

            let outcome = match evaluate_hand(&played, &seat.hand, paytable) {
                Some(evaluation) => {
                    paytable.enhance_count(evaluation.category);
                    let round = RoundContext {
                        remaining_deck: &seat.deck,
                        deck_total: seat.deck_total,
                        remaining_discards: seat.remaining_discards(),
                    };
                    Some(score_hand(&evaluation, &mut seat.jokers, paytable, &catalog, &round, rng))
                }
                None => None,
            };
            scored.push((*id, played, outcome));
        }

        let score_of = |outcome: &Option<ScoreOutcome>| outcome.as_ref().map_or(0, |o| o.score);

        // 2. 赢家：得分 > 0 中的最高分，可以并列
        let best = scored.iter().map(|(_, _, o)| score_of(o)).filter(|s| *s > 0).max();
        let winners: Vec<PlayerId> = match best {
            Some(best) => scored.iter().filter(|(_, _, o)| score_of(o) == best).map(|(id, _, _)| *id).collect(),
            None => vec![],
        };

        // 3. 种子金结算
        let payments: Vec<(PlayerId, SeedPayment)> = scored
            .iter()
            .filter_map(|(id, _, _)| self.seats.get(id).map(|s| (*id, s.payment)))
            .collect();
        let shares = distribute(&payments, &winners, self.round_max_prize());

        // 4. 名次（同分同名次）
        let mut distinct_scores: Vec<i64> = scored.iter().map(|(_, _, o)| score_of(o)).collect();
        distinct_scores.sort_unstable_by(|a, b| b.cmp(a));
        distinct_scores.dedup();

        let mut results = Vec::with_capacity(scored.len());
        for ((id, played, outcome), share) in scored.into_iter().zip(shares) {
            let Some(seat) = self.seats.get_mut(&id) else { continue };
            seat.chips += share.gain.chips;
            seat.funds += share.gain.funds;
            seat.payment.chips -= share.consumed.chips;
            seat.payment.funds -= share.consumed.funds;

            let score = score_of(&outcome);
            let placement = distinct_scores.iter().position(|s| *s == score).map_or(0, |p| p + 1);
            let discard_bonus = seat.remaining_discards() as i64 * rewards.discard_bonus;
            let placement_bonus = rewards.placement_bonus(self.round, placement);
            seat.funds += discard_bonus + placement_bonus;

            results.push(RoundResult {
                player_id: id,
                played,
                category: outcome.as_ref().map(|o| o.category),
                chips: outcome.as_ref().map_or(0.0, |o| o.chips),
                multiplier: outcome.as_ref().map_or(0.0, |o| o.multiplier),
                score,
                triggered: outcome.map(|o| o.triggered).unwrap_or_default(),
                pot_gain: share.gain,
                discard_bonus,
                placement,
                placement_bonus,
                chips_after: seat.chips,
                funds_after: seat.funds,
            });
        }

        info!("桌子 {} 第 {} 回合结算完成，赢家 {:?}", self.table_id, self.round, winners);
        let mut events = vec![ServerMessage::RoundResolved {
            round: self.round,
            results,
            winners,
            shop_offer: self.shop_offer.clone(),
            consumable_offer: self.consumable_offer.clone(),
        }];

        if self.round >= MAX_ROUNDS {
            events.extend(self.end_game());
        } else {
            self.round += 1;
            self.phase = TablePhase::Shop;
        }
        events
    }

    /// 第 5 回合结束：退回未结算的种子金，写回余额，回到等待阶段
    fn end_game(&mut self) -> Vec<ServerMessage> {
        let chip_kind = self.settings.chip_kind;
        let mut final_chips = Vec::with_capacity(self.seat_order.len());
        let mut balances = Vec::with_capacity(self.seat_order.len());
        for id in &self.seat_order {
            let Some(seat) = self.seats.get_mut(id) else { continue };
            seat.chips += seat.payment.chips;
            seat.payment = SeedPayment::default();
            seat.wallet.set(chip_kind, seat.chips);
            final_chips.push((*id, seat.chips));
            balances.push((*id, seat.wallet));
        }
        info!("桌子 {} 游戏结束", self.table_id);
        self.reset_for_new_game();
        vec![ServerMessage::GameEnded { final_chips }, ServerMessage::BalancesSettled { balances }]
    }

    /// 只剩一名参与者时，该玩家拿走桌上所有的种子金并结束本局
    fn settle_if_last_player(&mut self) -> Option<Vec<ServerMessage>> {
        let playing = self.playing_players();
        match playing.len() {
            0 => {
                self.reset_for_new_game();
                Some(vec![ServerMessage::GameEnded { final_chips: vec![] }])
            }
            1 => {
                let winner = playing[0];
                let total: i64 = self.seats.values().map(|s| s.payment.chips).sum();
                for seat in self.seats.values_mut() {
                    seat.payment = SeedPayment::default();
                }
                let chips = match self.seats.get_mut(&winner) {
                    Some(seat) => {
                        seat.chips += total;
                        seat.chips
                    }
                    None => 0,
                };
                info!("桌子 {} 只剩玩家 {}，获得 {} 筹码", self.table_id, winner, total);

                let mut events = vec![ServerMessage::LastPlayerWon { player_id: winner, chips_reward: total, chips }];
                events.extend(self.end_game());
                Some(events)
            }
            _ => None,
        }
    }

    /// 商店阶段准备下一回合
    pub fn mark_next_round_ready<R: Rng + ?Sized>(&mut self, player_id: PlayerId, rng: &mut R) -> Events {
        self.active_seat(player_id, TablePhase::Shop)?;
        self.seat_mut(player_id)?.next_round_ready = true;

        let mut events = vec![ServerMessage::NextRoundReady { player_id }];
        if self.all_next_round_ready() {
            events.extend(self.start_round(rng));
        }
        Ok(events)
    }

    // --- 商店 ---

    pub fn buy_card(&mut self, player_id: PlayerId, card_id: &str) -> Events {
        let seat = self.active_seat(player_id, TablePhase::Shop)?;
        let in_offer = self.shop_offer.iter().any(|c| c == card_id)
            || self.consumable_offer.iter().any(|c| c == card_id)
            || self.reroll_offers.get(&player_id).is_some_and(|o| o.iter().any(|c| c == card_id));
        if !in_offer {
            return Err(TableError::CardNotInShop(card_id.to_string()));
        }
        let def = self.catalog.get(card_id).cloned().ok_or_else(|| TableError::UnknownCard(card_id.to_string()))?;
        if seat.funds < def.price {
            return Err(TableError::InsufficientFunds { needed: def.price, available: seat.funds });
        }
        match def.kind {
            SpecialCardKind::Joker => {
                if seat.jokers.iter().any(|j| j.id == card_id) {
                    return Err(TableError::DuplicateJoker);
                }
                if self.seats.values().any(|s| s.id != player_id && s.jokers.iter().any(|j| j.id == card_id)) {
                    return Err(TableError::JokerOwnedElsewhere);
                }
                if seat.jokers.len() >= MAX_JOKERS {
                    return Err(TableError::JokerSlotsFull);
                }
            }
            SpecialCardKind::Tarot if seat.tarots.len() >= MAX_TAROTS => return Err(TableError::TarotSlotsFull),
            _ => {}
        }

        let seat = self.seat_mut(player_id)?;
        seat.funds -= def.price;
        let funds = seat.funds;
        match def.kind {
            SpecialCardKind::Joker => seat.jokers.push(OwnedJoker::from_definition(&def)),
            SpecialCardKind::Tarot => seat.tarots.push(def.id.clone()),
            SpecialCardKind::Planet => {
                if let Some(category) = def.hand_category {
                    let paytable = self.paytable.player(player_id);
                    paytable.enhance_level(category);
                    paytable.enhance_chips(category, def.enhance_chips);
                    paytable.enhance_multiplier(category, def.enhance_mul);
                }
            }
        }

        self.shop_offer.retain(|c| c != card_id);
        self.consumable_offer.retain(|c| c != card_id);
        for offer in self.reroll_offers.values_mut() {
            offer.retain(|c| c != card_id);
        }
        debug!("玩家 {} 购买了 {}", player_id, card_id);

        Ok(vec![ServerMessage::CardPurchased { player_id, card_id: card_id.to_string(), funds }])
    }

    /// 卖出小丑牌或塔罗牌，退还一半价格。卖出的小丑牌仍留在本局的排除集合中
    pub fn sell_card(&mut self, player_id: PlayerId, card_id: &str) -> Events {
        let seat = self.active_seat(player_id, TablePhase::Shop)?;
        let owns_joker = seat.jokers.iter().any(|j| j.id == card_id);
        let owns_tarot = seat.tarots.iter().any(|t| t == card_id);
        if !owns_joker && !owns_tarot {
            return Err(TableError::CardNotOwned(card_id.to_string()));
        }
        let refund = self.catalog.get(card_id).map_or(0, |d| d.price / 2);

        let seat = self.seat_mut(player_id)?;
        if owns_joker {
            seat.jokers.retain(|j| j.id != card_id);
        } else if let Some(pos) = seat.tarots.iter().position(|t| t == card_id) {
            seat.tarots.remove(pos);
        }
        seat.funds += refund;

        Ok(vec![ServerMessage::CardSold { player_id, card_id: card_id.to_string(), funds: seat.funds }])
    }

    /// 调整小丑牌顺序，影响复制左侧小丑牌的效果
    pub fn reorder_jokers(&mut self, player_id: PlayerId, order: &[String]) -> Events {
        let seat = self.seats.get(&player_id).ok_or(TableError::PlayerNotFound)?;
        if self.phase == TablePhase::Playing && seat.submitted_play.is_some() {
            return Err(TableError::AlreadySubmitted);
        }
        let mut current: Vec<&str> = seat.jokers.iter().map(|j| j.id.as_str()).collect();
        let mut requested: Vec<&str> = order.iter().map(String::as_str).collect();
        current.sort_unstable();
        requested.sort_unstable();
        if current != requested {
            return Err(TableError::InvalidJokerOrder);
        }

        let seat = self.seat_mut(player_id)?;
        let mut remaining = std::mem::take(&mut seat.jokers);
        for id in order {
            if let Some(pos) = remaining.iter().position(|j| &j.id == id) {
                seat.jokers.push(remaining.remove(pos));
            }
        }

        Ok(vec![ServerMessage::JokersReordered { player_id, order: order.to_vec() }])
    }

    /// 使用塔罗牌修改下回合的牌组
    ///
    /// 修改作用在玩家待用的牌组上（没有时为一副新牌），按牌的 id 定位。
    pub fn use_tarot<R: Rng + ?Sized>(&mut self, player_id: PlayerId, card_id: &str, selected: &[u32], rng: &mut R) -> Events {
        let seat = self.active_seat(player_id, TablePhase::Shop)?;
        if !seat.tarots.iter().any(|t| t == card_id) {
            return Err(TableError::CardNotOwned(card_id.to_string()));
        }
        let def = self.catalog.get(card_id).cloned().ok_or_else(|| TableError::UnknownCard(card_id.to_string()))?;
        let action = def.tarot_action.ok_or_else(|| TableError::UnknownCard(card_id.to_string()))?;

        let uses_selection = matches!(
            action,
            TarotAction::RankShift(_) | TarotAction::ChangeSuit(_) | TarotAction::Remove | TarotAction::Duplicate
        );
        let mut deck = seat.modified_deck.clone().unwrap_or_else(create_deck);
        if uses_selection {
            if selected.len() != def.need_card_count {
                return Err(TableError::WrongSelectionCount { expected: def.need_card_count, actual: selected.len() });
            }
            select_cards(&deck, selected, TableError::CardNotInDeck)?;
        }
        let planet = match action {
            TarotAction::RandomPlanet => {
                let planets: Vec<_> = self.catalog.active_of_kind(SpecialCardKind::Planet).cloned().collect();
                let planet = planets.choose(rng).cloned().ok_or_else(|| TableError::UnknownCard(card_id.to_string()))?;
                Some(planet)
            }
            _ => None,
        };

        let mut events = vec![ServerMessage::TarotUsed { player_id, card_id: card_id.to_string() }];
        match action {
            TarotAction::RankShift(delta) => {
                for card in deck.iter_mut().filter(|c| selected.contains(&c.id)) {
                    card.rank = ((card.rank as i16 - 1 + delta as i16).rem_euclid(MAX_RANK as i16) + 1) as u8;
                }
            }
            TarotAction::ChangeSuit(suit) => {
                for card in deck.iter_mut().filter(|c| selected.contains(&c.id)) {
                    card.suit = suit;
                }
            }
            TarotAction::RandomSuit => {
                let suit = *Suit::ALL.choose(rng).unwrap_or(&Suit::Spades);
                let indices: Vec<usize> = (0..deck.len()).collect();
                let chosen: Vec<usize> = indices.choose_multiple(rng, 5).copied().collect();
                for idx in chosen {
                    deck[idx].suit = suit;
                }
            }
            TarotAction::Remove => deck.retain(|c| !selected.contains(&c.id)),
            TarotAction::Duplicate => {
                if let Some(source_id) = selected.choose(rng) {
                    let next_id = deck.iter().map(|c| c.id).max().map_or(0, |m| m + 1);
                    if let Some(source) = deck.iter().find(|c| c.id == *source_id).copied() {
                        deck.push(Card::new(next_id, source.suit, source.rank));
                    }
                }
            }
            TarotAction::RandomPlanet => {}
        }

        if let Some(planet) = &planet {
            if let Some(category) = planet.hand_category {
                let paytable = self.paytable.player(player_id);
                paytable.enhance_level(category);
                paytable.enhance_chips(category, planet.enhance_chips);
                paytable.enhance_multiplier(category, planet.enhance_mul);
            }
            events.push(ServerMessage::Info { message: format!("获得行星牌效果: {}", planet.name) });
        }

        let seat = self.seat_mut(player_id)?;
        if let Some(pos) = seat.tarots.iter().position(|t| t == card_id) {
            seat.tarots.remove(pos);
        }
        if planet.is_none() {
            seat.modified_deck = Some(deck.clone());
            events.push(ServerMessage::DeckUpdated { player_id, deck });
        }
        Ok(events)
    }

    /// 下注：提高下一回合每名参与者追加的种子金
    pub fn place_bet(&mut self, player_id: PlayerId) -> Events {
        let seat = self.active_seat(player_id, TablePhase::Shop)?;
        if self.betting_players.contains(&player_id) {
            return Err(TableError::AlreadyBet);
        }
        if seat.chips <= 0 {
            return Err(TableError::InsufficientChips);
        }

        self.betting_players.insert(player_id);
        self.current_betting_amount += self.settings.betting_amount;
        Ok(vec![ServerMessage::BetPlaced { player_id, current_betting_amount: self.current_betting_amount }])
    }

    /// 商店阶段弃权，回到等待状态
    pub fn fold<R: Rng + ?Sized>(&mut self, player_id: PlayerId, rng: &mut R) -> Events {
        self.active_seat(player_id, TablePhase::Shop)?;
        let seat = self.seat_mut(player_id)?;
        seat.status = SeatStatus::Waiting;
        seat.next_round_ready = false;
        self.reroll_offers.remove(&player_id);
        self.betting_players.remove(&player_id);
        info!("玩家 {} 在桌子 {} 弃权", player_id, self.table_id);

        let mut events = vec![ServerMessage::PlayerFolded { player_id }];
        if let Some(settled) = self.settle_if_last_player() {
            events.extend(settled);
        } else if self.all_next_round_ready() {
            events.extend(self.start_round(rng));
        }
        Ok(events)
    }

    /// 刷新商店。同一商店阶段内结果会被缓存，再次刷新不收费
    pub fn reroll_shop<R: Rng + ?Sized>(&mut self, player_id: PlayerId, rng: &mut R) -> Events {
        let seat = self.active_seat(player_id, TablePhase::Shop)?;
        if let Some(cached) = self.reroll_offers.get(&player_id) {
            return Ok(vec![ServerMessage::ShopRerolled { player_id, offer: cached.clone(), funds: seat.funds }]);
        }
        let cost = self.settings.reroll_cost;
        if seat.funds < cost {
            return Err(TableError::InsufficientFunds { needed: cost, available: seat.funds });
        }

        let catalog = Arc::clone(&self.catalog);
        let (offer, charged) = reroll_offer(&mut self.reroll_offers, player_id, &catalog, self.round, &mut self.seen_jokers, rng);
        let seat = self.seat_mut(player_id)?;
        if charged {
            seat.funds -= cost;
        }
        Ok(vec![ServerMessage::ShopRerolled { player_id, offer, funds: seat.funds }])
    }

    /// 重置为新一局的初始状态，桌子设置保持不变
    pub fn reset_for_new_game(&mut self) {
        self.phase = TablePhase::Waiting;
        self.round = 1;
        self.shop_offer.clear();
        self.consumable_offer.clear();
        self.reroll_offers.clear();
        self.seen_jokers.clear();
        self.betting_players.clear();
        self.current_betting_amount = 0;
        self.betting_pot = 0;
        self.paytable.reset_all_user_data();
        for seat in self.seats.values_mut() {
            seat.reset_for_new_game();
        }
    }

    // --- 辅助函数 ---

    /// 校验阶段和玩家状态，返回玩家座位
    fn active_seat(&self, player_id: PlayerId, phase: TablePhase) -> Result<&PlayerSeat, TableError> {
        let seat = self.seats.get(&player_id).ok_or(TableError::PlayerNotFound)?;
        if self.phase != phase {
            return Err(TableError::WrongPhase);
        }
        if !seat.is_playing() {
            return Err(TableError::NotPlaying);
        }
        Ok(seat)
    }

    fn seat_mut(&mut self, player_id: PlayerId) -> Result<&mut PlayerSeat, TableError> {
        self.seats.get_mut(&player_id).ok_or(TableError::PlayerNotFound)
    }

    fn all_submitted(&self) -> bool {
        let playing = self.playing_players();
        !playing.is_empty() && playing.iter().all(|id| self.seats[id].submitted_play.is_some())
    }

    fn all_next_round_ready(&self) -> bool {
        let playing = self.playing_players();
        !playing.is_empty() && playing.iter().all(|id| self.seats[id].next_round_ready)
    }
}

/// 按 id 从牌组中取出选中的牌，id 不能重复
fn select_cards(cards: &[Card], ids: &[u32], missing: fn(u32) -> TableError) -> Result<Vec<Card>, TableError> {
    let unique: HashSet<u32> = ids.iter().copied().collect();
    if unique.len() != ids.len() {
        return Err(TableError::DuplicateCards);
    }
    ids.iter()
        .map(|id| cards.iter().find(|c| c.id == *id).copied().ok_or_else(|| missing(*id)))
        .collect()
}

// --- 单元测试 ---
