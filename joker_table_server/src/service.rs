use crate::config::ServerConfig;
use crate::error::ServiceError;
use crate::services::{BalanceStore, CardCatalogSource, MembershipDirectory, RewardSettingsSource};
use crate::store::{PlayerConnection, TableStore};
use dashmap::DashMap;
use joker_table_core::{
    CardCatalog, ChipKind, ClientMessage, PlayerId, RoundRewards, ServerMessage, TableError, TableId, TableState, Wallet,
};
use parking_lot::RwLock;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// 玩家操作的入口
///
/// 外部 I/O（读余额、读奖励设置、写回余额）都在牌桌锁之外完成，
/// 状态修改在一次加锁内完成，锁不会跨越 await。
pub struct TableService {
    config: ServerConfig,
    store: TableStore,
    balances: Arc<dyn BalanceStore>,
    rewards: Arc<dyn RewardSettingsSource>,
    catalog_source: Arc<dyn CardCatalogSource>,
    catalog: RwLock<Arc<CardCatalog>>,
    // 写回失败、等待重试的余额
    pending_balances: DashMap<PlayerId, Wallet>,
}

impl TableService {
    pub async fn new(
        config: ServerConfig,
        balances: Arc<dyn BalanceStore>,
        rewards: Arc<dyn RewardSettingsSource>,
        catalog_source: Arc<dyn CardCatalogSource>,
    ) -> Result<Self, ServiceError> {
        let catalog = catalog_source.load_card_definitions().await?;
        info!("载入卡牌目录，共 {} 张", catalog.len());
        Ok(TableService {
            config,
            store: TableStore::default(),
            balances,
            rewards,
            catalog_source,
            catalog: RwLock::new(Arc::new(catalog)),
            pending_balances: DashMap::new(),
        })
    }

    #[cfg(test)]
    pub fn store(&self) -> &TableStore {
        &self.store
    }

    pub fn catalog(&self) -> Arc<CardCatalog> {
        Arc::clone(&self.catalog.read())
    }

    /// 玩家入座，桌子不存在时创建
    ///
    /// 成功后先私密发送 TableJoined，再把入座消息和新的快照推送给桌上所有人。
    pub async fn join(
        &self,
        table_id: TableId,
        player_id: PlayerId,
        nickname: &str,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), ServiceError> {
        // 先占用在线记录，同一玩家不能同时加入两张桌子
        if !self.store.reserve_online(player_id, table_id) {
            return Err(ServiceError::AlreadyInTable);
        }
        let result = self.seat(table_id, player_id, nickname, sender).await;
        if result.is_err() {
            self.store.set_offline(&player_id);
        }
        result
    }

    async fn seat(
        &self,
        table_id: TableId,
        player_id: PlayerId,
        nickname: &str,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), ServiceError> {
        // 还没写回的余额比存储中的更新
        let pending = self.pending_balances.get(&player_id).map(|w| *w);
        let wallet = match pending {
            Some(pending) => pending,
            None => self.balances.get_balance(player_id).await?,
        };

        let (table, seated) = self.store.seat_player(table_id, self.config.table_settings(), self.catalog(), |state| {
            let mut events = state.join(player_id, nickname, wallet)?;
            events.push(ServerMessage::TableSnapshot(state.clone()));
            Ok((events, state.for_client(&player_id)))
        });
        let (events, snapshot) = seated?;
        table.members.write().await.insert(player_id, PlayerConnection { sender: sender.clone() });

        info!("玩家 {} 加入了桌子 {}", player_id, table_id);
        let _ = sender.send(ServerMessage::TableJoined { your_id: player_id, table: snapshot }).await;
        table.deliver(events).await;
        Ok(())
    }

    /// 执行一次玩家操作并把结果推送给桌上的玩家
    ///
    /// 状态已经修改但余额写回失败时返回 Upstream 错误，余额留待下次重试。
    pub async fn perform(&self, table_id: TableId, player_id: PlayerId, action: ClientMessage) -> Result<(), ServiceError> {
        let table = self.store.get(&table_id).ok_or(ServiceError::TableNotFound)?;
        let leaving = matches!(action, ClientMessage::LeaveTable);
        let rewards = match action {
            ClientMessage::SubmitPlay { .. } | ClientMessage::LeaveTable => self.round_rewards().await,
            _ => RoundRewards::default(),
        };

        let events = {
            let mut state = table.state.lock();
            let mut rng = rand::rng();
            let mut events = apply(&mut state, player_id, action, &rewards, &mut rng)?;
            // 每次状态变化后推送快照，发送时按玩家净化
            events.push(ServerMessage::TableSnapshot(state.clone()));
            events
        };
        table.deliver(events.clone()).await;

        if leaving {
            table.members.write().await.remove(&player_id);
            self.store.set_offline(&player_id);
            if self.store.list_members(table_id).await.is_empty() {
                self.store.remove_if_empty(&table_id);
            }
        }
        self.settle(&events).await
    }

    /// 连接断开时按离开桌子处理
    pub async fn disconnect(&self, table_id: TableId, player_id: PlayerId) {
        info!("玩家 {} 从桌子 {} 断开连接", player_id, table_id);
        if let Err(e) = self.perform(table_id, player_id, ClientMessage::LeaveTable).await {
            warn!("玩家 {} 断开后离桌失败: {}", player_id, e);
            // 保证连接信息被清理
            self.store.set_offline(&player_id);
        }
    }

    /// 重试之前写回失败的余额
    pub async fn retry_settlements(&self) -> Result<(), ServiceError> {
        self.settle(&[]).await
    }

    /// 重新载入卡牌目录并替换所有桌子使用的目录，失败时保留旧目录
    pub async fn refresh_catalog(&self) -> Result<usize, ServiceError> {
        let catalog = Arc::new(self.catalog_source.load_card_definitions().await?);
        let count = catalog.len();
        *self.catalog.write() = Arc::clone(&catalog);
        self.store.set_catalog(catalog);
        info!("卡牌目录已刷新，共 {} 张", count);
        Ok(count)
    }

    /// 离线调整玩家余额，在线玩家的余额由牌桌管理，不允许修改
    pub async fn adjust_balance(&self, player_id: PlayerId, kind: ChipKind, delta: i64) -> Result<Wallet, ServiceError> {
        if self.store.is_online(player_id).await {
            return Err(ServiceError::PlayerOnline);
        }
        let mut wallet = self.balances.get_balance(player_id).await?;
        let amount = wallet.get(kind) + delta;
        if amount < 0 {
            return Err(TableError::InsufficientChips.into());
        }
        wallet.set(kind, amount);
        self.balances.set_balance(player_id, wallet).await?;
        info!("玩家 {} 的余额调整为 {:?}", player_id, wallet);
        Ok(wallet)
    }

    async fn round_rewards(&self) -> RoundRewards {
        match self.rewards.round_rewards().await {
            Ok(rewards) => rewards,
            Err(e) => {
                warn!("读取奖励设置失败，使用默认值: {}", e);
                RoundRewards::default()
            }
        }
    }

    /// 把结算消息中的余额写回外部存储
    async fn settle(&self, events: &[ServerMessage]) -> Result<(), ServiceError> {
        for event in events {
            if let ServerMessage::BalancesSettled { balances } = event {
                for (player_id, wallet) in balances {
                    self.pending_balances.insert(*player_id, *wallet);
                }
            }
        }

        let pending: Vec<(PlayerId, Wallet)> = self.pending_balances.iter().map(|e| (*e.key(), *e.value())).collect();
        let mut failure = None;
        for (player_id, wallet) in pending {
            match self.balances.set_balance(player_id, wallet).await {
                Ok(()) => {
                    self.pending_balances.remove_if(&player_id, |_, w| *w == wallet);
                }
                Err(e) => {
                    error!("写回玩家 {} 的余额失败: {}", player_id, e);
                    failure.get_or_insert(e);
                }
            }
        }
        failure.map_or(Ok(()), Err)
    }
}

/// 把客户端消息分发到牌桌状态机
fn apply<R: Rng + ?Sized>(
    state: &mut TableState,
    player_id: PlayerId,
    action: ClientMessage,
    rewards: &RoundRewards,
    rng: &mut R,
) -> Result<Vec<ServerMessage>, ServiceError> {
    let events = match action {
        ClientMessage::JoinTable { .. } => return Err(ServiceError::AlreadyInTable),
        ClientMessage::LeaveTable => state.leave(player_id, rewards, rng)?,
        ClientMessage::MarkReady => state.mark_ready(player_id, rng)?,
        ClientMessage::SubmitDiscard { cards } => state.submit_discard(player_id, &cards)?,
        ClientMessage::SubmitPlay { cards } => state.submit_play(player_id, &cards, rewards, rng)?,
        ClientMessage::MarkNextRoundReady => state.mark_next_round_ready(player_id, rng)?,
        ClientMessage::BuyCard { card_id } => state.buy_card(player_id, &card_id)?,
        ClientMessage::SellCard { card_id } => state.sell_card(player_id, &card_id)?,
        ClientMessage::ReorderJokers { order } => state.reorder_jokers(player_id, &order)?,
        ClientMessage::UseTarot { card_id, selected } => state.use_tarot(player_id, &card_id, &selected, rng)?,
        ClientMessage::PlaceBet => state.place_bet(player_id)?,
        ClientMessage::Fold => state.fold(player_id, rng)?,
        ClientMessage::RerollShop => state.reroll_shop(player_id, rng)?,
    };
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{JsonCatalogSource, MemoryBalanceStore, StaticRewardSettings};
    use async_trait::async_trait;
    use joker_table_core::{ErrorKind, SpecialCardKind, TablePhase};
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    /// 可以模拟写入失败的余额存储
    struct FlakyBalanceStore {
        inner: MemoryBalanceStore,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl BalanceStore for FlakyBalanceStore {
        async fn get_balance(&self, player_id: PlayerId) -> Result<Wallet, ServiceError> {
            self.inner.get_balance(player_id).await
        }

        async fn set_balance(&self, player_id: PlayerId, wallet: Wallet) -> Result<(), ServiceError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(ServiceError::Upstream("balance store offline".into()));
            }
            self.inner.set_balance(player_id, wallet).await
        }
    }

    /// 可以替换内容的卡牌目录来源
    struct SwappableCatalog {
        catalog: parking_lot::Mutex<CardCatalog>,
    }

    #[async_trait]
    impl CardCatalogSource for SwappableCatalog {
        async fn load_card_definitions(&self) -> Result<CardCatalog, ServiceError> {
            Ok(self.catalog.lock().clone())
        }
    }

    async fn setup_service() -> (TableService, Arc<FlakyBalanceStore>) {
        let store = Arc::new(FlakyBalanceStore {
            inner: MemoryBalanceStore::new(Wallet { primary: 1000, secondary: 0 }),
            fail_writes: AtomicBool::new(false),
        });
        let service = TableService::new(
            ServerConfig::default(),
            store.clone(),
            Arc::new(StaticRewardSettings::default()),
            Arc::new(JsonCatalogSource::new(None)),
        )
        .await
        .unwrap();
        (service, store)
    }

    async fn join(service: &TableService, table_id: TableId, name: &str) -> (PlayerId, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(256);
        let id = Uuid::new_v4();
        service.join(table_id, id, name, tx).await.unwrap();
        (id, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = vec![];
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_join_and_start_game() {
        let (service, _) = setup_service().await;
        let table_id = Uuid::new_v4();
        let (a, mut rx_a) = join(&service, table_id, "alice").await;
        let (b, mut rx_b) = join(&service, table_id, "bob").await;

        service.perform(table_id, a, ClientMessage::MarkReady).await.unwrap();
        service.perform(table_id, b, ClientMessage::MarkReady).await.unwrap();

        let seen_a = drain(&mut rx_a);
        assert!(matches!(seen_a[0], ServerMessage::TableJoined { your_id, .. } if your_id == a));
        assert!(seen_a.iter().any(|m| matches!(m, ServerMessage::GameStarted { .. })));
        let hands: Vec<PlayerId> = seen_a
            .iter()
            .filter_map(|m| match m {
                ServerMessage::HandDealt { player_id, .. } => Some(*player_id),
                _ => None,
            })
            .collect();
        assert_eq!(hands, vec![a]);

        let seen_b = drain(&mut rx_b);
        assert!(seen_b.iter().any(|m| matches!(m, ServerMessage::HandDealt { player_id, .. } if *player_id == b)));
        let table = service.store().get(&table_id).unwrap();
        assert_eq!(table.state.lock().phase, TablePhase::Playing);
    }

    #[tokio::test]
    async fn test_snapshots_follow_state_changes() {
        let (service, _) = setup_service().await;
        let table_id = Uuid::new_v4();
        let (a, mut rx_a) = join(&service, table_id, "alice").await;
        let (b, mut rx_b) = join(&service, table_id, "bob").await;

        // alice 看到 bob 入座后的快照
        let last_snapshot = |seen: &[ServerMessage]| {
            seen.iter()
                .rev()
                .find_map(|m| match m {
                    ServerMessage::TableSnapshot(view) => Some(view.clone()),
                    _ => None,
                })
                .expect("a snapshot after every change")
        };
        assert!(last_snapshot(&drain(&mut rx_a)).seats.contains_key(&b));

        service.perform(table_id, a, ClientMessage::MarkReady).await.unwrap();
        service.perform(table_id, b, ClientMessage::MarkReady).await.unwrap();
        for (me, other, rx) in [(a, b, &mut rx_a), (b, a, &mut rx_b)] {
            let view = last_snapshot(&drain(rx));
            assert_eq!(view.phase, TablePhase::Playing);
            assert_eq!(view.seats[&me].hand.len(), 8);
            assert!(view.seats[&other].hand.is_empty());
        }
    }

    #[tokio::test]
    async fn test_same_player_cannot_join_two_tables() {
        let (service, _) = setup_service().await;
        let player = Uuid::new_v4();
        let (tx1, _rx1) = mpsc::channel(16);
        let (tx2, _rx2) = mpsc::channel(16);
        let (first, second) = tokio::join!(
            service.join(Uuid::new_v4(), player, "alice", tx1),
            service.join(Uuid::new_v4(), player, "alice", tx2),
        );
        assert_eq!([first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert!(matches!(first.err().or(second.err()), Some(ServiceError::AlreadyInTable)));
    }

    #[tokio::test]
    async fn test_failed_join_releases_player() {
        let (service, _) = setup_service().await;
        let (tx, _rx) = mpsc::channel(16);
        let player = Uuid::new_v4();
        let table_id = Uuid::new_v4();
        let err = service.join(table_id, player, "   ", tx.clone()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!service.store().is_online(player).await);
        assert!(service.store().get(&table_id).is_none());

        service.join(table_id, player, "alice", tx).await.unwrap();
        assert!(service.store().is_online(player).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_join_racing_last_leave_keeps_table() {
        let (service, _) = setup_service().await;
        let service = Arc::new(service);
        for _ in 0..50 {
            let table_id = Uuid::new_v4();
            let (a, _rx_a) = join(&service, table_id, "alice").await;

            let leaver = {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.perform(table_id, a, ClientMessage::LeaveTable).await })
            };
            let b = Uuid::new_v4();
            let (tx, _rx_b) = mpsc::channel(64);
            let joiner = {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.join(table_id, b, "bob", tx).await })
            };
            leaver.await.unwrap().unwrap();
            joiner.await.unwrap().unwrap();

            // bob 所在的桌子仍然登记在册，后续操作能找到它
            let table = service.store().get(&table_id).expect("table with a seated player stays registered");
            assert!(table.state.lock().seats.contains_key(&b));
            service.perform(table_id, b, ClientMessage::LeaveTable).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_rejected_actions() {
        let (service, _) = setup_service().await;
        let table_id = Uuid::new_v4();
        let (a, _rx) = join(&service, table_id, "alice").await;

        let err = service.perform(Uuid::new_v4(), a, ClientMessage::MarkReady).await.unwrap_err();
        assert!(matches!(err, ServiceError::TableNotFound));

        let err = service.perform(table_id, a, ClientMessage::SubmitDiscard { cards: vec![1] }).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BusinessRule);
        assert!(matches!(err, ServiceError::Table(TableError::WrongPhase)));

        let (tx, _rx2) = mpsc::channel(8);
        let err = service.join(table_id, a, "again", tx).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyInTable));
    }

    #[tokio::test]
    async fn test_leave_flushes_balances_and_removes_table() {
        let (service, store) = setup_service().await;
        let table_id = Uuid::new_v4();
        let (a, _rx_a) = join(&service, table_id, "alice").await;
        let (b, _rx_b) = join(&service, table_id, "bob").await;
        service.perform(table_id, a, ClientMessage::MarkReady).await.unwrap();
        service.perform(table_id, b, ClientMessage::MarkReady).await.unwrap();

        // 种子金已经扣除，离开时退回
        service.perform(table_id, b, ClientMessage::LeaveTable).await.unwrap();
        assert_eq!(store.get_balance(b).await.unwrap().primary, 1000);
        // 剩下的玩家直接获胜，本局结束
        assert_eq!(store.get_balance(a).await.unwrap().primary, 1000);
        assert!(!service.store().is_online(b).await);

        service.perform(table_id, a, ClientMessage::LeaveTable).await.unwrap();
        assert!(service.store().get(&table_id).is_none());
    }

    #[tokio::test]
    async fn test_failed_flush_is_kept_for_retry() {
        let (service, store) = setup_service().await;
        let table_id = Uuid::new_v4();
        let (a, _rx) = join(&service, table_id, "alice").await;
        store.set_balance(a, Wallet { primary: 400, secondary: 0 }).await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        let err = service.perform(table_id, a, ClientMessage::LeaveTable).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(service.store().get(&table_id).is_none());

        store.fail_writes.store(false, Ordering::SeqCst);
        service.retry_settlements().await.unwrap();
        assert_eq!(store.get_balance(a).await.unwrap().primary, 1000);
    }

    #[tokio::test]
    async fn test_adjust_balance_refuses_online_players() {
        let (service, store) = setup_service().await;
        let table_id = Uuid::new_v4();
        let (a, _rx) = join(&service, table_id, "alice").await;

        let err = service.adjust_balance(a, ChipKind::Primary, 50).await.unwrap_err();
        assert!(matches!(err, ServiceError::PlayerOnline));

        service.perform(table_id, a, ClientMessage::LeaveTable).await.unwrap();
        let wallet = service.adjust_balance(a, ChipKind::Secondary, 30).await.unwrap();
        assert_eq!(wallet, Wallet { primary: 1000, secondary: 30 });
        assert_eq!(store.get_balance(a).await.unwrap(), wallet);
        assert!(service.adjust_balance(a, ChipKind::Secondary, -31).await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_catalog_updates_live_tables() {
        let builtin = CardCatalog::builtin().unwrap();
        let source = Arc::new(SwappableCatalog { catalog: parking_lot::Mutex::new(builtin.clone()) });
        let service = TableService::new(
            ServerConfig::default(),
            Arc::new(MemoryBalanceStore::new(Wallet::default())),
            Arc::new(StaticRewardSettings::default()),
            source.clone(),
        )
        .await
        .unwrap();
        let table_id = Uuid::new_v4();
        let (_a, _rx) = join(&service, table_id, "alice").await;

        let jokers_only: Vec<_> = builtin.of_kind(SpecialCardKind::Joker).take(3).cloned().collect();
        *source.catalog.lock() = CardCatalog::new(jokers_only).unwrap();
        assert_eq!(service.refresh_catalog().await.unwrap(), 3);
        assert_eq!(service.catalog().len(), 3);
        let table = service.store().get(&table_id).unwrap();
        assert_eq!(table.state.lock().catalog.len(), 3);
    }
}
