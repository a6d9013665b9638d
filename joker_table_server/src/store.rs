use crate::services::MembershipDirectory;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use joker_table_core::{CardCatalog, PlayerId, ServerMessage, TableError, TableId, TableSettings, TableState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{info, warn};

// 单张桌子
// 重要‼️：严格规定使用锁的顺序，避免死锁：
// members -> state
// tables 分片锁 -> state（入座和移除空桌）
// state 是同步锁，持有期间不能 await
pub struct TableHandle {
    pub state: Mutex<TableState>,
    // 将 PlayerId 映射到具体的网络连接
    pub members: RwLock<HashMap<PlayerId, PlayerConnection>>,
}

// 玩家的网络连接信息
pub struct PlayerConnection {
    // 用于向该玩家的 WebSocket 任务发送消息的通道
    pub sender: mpsc::Sender<ServerMessage>,
}

/// 所有活跃的桌子，按 id 取用或创建
#[derive(Default)]
pub struct TableStore {
    tables: DashMap<TableId, Arc<TableHandle>>,
    // 在线玩家所在的桌子
    online: DashMap<PlayerId, TableId>,
}

impl TableStore {
    pub fn get(&self, table_id: &TableId) -> Option<Arc<TableHandle>> {
        self.tables.get(table_id).map(|t| t.clone())
    }

    /// 在桌子所在分片的写锁内入座，桌子不存在时创建
    ///
    /// 移除空桌也在同一把锁内检查座位，刚入座的桌子不会被移除。
    /// 入座失败时顺带移除新建的空桌。
    pub fn seat_player<T>(
        &self,
        table_id: TableId,
        settings: TableSettings,
        catalog: Arc<CardCatalog>,
        seat: impl FnOnce(&mut TableState) -> Result<T, TableError>,
    ) -> (Arc<TableHandle>, Result<T, TableError>) {
        let entry = self.tables.entry(table_id).or_insert_with(|| {
            info!("创建桌子 {}", table_id);
            Arc::new(TableHandle {
                state: Mutex::new(TableState::new(table_id, settings, catalog)),
                members: RwLock::new(HashMap::new()),
            })
        });
        let table = Arc::clone(&*entry);
        let result = {
            let mut state = table.state.lock();
            seat(&mut state)
        };
        drop(entry);

        if result.is_err() {
            self.remove_if_empty(&table_id);
        }
        (table, result)
    }

    /// 桌子上已经没有玩家时移除
    pub fn remove_if_empty(&self, table_id: &TableId) -> bool {
        let removed = self.tables.remove_if(table_id, |_, t| t.state.lock().seats.is_empty()).is_some();
        if removed {
            info!("桌子 {} 已空，已被移除", table_id);
        }
        removed
    }

    /// 替换所有桌子使用的卡牌目录
    pub fn set_catalog(&self, catalog: Arc<CardCatalog>) {
        for table in self.tables.iter() {
            table.state.lock().set_catalog(Arc::clone(&catalog));
        }
    }

    /// 占用玩家的在线记录，玩家已经在某张桌子上时返回 false
    pub fn reserve_online(&self, player_id: PlayerId, table_id: TableId) -> bool {
        match self.online.entry(player_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(table_id);
                true
            }
        }
    }

    pub fn set_offline(&self, player_id: &PlayerId) {
        self.online.remove(player_id);
    }
}

#[async_trait]
impl MembershipDirectory for TableStore {
    async fn list_members(&self, table_id: TableId) -> Vec<PlayerId> {
        match self.get(&table_id) {
            Some(table) => table.members.read().await.keys().copied().collect(),
            None => vec![],
        }
    }

    async fn is_online(&self, player_id: PlayerId) -> bool {
        self.online.contains_key(&player_id)
    }
}

impl TableHandle {
    /// 把状态机产生的消息发给桌上的玩家
    ///
    /// 私密消息只发给对应玩家，快照按玩家单独生成。
    pub async fn deliver(&self, messages: Vec<ServerMessage>) {
        let members = self.members.read().await;
        for msg in messages {
            match (&msg, msg.private_to()) {
                (_, Some(target)) => {
                    if let Some(conn) = members.get(&target) {
                        send(&target, conn, msg.clone()).await;
                    }
                }
                (ServerMessage::TableSnapshot(state), None) => {
                    for (pid, conn) in members.iter() {
                        send(pid, conn, ServerMessage::TableSnapshot(state.for_client(pid))).await;
                    }
                }
                _ => broadcast(members.iter(), &msg).await,
            }
        }
    }
}

async fn send(player_id: &PlayerId, conn: &PlayerConnection, msg: ServerMessage) {
    if conn.sender.send(msg).await.is_err() {
        // 发送失败，说明该玩家也断开了，后续由其自己的 handle_socket 任务处理
        warn!("向玩家 {} 发送消息失败（可能已断开）", player_id);
    }
}

/// 向桌上所有玩家广播消息
async fn broadcast(players: impl Iterator<Item = (&PlayerId, &PlayerConnection)>, message: &ServerMessage) {
    for (player_id, conn) in players {
        send(player_id, conn, message.clone()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use joker_table_core::{Card, Suit, Wallet};
    use uuid::Uuid;

    fn handle_with_members(n: usize) -> (Arc<TableHandle>, Vec<(PlayerId, mpsc::Receiver<ServerMessage>)>) {
        let store = TableStore::default();
        let table_id = Uuid::new_v4();
        let mut receivers = vec![];
        let mut table = None;
        for i in 0..n {
            let id = Uuid::new_v4();
            let (tx, rx) = mpsc::channel(8);
            let (handle, seated) = store.seat_player(table_id, TableSettings::default(), Arc::new(CardCatalog::default()), |state| {
                state.join(id, &format!("p{}", i), Wallet::default())
            });
            seated.unwrap();
            handle.members.try_write().unwrap().insert(id, PlayerConnection { sender: tx });
            receivers.push((id, rx));
            table = Some(handle);
        }
        (table.unwrap(), receivers)
    }

    #[tokio::test]
    async fn test_private_messages_reach_only_target() {
        let (table, mut receivers) = handle_with_members(2);
        let target = receivers[0].0;
        let hand = vec![Card::new(0, Suit::Clubs, 1)];
        table
            .deliver(vec![
                ServerMessage::HandDealt { player_id: target, hand, deck_remaining: 44 },
                ServerMessage::PlayerReady { player_id: target },
            ])
            .await;

        assert!(matches!(receivers[0].1.recv().await, Some(ServerMessage::HandDealt { .. })));
        assert!(matches!(receivers[0].1.recv().await, Some(ServerMessage::PlayerReady { .. })));
        assert!(matches!(receivers[1].1.recv().await, Some(ServerMessage::PlayerReady { .. })));
        assert!(receivers[1].1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_snapshots_are_personalized() {
        let (table, receivers) = handle_with_members(2);
        let mut receivers = receivers.into_iter();
        let (a, mut rx_a) = receivers.next().unwrap();
        let (b, mut rx_b) = receivers.next().unwrap();
        let snapshot = {
            let mut state = table.state.lock();
            for seat in state.seats.values_mut() {
                seat.hand = vec![Card::new(3, Suit::Hearts, 4)];
            }
            state.clone()
        };
        table.deliver(vec![ServerMessage::TableSnapshot(snapshot)]).await;

        for (me, other, rx) in [(a, b, &mut rx_a), (b, a, &mut rx_b)] {
            let Some(ServerMessage::TableSnapshot(view)) = rx.recv().await else { panic!("expected snapshot") };
            assert_eq!(view.seats[&me].hand.len(), 1);
            assert!(view.seats[&other].hand.is_empty());
        }
    }

    #[tokio::test]
    async fn test_store_lifecycle() {
        let store = TableStore::default();
        let id = Uuid::new_v4();
        let player = Uuid::new_v4();
        let seat = |name: &'static str, player: PlayerId| {
            move |state: &mut TableState| state.join(player, name, Wallet::default())
        };

        // 入座失败时不会留下空桌
        let (_, failed) = store.seat_player(id, TableSettings::default(), Arc::new(CardCatalog::default()), seat("   ", player));
        assert_eq!(failed.unwrap_err(), TableError::InvalidNickname { max: joker_table_core::MAX_NICKNAME_LEN });
        assert!(store.get(&id).is_none());

        let (table, seated) = store.seat_player(id, TableSettings::default(), Arc::new(CardCatalog::default()), seat("p", player));
        seated.unwrap();
        assert!(Arc::ptr_eq(&table, &store.get(&id).unwrap()));
        let other = Uuid::new_v4();
        let (again, _) = store.seat_player(id, TableSettings::default(), Arc::new(CardCatalog::default()), seat("q", other));
        assert!(Arc::ptr_eq(&table, &again));

        table.members.write().await.insert(player, PlayerConnection { sender: mpsc::channel(1).0 });
        assert!(store.reserve_online(player, id));
        assert!(!store.reserve_online(player, Uuid::new_v4()));
        assert_eq!(store.list_members(id).await, vec![player]);
        assert!(store.is_online(player).await);
        assert!(!store.remove_if_empty(&id));

        let mut rng = rand::rng();
        table.state.lock().leave(player, &Default::default(), &mut rng).unwrap();
        table.state.lock().leave(other, &Default::default(), &mut rng).unwrap();
        store.set_offline(&player);
        assert!(store.remove_if_empty(&id));
        assert!(store.get(&id).is_none());
        assert!(!store.is_online(player).await);
    }
}
