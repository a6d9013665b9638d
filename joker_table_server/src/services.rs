//! 外部协作者接口与内存/文件实现
//!
//! 牌桌只通过这些窄接口访问余额存储、卡牌目录和奖励设置，
//! 真正的数据库或编辑器可以替换这里的实现而不影响服务层。

use crate::error::ServiceError;
use async_trait::async_trait;
use dashmap::DashMap;
use joker_table_core::{CardCatalog, PlayerId, RoundRewards, TableId, Wallet};
use std::path::PathBuf;

/// 持久化的玩家余额
#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn get_balance(&self, player_id: PlayerId) -> Result<Wallet, ServiceError>;
    async fn set_balance(&self, player_id: PlayerId, wallet: Wallet) -> Result<(), ServiceError>;
}

/// 卡牌定义的来源
#[async_trait]
pub trait CardCatalogSource: Send + Sync {
    async fn load_card_definitions(&self) -> Result<CardCatalog, ServiceError>;
}

/// 回合奖励设置的来源
#[async_trait]
pub trait RewardSettingsSource: Send + Sync {
    async fn round_rewards(&self) -> Result<RoundRewards, ServiceError>;
}

/// 桌子成员与在线状态
#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    async fn list_members(&self, table_id: TableId) -> Vec<PlayerId>;
    async fn is_online(&self, player_id: PlayerId) -> bool;
}

/// 内存余额存储，未知玩家使用初始余额
pub struct MemoryBalanceStore {
    balances: DashMap<PlayerId, Wallet>,
    starting_balance: Wallet,
}

impl MemoryBalanceStore {
    pub fn new(starting_balance: Wallet) -> Self {
        MemoryBalanceStore { balances: DashMap::new(), starting_balance }
    }
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    async fn get_balance(&self, player_id: PlayerId) -> Result<Wallet, ServiceError> {
        Ok(*self.balances.entry(player_id).or_insert(self.starting_balance))
    }

    async fn set_balance(&self, player_id: PlayerId, wallet: Wallet) -> Result<(), ServiceError> {
        self.balances.insert(player_id, wallet);
        Ok(())
    }
}

/// 从 JSON 文件读取卡牌目录，没有配置文件时使用内置目录
pub struct JsonCatalogSource {
    path: Option<PathBuf>,
}

impl JsonCatalogSource {
    pub fn new(path: Option<PathBuf>) -> Self {
        JsonCatalogSource { path }
    }
}

#[async_trait]
impl CardCatalogSource for JsonCatalogSource {
    async fn load_card_definitions(&self) -> Result<CardCatalog, ServiceError> {
        let catalog = match &self.path {
            Some(path) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| ServiceError::Upstream(format!("读取卡牌目录 {} 失败: {}", path.display(), e)))?;
                CardCatalog::from_json(&text)
            }
            None => CardCatalog::builtin(),
        };
        catalog.map_err(|e| ServiceError::Upstream(format!("卡牌目录无效: {}", e)))
    }
}

/// 配置文件中的固定奖励设置
#[derive(Default)]
pub struct StaticRewardSettings {
    rewards: RoundRewards,
}

impl StaticRewardSettings {
    pub fn new(rewards: RoundRewards) -> Self {
        StaticRewardSettings { rewards }
    }
}

#[async_trait]
impl RewardSettingsSource for StaticRewardSettings {
    async fn round_rewards(&self) -> Result<RoundRewards, ServiceError> {
        Ok(self.rewards.clone())
    }
}
