use anyhow::Context;
use joker_table_core::{RoundRewards, TableSettings, Wallet};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// 配置文件路径所在的环境变量
pub const CONFIG_ENV: &str = "JOKER_TABLE_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// 卡牌目录 JSON 文件，不设置时使用内置目录
    pub catalog_path: Option<PathBuf>,
    pub max_players_per_table: usize,
    /// 新建桌子的设置
    pub table: TableSettings,
    pub rewards: RoundRewards,
    /// 内存余额存储中新玩家的初始余额
    pub starting_balance: Wallet,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 25917)),
            catalog_path: None,
            max_players_per_table: 4,
            table: TableSettings::default(),
            rewards: RoundRewards::default(),
            starting_balance: Wallet { primary: 1000, secondary: 0 },
        }
    }
}

impl ServerConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// 读取环境变量指定的配置文件，没有设置时使用默认配置
    pub fn load() -> anyhow::Result<Self> {
        let Ok(path) = std::env::var(CONFIG_ENV) else {
            return Ok(ServerConfig::default());
        };
        let text = std::fs::read_to_string(&path).with_context(|| format!("无法读取配置文件 {}", path))?;
        let config = Self::from_json(&text).with_context(|| format!("配置文件格式错误 {}", path))?;
        config.validate().with_context(|| format!("配置文件无效 {}", path))?;
        Ok(config)
    }

    /// 种子金必须等于各回合奖金上限之和
    pub fn validate(&self) -> anyhow::Result<()> {
        let total = self.table.prize_total();
        anyhow::ensure!(
            self.table.seed_amount == total,
            "种子金 {} 与回合奖金上限之和 {} 不一致",
            self.table.seed_amount,
            total
        );
        Ok(())
    }

    /// 新建桌子时使用的设置，人数上限以服务器配置为准
    pub fn table_settings(&self) -> TableSettings {
        TableSettings { max_players: self.max_players_per_table, ..self.table.clone() }
    }
}
