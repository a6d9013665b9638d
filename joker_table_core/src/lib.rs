//! # 小丑牌对战核心逻辑库
//!
//! 这个 `core` crate 包含了多人小丑牌对战的牌桌状态机、
//! 牌型评估、牌型表、小丑牌规则引擎、商店与种子金结算，
//! 以及客户端-服务器通信消息的定义。
//! 它不依赖任何网络或存储实现，服务器通过消息列表驱动 I/O。

mod card;
mod catalog;
mod error;
mod hand;
mod logic;
mod message;
mod paytable;
mod pot;
mod rules;
mod scoring;
mod shop;
mod state;

pub use card::*;
pub use catalog::*;
pub use error::*;
pub use hand::*;
pub use message::*;
pub use paytable::*;
pub use pot::*;
pub use rules::*;
pub use scoring::*;
pub use shop::*;
pub use state::*;
