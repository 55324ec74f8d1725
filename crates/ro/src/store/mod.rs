//! 存储抽象层
//!
//! 定义键操作依赖的存储原语接口，便于上层依赖抽象而非具体实现，支持 mock 测试。
//! 生产环境使用 [`redis_store::RedisStore`]，测试使用 [`memory::MemoryStore`]。

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RedisConfig;
use crate::error::Result;

/// 共享的连接句柄
pub type StoreHandle = Arc<dyn Store>;

/// 键的剩余生存时间，语义与 Redis TTL 一致
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// 键不存在或已过期
    Missing,
    /// 键存在且没有过期时间
    NoExpiry,
    /// 键将在给定时长后过期
    ExpiresIn(Duration),
}

/// XADD 参数
#[derive(Debug, Clone, Default)]
pub struct XAddArgs {
    /// 消息 ID，"*" 表示由服务端生成
    pub id: String,
    /// 大于 0 时按长度裁剪
    pub max_len: u64,
    /// 大于 0 时使用近似裁剪并限制单次裁剪条数
    pub limit: u64,
    pub values: HashMap<String, String>,
}

/// XREADGROUP 参数（只读取新消息，即 ">"）
#[derive(Debug, Clone, Default)]
pub struct XReadGroupArgs {
    pub group: String,
    pub consumer: String,
    /// 0 表示不限制
    pub count: u64,
    /// None 表示不阻塞
    pub block: Option<Duration>,
    pub no_ack: bool,
}

/// 流中的一条消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub id: String,
    pub values: HashMap<String, String>,
}

/// 一个流返回的消息集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamBatch {
    pub stream: String,
    pub messages: Vec<StreamMessage>,
}

/// 存储原语接口
///
/// 所有原语都假定由存储端原子执行；`set_nx` 是分布式锁唯一的互斥来源。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// 连通性探测
    async fn ping(&self) -> Result<()>;

    // 通用键
    async fn del(&self, key: &str) -> Result<u64>;
    async fn expire(&self, key: &str, expiration: Duration) -> Result<bool>;
    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> Result<bool>;
    async fn ttl(&self, key: &str) -> Result<Ttl>;
    async fn exists(&self, key: &str) -> Result<bool>;

    // 字符串
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, expiration: Option<Duration>) -> Result<()>;
    /// 仅在键不存在时设置，返回是否设置成功
    async fn set_nx(&self, key: &str, value: &str, expiration: Option<Duration>)
    -> Result<bool>;
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;

    // 哈希
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;
    /// 按请求顺序返回，缺失字段为 None
    async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<u64>;
    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64>;
    async fn hlen(&self, key: &str) -> Result<u64>;

    // 集合
    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64>;
    async fn srem(&self, key: &str, members: &[String]) -> Result<u64>;
    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;
    async fn scard(&self, key: &str) -> Result<u64>;

    // 流
    async fn xadd(&self, key: &str, args: &XAddArgs) -> Result<String>;
    async fn xack(&self, key: &str, group: &str, ids: &[String]) -> Result<u64>;
    /// 创建消费组，流不存在时一并创建
    async fn xgroup_create_mkstream(&self, key: &str, group: &str, pos: &str) -> Result<()>;
    /// 存储返回 nil（没有新消息）时为 None
    async fn xread_group(
        &self,
        key: &str,
        args: &XReadGroupArgs,
    ) -> Result<Option<Vec<StreamBatch>>>;
}

/// 连接构造器
///
/// 只负责根据配置建立连接，连通性探测由连接管理器完成。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &RedisConfig) -> Result<StoreHandle>;
}
