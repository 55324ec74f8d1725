//! 测试环境管理
//!
//! 每个测试使用独立的键前缀，结束时清理前缀下的所有键，避免并行测试互相干扰。

use anyhow::Result;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use ro::observability::{ObservabilityConfig, init_tracing};
use ro::store::redis_store::RedisConnector;
use ro::{ConnectionManager, RedisConfig};
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// 测试环境配置
#[derive(Debug, Clone)]
pub struct TestEnvConfig {
    /// Redis 地址
    pub redis_addr: String,
    pub redis_password: Option<String>,
    /// 使用独立的逻辑库，避免污染业务数据
    pub redis_db: i64,
}

impl Default for TestEnvConfig {
    fn default() -> Self {
        Self {
            redis_addr: std::env::var("REDIS_ADDR").unwrap_or_else(|_| "127.0.0.1:6379".into()),
            redis_password: std::env::var("REDIS_PASSWORD").ok(),
            redis_db: std::env::var("REDIS_DB")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
        }
    }
}

impl TestEnvConfig {
    pub fn redis_config(&self) -> RedisConfig {
        let mut config = RedisConfig::new(&self.redis_addr).with_db(self.redis_db);
        if let Some(password) = &self.redis_password {
            config = config.with_credentials(None::<String>, password);
        }
        config
    }
}

/// 测试环境
pub struct TestEnvironment {
    pub config: TestEnvConfig,
    /// 被测的连接管理器
    pub manager: ConnectionManager,
    /// 绕过被测代码的直连，用于交叉校验
    raw: MultiplexedConnection,
    prefix: String,
    created: Mutex<Vec<String>>,
}

impl TestEnvironment {
    pub async fn setup() -> Result<Self> {
        Self::setup_with_config(TestEnvConfig::default()).await
    }

    pub async fn setup_with_config(config: TestEnvConfig) -> Result<Self> {
        // 多个测试共享进程，只有第一次安装会成功
        let _ = init_tracing(&ObservabilityConfig::from_env());
        tracing::info!(addr = %config.redis_addr, db = config.redis_db, "初始化测试环境");

        let redis_config = config.redis_config();
        let client = redis::Client::open(redis_config.connection_url()?)?;
        let raw = client.get_multiplexed_async_connection().await?;

        let manager = ConnectionManager::with_config(RedisConnector, redis_config);
        manager.acquire().await?;

        let prefix = format!(
            "ro:e2e:{}:{}",
            chrono::Utc::now().timestamp_millis(),
            SEQUENCE.fetch_add(1, Ordering::SeqCst)
        );

        Ok(Self {
            config,
            manager,
            raw,
            prefix,
            created: Mutex::new(Vec::new()),
        })
    }

    /// 生成带测试前缀的键名并登记清理
    pub fn key_name(&self, name: &str) -> String {
        let full = format!("{}:{}", self.prefix, name);
        self.created.lock().push(full.clone());
        full
    }

    pub fn raw(&self) -> MultiplexedConnection {
        self.raw.clone()
    }

    /// 直接读取字符串值
    pub async fn raw_get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.raw();
        Ok(redis::cmd("GET").arg(key).query_async(&mut conn).await?)
    }

    /// 直接读取剩余毫秒数
    pub async fn raw_pttl(&self, key: &str) -> Result<i64> {
        let mut conn = self.raw();
        Ok(redis::cmd("PTTL").arg(key).query_async(&mut conn).await?)
    }

    /// 删除本测试创建的所有键
    pub async fn cleanup(&self) -> Result<()> {
        let keys: Vec<String> = std::mem::take(&mut *self.created.lock());
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.raw();
        redis::cmd("DEL")
            .arg(&keys)
            .query_async::<()>(&mut conn)
            .await?;
        tracing::debug!(count = keys.len(), "测试数据已清理");
        Ok(())
    }
}
