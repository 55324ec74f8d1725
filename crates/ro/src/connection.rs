//! 连接管理模块
//!
//! 为进程提供唯一的共享连接句柄：首次使用时根据预先提供的配置惰性创建，
//! 并在互斥保护下完成连接与连通性探测，避免并发重复初始化。
//!
//! ## 设计理念
//!
//! - **依赖注入优先**: `ConnectionManager` 可显式构造并传递给键句柄
//! - **全局单例兼容**: [`ConnectionManager::global`] 提供进程级实例
//! - **失败不缓存**: 连接或探测失败时缓存保持为空，后续调用可以重试
//!
//! ## 使用示例
//!
//! ```ignore
//! ro::set_config(RedisConfig::new("127.0.0.1:6379"));
//!
//! let key = ro::StringKey::new("user:1:name");
//! key.set("alice", None).await?;
//! ```

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};

use crate::config::RedisConfig;
use crate::error::{Result, RoError};
use crate::hash::HashKey;
use crate::key::ParameterKey;
use crate::set::SetKey;
use crate::store::redis_store::RedisConnector;
use crate::store::{Connector, StoreHandle};
use crate::stream::StreamKey;
use crate::string::StringKey;

/// 进程级连接管理器
static GLOBAL: OnceLock<ConnectionManager> = OnceLock::new();

struct Inner {
    connector: Arc<dyn Connector>,
    /// 由外部在首次使用前设置，不参与连接互斥
    config: RwLock<Option<RedisConfig>>,
    /// 缓存的连接句柄；互斥锁同时串行化连接创建过程
    handle: Mutex<Option<StoreHandle>>,
    /// 句柄缓存成功后置位，读取时不需要获取互斥锁
    connected: AtomicBool,
}

/// 连接管理器
///
/// 克隆开销很小，所有克隆共享同一份配置和连接缓存。
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// 使用指定的连接构造器创建管理器（尚未配置）
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector: Arc::new(connector),
                config: RwLock::new(None),
                handle: Mutex::new(None),
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// 使用指定的连接构造器和配置创建管理器
    pub fn with_config(connector: impl Connector + 'static, config: RedisConfig) -> Self {
        let manager = Self::new(connector);
        manager.set_config(config);
        manager
    }

    /// 使用 Redis 连接构造器创建管理器
    pub fn redis() -> Self {
        Self::new(RedisConnector)
    }

    /// 获取进程级管理器
    pub fn global() -> &'static ConnectionManager {
        GLOBAL.get_or_init(Self::redis)
    }

    /// 设置配置
    ///
    /// 只影响之后的连接创建，已缓存的连接句柄保持不变。
    pub fn set_config(&self, config: RedisConfig) {
        *self.inner.config.write() = Some(config);
    }

    /// 当前配置
    pub fn config(&self) -> Option<RedisConfig> {
        self.inner.config.read().clone()
    }

    /// 获取共享连接句柄
    ///
    /// 已有缓存时直接返回；否则在互斥保护下创建连接并执行一次 PING。
    /// 并发的首次调用中至多一次连接和探测成功，失败时不缓存，后续调用会重新尝试。
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<StoreHandle> {
        let mut cached = self.inner.handle.lock().await;
        if let Some(handle) = cached.as_ref() {
            return Ok(Arc::clone(handle));
        }

        let Some(config) = self.config() else {
            error!("redis config undefined");
            return Err(RoError::ConfigUndefined);
        };

        let handle = self.inner.connector.connect(&config).await.map_err(|e| {
            error!(addr = %config.addr, error = %e, "Connect to redis failed");
            e
        })?;

        if let Err(e) = handle.ping().await {
            error!(addr = %config.addr, error = %e, "Ping redis failed");
            return Err(e);
        }

        debug!(addr = %config.addr, db = config.db, "Connect to redis successfully");
        *cached = Some(Arc::clone(&handle));
        self.inner.connected.store(true, Ordering::Release);
        Ok(handle)
    }

    /// 获取共享连接句柄，失败时 panic
    ///
    /// 仅用于把存储不可用视为致命错误的调用点，普通调用请使用 [`Self::acquire`]。
    pub async fn must_acquire(&self) -> StoreHandle {
        match self.acquire().await {
            Ok(handle) => handle,
            Err(e) => panic!("get redis failed: {}", e),
        }
    }

    /// 是否已缓存连接句柄
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    pub fn key(&self, key: impl Into<String>) -> crate::key::Key {
        crate::key::Key::with_connection(self.clone(), key)
    }

    pub fn string_key(&self, key: impl Into<String>) -> StringKey {
        StringKey::with_connection(self.clone(), key)
    }

    pub fn hash_key(&self, key: impl Into<String>) -> HashKey {
        HashKey::with_connection(self.clone(), key)
    }

    pub fn set_key(&self, key: impl Into<String>) -> SetKey {
        SetKey::with_connection(self.clone(), key)
    }

    pub fn stream_key(&self, key: impl Into<String>) -> StreamKey {
        StreamKey::with_connection(self.clone(), key)
    }

    /// 创建绑定到当前管理器的参数化键
    pub fn parameter_key<K: From<crate::key::Key>>(
        &self,
        pattern: impl Into<String>,
    ) -> ParameterKey<K> {
        ParameterKey::with_connection(self.clone(), pattern)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config().map(|c| c.addr))
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// 设置进程级配置
pub fn set_config(config: RedisConfig) {
    ConnectionManager::global().set_config(config);
}

/// 获取进程级连接句柄
pub async fn get_redis() -> Result<StoreHandle> {
    ConnectionManager::global().acquire().await
}

/// 获取进程级连接句柄，失败时 panic
pub async fn must_get_redis() -> StoreHandle {
    ConnectionManager::global().must_acquire().await
}
