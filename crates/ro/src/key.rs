//! 通用键操作
//!
//! `Key` 是所有类型化键句柄的公共部分，提供删除、过期、TTL 和存在性检查。
//! 句柄是普通值，每次操作都通过连接管理器获取共享连接。

use chrono::{DateTime, Utc};
use std::fmt;
use std::marker::PhantomData;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::store::{StoreHandle, Ttl};

/// 通用键句柄
#[derive(Debug, Clone)]
pub struct Key {
    name: String,
    conn: ConnectionManager,
}

impl Key {
    /// 创建绑定到进程级连接管理器的键
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_connection(ConnectionManager::global().clone(), name)
    }

    /// 创建绑定到指定连接管理器的键
    pub fn with_connection(conn: ConnectionManager, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conn,
        }
    }

    /// 键名
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.conn
    }

    pub(crate) async fn store(&self) -> Result<StoreHandle> {
        self.conn.acquire().await
    }

    /// 删除键
    pub async fn del(&self) -> Result<()> {
        let start = Instant::now();
        let store = self.store().await?;
        store.del(&self.name).await.inspect_err(|e| {
            warn!(key = %self.name, error = %e, duration = ?start.elapsed(), "delete key failed");
        })?;

        debug!(key = %self.name, duration = ?start.elapsed(), "delete key successfully");
        Ok(())
    }

    /// 设置相对过期时间
    pub async fn expire(&self, expiration: Duration) -> Result<()> {
        let start = Instant::now();
        let store = self.store().await?;
        store.expire(&self.name, expiration).await.inspect_err(|e| {
            warn!(key = %self.name, error = %e, duration = ?start.elapsed(), "expire key failed");
        })?;

        debug!(
            key = %self.name,
            expiration = ?expiration,
            duration = ?start.elapsed(),
            "expire key successfully"
        );
        Ok(())
    }

    /// 设置绝对过期时间
    pub async fn expire_at(&self, at: DateTime<Utc>) -> Result<()> {
        let start = Instant::now();
        let store = self.store().await?;
        store.expire_at(&self.name, at).await.inspect_err(|e| {
            warn!(key = %self.name, error = %e, duration = ?start.elapsed(), "expire key failed");
        })?;

        debug!(
            key = %self.name,
            time = %at,
            duration = ?start.elapsed(),
            "expire key successfully"
        );
        Ok(())
    }

    /// 获取剩余生存时间
    pub async fn ttl(&self) -> Result<Ttl> {
        let start = Instant::now();
        let store = self.store().await?;
        let ttl = store.ttl(&self.name).await.inspect_err(|e| {
            warn!(key = %self.name, error = %e, duration = ?start.elapsed(), "get key ttl failed");
        })?;

        debug!(key = %self.name, ttl = ?ttl, duration = ?start.elapsed(), "get key ttl successfully");
        Ok(ttl)
    }

    /// 检查键是否存在
    pub async fn exists(&self) -> Result<bool> {
        let start = Instant::now();
        let store = self.store().await?;
        let exists = store.exists(&self.name).await.inspect_err(|e| {
            warn!(key = %self.name, error = %e, duration = ?start.elapsed(), "check key exists failed");
        })?;

        debug!(
            key = %self.name,
            exists,
            duration = ?start.elapsed(),
            "check key exists successfully"
        );
        Ok(exists)
    }
}

/// 参数化键
///
/// 模式中的 `{}` 按顺序替换为参数，多余的占位符原样保留，多余的参数被忽略。
///
/// ```ignore
/// let users: StringParameterKey = ParameterKey::new("user:{}:profile");
/// let key = users.param(&[&42]); // user:42:profile
/// ```
pub struct ParameterKey<K> {
    pattern: String,
    conn: ConnectionManager,
    _kind: PhantomData<fn() -> K>,
}

impl<K: From<Key>> ParameterKey<K> {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self::with_connection(ConnectionManager::global().clone(), pattern)
    }

    pub fn with_connection(conn: ConnectionManager, pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            conn,
            _kind: PhantomData,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// 填充参数，得到具体的键句柄
    pub fn param(&self, params: &[&dyn fmt::Display]) -> K {
        let name = format_pattern(&self.pattern, params);
        K::from(Key::with_connection(self.conn.clone(), name))
    }
}

impl<K> Clone for ParameterKey<K> {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            conn: self.conn.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K> fmt::Debug for ParameterKey<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterKey")
            .field("pattern", &self.pattern)
            .finish()
    }
}

fn format_pattern(pattern: &str, params: &[&dyn fmt::Display]) -> String {
    let mut result = String::with_capacity(pattern.len() + params.len() * 8);
    let mut params = params.iter();
    let mut rest = pattern;

    while let Some(pos) = rest.find("{}") {
        result.push_str(&rest[..pos]);
        match params.next() {
            Some(param) => result.push_str(&param.to_string()),
            None => result.push_str("{}"),
        }
        rest = &rest[pos + 2..];
    }
    result.push_str(rest);
    result
}
