//! 字符串键
//!
//! 提供字符串、整数和 JSON 对象的读写，以及 SET NX 与自增操作。
//! 基于 SET NX 的分布式锁见 [`crate::lock`]。

use serde::{Serialize, de::DeserializeOwned};
use std::ops::Deref;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::connection::ConnectionManager;
use crate::error::{Result, RoError};
use crate::key::{Key, ParameterKey};

/// 字符串键句柄
#[derive(Debug, Clone)]
pub struct StringKey {
    key: Key,
}

/// 字符串参数化键
pub type StringParameterKey = ParameterKey<StringKey>;

impl From<Key> for StringKey {
    fn from(key: Key) -> Self {
        Self { key }
    }
}

impl Deref for StringKey {
    type Target = Key;

    fn deref(&self) -> &Key {
        &self.key
    }
}

impl StringKey {
    pub fn new(name: impl Into<String>) -> Self {
        Key::new(name).into()
    }

    pub fn with_connection(conn: ConnectionManager, name: impl Into<String>) -> Self {
        Key::with_connection(conn, name).into()
    }

    /// 读取值，键不存在时返回 [`RoError::Nil`]
    pub async fn get(&self) -> Result<String> {
        let start = Instant::now();
        let store = self.store().await?;
        let value = store.get(self.name()).await.inspect_err(|e| {
            warn!(key = %self.name(), error = %e, duration = ?start.elapsed(), "get key value failed");
        })?;

        let Some(value) = value else {
            warn!(key = %self.name(), duration = ?start.elapsed(), "get key value failed: nil");
            return Err(RoError::Nil {
                key: self.name().to_string(),
            });
        };

        debug!(
            key = %self.name(),
            value = %value,
            duration = ?start.elapsed(),
            "get value successfully"
        );
        Ok(value)
    }

    /// 读取值，任何错误都返回默认值
    pub async fn get_default(&self, default_value: &str) -> String {
        match self.get().await {
            Ok(value) => value,
            Err(e) => {
                debug!(
                    key = %self.name(),
                    error = %e,
                    default_value,
                    "get value failed, use default value instead"
                );
                default_value.to_string()
            }
        }
    }

    pub async fn get_i32(&self) -> Result<i32> {
        let value = self.get().await?;
        value.parse().map_err(|e| {
            warn!(key = %self.name(), value = %value, error = %e, "get int value failed");
            RoError::from(e)
        })
    }

    pub async fn get_i64(&self) -> Result<i64> {
        let value = self.get().await?;
        value.parse().map_err(|e| {
            warn!(key = %self.name(), value = %value, error = %e, "get int value failed");
            RoError::from(e)
        })
    }

    /// 读取并反序列化 JSON 对象
    pub async fn get_object<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.get().await?;
        serde_json::from_str(&value).map_err(|e| {
            warn!(key = %self.name(), value = %value, error = %e, "get object failed");
            RoError::from(e)
        })
    }

    /// 写入值，`expiration` 为 None 时不过期
    pub async fn set(&self, value: &str, expiration: Option<Duration>) -> Result<()> {
        let start = Instant::now();
        let store = self.store().await?;
        store
            .set(self.name(), value, expiration)
            .await
            .inspect_err(|e| {
                warn!(
                    key = %self.name(),
                    value,
                    expiration = ?expiration,
                    error = %e,
                    duration = ?start.elapsed(),
                    "set key value failed"
                );
            })?;

        debug!(
            key = %self.name(),
            value,
            expiration = ?expiration,
            duration = ?start.elapsed(),
            "set value successfully"
        );
        Ok(())
    }

    pub async fn set_i32(&self, value: i32, expiration: Option<Duration>) -> Result<()> {
        self.set(&value.to_string(), expiration).await
    }

    pub async fn set_i64(&self, value: i64, expiration: Option<Duration>) -> Result<()> {
        self.set(&value.to_string(), expiration).await
    }

    /// 序列化为 JSON 后写入
    pub async fn set_object<T: Serialize>(
        &self,
        object: &T,
        expiration: Option<Duration>,
    ) -> Result<()> {
        let serialized = serde_json::to_string(object).map_err(|e| {
            warn!(key = %self.name(), error = %e, "marshal object failed");
            RoError::from(e)
        })?;
        self.set(&serialized, expiration).await
    }

    /// 仅在键不存在时写入，返回是否写入成功
    pub async fn set_nx(&self, value: &str, expiration: Option<Duration>) -> Result<bool> {
        let start = Instant::now();
        let store = self.store().await?;
        let success = store
            .set_nx(self.name(), value, expiration)
            .await
            .inspect_err(|e| {
                warn!(
                    key = %self.name(),
                    value,
                    expiration = ?expiration,
                    error = %e,
                    duration = ?start.elapsed(),
                    "setnx key value failed"
                );
            })?;

        debug!(
            key = %self.name(),
            value,
            expiration = ?expiration,
            success,
            duration = ?start.elapsed(),
            "setnx value finished"
        );
        Ok(success)
    }

    /// 自增 1，返回新值
    pub async fn increase(&self) -> Result<i64> {
        self.increase_by(1).await
    }

    /// 自增指定值，返回新值
    pub async fn increase_by(&self, delta: i64) -> Result<i64> {
        let start = Instant::now();
        let store = self.store().await?;
        let new_value = store.incr_by(self.name(), delta).await.inspect_err(|e| {
            warn!(
                key = %self.name(),
                delta,
                error = %e,
                duration = ?start.elapsed(),
                "increase by value failed"
            );
        })?;

        debug!(
            key = %self.name(),
            delta,
            new_value,
            duration = ?start.elapsed(),
            "increase by value successfully"
        );
        Ok(new_value)
    }
}
