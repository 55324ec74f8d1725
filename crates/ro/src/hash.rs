//! 哈希键

use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::ops::Deref;
use std::time::Instant;
use tracing::{debug, warn};

use crate::connection::ConnectionManager;
use crate::error::{Result, RoError};
use crate::key::{Key, ParameterKey};

/// 哈希键句柄
#[derive(Debug, Clone)]
pub struct HashKey {
    key: Key,
}

/// 哈希参数化键
pub type HashParameterKey = ParameterKey<HashKey>;

impl From<Key> for HashKey {
    fn from(key: Key) -> Self {
        Self { key }
    }
}

impl Deref for HashKey {
    type Target = Key;

    fn deref(&self) -> &Key {
        &self.key
    }
}

impl HashKey {
    pub fn new(name: impl Into<String>) -> Self {
        Key::new(name).into()
    }

    pub fn with_connection(conn: ConnectionManager, name: impl Into<String>) -> Self {
        Key::with_connection(conn, name).into()
    }

    /// 读取字段，字段不存在时返回 [`RoError::Nil`]
    pub async fn hget(&self, field: &str) -> Result<String> {
        let start = Instant::now();
        let store = self.store().await?;
        let value = store.hget(self.name(), field).await.inspect_err(|e| {
            warn!(
                key = %self.name(),
                field,
                error = %e,
                duration = ?start.elapsed(),
                "hget field failed"
            );
        })?;

        let Some(value) = value else {
            warn!(key = %self.name(), field, duration = ?start.elapsed(), "hget field failed: nil");
            return Err(RoError::Nil {
                key: format!("{}.{}", self.name(), field),
            });
        };

        debug!(
            key = %self.name(),
            field,
            value = %value,
            duration = ?start.elapsed(),
            "hget field successfully"
        );
        Ok(value)
    }

    pub async fn hget_object<T: DeserializeOwned>(&self, field: &str) -> Result<T> {
        let value = self.hget(field).await?;
        serde_json::from_str(&value).map_err(|e| {
            warn!(key = %self.name(), field, value = %value, error = %e, "hget object failed");
            RoError::from(e)
        })
    }

    /// 批量读取字段
    ///
    /// 不存在的字段不会出现在结果中；存储返回的数量与请求不一致时返回
    /// [`RoError::InvalidResultCount`]。
    pub async fn hmget(&self, fields: &[&str]) -> Result<HashMap<String, String>> {
        if fields.is_empty() {
            return Ok(HashMap::new());
        }

        let start = Instant::now();
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let store = self.store().await?;
        let values = store.hmget(self.name(), &fields).await.inspect_err(|e| {
            warn!(
                key = %self.name(),
                fields = ?fields,
                error = %e,
                duration = ?start.elapsed(),
                "hmget fields failed"
            );
        })?;

        if values.len() != fields.len() {
            warn!(
                key = %self.name(),
                fields = ?fields,
                expected = fields.len(),
                actual = values.len(),
                "hmget fields failed: result count mismatch"
            );
            return Err(RoError::InvalidResultCount {
                expected: fields.len(),
                actual: values.len(),
            });
        }

        let result: HashMap<String, String> = fields
            .into_iter()
            .zip(values)
            .filter_map(|(field, value)| value.map(|v| (field, v)))
            .collect();

        debug!(
            key = %self.name(),
            found = result.len(),
            duration = ?start.elapsed(),
            "hmget fields successfully"
        );
        Ok(result)
    }

    pub async fn hgetall(&self) -> Result<HashMap<String, String>> {
        let start = Instant::now();
        let store = self.store().await?;
        let values = store.hgetall(self.name()).await.inspect_err(|e| {
            warn!(key = %self.name(), error = %e, duration = ?start.elapsed(), "hgetall failed");
        })?;

        debug!(
            key = %self.name(),
            count = values.len(),
            duration = ?start.elapsed(),
            "hgetall successfully"
        );
        Ok(values)
    }

    /// 写入字段
    pub async fn hset(&self, field: &str, value: &str) -> Result<()> {
        let start = Instant::now();
        let store = self.store().await?;
        store.hset(self.name(), field, value).await.inspect_err(|e| {
            warn!(
                key = %self.name(),
                field,
                value,
                error = %e,
                duration = ?start.elapsed(),
                "hset field failed"
            );
        })?;

        debug!(
            key = %self.name(),
            field,
            value,
            duration = ?start.elapsed(),
            "hset field successfully"
        );
        Ok(())
    }

    pub async fn hset_object<T: Serialize>(&self, field: &str, object: &T) -> Result<()> {
        let serialized = serde_json::to_string(object).map_err(|e| {
            warn!(key = %self.name(), field, error = %e, "marshal object failed");
            RoError::from(e)
        })?;
        self.hset(field, &serialized).await
    }

    /// 删除字段，空列表直接返回
    pub async fn hdel(&self, fields: &[&str]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let store = self.store().await?;
        let removed = store.hdel(self.name(), &fields).await.inspect_err(|e| {
            warn!(
                key = %self.name(),
                fields = ?fields,
                error = %e,
                duration = ?start.elapsed(),
                "hdel fields failed"
            );
        })?;

        debug!(
            key = %self.name(),
            fields = ?fields,
            removed,
            duration = ?start.elapsed(),
            "hdel fields successfully"
        );
        Ok(())
    }

    pub async fn hlen(&self) -> Result<u64> {
        let start = Instant::now();
        let store = self.store().await?;
        let count = store.hlen(self.name()).await.inspect_err(|e| {
            warn!(key = %self.name(), error = %e, duration = ?start.elapsed(), "hlen failed");
        })?;

        debug!(key = %self.name(), count, duration = ?start.elapsed(), "hlen successfully");
        Ok(count)
    }
}
