//! 集合键

use std::collections::HashSet;
use std::ops::Deref;
use std::time::Instant;
use tracing::{debug, warn};

use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::key::{Key, ParameterKey};

/// 集合键句柄
#[derive(Debug, Clone)]
pub struct SetKey {
    key: Key,
}

/// 集合参数化键
pub type SetParameterKey = ParameterKey<SetKey>;

impl From<Key> for SetKey {
    fn from(key: Key) -> Self {
        Self { key }
    }
}

impl Deref for SetKey {
    type Target = Key;

    fn deref(&self) -> &Key {
        &self.key
    }
}

impl SetKey {
    pub fn new(name: impl Into<String>) -> Self {
        Key::new(name).into()
    }

    pub fn with_connection(conn: ConnectionManager, name: impl Into<String>) -> Self {
        Key::with_connection(conn, name).into()
    }

    /// 添加成员，空列表直接返回
    pub async fn sadd(&self, members: &[&str]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let members: Vec<String> = members.iter().map(|m| m.to_string()).collect();
        let store = self.store().await?;
        let added = store.sadd(self.name(), &members).await.inspect_err(|e| {
            warn!(
                key = %self.name(),
                members = ?members,
                error = %e,
                duration = ?start.elapsed(),
                "sadd members failed"
            );
        })?;

        debug!(
            key = %self.name(),
            members = ?members,
            added,
            duration = ?start.elapsed(),
            "sadd members successfully"
        );
        Ok(())
    }

    /// 移除成员，空列表直接返回
    pub async fn srem(&self, members: &[&str]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let members: Vec<String> = members.iter().map(|m| m.to_string()).collect();
        let store = self.store().await?;
        let removed = store.srem(self.name(), &members).await.inspect_err(|e| {
            warn!(
                key = %self.name(),
                members = ?members,
                error = %e,
                duration = ?start.elapsed(),
                "srem members failed"
            );
        })?;

        debug!(
            key = %self.name(),
            members = ?members,
            removed,
            duration = ?start.elapsed(),
            "srem members successfully"
        );
        Ok(())
    }

    pub async fn sismember(&self, member: &str) -> Result<bool> {
        let start = Instant::now();
        let store = self.store().await?;
        let is_member = store.sismember(self.name(), member).await.inspect_err(|e| {
            warn!(
                key = %self.name(),
                member,
                error = %e,
                duration = ?start.elapsed(),
                "sismember failed"
            );
        })?;

        debug!(
            key = %self.name(),
            member,
            is_member,
            duration = ?start.elapsed(),
            "sismember successfully"
        );
        Ok(is_member)
    }

    /// 全部成员，顺序不保证
    pub async fn smembers(&self) -> Result<Vec<String>> {
        let start = Instant::now();
        let store = self.store().await?;
        let members = store.smembers(self.name()).await.inspect_err(|e| {
            warn!(key = %self.name(), error = %e, duration = ?start.elapsed(), "smembers failed");
        })?;

        debug!(
            key = %self.name(),
            count = members.len(),
            duration = ?start.elapsed(),
            "smembers successfully"
        );
        Ok(members)
    }

    pub async fn smembers_set(&self) -> Result<HashSet<String>> {
        Ok(self.smembers().await?.into_iter().collect())
    }

    pub async fn scard(&self) -> Result<u64> {
        let start = Instant::now();
        let store = self.store().await?;
        let count = store.scard(self.name()).await.inspect_err(|e| {
            warn!(key = %self.name(), error = %e, duration = ?start.elapsed(), "scard failed");
        })?;

        debug!(key = %self.name(), count, duration = ?start.elapsed(), "scard successfully");
        Ok(count)
    }
}
