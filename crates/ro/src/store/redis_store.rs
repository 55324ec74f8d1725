//! Redis 存储实现
//!
//! 基于 redis 多路复用连接实现 [`Store`]，单个连接在进程内共享，
//! 每次调用克隆连接句柄即可并发使用。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::streams::StreamReadReply;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

use super::{
    Connector, Store, StoreHandle, StreamBatch, StreamMessage, Ttl, XAddArgs, XReadGroupArgs,
};
use crate::config::RedisConfig;
use crate::error::{Result, RoError};

/// 基于 Redis 的存储
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    /// 获取连接
    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

/// Redis 过期时间按毫秒下发，不足 1 毫秒的按 1 毫秒处理
///
/// 超出 Redis 可接受范围（有符号 64 位毫秒数）的时长返回 [`RoError::BadRequest`]。
fn expiration_millis(expiration: Duration) -> Result<u64> {
    i64::try_from(expiration.as_millis())
        .ok()
        .and_then(|millis| u64::try_from(millis).ok())
        .map(|millis| millis.max(1))
        .ok_or_else(|| RoError::BadRequest(format!("expiration {:?} is out of range", expiration)))
}

#[async_trait]
impl Store for RedisStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn();
        let count: u64 = conn.del(key).await?;
        Ok(count)
    }

    async fn expire(&self, key: &str, expiration: Duration) -> Result<bool> {
        let mut conn = self.conn();
        let updated: bool = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(expiration_millis(expiration)?)
            .query_async(&mut conn)
            .await?;
        Ok(updated)
    }

    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.conn();
        let updated: bool = redis::cmd("PEXPIREAT")
            .arg(key)
            .arg(at.timestamp_millis())
            .query_async(&mut conn)
            .await?;
        Ok(updated)
    }

    async fn ttl(&self, key: &str) -> Result<Ttl> {
        let mut conn = self.conn();
        let millis: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        Ok(match millis {
            -2 => Ttl::Missing,
            -1 => Ttl::NoExpiry,
            value if value >= 0 => Ttl::ExpiresIn(Duration::from_millis(value as u64)),
            _ => Ttl::Missing,
        })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, expiration: Option<Duration>) -> Result<()> {
        let mut conn = self.conn();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(expiration) = expiration {
            cmd.arg("PX").arg(expiration_millis(expiration)?);
        }
        cmd.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        expiration: Option<Duration>,
    ) -> Result<bool> {
        let mut conn = self.conn();

        // SET key value NX [PX milliseconds]
        // NX: 只在 key 不存在时设置
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(expiration) = expiration {
            cmd.arg("PX").arg(expiration_millis(expiration)?);
        }

        // SET NX 成功时返回 "OK"，失败时返回 nil
        let result: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(result.is_some())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.conn();
        let value: i64 = conn.incr(key, delta).await?;
        Ok(value)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>> {
        let mut conn = self.conn();
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn();
        let values: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(values)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<u64> {
        let mut conn = self.conn();
        let added: u64 = conn.hset(key, field, value).await?;
        Ok(added)
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64> {
        let mut conn = self.conn();
        let removed: u64 = redis::cmd("HDEL")
            .arg(key)
            .arg(fields)
            .query_async(&mut conn)
            .await?;
        Ok(removed)
    }

    async fn hlen(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn();
        let count: u64 = conn.hlen(key).await?;
        Ok(count)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64> {
        let mut conn = self.conn();
        let added: u64 = redis::cmd("SADD")
            .arg(key)
            .arg(members)
            .query_async(&mut conn)
            .await?;
        Ok(added)
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<u64> {
        let mut conn = self.conn();
        let removed: u64 = redis::cmd("SREM")
            .arg(key)
            .arg(members)
            .query_async(&mut conn)
            .await?;
        Ok(removed)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn();
        let is_member: bool = conn.sismember(key, member).await?;
        Ok(is_member)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn();
        let count: u64 = conn.scard(key).await?;
        Ok(count)
    }

    async fn xadd(&self, key: &str, args: &XAddArgs) -> Result<String> {
        let mut conn = self.conn();

        // XADD key [MAXLEN [~] n [LIMIT l]] id field value ...
        // LIMIT 只能配合近似裁剪使用
        let mut cmd = redis::cmd("XADD");
        cmd.arg(key);
        if args.max_len > 0 {
            cmd.arg("MAXLEN");
            if args.limit > 0 {
                cmd.arg("~").arg(args.max_len).arg("LIMIT").arg(args.limit);
            } else {
                cmd.arg(args.max_len);
            }
        }
        cmd.arg(&args.id);
        for (field, value) in &args.values {
            cmd.arg(field).arg(value);
        }

        let id: String = cmd.query_async(&mut conn).await?;
        Ok(id)
    }

    async fn xack(&self, key: &str, group: &str, ids: &[String]) -> Result<u64> {
        let mut conn = self.conn();
        let acked: u64 = redis::cmd("XACK")
            .arg(key)
            .arg(group)
            .arg(ids)
            .query_async(&mut conn)
            .await?;
        Ok(acked)
    }

    async fn xgroup_create_mkstream(&self, key: &str, group: &str, pos: &str) -> Result<()> {
        let mut conn = self.conn();
        redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(key)
            .arg(group)
            .arg(pos)
            .arg("MKSTREAM")
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn xread_group(
        &self,
        key: &str,
        args: &XReadGroupArgs,
    ) -> Result<Option<Vec<StreamBatch>>> {
        let mut conn = self.conn();

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(&args.group).arg(&args.consumer);
        if args.count > 0 {
            cmd.arg("COUNT").arg(args.count);
        }
        if let Some(block) = args.block {
            cmd.arg("BLOCK").arg(block.as_millis() as u64);
        }
        if args.no_ack {
            cmd.arg("NOACK");
        }
        cmd.arg("STREAMS").arg(key).arg(">");

        let reply: Option<StreamReadReply> = cmd.query_async(&mut conn).await?;
        let Some(reply) = reply else {
            return Ok(None);
        };

        let batches = reply
            .keys
            .into_iter()
            .map(|stream| StreamBatch {
                stream: stream.key,
                messages: stream
                    .ids
                    .into_iter()
                    .map(|entry| {
                        let values = entry
                            .map
                            .keys()
                            .filter_map(|field| {
                                entry
                                    .get::<String>(field)
                                    .map(|value| (field.clone(), value))
                            })
                            .collect();
                        StreamMessage {
                            id: entry.id,
                            values,
                        }
                    })
                    .collect(),
            })
            .collect();

        Ok(Some(batches))
    }
}

/// Redis 连接构造器
///
/// 打开一个多路复用连接，连接超时由 `connect_timeout_ms` 控制。
#[derive(Debug, Default, Clone, Copy)]
pub struct RedisConnector;

#[async_trait]
impl Connector for RedisConnector {
    async fn connect(&self, config: &RedisConfig) -> Result<StoreHandle> {
        let client = Client::open(config.connection_url()?)?;

        let conn = timeout(
            config.connect_timeout(),
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            RoError::Store(format!(
                "connect to {} timed out after {}ms",
                config.addr, config.connect_timeout_ms
            ))
        })??;

        info!(addr = %config.addr, db = config.db, "Redis connection opened");
        Ok(Arc::new(RedisStore::new(conn)))
    }
}
