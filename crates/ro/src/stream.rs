//! 流键
//!
//! 追加消息、消费组的创建、读取与确认。

use std::collections::HashMap;
use std::ops::Deref;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::connection::ConnectionManager;
use crate::error::{Result, RoError};
use crate::key::{Key, ParameterKey};
use crate::store::{StreamMessage, XAddArgs, XReadGroupArgs};

/// 从流的第一条消息开始消费
pub const FROM_BEGINNING: &str = "0";
/// 只消费创建消费组之后的新消息
pub const FROM_END: &str = "$";

/// 流键句柄
#[derive(Debug, Clone)]
pub struct StreamKey {
    key: Key,
}

/// 流参数化键
pub type StreamParameterKey = ParameterKey<StreamKey>;

impl From<Key> for StreamKey {
    fn from(key: Key) -> Self {
        Self { key }
    }
}

impl Deref for StreamKey {
    type Target = Key;

    fn deref(&self) -> &Key {
        &self.key
    }
}

impl StreamKey {
    pub fn new(name: impl Into<String>) -> Self {
        Key::new(name).into()
    }

    pub fn with_connection(conn: ConnectionManager, name: impl Into<String>) -> Self {
        Key::with_connection(conn, name).into()
    }

    /// 追加消息，返回消息 ID
    ///
    /// `max_len > 0` 时裁剪流长度，`limit > 0` 时改为近似裁剪并限制单次裁剪条数。
    pub async fn xadd(&self, args: XAddArgs) -> Result<String> {
        let start = Instant::now();
        let store = self.store().await?;
        let id = store.xadd(self.name(), &args).await.inspect_err(|e| {
            warn!(
                key = %self.name(),
                id = %args.id,
                max_len = args.max_len,
                limit = args.limit,
                error = %e,
                duration = ?start.elapsed(),
                "xadd failed"
            );
        })?;

        debug!(
            key = %self.name(),
            id = %id,
            max_len = args.max_len,
            limit = args.limit,
            duration = ?start.elapsed(),
            "xadd successfully"
        );
        Ok(id)
    }

    /// 以键值对列表追加消息到流尾，ID 由存储生成
    ///
    /// `values` 形如 `[k1, v1, k2, v2, ...]`，长度必须为不小于 2 的偶数。
    pub async fn xadd_to_end(&self, values: &[&str]) -> Result<String> {
        if values.len() < 2 || values.len() % 2 != 0 {
            warn!(key = %self.name(), count = values.len(), "xadd values must be key-value pairs");
            return Err(RoError::BadRequest(format!(
                "xadd expects key-value pairs, got {} items",
                values.len()
            )));
        }

        let values: HashMap<String, String> = values
            .chunks_exact(2)
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect();

        self.xadd(XAddArgs {
            id: "*".to_string(),
            values,
            ..Default::default()
        })
        .await
    }

    /// 确认消息，返回确认成功的数量
    pub async fn xack(&self, group: &str, ids: &[&str]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();
        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let store = self.store().await?;
        let acked = store.xack(self.name(), group, &ids).await.inspect_err(|e| {
            warn!(
                key = %self.name(),
                group,
                ids = ?ids,
                error = %e,
                duration = ?start.elapsed(),
                "xack failed"
            );
        })?;

        debug!(
            key = %self.name(),
            group,
            ids = ?ids,
            acked,
            duration = ?start.elapsed(),
            "xack successfully"
        );
        Ok(acked)
    }

    /// 创建消费组，流不存在时一并创建
    pub async fn xgroup_create(&self, group: &str, start_id: &str) -> Result<()> {
        let start = Instant::now();
        let store = self.store().await?;
        store
            .xgroup_create_mkstream(self.name(), group, start_id)
            .await
            .inspect_err(|e| {
                warn!(
                    key = %self.name(),
                    group,
                    start_id,
                    error = %e,
                    duration = ?start.elapsed(),
                    "xgroup create failed"
                );
            })?;

        debug!(
            key = %self.name(),
            group,
            start_id,
            duration = ?start.elapsed(),
            "xgroup create successfully"
        );
        Ok(())
    }

    pub async fn xgroup_create_from_beginning(&self, group: &str) -> Result<()> {
        self.xgroup_create(group, FROM_BEGINNING).await
    }

    pub async fn xgroup_create_from_end(&self, group: &str) -> Result<()> {
        self.xgroup_create(group, FROM_END).await
    }

    /// 以消费组身份读取新消息
    ///
    /// 没有新消息时返回 [`RoError::RecordNotFound`]。`count` 为 0 表示不限制，
    /// `block` 为 None 表示不阻塞。
    pub async fn xgroup_read(
        &self,
        group: &str,
        consumer: &str,
        count: u64,
        block: Option<Duration>,
        no_ack: bool,
    ) -> Result<Vec<StreamMessage>> {
        let start = Instant::now();
        let args = XReadGroupArgs {
            group: group.to_string(),
            consumer: consumer.to_string(),
            count,
            block,
            no_ack,
        };

        let store = self.store().await?;
        let reply = store.xread_group(self.name(), &args).await.inspect_err(|e| {
            warn!(
                key = %self.name(),
                group,
                consumer,
                error = %e,
                duration = ?start.elapsed(),
                "xgroup read failed"
            );
        })?;

        let Some(batches) = reply else {
            debug!(
                key = %self.name(),
                group,
                consumer,
                duration = ?start.elapsed(),
                "xgroup read no new messages"
            );
            return Err(RoError::RecordNotFound);
        };

        // 只读取了一个流，结果必须恰好对应这个流
        let [batch] = <[_; 1]>::try_from(batches).map_err(|batches: Vec<_>| {
            RoError::InvalidResultCount {
                expected: 1,
                actual: batches.len(),
            }
        })?;
        if batch.stream != self.name() {
            warn!(
                key = %self.name(),
                stream = %batch.stream,
                "xgroup read returned unexpected stream"
            );
            return Err(RoError::InvalidResultCount {
                expected: 1,
                actual: 0,
            });
        }

        debug!(
            key = %self.name(),
            group,
            consumer,
            count = batch.messages.len(),
            duration = ?start.elapsed(),
            "xgroup read successfully"
        );
        Ok(batch.messages)
    }
}
