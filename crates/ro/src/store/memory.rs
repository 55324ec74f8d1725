//! 内存存储
//!
//! 使用 DashMap 实现的高并发内存存储，适用于测试和开发环境。
//! 语义尽量贴近 Redis：惰性过期、原子的 SET NX、键类型检查、流与消费组。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use super::{
    Connector, Store, StoreHandle, StreamBatch, StreamMessage, Ttl, XAddArgs, XReadGroupArgs,
};
use crate::config::RedisConfig;
use crate::error::{Result, RoError};

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// 流消息 ID（毫秒时间戳-序号）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
struct EntryId {
    ms: u64,
    seq: u64,
}

impl EntryId {
    fn parse(raw: &str) -> Result<Self> {
        let invalid = || RoError::Store(format!("ERR Invalid stream ID specified: {}", raw));
        match raw.split_once('-') {
            Some((ms, seq)) => Ok(Self {
                ms: ms.parse().map_err(|_| invalid())?,
                seq: seq.parse().map_err(|_| invalid())?,
            }),
            None => Ok(Self {
                ms: raw.parse().map_err(|_| invalid())?,
                seq: 0,
            }),
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

#[derive(Debug, Default)]
struct ConsumerGroup {
    last_delivered: EntryId,
    /// 已投递未确认的消息及其消费者
    pending: BTreeMap<EntryId, String>,
}

#[derive(Debug, Default)]
struct StreamData {
    entries: Vec<(EntryId, HashMap<String, String>)>,
    last_id: EntryId,
    groups: HashMap<String, ConsumerGroup>,
}

#[derive(Debug)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    Stream(StreamData),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

/// 内存存储
///
/// 基于 DashMap 实现，单键操作在分片锁内完成，因此 `set_nx` 是原子的。
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: DashMap<String, Entry>,
    pings: AtomicUsize,
    offline: AtomicBool,
}

impl MemoryStore {
    /// 创建新的内存存储实例
    pub fn new() -> Self {
        Self::default()
    }

    /// 已执行的连通性探测次数
    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// 模拟存储不可达，之后的 ping 都会失败
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// 获取键总数（包含尚未清理的过期键）
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// 惰性清理过期键
    fn purge(&self, key: &str) {
        self.data.remove_if(key, |_, entry| entry.is_expired());
    }

    fn read<T>(&self, key: &str, f: impl FnOnce(&Value) -> Result<T>) -> Result<Option<T>> {
        self.purge(key);
        match self.data.get(key) {
            Some(entry) => f(&entry.value).map(Some),
            None => Ok(None),
        }
    }

    /// 取出或创建指定类型的值并修改
    ///
    /// 键不存在时只有修改成功才会写入新值，失败的命令不会留下空键。
    fn write<T>(
        &self,
        key: &str,
        create: impl FnOnce() -> Value,
        f: impl FnOnce(&mut Value) -> Result<T>,
    ) -> Result<T> {
        self.purge(key);
        match self.data.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => f(&mut occupied.get_mut().value),
            MapEntry::Vacant(vacant) => {
                let mut value = create();
                let result = f(&mut value)?;
                vacant.insert(Entry::new(value));
                Ok(result)
            }
        }
    }

    /// 修改已存在的值；修改后若集合类值为空则删除键
    fn modify<T: Default>(&self, key: &str, f: impl FnOnce(&mut Value) -> Result<T>) -> Result<T> {
        self.purge(key);
        let result = match self.data.get_mut(key) {
            Some(mut entry) => f(&mut entry.value)?,
            None => return Ok(T::default()),
        };
        self.data.remove_if(key, |_, entry| match &entry.value {
            Value::Hash(hash) => hash.is_empty(),
            Value::Set(set) => set.is_empty(),
            _ => false,
        });
        Ok(result)
    }

    fn next_auto_id(last: EntryId) -> EntryId {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        if now > last.ms {
            EntryId { ms: now, seq: 0 }
        } else {
            EntryId {
                ms: last.ms,
                seq: last.seq + 1,
            }
        }
    }

    fn read_group_once(&self, key: &str, args: &XReadGroupArgs) -> Result<Vec<StreamMessage>> {
        self.purge(key);
        let mut entry = self.data.get_mut(key).ok_or_else(|| no_group(key, &args.group))?;
        let Value::Stream(stream) = &mut entry.value else {
            return Err(RoError::Store(WRONG_TYPE.to_string()));
        };

        let StreamData {
            entries, groups, ..
        } = stream;
        let group = groups
            .get_mut(&args.group)
            .ok_or_else(|| no_group(key, &args.group))?;

        let limit = if args.count == 0 {
            usize::MAX
        } else {
            args.count as usize
        };
        let delivered: Vec<(EntryId, StreamMessage)> = entries
            .iter()
            .filter(|(id, _)| *id > group.last_delivered)
            .take(limit)
            .map(|(id, values)| {
                let message = StreamMessage {
                    id: id.to_string(),
                    values: values.clone(),
                };
                (*id, message)
            })
            .collect();

        for (id, _) in &delivered {
            group.last_delivered = *id;
            if !args.no_ack {
                group.pending.insert(*id, args.consumer.clone());
            }
        }

        Ok(delivered.into_iter().map(|(_, message)| message).collect())
    }
}

/// 计算过期时刻，溢出时与 Redis 一致视为非法过期时间
fn expires_at(expiration: Duration) -> Result<Instant> {
    Instant::now()
        .checked_add(expiration)
        .ok_or_else(|| RoError::Store("ERR invalid expire time".to_string()))
}

fn wrong_type<T>() -> Result<T> {
    Err(RoError::Store(WRONG_TYPE.to_string()))
}

fn no_group(key: &str, group: &str) -> RoError {
    RoError::Store(format!(
        "NOGROUP No such key '{}' or consumer group '{}'",
        key, group
    ))
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RoError::Store("connection refused".to_string()));
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<u64> {
        self.purge(key);
        Ok(self.data.remove(key).map_or(0, |_| 1))
    }

    async fn expire(&self, key: &str, expiration: Duration) -> Result<bool> {
        self.purge(key);
        let at = expires_at(expiration)?;
        Ok(match self.data.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(at);
                true
            }
            None => false,
        })
    }

    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> Result<bool> {
        self.purge(key);
        let remaining = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        if remaining.is_zero() {
            // 过期时间已过，与 Redis 一致直接删除
            return Ok(self.data.remove(key).is_some());
        }
        self.expire(key, remaining).await
    }

    async fn ttl(&self, key: &str) -> Result<Ttl> {
        self.purge(key);
        Ok(match self.data.get(key) {
            None => Ttl::Missing,
            Some(entry) => match entry.expires_at {
                None => Ttl::NoExpiry,
                Some(at) => Ttl::ExpiresIn(at.saturating_duration_since(Instant::now())),
            },
        })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.purge(key);
        Ok(self.data.contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.read(key, |value| match value {
            Value::Str(s) => Ok(s.clone()),
            _ => wrong_type(),
        })
    }

    async fn set(&self, key: &str, value: &str, expiration: Option<Duration>) -> Result<()> {
        let entry = Entry {
            value: Value::Str(value.to_string()),
            expires_at: expiration.map(expires_at).transpose()?,
        };
        self.data.insert(key.to_string(), entry);
        Ok(())
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        expiration: Option<Duration>,
    ) -> Result<bool> {
        let entry = Entry {
            value: Value::Str(value.to_string()),
            expires_at: expiration.map(expires_at).transpose()?,
        };

        // entry 持有分片写锁，检查与写入在同一临界区内完成
        Ok(match self.data.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(entry);
                    true
                } else {
                    false
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(entry);
                true
            }
        })
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.write(
            key,
            || Value::Str("0".to_string()),
            |value| match value {
                Value::Str(s) => {
                    let current: i64 = s.parse().map_err(|_| {
                        RoError::Store("ERR value is not an integer or out of range".to_string())
                    })?;
                    let next = current.checked_add(delta).ok_or_else(|| {
                        RoError::Store("ERR increment or decrement would overflow".to_string())
                    })?;
                    *s = next.to_string();
                    Ok(next)
                }
                _ => wrong_type(),
            },
        )
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let value = self.read(key, |value| match value {
            Value::Hash(hash) => Ok(hash.get(field).cloned()),
            _ => wrong_type(),
        })?;
        Ok(value.flatten())
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>> {
        let values = self.read(key, |value| match value {
            Value::Hash(hash) => Ok(fields.iter().map(|f| hash.get(f).cloned()).collect()),
            _ => wrong_type(),
        })?;
        Ok(values.unwrap_or_else(|| vec![None; fields.len()]))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let values = self.read(key, |value| match value {
            Value::Hash(hash) => Ok(hash.clone()),
            _ => wrong_type(),
        })?;
        Ok(values.unwrap_or_default())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<u64> {
        self.write(
            key,
            || Value::Hash(HashMap::new()),
            |current| match current {
                Value::Hash(hash) => Ok(match hash.insert(field.to_string(), value.to_string()) {
                    Some(_) => 0,
                    None => 1,
                }),
                _ => wrong_type(),
            },
        )
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64> {
        self.modify(key, |value| match value {
            Value::Hash(hash) => Ok(fields.iter().filter(|f| hash.remove(*f).is_some()).count() as u64),
            _ => wrong_type(),
        })
    }

    async fn hlen(&self, key: &str) -> Result<u64> {
        let count = self.read(key, |value| match value {
            Value::Hash(hash) => Ok(hash.len() as u64),
            _ => wrong_type(),
        })?;
        Ok(count.unwrap_or(0))
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64> {
        self.write(
            key,
            || Value::Set(HashSet::new()),
            |value| match value {
                Value::Set(set) => {
                    Ok(members.iter().filter(|m| set.insert((*m).clone())).count() as u64)
                }
                _ => wrong_type(),
            },
        )
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<u64> {
        self.modify(key, |value| match value {
            Value::Set(set) => Ok(members.iter().filter(|m| set.remove(*m)).count() as u64),
            _ => wrong_type(),
        })
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let found = self.read(key, |value| match value {
            Value::Set(set) => Ok(set.contains(member)),
            _ => wrong_type(),
        })?;
        Ok(found.unwrap_or(false))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let members = self.read(key, |value| match value {
            Value::Set(set) => Ok(set.iter().cloned().collect()),
            _ => wrong_type(),
        })?;
        Ok(members.unwrap_or_default())
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        let count = self.read(key, |value| match value {
            Value::Set(set) => Ok(set.len() as u64),
            _ => wrong_type(),
        })?;
        Ok(count.unwrap_or(0))
    }

    async fn xadd(&self, key: &str, args: &XAddArgs) -> Result<String> {
        if args.values.is_empty() {
            return Err(RoError::Store(
                "ERR wrong number of arguments for 'xadd' command".to_string(),
            ));
        }

        self.write(
            key,
            || Value::Stream(StreamData::default()),
            |value| {
                let Value::Stream(stream) = value else {
                    return wrong_type();
                };

                let id = if args.id == "*" {
                    Self::next_auto_id(stream.last_id)
                } else {
                    EntryId::parse(&args.id)?
                };
                if id <= stream.last_id {
                    return Err(RoError::Store(
                        "ERR The ID specified in XADD is equal or smaller than the target stream top item"
                            .to_string(),
                    ));
                }

                stream.entries.push((id, args.values.clone()));
                stream.last_id = id;

                // 精确裁剪也满足近似裁剪的语义
                if args.max_len > 0 && stream.entries.len() as u64 > args.max_len {
                    let overflow = stream.entries.len() - args.max_len as usize;
                    stream.entries.drain(..overflow);
                }

                Ok(id.to_string())
            },
        )
    }

    async fn xack(&self, key: &str, group: &str, ids: &[String]) -> Result<u64> {
        let parsed = ids
            .iter()
            .map(|id| EntryId::parse(id))
            .collect::<Result<Vec<_>>>()?;

        self.modify(key, |value| match value {
            Value::Stream(stream) => Ok(match stream.groups.get_mut(group) {
                Some(consumer_group) => parsed
                    .iter()
                    .filter(|id| consumer_group.pending.remove(*id).is_some())
                    .count() as u64,
                None => 0,
            }),
            _ => wrong_type(),
        })
    }

    async fn xgroup_create_mkstream(&self, key: &str, group: &str, pos: &str) -> Result<()> {
        self.write(
            key,
            || Value::Stream(StreamData::default()),
            |value| {
                let Value::Stream(stream) = value else {
                    return wrong_type();
                };
                if stream.groups.contains_key(group) {
                    return Err(RoError::Store(
                        "BUSYGROUP Consumer Group name already exists".to_string(),
                    ));
                }

                let last_delivered = match pos {
                    "$" => stream.last_id,
                    other => EntryId::parse(other)?,
                };
                stream.groups.insert(
                    group.to_string(),
                    ConsumerGroup {
                        last_delivered,
                        pending: BTreeMap::new(),
                    },
                );
                Ok(())
            },
        )
    }

    async fn xread_group(
        &self,
        key: &str,
        args: &XReadGroupArgs,
    ) -> Result<Option<Vec<StreamBatch>>> {
        let mut messages = self.read_group_once(key, args)?;
        if let (true, Some(block)) = (messages.is_empty(), args.block) {
            tokio::time::sleep(block).await;
            messages = self.read_group_once(key, args)?;
        }

        if messages.is_empty() {
            return Ok(None);
        }
        Ok(Some(vec![StreamBatch {
            stream: key.to_string(),
            messages,
        }]))
    }
}

/// 内存连接构造器
///
/// 每次连接都返回同一个 [`MemoryStore`]，并记录连接次数，可预设失败次数。
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
    connects: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            ..Default::default()
        }
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }

    /// 已执行的连接次数（包括失败的）
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// 接下来的 n 次连接返回错误
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _config: &RedisConfig) -> Result<StoreHandle> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(RoError::Store("connection refused".to_string()));
        }

        let store: StoreHandle = self.store.clone();
        Ok(store)
    }
}
