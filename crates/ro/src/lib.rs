//! Redis 键操作库
//!
//! 按数据类型提供键句柄（字符串、哈希、集合、流），内置结构化日志与 JSON 序列化，
//! 所有句柄共享一个惰性创建的连接；在字符串键之上提供基于 SET NX 的分布式锁。
//!
//! ```ignore
//! ro::set_config(RedisConfig::new("127.0.0.1:6379"));
//!
//! let counter = ro::StringKey::new("stats:visits");
//! counter.increase().await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod hash;
pub mod key;
pub mod lock;
pub mod observability;
pub mod set;
pub mod store;
pub mod stream;
pub mod string;

pub use config::{RedisConfig, RoConfig};
pub use connection::{ConnectionManager, get_redis, must_get_redis, set_config};
pub use error::{Result, RoError};
pub use hash::{HashKey, HashParameterKey};
pub use key::{Key, ParameterKey};
pub use lock::{LockContext, MAX_LOCK_EXPIRATION};
pub use set::{SetKey, SetParameterKey};
pub use store::{StoreHandle, StreamMessage, Ttl, XAddArgs};
pub use stream::{StreamKey, StreamParameterKey};
pub use string::{StringKey, StringParameterKey};
