//! 端到端测试
//!
//! 针对真实 Redis 验证键操作和分布式锁，默认忽略，需要时通过
//! `REDIS_ADDR=127.0.0.1:6379 cargo test --test e2e -- --ignored` 运行。
//! 测试覆盖：
//! - 连接管理（配置、连通性探测、共享句柄）
//! - 分布式锁（互斥、过期释放、超时、panic 隔离）
//! - 字符串、哈希、集合键
//! - 流与消费组

pub mod setup;
pub mod suites;

pub use setup::TestEnvironment;
