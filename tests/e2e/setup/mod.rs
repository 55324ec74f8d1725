//! 测试环境设置模块
//!
//! 提供测试环境的初始化、直连校验和清理功能。

mod environment;

pub use environment::{TestEnvConfig, TestEnvironment};
