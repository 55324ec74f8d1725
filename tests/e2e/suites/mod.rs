//! 测试套件模块
//!
//! 按功能组织的测试用例集合。

pub mod connection;
pub mod keys;
pub mod locker;
pub mod streams;
