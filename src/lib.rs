//! 工作区根包
//!
//! 仅承载基准测试（benches/）和端到端测试（tests/e2e/），业务代码位于 `crates/ro`。

pub use ro;
