//! 统一错误处理模块
//!
//! 定义键操作、连接管理和分布式锁共用的错误类型，使用 thiserror 提供良好的错误信息。
//! 存储层（Redis）返回的错误原样透传，不做二次包装。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum RoError {
    // ==================== 连接错误 ====================
    #[error("Redis 配置未定义")]
    ConfigUndefined,

    #[error("Redis 错误: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("存储错误: {0}")]
    Store(String),

    // ==================== 读取结果 ====================
    /// 单值读取（GET/HGET）时存储返回 nil
    #[error("键不存在: {key}")]
    Nil { key: String },

    #[error("记录未找到")]
    RecordNotFound,

    #[error("结果数量不匹配: 请求 {expected}, 实际 {actual}")]
    InvalidResultCount { expected: usize, actual: usize },

    // ==================== 参数错误 ====================
    #[error("无效的请求: {0}")]
    BadRequest(String),

    // ==================== 锁执行错误 ====================
    #[error("锁处理函数异常退出: {0}")]
    HandlerFault(String),

    #[error("执行超时")]
    DeadlineExceeded,

    #[error("执行已取消")]
    Cancelled,

    // ==================== 编解码错误 ====================
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("数值解析错误: {0}")]
    Parse(#[from] std::num::ParseIntError),

    // ==================== 配置错误 ====================
    #[error("配置加载失败: {0}")]
    Config(#[from] config::ConfigError),

    #[error("无效的配置: {0}")]
    InvalidConfig(String),

    // ==================== 通用错误 ====================
    #[error("{0}")]
    Custom(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, RoError>;

impl RoError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigUndefined => "CONFIG_UNDEFINED",
            Self::Redis(_) => "REDIS_ERROR",
            Self::Store(_) => "STORE_ERROR",
            Self::Nil { .. } => "NIL",
            Self::RecordNotFound => "RECORD_NOT_FOUND",
            Self::InvalidResultCount { .. } => "INVALID_RESULT_COUNT",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::HandlerFault(_) => "HANDLER_FAULT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Cancelled => "CANCELLED",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Parse(_) => "PARSE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Custom(_) => "CUSTOM_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 本层不做任何内部重试，该判断仅供调用方制定重试策略。
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Redis(e) => e.is_io_error() || e.is_timeout() || e.is_connection_dropped(),
            Self::DeadlineExceeded => true,
            _ => false,
        }
    }

    /// 是否为存储返回的 nil
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil { .. })
    }
}
