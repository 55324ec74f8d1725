//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。
//! Redis 配置在本地不做校验，只有在第一次建立连接时才会暴露问题。

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::{Result, RoError};
use crate::observability::ObservabilityConfig;

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// 服务地址，如 "127.0.0.1:6379"
    pub addr: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// 逻辑库编号
    pub db: i64,
    pub connect_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:6379".to_string(),
            username: None,
            password: None,
            db: 0,
            connect_timeout_ms: 5000,
        }
    }
}

impl RedisConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    pub fn with_credentials(
        mut self,
        username: Option<impl Into<String>>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.map(Into::into);
        self.password = Some(password.into());
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// 生成 redis:// 连接 URL
    ///
    /// 用户名和密码经过 URL 转义，避免特殊字符破坏地址格式。
    pub fn connection_url(&self) -> Result<String> {
        let mut url = Url::parse(&format!("redis://{}", self.addr))
            .map_err(|e| RoError::InvalidConfig(format!("addr {}: {}", self.addr, e)))?;

        if let Some(username) = &self.username {
            url.set_username(username)
                .map_err(|_| RoError::InvalidConfig("username".to_string()))?;
        }
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| RoError::InvalidConfig("password".to_string()))?;
        }
        url.set_path(&format!("/{}", self.db));

        Ok(url.to_string())
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RoConfig {
    pub redis: RedisConfig,
    pub observability: ObservabilityConfig,
}

impl RoConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置，由 RO_ENV 决定）
    /// 3. 环境变量（RO_ 前缀，嵌套字段用双下划线，如 RO_REDIS__ADDR -> redis.addr）
    pub fn load() -> Result<Self> {
        let env = std::env::var("RO_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(Path::new(&config_dir), &env)
    }

    /// 从指定目录加载配置
    pub fn load_from(config_dir: &Path, env: &str) -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                Environment::with_prefix("RO")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }
}
