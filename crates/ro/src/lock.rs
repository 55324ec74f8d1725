//! 分布式锁
//!
//! 基于存储的 SET NX 实现跨进程互斥：抢到锁的调用方在与锁过期时间相同的期限内执行处理函数，
//! 未抢到锁的调用方直接返回 `Ok(None)`，不视为错误。
//!
//! 锁不会被显式释放，而是依赖存储端过期自动释放，持锁方崩溃也不会造成永久死锁。
//! 处理函数在独立任务中运行，panic 会被转换为 [`RoError::HandlerFault`]。
//!
//! ```ignore
//! let key = StringKey::new("job:daily-report:lock");
//! let result = key
//!     .get_locker(Duration::from_secs(30), |ctx| async move {
//!         generate_report(ctx).await
//!     })
//!     .await?;
//! if result.is_none() {
//!     // 其他实例正在执行
//! }
//! ```

use std::any::Any;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{Result, RoError};
use crate::string::StringKey;

/// 锁过期时间上限
pub const MAX_LOCK_EXPIRATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// 持锁期间的执行上下文
///
/// 期限到达或调用方取消时，上下文会被取消；处理函数应在长耗时步骤之间检查取消状态。
#[derive(Debug, Clone)]
pub struct LockContext {
    key: String,
    deadline: Instant,
    token: CancellationToken,
}

impl LockContext {
    /// 锁键名
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 执行期限，与锁的过期时间一致
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待上下文被取消
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl StringKey {
    /// 获取锁并执行处理函数
    ///
    /// - 未抢到锁：返回 `Ok(None)`，处理函数不会执行
    /// - 处理函数在期限内完成：返回其结果
    /// - 超过期限：返回 [`RoError::DeadlineExceeded`]，处理函数所在任务不会被强制终止
    pub async fn get_locker<T, F, Fut>(&self, expiration: Duration, handler: F) -> Result<Option<T>>
    where
        F: FnOnce(LockContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.get_locker_with_cancel(&CancellationToken::new(), expiration, handler)
            .await
    }

    /// 获取锁并执行处理函数，同时响应调用方的取消信号
    ///
    /// 调用方取消时返回 [`RoError::Cancelled`]，锁仍然等到过期后才释放。
    pub async fn get_locker_with_cancel<T, F, Fut>(
        &self,
        parent: &CancellationToken,
        expiration: Duration,
        handler: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(LockContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        // 过期时间为 0 的锁在持锁方崩溃后无法自动释放
        if expiration.is_zero() {
            warn!(key = %self.name(), "lock expiration must be greater than zero");
            return Err(RoError::BadRequest(
                "lock expiration must be greater than zero".to_string(),
            ));
        }
        if expiration > MAX_LOCK_EXPIRATION {
            warn!(
                key = %self.name(),
                expiration = ?expiration,
                max = ?MAX_LOCK_EXPIRATION,
                "lock expiration exceeds the maximum"
            );
            return Err(RoError::BadRequest(format!(
                "lock expiration must not exceed {:?}",
                MAX_LOCK_EXPIRATION
            )));
        }
        if parent.is_cancelled() {
            return Err(RoError::Cancelled);
        }

        if !self.set_nx("", Some(expiration)).await? {
            debug!(key = %self.name(), "lock is held by another owner");
            return Ok(None);
        }

        let start = Instant::now();
        let deadline = start
            .checked_add(expiration)
            .ok_or_else(|| RoError::BadRequest("lock deadline overflows".to_string()))?;
        let token = parent.child_token();
        let ctx = LockContext {
            key: self.name().to_string(),
            deadline,
            token: token.clone(),
        };

        let mut task = tokio::spawn(async move { handler(ctx).await });

        let result = tokio::select! {
            biased;

            joined = &mut task => match joined {
                Ok(result) => result.map(Some),
                Err(e) => Err(handler_fault(e)),
            },
            _ = sleep_until(deadline) => {
                token.cancel();
                Err(RoError::DeadlineExceeded)
            }
            _ = parent.cancelled() => {
                token.cancel();
                Err(RoError::Cancelled)
            }
        };

        match &result {
            Ok(_) => debug!(
                key = %self.name(),
                expiration = ?expiration,
                duration = ?start.elapsed(),
                "lock handler finished"
            ),
            Err(e) => warn!(
                key = %self.name(),
                expiration = ?expiration,
                error = %e,
                duration = ?start.elapsed(),
                "lock handler failed"
            ),
        }
        result
    }
}

fn handler_fault(err: JoinError) -> RoError {
    if !err.is_panic() {
        return RoError::HandlerFault("handler task was cancelled".to_string());
    }

    let message = panic_message(err.into_panic());
    error!(panic = %message, "lock handler panicked");
    RoError::HandlerFault(message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
