//! 滑动窗口限流器
//!
//! 按 key（用户 id 或客户端 IP）记录请求时间戳，窗口内超过配额的请求被拒绝。
//! 设计取向是可用性优先：无法取得锁时放行请求，而不是阻断流量。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;

/// 清扫周期：每 5 分钟清理一次空闲 key
const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// 最近一次请求早于 10 分钟的 key 视为空闲，可以回收
const IDLE_THRESHOLD_MS: i64 = 10 * 60 * 1000;

/// 限流错误类型
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded: {limit} requests per {window_seconds} seconds")]
    Exceeded { limit: u32, window_seconds: u64 },
}

impl RateLimitError {
    /// 客户端应等待的秒数，等于窗口大小
    pub fn retry_after(&self) -> u64 {
        match self {
            RateLimitError::Exceeded { window_seconds, .. } => *window_seconds,
        }
    }
}

/// 滑动窗口限流器
/// 每个 key 维护一个毫秒时间戳列表，检查时惰性剔除窗口外的条目。
pub struct SlidingWindowRateLimiter {
    windows: Arc<RwLock<HashMap<String, Vec<i64>>>>,
}

impl SlidingWindowRateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 检查 key 在当前窗口内是否还有配额
    pub fn check(
        &self,
        key: &str,
        limit: u32,
        window_seconds: u64,
    ) -> Result<(), RateLimitError> {
        self.check_at(key, limit, window_seconds, Utc::now().timestamp_millis())
    }

    fn check_at(
        &self,
        key: &str,
        limit: u32,
        window_seconds: u64,
        now_ms: i64,
    ) -> Result<(), RateLimitError> {
        let mut windows = match self.windows.write() {
            Ok(windows) => windows,
            Err(_) => {
                // 锁中毒时放行，可用性优先
                tracing::warn!("rate limiter lock poisoned, failing open");
                return Ok(());
            }
        };

        let cutoff = now_ms - (window_seconds as i64) * 1000;
        let timestamps = windows.entry(key.to_string()).or_default();
        timestamps.retain(|&ts| ts > cutoff);

        if timestamps.len() >= limit as usize {
            return Err(RateLimitError::Exceeded {
                limit,
                window_seconds,
            });
        }

        timestamps.push(now_ms);
        Ok(())
    }

    /// 清理空闲 key，限制内存占用
    pub fn sweep(&self) {
        self.sweep_at(Utc::now().timestamp_millis());
    }

    fn sweep_at(&self, now_ms: i64) {
        if let Ok(mut windows) = self.windows.write() {
            let before = windows.len();
            windows.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|&latest| now_ms - latest < IDLE_THRESHOLD_MS)
            });
            let removed = before - windows.len();
            if removed > 0 {
                tracing::debug!(removed, "swept idle rate limit keys");
            }
        }
    }

    /// 当前跟踪的 key 数量
    pub fn tracked_keys(&self) -> usize {
        self.windows.read().map(|w| w.len()).unwrap_or(0)
    }

    /// 启动后台清扫任务
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            // 第一次 tick 立即返回，跳过
            interval.tick().await;
            loop {
                interval.tick().await;
                limiter.sweep();
            }
        })
    }
}

impl Default for SlidingWindowRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
