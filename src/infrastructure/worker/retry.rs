//! Retry - 合成请求的重试执行器
//!
//! 指数退避：第 n 次重试前等待 `base_delay * 2^(n-1)`，上限 `max_delay`。
//! 退避等待可被取消令牌打断。

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 首次尝试之外的最大重试次数
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(120),
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// 重试终止状态
#[derive(Debug)]
pub struct RetryTerminal<E> {
    /// 最后一次尝试的错误
    pub error: E,
    /// 第一次尝试的错误；只尝试过一次时为 None
    pub first_error: Option<E>,
    pub attempts: u32,
    /// 可重试错误用尽了全部重试次数
    pub exhausted_retryable: bool,
    /// 退避等待期间被取消
    pub cancelled: bool,
}

/// 第 `attempt` 次失败后的等待时长
pub fn compute_backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let shift = u32::min(attempt.saturating_sub(1), 20);
    let exponential_ms = policy
        .base_delay
        .as_millis()
        .saturating_mul(1u128 << shift);
    let capped_ms = exponential_ms.min(policy.max_delay.as_millis());
    Duration::from_millis(capped_ms.min(u64::MAX as u128) as u64)
}

/// 在重试策略下执行一个异步操作
///
/// `is_retryable` 决定错误是否可重试；`on_retry(attempt, &error, delay)` 在每次退避前调用。
/// 成功时返回结果和实际尝试次数。
pub async fn run_with_retry<T, E, F, Fut, R, N>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
    mut is_retryable: R,
    mut on_retry: N,
) -> Result<(T, u32), RetryTerminal<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(&E) -> bool,
    N: FnMut(u32, &E, Duration),
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;
    let mut first_error = None;

    loop {
        let error = match op(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(error) => error,
        };

        let retryable = is_retryable(&error);
        if !retryable || attempt >= max_attempts {
            return Err(RetryTerminal {
                error,
                first_error,
                attempts: attempt,
                exhausted_retryable: retryable,
                cancelled: false,
            });
        }

        let delay = compute_backoff_delay(policy, attempt);
        on_retry(attempt, &error, delay);

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(RetryTerminal {
                    error,
                    first_error,
                    attempts: attempt,
                    exhausted_retryable: false,
                    cancelled: true,
                });
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if first_error.is_none() {
            first_error = Some(error);
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_default_backoff_schedule() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..=4)
            .map(|attempt| compute_backoff_delay(&policy, attempt).as_secs())
            .collect();
        assert_eq!(delays, vec![30, 60, 120, 120]);
        assert_eq!(policy.max_attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let delays = Mutex::new(Vec::new());

        let started = tokio::time::Instant::now();
        let (value, attempts) = run_with_retry(
            &policy,
            &cancel,
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err("429 rate limit")
                    } else {
                        Ok("audio")
                    }
                }
            },
            |_| true,
            |_, _, delay| delays.lock().unwrap().push(delay.as_secs()),
        )
        .await
        .unwrap();

        assert_eq!(value, "audio");
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*delays.lock().unwrap(), vec![30, 60]);
        assert!(started.elapsed() >= Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_four_attempts() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();

        let terminal = run_with_retry(
            &policy,
            &cancel,
            |_| async { Err::<(), _>("503 unavailable") },
            |_| true,
            |_, _, _| {},
        )
        .await
        .unwrap_err();

        assert_eq!(terminal.attempts, 4);
        assert!(terminal.exhausted_retryable);
        assert!(!terminal.cancelled);
        assert_eq!(terminal.error, "503 unavailable");
        assert_eq!(terminal.first_error, Some("503 unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_keeps_first_and_last_error() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let errors = ["429 rate limit exceeded", "t2", "t3", "t4"];

        let terminal = run_with_retry(
            &policy,
            &cancel,
            |attempt| {
                let error = errors[attempt as usize - 1];
                async move { Err::<(), _>(error) }
            },
            |_| true,
            |_, _, _| {},
        )
        .await
        .unwrap_err();

        assert_eq!(terminal.attempts, 4);
        assert_eq!(terminal.first_error, Some("429 rate limit exceeded"));
        assert_eq!(terminal.error, "t4");
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();

        let terminal = run_with_retry(
            &policy,
            &cancel,
            |_| async { Err::<(), _>("invalid voice") },
            |_| false,
            |_, _, _| panic!("must not back off"),
        )
        .await
        .unwrap_err();

        assert_eq!(terminal.attempts, 1);
        assert!(!terminal.exhausted_retryable);
        assert!(terminal.first_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_backoff() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let terminal = run_with_retry(
            &policy,
            &cancel,
            |_| async { Err::<(), _>("timeout") },
            |_| true,
            |_, _, _| {},
        )
        .await
        .unwrap_err();

        assert!(terminal.cancelled);
        assert_eq!(terminal.attempts, 1);
        assert!(started.elapsed() < Duration::from_secs(30));
    }
}
