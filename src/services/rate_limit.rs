//! Requests-per-minute and tokens-per-minute throttling with usage accounting.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep_until};

use crate::models::RateLimitConfig;

const WINDOW: Duration = Duration::from_secs(60);

/// Token counters reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

#[derive(Debug, Default)]
struct Window {
    requests: VecDeque<Instant>,
    tokens: VecDeque<(Instant, u64)>,
}

impl Window {
    fn prune(&mut self, now: Instant) {
        while self
            .requests
            .front()
            .is_some_and(|at| now.duration_since(*at) >= WINDOW)
        {
            self.requests.pop_front();
        }
        while self
            .tokens
            .front()
            .is_some_and(|(at, _)| now.duration_since(*at) >= WINDOW)
        {
            self.tokens.pop_front();
        }
    }

    fn tokens_in_window(&self) -> u64 {
        self.tokens.iter().map(|(_, t)| *t).sum()
    }

    /// Earliest instant at which a new request may be issued, if not now.
    fn ready_at(&self, rpm: u32, tpm: u64) -> Option<Instant> {
        let mut ready: Option<Instant> = None;

        if rpm > 0 && self.requests.len() >= rpm as usize {
            let excess = self.requests.len() - rpm as usize;
            if let Some(at) = self.requests.get(excess) {
                ready = Some(*at + WINDOW);
            }
        }

        if tpm > 0 {
            let mut used = self.tokens_in_window();
            for (at, tokens) in &self.tokens {
                if used < tpm {
                    break;
                }
                used -= tokens;
                let until = *at + WINDOW;
                ready = Some(ready.map_or(until, |r| r.max(until)));
            }
        }

        ready
    }
}

/// Sliding one-minute window over request timestamps and consumed tokens.
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_minute: u32,
    tokens_per_minute: u64,
    window: Mutex<Window>,
    usage: Mutex<TokenUsage>,
}

impl RateLimiter {
    /// A ceiling of zero disables that check.
    pub fn new(requests_per_minute: u32, tokens_per_minute: u64) -> Self {
        Self {
            requests_per_minute,
            tokens_per_minute,
            window: Mutex::new(Window::default()),
            usage: Mutex::new(TokenUsage::default()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_minute, config.tokens_per_minute)
    }

    /// Wait until one more request fits under both ceilings, then reserve it.
    pub async fn acquire(&self) {
        loop {
            let ready_at = {
                let mut window = self.lock_window();
                let now = Instant::now();
                window.prune(now);
                match window.ready_at(self.requests_per_minute, self.tokens_per_minute) {
                    Some(at) if at > now => Some(at),
                    _ => {
                        window.requests.push_back(now);
                        None
                    }
                }
            };

            match ready_at {
                Some(at) => {
                    tracing::debug!(
                        wait_ms = at.saturating_duration_since(Instant::now()).as_millis() as u64,
                        "rate limit reached, waiting"
                    );
                    sleep_until(at).await;
                }
                None => return,
            }
        }
    }

    /// Record the usage of a completed request.
    pub fn record(&self, usage: &TokenUsage) {
        self.lock_window()
            .tokens
            .push_back((Instant::now(), usage.total_tokens));
        self.usage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .add(usage);
    }

    /// Cumulative usage since creation.
    pub fn usage(&self) -> TokenUsage {
        *self
            .usage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Tokens recorded in the trailing minute.
    pub fn tokens_last_minute(&self) -> u64 {
        let mut window = self.lock_window();
        window.prune(Instant::now());
        window.tokens_in_window()
    }

    fn lock_window(&self) -> std::sync::MutexGuard<'_, Window> {
        self.window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(total: u64) -> TokenUsage {
        TokenUsage {
            prompt_tokens: total / 2,
            completion_tokens: total - total / 2,
            total_tokens: total,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_under_limit_do_not_wait() {
        let limiter = RateLimiter::new(3, 0);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rpm_ceiling_delays_next_request() {
        let limiter = RateLimiter::new(2, 0);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tpm_ceiling_delays_next_request() {
        let limiter = RateLimiter::new(0, 100);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.record(&usage(100));
        limiter.acquire().await;
        assert!(start.elapsed() >= WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_below_ceiling_do_not_wait() {
        let limiter = RateLimiter::new(0, 100);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.record(&usage(99));
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expires() {
        let limiter = RateLimiter::new(0, 1000);
        limiter.record(&usage(400));
        assert_eq!(limiter.tokens_last_minute(), 400);
        tokio::time::advance(WINDOW).await;
        assert_eq!(limiter.tokens_last_minute(), 0);
    }

    #[test]
    fn test_usage_accumulates() {
        let limiter = RateLimiter::new(0, 0);
        limiter.record(&usage(10));
        limiter.record(&usage(5));
        let total = limiter.usage();
        assert_eq!(total.total_tokens, 15);
        assert_eq!(total.prompt_tokens, 5 + 2);
        assert_eq!(total.completion_tokens, 5 + 3);
    }
}
