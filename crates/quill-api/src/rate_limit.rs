use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::error::AppError;

/// Fixed-window limiter for the AI endpoints, keyed by endpoint and client.
#[derive(Clone)]
pub struct EndpointRateLimiter {
    state: Arc<Mutex<HashMap<String, RateWindow>>>,
    window: Duration,
    limit: u32,
    metrics: Arc<RateLimitMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectedEndpoint {
    Analyze,
    Quiz,
    Chat,
}

#[derive(Default)]
struct RateLimitMetrics {
    allowed: AtomicU64,
    limited: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RateLimitMetricsSnapshot {
    pub allowed: u64,
    pub limited: u64,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

impl EndpointRateLimiter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.rate_limit_window, config.ai_rate_limit_per_window)
    }

    pub fn new(window: Duration, limit: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            window,
            limit,
            metrics: Arc::new(RateLimitMetrics::default()),
        }
    }

    pub async fn check(&self, endpoint: ProtectedEndpoint, client: &str) -> Result<(), AppError> {
        let key = format!("{}:{client}", endpoint.label());
        let now = Instant::now();
        let mut guard = self.state.lock().await;
        guard.retain(|_, window| now.duration_since(window.started_at) < self.window);
        let entry = guard.entry(key).or_insert(RateWindow {
            started_at: now,
            count: 0,
        });

        if entry.count >= self.limit {
            let retry_after_secs = self
                .window
                .saturating_sub(now.duration_since(entry.started_at))
                .as_secs();
            self.metrics.limited.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                endpoint = endpoint.label(),
                client = client_fingerprint(client),
                retry_after_secs,
                "Rate limit exceeded"
            );
            return Err(AppError::too_many_requests(
                "Rate limit exceeded for AI endpoint",
                retry_after_secs,
            ));
        }

        entry.count += 1;
        self.metrics.allowed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            allowed: self.metrics.allowed.load(Ordering::Relaxed),
            limited: self.metrics.limited.load(Ordering::Relaxed),
        }
    }
}

impl ProtectedEndpoint {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Analyze => "ai_analyze",
            Self::Quiz => "ai_quiz",
            Self::Chat => "ai_chat",
        }
    }
}

/// Stable, non-reversible tag for a client in logs.
pub fn client_fingerprint(client: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    client.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_blocks_after_limit() {
        let limiter = EndpointRateLimiter::new(Duration::from_secs(60), 2);

        limiter
            .check(ProtectedEndpoint::Analyze, "10.0.0.1")
            .await
            .unwrap();
        limiter
            .check(ProtectedEndpoint::Analyze, "10.0.0.1")
            .await
            .unwrap();

        let err = limiter
            .check(ProtectedEndpoint::Analyze, "10.0.0.1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TooManyRequests(_, secs) if secs <= 60));

        let metrics = limiter.metrics_snapshot();
        assert_eq!(metrics.allowed, 2);
        assert_eq!(metrics.limited, 1);
    }

    #[tokio::test]
    async fn limits_are_per_client_and_endpoint() {
        let limiter = EndpointRateLimiter::new(Duration::from_secs(60), 1);

        limiter.check(ProtectedEndpoint::Quiz, "a").await.unwrap();
        limiter.check(ProtectedEndpoint::Quiz, "b").await.unwrap();
        limiter.check(ProtectedEndpoint::Chat, "a").await.unwrap();
        assert!(limiter.check(ProtectedEndpoint::Quiz, "a").await.is_err());
    }

    #[tokio::test]
    async fn window_resets_after_expiry() {
        let limiter = EndpointRateLimiter::new(Duration::from_millis(20), 1);

        limiter.check(ProtectedEndpoint::Chat, "a").await.unwrap();
        assert!(limiter.check(ProtectedEndpoint::Chat, "a").await.is_err());
        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter.check(ProtectedEndpoint::Chat, "a").await.unwrap();
    }
}
