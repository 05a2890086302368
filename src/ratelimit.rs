//! Local sliding windows rate limiting, keyed by client address.

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;

use crate::AppState;
use crate::config::RateLimit;
use crate::error::{Result, ServerError};

pub const DEFAULT_MAXIMUM_REQUESTS: usize = 20;
/// Seconds.
pub const DEFAULT_WINDOW: u64 = 5;
const X_REAL_IP: &str = "x-real-ip";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Structure of a limiter.
#[derive(Debug)]
pub struct RateLimiter {
    /// Requests allowed per client during `window`.
    maximum_requests: usize,
    window: Duration,
    /// Read the client address from `X-Real-IP` or `X-Forwarded-For`.
    trust_proxy: bool,
    buckets: DashMap<IpAddr, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(maximum_requests: usize, window: Duration, trust_proxy: bool) -> Self {
        Self {
            maximum_requests: maximum_requests.max(1),
            window,
            trust_proxy,
            buckets: DashMap::new(),
        }
    }

    /// Build the limiter from configuration, `None` when disabled.
    pub fn from_config(config: Option<&RateLimit>) -> Option<Self> {
        let config = config.cloned().unwrap_or_default();
        if !config.enabled {
            return None;
        }

        Some(Self::new(
            config.requests.unwrap_or(DEFAULT_MAXIMUM_REQUESTS),
            Duration::from_secs(config.window.unwrap_or(DEFAULT_WINDOW)),
            config.trust_proxy,
        ))
    }

    /// Checks if a new request exceeds the limit. If not, records it.
    ///
    /// On refusal, returns the delay before a slot frees up.
    pub fn check(&self, key: IpAddr) -> std::result::Result<(), Duration> {
        let now = Instant::now();
        let mut bucket = self.buckets.entry(key).or_default();

        // Clean old requests.
        while bucket
            .front()
            .is_some_and(|time| now.duration_since(*time) >= self.window)
        {
            bucket.pop_front();
        }

        if let Some(oldest) = bucket.front().filter(|_| bucket.len() >= self.maximum_requests) {
            return Err(self.window.saturating_sub(now.duration_since(*oldest)));
        }

        bucket.push_back(now);
        Ok(())
    }

    /// Forget clients without any request in the current window.
    pub fn purge(&self) {
        let now = Instant::now();
        self.buckets.retain(|_, bucket| {
            bucket
                .back()
                .is_some_and(|time| now.duration_since(*time) < self.window)
        });
    }

    /// Remove idle clients every `window`.
    pub fn spawn_purge(self: &Arc<Self>) {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.window);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                limiter.purge();
            }
        });
    }

    fn client_ip(&self, req: &Request) -> IpAddr {
        self.trust_proxy
            .then(|| forwarded_ip(req.headers()))
            .flatten()
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

    header(X_REAL_IP)
        .or_else(|| header(X_FORWARDED_FOR).and_then(|list| list.split(',').next()))
        .and_then(|ip| ip.trim().parse().ok())
}

/// Middleware answering `429 Too Many Requests` past the limit.
pub async fn limit(State(state): State<AppState>, req: Request, next: Next) -> Result<Response> {
    if let Some(limiter) = &state.limiter {
        let ip = limiter.client_ip(&req);

        if let Err(retry_after) = limiter.check(ip) {
            tracing::debug!(%ip, ?retry_after, "rate limit exceeded");
            metrics::counter!("rate_limited_total").increment(1);
            return Err(ServerError::TooManyRequests(retry_after));
        }
    }

    Ok(next.run(req).await)
}
