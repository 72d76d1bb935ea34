//! Per-client sliding-window rate limiting.
//!
//! One window per client address, checked lock-free with atomics; the
//! map of clients sits behind an `RwLock` only for first-seen inserts.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{ConnectInfo, Extension, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{envelope::ApiError, AppState};

pub const DEFAULT_MAX_REQUESTS: u64 = 100;
pub const DEFAULT_WINDOW_SECS: u64 = 15 * 60;

struct Window {
    /// Epoch second when the current window started.
    started: AtomicU64,
    /// Requests remaining in the current window.
    remaining: AtomicU64,
}

impl Window {
    fn new(max_requests: u64, now: u64) -> Self {
        Self {
            started: AtomicU64::new(now),
            remaining: AtomicU64::new(max_requests),
        }
    }

    // Benign race at the window boundary: two threads may both observe
    // an expired window and reset it, granting a few extra requests.
    // Approximate enforcement is fine here and avoids a per-request lock.
    fn admit(&self, now: u64, max_requests: u64, window_secs: u64) -> bool {
        let started = self.started.load(Ordering::Relaxed);
        if now.saturating_sub(started) >= window_secs {
            self.started.store(now, Ordering::Relaxed);
            self.remaining.store(max_requests - 1, Ordering::Relaxed);
            return true;
        }

        loop {
            let current = self.remaining.load(Ordering::Relaxed);
            if current == 0 {
                return false;
            }
            if self
                .remaining
                .compare_exchange_weak(current, current - 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }
}

pub struct ClientRateLimiter {
    windows: RwLock<HashMap<IpAddr, Arc<Window>>>,
    max_requests: u64,
    window_secs: u64,
}

impl Default for ClientRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_SECS)
    }
}

impl ClientRateLimiter {
    pub fn new(max_requests: u64, window_secs: u64) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            max_requests,
            window_secs,
        }
    }

    /// Consume one request for `client`. Returns `false` once the window
    /// budget is exhausted.
    pub fn admit(&self, client: IpAddr) -> bool {
        let now = epoch_secs();

        {
            let windows = match self.windows.read() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(window) = windows.get(&client) {
                return window.admit(now, self.max_requests, self.window_secs);
            }
        }

        let mut windows = match self.windows.write() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        let window = windows
            .entry(client)
            .or_insert_with(|| Arc::new(Window::new(self.max_requests, now)));
        window.admit(now, self.max_requests, self.window_secs)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Axum middleware rejecting clients that exhausted their window.
pub async fn enforce(
    Extension(state): Extension<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !state.limiter().admit(addr.ip()) {
        tracing::warn!(client = %addr.ip(), "rate limit exceeded");
        return ApiError::RateLimited.into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    #[test]
    fn rejects_once_window_budget_is_spent() {
        let limiter = ClientRateLimiter::new(3, 60);
        for _ in 0..3 {
            assert!(limiter.admit(client(1)));
        }
        assert!(!limiter.admit(client(1)));
    }

    #[test]
    fn clients_have_independent_windows() {
        let limiter = ClientRateLimiter::new(1, 60);
        assert!(limiter.admit(client(1)));
        assert!(!limiter.admit(client(1)));
        assert!(limiter.admit(client(2)));
    }

    #[test]
    fn expired_window_resets_budget() {
        let limiter = ClientRateLimiter::new(1, 0);
        assert!(limiter.admit(client(1)));
        // window_secs == 0 expires immediately
        assert!(limiter.admit(client(1)));
    }
}
