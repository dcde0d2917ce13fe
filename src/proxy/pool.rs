//! Round-robin proxy pool with per-endpoint rolling quotas.
//!
//! All state sits behind one mutex. `acquire` checks the quota and reserves a
//! usage slot in the same critical section, so two workers can never both be
//! granted the last slot of an endpoint.

use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// One egress endpoint and its usage in the current window
#[derive(Debug)]
struct ProxyEndpoint {
    address: String,
    used: u32,
    window_start: Instant,
}

impl ProxyEndpoint {
    fn new(address: String, now: Instant) -> Self {
        Self {
            address,
            used: 0,
            window_start: now,
        }
    }

    /// Lazily roll the window over once it has elapsed
    fn refresh(&mut self, now: Instant, window: Duration) {
        if now.saturating_duration_since(self.window_start) >= window {
            self.used = 0;
            self.window_start = now;
        }
    }

    fn record_use(&mut self) {
        self.used += 1;
    }
}

#[derive(Debug)]
struct PoolState {
    endpoints: Vec<ProxyEndpoint>,
    /// Index of the endpoint the next scan starts at
    cursor: usize,
    evicted: HashSet<String>,
}

/// A reserved usage slot on one endpoint
///
/// Returned by [`ProxyPool::acquire`]. The slot is already counted against the
/// endpoint's quota; hand the lease back to [`ProxyPool::release`] if the
/// attempt never reached the API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lease {
    address: String,
    window_start: Instant,
}

impl Lease {
    /// Proxy address the slot was reserved on
    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Shared pool of proxy endpoints
#[derive(Debug)]
pub struct ProxyPool {
    state: Mutex<PoolState>,
    quota: u32,
    window: Duration,
}

impl ProxyPool {
    /// Create a pool from validated addresses; duplicates are dropped
    pub fn new(addresses: impl IntoIterator<Item = String>, quota: u32, window: Duration) -> Self {
        let now = Instant::now();
        let mut seen = HashSet::new();
        let endpoints = addresses
            .into_iter()
            .filter(|address| seen.insert(address.clone()))
            .map(|address| ProxyEndpoint::new(address, now))
            .collect();

        Self {
            state: Mutex::new(PoolState {
                endpoints,
                cursor: 0,
                evicted: HashSet::new(),
            }),
            quota,
            window,
        }
    }

    /// Grant the next endpoint under quota, reserving one usage slot on it
    ///
    /// Returns `None` when the pool is empty or every endpoint is at quota.
    pub async fn acquire(&self) -> Option<Lease> {
        self.acquire_at(Instant::now()).await
    }

    pub(crate) async fn acquire_at(&self, now: Instant) -> Option<Lease> {
        let mut state = self.state.lock().await;
        let len = state.endpoints.len();
        if len == 0 {
            return None;
        }

        let start = state.cursor % len;
        for offset in 0..len {
            let idx = (start + offset) % len;
            let endpoint = &mut state.endpoints[idx];
            endpoint.refresh(now, self.window);

            if endpoint.used < self.quota {
                endpoint.record_use();
                let lease = Lease {
                    address: endpoint.address.clone(),
                    window_start: endpoint.window_start,
                };
                state.cursor = (idx + 1) % len;
                return Some(lease);
            }
        }

        None
    }

    /// Give back a reservation for an attempt that never completed a request
    ///
    /// No-op if the endpoint was evicted meanwhile or its window rolled over.
    pub async fn release(&self, lease: &Lease) {
        let mut state = self.state.lock().await;
        if let Some(endpoint) = state
            .endpoints
            .iter_mut()
            .find(|e| e.address == lease.address)
            && endpoint.window_start == lease.window_start
        {
            endpoint.used = endpoint.used.saturating_sub(1);
        }
    }

    /// Remove an endpoint for good
    ///
    /// Returns `true` if this call removed it, `false` if it was already gone.
    pub async fn evict(&self, address: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(idx) = state.endpoints.iter().position(|e| e.address == address) else {
            return false;
        };

        state.endpoints.remove(idx);
        state.evicted.insert(address.to_string());

        // Keep the cursor pointing at the same successor
        if idx < state.cursor {
            state.cursor -= 1;
        }
        if state.cursor >= state.endpoints.len() {
            state.cursor = 0;
        }

        tracing::debug!(proxy = %address, remaining = state.endpoints.len(), "proxy removed from pool");
        true
    }

    /// Whether `address` has been evicted
    pub async fn is_evicted(&self, address: &str) -> bool {
        self.state.lock().await.evicted.contains(address)
    }

    /// Number of endpoints still in rotation
    pub async fn len(&self) -> usize {
        self.state.lock().await.endpoints.len()
    }

    /// Whether no endpoints are left
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Usage of `address` in its current window, `None` if not in the pool
    pub async fn usage(&self, address: &str) -> Option<u32> {
        let now = Instant::now();
        let state = self.state.lock().await;
        state
            .endpoints
            .iter()
            .find(|e| e.address == address)
            .map(|e| {
                if now.saturating_duration_since(e.window_start) >= self.window {
                    0
                } else {
                    e.used
                }
            })
    }

    /// Per-window quota every endpoint is held to
    pub fn quota(&self) -> u32 {
        self.quota
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const HOUR: Duration = Duration::from_secs(3600);

    fn pool(addresses: &[&str], quota: u32) -> ProxyPool {
        ProxyPool::new(addresses.iter().map(|a| a.to_string()), quota, HOUR)
    }

    #[tokio::test]
    async fn acquire_rotates_round_robin() {
        let pool = pool(&["http://a", "http://b", "http://c"], 10);

        let mut order = Vec::new();
        for _ in 0..6 {
            order.push(pool.acquire().await.unwrap().address().to_string());
        }

        assert_eq!(
            order,
            ["http://a", "http://b", "http://c", "http://a", "http://b", "http://c"]
        );
    }

    #[tokio::test]
    async fn acquire_reserves_usage_at_grant_time() {
        let pool = pool(&["http://a"], 5);

        pool.acquire().await.unwrap();
        pool.acquire().await.unwrap();

        assert_eq!(pool.usage("http://a").await, Some(2));
    }

    #[tokio::test]
    async fn acquire_skips_endpoints_at_quota() {
        let pool = pool(&["http://a", "http://b"], 1);

        assert_eq!(pool.acquire().await.unwrap().address(), "http://a");
        assert_eq!(pool.acquire().await.unwrap().address(), "http://b");
        assert!(pool.acquire().await.is_none(), "both endpoints are at quota");
    }

    #[tokio::test]
    async fn empty_pool_is_unavailable() {
        let pool = pool(&[], 3);
        assert!(pool.acquire().await.is_none());
        assert!(pool.is_empty().await);
    }

    #[tokio::test]
    async fn window_resets_lazily_on_access() {
        let pool = pool(&["http://a"], 1);
        let start = Instant::now();

        assert!(pool.acquire_at(start).await.is_some());
        assert!(pool.acquire_at(start + Duration::from_secs(10)).await.is_none());

        let lease = pool.acquire_at(start + HOUR + Duration::from_secs(1)).await;
        assert!(lease.is_some(), "window elapsed, quota should be fresh");
    }

    #[tokio::test]
    async fn release_returns_reservation() {
        let pool = pool(&["http://a"], 1);

        let lease = pool.acquire().await.unwrap();
        assert!(pool.acquire().await.is_none());

        pool.release(&lease).await;
        assert_eq!(pool.usage("http://a").await, Some(0));
        assert!(pool.acquire().await.is_some());
    }

    #[tokio::test]
    async fn release_after_window_rollover_is_ignored() {
        let pool = pool(&["http://a"], 2);
        let start = Instant::now();

        let stale = pool.acquire_at(start).await.unwrap();
        pool.acquire_at(start + HOUR).await.unwrap();

        pool.release(&stale).await;

        let state = pool.state.lock().await;
        assert_eq!(state.endpoints[0].used, 1, "fresh window usage must not be decremented");
    }

    #[tokio::test]
    async fn evicted_endpoint_is_never_returned_again() {
        let pool = pool(&["http://a", "http://b", "http://c"], 100);

        assert!(pool.evict("http://b").await);
        assert!(pool.is_evicted("http://b").await);

        for _ in 0..30 {
            let lease = pool.acquire().await.unwrap();
            assert_ne!(lease.address(), "http://b");
        }
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn evict_is_idempotent() {
        let pool = pool(&["http://a"], 1);

        assert!(pool.evict("http://a").await);
        assert!(!pool.evict("http://a").await);
        assert!(!pool.evict("http://unknown").await);
        assert!(pool.acquire().await.is_none());
    }

    #[tokio::test]
    async fn evict_keeps_rotation_position() {
        let pool = pool(&["http://a", "http://b", "http://c"], 100);

        assert_eq!(pool.acquire().await.unwrap().address(), "http://a");
        assert_eq!(pool.acquire().await.unwrap().address(), "http://b");

        // Cursor now points at c; removing a must not make us skip it
        pool.evict("http://a").await;
        assert_eq!(pool.acquire().await.unwrap().address(), "http://c");
        assert_eq!(pool.acquire().await.unwrap().address(), "http://b");
    }

    #[tokio::test]
    async fn evicting_last_slot_wraps_cursor() {
        let pool = pool(&["http://a", "http://b"], 100);

        assert_eq!(pool.acquire().await.unwrap().address(), "http://a");
        pool.evict("http://b").await;
        assert_eq!(pool.acquire().await.unwrap().address(), "http://a");
    }

    #[tokio::test]
    async fn duplicate_addresses_collapse() {
        let pool = pool(&["http://a", "http://a", "http://b"], 1);
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn concurrent_acquire_never_exceeds_quota() {
        let quota = 7;
        let pool = Arc::new(pool(&["http://a", "http://b", "http://c"], quota));

        let mut handles = Vec::new();
        for _ in 0..64 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move { pool.acquire().await }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                granted += 1;
            }
        }

        assert_eq!(granted, 3 * quota as usize);
        for address in ["http://a", "http://b", "http://c"] {
            assert_eq!(pool.usage(address).await, Some(quota));
        }
    }
}
