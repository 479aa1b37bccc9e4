//! Round-robin scraper host pool with failure tracking.
//!
//! A host that fails `MAX_FAILURES` times in a row is marked unhealthy and
//! skipped for a cool-down window. When every host is unhealthy the pool
//! resets rather than starve.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Consecutive failures before a host is benched
const MAX_FAILURES: u32 = 3;

/// How long an unhealthy host sits out
const COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct HostHealth {
    consecutive_failures: u32,
    unhealthy_until: Option<Instant>,
}

#[derive(Debug)]
struct PoolState {
    cursor: usize,
    health: Vec<HostHealth>,
}

/// Round-robin pool over scraper base URLs
#[derive(Debug)]
pub struct HostPool {
    hosts: Vec<String>,
    state: Mutex<PoolState>,
}

impl HostPool {
    /// Build a pool; at least one host is required
    pub fn new(hosts: Vec<String>) -> Self {
        let health = hosts
            .iter()
            .map(|_| HostHealth {
                consecutive_failures: 0,
                unhealthy_until: None,
            })
            .collect();
        Self {
            hosts,
            state: Mutex::new(PoolState { cursor: 0, health }),
        }
    }

    /// Number of hosts in the pool
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether the pool has no hosts
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Pick the next healthy host, round-robin.
    ///
    /// If every host is benched the pool resets and serves the next host
    /// anyway. Returns the host index (for reporting) and its base URL.
    pub fn acquire(&self) -> (usize, String) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        for _ in 0..self.hosts.len() {
            let index = state.cursor % self.hosts.len();
            state.cursor = state.cursor.wrapping_add(1);

            let health = &mut state.health[index];
            match health.unhealthy_until {
                Some(until) if until > now => continue,
                Some(_) => {
                    // Cool-down expired; give the host another chance
                    health.unhealthy_until = None;
                    health.consecutive_failures = 0;
                    return (index, self.hosts[index].clone());
                }
                None => return (index, self.hosts[index].clone()),
            }
        }

        // Every host is benched: reset and start over
        tracing::warn!("All scraper hosts unhealthy, resetting pool");
        for health in &mut state.health {
            health.consecutive_failures = 0;
            health.unhealthy_until = None;
        }
        let index = state.cursor % self.hosts.len();
        state.cursor = state.cursor.wrapping_add(1);
        (index, self.hosts[index].clone())
    }

    /// Record a successful call against a host
    pub fn report_success(&self, index: usize) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(health) = state.health.get_mut(index) {
            health.consecutive_failures = 0;
            health.unhealthy_until = None;
        }
    }

    /// Record a failed call against a host; benches it after MAX_FAILURES
    pub fn report_failure(&self, index: usize) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(health) = state.health.get_mut(index) {
            health.consecutive_failures += 1;
            if health.consecutive_failures >= MAX_FAILURES {
                tracing::warn!(
                    host = %self.hosts[index],
                    failures = health.consecutive_failures,
                    "Scraper host marked unhealthy"
                );
                health.unhealthy_until = Some(Instant::now() + COOLDOWN);
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> HostPool {
        HostPool::new((0..n).map(|i| format!("http://host-{}.test", i)).collect())
    }

    #[test]
    fn round_robin_cycles_hosts() {
        let pool = pool(3);
        let picks: Vec<usize> = (0..6).map(|_| pool.acquire().0).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn unhealthy_host_is_skipped() {
        let pool = pool(2);
        for _ in 0..MAX_FAILURES {
            pool.report_failure(0);
        }

        let picks: Vec<usize> = (0..4).map(|_| pool.acquire().0).collect();
        assert!(picks.iter().all(|&i| i == 1), "picks were {:?}", picks);
    }

    #[test]
    fn success_clears_failure_streak() {
        let pool = pool(2);
        pool.report_failure(0);
        pool.report_failure(0);
        pool.report_success(0);
        pool.report_failure(0);

        // Streak was broken, so host 0 is still healthy
        let picks: Vec<usize> = (0..4).map(|_| pool.acquire().0).collect();
        assert!(picks.contains(&0));
    }

    #[test]
    fn all_unhealthy_resets_pool() {
        let pool = pool(2);
        for index in 0..2 {
            for _ in 0..MAX_FAILURES {
                pool.report_failure(index);
            }
        }

        // The pool must still serve rather than starve
        let (index, url) = pool.acquire();
        assert!(index < 2);
        assert!(url.starts_with("http://host-"));
    }
}
