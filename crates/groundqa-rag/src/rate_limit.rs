//! Sliding-window admission control per caller identifier.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use groundqa_core::config::RateLimitSettings;

pub struct RateLimiter {
    enabled: bool,
    max_requests: usize,
    window: Duration,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

fn prune(stamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while stamps.front().is_some_and(|ts| now.saturating_duration_since(*ts) >= window) {
        stamps.pop_front();
    }
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self { enabled: true, max_requests, window, windows: Mutex::new(HashMap::new()) }
    }

    /// Admits everything and records nothing.
    pub fn disabled(max_requests: usize, window: Duration) -> Self {
        Self { enabled: false, ..Self::new(max_requests, window) }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        let window = Duration::from_secs(settings.window_secs);
        if settings.enabled {
            Self::new(settings.max_requests, window)
        } else {
            Self::disabled(settings.max_requests, window)
        }
    }

    pub fn max_requests(&self) -> usize { self.max_requests }
    pub fn window(&self) -> Duration { self.window }

    fn windows(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_allowed(&self, identifier: &str) -> bool { self.is_allowed_at(identifier, Instant::now()) }

    /// Check and book a slot under one lock.
    pub fn is_allowed_at(&self, identifier: &str, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }
        let mut windows = self.windows();
        let stamps = windows.entry(identifier.to_string()).or_default();
        prune(stamps, now, self.window);
        if stamps.len() >= self.max_requests {
            debug!(identifier, in_window = stamps.len(), "rate limit reached");
            return false;
        }
        stamps.push_back(now);
        true
    }

    pub fn get_remaining(&self, identifier: &str) -> usize { self.get_remaining_at(identifier, Instant::now()) }

    pub fn get_remaining_at(&self, identifier: &str, now: Instant) -> usize {
        if !self.enabled {
            return self.max_requests;
        }
        let mut windows = self.windows();
        match windows.get_mut(identifier) {
            Some(stamps) => {
                prune(stamps, now, self.window);
                self.max_requests.saturating_sub(stamps.len())
            }
            None => self.max_requests,
        }
    }

    pub fn sweep_idle(&self) -> usize { self.sweep_idle_at(Instant::now()) }

    /// Prune every window and forget identifiers left empty. Returns how many
    /// identifiers were dropped.
    pub fn sweep_idle_at(&self, now: Instant) -> usize {
        let mut windows = self.windows();
        let before = windows.len();
        windows.retain(|_, stamps| {
            prune(stamps, now, self.window);
            !stamps.is_empty()
        });
        before - windows.len()
    }

    pub fn tracked(&self) -> usize { self.windows().len() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_exactly_n_then_recovers_after_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();
        for i in 0..3 {
            assert!(limiter.is_allowed_at("10.0.0.1", t0 + Duration::from_secs(i)));
        }
        assert!(!limiter.is_allowed_at("10.0.0.1", t0 + Duration::from_secs(5)));
        assert_eq!(limiter.get_remaining_at("10.0.0.1", t0 + Duration::from_secs(5)), 0);
        // A rejected call books nothing, so the first slot frees at t0+60.
        assert!(limiter.is_allowed_at("10.0.0.1", t0 + Duration::from_secs(60)));
        assert!(!limiter.is_allowed_at("10.0.0.1", t0 + Duration::from_secs(60)));
    }

    #[test]
    fn identifiers_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(limiter.is_allowed_at("a", t0));
        assert!(!limiter.is_allowed_at("a", t0));
        assert!(limiter.is_allowed_at("b", t0));
    }

    #[test]
    fn get_remaining_does_not_record() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        assert_eq!(limiter.get_remaining_at("a", t0), 2);
        assert_eq!(limiter.get_remaining_at("a", t0), 2);
        assert_eq!(limiter.tracked(), 0);
        limiter.is_allowed_at("a", t0);
        assert_eq!(limiter.get_remaining_at("a", t0), 1);
    }

    #[test]
    fn sweep_drops_idle_identifiers() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        let t0 = Instant::now();
        limiter.is_allowed_at("old", t0);
        limiter.is_allowed_at("fresh", t0 + Duration::from_secs(8));
        assert_eq!(limiter.sweep_idle_at(t0 + Duration::from_secs(12)), 1);
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn disabled_always_allows() {
        let limiter = RateLimiter::disabled(1, Duration::from_secs(60));
        for _ in 0..5 {
            assert!(limiter.is_allowed("x"));
        }
        assert_eq!(limiter.get_remaining("x"), 1);
    }
}
