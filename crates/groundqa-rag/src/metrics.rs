use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Durations kept for the average and p95.
pub const DURATION_WINDOW: usize = 1000;

#[derive(Default)]
struct Counters {
    queries: u64,
    cache_hits: u64,
    cache_misses: u64,
    errors: BTreeMap<String, u64>,
    durations: VecDeque<f64>,
}

/// In-process query counters. When disabled every record call is a no-op.
pub struct Metrics {
    enabled: bool,
    started: Instant,
    counters: Mutex<Counters>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub enabled: bool,
    pub uptime_secs: u64,
    pub queries: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub error_rate: f64,
    pub avg_query_secs: f64,
    pub p95_query_secs: f64,
    pub error_kinds: BTreeMap<String, u64>,
}

fn ratio(n: u64, d: u64) -> f64 {
    if d == 0 { 0.0 } else { n as f64 / d as f64 }
}

impl Metrics {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, started: Instant::now(), counters: Mutex::new(Counters::default()) }
    }

    pub fn is_enabled(&self) -> bool { self.enabled }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_query(&self, duration: Duration, cached: bool) {
        if !self.enabled {
            return;
        }
        let mut c = self.counters();
        c.queries += 1;
        if cached { c.cache_hits += 1 } else { c.cache_misses += 1 }
        c.durations.push_back(duration.as_secs_f64());
        if c.durations.len() > DURATION_WINDOW {
            c.durations.pop_front();
        }
    }

    pub fn record_error(&self, kind: &str) {
        if !self.enabled {
            return;
        }
        *self.counters().errors.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if !self.enabled {
            return MetricsSnapshot::default();
        }
        let uptime_secs = self.started.elapsed().as_secs();
        let c = self.counters();
        let errors: u64 = c.errors.values().sum();
        let mut sorted: Vec<f64> = c.durations.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let avg = if sorted.is_empty() { 0.0 } else { sorted.iter().sum::<f64>() / sorted.len() as f64 };
        let p95 = match sorted.len() {
            0 => 0.0,
            n => sorted[(n * 95).div_ceil(100).clamp(1, n) - 1],
        };
        MetricsSnapshot {
            enabled: true,
            uptime_secs,
            queries: c.queries,
            errors,
            cache_hits: c.cache_hits,
            cache_misses: c.cache_misses,
            cache_hit_rate: ratio(c.cache_hits, c.cache_hits + c.cache_misses),
            error_rate: ratio(errors, c.queries),
            avg_query_secs: avg,
            p95_query_secs: p95,
            error_kinds: c.errors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_hits_misses_and_error_kinds() {
        let m = Metrics::new(true);
        m.record_query(Duration::from_millis(100), false);
        m.record_query(Duration::from_millis(300), true);
        m.record_error("rate_limited");
        m.record_error("rate_limited");
        m.record_error("invalid_input");
        let s = m.snapshot();
        assert_eq!((s.queries, s.cache_hits, s.cache_misses, s.errors), (2, 1, 1, 3));
        assert!((s.cache_hit_rate - 0.5).abs() < 1e-9);
        assert!((s.avg_query_secs - 0.2).abs() < 1e-9);
        assert_eq!(s.error_kinds.get("rate_limited"), Some(&2));
    }

    #[test]
    fn p95_over_last_thousand() {
        let m = Metrics::new(true);
        for i in 1..=1100u64 {
            m.record_query(Duration::from_millis(i), false);
        }
        let s = m.snapshot();
        // Window holds 101..=1100 ms; the 950th of those is 1050 ms.
        assert!((s.p95_query_secs - 1.050).abs() < 1e-9, "{}", s.p95_query_secs);
        assert_eq!(s.queries, 1100);
    }

    #[test]
    fn disabled_records_nothing() {
        let m = Metrics::new(false);
        m.record_query(Duration::from_secs(1), true);
        m.record_error("x");
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }
}
