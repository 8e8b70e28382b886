//! Lock-free judge metrics.
//!
//! Counters and gauges are individual atomics; a snapshot is a set of
//! independent loads and is not a linearizable view of the whole set.

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::verdict::Status;

#[derive(Debug)]
pub struct JudgeMetrics {
    submissions_total: AtomicU64,
    success_total: AtomicU64,
    failure_total: AtomicU64,

    ac_count: AtomicU64,
    wa_count: AtomicU64,
    tle_count: AtomicU64,
    mle_count: AtomicU64,
    re_count: AtomicU64,
    ce_count: AtomicU64,
    se_count: AtomicU64,

    total_judge_time_ms: AtomicU64,
    max_judge_time_ms: AtomicU64,
    min_judge_time_ms: AtomicU64,

    active: AtomicI64,
    max_concurrent: AtomicI64,
    queue_wait: AtomicU64,
    queue_timeout: AtomicU64,

    cache_hits: AtomicU64,
    cache_misses: AtomicU64,

    // Only `reset` mutates the start time, so the mutex is uncontended.
    started_at: Mutex<Instant>,
}

/// Point-in-time view of the metrics, serialized as the monitoring JSON
/// contract.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_submissions: u64,
    pub success_submissions: u64,
    pub failed_submissions: u64,

    pub ac_count: u64,
    pub wa_count: u64,
    pub tle_count: u64,
    pub mle_count: u64,
    pub re_count: u64,
    pub ce_count: u64,
    pub se_count: u64,

    pub avg_judge_time_ms: u64,
    pub max_judge_time_ms: u64,
    pub min_judge_time_ms: u64,

    pub current_active: i64,
    pub max_concurrent: i64,
    pub queue_wait_count: u64,
    pub queue_timeout_count: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,

    pub uptime_seconds: f64,
}

impl Default for JudgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl JudgeMetrics {
    pub fn new() -> Self {
        Self {
            submissions_total: AtomicU64::new(0),
            success_total: AtomicU64::new(0),
            failure_total: AtomicU64::new(0),
            ac_count: AtomicU64::new(0),
            wa_count: AtomicU64::new(0),
            tle_count: AtomicU64::new(0),
            mle_count: AtomicU64::new(0),
            re_count: AtomicU64::new(0),
            ce_count: AtomicU64::new(0),
            se_count: AtomicU64::new(0),
            total_judge_time_ms: AtomicU64::new(0),
            max_judge_time_ms: AtomicU64::new(0),
            min_judge_time_ms: AtomicU64::new(u64::MAX),
            active: AtomicI64::new(0),
            max_concurrent: AtomicI64::new(0),
            queue_wait: AtomicU64::new(0),
            queue_timeout: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            started_at: Mutex::new(Instant::now()),
        }
    }

    pub fn record_submission(&self) {
        self.submissions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, judge_time: Duration, status: Status) {
        self.success_total.fetch_add(1, Ordering::Relaxed);

        let counter = match status {
            Status::Ac => &self.ac_count,
            Status::Wa => &self.wa_count,
            Status::Tle => &self.tle_count,
            Status::Mle => &self.mle_count,
            Status::Re => &self.re_count,
            Status::Ce => &self.ce_count,
            Status::Se => &self.se_count,
            Status::Pending | Status::Running => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let ms = judge_time.as_millis() as u64;
        self.total_judge_time_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_judge_time_ms.fetch_max(ms, Ordering::Relaxed);
        self.min_judge_time_ms.fetch_min(ms, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failure_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Bump the active gauge; returns the new value after tracking the
    /// high-water mark.
    pub fn record_active_increase(&self) -> i64 {
        let current = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_concurrent.fetch_max(current, Ordering::Relaxed);
        current
    }

    pub fn record_active_decrease(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_queue_wait(&self) {
        self.queue_wait.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_timeout(&self) {
        self.queue_timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let success = self.success_total.load(Ordering::Relaxed);
        let total_time = self.total_judge_time_ms.load(Ordering::Relaxed);
        let avg_judge_time_ms = if success > 0 { total_time / success } else { 0 };

        let min_raw = self.min_judge_time_ms.load(Ordering::Relaxed);
        let min_judge_time_ms = if min_raw == u64::MAX { 0 } else { min_raw };

        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let cache_hit_rate = if hits + misses > 0 {
            hits as f64 / (hits + misses) as f64 * 100.0
        } else {
            0.0
        };

        let started_at = *self
            .started_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        MetricsSnapshot {
            total_submissions: self.submissions_total.load(Ordering::Relaxed),
            success_submissions: success,
            failed_submissions: self.failure_total.load(Ordering::Relaxed),
            ac_count: self.ac_count.load(Ordering::Relaxed),
            wa_count: self.wa_count.load(Ordering::Relaxed),
            tle_count: self.tle_count.load(Ordering::Relaxed),
            mle_count: self.mle_count.load(Ordering::Relaxed),
            re_count: self.re_count.load(Ordering::Relaxed),
            ce_count: self.ce_count.load(Ordering::Relaxed),
            se_count: self.se_count.load(Ordering::Relaxed),
            avg_judge_time_ms,
            max_judge_time_ms: self.max_judge_time_ms.load(Ordering::Relaxed),
            min_judge_time_ms,
            current_active: self.active.load(Ordering::Relaxed),
            max_concurrent: self.max_concurrent.load(Ordering::Relaxed),
            queue_wait_count: self.queue_wait.load(Ordering::Relaxed),
            queue_timeout_count: self.queue_timeout.load(Ordering::Relaxed),
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate,
            uptime_seconds: started_at.elapsed().as_secs_f64(),
        }
    }

    /// Administrative reset of all counters.
    pub fn reset(&self) {
        let mut started_at = self
            .started_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        self.submissions_total.store(0, Ordering::Relaxed);
        self.success_total.store(0, Ordering::Relaxed);
        self.failure_total.store(0, Ordering::Relaxed);
        self.ac_count.store(0, Ordering::Relaxed);
        self.wa_count.store(0, Ordering::Relaxed);
        self.tle_count.store(0, Ordering::Relaxed);
        self.mle_count.store(0, Ordering::Relaxed);
        self.re_count.store(0, Ordering::Relaxed);
        self.ce_count.store(0, Ordering::Relaxed);
        self.se_count.store(0, Ordering::Relaxed);
        self.total_judge_time_ms.store(0, Ordering::Relaxed);
        self.max_judge_time_ms.store(0, Ordering::Relaxed);
        self.min_judge_time_ms.store(u64::MAX, Ordering::Relaxed);
        self.max_concurrent.store(0, Ordering::Relaxed);
        self.queue_wait.store(0, Ordering::Relaxed);
        self.queue_timeout.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        *started_at = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_updates_status_and_time_stats() {
        let metrics = JudgeMetrics::new();
        metrics.record_submission();
        metrics.record_success(Duration::from_millis(120), Status::Ac);
        metrics.record_submission();
        metrics.record_success(Duration::from_millis(40), Status::Wa);

        let snap = metrics.snapshot();
        assert_eq!(snap.total_submissions, 2);
        assert_eq!(snap.success_submissions, 2);
        assert_eq!(snap.ac_count, 1);
        assert_eq!(snap.wa_count, 1);
        assert_eq!(snap.avg_judge_time_ms, 80);
        assert_eq!(snap.max_judge_time_ms, 120);
        assert_eq!(snap.min_judge_time_ms, 40);
    }

    #[test]
    fn test_min_time_zero_before_first_success() {
        let snap = JudgeMetrics::new().snapshot();
        assert_eq!(snap.min_judge_time_ms, 0);
        assert_eq!(snap.avg_judge_time_ms, 0);
    }

    #[test]
    fn test_active_high_water() {
        let metrics = JudgeMetrics::new();
        metrics.record_active_increase();
        metrics.record_active_increase();
        metrics.record_active_decrease();
        metrics.record_active_increase();

        let snap = metrics.snapshot();
        assert_eq!(snap.current_active, 2);
        assert_eq!(snap.max_concurrent, 2);
    }

    #[test]
    fn test_cache_hit_rate() {
        let metrics = JudgeMetrics::new();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();

        let snap = metrics.snapshot();
        assert!((snap.cache_hit_rate - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset_clears_counters() {
        let metrics = JudgeMetrics::new();
        metrics.record_submission();
        metrics.record_cache_hit();
        metrics.record_queue_timeout();
        metrics.reset();

        let snap = metrics.snapshot();
        assert_eq!(snap.total_submissions, 0);
        assert_eq!(snap.cache_hits, 0);
        assert_eq!(snap.queue_timeout_count, 0);
        assert_eq!(snap.min_judge_time_ms, 0);
    }
}
