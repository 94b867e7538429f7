//! Lock-free scan metrics and periodic reporting
//!
//! Counters are updated from the controller loop and the decoder reader task
//! without locks. `report()` swaps the per-interval values to zero.
//!
//! NOTE: All atomics use Relaxed ordering: these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Validation round-trip bucket boundaries (milliseconds)
/// Buckets: ≤25, ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, >12800
pub const VALIDATION_BUCKET_BOUNDS: [u64; 10] = [25, 50, 100, 200, 400, 800, 1600, 3200, 6400, 12800];
pub const METRICS_NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    VALIDATION_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] =
        [25, 50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// How a validation attempt ended, for counting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Approved,
    Denied,
    Error,
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Decode events received by the state machine (monotonic)
    decodes_total: AtomicU64,
    /// Decodes equal to the armed payload (monotonic)
    duplicates_ignored: AtomicU64,
    /// Decodes of another code that were queued before capture paused (monotonic)
    stale_frames_dropped: AtomicU64,
    /// Frames the engine could not decode (monotonic)
    frame_errors: AtomicU64,
    /// Decode events dropped because the event queue was full (monotonic)
    decode_events_dropped: AtomicU64,
    /// Payloads that failed to parse (monotonic)
    parse_errors: AtomicU64,
    /// Validation requests issued (monotonic)
    validations_total: AtomicU64,
    approved_total: AtomicU64,
    denied_total: AtomicU64,
    errors_total: AtomicU64,
    /// Validation latency histogram (reset on report)
    validation_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    /// Sum of validation latencies in ms (reset on report)
    validation_sum_ms: AtomicU64,
    /// Max validation latency in ms (reset on report)
    validation_max_ms: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            decodes_total: AtomicU64::new(0),
            duplicates_ignored: AtomicU64::new(0),
            stale_frames_dropped: AtomicU64::new(0),
            frame_errors: AtomicU64::new(0),
            decode_events_dropped: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            validations_total: AtomicU64::new(0),
            approved_total: AtomicU64::new(0),
            denied_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            validation_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            validation_sum_ms: AtomicU64::new(0),
            validation_max_ms: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_decode(&self) {
        self.decodes_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_duplicate(&self) {
        self.duplicates_ignored.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stale_frame(&self) {
        self.stale_frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_frame_error(&self) {
        self.frame_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decode_dropped(&self) {
        self.decode_events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_validation_started(&self) {
        self.validations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished validation round trip (lock-free)
    #[inline]
    pub fn record_validation_finished(&self, kind: OutcomeKind, latency_ms: u64) {
        match kind {
            OutcomeKind::Approved => self.approved_total.fetch_add(1, Ordering::Relaxed),
            OutcomeKind::Denied => self.denied_total.fetch_add(1, Ordering::Relaxed),
            OutcomeKind::Error => self.errors_total.fetch_add(1, Ordering::Relaxed),
        };

        self.validation_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.validation_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.validation_max_ms, latency_ms);
    }

    pub fn frame_errors(&self) -> u64 {
        self.frame_errors.load(Ordering::Relaxed)
    }

    pub fn validations_total(&self) -> u64 {
        self.validations_total.load(Ordering::Relaxed)
    }

    pub fn duplicates_ignored(&self) -> u64 {
        self.duplicates_ignored.load(Ordering::Relaxed)
    }

    /// Take a snapshot, resetting per-interval histogram values
    pub fn report(&self) -> MetricsSummary {
        let interval_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed().as_secs_f64();
            *last = Instant::now();
            elapsed
        };

        let buckets = swap_buckets(&self.validation_buckets);
        let interval_validations: u64 = buckets.iter().sum();
        let sum_ms = self.validation_sum_ms.swap(0, Ordering::Relaxed);
        let avg_validation_ms =
            if interval_validations > 0 { sum_ms / interval_validations } else { 0 };

        MetricsSummary {
            interval_secs,
            decodes_total: self.decodes_total.load(Ordering::Relaxed),
            duplicates_ignored: self.duplicates_ignored.load(Ordering::Relaxed),
            stale_frames_dropped: self.stale_frames_dropped.load(Ordering::Relaxed),
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            decode_events_dropped: self.decode_events_dropped.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            validations_total: self.validations_total.load(Ordering::Relaxed),
            approved_total: self.approved_total.load(Ordering::Relaxed),
            denied_total: self.denied_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            interval_validations,
            avg_validation_ms,
            max_validation_ms: self.validation_max_ms.swap(0, Ordering::Relaxed),
            validation_p95_ms: percentile_from_buckets(&buckets, 0.95),
            validation_buckets: buckets,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub interval_secs: f64,
    pub decodes_total: u64,
    pub duplicates_ignored: u64,
    pub stale_frames_dropped: u64,
    pub frame_errors: u64,
    pub decode_events_dropped: u64,
    pub parse_errors: u64,
    pub validations_total: u64,
    pub approved_total: u64,
    pub denied_total: u64,
    pub errors_total: u64,
    pub interval_validations: u64,
    pub avg_validation_ms: u64,
    pub max_validation_ms: u64,
    pub validation_p95_ms: u64,
    pub validation_buckets: [u64; METRICS_NUM_BUCKETS],
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            interval_secs = format!("{:.1}", self.interval_secs),
            decodes = %self.decodes_total,
            duplicates = %self.duplicates_ignored,
            stale_frames = %self.stale_frames_dropped,
            frame_errors = %self.frame_errors,
            decode_drops = %self.decode_events_dropped,
            parse_errors = %self.parse_errors,
            validations = %self.validations_total,
            approved = %self.approved_total,
            denied = %self.denied_total,
            errors = %self.errors_total,
            avg_validation_ms = %self.avg_validation_ms,
            max_validation_ms = %self.max_validation_ms,
            p95_validation_ms = %self.validation_p95_ms,
            "metrics"
        );
    }
}
