//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! Periodic fields (rate, average, max) are reset by `report()`; the
//! latency histogram and all totals are cumulative so `/metrics` scrapes
//! and the log reporter never interfere.
//!
//! NOTE: All atomics use Relaxed ordering intentionally; these are statistical
//! counters only. Occupancy counters live in `services::counters`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
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

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Frames applied by the ingestion loop (monotonic)
    frames_total: AtomicU64,
    /// Frames since last report (reset on report)
    frames_since_report: AtomicU64,
    /// Frames handed to the ingestion channel by any source (monotonic)
    frames_received: AtomicU64,
    /// Frames dropped because the ingestion channel was full (monotonic)
    frames_dropped: AtomicU64,
    /// Payloads that failed to parse as a frame (monotonic)
    frames_malformed: AtomicU64,
    /// Detections that passed class/confidence/id filtering (monotonic)
    detections_accepted: AtomicU64,
    /// Detections filtered out or duplicated within a frame (monotonic)
    detections_ignored: AtomicU64,
    /// Sum of frame latencies since last report (reset on report)
    latency_sum_us: AtomicU64,
    /// Max frame latency since last report (reset on report)
    latency_max_us: AtomicU64,
    /// Sum of all frame latencies (monotonic, for histogram _sum)
    latency_sum_total_us: AtomicU64,
    /// Frame processing latency histogram (monotonic)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Track ids currently retained by the tracker
    tracked_entities: AtomicU64,
    /// Successful region writes (replace, add-point, reset)
    region_writes: AtomicU64,
    /// Rejected region writes
    region_rejected: AtomicU64,
    /// HTTP requests served
    http_requests: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_total: AtomicU64::new(0),
            frames_since_report: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            frames_malformed: AtomicU64::new(0),
            detections_accepted: AtomicU64::new(0),
            detections_ignored: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_sum_total_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            tracked_entities: AtomicU64::new(0),
            region_writes: AtomicU64::new(0),
            region_rejected: AtomicU64::new(0),
            http_requests: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a frame applied by the tracker (lock-free)
    #[inline]
    pub fn record_frame_processed(&self, latency_us: u64, accepted: u64, ignored: u64) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
        self.frames_since_report.fetch_add(1, Ordering::Relaxed);
        self.detections_accepted.fetch_add(accepted, Ordering::Relaxed);
        self.detections_ignored.fetch_add(ignored, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_sum_total_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_frame_malformed(&self) {
        self.frames_malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_tracked_entities(&self, count: u64) {
        self.tracked_entities.store(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_region_write(&self) {
        self.region_writes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_region_rejected(&self) {
        self.region_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_http_request(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn frames_total(&self) -> u64 {
        self.frames_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn frames_malformed(&self) -> u64 {
        self.frames_malformed.load(Ordering::Relaxed)
    }

    /// Summary for the periodic log line; resets the periodic fields
    pub fn report(&self) -> MetricsSummary {
        self.summarize(true)
    }

    /// Summary without resetting anything (for scrapes)
    pub fn snapshot(&self) -> MetricsSummary {
        self.summarize(false)
    }

    fn summarize(&self, reset: bool) -> MetricsSummary {
        let take = |counter: &AtomicU64| {
            if reset {
                counter.swap(0, Ordering::Relaxed)
            } else {
                counter.load(Ordering::Relaxed)
            }
        };

        let frames_count = take(&self.frames_since_report);
        let latency_sum = take(&self.latency_sum_us);
        let max_latency = take(&self.latency_max_us);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            if reset {
                *last = Instant::now();
            }
            elapsed
        };

        let frames_per_sec = if elapsed.as_secs_f64() > 0.0 {
            frames_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_latency = if frames_count > 0 { latency_sum / frames_count } else { 0 };

        let lat_buckets = load_buckets(&self.latency_buckets);

        MetricsSummary {
            frames_total: self.frames_total.load(Ordering::Relaxed),
            frames_per_sec,
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            detections_accepted: self.detections_accepted.load(Ordering::Relaxed),
            detections_ignored: self.detections_ignored.load(Ordering::Relaxed),
            avg_frame_latency_us: avg_latency,
            max_frame_latency_us: max_latency,
            lat_buckets,
            lat_sum_us: self.latency_sum_total_us.load(Ordering::Relaxed),
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            tracked_entities: self.tracked_entities.load(Ordering::Relaxed),
            region_writes: self.region_writes.load(Ordering::Relaxed),
            region_rejected: self.region_rejected.load(Ordering::Relaxed),
            http_requests: self.http_requests.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug)]
pub struct MetricsSummary {
    pub frames_total: u64,
    pub frames_per_sec: f64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub frames_malformed: u64,
    pub detections_accepted: u64,
    pub detections_ignored: u64,
    pub avg_frame_latency_us: u64,
    pub max_frame_latency_us: u64,
    /// Frame latency histogram buckets (cumulative since start)
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_sum_us: u64,
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub tracked_entities: u64,
    pub region_writes: u64,
    pub region_rejected: u64,
    pub http_requests: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            frames_total = %self.frames_total,
            frames_per_sec = format!("{:.1}", self.frames_per_sec),
            avg_latency_us = %self.avg_frame_latency_us,
            max_latency_us = %self.max_frame_latency_us,
            p99_us = %self.lat_p99_us,
            detections = %self.detections_accepted,
            ignored = %self.detections_ignored,
            dropped = %self.frames_dropped,
            malformed = %self.frames_malformed,
            tracked_entities = %self.tracked_entities,
            "metrics"
        );
    }
}
