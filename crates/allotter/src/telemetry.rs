//! Metric handles.
//!
//! With the `metrics` feature the engine records OpenTelemetry instruments
//! obtained from a [`Meter`](opentelemetry::metrics::Meter) that the host
//! process registers once through [`init_metric_handles`]. Until then, and
//! always without the feature, every recording function is a no-op.
//!
//! | instrument              | kind              | recorded by            |
//! |-------------------------|-------------------|------------------------|
//! | `allocation_requests`   | counter           | every allocation       |
//! | `records_claimed`       | counter           | granted allocations    |
//! | `quota_exhausted`       | counter           | exhausted allocations  |
//! | `insufficient_supply`   | counter           | starved allocations    |
//! | `inflight_rejections`   | counter           | duplicate requests     |
//! | `records_imported`      | counter           | imports                |
//! | `duplicates_skipped`    | counter           | imports                |
//! | `gate_hold_duration`    | histogram (ms)    | every gated mutation   |

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(feature = "metrics")]
static ALLOCATION_REQUESTS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static RECORDS_CLAIMED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static QUOTA_EXHAUSTED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static INSUFFICIENT_SUPPLY: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static INFLIGHT_REJECTIONS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static RECORDS_IMPORTED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static DUPLICATES_SKIPPED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static GATE_HOLD_MS: OnceLock<Histogram<f64>> = OnceLock::new();

/// Builds every instrument from `meter`. Later calls are ignored.
#[cfg(feature = "metrics")]
pub fn init_metric_handles(meter: &Meter) {
    let _ = ALLOCATION_REQUESTS.set(
        meter
            .u64_counter("allocation_requests")
            .with_description("Allocation requests that reached the engine")
            .build(),
    );
    let _ = RECORDS_CLAIMED.set(
        meter
            .u64_counter("records_claimed")
            .with_description("Records handed out to identities")
            .build(),
    );
    let _ = QUOTA_EXHAUSTED.set(
        meter
            .u64_counter("quota_exhausted")
            .with_description("Allocations refused because the allowance was used up")
            .build(),
    );
    let _ = INSUFFICIENT_SUPPLY.set(
        meter
            .u64_counter("insufficient_supply")
            .with_description("Allocations refused because the pool ran short")
            .build(),
    );
    let _ = INFLIGHT_REJECTIONS.set(
        meter
            .u64_counter("inflight_rejections")
            .with_description("Requests turned away by the in-flight guard")
            .build(),
    );
    let _ = RECORDS_IMPORTED.set(
        meter
            .u64_counter("records_imported")
            .with_description("Records appended by imports")
            .build(),
    );
    let _ = DUPLICATES_SKIPPED.set(
        meter
            .u64_counter("duplicates_skipped")
            .with_description("Import candidates dropped as duplicates")
            .build(),
    );
    let _ = GATE_HOLD_MS.set(
        meter
            .f64_histogram("gate_hold_duration")
            .with_unit("ms")
            .with_description("Time a mutation held the gate")
            .build(),
    );
}

#[cfg(feature = "metrics")]
fn add(counter: &OnceLock<Counter<u64>>, n: u64) {
    if let Some(counter) = counter.get() {
        counter.add(n, &[]);
    }
}

#[cfg(feature = "metrics")]
pub fn increment_allocation_requests() {
    add(&ALLOCATION_REQUESTS, 1);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_allocation_requests() {}

#[cfg(feature = "metrics")]
pub fn increment_records_claimed(count: u64) {
    add(&RECORDS_CLAIMED, count);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_records_claimed(_count: u64) {}

#[cfg(feature = "metrics")]
pub fn increment_quota_exhausted() {
    add(&QUOTA_EXHAUSTED, 1);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_quota_exhausted() {}

#[cfg(feature = "metrics")]
pub fn increment_insufficient_supply() {
    add(&INSUFFICIENT_SUPPLY, 1);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_insufficient_supply() {}

#[cfg(feature = "metrics")]
pub fn increment_inflight_rejections() {
    add(&INFLIGHT_REJECTIONS, 1);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_inflight_rejections() {}

#[cfg(feature = "metrics")]
pub fn record_import(added: u64, skipped: u64) {
    add(&RECORDS_IMPORTED, added);
    add(&DUPLICATES_SKIPPED, skipped);
}

#[cfg(not(feature = "metrics"))]
pub fn record_import(_added: u64, _skipped: u64) {}

#[cfg(feature = "metrics")]
pub fn record_gate_hold(duration_ms: f64) {
    if let Some(histogram) = GATE_HOLD_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_gate_hold(_duration_ms: f64) {}
