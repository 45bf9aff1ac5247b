//! Insights - trace spans for ring transfers.
//!
//! Lifecycle events (create, claim, release, forced release) are always logged
//! through `tracing`. Per-transfer spans are only emitted with the
//! `tracing-spans` feature, since a busy readout loop calls `put` at very high
//! rates.
//!
//! ```toml
//! daqring = { version = "0.1", features = ["tracing-spans"] }
//! ```
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//! ```

/// Record a completed put
#[cfg(feature = "tracing-spans")]
#[inline]
pub fn record_put(ring: &str, bytes: usize) {
    let _span = tracing::trace_span!("put", ring, bytes).entered();
}

#[cfg(not(feature = "tracing-spans"))]
#[inline(always)]
pub fn record_put(_ring: &str, _bytes: usize) {}

/// Record a completed get
#[cfg(feature = "tracing-spans")]
#[inline]
pub fn record_get(ring: &str, bytes: usize) {
    let _span = tracing::trace_span!("get", ring, bytes).entered();
}

#[cfg(not(feature = "tracing-spans"))]
#[inline(always)]
pub fn record_get(_ring: &str, _bytes: usize) {}

/// Record a blocking call that gave up
#[inline]
pub fn record_timeout(ring: &str, operation: &'static str, needed: usize) {
    tracing::trace!(ring, operation, needed, "timed out");
}
