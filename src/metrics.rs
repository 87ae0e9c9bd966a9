//! Lightweight global metrics for the page codec.
//!
//! Thread-safe atomic counters:
//! - encode/decode volume
//! - tag verification failures
//! - codec instances created / freed

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Page traffic -----
static PAGES_ENCODED: AtomicU64 = AtomicU64::new(0);
static PAGES_DECODED: AtomicU64 = AtomicU64::new(0);
static TAG_FAILURES: AtomicU64 = AtomicU64::new(0);

// ----- Instances -----
static CODECS_CREATED: AtomicU64 = AtomicU64::new(0);
static CODECS_FREED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub pages_encoded: u64,
    pub pages_decoded: u64,
    pub tag_failures: u64,
    pub codecs_created: u64,
    pub codecs_freed: u64,
}

impl MetricsSnapshot {
    pub fn active_codecs(&self) -> u64 {
        self.codecs_created.saturating_sub(self.codecs_freed)
    }
}

// ----- Recorders -----
pub fn record_page_encoded() {
    PAGES_ENCODED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_page_decoded() {
    PAGES_DECODED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_tag_failure() {
    TAG_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_codec_created() {
    CODECS_CREATED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_codec_freed() {
    CODECS_FREED.fetch_add(1, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        pages_encoded: PAGES_ENCODED.load(Ordering::Relaxed),
        pages_decoded: PAGES_DECODED.load(Ordering::Relaxed),
        tag_failures: TAG_FAILURES.load(Ordering::Relaxed),
        codecs_created: CODECS_CREATED.load(Ordering::Relaxed),
        codecs_freed: CODECS_FREED.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    PAGES_ENCODED.store(0, Ordering::Relaxed);
    PAGES_DECODED.store(0, Ordering::Relaxed);
    TAG_FAILURES.store(0, Ordering::Relaxed);
    CODECS_CREATED.store(0, Ordering::Relaxed);
    CODECS_FREED.store(0, Ordering::Relaxed);
}
