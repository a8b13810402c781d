//! Per-SSRC cyclic counters for the admission trickle
//!
//! The receiving endpoint extends the 16-bit RTP sequence number with a
//! rollover counter (ROC) inferred from gaps, as SRTP replay protection
//! requires. A rollover can be detected unless 2^15 consecutive packets are
//! lost, so for every `bound` packets we would otherwise drop from an SSRC a
//! few are let through to keep the receiver's ROC in sync.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Thread safe counter that wraps around at `bound`.
///
/// The counter starts one step before zero, so the first increment yields 0
/// and the values cycle `0, 1, .., bound - 1, 0, ..`. Concurrent callers
/// never lose or duplicate an increment, but the order in which they observe
/// values is not fair.
#[derive(Debug)]
pub struct CyclicAdmissionCounter {
    bound: u32,
    value: AtomicU32,
}

impl CyclicAdmissionCounter {
    /// `bound` must be greater than zero.
    #[must_use]
    pub fn new(bound: u32) -> Self {
        debug_assert!(bound > 0, "cyclic counter bound must be positive");
        Self {
            bound,
            value: AtomicU32::new(bound.saturating_sub(1)),
        }
    }

    /// Increment the counter and return the new value in `[0, bound)`
    pub fn increment_and_wrap(&self) -> u32 {
        let mut current = self.value.load(Ordering::Relaxed);
        loop {
            let next = (current + 1) % self.bound;
            match self.value.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    #[must_use]
    pub fn bound(&self) -> u32 {
        self.bound
    }

    #[must_use]
    pub fn value(&self) -> u32 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Lazily created cyclic counters, one per SSRC
#[derive(Debug, Default)]
pub struct CyclicCounterRegistry {
    counters: DashMap<u32, Arc<CyclicAdmissionCounter>>,
}

impl CyclicCounterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the counter for `ssrc`, creating it with `bound` on first use.
    ///
    /// Only one counter is ever published per SSRC; `bound` is ignored once
    /// the counter exists.
    pub fn get_or_create(&self, ssrc: u32, bound: u32) -> Arc<CyclicAdmissionCounter> {
        if let Some(counter) = self.counters.get(&ssrc) {
            return Arc::clone(counter.value());
        }

        let counter = self.counters.entry(ssrc).or_insert_with(|| {
            debug!(ssrc, bound, "Creating dropped packet counter");
            Arc::new(CyclicAdmissionCounter::new(bound))
        });
        Arc::clone(counter.value())
    }

    /// Forget the counter for an SSRC that is no longer received
    pub fn remove(&self, ssrc: u32) -> bool {
        self.counters.remove(&ssrc).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}
