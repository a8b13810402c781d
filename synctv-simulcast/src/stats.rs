//! Switching statistics

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Internal switching statistics with atomic counters
#[derive(Debug, Default)]
pub(crate) struct SwitchingStatsInner {
    packets_accepted: AtomicU64,
    packets_dropped: AtomicU64,
    packets_trickled: AtomicU64,
    layer_switches: AtomicU64,
    promotions: AtomicU64,
    keyframe_requests: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_skipped: AtomicU64,
    notifications_failed: AtomicU64,
}

impl SwitchingStatsInner {
    pub(crate) fn record_packet(&self, accepted: bool, trickled: bool) {
        if accepted {
            self.packets_accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.packets_dropped.fetch_add(1, Ordering::Relaxed);
        }
        if trickled {
            self.packets_trickled.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_switch(&self, promoted: bool) {
        self.layer_switches.fetch_add(1, Ordering::Relaxed);
        if promoted {
            self.promotions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_keyframe_request(&self) {
        self.keyframe_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_notification_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_notification_skipped(&self) {
        self.notifications_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_notification_failed(&self) {
        self.notifications_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SwitchingStats {
        SwitchingStats {
            packets_accepted: self.packets_accepted.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            packets_trickled: self.packets_trickled.load(Ordering::Relaxed),
            layer_switches: self.layer_switches.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            keyframe_requests: self.keyframe_requests.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_skipped: self.notifications_skipped.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
        }
    }
}

/// Switching statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchingStats {
    /// Packets let through, including trickled ones
    pub packets_accepted: u64,
    pub packets_dropped: u64,
    /// Packets of unselected layers let through to keep the receiver's ROC in sync
    pub packets_trickled: u64,
    /// Changes of the current layer, immediate or after bridging
    pub layer_switches: u64,
    /// Changes of the current layer after bridging
    pub promotions: u64,
    pub keyframe_requests: u64,
    pub notifications_sent: u64,
    pub notifications_skipped: u64,
    pub notifications_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let stats = SwitchingStatsInner::default();
        stats.record_packet(true, false);
        stats.record_packet(true, true);
        stats.record_packet(false, false);
        stats.record_switch(false);
        stats.record_switch(true);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.packets_accepted, 2);
        assert_eq!(snapshot.packets_dropped, 1);
        assert_eq!(snapshot.packets_trickled, 1);
        assert_eq!(snapshot.layer_switches, 2);
        assert_eq!(snapshot.promotions, 1);
    }
}
