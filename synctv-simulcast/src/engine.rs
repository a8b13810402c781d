//! Switching send mode
//!
//! The receiving endpoint knows the SSRCs of every simulcast layer of the
//! sending endpoint and handles switching on its side; the relay decides which
//! layer to forward and tells the endpoint about it over the data channel.
//!
//! Three layer roles drive forwarding:
//!
//! - **current**: the layer whose packets are forwarded
//! - **next**: a candidate forwarded alongside current ("bridging") until
//!   enough of its packets have been seen, then promoted to current
//! - **override**: a layer forced by adaptive bitrate control; when set, its
//!   packets are the only ones forwarded
//!
//! Packets of no selected layer are dropped, except for a trickle of 8 every
//! 2048 per SSRC that keeps the receiver's rollover counter in sync.
//!
//! State changes happen under one mutex per engine. Keyframe requests and
//! data channel notifications are collected while the mutex is held and run
//! after it is released, under a second dispatch mutex taken before the
//! release, so collaborators see them in the order the transitions committed.
//! Collaborators must not call back into the engine from
//! [`SimulcastLayer::request_keyframe`] or `Endpoint::send_message`.
//! [`SwitchingEngine::accept`] reads the roles without the mutex; a stale
//! read only affects one packet.

use crate::config::{ThresholdProvider, DEFAULT_MIN_NEXT_SEEN, MIN_NEXT_SEEN_KEY};
use crate::counter::CyclicCounterRegistry;
use crate::layer::{LayerHandle, LayerSource, SimulcastLayer};
use crate::notification::{DispatchOutcome, LayerEventKind, NotificationDispatcher};
use crate::options::{OverrideTarget, SwitchingModeOptions};
use crate::references::LayerReferenceSet;
use crate::stats::{SwitchingStats, SwitchingStatsInner};
use crate::types::{ForwardablePacket, LayerOrder};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Modulus of the per-SSRC dropped packet counters
pub const DROPPED_COUNTER_BOUND: u32 = 0x800;

/// Dropped packets let through at the start of every counter cycle
pub const TRICKLE_ADMITTED: u32 = 8;

/// Hysteresis state guarded by the engine mutex
#[derive(Debug)]
struct HysteresisState {
    /// Packets of the next layer seen since it was proposed
    seen_next: u32,
    /// Packets of the next layer to see before switching, for order 0
    min_next_seen: i32,
}

/// Side effect of a transition, performed outside the engine mutex
enum Effect {
    RequestKeyframe(Arc<dyn SimulcastLayer>),
    Notify(LayerEventKind, Arc<dyn SimulcastLayer>),
}

/// Point-in-time view of the engine state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchingSnapshot {
    pub current: Option<LayerOrder>,
    pub next: Option<LayerOrder>,
    pub override_order: Option<LayerOrder>,
    pub seen_next: u32,
    pub min_next_seen: i32,
    pub initialized: bool,
}

/// Layer switching decision engine for one sender → receiver relationship
pub struct SwitchingEngine {
    layers: Arc<dyn LayerSource>,
    thresholds: Arc<dyn ThresholdProvider>,
    dispatcher: NotificationDispatcher,
    refs: LayerReferenceSet,
    state: Mutex<HysteresisState>,
    dispatch: Mutex<()>,
    initialized: OnceCell<()>,
    dropped: CyclicCounterRegistry,
    stats: SwitchingStatsInner,
}

impl SwitchingEngine {
    pub fn new(
        layers: Arc<dyn LayerSource>,
        dispatcher: NotificationDispatcher,
        thresholds: Arc<dyn ThresholdProvider>,
    ) -> Self {
        Self {
            layers,
            thresholds,
            dispatcher,
            refs: LayerReferenceSet::new(),
            state: Mutex::new(HysteresisState {
                seen_next: 0,
                min_next_seen: DEFAULT_MIN_NEXT_SEEN,
            }),
            dispatch: Mutex::new(()),
            initialized: OnceCell::new(),
            dropped: CyclicCounterRegistry::new(),
            stats: SwitchingStatsInner::default(),
        }
    }

    /// Switch to the highest quality layer, after bridging
    pub fn receive_high(&self) {
        let Some(order) = self.layers.highest_order() else {
            warn!("Cannot receive high quality, no simulcast layers");
            return;
        };

        let options = SwitchingModeOptions::builder()
            .next_order(order)
            .hard_switch(true)
            .build();

        self.configure(Some(&options));
    }

    /// Switch to the lowest quality layer, immediately if `urgent`.
    ///
    /// Also abandons a pending next layer that stopped streaming and tells
    /// the receiver about it.
    pub fn receive_low(&self, urgent: bool) {
        let options = SwitchingModeOptions::builder()
            .next_order(LayerOrder::LOWEST)
            .hard_switch(true)
            .urgent(urgent)
            .build();

        self.configure(Some(&options));

        // Own critical section after configure's; another transition may land in between
        self.commit(|state| {
            let Some(next) = self.refs.next(self.source()) else {
                return Vec::new();
            };
            if next.is_streaming() {
                return Vec::new();
            }

            info!(order = %next.order(), "Next simulcast layer stopped streaming");
            self.refs.set_next(None);
            state.seen_next = 0;
            vec![Effect::Notify(LayerEventKind::NextStopped, next)]
        });
    }

    /// Force forwarding of a layer, or clear the override
    pub fn set_override(&self, target: OverrideTarget) {
        let options = SwitchingModeOptions::builder()
            .override_target(target)
            .build();

        self.maybe_configure_override(Some(&options));
    }

    /// Apply a switch request
    pub fn configure(&self, options: Option<&SwitchingModeOptions>) {
        let Some(options) = options else {
            warn!("Cannot configure next simulcast layer, options are missing");
            return;
        };

        self.commit(|state| self.transition(state, options));
    }

    /// Apply the override part of a switch request, if it has one
    pub fn maybe_configure_override(&self, options: Option<&SwitchingModeOptions>) {
        let Some(target) = options.and_then(SwitchingModeOptions::override_target) else {
            return;
        };

        if !self.layers.has_layers() {
            warn!("Cannot configure override, no simulcast layers");
            return;
        }

        match target {
            OverrideTarget::Clear => self.commit(|_| {
                self.refs.set_override(None);
                info!("Cleared simulcast layer override");

                // Re-assert the non-overridden decision to the receiver
                match self.refs.current(self.source()) {
                    Some(current) => vec![
                        Effect::RequestKeyframe(Arc::clone(&current)),
                        Effect::Notify(LayerEventKind::Changed, current),
                    ],
                    None => Vec::new(),
                }
            }),
            OverrideTarget::Layer(order) => {
                let Some((handle, layer)) = self.lookup(order) else {
                    warn!(order = %order, "Cannot override, no such simulcast layer");
                    return;
                };

                self.commit(|_| {
                    self.refs.set_override(Some(handle));
                    info!(order = %order, "Overriding simulcast layer");
                    vec![
                        Effect::RequestKeyframe(Arc::clone(&layer)),
                        Effect::Notify(LayerEventKind::Changed, layer),
                    ]
                });
            }
        }
    }

    /// Decide whether `packet` is forwarded to the receiver
    pub fn accept(&self, packet: &ForwardablePacket) -> bool {
        self.initialize();

        let mut accept = false;

        if let Some(current) = self.refs.current(self.source()) {
            accept = current.matches(packet);
        }

        if !accept {
            if let Some(handle) = self.refs.next_handle() {
                if let Some(next) = self.layers.resolve(handle) {
                    accept = next.matches(packet);
                    if accept {
                        self.maybe_switch_to_next(handle);
                    }
                }
            }
        }

        if let Some(override_layer) = self.refs.override_layer(self.source()) {
            accept = override_layer.matches(packet);
        }

        let mut trickled = false;
        if !accept {
            let counter = self
                .dropped
                .get_or_create(packet.ssrc, DROPPED_COUNTER_BOUND);
            accept = counter.increment_and_wrap() < TRICKLE_ADMITTED;
            trickled = accept;
        }

        self.stats.record_packet(accept, trickled);
        trace!(
            ssrc = packet.ssrc,
            seq = packet.sequence_number,
            accept,
            trickled,
            "Simulcast admission decision"
        );

        accept
    }

    /// Read the hysteresis threshold from configuration, once.
    ///
    /// Runs on the first [`accept`](Self::accept); calling it earlier pins the
    /// configured threshold before any switch request.
    pub fn initialize(&self) {
        self.initialized.get_or_init(|| {
            let min_next_seen = self
                .thresholds
                .get_int(MIN_NEXT_SEEN_KEY, DEFAULT_MIN_NEXT_SEEN);
            debug!(min_next_seen, "Initializing switching send mode");

            let options = SwitchingModeOptions::builder()
                .min_next_seen(min_next_seen)
                .build();
            self.configure(Some(&options));
        });
    }

    /// Forget the dropped packet counter of an SSRC that went away
    pub fn forget_source(&self, ssrc: u32) {
        if self.dropped.remove(ssrc) {
            debug!(ssrc, "Removed dropped packet counter");
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SwitchingSnapshot {
        let state = self.state.lock();
        let source = self.source();
        SwitchingSnapshot {
            current: self.refs.current(source).map(|layer| layer.order()),
            next: self.refs.next(source).map(|layer| layer.order()),
            override_order: self.refs.override_layer(source).map(|layer| layer.order()),
            seen_next: state.seen_next,
            min_next_seen: state.min_next_seen,
            initialized: self.initialized.get().is_some(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> SwitchingStats {
        self.stats.snapshot()
    }

    fn source(&self) -> &dyn LayerSource {
        self.layers.as_ref()
    }

    fn lookup(&self, order: LayerOrder) -> Option<(LayerHandle, Arc<dyn SimulcastLayer>)> {
        let handle = self.layers.layer_by_order(order)?;
        let layer = self.layers.resolve(handle)?;
        Some((handle, layer))
    }

    fn is_overridden(&self) -> bool {
        self.refs.override_layer(self.source()).is_some()
    }

    /// Compute and apply the role changes requested by `options`.
    /// Must be called with the engine mutex held.
    fn transition(
        &self,
        state: &mut HysteresisState,
        options: &SwitchingModeOptions,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();

        if let Some(min_next_seen) = options.min_next_seen() {
            state.min_next_seen = min_next_seen;
        }

        let Some(order) = options.next_order() else {
            return effects;
        };

        if !self.layers.has_layers() {
            warn!("Cannot configure next simulcast layer, no simulcast layers");
            return effects;
        }

        let Some((handle, next)) = self.lookup(order) else {
            warn!(order = %order, "Cannot configure next simulcast layer, no such layer");
            return effects;
        };

        // Never switch to a layer that is not streaming, except the lowest
        if !next.order().is_lowest() && !next.is_streaming() {
            debug!(order = %order, "Not switching to a layer that is not streaming");
            return effects;
        }

        // Already receiving it; forget any pending next and stick with current
        if self.refs.current_handle() == Some(handle) {
            self.refs.set_next(None);
            state.seen_next = 0;
            return effects;
        }

        let overridden = self.is_overridden();

        if options.is_hard_switch() && self.refs.next_handle() != Some(handle) && !overridden {
            effects.push(Effect::RequestKeyframe(Arc::clone(&next)));
        }

        let has_current = self.refs.current(self.source()).is_some();
        if options.is_urgent() || !has_current || state.min_next_seen < 1 {
            info!(
                order = %order,
                urgent = options.is_urgent(),
                "Switched simulcast layer"
            );
            if !overridden {
                effects.push(Effect::Notify(LayerEventKind::Changed, next));
            }
            self.refs.set_current(Some(handle));
            self.refs.set_next(None);
            state.seen_next = 0;
            self.stats.record_switch(false);
        } else {
            // Keep streaming current while the receiver adjusts to next
            info!(order = %order, "Bridging to simulcast layer");
            if !overridden {
                effects.push(Effect::Notify(LayerEventKind::Changing, next));
            }
            self.refs.set_next(Some(handle));
            state.seen_next = 0;
        }

        effects
    }

    /// Count a packet of the next layer and promote it once enough were seen
    fn maybe_switch_to_next(&self, matched: LayerHandle) {
        self.commit(|state| {
            // Next changed since the packet was matched
            if self.refs.next_handle() != Some(matched) {
                return Vec::new();
            }
            let Some(next) = self.layers.resolve(matched) else {
                return Vec::new();
            };

            state.seen_next = state.seen_next.saturating_add(1);

            if i64::from(state.seen_next) <= promotion_threshold(state.min_next_seen, next.order()) {
                return Vec::new();
            }

            info!(
                order = %next.order(),
                seen_next = state.seen_next,
                "Promoted next simulcast layer"
            );
            let mut effects = Vec::new();
            if !self.is_overridden() {
                effects.push(Effect::Notify(LayerEventKind::Changed, next));
            }
            self.refs.set_current(Some(matched));
            self.refs.set_next(None);
            state.seen_next = 0;
            self.stats.record_switch(true);
            effects
        });
    }

    /// Run `transition` under the engine mutex, then perform its effects.
    ///
    /// The dispatch mutex is taken before the engine mutex is released, so
    /// effects of later transitions wait for these.
    fn commit<F>(&self, transition: F)
    where
        F: FnOnce(&mut HysteresisState) -> Vec<Effect>,
    {
        let mut state = self.state.lock();
        let effects = transition(&mut state);
        if effects.is_empty() {
            return;
        }

        let _dispatch = self.dispatch.lock();
        drop(state);
        self.apply(effects);
    }

    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::RequestKeyframe(layer) => {
                    debug!(order = %layer.order(), "Requesting keyframe");
                    layer.request_keyframe();
                    self.stats.record_keyframe_request();
                }
                Effect::Notify(kind, layer) => {
                    match self.dispatcher.dispatch(kind, Some(&*layer)) {
                        DispatchOutcome::Sent => self.stats.record_notification_sent(),
                        DispatchOutcome::Skipped => self.stats.record_notification_skipped(),
                        DispatchOutcome::Failed => self.stats.record_notification_failed(),
                    }
                }
            }
        }
    }
}

/// Packets of the next layer that must be exceeded before promoting it.
///
/// Each layer up roughly doubles the packet rate, so scaling by `2^order`
/// keeps the bridging time about the same for every order.
fn promotion_threshold(min_next_seen: i32, order: LayerOrder) -> i64 {
    let scale = 1_i64
        .checked_shl(u32::from(order.get()))
        .filter(|scale| *scale > 0)
        .unwrap_or(i64::MAX);
    i64::from(min_next_seen).saturating_mul(scale)
}
