//! Switch requests handed to the switching engine

use crate::types::LayerOrder;
use serde::{Deserialize, Serialize};

/// Requested state of the override role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideTarget {
    /// Drop the override and return to the hysteresis decision
    Clear,
    /// Force forwarding of the layer with this order
    Layer(LayerOrder),
}

/// Immutable switch request. Build with [`SwitchingModeOptions::builder`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchingModeOptions {
    next_order: Option<LayerOrder>,
    min_next_seen: Option<i32>,
    override_target: Option<OverrideTarget>,
    hard_switch: bool,
    urgent: bool,
}

impl SwitchingModeOptions {
    #[must_use]
    pub fn builder() -> SwitchingModeOptionsBuilder {
        SwitchingModeOptionsBuilder::default()
    }

    /// Order of the layer to switch to, if a switch is requested
    #[must_use]
    pub const fn next_order(&self) -> Option<LayerOrder> {
        self.next_order
    }

    /// New hysteresis threshold, if it should change
    #[must_use]
    pub const fn min_next_seen(&self) -> Option<i32> {
        self.min_next_seen
    }

    #[must_use]
    pub const fn override_target(&self) -> Option<OverrideTarget> {
        self.override_target
    }

    /// A switch that requires a keyframe
    #[must_use]
    pub const fn is_hard_switch(&self) -> bool {
        self.hard_switch
    }

    /// A switch that must not wait for bridging (e.g. because of a layer drop)
    #[must_use]
    pub const fn is_urgent(&self) -> bool {
        self.urgent
    }
}

#[derive(Debug, Clone, Default)]
pub struct SwitchingModeOptionsBuilder {
    options: SwitchingModeOptions,
}

impl SwitchingModeOptionsBuilder {
    #[must_use]
    pub fn next_order(mut self, order: LayerOrder) -> Self {
        self.options.next_order = Some(order);
        self
    }

    #[must_use]
    pub fn min_next_seen(mut self, min_next_seen: i32) -> Self {
        self.options.min_next_seen = Some(min_next_seen);
        self
    }

    #[must_use]
    pub fn override_target(mut self, target: OverrideTarget) -> Self {
        self.options.override_target = Some(target);
        self
    }

    #[must_use]
    pub fn hard_switch(mut self, hard_switch: bool) -> Self {
        self.options.hard_switch = hard_switch;
        self
    }

    #[must_use]
    pub fn urgent(mut self, urgent: bool) -> Self {
        self.options.urgent = urgent;
        self
    }

    #[must_use]
    pub fn build(self) -> SwitchingModeOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = SwitchingModeOptions::builder().build();
        assert_eq!(options, SwitchingModeOptions::default());
        assert!(options.next_order().is_none());
        assert!(options.min_next_seen().is_none());
        assert!(!options.is_hard_switch());
        assert!(!options.is_urgent());
    }

    #[test]
    fn test_builder() {
        let options = SwitchingModeOptions::builder()
            .next_order(LayerOrder::new(2))
            .min_next_seen(50)
            .hard_switch(true)
            .urgent(true)
            .override_target(OverrideTarget::Clear)
            .build();

        assert_eq!(options.next_order(), Some(LayerOrder::new(2)));
        assert_eq!(options.min_next_seen(), Some(50));
        assert!(options.is_hard_switch());
        assert!(options.is_urgent());
        assert_eq!(options.override_target(), Some(OverrideTarget::Clear));
    }
}
