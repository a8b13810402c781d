//! Simulcast layers as seen by the switching engine
//!
//! Layers are owned by a [`LayerRegistry`] that belongs to whoever receives
//! the simulcast from the sending endpoint. The engine never owns a layer; it
//! keeps [`LayerHandle`]s, which stop resolving as soon as the layer is
//! removed from the registry.

use crate::types::{ForwardablePacket, LayerOrder};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// SSRCs identifying a layer to the receiving client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDescription {
    #[serde(rename = "primarySSRC")]
    pub primary_ssrc: u32,

    #[serde(rename = "associatedSSRCs", default, skip_serializing_if = "Vec::is_empty")]
    pub associated_ssrcs: Vec<u32>,
}

impl LayerDescription {
    #[must_use]
    pub fn new(primary_ssrc: u32) -> Self {
        Self {
            primary_ssrc,
            associated_ssrcs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_associated(mut self, ssrc: u32) -> Self {
        self.associated_ssrcs.push(ssrc);
        self
    }
}

/// One simulcast quality variant received from the sending endpoint
pub trait SimulcastLayer: Send + Sync {
    /// Rank of this layer; lower is more degraded
    fn order(&self) -> LayerOrder;

    /// Whether packets of this layer are currently arriving
    fn is_streaming(&self) -> bool;

    /// Whether `packet` belongs to this layer
    fn matches(&self, packet: &ForwardablePacket) -> bool;

    /// Ask the sender for a keyframe on this layer
    fn request_keyframe(&self);

    fn description(&self) -> LayerDescription;
}

/// Generation-checked reference to a layer stored in a [`LayerRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerHandle {
    index: u32,
    generation: u32,
}

impl LayerHandle {
    /// Pack into a non-zero `u64`. Generations start at 1, so 0 is free to
    /// mean "no layer".
    pub(crate) fn to_bits(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    pub(crate) fn from_bits(bits: u64) -> Option<Self> {
        if bits == 0 {
            return None;
        }
        Some(Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        })
    }
}

impl fmt::Display for LayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Lookup of the layers received from one sending endpoint
pub trait LayerSource: Send + Sync {
    fn has_layers(&self) -> bool;

    /// Handle of the layer with exactly `order`
    fn layer_by_order(&self, order: LayerOrder) -> Option<LayerHandle>;

    /// Highest order currently available
    fn highest_order(&self) -> Option<LayerOrder>;

    /// Dereference a handle. Returns `None` once the layer has been removed.
    fn resolve(&self, handle: LayerHandle) -> Option<Arc<dyn SimulcastLayer>>;
}

struct Slot {
    generation: u32,
    layer: Option<Arc<dyn SimulcastLayer>>,
}

/// Owner of the simulcast layers of one sending endpoint
#[derive(Default)]
pub struct LayerRegistry {
    slots: RwLock<Vec<Slot>>,
}

impl LayerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a layer, reusing a vacant slot when there is one
    pub fn insert(&self, layer: Arc<dyn SimulcastLayer>) -> LayerHandle {
        let order = layer.order();
        let mut slots = self.slots.write();

        let index = match slots.iter().position(|slot| slot.layer.is_none()) {
            Some(index) => {
                slots[index].layer = Some(layer);
                index
            }
            None => {
                slots.push(Slot {
                    generation: 1,
                    layer: Some(layer),
                });
                slots.len() - 1
            }
        };

        let handle = LayerHandle {
            index: index as u32,
            generation: slots[index].generation,
        };
        debug!(order = %order, handle = %handle, "Registered simulcast layer");
        handle
    }

    /// Remove a layer. Every outstanding handle to it stops resolving.
    pub fn remove(&self, handle: LayerHandle) -> Option<Arc<dyn SimulcastLayer>> {
        let mut slots = self.slots.write();
        let slot = slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }

        let layer = slot.layer.take()?;
        // Skip 0 on wraparound; it encodes "no layer" in packed handles
        slot.generation = slot.generation.checked_add(1).unwrap_or(1);
        debug!(order = %layer.order(), handle = %handle, "Removed simulcast layer");
        Some(layer)
    }

    /// Remove every layer
    pub fn clear(&self) {
        let mut slots = self.slots.write();
        for slot in slots.iter_mut().filter(|slot| slot.layer.is_some()) {
            slot.layer = None;
            slot.generation = slot.generation.checked_add(1).unwrap_or(1);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().iter().filter(|slot| slot.layer.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LayerSource for LayerRegistry {
    fn has_layers(&self) -> bool {
        !self.is_empty()
    }

    fn layer_by_order(&self, order: LayerOrder) -> Option<LayerHandle> {
        let slots = self.slots.read();
        slots.iter().enumerate().find_map(|(index, slot)| {
            let layer = slot.layer.as_ref()?;
            (layer.order() == order).then(|| LayerHandle {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    fn highest_order(&self) -> Option<LayerOrder> {
        self.slots
            .read()
            .iter()
            .filter_map(|slot| slot.layer.as_ref().map(|layer| layer.order()))
            .max()
    }

    fn resolve(&self, handle: LayerHandle) -> Option<Arc<dyn SimulcastLayer>> {
        let slots = self.slots.read();
        let slot = slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.layer.clone()
    }
}
