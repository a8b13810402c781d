//! The current / next / override layer roles

use crate::layer::{LayerHandle, LayerSource, SimulcastLayer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Atomic cell holding an optional [`LayerHandle`]
#[derive(Debug, Default)]
struct HandleSlot(AtomicU64);

impl HandleSlot {
    fn load(&self) -> Option<LayerHandle> {
        LayerHandle::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, handle: Option<LayerHandle>) {
        self.0
            .store(handle.map_or(0, LayerHandle::to_bits), Ordering::Release);
    }
}

/// The three layer roles that decide which packets are forwarded.
///
/// Reads may happen from any thread at any time. Writers must serialize
/// among themselves; the set does no locking of its own. A role whose layer
/// has been removed from the source resolves to `None`, exactly like a role
/// that was never set.
#[derive(Debug, Default)]
pub struct LayerReferenceSet {
    current: HandleSlot,
    next: HandleSlot,
    override_: HandleSlot,
}

impl LayerReferenceSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The layer whose packets are being forwarded
    pub fn current(&self, source: &dyn LayerSource) -> Option<Arc<dyn SimulcastLayer>> {
        resolve(source, self.current.load())
    }

    /// The layer that will (possibly) be forwarded next
    pub fn next(&self, source: &dyn LayerSource) -> Option<Arc<dyn SimulcastLayer>> {
        resolve(source, self.next.load())
    }

    /// The layer forced by adaptive bitrate control, if any
    pub fn override_layer(&self, source: &dyn LayerSource) -> Option<Arc<dyn SimulcastLayer>> {
        resolve(source, self.override_.load())
    }

    /// Raw handle of the current role, without resolution
    #[must_use]
    pub fn current_handle(&self) -> Option<LayerHandle> {
        self.current.load()
    }

    #[must_use]
    pub fn next_handle(&self) -> Option<LayerHandle> {
        self.next.load()
    }

    #[must_use]
    pub fn override_handle(&self) -> Option<LayerHandle> {
        self.override_.load()
    }

    pub fn set_current(&self, handle: Option<LayerHandle>) {
        self.current.store(handle);
    }

    pub fn set_next(&self, handle: Option<LayerHandle>) {
        self.next.store(handle);
    }

    pub fn set_override(&self, handle: Option<LayerHandle>) {
        self.override_.store(handle);
    }
}

fn resolve(
    source: &dyn LayerSource,
    handle: Option<LayerHandle>,
) -> Option<Arc<dyn SimulcastLayer>> {
    handle.and_then(|handle| source.resolve(handle))
}
