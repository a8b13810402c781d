//! `SyncTV` simulcast switching
//!
//! Per-packet forwarding decisions for simulcast video in the SFU. Every
//! simulcast layer of a sender reaches the relay, but a receiver only gets
//! one of them at a time. This crate decides which one, switches between
//! layers without breaking the receiver's decoder, and tells the receiver
//! which layer it is getting.
//!
//! ## Architecture
//!
//! - **`SwitchingEngine`**: current / next / override state machine with
//!   packet-count hysteresis, one per sender → receiver relationship
//! - **`LayerRegistry`**: owns the layers of a sender; the engine only keeps
//!   generation-checked `LayerHandle`s into it
//! - **`NotificationDispatcher`**: JSON layer events over the receiver's data
//!   channel
//! - **`CyclicCounterRegistry`**: per-SSRC counters for the admission trickle
//!   that keeps the receiver's SRTP rollover counter in sync
//!
//! ## Usage
//!
//! ```rust,ignore
//! use synctv_simulcast::{logging, NotificationDispatcher, SimulcastConfig, SwitchingEngine};
//!
//! let config = SimulcastConfig::from_env()?;
//! logging::init_logging(&config.logging)?;
//!
//! let engine = SwitchingEngine::new(
//!     registry.clone(),
//!     NotificationDispatcher::new(&receiver, &sender),
//!     Arc::new(config),
//! );
//!
//! engine.receive_high();
//! if engine.accept(&packet) {
//!     forward(packet);
//! }
//! ```

mod config;
mod counter;
mod engine;
mod error;
mod layer;
pub mod logging;
mod notification;
mod options;
mod references;
mod stats;
pub mod test_helpers;
mod types;

pub use config::{
    LoggingConfig, SimulcastConfig, SwitchingConfig, ThresholdProvider, DEFAULT_MIN_NEXT_SEEN,
    MIN_NEXT_SEEN_KEY,
};
pub use counter::{CyclicAdmissionCounter, CyclicCounterRegistry};
pub use engine::{SwitchingEngine, SwitchingSnapshot, DROPPED_COUNTER_BOUND, TRICKLE_ADMITTED};
pub use error::{Error, Result, TransportError};
pub use layer::{LayerDescription, LayerHandle, LayerRegistry, LayerSource, SimulcastLayer};
pub use notification::{
    DispatchOutcome, Endpoint, EndpointSimulcastLayer, LayerEventKind, LayerEventMessage,
    NotificationDispatcher,
};
pub use options::{OverrideTarget, SwitchingModeOptions, SwitchingModeOptionsBuilder};
pub use references::LayerReferenceSet;
pub use stats::SwitchingStats;
pub use types::{EndpointId, ForwardablePacket, LayerOrder};
