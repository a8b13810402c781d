//! Test helpers and fixtures for synctv-simulcast tests
//!
//! Collaborator doubles for layers and endpoints, plus packet builders, so
//! unit tests, integration tests and benchmarks share the same fixtures.

use crate::error::TransportError;
use crate::layer::{LayerDescription, LayerHandle, LayerRegistry, SimulcastLayer};
use crate::notification::{Endpoint, LayerEventKind, LayerEventMessage};
use crate::types::{EndpointId, ForwardablePacket, LayerOrder};
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;

/// Layer double matching packets by SSRC
pub struct TestLayer {
    order: LayerOrder,
    ssrc: u32,
    streaming: AtomicBool,
    keyframes: AtomicUsize,
    keyframe_hold: Mutex<bool>,
    keyframe_released: Condvar,
    sequence: AtomicU16,
}

impl TestLayer {
    pub fn new(order: u8, ssrc: u32) -> Arc<Self> {
        Arc::new(Self {
            order: LayerOrder::new(order),
            ssrc,
            streaming: AtomicBool::new(true),
            keyframes: AtomicUsize::new(0),
            keyframe_hold: Mutex::new(false),
            keyframe_released: Condvar::new(),
            sequence: AtomicU16::new(0),
        })
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn set_streaming(&self, streaming: bool) {
        self.streaming.store(streaming, Ordering::SeqCst);
    }

    pub fn keyframe_requests(&self) -> usize {
        self.keyframes.load(Ordering::SeqCst)
    }

    /// While held, `request_keyframe` blocks the caller until released
    pub fn hold_keyframe_requests(&self, hold: bool) {
        *self.keyframe_hold.lock() = hold;
        self.keyframe_released.notify_all();
    }

    /// Next packet of this layer
    pub fn packet(&self) -> ForwardablePacket {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        test_packet(self.ssrc, seq)
    }
}

impl SimulcastLayer for TestLayer {
    fn order(&self) -> LayerOrder {
        self.order
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    fn matches(&self, packet: &ForwardablePacket) -> bool {
        packet.ssrc == self.ssrc
    }

    fn request_keyframe(&self) {
        self.keyframes.fetch_add(1, Ordering::SeqCst);

        let mut held = self.keyframe_hold.lock();
        while *held {
            self.keyframe_released.wait(&mut held);
        }
    }

    fn description(&self) -> LayerDescription {
        LayerDescription::new(self.ssrc)
    }
}

/// Build a small RTP-like packet for `ssrc`
pub fn test_packet(ssrc: u32, sequence_number: u16) -> ForwardablePacket {
    ForwardablePacket::new(
        ssrc,
        sequence_number,
        u32::from(sequence_number) * 3000,
        Bytes::from_static(&[0u8; 64]),
    )
}

/// Endpoint recording every data channel message it is asked to send
pub struct RecordingEndpoint {
    id: EndpointId,
    fail: AtomicBool,
    messages: Mutex<Vec<String>>,
}

impl RecordingEndpoint {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: EndpointId::from(id),
            fail: AtomicBool::new(false),
            messages: Mutex::new(Vec::new()),
        })
    }

    /// Make subsequent sends fail with a transport error
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// Decoded events as `(kind, primary SSRC)` pairs
    pub fn events(&self) -> Vec<(LayerEventKind, u32)> {
        self.messages
            .lock()
            .iter()
            .filter_map(|json| serde_json::from_str::<LayerEventMessage>(json).ok())
            .filter_map(|message| {
                let layer = message.endpoint_simulcast_layers.first()?;
                Some((message.colibri_class, layer.simulcast_layer.primary_ssrc))
            })
            .collect()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl Endpoint for RecordingEndpoint {
    fn id(&self) -> EndpointId {
        self.id.clone()
    }

    fn send_message(&self, payload: &str) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Send("injected failure".to_string()));
        }
        self.messages.lock().push(payload.to_string());
        Ok(())
    }
}

/// Registry with one test layer per order (`ssrc = 100 * (order + 1)`)
pub fn layer_fixture(orders: u8) -> (Arc<LayerRegistry>, Vec<(Arc<TestLayer>, LayerHandle)>) {
    let registry = Arc::new(LayerRegistry::new());
    let layers = (0..orders)
        .map(|order| {
            let layer = TestLayer::new(order, 100 * (u32::from(order) + 1));
            let handle = registry.insert(layer.clone());
            (layer, handle)
        })
        .collect();
    (registry, layers)
}
