//! Out-of-band layer events sent to the receiving endpoint
//!
//! The receiving client needs to know which layer of which sending endpoint
//! it is getting so its jitter buffer and decoder can cope with the switch.
//! Events travel as JSON over the receiver's data channel:
//!
//! ```json
//! {"colibriClass":"SimulcastLayersChangedEvent",
//!  "endpointSimulcastLayers":[{"endpoint":"bob","simulcastLayer":{"primarySSRC":1}}]}
//! ```
//!
//! Delivery is best effort. A lost event leaves the client with stale layer
//! metadata until the next one; forwarding itself is unaffected.

use crate::error::{Result, TransportError};
use crate::layer::{LayerDescription, SimulcastLayer};
use crate::types::EndpointId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

/// A conference participant able to receive data channel messages
#[cfg_attr(test, mockall::automock)]
pub trait Endpoint: Send + Sync {
    fn id(&self) -> EndpointId;

    /// Send a message on the endpoint's data channel
    fn send_message(&self, payload: &str) -> std::result::Result<(), TransportError>;
}

/// Kind of layer event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerEventKind {
    /// The forwarded layer has changed
    #[serde(rename = "SimulcastLayersChangedEvent")]
    Changed,
    /// The forwarded layer is about to change (bridging started)
    #[serde(rename = "SimulcastLayersChangingEvent")]
    Changing,
    /// The pending next layer stopped streaming and was abandoned
    #[serde(rename = "NextSimulcastLayerStoppedEvent")]
    NextStopped,
}

impl fmt::Display for LayerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Changed => "layers changed",
            Self::Changing => "layers changing",
            Self::NextStopped => "next layer stopped",
        };
        f.write_str(name)
    }
}

/// Layer of a given sending endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSimulcastLayer {
    pub endpoint: EndpointId,
    pub simulcast_layer: LayerDescription,
}

/// Wire form of a layer event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerEventMessage {
    pub colibri_class: LayerEventKind,
    pub endpoint_simulcast_layers: Vec<EndpointSimulcastLayer>,
}

impl LayerEventMessage {
    #[must_use]
    pub fn new(kind: LayerEventKind, endpoint: EndpointId, layer: LayerDescription) -> Self {
        Self {
            colibri_class: kind,
            endpoint_simulcast_layers: vec![EndpointSimulcastLayer {
                endpoint,
                simulcast_layer: layer,
            }],
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// What happened to a dispatched event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    /// Layer or an endpoint was unavailable
    Skipped,
    /// The message could not be built or delivered
    Failed,
}

/// Sends layer events for one sender → receiver relationship
pub struct NotificationDispatcher {
    /// Endpoint receiving the simulcast ("self")
    receiver: Weak<dyn Endpoint>,
    /// Endpoint sending the simulcast ("peer")
    sender: Weak<dyn Endpoint>,
}

impl NotificationDispatcher {
    #[must_use]
    pub fn new(receiver: &Arc<dyn Endpoint>, sender: &Arc<dyn Endpoint>) -> Self {
        Self {
            receiver: Arc::downgrade(receiver),
            sender: Arc::downgrade(sender),
        }
    }

    pub fn layer_changed(&self, layer: Option<&dyn SimulcastLayer>) -> DispatchOutcome {
        self.dispatch(LayerEventKind::Changed, layer)
    }

    pub fn layer_changing(&self, layer: Option<&dyn SimulcastLayer>) -> DispatchOutcome {
        self.dispatch(LayerEventKind::Changing, layer)
    }

    pub fn next_layer_stopped(&self, layer: Option<&dyn SimulcastLayer>) -> DispatchOutcome {
        self.dispatch(LayerEventKind::NextStopped, layer)
    }

    /// Build and send an event of `kind` for `layer`. Never fails the caller.
    pub fn dispatch(
        &self,
        kind: LayerEventKind,
        layer: Option<&dyn SimulcastLayer>,
    ) -> DispatchOutcome {
        let Some(layer) = layer else {
            warn!(event = %kind, "Requested to send a layer event but layer is absent");
            return DispatchOutcome::Skipped;
        };

        let (Some(receiver), Some(sender)) = (self.receiver.upgrade(), self.sender.upgrade())
        else {
            warn!(
                event = %kind,
                "Didn't send layer event because an endpoint is gone"
            );
            return DispatchOutcome::Skipped;
        };

        let receiver_id = receiver.id();
        let message = LayerEventMessage::new(kind, sender.id(), layer.description());

        match self.deliver(receiver.as_ref(), &message) {
            Ok(()) => {
                debug!(
                    event = %kind,
                    receiver = %receiver_id,
                    order = %layer.order(),
                    "Sent layer event"
                );
                DispatchOutcome::Sent
            }
            Err(e) => {
                error!(
                    event = %kind,
                    receiver = %receiver_id,
                    error = %e,
                    "Failed to send layer event on data channel"
                );
                DispatchOutcome::Failed
            }
        }
    }

    fn deliver(&self, receiver: &dyn Endpoint, message: &LayerEventMessage) -> Result<()> {
        let json = message.to_json()?;
        receiver.send_message(&json)?;
        Ok(())
    }
}
