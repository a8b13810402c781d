//! Common types used throughout the simulcast switching implementation

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Unique identifier for an endpoint (sender or receiver of simulcast)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EndpointId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EndpointId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Rank of a simulcast layer. Lower orders are more degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerOrder(u8);

impl LayerOrder {
    /// The lowest quality layer. Always accepted as a switch target.
    pub const LOWEST: Self = Self(0);

    #[must_use]
    pub const fn new(order: u8) -> Self {
        Self(order)
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_lowest(self) -> bool {
        self.0 == Self::LOWEST.0
    }
}

impl fmt::Display for LayerOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for LayerOrder {
    fn from(order: u8) -> Self {
        Self(order)
    }
}

/// RTP packet with the metadata the forwarding gate needs
#[derive(Debug, Clone)]
pub struct ForwardablePacket {
    /// RTP packet data
    pub data: Bytes,

    /// Source SSRC
    pub ssrc: u32,

    /// Sequence number
    pub sequence_number: u16,

    /// Timestamp
    pub timestamp: u32,

    /// When packet was received
    pub received_at: Instant,
}

impl ForwardablePacket {
    pub fn new(ssrc: u32, sequence_number: u16, timestamp: u32, data: Bytes) -> Self {
        Self {
            data,
            ssrc,
            sequence_number,
            timestamp,
            received_at: Instant::now(),
        }
    }
}
