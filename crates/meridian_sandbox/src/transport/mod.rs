//! # Host Transport
//!
//! The only path between a scene and its host. Both directions carry opaque
//! CRDT byte batches; neither side ever sees the other's engine.
//!
//! ## Exchange contract
//!
//! ```text
//! SANDBOX                          HOST
//!   |--- send_batch(outgoing) ------>|  host applies the batch
//!   |<-- host's own outgoing --------|  before the call returns
//!   |                                |
//!   |--- full_state() -------------->|  once, at startup
//!   |<-- { data, has_entities } -----|
//! ```
//!
//! - [`DirectTransport`]: host on the same thread
//! - [`ChannelTransport`]: host on another thread behind bounded channels

mod channel;
mod direct;

pub use channel::{channel_transport, ChannelTransport, HostEndpoint};
pub use direct::DirectTransport;

use crate::error::TransportError;

/// Host world snapshot used to hydrate a fresh scene.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FullState {
    /// Encoded batches, applied in order.
    pub data: Vec<Vec<u8>>,
    /// True if the host holds any live entity.
    pub has_entities: bool,
}

/// Exchange statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Batches sent to the host.
    pub batches_sent: u64,
    /// Bytes sent to the host.
    pub bytes_sent: u64,
    /// Non-empty batches received from the host.
    pub batches_received: u64,
    /// Bytes received from the host.
    pub bytes_received: u64,
    /// Full-state requests.
    pub full_state_requests: u64,
}

impl TransportStats {
    fn record_exchange(&mut self, sent: usize, replies: &[Vec<u8>]) {
        self.batches_sent += 1;
        self.bytes_sent += sent as u64;
        self.batches_received += replies.len() as u64;
        self.bytes_received += replies.iter().map(|batch| batch.len() as u64).sum::<u64>();
    }
}

/// Scene side of the boundary.
pub trait Transport {
    /// Hands the scene's outgoing batch to the host and returns the host's
    /// outgoing batches. Blocks until the host has applied `batch`.
    ///
    /// # Errors
    ///
    /// [`TransportError`] if the host is gone or too slow. After a timeout
    /// the host may still apply `batch`, so callers resend it; applying a
    /// batch twice leaves a replica unchanged.
    fn send_batch(&mut self, batch: &[u8]) -> Result<Vec<Vec<u8>>, TransportError>;

    /// Fetches the host's current world.
    ///
    /// # Errors
    ///
    /// [`TransportError`] if the host is gone or too slow.
    fn full_state(&mut self) -> Result<FullState, TransportError>;

    /// Counters since creation.
    fn stats(&self) -> TransportStats;
}

/// Host side of the boundary.
pub trait HostBridge {
    /// Applies a scene batch and returns the host's own outgoing batch
    /// (empty if the host has nothing to say).
    fn exchange(&mut self, batch: &[u8]) -> Vec<u8>;

    /// Snapshot of the host's world for a fresh scene.
    fn full_state(&mut self) -> FullState;
}

/// Wraps a host reply, dropping empty batches.
fn replies_from(batch: Vec<u8>) -> Vec<Vec<u8>> {
    if batch.is_empty() {
        Vec::new()
    } else {
        vec![batch]
    }
}
