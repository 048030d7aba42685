//! Channel seams the engines are generic over.
//!
//! The engines never touch sockets or files directly. Production code plugs in
//! the tokio implementations from [`crate::net`] and [`crate::output`]; tests and
//! the simulator plug in in-memory links.
#![allow(async_fn_in_trait)]

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::EngineError;

/// Sending half of the unreliable datagram channel.
pub trait SegmentTx {
    /// Push one encoded segment towards the receiver. Delivery is not guaranteed.
    async fn send_segment(&mut self, segment: &[u8]) -> Result<(), EngineError>;

    fn local_addr(&self) -> SocketAddr;

    fn peer_addr(&self) -> SocketAddr;
}

/// Receiving half of the unreliable datagram channel.
pub trait SegmentRx {
    /// Block until a datagram arrives; returns its length and origin.
    async fn recv_segment(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddr), EngineError>;

    fn local_addr(&self) -> SocketAddr;
}

/// An acknowledgment line as it came off the reliable channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedAck {
    pub line: String,
    pub from: SocketAddr,
}

/// Result of one bounded wait on the acknowledgment endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Acknowledged(ReceivedAck),
    TimedOut,
}

/// Sender-side endpoint of the reliable acknowledgment channel.
pub trait AckWaiter {
    /// Wait at most `deadline` for the next acknowledgment.
    ///
    /// An acknowledgment that shows up after the deadline is not lost; it is
    /// returned by a later call.
    async fn wait_ack(&mut self, deadline: Duration) -> Result<AckOutcome, EngineError>;

    fn local_addr(&self) -> SocketAddr;
}

/// Receiver-side endpoint of the reliable acknowledgment channel.
pub trait AckNotifier {
    /// Deliver one acknowledgment line. Returns the local address it was sent from.
    async fn notify(&mut self, line: &str) -> Result<SocketAddr, EngineError>;

    fn peer_addr(&self) -> SocketAddr;
}

/// Where accepted payload blocks end up, in sequence order.
pub trait Delivery {
    async fn append(&mut self, block: &[u8]) -> Result<(), EngineError>;
}

impl Delivery for Vec<u8> {
    async fn append(&mut self, block: &[u8]) -> Result<(), EngineError> {
        self.extend_from_slice(block);
        Ok(())
    }
}
