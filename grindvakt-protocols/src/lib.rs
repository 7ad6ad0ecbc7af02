//! # grindvakt Protocol Decoding
//!
//! Reduces captured link-layer frames to the pair of network-layer
//! addresses the matching engine cares about, and defines the sink that
//! receives them.

pub mod ip;

pub use ip::{observe, observe_ip, LinkType, PacketObservation, ParseError};

/// Receiver of decoded packets. The capture loop calls it once per frame.
pub trait PacketSink: Send + Sync {
    fn on_packet(&self, packet: &PacketObservation);

    /// Frame carried no IPv4/IPv6 header. Called instead of `on_packet`.
    fn on_unresolved(&self, _error: &ParseError) {}
}

impl<F> PacketSink for F
where
    F: Fn(&PacketObservation) + Send + Sync,
{
    fn on_packet(&self, packet: &PacketObservation) {
        self(packet)
    }
}
