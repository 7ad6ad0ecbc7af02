//! grindvakt-capture
//!
//! Live packet capture for grindvakt. A `CaptureSession` owns the capture
//! handle, runs the blocking receive loop and hands every decodable frame
//! to a `PacketSink`. Live capture uses pcap; `ChannelSource` feeds frames
//! from inside the process.

pub mod error;
pub mod packet;
pub mod session;
pub mod source;

pub use error::CaptureError;
pub use packet::Frame;
pub use session::{CaptureOptions, CaptureSession, CaptureSummary, SessionState};
pub use source::{find_interface, ChannelSource, FrameSource, Interrupt, PcapSource, Poll};
