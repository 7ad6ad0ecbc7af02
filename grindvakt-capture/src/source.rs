//! Frame sources the capture session can drive.
//!
//! `PcapSource` wraps a live pcap handle. `ChannelSource` is fed from
//! inside the process and is what the tests drive the session with.

use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError};
use grindvakt_protocols::LinkType;
use pcap::{Active, BreakLoop, Capture, Device};
use tracing::{debug, info};

use crate::error::CaptureError;
use crate::packet::Frame;
use crate::session::CaptureOptions;

/// Pseudo devices pcap lists that never carry host traffic worth matching.
const PSEUDO_DEVICES: &[&str] = &["any", "nflog", "nfqueue", "dbus-system", "dbus-session"];

/// Outcome of one receive call.
#[derive(Debug)]
pub enum Poll {
    Frame(Frame),
    /// Read timeout elapsed with nothing captured.
    Timeout,
    /// Source is exhausted and will not produce more frames.
    Closed,
}

/// A blocking producer of captured frames.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Poll, CaptureError>;
}

/// Breaks a blocked `FrameSource::next_frame` call from another thread.
pub trait Interrupt: Send + Sync {
    fn interrupt(&self);
}

impl Interrupt for BreakLoop {
    fn interrupt(&self) {
        self.breakloop();
    }
}

/// Picks the device to capture on: the named one, or else the first
/// non-loopback device pcap reports.
pub fn find_interface(name: Option<&str>) -> Result<Device, CaptureError> {
    let devices = Device::list().map_err(|e| CaptureError::CaptureOpenFailed {
        interface: name.unwrap_or("<auto>").to_string(),
        reason: e.to_string(),
    })?;

    match name {
        Some(name) => devices
            .into_iter()
            .find(|d| d.name == name)
            .ok_or_else(|| CaptureError::UnknownInterface(name.to_string())),
        None => devices
            .into_iter()
            .filter(|d| !d.flags.is_loopback())
            .find(|d| !PSEUDO_DEVICES.contains(&d.name.as_str()))
            .ok_or(CaptureError::NoInterfaceFound),
    }
}

/// Live pcap capture handle.
pub struct PcapSource {
    capture: Capture<Active>,
    link: LinkType,
    interface: String,
}

impl PcapSource {
    /// Opens `device` with the configured promiscuity, snapshot length and
    /// read timeout. Returns the source and a handle that breaks its loop.
    pub fn open(
        device: Device,
        options: &CaptureOptions,
    ) -> Result<(Self, BreakLoop), CaptureError> {
        let interface = device.name.clone();
        let open_failed = |e: pcap::Error| CaptureError::CaptureOpenFailed {
            interface: interface.clone(),
            reason: e.to_string(),
        };

        let mut capture = Capture::from_device(device)
            .map_err(open_failed)?
            .promisc(options.promiscuous)
            .snaplen(options.snaplen)
            .timeout(options.read_timeout.as_millis() as i32)
            .open()
            .map_err(open_failed)?;

        let dlt = capture.get_datalink().0;
        let link = LinkType::from_dlt(dlt).ok_or_else(|| CaptureError::CaptureOpenFailed {
            interface: interface.clone(),
            reason: format!("unsupported link type {dlt}"),
        })?;

        let breaker = capture.breakloop_handle();
        info!(
            interface = %interface,
            ?link,
            snaplen = options.snaplen,
            promiscuous = options.promiscuous,
            "Capture handle opened"
        );

        Ok((
            Self {
                capture,
                link,
                interface,
            },
            breaker,
        ))
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl FrameSource for PcapSource {
    fn next_frame(&mut self) -> Result<Poll, CaptureError> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(Poll::Frame(Frame::new(self.link, packet.data.to_vec()))),
            Err(pcap::Error::TimeoutExpired) => Ok(Poll::Timeout),
            // pcap reports a broken loop the same way it reports end of input.
            Err(pcap::Error::NoMorePackets) => Err(CaptureError::CaptureLoopInterrupted),
            Err(e) => Err(CaptureError::Read(e.to_string())),
        }
    }
}

impl Drop for PcapSource {
    fn drop(&mut self) {
        debug!(interface = %self.interface, "Capture handle closed");
    }
}

/// Frames pushed through a channel by the owner of the sending half.
///
/// Waits at most `poll` per call so stop requests are seen promptly.
/// Dropping every sender closes the source.
pub struct ChannelSource {
    frames: Receiver<Frame>,
    poll: Duration,
}

impl ChannelSource {
    pub fn new(frames: Receiver<Frame>, poll: Duration) -> Self {
        Self { frames, poll }
    }
}

impl FrameSource for ChannelSource {
    fn next_frame(&mut self) -> Result<Poll, CaptureError> {
        match self.frames.recv_timeout(self.poll) {
            Ok(frame) => Ok(Poll::Frame(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(Poll::Timeout),
            Err(RecvTimeoutError::Disconnected) => Ok(Poll::Closed),
        }
    }
}
