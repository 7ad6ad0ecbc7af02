//! ## grindvakt-capture::session
//! **Capture session lifecycle**
//!
//! `Idle → Opening → Running → Stopping → Closed`
//!
//! - `Opening` covers the handle being opened and armed, up to the moment
//!   the receive loop starts. Open failures go straight to `Closed`.
//! - `Running` lasts while the receive loop executes.
//! - `stop()` moves to `Stopping`, breaks the blocked receive call, waits
//!   a bounded time for the loop to exit and always ends in `Closed`.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use grindvakt_protocols::{observe, PacketSink};
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::CaptureError;
use crate::source::{find_interface, FrameSource, Interrupt, PcapSource, Poll};

/// Lifecycle of one capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Running,
    Stopping,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Opening => "opening",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Capture handle parameters.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Device to open. `None` picks the first non-loopback device.
    pub interface: Option<String>,
    pub promiscuous: bool,
    /// Snapshot length in bytes.
    pub snaplen: i32,
    /// Upper bound on one blocking receive call.
    pub read_timeout: Duration,
    /// How long `stop()` waits for the loop to exit.
    pub shutdown_timeout: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            interface: None,
            promiscuous: true,
            snaplen: 65_536,
            read_timeout: Duration::from_millis(1_000),
            shutdown_timeout: Duration::from_millis(1_000),
        }
    }
}

/// Counters for one run of the receive loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    pub frames: u64,
    pub unresolved: u64,
}

/// Owns a capture handle and the loop that drains it.
///
/// All methods take `&self`; `stop()` may be called from any thread while
/// another thread is blocked inside `run()`.
pub struct CaptureSession {
    options: CaptureOptions,
    state: Mutex<SessionState>,
    source: Mutex<Option<Box<dyn FrameSource>>>,
    interrupt: Mutex<Option<Arc<dyn Interrupt>>>,
    interface: Mutex<Option<String>>,
    stop_requested: AtomicBool,
    frames: AtomicU64,
    unresolved: AtomicU64,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureSession {
    pub fn new(options: CaptureOptions) -> Self {
        let (done_tx, done_rx) = channel::bounded(1);
        Self {
            options,
            state: Mutex::new(SessionState::Idle),
            source: Mutex::new(None),
            interrupt: Mutex::new(None),
            interface: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
            frames: AtomicU64::new(0),
            unresolved: AtomicU64::new(0),
            done_tx,
            done_rx,
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Name of the opened device, once open.
    pub fn interface(&self) -> Option<String> {
        self.interface.lock().clone()
    }

    pub fn summary(&self) -> CaptureSummary {
        CaptureSummary {
            frames: self.frames.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
        }
    }

    /// Opens the live pcap handle. There is no retry: a failure leaves the
    /// session `Closed` and needs operator intervention.
    #[instrument(skip(self), fields(interface = ?self.options.interface))]
    pub fn open(&self) -> Result<(), CaptureError> {
        self.begin_opening()?;

        let opened = find_interface(self.options.interface.as_deref())
            .and_then(|device| PcapSource::open(device, &self.options));

        match opened {
            Ok((source, breaker)) => {
                let name = source.interface().to_string();
                info!("Listening on {name}");
                self.arm(Box::new(source), Some(Arc::new(breaker)), name);
                Ok(())
            }
            Err(e) => {
                error!("Failed to open capture: {e}");
                *self.state.lock() = SessionState::Closed;
                Err(e)
            }
        }
    }

    /// Arms the session with an already-open source.
    pub fn open_with(
        &self,
        source: Box<dyn FrameSource>,
        interrupt: Option<Arc<dyn Interrupt>>,
        label: impl Into<String>,
    ) -> Result<(), CaptureError> {
        self.begin_opening()?;
        self.arm(source, interrupt, label.into());
        Ok(())
    }

    fn begin_opening(&self) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if *state != SessionState::Idle {
            return Err(CaptureError::InvalidState {
                expected: SessionState::Idle,
                actual: *state,
            });
        }
        *state = SessionState::Opening;
        Ok(())
    }

    fn arm(&self, source: Box<dyn FrameSource>, interrupt: Option<Arc<dyn Interrupt>>, name: String) {
        *self.source.lock() = Some(source);
        *self.interrupt.lock() = interrupt;
        *self.interface.lock() = Some(name);
    }

    /// Runs the receive loop on the calling thread until `stop()` is called
    /// or the source closes. Frames without an IP header are skipped.
    ///
    /// A session stopped before the loop got going returns an empty run.
    pub fn run<S>(&self, sink: &S) -> Result<CaptureSummary, CaptureError>
    where
        S: PacketSink + ?Sized,
    {
        let mut source = {
            let mut state = self.state.lock();
            match *state {
                SessionState::Opening => {}
                SessionState::Stopping | SessionState::Closed => {
                    debug!("Capture stopped before the loop started");
                    return Ok(self.summary());
                }
                actual => {
                    return Err(CaptureError::InvalidState {
                        expected: SessionState::Opening,
                        actual,
                    });
                }
            }
            let source = self.source.lock().take().ok_or(CaptureError::InvalidState {
                expected: SessionState::Opening,
                actual: SessionState::Closed,
            })?;
            *state = SessionState::Running;
            source
        };

        info!("Capture loop started");
        let result = self.drain(source.as_mut(), sink);

        // Closing the handle is dropping it.
        drop(source);
        let _ = self.done_tx.try_send(());

        {
            let mut state = self.state.lock();
            if *state == SessionState::Running {
                *state = SessionState::Closed;
            }
        }

        let summary = self.summary();
        info!(
            frames = summary.frames,
            unresolved = summary.unresolved,
            "Capture loop finished"
        );
        result.map(|_| summary)
    }

    fn drain<S>(&self, source: &mut dyn FrameSource, sink: &S) -> Result<(), CaptureError>
    where
        S: PacketSink + ?Sized,
    {
        while !self.stop_requested.load(Ordering::Acquire) {
            match source.next_frame() {
                Ok(Poll::Frame(frame)) => {
                    self.frames.fetch_add(1, Ordering::Relaxed);
                    match observe(frame.link, &frame.data) {
                        Ok(packet) => sink.on_packet(&packet),
                        Err(e) => {
                            // Per-frame failures are counted, never logged above trace.
                            self.unresolved.fetch_add(1, Ordering::Relaxed);
                            trace!("Skipping frame: {e}");
                            sink.on_unresolved(&e);
                        }
                    }
                }
                Ok(Poll::Timeout) => continue,
                Ok(Poll::Closed) => {
                    debug!("Frame source closed");
                    return Ok(());
                }
                Err(CaptureError::CaptureLoopInterrupted) => {
                    debug!("Capture loop interrupted");
                    return Ok(());
                }
                Err(e) if self.stop_requested.load(Ordering::Acquire) => {
                    debug!("Receive failed during shutdown: {e}");
                    return Ok(());
                }
                Err(e) => {
                    error!("Error capturing packet: {e}");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Runs the receive loop on a dedicated thread.
    pub fn spawn<S>(self: &Arc<Self>, sink: Arc<S>) -> Result<(), CaptureError>
    where
        S: PacketSink + ?Sized + 'static,
    {
        {
            let state = self.state.lock();
            if *state != SessionState::Opening {
                return Err(CaptureError::InvalidState {
                    expected: SessionState::Opening,
                    actual: *state,
                });
            }
        }

        let session = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("grindvakt-capture".into())
            .spawn(move || {
                if let Err(e) = session.run(sink.as_ref()) {
                    error!("Capture loop failed: {e}");
                }
            })
            .map_err(|e| CaptureError::Read(format!("failed to spawn capture thread: {e}")))?;

        *self.worker.lock() = Some(handle);
        Ok(())
    }

    /// Stops the session. Idempotent and callable from any thread.
    #[instrument(skip(self))]
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                SessionState::Stopping | SessionState::Closed => return,
                SessionState::Idle => {
                    *state = SessionState::Closed;
                    return;
                }
                SessionState::Opening | SessionState::Running => {
                    *state = SessionState::Stopping;
                }
            }
        }

        info!("Stopping packet capture");
        self.stop_requested.store(true, Ordering::Release);
        if let Some(interrupt) = self.interrupt.lock().as_ref() {
            interrupt.interrupt();
        }

        // Loop never started: close the armed handle here.
        let idle_source = self.source.lock().take();
        if let Some(source) = idle_source {
            drop(source);
        } else if self.done_rx.recv_timeout(self.options.shutdown_timeout).is_err() {
            warn!(
                "Capture loop did not exit within {:?}; continuing shutdown",
                self.options.shutdown_timeout
            );
        }

        if let Some(handle) = self.worker.lock().take() {
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!("Capture thread panicked");
                }
            } else {
                warn!("Detaching capture thread that is still running");
            }
        }

        *self.state.lock() = SessionState::Closed;
        info!("Capture stopped");
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}
