//! TCP slice receiver
//!
//! Accepts one connection at a time on a dedicated thread and reads frames
//! from it in a blocking loop. Decoded messages go to the shared [`Inbox`];
//! nothing on this thread touches rendering state.
//!
//! # Connection lifecycle
//!
//! ```text
//! Idle ──start_listening──▶ Listening ──accept──▶ Serving
//!                              ▲                     │
//!                              └──── peer closes ────┘
//!                  stop() from any state ──▶ Stopped
//! ```
//!
//! # Failure handling
//!
//! - **Unknown kind**: payload consumed and discarded whatever its length,
//!   connection stays open
//! - **Malformed PNG/JSON**: message logged and dropped, connection stays open
//! - **Oversized length on a known kind / I/O error**: connection closed, listener keeps accepting
//! - **End of stream mid-frame**: partial frame discarded

use crate::codec::{FrameHeader, HEADER_LEN, MAX_PAYLOAD_LEN, MessageKind, WireMessage};
use crate::error::{Error, Result};
use crate::inbox::Inbox;
use log::{debug, error, info, warn};
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long accept/read wait before rechecking the shutdown flag
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Scratch size used to discard unknown payloads
const SKIP_CHUNK: usize = 8 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    /// Waiting for the next connection
    Listening,
    /// Reading frames from a connected peer
    Serving,
    Stopped,
}

/// Per-connection counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub delivered: u64,
    pub skipped_unknown: u64,
    pub dropped_malformed: u64,
}

/// One complete frame read off the wire
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    Known(MessageKind, Vec<u8>),
    /// Payload already consumed and discarded
    Unknown { tag: u32, len: usize },
}

enum Fill {
    Complete,
    Closed,
    Stopped,
}

/// Reads whole frames from a byte stream, tolerating short reads and timeouts.
pub struct FrameReader<R> {
    reader: R,
    shutdown: Arc<AtomicBool>,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R, shutdown: Arc<AtomicBool>) -> Self {
        Self { reader, shutdown }
    }

    /// Keep reading until `buf` is full, the peer closes, or shutdown is requested
    fn fill(&mut self, buf: &mut [u8]) -> Result<Fill> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.shutdown.load(Ordering::Relaxed) {
                return Ok(Fill::Stopped);
            }
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => {
                    if filled > 0 {
                        debug!("Stream closed after {} of {} bytes", filled, buf.len());
                    }
                    return Ok(Fill::Closed);
                }
                Ok(n) => filled += n,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(Fill::Complete)
    }

    /// Consume `len` payload bytes through a fixed scratch buffer
    fn skip(&mut self, len: usize) -> Result<Fill> {
        let mut scratch = [0u8; SKIP_CHUNK];
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(SKIP_CHUNK);
            match self.fill(&mut scratch[..n])? {
                Fill::Complete => remaining -= n,
                other => return Ok(other),
            }
        }
        Ok(Fill::Complete)
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` when the stream ends or shutdown is requested; a
    /// partially received frame is discarded in that case. Payloads of
    /// unknown kinds are consumed without being buffered, whatever their
    /// length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLarge`] when a known kind declares a length
    /// above [`MAX_PAYLOAD_LEN`] and [`Error::Io`] for transport failures.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut header_bytes = [0u8; HEADER_LEN];
        if !matches!(self.fill(&mut header_bytes)?, Fill::Complete) {
            return Ok(None);
        }
        let header = FrameHeader::parse(header_bytes);
        let len = header.payload_len();

        let kind = match header.kind() {
            Ok(kind) => kind,
            Err(_) => {
                return match self.skip(len)? {
                    Fill::Complete => Ok(Some(Frame::Unknown {
                        tag: header.tag,
                        len,
                    })),
                    Fill::Closed | Fill::Stopped => {
                        debug!("Stream ended inside unknown frame (tag {})", header.tag);
                        Ok(None)
                    }
                };
            }
        };

        if len > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge {
                len,
                max: MAX_PAYLOAD_LEN,
            });
        }

        let mut payload = vec![0u8; len];
        match self.fill(&mut payload)? {
            Fill::Complete => Ok(Some(Frame::Known(kind, payload))),
            Fill::Closed | Fill::Stopped => {
                debug!("Discarding partial frame (tag {}, {} bytes)", header.tag, len);
                Ok(None)
            }
        }
    }
}

/// Read frames from `reader` until it closes, pushing decoded messages to `inbox`.
pub fn serve_connection<R: Read>(
    reader: R,
    inbox: &Inbox,
    shutdown: Arc<AtomicBool>,
) -> Result<ConnectionStats> {
    let mut frames = FrameReader::new(reader, shutdown);
    let mut stats = ConnectionStats::default();

    while let Some(frame) = frames.next_frame()? {
        let (kind, payload) = match frame {
            Frame::Known(kind, payload) => (kind, payload),
            Frame::Unknown { tag, len } => {
                warn!("Skipped frame of unknown kind {} ({} payload bytes)", tag, len);
                stats.skipped_unknown += 1;
                continue;
            }
        };

        match WireMessage::from_payload(kind, &payload) {
            Ok(message) => {
                debug!("Received {:?} frame ({} bytes)", kind, payload.len());
                inbox.push(message);
                stats.delivered += 1;
            }
            Err(e) => {
                warn!("Dropping message: {}", e);
                stats.dropped_malformed += 1;
            }
        }
    }

    Ok(stats)
}

/// Listens for slice senders and feeds an [`Inbox`].
pub struct StreamReceiver {
    inbox: Arc<Inbox>,
    state: Arc<Mutex<ReceiverState>>,
    shutdown: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
    worker: Option<JoinHandle<()>>,
}

impl StreamReceiver {
    pub fn new() -> Self {
        Self::with_inbox(Arc::new(Inbox::new()))
    }

    pub fn with_inbox(inbox: Arc<Inbox>) -> Self {
        Self {
            inbox,
            state: Arc::new(Mutex::new(ReceiverState::Idle)),
            shutdown: Arc::new(AtomicBool::new(false)),
            local_addr: None,
            worker: None,
        }
    }

    /// Listen on all interfaces at `port`
    pub fn start_listening(&mut self, port: u16) -> Result<SocketAddr> {
        self.start_listening_on(&format!("0.0.0.0:{port}"))
    }

    /// Bind `address` and start accepting on a dedicated thread.
    ///
    /// Returns the bound address, which differs from `address` when it asked
    /// for port 0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the address is unavailable. Nothing is retried.
    pub fn start_listening_on(&mut self, address: &str) -> Result<SocketAddr> {
        self.listen_with(address, thread::Builder::new())
    }

    fn listen_with(&mut self, address: &str, builder: thread::Builder) -> Result<SocketAddr> {
        if let (Some(addr), Some(_)) = (self.local_addr, &self.worker) {
            warn!("Receiver already listening on {}", addr);
            return Ok(addr);
        }

        let bind_err = |source| Error::Bind {
            address: address.to_string(),
            source,
        };
        let listener = TcpListener::bind(address).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        // A fresh flag so a stopped receiver can listen again
        self.shutdown = Arc::new(AtomicBool::new(false));
        // Set before the worker runs so it cannot overwrite Serving
        let previous = self.state();
        self.set_state(ReceiverState::Listening);

        let inbox = Arc::clone(&self.inbox);
        let state = Arc::clone(&self.state);
        let shutdown = Arc::clone(&self.shutdown);
        let worker = builder
            .name("slice-receiver".to_string())
            .spawn(move || Self::accept_loop(listener, inbox, state, shutdown))
            .inspect_err(|_| self.set_state(previous))?;

        info!("Slice receiver listening on {}", local_addr);
        self.local_addr = Some(local_addr);
        self.worker = Some(worker);
        Ok(local_addr)
    }

    fn accept_loop(
        listener: TcpListener,
        inbox: Arc<Inbox>,
        state: Arc<Mutex<ReceiverState>>,
        shutdown: Arc<AtomicBool>,
    ) {
        let set_state = |next: ReceiverState| {
            *state.lock().unwrap_or_else(|e| e.into_inner()) = next;
        };

        while !shutdown.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    info!("Client connected: {}", peer);
                    set_state(ReceiverState::Serving);
                    if let Err(e) = Self::prepare_stream(&stream) {
                        warn!("Failed to configure stream from {}: {}", peer, e);
                    }
                    match serve_connection(stream, &inbox, Arc::clone(&shutdown)) {
                        Ok(stats) => info!(
                            "Client {} disconnected ({} delivered, {} skipped, {} dropped)",
                            peer, stats.delivered, stats.skipped_unknown, stats.dropped_malformed
                        ),
                        Err(e) => warn!("Connection from {} closed: {}", peer, e),
                    }
                    if !shutdown.load(Ordering::Relaxed) {
                        set_state(ReceiverState::Listening);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }

        set_state(ReceiverState::Stopped);
        debug!("Slice receiver accept loop exited");
    }

    fn prepare_stream(stream: &TcpStream) -> std::io::Result<()> {
        // Accepted sockets may inherit non-blocking mode from the listener
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(POLL_INTERVAL))
    }

    fn set_state(&self, next: ReceiverState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    pub fn state(&self) -> ReceiverState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn inbox(&self) -> Arc<Inbox> {
        Arc::clone(&self.inbox)
    }

    /// Close the listener and abandon any in-flight read. Idempotent.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Slice receiver thread panicked");
            }
            info!("Slice receiver stopped");
        }
        if self.state() != ReceiverState::Idle {
            self.set_state(ReceiverState::Stopped);
        }
        self.local_addr = None;
    }
}

impl Default for StreamReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StreamReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}
