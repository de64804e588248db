//! Outbound slice streaming.
//!
//! Sending is synchronous: each call writes one complete frame and returns
//! once the OS has accepted it. No timeout is applied and nothing is retried.

use crate::codec::{MessageKind, PatientRecord, WireMessage};
use crate::enums::Orientation;
use crate::error::{Error, Result};
use crate::frame::FrameBuffer2D;
use log::{debug, info};
use std::io::{ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};

#[derive(Default)]
pub struct StreamSender {
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
}

impl StreamSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open one outbound connection, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] on resolution failure, refusal or timeout.
    pub fn connect(&mut self, address: &str, port: u16) -> Result<SocketAddr> {
        self.disconnect();

        let target = format!("{address}:{port}");
        let conn_err = |source| Error::Connection {
            address: target.clone(),
            source,
        };

        let candidates: Vec<SocketAddr> = (address, port)
            .to_socket_addrs()
            .map_err(conn_err)?
            .collect();

        let mut last_err =
            std::io::Error::new(ErrorKind::NotFound, "address resolved to nothing");
        for candidate in candidates {
            match TcpStream::connect(candidate) {
                Ok(stream) => {
                    info!("Connected to {}", candidate);
                    self.stream = Some(stream);
                    self.peer = Some(candidate);
                    return Ok(candidate);
                }
                Err(e) => {
                    debug!("Connect to {} failed: {}", candidate, e);
                    last_err = e;
                }
            }
        }
        Err(conn_err(last_err))
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn send_image(&mut self, frame: &FrameBuffer2D, orientation: Orientation) -> Result<()> {
        self.send(&WireMessage::Image {
            orientation,
            frame: frame.clone(),
        })
    }

    pub fn send_patient_info(&mut self, record: &PatientRecord) -> Result<()> {
        self.send(&WireMessage::PatientInfo(record.clone()))
    }

    /// Encode `message` and write it as one frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Write`] when not connected or the stream is closed.
    /// A failed write may have sent part of the frame; reconnect before
    /// sending again.
    pub fn send(&mut self, message: &WireMessage) -> Result<()> {
        let kind = message.kind();
        let stream = self.stream.as_mut().ok_or_else(|| Error::Write {
            kind,
            source: ErrorKind::NotConnected.into(),
        })?;

        let bytes = message.to_frame()?;
        Self::write_frame(stream, kind, &bytes)?;
        debug!("Sent {:?} frame ({} bytes)", kind, bytes.len());
        Ok(())
    }

    fn write_frame(stream: &mut TcpStream, kind: MessageKind, bytes: &[u8]) -> Result<()> {
        stream
            .write_all(bytes)
            .and_then(|_| stream.flush())
            .map_err(|source| Error::Write { kind, source })
    }

    /// Close the connection. Safe to call when already disconnected.
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            if let Some(peer) = self.peer.take() {
                info!("Disconnected from {}", peer);
            }
        }
        self.peer = None;
    }
}

impl Drop for StreamSender {
    fn drop(&mut self) {
        self.disconnect();
    }
}
