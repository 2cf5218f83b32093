//! One control-plane connection to the signaling element

use super::frame::Frame;
use super::sink::ResponseSink;
use crate::application::Dispatcher;
use crate::domain::TransportError;
use crate::infrastructure::protocols::sip::SipMessage;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Queue depth for outbound frames per connection
const OUTBOUND_QUEUE: usize = 1000;

pub struct Connection {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    buffer: BytesMut,
    local: SocketAddr,
    peer: SocketAddr,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Result<Self, TransportError> {
        let local = stream.local_addr()?;
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader,
            writer,
            buffer: BytesMut::with_capacity(8 * 1024),
            local,
            peer,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Next frame, or `None` when the peer closed cleanly between frames
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            if let Some(frame) = Frame::decode(&mut self.buffer)? {
                return Ok(Some(frame));
            }

            if self.reader.read_buf(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(TransportError::Framing(format!(
                    "{} closed the connection mid-frame",
                    self.peer
                )));
            }
        }
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        self.writer.write_all(&frame.encode()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read SIP traffic until the connection ends, dispatching every request.
    ///
    /// Responses are written by a separate task fed through each request's
    /// [`ResponseSink`]. When this returns, that task is stopped and sinks of
    /// transactions still in flight report the transaction as closed.
    pub async fn serve(self, dispatcher: Arc<Dispatcher>) -> Result<(), TransportError> {
        let Connection {
            mut reader,
            writer,
            mut buffer,
            peer,
            ..
        } = self;

        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let writer_task = dispatcher
            .policy()
            .spawn_guarded("control-writer", Self::write_loop(writer, rx, peer));

        let result = loop {
            let frame = match Frame::decode(&mut buffer) {
                Ok(Some(frame)) => frame,
                Ok(None) => match reader.read_buf(&mut buffer).await {
                    Ok(0) => {
                        info!("Control-plane connection closed by {}", peer);
                        break Ok(());
                    }
                    Ok(size) => {
                        debug!("Received {} bytes from {}", size, peer);
                        continue;
                    }
                    Err(e) => break Err(TransportError::Io(e)),
                },
                Err(e) => break Err(e),
            };

            match frame {
                Frame::Sip(raw) => match SipMessage::parse(&raw) {
                    Ok(SipMessage::Request(request)) => {
                        let sink = ResponseSink::new(request.clone(), tx.clone());
                        // Panics in the dispatched task are handled by the fault policy
                        drop(dispatcher.dispatch(request, sink));
                    }
                    Ok(SipMessage::Response(response)) => {
                        debug!(
                            "Received SIP response {} from {}",
                            response.status_code(),
                            peer
                        );
                    }
                    Err(e) => {
                        warn!("Failed to parse SIP message from {}: {}", peer, e);
                    }
                },
                other => {
                    warn!("Unexpected {} frame from {}", other.kind(), peer);
                }
            }
        };

        writer_task.abort();
        result
    }

    async fn write_loop(
        mut writer: OwnedWriteHalf,
        mut rx: mpsc::Receiver<Frame>,
        peer: SocketAddr,
    ) {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = writer.write_all(&frame.encode()).await {
                error!("Failed to write to {}: {}", peer, e);
                break;
            }
        }
    }
}
