//! DTMF event listener for the rtpengine backend
//!
//! rtpengine reports detected DTMF as one JSON document per UDP datagram
//! (`dtmf-log-dest`). Events are only logged; call handling never waits on
//! this listener.

use crate::application::DtmfListener;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// One DTMF report as rtpengine emits it
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DtmfEvent {
    pub callid: String,
    #[serde(default)]
    pub source_tag: Option<String>,
    pub event: u8,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub volume: Option<i64>,
}

impl DtmfEvent {
    pub fn parse(datagram: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(datagram)
    }

    /// RFC 4733 event code as a keypad digit
    pub fn digit(&self) -> Option<char> {
        match self.event {
            0..=9 => char::from_digit(u32::from(self.event), 10),
            10 => Some('*'),
            11 => Some('#'),
            12..=15 => Some((b'A' + (self.event - 12)) as char),
            _ => None,
        }
    }
}

pub struct RtpEngineDtmfListener {
    address: SocketAddr,
}

impl RtpEngineDtmfListener {
    pub fn new(address: SocketAddr) -> Self {
        Self { address }
    }

    async fn serve(&self, socket: UdpSocket) -> anyhow::Result<()> {
        let mut buf = vec![0u8; 8192];
        loop {
            let (size, source) = socket
                .recv_from(&mut buf)
                .await
                .context("receiving DTMF event")?;

            match DtmfEvent::parse(&buf[..size]) {
                Ok(event) => match event.digit() {
                    Some(digit) => info!(
                        call_id = %event.callid,
                        source_tag = ?event.source_tag,
                        digit = %digit,
                        duration = ?event.duration,
                        "DTMF event"
                    ),
                    None => debug!(call_id = %event.callid, event = event.event, "Non-keypad DTMF event"),
                },
                Err(e) => warn!("Malformed DTMF event from {}: {}", source, e),
            }
        }
    }
}

#[async_trait]
impl DtmfListener for RtpEngineDtmfListener {
    async fn listen(&self) -> anyhow::Result<()> {
        let socket = UdpSocket::bind(self.address)
            .await
            .with_context(|| format!("binding DTMF listener on {}", self.address))?;
        info!(address = %self.address, "Listening for DTMF events");
        self.serve(socket).await
    }
}
