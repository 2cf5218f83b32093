//! Media server (freeswitch) recorder backend
//!
//! The INVITE is relayed as-is to freeswitch over UDP with our own Via on
//! top. Ringing and session progress are passed back to the signaling
//! element, the final response is acknowledged towards freeswitch and then
//! relayed as our own final answer. A BYE is relayed the same way and
//! succeeds once freeswitch confirms it.

use super::rtpengine::sink_fault;
use crate::application::CallHandler;
use crate::config::FreeswitchConfig;
use crate::domain::{ClassifiedFault, Outcome};
use crate::infrastructure::protocols::control::ResponseSink;
use crate::infrastructure::protocols::sip::builder::{build_ack, with_top_via};
use crate::infrastructure::protocols::sip::{ResponseBuilder, SipRequest, SipResponse};
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument, Span};
use uuid::Uuid;

pub struct FreeswitchHandler {
    target: SocketAddr,
    timeout: Duration,
    span: Span,
}

impl FreeswitchHandler {
    pub fn new(config: &FreeswitchConfig, span: Span) -> Self {
        Self {
            target: config.sip_address,
            timeout: Duration::from_millis(config.timeout_ms),
            span,
        }
    }

    async fn relay_socket(&self) -> anyhow::Result<(UdpSocket, SocketAddr)> {
        let unspecified: IpAddr = if self.target.is_ipv4() {
            Ipv4Addr::UNSPECIFIED.into()
        } else {
            Ipv6Addr::UNSPECIFIED.into()
        };
        let socket = UdpSocket::bind(SocketAddr::new(unspecified, 0))
            .await
            .context("binding relay socket")?;
        socket
            .connect(self.target)
            .await
            .with_context(|| format!("connecting relay socket to {}", self.target))?;
        let local = socket.local_addr().context("relay socket address")?;
        Ok((socket, local))
    }

    /// Send `request` with our Via on top
    async fn forward(
        &self,
        socket: &UdpSocket,
        local: SocketAddr,
        request: &SipRequest,
    ) -> anyhow::Result<SipRequest> {
        let branch = Uuid::new_v4().simple().to_string();
        let relayed = with_top_via(request, local, &branch);
        socket
            .send(&relayed.to_bytes())
            .await
            .with_context(|| format!("relaying {} to {}", request.method(), self.target))?;
        Ok(relayed)
    }

    /// Next response from freeswitch for `call_id`
    async fn next_response(
        &self,
        socket: &UdpSocket,
        call_id: &str,
        deadline: Instant,
        buf: &mut [u8],
    ) -> anyhow::Result<SipResponse> {
        loop {
            let size = tokio::time::timeout_at(deadline, socket.recv(buf))
                .await
                .map_err(|_| {
                    anyhow!("freeswitch at {} did not answer within {:?}", self.target, self.timeout)
                })?
                .context("receiving from freeswitch")?;

            let response = match SipResponse::parse(&buf[..size]) {
                Ok(response) => response,
                Err(e) => {
                    warn!(call_id = %call_id, "Unparseable message from freeswitch: {}", e);
                    continue;
                }
            };
            if response.call_id().as_deref() != Some(call_id) {
                debug!(call_id = %call_id, "Ignoring response for another call");
                continue;
            }
            return Ok(response);
        }
    }

    async fn relay(&self, request: SipRequest, sink: ResponseSink) -> Outcome {
        let call_id = request.call_id().unwrap_or_default();

        let (socket, local) = self.relay_socket().await?;
        let relayed = self.forward(&socket, local, &request).await?;
        debug!(call_id = %call_id, target = %self.target, "INVITE relayed");

        let mut buf = vec![0u8; 65535];
        let deadline = Instant::now() + self.timeout;
        loop {
            let response = self.next_response(&socket, &call_id, deadline, &mut buf).await?;
            let status = response.status_code();
            match status {
                100 => continue,
                101..=199 => {
                    if let Err(e) = sink.send_response(relay_response(&response)).await {
                        debug!(call_id = %call_id, status, error = %e, "Provisional response not relayed");
                    }
                }
                _ => return self.conclude(&socket, &relayed, &response, &sink).await,
            }
        }
    }

    async fn hang_up(&self, request: &SipRequest) -> anyhow::Result<()> {
        let call_id = request.call_id().unwrap_or_default();

        let (socket, local) = self.relay_socket().await?;
        self.forward(&socket, local, request).await?;

        let mut buf = vec![0u8; 65535];
        let deadline = Instant::now() + self.timeout;
        loop {
            let response = self.next_response(&socket, &call_id, deadline, &mut buf).await?;
            match response.status_code() {
                100..=199 => continue,
                200..=299 => {
                    info!(call_id = %call_id, "Recording session released on freeswitch");
                    return Ok(());
                }
                status => bail!("freeswitch answered BYE with {}", status),
            }
        }
    }

    async fn conclude(
        &self,
        socket: &UdpSocket,
        relayed: &SipRequest,
        response: &SipResponse,
        sink: &ResponseSink,
    ) -> Outcome {
        let call_id = sink.call_id();
        let status = response.status_code();

        let ack = build_ack(relayed, response);
        if let Err(e) = socket.send(&ack.to_bytes()).await {
            warn!(call_id = %call_id, error = %e, "Failed to ACK freeswitch final response");
        }

        sink.send_response(relay_response(response))
            .await
            .map_err(sink_fault)?;

        if status >= 300 {
            return Err(ClassifiedFault::protocol(status, response.status_text()));
        }
        info!(call_id = %call_id, status, "Recording session established on freeswitch");
        Ok(())
    }
}

/// Our answer carrying freeswitch's status and body
fn relay_response(response: &SipResponse) -> ResponseBuilder {
    let builder = ResponseBuilder::new(response.status_code());
    if response.body().is_empty() {
        return builder;
    }
    let content_type = response
        .content_type()
        .unwrap_or_else(|| "application/sdp".to_string());
    builder.body(response.body().to_vec(), &content_type)
}

#[async_trait]
impl CallHandler for FreeswitchHandler {
    async fn handle(&self, request: SipRequest, sink: ResponseSink) -> Outcome {
        self.relay(request, sink).instrument(self.span.clone()).await
    }

    async fn terminate(&self, request: &SipRequest) -> anyhow::Result<()> {
        self.hang_up(request).instrument(self.span.clone()).await
    }

    fn name(&self) -> &'static str {
        "freeswitch"
    }
}
