//! Media relay (rtpengine) recorder backend
//!
//! The SDP part of the SIPREC offer is handed to rtpengine with recording
//! enabled; rtpengine's rewritten SDP becomes our answer.

use super::bencode::Bencode;
use crate::application::CallHandler;
use crate::config::RtpEngineConfig;
use crate::domain::{ClassifiedFault, Outcome, SinkError};
use crate::infrastructure::protocols::control::ResponseSink;
use crate::infrastructure::protocols::sip::{multipart, ResponseBuilder, SipRequest};
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Client for rtpengine's NG protocol (bencode over UDP, cookie-prefixed)
#[derive(Debug, Clone)]
pub struct NgClient {
    address: SocketAddr,
    timeout: Duration,
}

impl NgClient {
    pub fn new(address: SocketAddr, timeout: Duration) -> Self {
        Self { address, timeout }
    }

    /// Send one command and return the reply dictionary.
    ///
    /// Replies with `result` other than `ok` are errors.
    pub async fn command(&self, params: Bencode) -> anyhow::Result<Bencode> {
        let unspecified: IpAddr = if self.address.is_ipv4() {
            Ipv4Addr::UNSPECIFIED.into()
        } else {
            Ipv6Addr::UNSPECIFIED.into()
        };
        let socket = UdpSocket::bind(SocketAddr::new(unspecified, 0))
            .await
            .context("binding NG client socket")?;

        let cookie: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        let mut datagram = format!("{} ", cookie).into_bytes();
        datagram.extend_from_slice(&params.encode());
        socket
            .send_to(&datagram, self.address)
            .await
            .with_context(|| format!("sending NG command to {}", self.address))?;

        let mut buf = vec![0u8; 65535];
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let (size, source) = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf))
                .await
                .map_err(|_| anyhow!("rtpengine at {} did not answer in time", self.address))??;
            if source != self.address {
                continue;
            }

            let reply = &buf[..size];
            let body = match reply
                .strip_prefix(cookie.as_bytes())
                .and_then(|rest| rest.strip_prefix(b" "))
            {
                Some(body) => body,
                // Late reply to an earlier command
                None => continue,
            };

            let reply = Bencode::decode(body).context("decoding NG reply")?;
            return match reply.get("result").and_then(Bencode::as_str) {
                Some("ok") => Ok(reply),
                Some(other) => {
                    let reason = reply
                        .get("error-reason")
                        .and_then(Bencode::as_str)
                        .unwrap_or("no reason given");
                    bail!("rtpengine returned {}: {}", other, reason)
                }
                None => bail!("rtpengine reply without result"),
            };
        }
    }

    /// Offer with recording enabled; returns the SDP to answer with
    pub async fn offer(&self, call_id: &str, from_tag: &str, sdp: &str) -> anyhow::Result<String> {
        let reply = self
            .command(Bencode::dict([
                ("command", Bencode::from("offer")),
                ("call-id", Bencode::from(call_id)),
                ("from-tag", Bencode::from(from_tag)),
                ("sdp", Bencode::from(sdp)),
                ("record call", Bencode::from("yes")),
                (
                    "replace",
                    Bencode::List(vec![
                        Bencode::from("origin"),
                        Bencode::from("session-connection"),
                    ]),
                ),
            ]))
            .await?;

        reply
            .get("sdp")
            .and_then(Bencode::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("rtpengine offer reply without sdp"))
    }

    /// Delete one leg, or the whole call when `from_tag` is `None`
    pub async fn delete(&self, call_id: &str, from_tag: Option<&str>) -> anyhow::Result<()> {
        let mut params = vec![
            ("command", Bencode::from("delete")),
            ("call-id", Bencode::from(call_id)),
        ];
        if let Some(tag) = from_tag {
            params.push(("from-tag", Bencode::from(tag)));
        }
        self.command(Bencode::dict(params)).await.map(|_| ())
    }
}

pub struct RtpEngineHandler {
    client: NgClient,
}

impl RtpEngineHandler {
    pub fn new(config: &RtpEngineConfig) -> Self {
        Self {
            client: NgClient::new(config.ng_address, Duration::from_millis(config.timeout_ms)),
        }
    }
}

#[async_trait]
impl CallHandler for RtpEngineHandler {
    async fn handle(&self, request: SipRequest, sink: ResponseSink) -> Outcome {
        let call_id = request.call_id().unwrap_or_default();
        let from_tag = request.from_tag().unwrap_or_default();
        let content_type = request.content_type();

        let sdp = match multipart::find_part(request.body(), &content_type, "application/sdp") {
            Some(part) => String::from_utf8_lossy(&part.content).into_owned(),
            None => {
                info!(call_id = %call_id, "SIPREC offer has no SDP part");
                return match sink.send_response(ResponseBuilder::not_acceptable_here()).await {
                    Ok(()) => Ok(()),
                    Err(e) => Err(sink_fault(e)),
                };
            }
        };
        if let Some(metadata) =
            multipart::find_part(request.body(), &content_type, "application/rs-metadata")
        {
            debug!(call_id = %call_id, bytes = metadata.content.len(), "Recording metadata received");
        }

        let answer = self
            .client
            .offer(&call_id, &from_tag, &sdp)
            .await
            .context("rtpengine offer")?;

        let response = ResponseBuilder::ok().body(answer.into_bytes(), "application/sdp");
        if let Err(e) = sink.send_response(response).await {
            // The caller went away while rtpengine was allocating; release it
            if let Err(delete_err) = self.client.delete(&call_id, Some(&from_tag)).await {
                warn!(call_id = %call_id, error = %delete_err, "Failed to release rtpengine session");
            }
            return Err(sink_fault(e));
        }

        info!(call_id = %call_id, "Recording session established on rtpengine");
        Ok(())
    }

    async fn terminate(&self, request: &SipRequest) -> anyhow::Result<()> {
        let call_id = request.call_id().unwrap_or_default();
        // Either party may hang up; drop the whole call
        self.client
            .delete(&call_id, None)
            .await
            .context("rtpengine delete")?;
        info!(call_id = %call_id, "Recording session released on rtpengine");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "rtpengine"
    }
}

/// A failed final response means the transaction is no longer ours
pub(crate) fn sink_fault(err: SinkError) -> ClassifiedFault {
    match err {
        SinkError::AlreadyFinalized(status) => {
            ClassifiedFault::protocol(status.max(400), "transaction already finalized")
        }
        SinkError::TransactionClosed => ClassifiedFault::protocol(487, "Request Terminated"),
        SinkError::Build(reason) => ClassifiedFault::internal(reason),
    }
}
