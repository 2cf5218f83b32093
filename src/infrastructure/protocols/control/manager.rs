//! Transport manager: establishes and supervises the control plane
//!
//! Connect mode dials the signaling element, authenticates and serves the
//! connection, retrying forever on failure. Listen mode binds once (a bind
//! failure is fatal) and serves every connection the signaling element
//! opens towards us.

use super::connection::Connection;
use super::frame::Frame;
use crate::application::Dispatcher;
use crate::config::{ControlPlaneConfig, TransportConfig};
use crate::domain::{ConnectionState, TransportError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

pub struct TransportManager {
    config: ControlPlaneConfig,
    dispatcher: Arc<Dispatcher>,
    state: watch::Sender<ConnectionState>,
}

impl TransportManager {
    pub fn new(config: ControlPlaneConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            config,
            dispatcher,
            state,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn transition(&self, next: ConnectionState, endpoint: &str) {
        let previous = self.state.send_replace(next);
        if next == ConnectionState::Failed {
            warn!(endpoint, from = %previous, to = %next, "Control plane state changed");
        } else {
            info!(endpoint, from = %previous, to = %next, "Control plane state changed");
        }
    }

    /// Run the configured mode. Only returns on a fatal listen-mode error.
    pub async fn run(self: Arc<Self>) -> Result<(), TransportError> {
        match self.config.transport.clone() {
            TransportConfig::Connect { host, port, secret } => {
                info!(host = %host, port, "attempting inbound connection");
                self.connect_loop(&host, port, &secret).await;
                Ok(())
            }
            TransportConfig::Listen { bind, .. } => {
                info!(address = %bind, "listening for outbound connections");
                let listener = self.bind(bind).await?;
                self.accept_loop(listener).await
            }
        }
    }

    async fn connect_loop(&self, host: &str, port: u16, secret: &str) {
        let endpoint = format!("{}:{}", host, port);
        loop {
            self.transition(ConnectionState::Connecting, &endpoint);
            match self.connect_once(host, port, secret).await {
                Ok(()) => warn!(endpoint = %endpoint, "Connection to signaling element closed"),
                Err(e) => error!(
                    endpoint = %endpoint,
                    error = %e,
                    "Error connecting to signaling element: {}",
                    e
                ),
            }
            self.transition(ConnectionState::Failed, &endpoint);
            sleep(self.config.reconnect_interval).await;
        }
    }

    /// One connect / authenticate / serve cycle
    pub async fn connect_once(&self, host: &str, port: u16, secret: &str) -> Result<(), TransportError> {
        let endpoint = format!("{}:{}", host, port);
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| TransportError::Connect {
                endpoint: endpoint.clone(),
                source,
            })?;
        let mut connection = Connection::new(stream)?;

        connection.write_frame(&Frame::Auth(secret.to_string())).await?;
        match timeout(self.config.auth_timeout, connection.read_frame()).await {
            Err(_) => return Err(TransportError::HandshakeTimeout(endpoint)),
            Ok(Ok(Some(Frame::AuthOk))) => {}
            Ok(Ok(Some(Frame::AuthFail(reason)))) => {
                return Err(TransportError::AuthRejected { endpoint, reason })
            }
            Ok(Ok(Some(other))) => {
                return Err(TransportError::Framing(format!(
                    "unexpected {} frame during handshake",
                    other.kind()
                )))
            }
            Ok(Ok(None)) => return Err(TransportError::Closed(endpoint)),
            Ok(Err(e)) => return Err(e),
        }

        self.transition(ConnectionState::Connected, &endpoint);
        info!(
            local = %connection.local_addr(),
            remote = %connection.peer_addr(),
            "inbound connection to signaling element established"
        );

        connection.serve(self.dispatcher.clone()).await
    }

    /// Bind the listen socket; failure here is fatal for the process
    pub async fn bind(&self, address: SocketAddr) -> Result<TcpListener, TransportError> {
        let endpoint = address.to_string();
        match TcpListener::bind(address).await {
            Ok(listener) => {
                let local = listener.local_addr()?;
                self.transition(ConnectionState::Listening, &local.to_string());
                Ok(listener)
            }
            Err(source) => {
                self.transition(ConnectionState::Failed, &endpoint);
                Err(TransportError::Bind { endpoint, source })
            }
        }
    }

    pub async fn accept_loop(self: Arc<Self>, listener: TcpListener) -> Result<(), TransportError> {
        loop {
            match listener.accept().await {
                Ok((stream, source)) => {
                    info!("Accepted control-plane connection from {}", source);
                    let manager = self.clone();
                    let policy = self.dispatcher.policy().clone();
                    policy.spawn_guarded("control-connection", async move {
                        if let Err(e) = manager.serve_inbound(stream).await {
                            warn!("Control-plane connection from {} ended: {}", source, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept control-plane connection: {}", e);
                    sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn serve_inbound(&self, stream: TcpStream) -> Result<(), TransportError> {
        let mut connection = Connection::new(stream)?;
        let peer = connection.peer_addr().to_string();

        if let TransportConfig::Listen {
            secret: Some(secret),
            ..
        } = &self.config.transport
        {
            match timeout(self.config.auth_timeout, connection.read_frame()).await {
                Err(_) => return Err(TransportError::HandshakeTimeout(peer)),
                Ok(Ok(Some(Frame::Auth(presented)))) if presented == *secret => {
                    connection.write_frame(&Frame::AuthOk).await?;
                }
                Ok(Ok(Some(_))) => {
                    connection
                        .write_frame(&Frame::AuthFail("authentication failed".to_string()))
                        .await?;
                    return Err(TransportError::AuthRejected {
                        endpoint: peer,
                        reason: "invalid credentials".to_string(),
                    });
                }
                Ok(Ok(None)) => return Err(TransportError::Closed(peer)),
                Ok(Err(e)) => return Err(e),
            }
        }

        info!(remote = %peer, "Signaling element connected");
        connection.serve(self.dispatcher.clone()).await
    }
}
