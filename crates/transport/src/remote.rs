//! UDP client stub for a simrelay daemon
//!
//! Each capability call is one request datagram and one reply datagram.

use crate::channel::{ChannelError, SmartCardChannel};
use async_trait::async_trait;
use simrelay_protocol::{Command, ConnectParams, DatagramCodec, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{UdpSocket, lookup_host};
use tracing::{debug, trace, warn};

/// Configuration for a remote channel
#[derive(Debug, Clone)]
pub struct RemoteChannelConfig {
    /// Daemon address
    pub server: SocketAddr,

    /// Parameters sent with `Connect`
    pub connect: ConnectParams,

    /// Reply deadline; `None` waits forever
    pub timeout: Option<Duration>,

    /// Largest datagram either side may send
    pub max_datagram: usize,
}

impl RemoteChannelConfig {
    pub fn new(server: SocketAddr, connect: ConnectParams) -> Self {
        Self {
            server,
            connect,
            timeout: None,
            max_datagram: MAX_DATAGRAM_SIZE,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// `SmartCardChannel` served by a remote daemon
pub struct RemoteChannel {
    config: RemoteChannelConfig,
    codec: DatagramCodec,
    socket: Option<UdpSocket>,
}

impl RemoteChannel {
    pub fn new(config: RemoteChannelConfig) -> Self {
        let codec = DatagramCodec::new(config.max_datagram);
        Self {
            config,
            codec,
            socket: None,
        }
    }

    /// Resolve `host:port` and build a channel with default settings
    pub async fn resolve(server: &str, connect: ConnectParams) -> Result<Self, ChannelError> {
        let addr = lookup_host(server).await?.next().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no address for {server}"),
            )
        })?;
        Ok(Self::new(RemoteChannelConfig::new(addr, connect)))
    }

    pub fn config(&self) -> &RemoteChannelConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Ask the daemon to stop serving
    ///
    /// Uses a throwaway socket and does not wait: the daemon either exits
    /// silently or answers with an error nobody reads.
    pub async fn request_exit(&self) -> Result<(), ChannelError> {
        let socket = bind_to(self.config.server).await?;
        let bytes = self.codec.encode(&Command::Exit)?;
        socket.send(&bytes).await?;
        debug!("Sent exit request to {}", self.config.server);
        Ok(())
    }

    async fn exchange(&mut self, command: Command) -> Result<Vec<u8>, ChannelError> {
        let socket = self.socket.as_ref().ok_or(ChannelError::NotConnected)?;
        let kind = command.kind();

        discard_stale(socket);

        let bytes = self.codec.encode(&command)?;
        socket.send(&bytes).await?;
        trace!("Sent {} ({} bytes) to {}", kind, bytes.len(), self.config.server);

        let mut buf = vec![0u8; self.codec.max_datagram()];
        let n = match self.config.timeout {
            Some(timeout) => tokio::time::timeout(timeout, socket.recv(&mut buf))
                .await
                .map_err(|_| ChannelError::Timeout(timeout))??,
            None => socket.recv(&mut buf).await?,
        };

        match self.codec.decode(&buf[..n])? {
            Command::Response(reply) => {
                if let Some(error) = reply.error() {
                    debug!("{} failed remotely: {}", kind, error);
                    return Err(ChannelError::Remote(error.to_string()));
                }
                Ok(reply.body)
            }
            other => {
                warn!("Expected a response to {}, got {}", kind, other.kind());
                Err(ChannelError::MalformedResponse("reply is not a response command"))
            }
        }
    }
}

#[async_trait]
impl SmartCardChannel for RemoteChannel {
    async fn connect(&mut self) -> Result<(), ChannelError> {
        self.socket = Some(bind_to(self.config.server).await?);

        let params = self.config.connect.clone();
        debug!(
            "Connecting to {} (proto {}, slot {})",
            self.config.server, params.proto, params.slot
        );

        if let Err(e) = self.exchange(Command::Connect(params)).await {
            self.socket = None;
            return Err(e);
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        if self.socket.is_none() {
            return Ok(());
        }
        let result = self.exchange(Command::Disconnect).await.map(|_| ());
        self.socket = None;
        result
    }

    async fn open_logical_channel(&mut self, aid: &[u8]) -> Result<u8, ChannelError> {
        let body = self
            .exchange(Command::OpenLogicalChannel { aid: aid.to_vec() })
            .await?;
        body.first()
            .copied()
            .ok_or(ChannelError::MalformedResponse("missing logical channel index"))
    }

    async fn close_logical_channel(&mut self, channel: u8) -> Result<(), ChannelError> {
        self.exchange(Command::CloseLogicalChannel { channel })
            .await
            .map(|_| ())
    }

    async fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, ChannelError> {
        self.exchange(Command::Transmit {
            body: command.to_vec(),
        })
        .await
    }
}

/// Ephemeral socket of the server's address family, connected to it
async fn bind_to(server: SocketAddr) -> std::io::Result<UdpSocket> {
    let local = if server.is_ipv4() {
        "0.0.0.0:0"
    } else {
        "[::]:0"
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(server).await?;
    Ok(socket)
}

/// Drop replies that arrived after an earlier request timed out
fn discard_stale(socket: &UdpSocket) {
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    while let Ok(n) = socket.try_recv(&mut buf) {
        warn!("Discarding stale {} byte reply", n);
    }
}
