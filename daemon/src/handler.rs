//! UDP serving loop
//!
//! One datagram in, one datagram out, strictly in arrival order. The loop
//! never runs two dispatches at once: the hardware channel has no locking
//! of its own.

use crate::config::ServerConfig;
use crate::metrics::METRICS;
use crate::session::{Dispatch, Session, SessionState};
use simrelay_protocol::{CodecError, Command, CommandKind, DatagramCodec, Reply};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Instant;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, trace, warn};

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Undecodable datagram from {peer}: {source}")]
    Decode {
        peer: SocketAddr,
        source: CodecError,
    },

    #[error("Unknown command {0}: client and daemon disagree on the protocol")]
    UnknownCommand(CommandKind),
}

/// Sent in place of a reply that does not fit the datagram limit
pub const UNDELIVERABLE_REPLY: &str = "reply too large";

/// The fixed error reply for oversized replies; must fit any accepted `max_datagram`
pub fn undeliverable_reply() -> Command {
    Command::failure(Vec::new(), UNDELIVERABLE_REPLY)
}

/// Owns the socket and the session for the lifetime of the daemon
pub struct Handler {
    socket: UdpSocket,
    session: Session,
    codec: DatagramCodec,
    config: ServerConfig,
}

impl Handler {
    pub async fn bind(config: &ServerConfig, session: Session) -> io::Result<Self> {
        let socket = UdpSocket::bind(config.bind).await?;
        info!("Handler listening on {}", socket.local_addr()?);

        Ok(Self {
            socket,
            session,
            codec: DatagramCodec::new(config.max_datagram),
            config: config.clone(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serve until a client sends an allowed `Exit` or a fatal error occurs
    pub async fn run(self) -> Result<(), ServeError> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then disconnect the channel
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> Result<(), ServeError> {
        let result = self.serve(shutdown).await;
        if let Err(e) = &result {
            error!("Serving loop stopped: {}", e);
        }
        self.session.shutdown().await;
        METRICS.channel_open.set(0);
        result
    }

    async fn serve(&mut self, shutdown: impl Future<Output = ()>) -> Result<(), ServeError> {
        tokio::pin!(shutdown);

        // One extra byte so oversized datagrams are detected, not truncated
        let mut buf = vec![0u8; self.codec.max_datagram() + 1];

        loop {
            let (n, peer) = tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(r) => r,
                    Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                        warn!("Peer reset: {}", e);
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                },
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    return Ok(());
                }
            };

            let command = match self.codec.decode(&buf[..n]) {
                Ok(command) => command,
                Err(source) => {
                    METRICS.datagrams_dropped.inc();
                    if self.config.exit_on_decode_error {
                        return Err(ServeError::Decode { peer, source });
                    }
                    warn!("Dropping {} byte datagram from {}: {}", n, peer, source);
                    continue;
                }
            };

            let kind = command.kind();
            METRICS.commands.with_label_values(&[kind.as_str()]).inc();
            debug!("{} from {}", kind, peer);
            trace!("Body: {}", hex::encode(command.body()));

            let started = Instant::now();
            let reply = match self.session.dispatch(command).await {
                Dispatch::Reply(reply) => reply,
                Dispatch::Exit if self.config.allow_remote_exit => {
                    info!("Exit requested by {}", peer);
                    return Ok(());
                }
                Dispatch::Exit => Reply::failure(Vec::new(), "remote exit is disabled"),
                Dispatch::Unknown(kind) => return Err(ServeError::UnknownCommand(kind)),
            };
            METRICS.dispatch_duration.observe(started.elapsed().as_secs_f64());
            METRICS
                .channel_open
                .set((self.session.state() == SessionState::Open) as i64);

            if let Some(error) = reply.error() {
                METRICS.command_errors.inc();
                debug!("{} failed: {}", kind, error);
            }

            let Some(bytes) = self.encode_reply(reply) else {
                error!("No reply deliverable to {} within {} bytes", peer, self.codec.max_datagram());
                continue;
            };
            if let Err(e) = self.socket.send_to(&bytes, peer).await {
                error!("Failed to send reply to {}: {}", peer, e);
            }
        }
    }

    fn encode_reply(&self, reply: Reply) -> Option<Vec<u8>> {
        match self.codec.encode(&Command::Response(reply)) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("Reply not deliverable: {}", e);
                self.codec.encode(&undeliverable_reply()).ok()
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> &Session {
        &self.session
    }
}
