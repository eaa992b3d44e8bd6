//! Channel session state machine
//!
//! A daemon holds at most one hardware channel. The session owns it and
//! turns each request into exactly one reply; nothing else touches the
//! channel, so the serving loop can pass the session by `&mut`.

use crate::config::ChannelConfig;
use crate::driver::{DriverContext, DriverFactory};
use simrelay_protocol::{
    Command, CommandKind, ConnectParams, FramingError, Reply, SW_FAILURE, extract_apdu,
};
use simrelay_transport::{ChannelError, SmartCardChannel};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("channel already open")]
    AlreadyOpen,

    #[error("no channel open")]
    NoChannel,

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Driver(#[from] ChannelError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Open,
}

/// What the serving loop should do after a dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Send this reply to the requester
    Reply(Reply),

    /// The client asked the daemon to stop
    Exit,

    /// Not a request; the peers disagree on the protocol
    Unknown(CommandKind),
}

pub struct Session {
    factory: Box<dyn DriverFactory>,
    context: DriverContext,
    config: ChannelConfig,
    channel: Option<Box<dyn SmartCardChannel>>,
}

impl Session {
    pub fn new(factory: Box<dyn DriverFactory>, config: ChannelConfig) -> Self {
        let context = DriverContext { mss: config.mss };
        Self {
            factory,
            context,
            config,
            channel: None,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.channel.is_some() {
            SessionState::Open
        } else {
            SessionState::Idle
        }
    }

    /// Handle one request
    pub async fn dispatch(&mut self, command: Command) -> Dispatch {
        let reply = match command {
            Command::Connect(params) => into_reply(self.connect(params).await.map(|_| Vec::new())),
            Command::Disconnect => into_reply(self.disconnect().await.map(|_| Vec::new())),
            Command::OpenLogicalChannel { aid } => {
                into_reply(self.open_logical_channel(&aid).await.map(|c| vec![c]))
            }
            Command::CloseLogicalChannel { channel } => {
                into_reply(self.close_logical_channel(channel).await.map(|_| Vec::new()))
            }
            Command::Transmit { body } => self.transmit(&body).await,
            Command::Exit => return Dispatch::Exit,
            other @ Command::Response(_) => return Dispatch::Unknown(other.kind()),
        };
        Dispatch::Reply(reply)
    }

    /// Disconnect the channel, if any, before the process goes away
    pub async fn shutdown(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            info!("Disconnecting open channel on shutdown");
            if let Err(e) = channel.disconnect().await {
                warn!("Disconnect on shutdown failed: {}", e);
            }
        }
    }

    async fn connect(&mut self, params: ConnectParams) -> Result<(), SessionError> {
        if self.channel.is_some() {
            return Err(SessionError::AlreadyOpen);
        }

        let params = self.config.resolve(params);
        info!(
            "Connecting {} channel on slot {}{}",
            params.proto,
            params.slot,
            params
                .device
                .as_deref()
                .map(|d| format!(" ({d})"))
                .unwrap_or_default()
        );

        let mut channel = self.factory.create(&params, &self.context)?;
        channel.connect().await?;
        self.channel = Some(channel);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        // Idle afterwards whatever the driver says
        let mut channel = self.channel.take().ok_or(SessionError::NoChannel)?;
        channel.disconnect().await?;
        info!("Channel disconnected");
        Ok(())
    }

    async fn open_logical_channel(&mut self, aid: &[u8]) -> Result<u8, SessionError> {
        let channel = self.channel.as_mut().ok_or(SessionError::NoChannel)?;
        let index = channel.open_logical_channel(aid).await?;
        debug!("Opened logical channel {} for AID {}", index, hex::encode(aid));
        Ok(index)
    }

    async fn close_logical_channel(&mut self, index: u8) -> Result<(), SessionError> {
        let channel = self.channel.as_mut().ok_or(SessionError::NoChannel)?;
        channel.close_logical_channel(index).await?;
        debug!("Closed logical channel {}", index);
        Ok(())
    }

    async fn transmit(&mut self, body: &[u8]) -> Reply {
        let status_word = self.config.status_word;
        let Some(channel) = self.channel.as_mut() else {
            return Reply::failure(Vec::new(), SessionError::NoChannel.to_string());
        };

        let extracted = match extract_apdu(body) {
            Ok(extracted) => extracted,
            Err(e) => return Reply::failure(Vec::new(), SessionError::from(e).to_string()),
        };
        if let Some(fallback) = extracted.fallback {
            warn!("Transmit framing: {}", fallback);
        }

        match channel.transmit(extracted.apdu).await {
            Ok(response) => {
                debug!("Card returned {}", hex::encode(&response));
                Reply::ok(status_word.apply(response))
            }
            Err(e) => {
                warn!("Transmit failed: {}", e);
                Reply::failure(SW_FAILURE.to_vec(), SessionError::from(e).to_string())
            }
        }
    }
}

fn into_reply(result: Result<Vec<u8>, SessionError>) -> Reply {
    match result {
        Ok(body) => Reply::ok(body),
        Err(e) => {
            debug!("Request failed: {}", e);
            Reply::failure(Vec::new(), e.to_string())
        }
    }
}
