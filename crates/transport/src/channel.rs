//! Smart-card channel capability

use async_trait::async_trait;
use simrelay_protocol::CodecError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Channel not connected")]
    NotConnected,

    #[error("{0}")]
    Remote(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Malformed response: {0}")]
    MalformedResponse(&'static str),
}

/// Access to an eUICC through some transport
///
/// Implemented by hardware drivers (QMI, QRTR, MBIM, AT) living outside
/// this workspace and by `RemoteChannel`. Calls are never issued
/// concurrently on one instance.
#[async_trait]
pub trait SmartCardChannel: Send {
    /// Bind the underlying transport
    async fn connect(&mut self) -> Result<(), ChannelError>;

    /// Release the underlying transport
    async fn disconnect(&mut self) -> Result<(), ChannelError>;

    /// Open a logical channel to the application `aid`, returning its index
    async fn open_logical_channel(&mut self, aid: &[u8]) -> Result<u8, ChannelError>;

    async fn close_logical_channel(&mut self, channel: u8) -> Result<(), ChannelError>;

    /// Send a raw command APDU, returning the card's response bytes
    async fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, ChannelError>;
}
