//! Command - The message carried in every datagram

use rkyv::{Archive, Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A single protocol message
///
/// Requests travel client → daemon; the daemon always answers with
/// `Command::Response`. Each variant carries only the fields it needs,
/// so a `Transmit` can never carry connection parameters.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[rkyv(derive(Debug))]
pub enum Command {
    /// Bind the daemon to a physical transport and SIM slot
    Connect(ConnectParams),

    /// Release the hardware channel
    Disconnect,

    /// Open a logical channel towards the application selected by `aid`
    OpenLogicalChannel { aid: Vec<u8> },

    /// Close a previously opened logical channel
    CloseLogicalChannel { channel: u8 },

    /// Header-prefixed APDU, unwrapped by `extract_apdu` on the daemon
    Transmit { body: Vec<u8> },

    /// Answer to any request
    Response(Reply),

    /// Ask the daemon to stop serving
    Exit,
}

/// Flat view of a command's tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Connect,
    Disconnect,
    OpenLogicalChannel,
    CloseLogicalChannel,
    Transmit,
    Response,
    Exit,
}

impl CommandKind {
    /// Stable lowercase name, used for logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Connect => "connect",
            CommandKind::Disconnect => "disconnect",
            CommandKind::OpenLogicalChannel => "openlogicalchannel",
            CommandKind::CloseLogicalChannel => "closelogicalchannel",
            CommandKind::Transmit => "transmit",
            CommandKind::Response => "response",
            CommandKind::Exit => "exit",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Command {
    /// Build a successful response
    pub fn ok(body: Vec<u8>) -> Self {
        Command::Response(Reply::ok(body))
    }

    /// Build a failed response
    pub fn failure(body: Vec<u8>, error: impl Into<String>) -> Self {
        Command::Response(Reply::failure(body, error))
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Connect(_) => CommandKind::Connect,
            Command::Disconnect => CommandKind::Disconnect,
            Command::OpenLogicalChannel { .. } => CommandKind::OpenLogicalChannel,
            Command::CloseLogicalChannel { .. } => CommandKind::CloseLogicalChannel,
            Command::Transmit { .. } => CommandKind::Transmit,
            Command::Response(_) => CommandKind::Response,
            Command::Exit => CommandKind::Exit,
        }
    }

    /// Byte payload as seen on the wire (channel index for close)
    pub fn body(&self) -> &[u8] {
        match self {
            Command::OpenLogicalChannel { aid } => aid,
            Command::CloseLogicalChannel { channel } => std::slice::from_ref(channel),
            Command::Transmit { body } => body,
            Command::Response(reply) => &reply.body,
            Command::Connect(_) | Command::Disconnect | Command::Exit => &[],
        }
    }
}

/// Result of a request
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[rkyv(derive(Debug))]
pub struct Reply {
    /// Payload; shape depends on the request that produced it
    pub body: Vec<u8>,

    /// Error description; absent or empty means success
    pub error: Option<String>,
}

impl Reply {
    pub fn ok(body: Vec<u8>) -> Self {
        Self { body, error: None }
    }

    pub fn failure(body: Vec<u8>, error: impl Into<String>) -> Self {
        Self {
            body,
            error: Some(error.into()),
        }
    }

    /// True unless a non-empty error is present
    pub fn is_ok(&self) -> bool {
        self.error.as_deref().is_none_or(str::is_empty)
    }

    /// Error text, if the request failed
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

/// Connection parameters, only meaningful on `Connect`
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[rkyv(derive(Debug))]
pub struct ConnectParams {
    /// Device node, if the transport needs one (e.g. /dev/cdc-wdm0)
    pub device: Option<String>,

    /// Physical transport
    pub proto: Proto,

    /// SIM slot holding the eUICC
    pub slot: u8,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            device: None,
            proto: Proto::Qrtr,
            slot: 2,
        }
    }
}

/// Physical transport towards the modem
#[derive(
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
)]
#[rkyv(derive(Debug))]
#[serde(rename_all = "lowercase")]
pub enum Proto {
    At,
    Mbim,
    Qmi,
    Qrtr,
}

impl Proto {
    pub const ALL: [Proto; 4] = [Proto::At, Proto::Mbim, Proto::Qmi, Proto::Qrtr];

    pub fn as_str(&self) -> &'static str {
        match self {
            Proto::At => "at",
            Proto::Mbim => "mbim",
            Proto::Qmi => "qmi",
            Proto::Qrtr => "qrtr",
        }
    }
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown protocol {0:?} (expected one of: at, mbim, qmi, qrtr)")]
pub struct UnknownProto(pub String);

impl FromStr for Proto {
    type Err = UnknownProto;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Proto::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownProto(s.to_string()))
    }
}
