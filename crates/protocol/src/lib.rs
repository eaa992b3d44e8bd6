//! simrelay Protocol - Command definitions and datagram codec
//!
//! This crate defines everything that crosses the UDP link between a
//! `RemoteChannel` client and the `simrelayd` daemon:
//! - `Command`: The single message type carried in both directions
//! - `DatagramCodec`: One `Command` per datagram, bounded by the receive buffer
//! - `extract_apdu`: Unwraps the header-prefixed body of a `Transmit`
//!
//! All structures use rkyv with bytecheck validation on decode.

mod apdu;
mod codec;
mod command;

pub use apdu::*;
pub use codec::*;
pub use command::*;
