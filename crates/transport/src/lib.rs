//! simrelay Transport - Channel capability and UDP client
//!
//! This crate provides:
//! - `SmartCardChannel`: The capability set shared by hardware drivers and remote stubs
//! - `ChannelError`: Failures surfaced by any channel implementation
//! - `RemoteChannel`: A `SmartCardChannel` that delegates every call to a simrelay daemon over UDP

mod channel;
mod remote;

pub use channel::*;
pub use remote::*;
