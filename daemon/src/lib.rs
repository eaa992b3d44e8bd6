//! simrelay Daemon
//!
//! Owns the hardware channel and serves it to `RemoteChannel` clients over
//! UDP. Physical drivers are registered by the embedding binary through
//! `DriverRegistry`.

pub mod config;
pub mod driver;
pub mod handler;
pub mod metrics;
pub mod runner;
pub mod session;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

#[cfg(test)]
mod config_tests;

pub use config::DaemonConfig;
pub use driver::{DriverContext, DriverFactory, DriverRegistry};
pub use handler::{Handler, ServeError};
pub use runner::run;
pub use session::{Dispatch, Session, SessionError, SessionState};
