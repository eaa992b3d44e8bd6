//! Driver registry
//!
//! Physical drivers (QMI, QRTR, MBIM, AT) are provided by the embedding
//! binary. The session only sees them through `DriverFactory`.

use simrelay_protocol::{ConnectParams, Proto};
use simrelay_transport::{ChannelError, SmartCardChannel};
use std::collections::HashMap;

/// Process-level tuning handed to every driver
#[derive(Debug, Clone, Default)]
pub struct DriverContext {
    /// Maximum segment size (0 = driver default)
    pub mss: usize,
}

/// Instantiates a hardware channel for a `Connect`
pub trait DriverFactory: Send {
    fn create(
        &self,
        params: &ConnectParams,
        ctx: &DriverContext,
    ) -> Result<Box<dyn SmartCardChannel>, ChannelError>;
}

type Constructor = Box<
    dyn Fn(&ConnectParams, &DriverContext) -> Result<Box<dyn SmartCardChannel>, ChannelError>
        + Send
        + Sync,
>;

/// Per-protocol driver constructors
#[derive(Default)]
pub struct DriverRegistry {
    drivers: HashMap<Proto, Constructor>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor used for `proto`, replacing any previous one
    pub fn register<F>(&mut self, proto: Proto, constructor: F) -> &mut Self
    where
        F: Fn(&ConnectParams, &DriverContext) -> Result<Box<dyn SmartCardChannel>, ChannelError>
            + Send
            + Sync
            + 'static,
    {
        self.drivers.insert(proto, Box::new(constructor));
        self
    }

    /// Registered protocols, in `Proto::ALL` order
    pub fn protocols(&self) -> Vec<Proto> {
        Proto::ALL
            .into_iter()
            .filter(|p| self.drivers.contains_key(p))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl DriverFactory for DriverRegistry {
    fn create(
        &self,
        params: &ConnectParams,
        ctx: &DriverContext,
    ) -> Result<Box<dyn SmartCardChannel>, ChannelError> {
        let constructor = self.drivers.get(&params.proto).ok_or_else(|| {
            ChannelError::Unsupported(format!("no driver registered for protocol {}", params.proto))
        })?;
        constructor(params, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDriver;

    fn params(proto: Proto) -> ConnectParams {
        ConnectParams {
            device: None,
            proto,
            slot: 1,
        }
    }

    #[test]
    fn test_unregistered_protocol() {
        let registry = DriverRegistry::new();
        let result = registry.create(&params(Proto::Qrtr), &DriverContext::default());

        match result {
            Err(ChannelError::Unsupported(msg)) => assert!(msg.contains("qrtr")),
            _ => panic!("expected Unsupported"),
        }
    }

    #[test]
    fn test_registered_protocol() {
        let mock = MockDriver::new();
        let factory = mock.clone();

        let mut registry = DriverRegistry::new();
        registry.register(Proto::Mbim, move |params, ctx| factory.create(params, ctx));

        assert_eq!(registry.protocols(), vec![Proto::Mbim]);
        assert!(registry
            .create(&params(Proto::Mbim), &DriverContext { mss: 120 })
            .is_ok());
        assert!(registry
            .create(&params(Proto::At), &DriverContext::default())
            .is_err());

        let state = mock.state();
        assert_eq!(state.created, 1);
        assert_eq!(state.last_mss, Some(120));
    }
}
