//! In-memory driver for tests

use crate::driver::{DriverContext, DriverFactory};
use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use simrelay_protocol::ConnectParams;
use simrelay_transport::{ChannelError, SmartCardChannel};
use std::sync::Arc;

/// Observable state shared by a `MockDriver` and every channel it creates
#[derive(Debug, Default)]
pub struct MockState {
    /// Channels instantiated so far
    pub created: usize,
    pub last_params: Option<ConnectParams>,
    pub last_mss: Option<usize>,

    /// Driver operations in call order
    pub calls: Vec<String>,
    pub transmitted: Vec<Vec<u8>>,

    pub fail_connect: Option<String>,
    pub fail_disconnect: Option<String>,
    pub fail_transmit: Option<String>,
    pub fail_open: Option<String>,

    /// Index returned by the next `open_logical_channel`
    pub next_channel: u8,

    /// Bytes returned by `transmit`
    pub response: Vec<u8>,
}

#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        let driver = Self::default();
        driver.state().next_channel = 1;
        driver
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock()
    }
}

impl DriverFactory for MockDriver {
    fn create(
        &self,
        params: &ConnectParams,
        ctx: &DriverContext,
    ) -> Result<Box<dyn SmartCardChannel>, ChannelError> {
        let mut state = self.state();
        state.created += 1;
        state.last_params = Some(params.clone());
        state.last_mss = Some(ctx.mss);

        Ok(Box::new(MockChannel {
            state: self.state.clone(),
        }))
    }
}

struct MockChannel {
    state: Arc<Mutex<MockState>>,
}

fn outcome(failure: &Option<String>) -> Result<(), ChannelError> {
    match failure {
        Some(msg) => Err(ChannelError::Driver(msg.clone())),
        None => Ok(()),
    }
}

#[async_trait]
impl SmartCardChannel for MockChannel {
    async fn connect(&mut self) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        state.calls.push("connect".into());
        outcome(&state.fail_connect)
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        state.calls.push("disconnect".into());
        outcome(&state.fail_disconnect)
    }

    async fn open_logical_channel(&mut self, aid: &[u8]) -> Result<u8, ChannelError> {
        let mut state = self.state.lock();
        state.calls.push(format!("open:{}", hex::encode(aid)));
        outcome(&state.fail_open)?;
        Ok(state.next_channel)
    }

    async fn close_logical_channel(&mut self, channel: u8) -> Result<(), ChannelError> {
        self.state.lock().calls.push(format!("close:{channel}"));
        Ok(())
    }

    async fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let mut state = self.state.lock();
        state.calls.push("transmit".into());
        state.transmitted.push(command.to_vec());
        outcome(&state.fail_transmit)?;
        Ok(state.response.clone())
    }
}
