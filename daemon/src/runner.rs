//! Daemon entry point for embedders

use crate::config::DaemonConfig;
use crate::driver::DriverRegistry;
use crate::handler::Handler;
use crate::metrics;
use crate::session::Session;
use anyhow::Result;
use std::future::Future;
use tracing::{info, warn};

/// Serve `config` with the given drivers until `shutdown` resolves or the loop fails
pub async fn run(
    config: &DaemonConfig,
    registry: DriverRegistry,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    if registry.is_empty() {
        warn!("No hardware drivers registered; every connect will be refused");
    } else {
        info!("Drivers available: {:?}", registry.protocols());
    }

    let metrics_handle = metrics::start_server(&config.monitoring);

    let session = Session::new(Box::new(registry), config.channel.clone());
    let result = match Handler::bind(&config.server, session).await {
        Ok(handler) => handler.run_until(shutdown).await.map_err(Into::into),
        Err(e) => Err(e.into()),
    };

    metrics_handle.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverFactory;
    use crate::testing::MockDriver;
    use simrelay_protocol::{ConnectParams, Proto};
    use simrelay_transport::{RemoteChannel, RemoteChannelConfig, SmartCardChannel};
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_with_registered_driver() {
        let mock = MockDriver::new();
        let factory = mock.clone();
        let mut registry = DriverRegistry::new();
        registry.register(Proto::Qrtr, move |params, ctx| factory.create(params, ctx));

        // Reserve a free port, then hand it to the daemon
        let port = std::net::UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut config = DaemonConfig::default();
        config.server.bind = ([127, 0, 0, 1], port).into();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let daemon = tokio::spawn(async move {
            run(&config, registry, async {
                rx.await.ok();
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let connect = ConnectParams {
            device: None,
            proto: Proto::Qrtr,
            slot: 2,
        };
        let mut client = RemoteChannel::new(
            RemoteChannelConfig::new(([127, 0, 0, 1], port).into(), connect)
                .with_timeout(Duration::from_secs(5)),
        );
        client.connect().await.unwrap();

        tx.send(()).unwrap();
        daemon.await.unwrap().unwrap();

        // Shutdown released the open channel
        assert_eq!(mock.state().calls, vec!["connect", "disconnect"]);
    }

    #[tokio::test]
    async fn test_run_with_empty_registry_refuses_connect() {
        let port = std::net::UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut config = DaemonConfig::default();
        config.server.bind = ([127, 0, 0, 1], port).into();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let daemon = tokio::spawn(async move {
            run(&config, DriverRegistry::new(), async {
                rx.await.ok();
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut client = RemoteChannel::new(
            RemoteChannelConfig::new(([127, 0, 0, 1], port).into(), ConnectParams::default())
                .with_timeout(Duration::from_secs(5)),
        );
        let err = client.connect().await.unwrap_err();
        assert!(err.to_string().contains("no driver registered"));

        tx.send(()).unwrap();
        daemon.await.unwrap().unwrap();
    }
}
