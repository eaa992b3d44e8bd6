//! Protocol skew and malformed input handling
//!
//! The daemon drops undecodable datagrams, stops on commands it should
//! never receive, and honors remote exit only when configured.


use integration_harness::TestDaemon;
use simrelay_daemon::ServeError;
use simrelay_daemon::config::{ChannelConfig, ServerConfig};
use simrelay_protocol::{Command, CommandKind, encode};
use simrelay_transport::SmartCardChannel;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

async fn send_raw(daemon: &TestDaemon, bytes: &[u8]) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(bytes, daemon.addr).await.unwrap();
}

/// Test: garbage is dropped and the daemon keeps serving
#[tokio::test]
async fn test_malformed_datagram_dropped() {
    let daemon = TestDaemon::spawn(ChannelConfig::default()).await;

    send_raw(&daemon, b"not a command").await;
    send_raw(&daemon, &[0u8; 600]).await;

    let mut client = daemon.client();
    client.connect().await.expect("daemon should still serve");
    assert!(!daemon.task.is_finished());

    daemon.task.abort();
}

/// Test: fail-closed decode policy stops the loop
#[tokio::test]
async fn test_malformed_datagram_fatal_when_configured() {
    let daemon = TestDaemon::spawn_with(
        ServerConfig {
            exit_on_decode_error: true,
            ..Default::default()
        },
        ChannelConfig::default(),
    )
    .await;

    send_raw(&daemon, b"not a command").await;

    let result = timeout(Duration::from_secs(5), daemon.task).await.unwrap().unwrap();
    assert!(matches!(result, Err(ServeError::Decode { .. })));
}

/// Test: a response sent to the daemon means protocol skew and stops the loop
#[tokio::test]
async fn test_unknown_command_terminates_and_disconnects() {
    let daemon = TestDaemon::spawn(ChannelConfig::default()).await;

    let mut client = daemon.client();
    client.connect().await.unwrap();

    send_raw(&daemon, &encode(&Command::ok(vec![])).unwrap()).await;

    let result = timeout(Duration::from_secs(5), daemon.task).await.unwrap().unwrap();
    assert!(matches!(
        result,
        Err(ServeError::UnknownCommand(CommandKind::Response))
    ));
    assert_eq!(daemon.driver.state().calls, vec!["connect", "disconnect"]);
}

/// Test: remote exit stops the daemon when allowed
#[tokio::test]
async fn test_remote_exit() {
    let daemon = TestDaemon::spawn_with(
        ServerConfig {
            allow_remote_exit: true,
            ..Default::default()
        },
        ChannelConfig::default(),
    )
    .await;

    let mut client = daemon.client();
    client.connect().await.unwrap();
    client.request_exit().await.unwrap();

    let result = timeout(Duration::from_secs(5), daemon.task).await.unwrap().unwrap();
    assert!(result.is_ok());

    // Channel released on the way out
    assert_eq!(daemon.driver.state().calls, vec!["connect", "disconnect"]);
}

/// Test: remote exit is refused by default
#[tokio::test]
async fn test_remote_exit_refused_by_default() {
    let daemon = TestDaemon::spawn(ChannelConfig::default()).await;

    let client = daemon.client();
    client.request_exit().await.unwrap();

    // Still answering
    let mut other = daemon.client();
    other.connect().await.unwrap();
    assert!(!daemon.task.is_finished());

    daemon.task.abort();
}
