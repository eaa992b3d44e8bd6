//! simrelay Control CLI
//!
//! Command-line interface for exercising a simrelay daemon.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use simrelay_protocol::{ConnectParams, Proto};
use simrelay_transport::{RemoteChannel, RemoteChannelConfig, SmartCardChannel};
use std::time::Duration;
use tracing::{Level, debug};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "simrelay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Daemon address
    #[arg(long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Transport the daemon should use: qmi, qrtr, mbim, at
    #[arg(long, default_value = "qrtr")]
    proto: Proto,

    /// SIM slot where the eSIM is installed
    #[arg(long, default_value_t = 2)]
    slot: u8,

    /// Device node, if the transport requires one
    #[arg(long)]
    device: Option<String>,

    /// Give up on a reply after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Run in verbose mode
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect and disconnect, checking the daemon can reach the card
    Probe,
    /// Send one framed APDU and print the response
    Transmit {
        /// Transmit body, hex encoded
        apdu: String,
        /// Open a logical channel to this AID (hex) around the exchange
        #[arg(long)]
        aid: Option<String>,
    },
    /// Ask the daemon to stop serving
    Exit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let params = ConnectParams {
        device: args.device.clone(),
        proto: args.proto,
        slot: args.slot,
    };
    let resolved = RemoteChannel::resolve(&args.server, params)
        .await
        .with_context(|| format!("resolving {}", args.server))?;

    let mut config: RemoteChannelConfig = resolved.config().clone();
    if let Some(ms) = args.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }
    let mut channel = RemoteChannel::new(config);

    match args.command {
        Commands::Probe => {
            channel.connect().await.context("connect")?;
            channel.disconnect().await.context("disconnect")?;
            println!("Channel OK");
        }
        Commands::Transmit { apdu, aid } => {
            let body = hex::decode(apdu.trim()).context("APDU is not valid hex")?;
            let aid = aid
                .map(|a| hex::decode(a.trim()))
                .transpose()
                .context("AID is not valid hex")?;

            channel.connect().await.context("connect")?;
            let result = exchange(&mut channel, &body, aid.as_deref()).await;
            let disconnected = channel.disconnect().await;

            let response = result?;
            disconnected.context("disconnect")?;
            println!("{}", hex::encode_upper(response));
        }
        Commands::Exit => {
            channel.request_exit().await?;
            println!("Exit requested");
        }
    }

    Ok(())
}

async fn exchange(channel: &mut RemoteChannel, body: &[u8], aid: Option<&[u8]>) -> Result<Vec<u8>> {
    let Some(aid) = aid else {
        return Ok(channel.transmit(body).await.context("transmit")?);
    };

    let index = channel
        .open_logical_channel(aid)
        .await
        .context("open logical channel")?;
    debug!("Logical channel {} open", index);

    let result = channel.transmit(body).await.context("transmit");
    channel
        .close_logical_channel(index)
        .await
        .context("close logical channel")?;
    result
}
