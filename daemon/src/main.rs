//! simrelay Daemon
//!
//! Binds a UDP socket and relays smart-card commands to the local modem.

use anyhow::Result;
use clap::Parser;
use simrelay_daemon::{DaemonConfig, DriverRegistry};
use simrelay_protocol::Proto;
use std::net::{IpAddr, SocketAddr};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// simrelay Daemon - eUICC channel relay over UDP
#[derive(Parser, Debug)]
#[command(name = "simrelayd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Run in verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Binding address
    #[arg(long)]
    bind_addr: Option<IpAddr>,

    /// Binding port
    #[arg(long)]
    bind_port: Option<u16>,

    /// Force the transport: qmi, qrtr, mbim, at
    #[arg(long)]
    proto: Option<Proto>,

    /// Force the SIM slot where the eSIM is installed
    #[arg(long)]
    slot: Option<u8>,

    /// Force the device node, if the transport requires one
    #[arg(long)]
    device: Option<String>,

    /// Maximum segment size handed to drivers
    #[arg(long)]
    mss: Option<usize>,
}

impl Args {
    fn apply(&self, config: &mut DaemonConfig) {
        let bind = config.server.bind;
        config.server.bind = SocketAddr::new(
            self.bind_addr.unwrap_or(bind.ip()),
            self.bind_port.unwrap_or(bind.port()),
        );
        if self.proto.is_some() {
            config.channel.proto = self.proto;
        }
        if self.slot.is_some() {
            config.channel.slot = self.slot;
        }
        if self.device.is_some() {
            config.channel.device = self.device.clone();
        }
        if let Some(mss) = self.mss {
            config.channel.mss = mss;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("simrelay Daemon v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &args.config {
        Some(path) => {
            let config = DaemonConfig::load(path).await?;
            info!("Loaded configuration from {}", path);
            config
        }
        None => DaemonConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    // Physical drivers are linked in by embedders calling `simrelay_daemon::run`
    simrelay_daemon::run(&config, DriverRegistry::new(), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await?;

    info!("Daemon stopped");
    Ok(())
}
