//! usbwatch
//!
//! Lists the USB ports of a Linux host with what is plugged into them and
//! drives the port controls of the hubs: soft reset of a device, hub port
//! reset, disable and power switching. Runs once from the command line or
//! serves the same operations over REST and INDI.

mod config;
mod indi;
mod rest;
mod service;
mod usb;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use common::{PortCommand, UsbBridge, create_usb_bridge, setup_logging};
use config::ServerConfig;
use indi::IndiServer;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use usb::{LinuxUsbHost, spawn_usb_worker};

#[derive(Parser, Debug)]
#[command(name = "usbwatch")]
#[command(author, version, about = "Watch and control the USB ports of this host")]
#[command(long_about = "
Lists every USB port with the device plugged into it, the port status
(Power, Connection, Enable, Reset, Suspend) and the serial ports the device
provides. A location is bus-port.port..., e.g. 1-1.4.

EXAMPLES:
    # List ports
    usbwatch

    # Power cycle a port
    usbwatch --off 1-1.4 && usbwatch --on 1-1.4

    # Serve the listing and the commands over HTTP and INDI
    usbwatch --rest --indi

CONFIGURATION:
    The configuration is read from the first of:
    1. Path specified with --config
    2. ~/.config/usbwatch/server.toml
    3. /etc/usbwatch/server.toml
    4. Built-in defaults
")]
#[command(group(ArgGroup::new("command").args(["reset", "hard", "disable", "on", "off"])))]
struct Args {
    /// Soft reset the device at LOC
    #[arg(long, value_name = "LOC")]
    reset: Option<String>,

    /// Reset the hub port at LOC
    #[arg(long, value_name = "LOC")]
    hard: Option<String>,

    /// Disable the hub port at LOC
    #[arg(long, value_name = "LOC")]
    disable: Option<String>,

    /// Power on the hub port at LOC
    #[arg(long, value_name = "LOC")]
    on: Option<String>,

    /// Power off the hub port at LOC
    #[arg(long, value_name = "LOC")]
    off: Option<String>,

    /// Log progress and print full error chains
    #[arg(short, long)]
    verbose: bool,

    /// Serve the REST front end
    #[arg(long, conflicts_with = "command")]
    rest: bool,

    /// Serve the INDI front end
    #[arg(long, conflicts_with = "command")]
    indi: bool,

    /// Address the servers bind to
    #[arg(long, value_name = "ADDR")]
    host: Option<String>,

    /// REST server port
    #[arg(long, value_name = "PORT")]
    rest_port: Option<u16>,

    /// INDI server port
    #[arg(long, value_name = "PORT")]
    indi_port: Option<u16>,

    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save the default configuration and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

impl Args {
    fn command(&self) -> Option<(PortCommand, &str)> {
        [
            (PortCommand::Reset, &self.reset),
            (PortCommand::Hard, &self.hard),
            (PortCommand::Disable, &self.disable),
            (PortCommand::On, &self.on),
            (PortCommand::Off, &self.off),
        ]
        .into_iter()
        .find_map(|(command, location)| location.as_deref().map(|loc| (command, loc)))
    }

    /// Fold the command line overrides into `config`
    fn apply_to(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.rest.host = host.clone();
            config.indi.host = host.clone();
        }
        if let Some(port) = self.rest_port {
            config.rest.port = port;
        }
        if let Some(port) = self.indi_port {
            config.indi.port = port;
        }
        if let Some(level) = &self.log_level {
            config.server.log_level = level.clone();
        } else if self.verbose {
            config.server.log_level = "info".to_string();
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let config_path = args.config.as_deref().map(config::expand_path);

    if args.save_config {
        let path = config_path.unwrap_or_else(ServerConfig::default_path);
        ServerConfig::default()
            .save(&path)
            .context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = match config_path {
        Some(path) => ServerConfig::load(Some(path)).context("Failed to load configuration")?,
        None => ServerConfig::load_or_default(),
    };
    args.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;

    setup_logging(&config.server.log_level).context("Failed to setup logging")?;
    info!("usbwatch v{}", env!("CARGO_PKG_VERSION"));

    let host = LinuxUsbHost::new(config.usb.control_timeout())?;
    let (usb_bridge, worker) = create_usb_bridge();
    let usb_worker_handle =
        spawn_usb_worker(worker, host).context("Failed to spawn USB worker thread")?;

    let result = if args.rest || args.indi {
        run_servers(&args, &config, usb_bridge.clone())
            .await
            .map(|()| ExitCode::SUCCESS)
    } else {
        Ok(run_once(&args, &usb_bridge).await)
    };

    info!("Shutting down USB subsystem...");
    if let Err(e) = usb_bridge.shutdown().await {
        error!("Error shutting down USB worker: {}", e);
    }
    if let Err(e) = usb_worker_handle.join() {
        error!("USB worker thread panicked: {:?}", e);
    }

    result
}

/// Run the requested command, if any, and print the listing
async fn run_once(args: &Args, usb_bridge: &UsbBridge) -> ExitCode {
    let result = match args.command() {
        Some((command, location)) => {
            info!("{} {}", command, location);
            usb_bridge.execute(command, location.to_string()).await
        }
        None => usb_bridge.list().await,
    };

    match result {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            if args.verbose {
                eprintln!("{:?}", anyhow::Error::new(e));
            } else {
                eprintln!("{}", e);
            }
            ExitCode::FAILURE
        }
    }
}

/// Serve the selected front ends until Ctrl+C
async fn run_servers(args: &Args, config: &ServerConfig, usb_bridge: UsbBridge) -> Result<()> {
    if service::is_systemd() {
        info!("Running under systemd");
    }

    let (stop, stopped) = watch::channel(false);
    let shutdown = move || {
        let mut stopped = stopped.clone();
        async move {
            let _ = stopped.changed().await;
        }
    };

    let mut servers = tokio::task::JoinSet::new();
    if args.rest {
        let addr = format!("{}:{}", config.rest.host, config.rest.port);
        let bridge = usb_bridge.clone();
        let shutdown = shutdown();
        servers.spawn(async move { rest::serve(bridge, &addr, shutdown).await });
    }
    if args.indi {
        let device = config
            .indi
            .device
            .clone()
            .unwrap_or_else(indi::default_device_name);
        let server = Arc::new(IndiServer::new(usb_bridge.clone(), device).await);
        let addr = format!("{}:{}", config.indi.host, config.indi.port);
        let shutdown = shutdown();
        servers.spawn(async move { server.serve(&addr, shutdown).await });
    }

    info!("Press Ctrl+C to shutdown");

    let mut result = Ok(());
    tokio::select! {
        signal = signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
                Err(e) => error!("Error waiting for Ctrl+C: {}", e),
            }
        }
        Some(joined) = servers.join_next() => {
            result = joined.context("Server task failed").and_then(|served| served);
        }
    }

    service::notify_stopping().context("Failed to notify systemd stopping")?;
    let _ = stop.send(true);
    while let Some(joined) = servers.join_next().await {
        if let Err(e) = joined.context("Server task failed").and_then(|served| served) {
            error!("Server error: {:#}", e);
        }
    }

    info!("Server shutdown complete");
    result
}
