//! Async channel bridge between Tokio runtime and USB thread
//!
//! Every front end shares one [`UsbBridge`]; the single [`UsbWorker`] end is
//! drained by one OS thread, so hardware requests never overlap.

use crate::watch::PortCommand;
use async_channel::{Receiver, Sender, bounded};
use protocol::HubFeature;
use tokio::sync::oneshot;

/// Listing returned by every command, or the error that stopped it
pub type CommandResult = crate::Result<Vec<String>>;

/// Commands from Tokio runtime to USB thread
#[derive(Debug)]
pub enum UsbCommand {
    /// Render the current port listing
    List {
        /// Channel to send response back
        response: oneshot::Sender<CommandResult>,
    },

    /// Reset the device at a location, then list
    SoftReset {
        /// Location text as given by the operator
        location: String,
        /// Channel to send response back
        response: oneshot::Sender<CommandResult>,
    },

    /// Set or clear a hub port feature, then list
    SetFeature {
        /// Location text as given by the operator
        location: String,
        feature: HubFeature,
        enable: bool,
        /// Channel to send response back
        response: oneshot::Sender<CommandResult>,
    },

    /// Shutdown the USB thread gracefully
    Shutdown,
}

impl UsbCommand {
    /// Command for `command` on `location`, answering on `response`
    pub fn for_port(
        command: PortCommand,
        location: String,
        response: oneshot::Sender<CommandResult>,
    ) -> Self {
        match command.hub_feature() {
            None => UsbCommand::SoftReset { location, response },
            Some((feature, enable)) => UsbCommand::SetFeature {
                location,
                feature,
                enable,
                response,
            },
        }
    }
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct UsbBridge {
    cmd_tx: Sender<UsbCommand>,
}

impl UsbBridge {
    /// Send a command to the USB thread
    pub async fn send_command(&self, cmd: UsbCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Current listing
    pub async fn list(&self) -> CommandResult {
        let (response, rx) = oneshot::channel();
        self.send_command(UsbCommand::List { response }).await?;
        Self::await_response(rx).await
    }

    /// Run `command` on `location` and return the refreshed listing
    pub async fn execute(&self, command: PortCommand, location: String) -> CommandResult {
        let (response, rx) = oneshot::channel();
        self.send_command(UsbCommand::for_port(command, location, response))
            .await?;
        Self::await_response(rx).await
    }

    /// Ask the USB thread to stop after the commands already queued
    pub async fn shutdown(&self) -> crate::Result<()> {
        self.send_command(UsbCommand::Shutdown).await
    }

    async fn await_response(rx: oneshot::Receiver<CommandResult>) -> CommandResult {
        rx.await
            .map_err(|_| crate::Error::Channel("USB worker dropped the request".to_string()))?
    }
}

/// Handle for USB thread (blocking)
pub struct UsbWorker {
    pub(crate) cmd_rx: Receiver<UsbCommand>,
}

impl UsbWorker {
    /// Receive a command from Tokio runtime (blocking)
    pub fn recv_command(&self) -> crate::Result<UsbCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<UsbCommand> {
        self.cmd_rx.try_recv().ok()
    }
}

/// Create the channel bridge between Tokio and USB thread
///
/// Returns (UsbBridge for Tokio, UsbWorker for USB thread)
pub fn create_usb_bridge() -> (UsbBridge, UsbWorker) {
    let (cmd_tx, cmd_rx) = bounded(64);

    (UsbBridge { cmd_tx }, UsbWorker { cmd_rx })
}
