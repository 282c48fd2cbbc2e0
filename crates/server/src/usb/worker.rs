//! USB worker thread
//!
//! Dedicated thread owning the USB host. Every front end sends its requests
//! here through the bridge, so at most one control transfer is in flight and
//! each answer is computed from a fresh topology.

use common::{CommandResult, Error, UsbCommand, UsbHost, UsbWatch, UsbWorker};
use tracing::{debug, error, info};

/// USB worker thread
///
/// Processes commands from the Tokio runtime one at a time until a
/// Shutdown command arrives or every bridge is dropped.
pub struct UsbWorkerThread<H: UsbHost> {
    watch: UsbWatch<H>,
    /// Communication channel with Tokio runtime
    worker: UsbWorker,
}

impl<H: UsbHost> UsbWorkerThread<H> {
    pub fn new(worker: UsbWorker, host: H) -> Self {
        Self {
            watch: UsbWatch::new(host),
            worker,
        }
    }

    /// Run the command loop
    pub fn run(self) {
        info!("USB worker thread started");

        loop {
            match self.worker.recv_command() {
                Ok(UsbCommand::Shutdown) => {
                    info!("USB worker shutting down");
                    break;
                }
                Ok(cmd) => self.handle_command(cmd),
                Err(_) => {
                    debug!("All bridges dropped");
                    break;
                }
            }
        }

        info!("USB worker thread stopped");
    }

    /// Handle a command from the Tokio runtime
    fn handle_command(&self, cmd: UsbCommand) {
        let (response, result) = match cmd {
            UsbCommand::List { response } => {
                debug!("Listing ports");
                (response, self.guarded(|watch| watch.list()))
            }

            UsbCommand::SoftReset { location, response } => {
                debug!("Soft reset of {}", location);
                let result = self.guarded(|watch| {
                    watch.soft_reset(&location)?;
                    watch.list()
                });
                (response, result)
            }

            UsbCommand::SetFeature {
                location,
                feature,
                enable,
                response,
            } => {
                debug!("{} {} on {}", if enable { "Set" } else { "Clear" }, feature, location);
                let result = self.guarded(|watch| {
                    watch.set_feature(&location, feature, enable)?;
                    watch.list()
                });
                (response, result)
            }

            UsbCommand::Shutdown => {
                // Already handled in main loop
                return;
            }
        };

        let _ = response.send(result);
    }

    /// Run `f`, turning a panic into an error instead of killing the thread
    fn guarded<F>(&self, f: F) -> CommandResult
    where
        F: FnOnce(&UsbWatch<H>) -> CommandResult,
    {
        let watch = &self.watch;
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(watch))).unwrap_or_else(|e| {
            error!("Panic in USB command handler: {:?}", e);
            Err(Error::Channel("USB worker panicked".to_string()))
        })
    }
}

/// Spawn the USB worker thread
///
/// This creates a new OS thread for USB operations and returns a join handle.
pub fn spawn_usb_worker<H>(
    worker: UsbWorker,
    host: H,
) -> std::io::Result<std::thread::JoinHandle<()>>
where
    H: UsbHost + Send + 'static,
{
    std::thread::Builder::new()
        .name("usb-worker".to_string())
        .spawn(move || UsbWorkerThread::new(worker, host).run())
}
