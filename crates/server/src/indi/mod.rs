//! INDI front end
//!
//! Publishes a single read-write text vector `PORT` whose members are the
//! listing lines. Every client sees every update: replies are broadcast to
//! all connections, not just the one that asked.

pub mod property;
pub mod xml;

use anyhow::Result;
use common::UsbBridge;
use property::{PortProperty, PropertyState};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};
use xml::IndiMessage;

const PUBLISH_CAPACITY: usize = 64;
const READ_BUFFER_SIZE: usize = 4096;

/// `USBWATCH_<HOSTNAME>`, hostname upper-cased and cut at the first dot
pub fn default_device_name() -> String {
    let host = nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|e| {
            warn!("Cannot read hostname: {}", e);
            "localhost".to_string()
        });
    device_name_for_host(&host)
}

fn device_name_for_host(host: &str) -> String {
    let short = host.split('.').next().unwrap_or(host);
    format!("USBWATCH_{}", short.to_uppercase())
}

pub struct IndiServer {
    bridge: UsbBridge,
    property: Mutex<PortProperty>,
    publisher: broadcast::Sender<Arc<str>>,
}

impl IndiServer {
    /// Create the server with a first listing
    ///
    /// A failed listing does not prevent startup, the property starts in
    /// Alert and the next client request retries.
    pub async fn new(bridge: UsbBridge, device: String) -> Self {
        let mut property = PortProperty::new(device, Vec::new());
        match bridge.list().await {
            Ok(values) => property.values = values,
            Err(e) => {
                warn!("Initial listing failed: {}", e);
                property.state = PropertyState::Alert;
                property.message = Some(e.to_string());
            }
        }

        let (publisher, _) = broadcast::channel(PUBLISH_CAPACITY);
        Self {
            bridge,
            property: Mutex::new(property),
            publisher,
        }
    }

    /// Current state of the `PORT` property
    pub async fn property(&self) -> PortProperty {
        self.property.lock().await.clone()
    }

    /// Subscribe to everything the server publishes
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.publisher.subscribe()
    }

    /// Handle one complete element received from a client
    pub async fn on_message(&self, element: &str) -> Result<()> {
        match xml::parse_message(element)? {
            IndiMessage::GetProperties => {
                let property = self.property.lock().await;
                self.publish(property.define()?);
            }
            IndiMessage::NewTextVector {
                device,
                name,
                texts,
            } => {
                let mut property = self.property.lock().await;
                if !property.is_target(device.as_deref(), name.as_deref()) {
                    debug!("Ignoring newTextVector for {:?}.{:?}", device, name);
                    return Ok(());
                }
                property.apply(&self.bridge, &texts).await;
                self.publish(property.define()?);
                self.publish(property.update()?);
            }
            IndiMessage::Other(tag) => debug!("Ignoring INDI message <{}>", tag),
        }
        Ok(())
    }

    fn publish(&self, xml: String) {
        // no subscribers just means no client is connected
        let _ = self.publisher.send(Arc::from(xml));
    }

    /// Serve on `addr` until `shutdown` resolves
    pub async fn serve(
        self: Arc<Self>,
        addr: &str,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("INDI server listening on {}", listener.local_addr()?);
        crate::service::notify_ready()?;
        self.run(listener, shutdown).await
    }

    /// Accept connections on `listener` until `shutdown` resolves
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("INDI server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    debug!("INDI client connected: {}", peer);
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream).await {
                            debug!("INDI client {} dropped: {}", peer, e);
                        }
                        debug!("INDI client disconnected: {}", peer);
                    });
                }
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        let mut published = self.subscribe();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut pending = String::new();

        loop {
            tokio::select! {
                read = reader.read(&mut buffer) => {
                    let n = read?;
                    if n == 0 {
                        return Ok(());
                    }
                    pending.push_str(&xml::decode_latin1(&buffer[..n]));
                    for element in xml::split_elements(&mut pending) {
                        if let Err(e) = self.on_message(&element).await {
                            warn!("Bad INDI message: {}", e);
                        }
                    }
                    if pending.len() > xml::MAX_PENDING {
                        warn!("Discarding {} bytes of unterminated INDI input", pending.len());
                        pending.clear();
                    }
                }
                message = published.recv() => {
                    match message {
                        Ok(xml) => writer.write_all(&xml::encode_latin1(&xml)).await?,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("INDI client lagging, skipped {} messages", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => return Ok(()),
                    }
                }
            }
        }
    }
}
