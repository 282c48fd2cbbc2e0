//! The `PORT` text vector
//!
//! One text member per listing line. A client edits a member to
//! `<command>` and the server runs that command on the member's location.

use super::xml::{OneText, render_vector};
use anyhow::Result;
use common::{PortCommand, UsbBridge};
use tracing::{info, warn};

pub const PROPERTY_NAME: &str = "PORT";
pub const PROPERTY_GROUP: &str = "Main Control";

/// INDI property state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyState {
    Ok,
    Alert,
}

impl PropertyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyState::Ok => "Ok",
            PropertyState::Alert => "Alert",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortProperty {
    pub device: String,
    pub state: PropertyState,
    pub message: Option<String>,
    /// Listing lines, member `N` holds `values[N - 1]`
    pub values: Vec<String>,
}

impl PortProperty {
    pub fn new(device: String, values: Vec<String>) -> Self {
        Self {
            device,
            state: PropertyState::Ok,
            message: None,
            values,
        }
    }

    /// True when a `newTextVector` for `device`/`name` is meant for us
    pub fn is_target(&self, device: Option<&str>, name: Option<&str>) -> bool {
        device == Some(self.device.as_str()) && name == Some(PROPERTY_NAME)
    }

    /// `defTextVector` describing the property and its current values
    pub fn define(&self) -> Result<String> {
        render_vector(
            "defTextVector",
            &[
                ("device", self.device.as_str()),
                ("name", PROPERTY_NAME),
                ("group", PROPERTY_GROUP),
                ("perm", "rw"),
                ("state", self.state.as_str()),
            ],
            "defText",
            &self.values,
        )
    }

    /// `setTextVector` with the current values and state
    pub fn update(&self) -> Result<String> {
        let mut attributes = vec![
            ("device", self.device.as_str()),
            ("name", PROPERTY_NAME),
            ("state", self.state.as_str()),
        ];
        if let Some(message) = &self.message {
            attributes.push(("message", message.as_str()));
        }
        render_vector("setTextVector", &attributes, "oneText", &self.values)
    }

    /// Pick the single command a client wrote, if any
    ///
    /// `Ok(None)` means nothing was written and the listing should just be
    /// refreshed. `Err` carries the alert message.
    pub fn resolve(
        &self,
        texts: &[OneText],
    ) -> std::result::Result<Option<(PortCommand, String)>, String> {
        let mut changes = Vec::new();
        for one in texts {
            let command = one.text.trim();
            if command.is_empty() {
                continue;
            }
            let value = one
                .name
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| self.values.get(i))
                .ok_or_else(|| format!("no port member named '{}'", one.name))?;
            changes.push((command.to_lowercase(), value));
        }

        match changes.as_slice() {
            [] => Ok(None),
            [(command, value)] => {
                let command = command
                    .parse::<PortCommand>()
                    .map_err(|_| "command not recognized".to_string())?;
                let location = value
                    .split_whitespace()
                    .next()
                    .ok_or_else(|| "port member has no location".to_string())?;
                Ok(Some((command, location.to_string())))
            }
            _ => Err("too many commands, erase those not needed".to_string()),
        }
    }

    /// Apply a client's `newTextVector`
    ///
    /// Runs the written command, if any, and refreshes the values on
    /// success. Every failure leaves the values untouched and puts the
    /// property in Alert with the error as message.
    pub async fn apply(&mut self, bridge: &UsbBridge, texts: &[OneText]) {
        self.message = None;

        let result = match self.resolve(texts) {
            Err(message) => {
                warn!("INDI request rejected: {}", message);
                self.state = PropertyState::Alert;
                self.message = Some(message);
                return;
            }
            Ok(None) => bridge.list().await,
            Ok(Some((command, location))) => {
                info!("INDI {} {}", command, location);
                bridge.execute(command, location).await
            }
        };

        match result {
            Ok(values) => {
                self.state = PropertyState::Ok;
                self.values = values;
            }
            Err(e) => {
                warn!("INDI request failed: {}", e);
                self.state = PropertyState::Alert;
                self.message = Some(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::spawn_usb_worker;
    use common::create_usb_bridge;
    use common::test_utils::{MockHost, create_mock_device, create_mock_hub};

    fn text(name: &str, text: &str) -> OneText {
        OneText {
            name: name.to_string(),
            text: text.to_string(),
        }
    }

    fn property() -> PortProperty {
        PortProperty::new(
            "USBWATCH_LAB".to_string(),
            vec![
                "1-01          [PCE] 1234:5678 ?".to_string(),
                "1-02          [P]".to_string(),
            ],
        )
    }

    fn bridge() -> UsbBridge {
        let host = MockHost::new()
            .with_hub(create_mock_hub(1, 1, &[], 2), &[0x0103, 0x0100])
            .with_device(create_mock_device(1, 2, &[1]));
        let (bridge, worker) = create_usb_bridge();
        spawn_usb_worker(worker, host).unwrap();
        bridge
    }

    #[test]
    fn test_is_target() {
        let property = property();
        assert!(property.is_target(Some("USBWATCH_LAB"), Some("PORT")));
        assert!(!property.is_target(Some("OTHER"), Some("PORT")));
        assert!(!property.is_target(Some("USBWATCH_LAB"), None));
    }

    #[test]
    fn test_resolve() {
        let property = property();

        assert_eq!(property.resolve(&[text("1", ""), text("2", "  ")]), Ok(None));
        assert_eq!(
            property.resolve(&[text("1", ""), text("2", " Off ")]),
            Ok(Some((PortCommand::Off, "1-02".to_string())))
        );
        assert_eq!(
            property.resolve(&[text("1", "reboot")]),
            Err("command not recognized".to_string())
        );
        assert_eq!(
            property.resolve(&[text("1", "on"), text("2", "off")]),
            Err("too many commands, erase those not needed".to_string())
        );
        assert!(property.resolve(&[text("7", "on")]).is_err());
    }

    #[test]
    fn test_define_and_update() {
        let mut property = property();
        let define = property.define().unwrap();
        assert!(define.contains("perm=\"rw\""));
        assert!(define.contains("group=\"Main Control\""));
        assert!(define.contains("<defText name=\"2\">1-02          [P]</defText>"));

        property.state = PropertyState::Alert;
        property.message = Some("command not recognized".to_string());
        let update = property.update().unwrap();
        assert!(update.starts_with("<setTextVector"));
        assert!(update.contains("state=\"Alert\""));
        assert!(update.contains("message=\"command not recognized\""));
        assert!(update.contains("<oneText name=\"1\">"));
    }

    #[tokio::test]
    async fn test_apply_command() {
        let bridge = bridge();
        let mut property = property();
        property.values.clear();

        property.apply(&bridge, &[]).await;
        assert_eq!(property.state, PropertyState::Ok);
        assert_eq!(property.values.len(), 2);

        property.apply(&bridge, &[text("2", "on")]).await;
        assert_eq!(property.state, PropertyState::Ok);
        assert_eq!(property.message, None);
    }

    #[tokio::test]
    async fn test_apply_failure_raises_alert() {
        let bridge = bridge();
        let mut property = property();

        property.apply(&bridge, &[text("2", "reset")]).await;
        assert_eq!(property.state, PropertyState::Alert);
        assert_eq!(
            property.message.as_deref(),
            Some("usb device at 1-02 not enumerated or plugged in, use the hub commands")
        );

        property.apply(&bridge, &[text("1", "bogus")]).await;
        assert_eq!(property.state, PropertyState::Alert);
        assert_eq!(property.message.as_deref(), Some("command not recognized"));
        assert_eq!(property.values.len(), 2);
    }
}
