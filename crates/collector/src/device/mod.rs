//! Device and manager capabilities, and the records the inventory tracks.

pub mod registry;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::inventory::Inventory;
use crate::provider::Provider;

/// How the upstream classifies a device, carried in the `device-type`
/// header of its registration beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// An ordinary device streaming its own state.
    Target,
    /// A system managing other devices, which itself should not be treated
    /// as a streaming device by the upstream.
    ManagementSystem,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Target => "target",
            DeviceType::ManagementSystem => "managementSystem",
        }
    }
}

/// An entity exposing telemetry to the collector.
///
/// Implementations are plugged in through the [`registry`] and owned by the
/// inventory, which supervises the workers behind [`Device::providers`].
#[async_trait]
pub trait Device: Send + Sync {
    /// Whether the device is currently reachable. Probed once a second by
    /// the inventory's heartbeat; an error here is a device-level fault.
    async fn alive(&self) -> anyhow::Result<bool>;

    /// The device's stable identifier, e.g. a serial number.
    async fn device_id(&self) -> anyhow::Result<String>;

    /// The providers that will stream this device's state.
    fn providers(&self) -> anyhow::Result<Vec<Arc<dyn Provider>>>;

    /// Runtime capability probe: devices that also implement [`Manager`]
    /// return themselves here and are classified as management systems.
    fn as_manager(&self) -> Option<&dyn Manager> {
        None
    }

    fn device_type(&self) -> DeviceType {
        if self.as_manager().is_some() {
            DeviceType::ManagementSystem
        } else {
            DeviceType::Target
        }
    }
}

/// A device that drives admission and removal of other devices.
///
/// `manage` runs in its own worker under the manager's device scope and may
/// call [`Inventory::add`], [`Inventory::delete`] and [`Inventory::get`] on
/// the inventory it is handed, including observing the manager's own
/// entry. It must not delete its own id: delete joins every worker of the
/// deleted device, the manager's included.
#[async_trait]
pub trait Manager: Device {
    async fn manage(&self, inventory: Inventory) -> anyhow::Result<()>;
}

/// The persisted record a device can be reconstructed from: which factory
/// to invoke and with which options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub id: String,
    /// The registered factory name.
    pub device: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// A device admitted to (or destined for) an inventory.
///
/// Identity is the `id`: two `Info`s with the same id never coexist in one
/// inventory. `config` is present when the device was built from a
/// [`Config`] record and is what the inventory persists.
#[derive(Clone)]
pub struct Info {
    pub id: String,
    pub device: Arc<dyn Device>,
    pub config: Option<Config>,
}

impl Info {
    pub fn new(id: impl Into<String>, device: Arc<dyn Device>) -> Self {
        Info {
            id: id.into(),
            device,
            config: None,
        }
    }

    /// Constructs the device named by `config` through the plug-in
    /// registry. The device factory table is consulted first, then the
    /// manager table. The record's id wins; the device is only asked for
    /// its own id when the record leaves it empty.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let device: Arc<dyn Device> = match registry::create_device(&config.device, &config.options)
        {
            Ok(device) => device,
            Err(registry::RegistryError::UnknownDevice(_)) => {
                registry::create_manager(&config.device, &config.options)?
            }
            Err(e) => return Err(e.into()),
        };
        let id = if config.id.is_empty() {
            device.device_id().await?
        } else {
            config.id.clone()
        };
        Ok(Info {
            id,
            device,
            config: Some(config),
        })
    }
}

impl fmt::Debug for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Info")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::{TestDevice, TestManager};

    use std::collections::HashMap;

    #[test]
    fn test_device_type_derivation() {
        let target = TestDevice::new("t1");
        assert_eq!(target.device_type(), DeviceType::Target);

        let manager = TestManager::new("m1");
        assert_eq!(manager.device_type(), DeviceType::ManagementSystem);
    }

    #[tokio::test]
    async fn test_from_config_uses_record_id() {
        registry::register_device(
            "info-record-id",
            |_options| Ok(TestDevice::new("serial-from-device") as Arc<dyn Device>),
            HashMap::new(),
        )
        .expect("registration should succeed");

        let config = Config {
            id: "configured-id".to_string(),
            device: "info-record-id".to_string(),
            options: HashMap::new(),
        };
        let info = Info::from_config(config.clone())
            .await
            .expect("device should construct");
        assert_eq!(info.id, "configured-id");
        assert_eq!(info.config, Some(config));
    }

    #[tokio::test]
    async fn test_from_config_asks_device_for_missing_id() {
        registry::register_device(
            "info-device-id",
            |_options| Ok(TestDevice::new("serial-from-device") as Arc<dyn Device>),
            HashMap::new(),
        )
        .expect("registration should succeed");

        let config = Config {
            id: String::new(),
            device: "info-device-id".to_string(),
            options: HashMap::new(),
        };
        let info = Info::from_config(config).await.expect("device should construct");
        assert_eq!(info.id, "serial-from-device");
    }

    #[tokio::test]
    async fn test_from_config_falls_back_to_manager_factory() {
        registry::register_manager(
            "info-manager",
            |_options| Ok(TestManager::new("m1") as Arc<dyn Manager>),
            HashMap::new(),
        )
        .expect("registration should succeed");

        let config = Config {
            id: "m1".to_string(),
            device: "info-manager".to_string(),
            options: HashMap::new(),
        };
        let info = Info::from_config(config).await.expect("manager should construct");
        assert_eq!(info.device.device_type(), DeviceType::ManagementSystem);
    }

    #[tokio::test]
    async fn test_from_config_unknown_factory_errors() {
        let config = Config {
            id: "x".to_string(),
            device: "info-no-such-factory".to_string(),
            options: HashMap::new(),
        };
        assert!(Info::from_config(config).await.is_err());
    }
}
