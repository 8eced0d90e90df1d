//! The device inventory: registry and supervisor of every active device.
//!
//! The inventory owns the lifecycle of each admitted device. Admission
//! spawns the device's provider workers and its heartbeat under a child
//! cancellation scope; removal cancels that scope and joins every worker
//! before returning, so a completed delete guarantees no further upstream
//! traffic for that device. Devices that are managers get one extra worker
//! driving further inventory mutations against a handle to this same
//! inventory.

pub mod backup;
mod connection;

pub use connection::HEARTBEAT_PERIOD;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use gnmi::GnmiClient;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use self::backup::BackupError;
use self::connection::DeviceConn;
use crate::device::{Config, Info};

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("device id must not be empty")]
    EmptyId,
    #[error("device \"{0}\" is not in the inventory")]
    NotFound(String),
    #[error("provider \"{0}\" does not emit gNMI updates")]
    UnexpectedProviderType(String),
    #[error("device fault: {0}")]
    Device(anyhow::Error),
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error("failed to restore device \"{id}\": {error}")]
    Restore { id: String, error: anyhow::Error },
}

/// A handle to a device inventory.
///
/// Handles are cheap to clone and all refer to the same registry; manager
/// workers receive one so they can admit and remove devices themselves.
/// The inventory lives until the root token it was constructed with is
/// cancelled, which cancels every device scope derived from it; callers
/// that need to drain completely delete the remaining entries or join
/// their own top-level tasks.
#[derive(Clone)]
pub struct Inventory {
    inner: Arc<Inner>,
}

struct Inner {
    token: CancellationToken,
    client: Arc<dyn GnmiClient>,
    devices: Mutex<HashMap<String, Arc<DeviceConn>>>,
    backup_path: Option<PathBuf>,
    /// Serializes backup writes so an older snapshot never lands on disk
    /// after a newer one.
    backup_write: Mutex<()>,
}

impl Inventory {
    /// Creates an inventory whose device scopes all derive from `token`
    /// and whose outbound traffic shares `client`.
    pub fn new(token: CancellationToken, client: Arc<dyn GnmiClient>) -> Self {
        Inventory {
            inner: Arc::new(Inner {
                token,
                client,
                devices: Mutex::new(HashMap::new()),
                backup_path: None,
                backup_write: Mutex::new(()),
            }),
        }
    }

    /// Creates an inventory backed by a config file and restores whatever
    /// devices the file records.
    ///
    /// Any failed admission fails construction; devices admitted before the
    /// failure keep running until the caller cancels `token`.
    pub async fn with_backup(
        token: CancellationToken,
        client: Arc<dyn GnmiClient>,
        backup_path: impl Into<PathBuf>,
    ) -> Result<Self, InventoryError> {
        let inventory = Inventory {
            inner: Arc::new(Inner {
                token,
                client,
                devices: Mutex::new(HashMap::new()),
                backup_path: Some(backup_path.into()),
                backup_write: Mutex::new(()),
            }),
        };
        inventory.restore().await?;
        Ok(inventory)
    }

    /// Admits a device: reserves its map entry, starts its providers, its
    /// heartbeat and (for managers) its manage worker, and persists the new
    /// device set.
    ///
    /// Adding an id that is already present is a no-op success and spawns
    /// nothing. On a provider failure the reserved entry is removed and the
    /// device's scope cancelled before the error is returned.
    #[instrument(level = "info", skip(self, info), fields(device_id = %info.id))]
    pub async fn add(&self, info: Info) -> Result<(), InventoryError> {
        if info.id.is_empty() {
            return Err(InventoryError::EmptyId);
        }
        let conn = {
            let mut devices = self.inner.devices.lock().await;
            if devices.contains_key(&info.id) {
                debug!("device already in inventory");
                return Ok(());
            }
            let conn = Arc::new(DeviceConn::new(
                info,
                self.inner.token.child_token(),
                Arc::clone(&self.inner.client),
            ));
            devices.insert(conn.info.id.clone(), Arc::clone(&conn));
            conn
        };

        // The entry is reserved but the map lock is released: providers and
        // managers are user code that may call back into this inventory.
        let providers = match conn.init_providers() {
            Ok(providers) => providers,
            Err(error) => {
                let mut devices = self.inner.devices.lock().await;
                // Only evict the entry if it is still ours; a concurrent
                // delete/add cycle may have replaced it.
                if devices
                    .get(&conn.info.id)
                    .is_some_and(|current| Arc::ptr_eq(current, &conn))
                {
                    devices.remove(&conn.info.id);
                }
                drop(devices);
                conn.shutdown().await;
                return Err(error);
            }
        };

        {
            let devices = self.inner.devices.lock().await;
            // Workers start only while the entry is still this connection:
            // once a delete has removed it, nothing may spawn for this id.
            if !devices
                .get(&conn.info.id)
                .is_some_and(|current| Arc::ptr_eq(current, &conn))
            {
                return Ok(());
            }
            conn.start_providers(providers).await;
            Arc::clone(&conn).start_heartbeat().await;
            Arc::clone(&conn).start_manager(self.clone()).await;
        }
        info!("added device to inventory");
        self.backup().await?;
        Ok(())
    }

    /// Removes a device, blocking until every worker spawned for it has
    /// finished: once delete returns, no further upstream call tagged with
    /// this id will occur. Deleting an absent id is a no-op success.
    #[instrument(level = "info", skip(self))]
    pub async fn delete(&self, key: &str) -> Result<(), InventoryError> {
        if key.is_empty() {
            return Err(InventoryError::EmptyId);
        }
        let conn = {
            let mut devices = self.inner.devices.lock().await;
            let conn = devices.remove(key);
            // Cancel while the entry removal is still exclusive, so no
            // mapped id ever has a cancelled scope.
            if let Some(conn) = &conn {
                conn.token.cancel();
            }
            conn
        };
        let Some(conn) = conn else {
            return Ok(());
        };
        // Join the workers outside the map lock: a manager worker blocked
        // on the inventory must be able to re-acquire it and observe its
        // cancellation.
        conn.shutdown().await;
        info!("deleted device from inventory");
        self.backup().await?;
        Ok(())
    }

    /// Looks up the device admitted under `key`.
    pub async fn get(&self, key: &str) -> Result<Info, InventoryError> {
        if key.is_empty() {
            return Err(InventoryError::EmptyId);
        }
        self.inner
            .devices
            .lock()
            .await
            .get(key)
            .map(|conn| conn.info.clone())
            .ok_or_else(|| InventoryError::NotFound(key.to_string()))
    }

    /// A snapshot of every admitted device, in unspecified order.
    pub async fn list(&self) -> Vec<Info> {
        self.inner
            .devices
            .lock()
            .await
            .values()
            .map(|conn| conn.info.clone())
            .collect()
    }

    /// Re-admits every device recorded in the backup file.
    async fn restore(&self) -> Result<(), InventoryError> {
        let Some(path) = &self.inner.backup_path else {
            return Ok(());
        };
        let path = path.clone();
        let configs = tokio::task::spawn_blocking(move || backup::read_configs(&path))
            .await
            .map_err(|e| BackupError::Read(io::Error::other(e)))??;
        for config in configs {
            let id = config.id.clone();
            let info = Info::from_config(config)
                .await
                .map_err(|error| InventoryError::Restore { id: id.clone(), error })?;
            self.add(info).await?;
        }
        Ok(())
    }

    /// Persists the configs of the currently admitted devices.
    ///
    /// The device map lock is held only long enough to snapshot the
    /// configs; the file write itself runs on a blocking thread, under the
    /// write lock, so snapshots reach the disk in the order they were
    /// taken.
    async fn backup(&self) -> Result<(), InventoryError> {
        let Some(path) = &self.inner.backup_path else {
            return Ok(());
        };
        let _write_guard = self.inner.backup_write.lock().await;
        let configs: Vec<Config> = {
            let devices = self.inner.devices.lock().await;
            devices
                .values()
                .filter_map(|conn| conn.info.config.clone())
                .collect()
        };
        let path = path.clone();
        tokio::task::spawn_blocking(move || backup::write_configs(&path, &configs))
            .await
            .map_err(|e| BackupError::Write(io::Error::other(e)))??;
        Ok(())
    }
}
