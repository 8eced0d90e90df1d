//! Per-device runtime state and worker supervision.

use std::sync::Arc;

use gnmi::{GnmiClient, SetRequest};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataValue;
use tonic::Request;
use tracing::{debug, error};

use super::{Inventory, InventoryError};
use crate::client::{
    GnmiClientWrapper, COLLECTOR_VERSION_METADATA, DEVICE_LIVENESS_METADATA, DEVICE_TYPE_METADATA,
};
use crate::device::Info;
use crate::provider::{GnmiProvider, Provider};
use crate::VERSION;

/// How often each admitted device's liveness is probed and beaconed
/// upstream.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);

/// Everything the inventory holds for one admitted device: the device
/// itself, the cancellation scope its workers run under, and the handles
/// needed to join them on removal.
///
/// All of a device's workers (providers, the heartbeat, and the manager
/// worker if the device is one) share the device's child token; cancelling
/// it signals every one of them.
pub(crate) struct DeviceConn {
    pub(crate) info: Info,
    pub(crate) token: CancellationToken,
    client: Arc<dyn GnmiClient>,
    /// Untagged wrapper for the inventory's own traffic: carries the
    /// device id but no provider origin.
    heartbeat_client: GnmiClientWrapper,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DeviceConn {
    pub(crate) fn new(info: Info, token: CancellationToken, client: Arc<dyn GnmiClient>) -> Self {
        let heartbeat_client = GnmiClientWrapper::new(Arc::clone(&client), &info.id, None, false);
        DeviceConn {
            info,
            token,
            client,
            heartbeat_client,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Probes and wires up the device's providers without starting them.
    ///
    /// Every provider must pass the gNMI capability probe; each gets its own
    /// wrapper carrying the device id, the provider's name and its dialect
    /// flag, injected here. Wiring runs with no inventory lock held because
    /// providers are user code; the workers are only spawned later, by
    /// [`DeviceConn::start_providers`], once the inventory has confirmed the
    /// device is still admitted.
    pub(crate) fn init_providers(&self) -> Result<Vec<Arc<dyn Provider>>, InventoryError> {
        let providers = self.info.device.providers().map_err(InventoryError::Device)?;
        for provider in &providers {
            let gnmi_provider = provider.as_gnmi().ok_or_else(|| {
                InventoryError::UnexpectedProviderType(provider.name().to_string())
            })?;
            let wrapper: Arc<dyn GnmiClient> = Arc::new(GnmiClientWrapper::new(
                Arc::clone(&self.client),
                &self.info.id,
                Some(provider.name().to_string()),
                gnmi_provider.openconfig(),
            ));
            gnmi_provider.init_gnmi(wrapper);
        }
        Ok(providers)
    }

    /// Starts a worker for each wired-up provider. A provider returning an
    /// error is logged but does not bring down the device.
    pub(crate) async fn start_providers(&self, providers: Vec<Arc<dyn Provider>>) {
        let mut tasks = self.tasks.lock().await;
        for provider in providers {
            let token = self.token.clone();
            let device_id = self.info.id.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(error) = provider.run(token).await {
                    error!(
                        device_id = %device_id,
                        provider = %provider.name(),
                        error = %error,
                        "provider exited with error"
                    );
                }
            }));
        }
    }

    /// Starts the heartbeat worker. A heartbeat failure is a device-level
    /// fault: it is logged and cancels this device's scope, and only this
    /// device's.
    pub(crate) async fn start_heartbeat(self: Arc<Self>) {
        let conn = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            if let Err(error) = conn.send_periodic_updates().await {
                error!(device_id = %conn.info.id, error = %error, "heartbeat terminated");
                conn.token.cancel();
            }
        });
        self.tasks.lock().await.push(handle);
    }

    /// Starts the manager worker when the device is a manager; otherwise a
    /// no-op.
    pub(crate) async fn start_manager(self: Arc<Self>, inventory: Inventory) {
        if self.info.device.as_manager().is_none() {
            return;
        }
        let conn = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            if let Some(manager) = conn.info.device.as_manager() {
                if let Err(error) = manager.manage(inventory).await {
                    error!(device_id = %conn.info.id, error = %error, "manager exited with error");
                }
            }
        });
        self.tasks.lock().await.push(handle);
    }

    /// Announces the device upstream, then beacons its liveness every
    /// [`HEARTBEAT_PERIOD`] until cancelled.
    ///
    /// The registration beacon carries the collector version and the device
    /// classification; each subsequent alive tick sends an empty Set tagged
    /// `device-liveness: "true"`. A transport failure or an `alive` error
    /// terminates the heartbeat.
    async fn send_periodic_updates(&self) -> anyhow::Result<()> {
        let mut request = Request::new(SetRequest::default());
        let metadata = request.metadata_mut();
        metadata.insert(COLLECTOR_VERSION_METADATA, MetadataValue::from_static(VERSION));
        metadata.insert(
            DEVICE_TYPE_METADATA,
            MetadataValue::from_static(self.info.device.device_type().as_str()),
        );
        self.heartbeat_client.set(request).await?;

        let mut ticker = interval(HEARTBEAT_PERIOD);
        // The first tick of a tokio interval completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = self.token.cancelled() => return Ok(()),
                _ = ticker.tick() => match self.info.device.alive().await {
                    Ok(true) => {
                        let mut request = Request::new(SetRequest::default());
                        request
                            .metadata_mut()
                            .insert(DEVICE_LIVENESS_METADATA, MetadataValue::from_static("true"));
                        self.heartbeat_client.set(request).await?;
                    }
                    Ok(false) => debug!(device_id = %self.info.id, "device is not alive"),
                    Err(error) => return Err(error),
                },
            }
        }
    }

    /// Cancels the device's scope and joins every worker. On return no
    /// worker for this device is runnable.
    pub(crate) async fn shutdown(&self) {
        self.token.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for result in futures::future::join_all(tasks).await {
            if let Err(error) = result {
                error!(device_id = %self.info.id, error = %error, "device worker panicked");
            }
        }
    }
}
