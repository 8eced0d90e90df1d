//! Shared test scaffolding: a recording upstream client and scriptable
//! devices, providers and managers for exercising the inventory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::Context;
use async_trait::async_trait;
use gnmi::{
    CapabilityRequest, CapabilityResponse, GetRequest, GetResponse, GnmiClient, Path, SetRequest,
    SetResponse, TypedValue, Update,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};

use crate::device::{registry, Device, Info, Manager};
use crate::inventory::Inventory;
use crate::provider::{GnmiProvider, Provider};

/// One Set observed by the [`RecordingClient`], with the metadata it
/// carried.
pub(crate) struct RecordedSet {
    pub metadata: MetadataMap,
    pub request: SetRequest,
}

/// An upstream client that records every Set on a channel. Flipping
/// [`RecordingClient::fail_sets`] makes subsequent Sets fail with a
/// transport error.
pub(crate) struct RecordingClient {
    sets: mpsc::UnboundedSender<RecordedSet>,
    fail: AtomicBool,
}

impl RecordingClient {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RecordedSet>) {
        let (sets, receiver) = mpsc::unbounded_channel();
        (
            Arc::new(RecordingClient {
                sets,
                fail: AtomicBool::new(false),
            }),
            receiver,
        )
    }

    pub(crate) fn fail_sets(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl GnmiClient for RecordingClient {
    async fn capabilities(
        &self,
        _request: Request<CapabilityRequest>,
    ) -> Result<Response<CapabilityResponse>, Status> {
        Ok(Response::new(CapabilityResponse::default()))
    }

    async fn get(&self, _request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        Ok(Response::new(GetResponse::default()))
    }

    async fn set(&self, request: Request<SetRequest>) -> Result<Response<SetResponse>, Status> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Status::unavailable("upstream connection lost"));
        }
        let metadata = request.metadata().clone();
        let _ = self.sets.send(RecordedSet {
            metadata,
            request: request.into_inner(),
        });
        Ok(Response::new(SetResponse::default()))
    }
}

/// A gNMI provider that emits one update on startup, then parks until its
/// scope is cancelled.
pub(crate) struct TestProvider {
    name: String,
    openconfig: bool,
    client: OnceLock<Arc<dyn GnmiClient>>,
    done: AtomicBool,
}

impl TestProvider {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Arc::new(TestProvider {
            name: name.to_string(),
            openconfig: false,
            client: OnceLock::new(),
            done: AtomicBool::new(false),
        })
    }

    /// Whether `init_gnmi` has been called.
    pub(crate) fn initialized(&self) -> bool {
        self.client.get().is_some()
    }

    /// Whether `run` has returned.
    pub(crate) fn finished(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for TestProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, token: CancellationToken) -> anyhow::Result<()> {
        let client = self
            .client
            .get()
            .cloned()
            .context("gNMI client was not injected before run")?;
        let update = Update::new(
            Path::from_elements(["state", "version"]),
            TypedValue::string("0.1"),
        );
        let request = Request::new(SetRequest {
            update: vec![update],
            ..Default::default()
        });
        client.set(request).await?;

        token.cancelled().await;
        self.done.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn as_gnmi(&self) -> Option<&dyn GnmiProvider> {
        Some(self)
    }
}

impl GnmiProvider for TestProvider {
    fn init_gnmi(&self, client: Arc<dyn GnmiClient>) {
        let _ = self.client.set(client);
    }

    fn openconfig(&self) -> bool {
        self.openconfig
    }
}

/// A provider without the gNMI capability; devices carrying one must be
/// refused.
pub(crate) struct BareProvider;

#[async_trait]
impl Provider for BareProvider {
    fn name(&self) -> &str {
        "bare"
    }

    async fn run(&self, token: CancellationToken) -> anyhow::Result<()> {
        token.cancelled().await;
        Ok(())
    }
}

/// A scriptable target device.
pub(crate) struct TestDevice {
    id: String,
    providers: Vec<Arc<dyn Provider>>,
    providers_fail: bool,
    alive_error_after: Option<usize>,
    alive_calls: AtomicUsize,
}

impl TestDevice {
    pub(crate) fn new(id: &str) -> Arc<Self> {
        Self::build(id, Vec::new(), false, None)
    }

    pub(crate) fn with_providers(id: &str, providers: Vec<Arc<dyn Provider>>) -> Arc<Self> {
        Self::build(id, providers, false, None)
    }

    /// A device whose `providers()` call itself fails.
    pub(crate) fn with_failing_providers(id: &str) -> Arc<Self> {
        Self::build(id, Vec::new(), true, None)
    }

    /// A device whose `alive()` starts erroring after `after_calls`
    /// successful probes.
    pub(crate) fn with_failing_alive(
        id: &str,
        providers: Vec<Arc<dyn Provider>>,
        after_calls: usize,
    ) -> Arc<Self> {
        Self::build(id, providers, false, Some(after_calls))
    }

    fn build(
        id: &str,
        providers: Vec<Arc<dyn Provider>>,
        providers_fail: bool,
        alive_error_after: Option<usize>,
    ) -> Arc<Self> {
        Arc::new(TestDevice {
            id: id.to_string(),
            providers,
            providers_fail,
            alive_error_after,
            alive_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Device for TestDevice {
    async fn alive(&self) -> anyhow::Result<bool> {
        let calls = self.alive_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(after) = self.alive_error_after {
            if calls >= after {
                anyhow::bail!("device stopped responding");
            }
        }
        Ok(true)
    }

    async fn device_id(&self) -> anyhow::Result<String> {
        Ok(self.id.clone())
    }

    fn providers(&self) -> anyhow::Result<Vec<Arc<dyn Provider>>> {
        if self.providers_fail {
            anyhow::bail!("could not enumerate providers");
        }
        Ok(self.providers.clone())
    }
}

/// A manager that performs a scripted mutation against the inventory it is
/// handed, then returns.
pub(crate) struct TestManager {
    id: String,
    add_on_manage: Option<Info>,
    delete_on_manage: Option<String>,
}

impl TestManager {
    pub(crate) fn new(id: &str) -> Arc<Self> {
        Arc::new(TestManager {
            id: id.to_string(),
            add_on_manage: None,
            delete_on_manage: None,
        })
    }

    pub(crate) fn adding(id: &str, child: Info) -> Arc<Self> {
        Arc::new(TestManager {
            id: id.to_string(),
            add_on_manage: Some(child),
            delete_on_manage: None,
        })
    }

    pub(crate) fn deleting(id: &str, child_id: &str) -> Arc<Self> {
        Arc::new(TestManager {
            id: id.to_string(),
            add_on_manage: None,
            delete_on_manage: Some(child_id.to_string()),
        })
    }
}

#[async_trait]
impl Device for TestManager {
    async fn alive(&self) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn device_id(&self) -> anyhow::Result<String> {
        Ok(self.id.clone())
    }

    fn providers(&self) -> anyhow::Result<Vec<Arc<dyn Provider>>> {
        Ok(Vec::new())
    }

    fn as_manager(&self) -> Option<&dyn Manager> {
        Some(self)
    }
}

#[async_trait]
impl Manager for TestManager {
    async fn manage(&self, inventory: Inventory) -> anyhow::Result<()> {
        if let Some(child) = &self.add_on_manage {
            inventory.add(child.clone()).await?;
        }
        if let Some(child_id) = &self.delete_on_manage {
            inventory.delete(child_id).await?;
        }
        Ok(())
    }
}

/// Registers a device factory with no options producing plain alive test
/// devices, for restore and backup tests.
pub(crate) fn register_test_device(name: &str) {
    registry::register_device(
        name,
        |_options| Ok(TestDevice::new("from-factory") as Arc<dyn Device>),
        HashMap::new(),
    )
    .expect("test device registration should succeed");
}
