//! Per-source wrapping of the shared upstream client.
//!
//! Every worker in the collector talks to the same upstream connection, but
//! the server demultiplexes state by device. The [`GnmiClientWrapper`] makes
//! the one shared client look like many per-device, per-provider clients:
//! it prefixes every outbound path with an element naming the device and
//! tags every call with metadata identifying where the traffic came from.

use std::sync::Arc;

use async_trait::async_trait;
use gnmi::{
    CapabilityRequest, CapabilityResponse, GetRequest, GetResponse, GnmiClient, Path, PathElem,
    SetRequest, SetResponse,
};
use tonic::metadata::MetadataValue;
use tonic::{Request, Response, Status};

/// Header carrying the collector build version on registration beacons.
pub const COLLECTOR_VERSION_METADATA: &str = "collector-version";
/// Header classifying the device as `target` or `managementSystem`.
pub const DEVICE_TYPE_METADATA: &str = "device-type";
/// Header set to `"true"` on every successful liveness beacon.
pub const DEVICE_LIVENESS_METADATA: &str = "device-liveness";
/// Header naming the device a wrapped call belongs to.
pub const DEVICE_ID_METADATA: &str = "device-id";
/// Header naming the provider a wrapped call originated from.
pub const ORIGIN_METADATA: &str = "origin";
/// Header indicating the schema dialect of the paths in a wrapped call.
pub const SCHEMA_DIALECT_METADATA: &str = "schema-dialect";

/// The `origin` value for calls made by the inventory itself (heartbeats)
/// rather than by a provider.
pub const INVENTORY_ORIGIN: &str = "inventory";

const OPENCONFIG_DIALECT: &str = "openconfig";
const NATIVE_DIALECT: &str = "native";

/// A per-source view of the shared upstream client.
///
/// The wrapper performs no retries, no buffering and no reordering; errors
/// from the inner client propagate unchanged, and it is safe for concurrent
/// use exactly when the inner client is.
pub struct GnmiClientWrapper {
    inner: Arc<dyn GnmiClient>,
    device_id: String,
    origin: Option<String>,
    openconfig: bool,
}

impl GnmiClientWrapper {
    /// Wraps `inner` for one source: `origin` names the owning provider, or
    /// is `None` for the inventory's own (heartbeat) traffic.
    pub fn new(
        inner: Arc<dyn GnmiClient>,
        device_id: impl Into<String>,
        origin: Option<String>,
        openconfig: bool,
    ) -> Self {
        GnmiClientWrapper {
            inner,
            device_id: device_id.into(),
            origin,
            openconfig,
        }
    }

    /// The path element every outbound path is rooted under.
    fn device_elem(&self) -> PathElem {
        PathElem {
            name: self.device_id.clone(),
            ..Default::default()
        }
    }

    fn prefix_path(&self, path: &mut Path) {
        path.elem.insert(0, self.device_elem());
    }

    /// Adds the source-identifying headers, preserving whatever metadata the
    /// caller already attached.
    fn tag<T>(&self, request: &mut Request<T>) -> Result<(), Status> {
        let device_id = MetadataValue::try_from(self.device_id.as_str())
            .map_err(|_| Status::invalid_argument("device id is not valid metadata"))?;
        let origin = MetadataValue::try_from(self.origin.as_deref().unwrap_or(INVENTORY_ORIGIN))
            .map_err(|_| Status::invalid_argument("provider name is not valid metadata"))?;
        let dialect = if self.openconfig {
            MetadataValue::from_static(OPENCONFIG_DIALECT)
        } else {
            MetadataValue::from_static(NATIVE_DIALECT)
        };

        let metadata = request.metadata_mut();
        metadata.insert(DEVICE_ID_METADATA, device_id);
        metadata.insert(ORIGIN_METADATA, origin);
        metadata.insert(SCHEMA_DIALECT_METADATA, dialect);
        Ok(())
    }
}

#[async_trait]
impl GnmiClient for GnmiClientWrapper {
    async fn capabilities(
        &self,
        mut request: Request<CapabilityRequest>,
    ) -> Result<Response<CapabilityResponse>, Status> {
        self.tag(&mut request)?;
        self.inner.capabilities(request).await
    }

    async fn get(&self, mut request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        self.tag(&mut request)?;
        for path in &mut request.get_mut().path {
            self.prefix_path(path);
        }
        self.inner.get(request).await
    }

    async fn set(&self, mut request: Request<SetRequest>) -> Result<Response<SetResponse>, Status> {
        self.tag(&mut request)?;
        let set = request.get_mut();
        for path in &mut set.delete {
            self.prefix_path(path);
        }
        for update in set.replace.iter_mut().chain(set.update.iter_mut()) {
            if let Some(path) = update.path.as_mut() {
                self.prefix_path(path);
            }
        }
        self.inner.set(request).await
    }
}
