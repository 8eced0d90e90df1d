//! Traits implemented by the workers that compose a device's outbound state.

use std::sync::Arc;

use async_trait::async_trait;
use gnmi::GnmiClient;
use tokio_util::sync::CancellationToken;

/// A worker that composes path-keyed state updates for its owning device.
///
/// Providers run under their device's cancellation scope: `run` is expected
/// to select on `token.cancelled()` at every suspension point and return
/// once the token fires. A provider returning early, with or without an
/// error, does not tear down its device; the failure is logged and the
/// device's other workers keep running.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A short identifier for this provider, carried as the `origin`
    /// metadata header on its outbound calls.
    fn name(&self) -> &str;

    /// Runs the provider until the token is cancelled or a terminal failure
    /// occurs.
    async fn run(&self, token: CancellationToken) -> anyhow::Result<()>;

    /// Runtime capability probe for gNMI-shaped providers. The inventory
    /// only admits devices whose providers all pass this probe.
    fn as_gnmi(&self) -> Option<&dyn GnmiProvider> {
        None
    }
}

/// A [`Provider`] that emits its updates through a gNMI client.
pub trait GnmiProvider: Provider {
    /// One-shot injection of the provider's client, already wrapped to tag
    /// and prefix everything with the owning device's identity. Called
    /// exactly once, before `run`.
    fn init_gnmi(&self, client: Arc<dyn GnmiClient>);

    /// Whether the provider emits OpenConfig-modeled paths. Reflected in
    /// the `schema-dialect` header on its outbound calls.
    fn openconfig(&self) -> bool;
}
