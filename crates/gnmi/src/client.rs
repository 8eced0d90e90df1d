//! The gNMI service surface and a gRPC client for it.

use async_trait::async_trait;
use http::uri::PathAndQuery;
use tonic::codec::ProstCodec;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Response, Status};

use crate::types::{
    CapabilityRequest, CapabilityResponse, GetRequest, GetResponse, SetRequest, SetResponse,
};

type StdError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The unary operations of the gNMI service.
///
/// This is the seam between state producers and the transport: anything that
/// can answer these three calls can stand in for a gNMI server connection,
/// including per-source wrappers layered over a shared [`Client`]. Metadata
/// headers ride on the [`tonic::Request`], so callers attach per-call
/// context the same way they would on a generated tonic client.
///
/// Subscribe is deliberately absent; the collector only pushes state.
#[async_trait]
pub trait GnmiClient: Send + Sync {
    /// Capability discovery: the versions and models the server supports.
    async fn capabilities(
        &self,
        request: Request<CapabilityRequest>,
    ) -> Result<Response<CapabilityResponse>, Status>;

    /// Retrieve a snapshot of state at the requested paths.
    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status>;

    /// Apply deletes, replacements and updates to the server's state tree.
    async fn set(&self, request: Request<SetRequest>) -> Result<Response<SetResponse>, Status>;
}

/// A gNMI client over a gRPC channel.
///
/// Written the way tonic's generated clients are, but behind the
/// [`GnmiClient`] trait and callable through a shared reference: each call
/// clones the underlying channel handle, which is the cheap, intended way to
/// multiplex a tonic channel across tasks.
#[derive(Debug, Clone)]
pub struct Client {
    inner: tonic::client::Grpc<Channel>,
}

impl Client {
    /// Connects to a gNMI server at `dst`, e.g. `"http://localhost:6030"`.
    pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
    where
        D: TryInto<Endpoint>,
        D::Error: Into<StdError>,
    {
        let conn = Endpoint::new(dst)?.connect().await?;
        Ok(Self::new(conn))
    }

    /// Wraps an already-established channel.
    pub fn new(channel: Channel) -> Self {
        Client {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    async fn unary<M1, M2>(
        &self,
        request: Request<M1>,
        path: &'static str,
    ) -> Result<Response<M2>, Status>
    where
        M1: prost::Message + Send + Sync + 'static,
        M2: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.inner.clone();
        grpc.ready()
            .await
            .map_err(|e| Status::unknown(format!("service was not ready: {}", e)))?;
        let codec: ProstCodec<M1, M2> = ProstCodec::default();
        grpc.unary(request, PathAndQuery::from_static(path), codec)
            .await
    }
}

#[async_trait]
impl GnmiClient for Client {
    async fn capabilities(
        &self,
        request: Request<CapabilityRequest>,
    ) -> Result<Response<CapabilityResponse>, Status> {
        self.unary(request, "/gnmi.gNMI/Capabilities").await
    }

    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        self.unary(request, "/gnmi.gNMI/Get").await
    }

    async fn set(&self, request: Request<SetRequest>) -> Result<Response<SetResponse>, Status> {
        self.unary(request, "/gnmi.gNMI/Set").await
    }
}
