//! A small gNMI implementation: the wire messages used by the telemetry
//! protocol and a client for talking to a gNMI server over gRPC.
//!
//! The message types in [`types`] are hand-annotated [`prost`] messages
//! carrying the field tags of the upstream `gnmi.proto`, so they stay
//! wire-compatible with servers that speak the standard encoding. The
//! [`client::GnmiClient`] trait is the seam consumers program against; the
//! concrete [`client::Client`] speaks gRPC over a tonic channel.

pub mod client;
pub mod types;

pub use client::{Client, GnmiClient};
pub use types::{
    CapabilityRequest, CapabilityResponse, GetRequest, GetResponse, Notification, Path, PathElem,
    SetRequest, SetResponse, TypedValue, Update, UpdateOperation, UpdateResult,
};
