//! The collector core: a concurrent inventory of network devices streaming
//! state to a gNMI-speaking configuration server.
//!
//! Devices are plugged in through the [`device`] capability traits and
//! constructed by name via the [`device::registry`]. The [`inventory`]
//! owns every admitted device: it supervises the device's
//! [`provider`] workers, beacons the device's identity and liveness
//! upstream once a second, and multiplexes all outbound traffic through
//! per-device tagged [`client`] wrappers over one shared upstream
//! connection. Managers, devices that admit and remove other devices,
//! run against the same inventory they live in.

pub mod client;
pub mod device;
pub mod inventory;
pub mod provider;

#[cfg(test)]
pub(crate) mod testutil;

/// The collector build version, stamped into the `collector-version`
/// metadata header of every registration beacon.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
