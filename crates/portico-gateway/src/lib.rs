//! Gateway reconciliation for Portico
//!
//! This crate turns a Gateway CRD into running infrastructure and keeps it
//! there:
//!
//! - **Compiler**: pure synthesis of config maps, secret, services, ingress,
//!   autoscaler and workload
//! - **Converge**: create-or-update of one sub-object on controlled fields
//! - **Status**: aggregation of workload and replica state
//! - **Leader**: sticky designation of the replica behind the management
//!   service
//! - **Drift**: polling the bundle repository head
//! - **Controller**: the ordered reconciliation pass over all of the above

pub mod client;
pub mod compiler;
pub mod controller;
pub mod converge;
pub mod drift;
pub mod leader;
pub mod object;
pub mod pipeline;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{GatewayKubeClient, GatewayKubeClientImpl};
pub use controller::{error_policy, reconcile, ControllerConfig, GatewayContext};
pub use pipeline::{Stage, STAGES};
