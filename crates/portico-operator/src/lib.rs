//! Portico operator: wires the gateway controller into a kube runtime

#![deny(missing_docs)]

/// Builds the Gateway controller future
pub mod controller_runner;
/// Startup utilities (CRD install)
pub mod startup;
