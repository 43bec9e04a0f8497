//! Common types for Portico: the Gateway CRD, errors, and Kubernetes helpers

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod kube_utils;

pub use error::Error;
pub use events::{EventPublisher, KubeEventPublisher, NoopEventPublisher};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Name written into `app.kubernetes.io/managed-by` and `created-by` labels
pub const OPERATOR_NAME: &str = "portico-operator";

/// Field manager used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "portico-operator";

/// Pod label that marks the replica receiving administrative traffic
pub const LEADER_LABEL_KEY: &str = "management-access";

/// Value of [`LEADER_LABEL_KEY`] on the designated leader pod
pub const LEADER_LABEL_VALUE: &str = "leader";
