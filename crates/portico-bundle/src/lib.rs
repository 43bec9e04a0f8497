//! Gateway management bundles
//!
//! A bundle is an XML document in the gateway management namespace that
//! lists typed items (cluster properties, listen ports) together with one
//! mapping per item. Every mapping upserts by name, so applying a freshly
//! generated bundle twice updates the same entities even though each
//! generation draws new random identifiers.
//!
//! Identifier generation is injected through [`IdGenerator`] so output is
//! reproducible in tests, and [`equivalent`] compares two bundles while
//! ignoring identifiers so regenerated bundles do not register as drift.

#![deny(missing_docs)]

mod builder;
mod document;
mod error;
mod id;
mod inspect;

pub use builder::{
    build_port_policy_bundle, build_property_bundle, NODE_CIPHER_SUITES, NODE_TLS_VERSIONS,
};
pub use error::BundleError;
pub use id::{IdGenerator, RandomIds, SequentialIds};
pub use inspect::{equivalent, mapping_targets, strip_identifiers};

/// XML namespace of the gateway management API
pub const MANAGEMENT_NAMESPACE: &str = "http://ns.l7tech.com/2010/04/gateway-management";

/// Config map keys with this suffix hold bundles
pub const BUNDLE_KEY_SUFFIX: &str = ".bundle";
