//! Kubernetes Event recording for the gateway controller.
//!
//! Events are fire-and-forget: failures are logged as warnings and never
//! propagate errors. A failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Kubernetes Event on the given resource.
    ///
    /// # Arguments
    ///
    /// * `resource_ref` - The Kubernetes object this event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason string (e.g. "LeaderDesignated")
    /// * `action` - What action was taken (e.g. "Converge")
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a new publisher reporting as the given controller name.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "failed to publish Kubernetes event");
        }
    }
}

/// No-op implementation for tests.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Well-known event reason strings.
pub mod reasons {
    /// A managed sub-object was created
    pub const CREATED: &str = "Created";
    /// A managed sub-object drifted and was updated
    pub const UPDATED: &str = "Updated";
    /// The license secret referenced by the gateway does not exist
    pub const LICENSE_MISSING: &str = "LicenseMissing";
    /// The management secret referenced by the gateway does not exist
    pub const SECRET_MISSING: &str = "SecretMissing";
    /// A replica was designated as the management leader
    pub const LEADER_DESIGNATED: &str = "LeaderDesignated";
    /// The content repository moved to a new commit
    pub const COMMIT_CHANGED: &str = "CommitChanged";
    /// Every replica reports ready
    pub const GATEWAY_READY: &str = "GatewayReady";
}

/// Well-known event action strings.
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Create-or-update of a managed sub-object
    pub const CONVERGE: &str = "Converge";
    /// Leader pod labelling
    pub const DESIGNATE: &str = "Designate";
    /// Content repository polling
    pub const POLL: &str = "Poll";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
    }

    #[test]
    fn reason_constants_are_pascal_case() {
        assert_eq!(reasons::LEADER_DESIGNATED, "LeaderDesignated");
        assert_eq!(reasons::LICENSE_MISSING, "LicenseMissing");
        assert_eq!(actions::CONVERGE, "Converge");
    }

    #[tokio::test]
    async fn noop_publisher_does_not_panic() {
        let publisher = NoopEventPublisher;
        publisher
            .publish(
                &ObjectReference::default(),
                EventType::Normal,
                reasons::GATEWAY_READY,
                actions::RECONCILE,
                Some("test".to_string()),
            )
            .await;
    }
}
