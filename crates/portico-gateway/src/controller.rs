//! Gateway reconciliation controller
//!
//! One pass walks [`STAGES`](crate::pipeline::STAGES) in order:
//! 1. Sub-object stages converge everything [`compile`] synthesized
//! 2. Status aggregates the workload and its replicas
//! 3. Leader labels exactly one replica for the management service
//! 4. Content drift records the repository head
//!
//! The first failing stage aborts the pass; every stage is idempotent so the
//! retry starts over from the top. A failed status write is not an error: the
//! pass ends with a short requeue instead.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use portico_bundle::{IdGenerator, RandomIds};
use portico_common::crd::{Gateway, GatewayPhase, GatewayStatus};
use portico_common::events::{actions, reasons};
use portico_common::kube_utils::{default_labels, label_selector};
use portico_common::{Error, EventPublisher, KubeEventPublisher, OPERATOR_NAME};

use crate::client::{GatewayKubeClient, GatewayKubeClientImpl};
use crate::compiler::{compile, CompiledGateway};
use crate::converge::{converge, Convergence};
use crate::drift::{detect_drift, ContentSource, GitContentSource};
use crate::leader;
use crate::object::{ManagedObject, ObjectKind};
use crate::pipeline::{Stage, STAGES};
use crate::status::aggregate;

/// Requeue intervals
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// After a clean pass
    pub steady_requeue: Duration,
    /// After a failed status write
    pub status_retry: Duration,
    /// After a failed pass or a missing precondition
    pub error_requeue: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            steady_requeue: Duration::from_secs(30),
            status_retry: Duration::from_secs(10),
            error_requeue: Duration::from_secs(10),
        }
    }
}

/// Context for the gateway controller
pub struct GatewayContext {
    /// Kubernetes access
    pub kube: Arc<dyn GatewayKubeClient>,
    /// Repository head lookups
    pub content: Arc<dyn ContentSource>,
    /// Event publisher
    pub events: Arc<dyn EventPublisher>,
    /// Bundle item identifiers
    pub ids: Arc<dyn IdGenerator>,
    /// Requeue intervals
    pub config: ControllerConfig,
}

impl GatewayContext {
    /// Create a context from its parts
    pub fn new(
        kube: Arc<dyn GatewayKubeClient>,
        content: Arc<dyn ContentSource>,
        events: Arc<dyn EventPublisher>,
        ids: Arc<dyn IdGenerator>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            kube,
            content,
            events,
            ids,
            config,
        }
    }

    /// Production context: API server access, git polling, random bundle ids
    pub fn from_client(client: Client, field_manager: &str, config: ControllerConfig) -> Self {
        Self {
            kube: Arc::new(GatewayKubeClientImpl::with_field_manager(
                client.clone(),
                field_manager,
            )),
            content: Arc::new(GitContentSource),
            events: Arc::new(KubeEventPublisher::new(client, OPERATOR_NAME)),
            ids: Arc::new(RandomIds),
            config,
        }
    }

    /// Create a context for testing. The content source has no
    /// expectations; tests exercising drift replace it.
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn GatewayKubeClient>) -> Self {
        Self {
            kube,
            content: Arc::new(crate::drift::MockContentSource::new()),
            events: Arc::new(portico_common::NoopEventPublisher),
            ids: Arc::new(portico_bundle::SequentialIds::default()),
            config: ControllerConfig::default(),
        }
    }
}

/// How a stage ended
enum StageResult {
    Done,
    /// A status write failed; stop and retry shortly
    StatusRetry,
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Reconcile a Gateway
#[instrument(skip(gateway, ctx), fields(gateway = %gateway.name_any()))]
pub async fn reconcile(gateway: Arc<Gateway>, ctx: Arc<GatewayContext>) -> Result<Action, Error> {
    let name = gateway.name_any();
    let Some(namespace) = gateway.namespace() else {
        error!("gateway is missing a namespace");
        return Ok(Action::await_change());
    };
    info!("reconciling gateway");

    if let Err(e) = gateway.spec.validate(&name) {
        warn!(error = %e, "gateway validation failed");
        return Ok(Action::await_change());
    }

    let reference = gateway.object_ref(&());
    if let Some((reason, note)) = missing_precondition(&gateway, &namespace, &ctx).await? {
        error!(reason, note = %note, "precondition not met, not converging");
        ctx.events
            .publish(&reference, EventType::Warning, reason, actions::RECONCILE, Some(note))
            .await;
        return Ok(Action::requeue(ctx.config.error_requeue));
    }

    let compiled = compile(&gateway, ctx.ids.as_ref())?;
    let mut current = gateway.as_ref().clone();

    for stage in STAGES {
        if !stage.enabled(&gateway.spec) {
            continue;
        }
        debug!(%stage, "running stage");

        let result = match stage {
            Stage::ConfigMaps
            | Stage::Secret
            | Stage::Services
            | Stage::ManagementService
            | Stage::Ingress
            | Stage::Autoscaler
            | Stage::Workload => {
                converge_stage(stage, &compiled, &reference, &ctx).await?;
                StageResult::Done
            }
            Stage::Status => update_status(&mut current, &namespace, &reference, &ctx).await?,
            Stage::Leader => designate_leader(&mut current, &namespace, &reference, &ctx).await?,
            Stage::ContentDrift => poll_content(&mut current, &reference, &ctx).await?,
        };

        if let StageResult::StatusRetry = result {
            return Ok(Action::requeue(ctx.config.status_retry));
        }
    }

    debug!("gateway converged");
    Ok(Action::requeue(ctx.config.steady_requeue))
}

/// Error policy for the gateway controller
///
/// Retryable errors requeue after the error interval; validation and
/// serialization errors wait for a spec change.
pub fn error_policy(gateway: Arc<Gateway>, error: &Error, ctx: Arc<GatewayContext>) -> Action {
    error!(
        ?error,
        gateway = %gateway.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(ctx.config.error_requeue)
    } else {
        Action::await_change()
    }
}

/// The first missing secret the gateway depends on, as an event reason and
/// note.
async fn missing_precondition(
    gateway: &Gateway,
    namespace: &str,
    ctx: &GatewayContext,
) -> Result<Option<(&'static str, String)>, Error> {
    let license = &gateway.spec.license.secret_name;
    if ctx
        .kube
        .get(ObjectKind::Secret, namespace, license)
        .await?
        .is_none()
    {
        return Ok(Some((
            reasons::LICENSE_MISSING,
            format!("license secret {namespace}/{license} not found"),
        )));
    }

    if !gateway.generates_management_secret() {
        let secret = gateway.management_secret_name();
        if ctx
            .kube
            .get(ObjectKind::Secret, namespace, &secret)
            .await?
            .is_none()
        {
            return Ok(Some((
                reasons::SECRET_MISSING,
                format!("management secret {namespace}/{secret} not found"),
            )));
        }
    }

    Ok(None)
}

async fn converge_stage(
    stage: Stage,
    compiled: &CompiledGateway,
    reference: &ObjectReference,
    ctx: &GatewayContext,
) -> Result<(), Error> {
    for object in compiled.objects(stage) {
        let outcome = converge(ctx.kube.as_ref(), &object).await?;
        let reason = match outcome {
            Convergence::Created => reasons::CREATED,
            Convergence::Updated => reasons::UPDATED,
            Convergence::Unchanged => continue,
        };
        let kind = object.kind();
        let name = object.name()?;
        info!(%stage, %kind, name, %outcome, "converged sub-object");
        ctx.events
            .publish(
                reference,
                EventType::Normal,
                reason,
                actions::CONVERGE,
                Some(format!("{kind} {name} {outcome}")),
            )
            .await;
    }
    Ok(())
}

/// Aggregate status from the workload and its replicas and persist it when
/// it changed.
async fn update_status(
    current: &mut Gateway,
    namespace: &str,
    reference: &ObjectReference,
    ctx: &GatewayContext,
) -> Result<StageResult, Error> {
    let name = current.name_any();
    let workload = match ctx.kube.get(ObjectKind::Workload, namespace, &name).await? {
        Some(ManagedObject::Workload(d)) => Some(d),
        _ => None,
    };
    let pods = ctx
        .kube
        .list_pods(namespace, &label_selector(&default_labels(&name)))
        .await?;

    let previous = current.status_or_default();
    let status = aggregate(
        &current.spec,
        current.metadata.generation,
        &previous,
        workload.as_ref(),
        &pods,
    );

    let became_ready = status.state == GatewayPhase::Ready && previous.state != GatewayPhase::Ready;
    let result = persist_status(current, status, ctx).await;
    if matches!(result, StageResult::Done) && became_ready {
        info!("gateway ready");
        ctx.events
            .publish(
                reference,
                EventType::Normal,
                reasons::GATEWAY_READY,
                actions::RECONCILE,
                None,
            )
            .await;
    }
    Ok(result)
}

/// Keep exactly one replica labelled for the management service and record
/// it in status.
///
/// Labels are applied before the status write. If the status write fails
/// the next pass adopts the replica already carrying the label.
async fn designate_leader(
    current: &mut Gateway,
    namespace: &str,
    reference: &ObjectReference,
    ctx: &GatewayContext,
) -> Result<StageResult, Error> {
    let pods = ctx
        .kube
        .list_pods(namespace, &label_selector(&default_labels(&current.name_any())))
        .await?;
    let recorded = current
        .status
        .as_ref()
        .and_then(|s| s.management_pod.clone());

    let decision = leader::designate(recorded.as_deref(), &pods);
    let Some(leader) = decision.leader() else {
        debug!("no replicas to designate");
        return Ok(StageResult::Done);
    };

    for (pod, labels) in leader::label_patches(leader, &pods) {
        debug!(pod = %pod, "updating leader label");
        ctx.kube.patch_pod_labels(namespace, &pod, &labels).await?;
    }

    if recorded.as_deref() == Some(leader) {
        return Ok(StageResult::Done);
    }

    info!(leader, previous = ?recorded, ?decision, "management leader designated");
    let status = GatewayStatus {
        management_pod: Some(leader.to_string()),
        ..current.status_or_default()
    };
    let result = persist_status(current, status, ctx).await;
    if matches!(result, StageResult::Done) {
        ctx.events
            .publish(
                reference,
                EventType::Normal,
                reasons::LEADER_DESIGNATED,
                actions::DESIGNATE,
                Some(format!("pod {leader} receives management traffic")),
            )
            .await;
    }
    Ok(result)
}

/// Record the repository head when it moved. The workload picks the new
/// commit up through its template annotation on the next pass.
async fn poll_content(
    current: &mut Gateway,
    reference: &ObjectReference,
    ctx: &GatewayContext,
) -> Result<StageResult, Error> {
    let url = current.spec.app.repository.url.clone();
    let latest = ctx.content.latest_version(&url).await?;
    let recorded = current.status.as_ref().and_then(|s| s.commit_id.clone());

    let Some(commit) = detect_drift(recorded.as_deref(), &latest) else {
        debug!(url = %url, commit = %latest, "repository unchanged");
        return Ok(StageResult::Done);
    };

    info!(url = %url, previous = ?recorded, commit = %commit, "repository head moved");
    let status = GatewayStatus {
        commit_id: Some(commit.clone()),
        ..current.status_or_default()
    };
    let result = persist_status(current, status, ctx).await;
    if matches!(result, StageResult::Done) {
        ctx.events
            .publish(
                reference,
                EventType::Normal,
                reasons::COMMIT_CHANGED,
                actions::POLL,
                Some(format!("repository head is now {commit}")),
            )
            .await;
    }
    Ok(result)
}

/// Write `status` unless `current` already carries it. On success `current`
/// becomes the updated gateway so later stages build on the new
/// resourceVersion.
async fn persist_status(
    current: &mut Gateway,
    status: GatewayStatus,
    ctx: &GatewayContext,
) -> StageResult {
    if current.status.as_ref() == Some(&status) {
        return StageResult::Done;
    }
    match ctx.kube.patch_status(current, &status).await {
        Ok(updated) => {
            *current = updated;
            StageResult::Done
        }
        Err(e) => {
            warn!(error = %e, conflict = e.is_conflict(), "status write failed, retrying shortly");
            StageResult::StatusRetry
        }
    }
}
