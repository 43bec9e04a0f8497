//! Fixed stage order of a reconciliation pass

use std::fmt;

use portico_common::crd::GatewaySpec;

/// One step of a reconciliation pass
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Environment, system properties and bundle config maps
    ConfigMaps,
    /// Generated management secret
    Secret,
    /// Traffic service
    Services,
    /// Leader-only management service
    ManagementService,
    /// Ingress
    Ingress,
    /// Autoscaler
    Autoscaler,
    /// Gateway workload
    Workload,
    /// Status aggregation
    Status,
    /// Leader designation
    Leader,
    /// Content repository polling
    ContentDrift,
}

/// Stages in execution order. Configuration exists before the workload that
/// mounts it; status is computed before the leader is (re)designated.
pub const STAGES: [Stage; 10] = [
    Stage::ConfigMaps,
    Stage::Secret,
    Stage::Services,
    Stage::ManagementService,
    Stage::Ingress,
    Stage::Autoscaler,
    Stage::Workload,
    Stage::Status,
    Stage::Leader,
    Stage::ContentDrift,
];

impl Stage {
    /// Whether the stage runs for this spec. Disabled stages make no API
    /// calls at all.
    pub fn enabled(self, spec: &GatewaySpec) -> bool {
        let app = &spec.app;
        match self {
            Stage::ConfigMaps | Stage::Workload | Stage::Status => true,
            Stage::Secret => app.management.secret_name.as_deref().map_or(true, str::is_empty),
            Stage::Services => app.service.enabled,
            Stage::ManagementService | Stage::Leader => app.management.service.enabled,
            Stage::Ingress => app.ingress.enabled,
            Stage::Autoscaler => app.autoscaling.enabled,
            Stage::ContentDrift => app.repository.enabled,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ConfigMaps => "config-maps",
            Stage::Secret => "secret",
            Stage::Services => "services",
            Stage::ManagementService => "management-service",
            Stage::Ingress => "ingress",
            Stage::Autoscaler => "autoscaler",
            Stage::Workload => "workload",
            Stage::Status => "status",
            Stage::Leader => "leader",
            Stage::ContentDrift => "content-drift",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::gateway;

    fn position(stage: Stage) -> usize {
        STAGES.iter().position(|s| *s == stage).expect("stage listed")
    }

    #[test]
    fn configuration_precedes_workload() {
        for stage in [Stage::ConfigMaps, Stage::Secret, Stage::Services, Stage::Autoscaler] {
            assert!(position(stage) < position(Stage::Workload), "{stage}");
        }
    }

    #[test]
    fn status_precedes_leader_and_drift() {
        assert!(position(Stage::Workload) < position(Stage::Status));
        assert!(position(Stage::Status) < position(Stage::Leader));
        assert!(position(Stage::Leader) < position(Stage::ContentDrift));
    }

    #[test]
    fn minimal_spec_skips_optional_stages() {
        let gw = gateway();
        let enabled: Vec<Stage> = STAGES
            .iter()
            .copied()
            .filter(|s| s.enabled(&gw.spec))
            .collect();
        assert_eq!(
            enabled,
            vec![
                Stage::ConfigMaps,
                Stage::Secret,
                Stage::Services,
                Stage::Workload,
                Stage::Status,
            ]
        );
    }
}
