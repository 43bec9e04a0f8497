//! Management leader designation
//!
//! Exactly one replica carries the leader label, which the management
//! service selects on. The choice is sticky: a recorded leader that still
//! exists keeps the role, so administrative sessions are not moved between
//! replicas on every pass.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use portico_common::{LEADER_LABEL_KEY, LEADER_LABEL_VALUE};

/// Outcome of leader selection
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaderDecision {
    /// No replicas; nothing is labelled
    NoReplicas,
    /// The recorded leader is still present
    Keep(String),
    /// A replica already labelled as leader is adopted as the record
    Adopt(String),
    /// A new leader: the first replica in listing order
    Designate(String),
}

impl LeaderDecision {
    /// The selected pod, if any
    pub fn leader(&self) -> Option<&str> {
        match self {
            LeaderDecision::NoReplicas => None,
            LeaderDecision::Keep(name)
            | LeaderDecision::Adopt(name)
            | LeaderDecision::Designate(name) => Some(name),
        }
    }
}

/// Choose the management leader among `pods`.
pub fn designate(current: Option<&str>, pods: &[Pod]) -> LeaderDecision {
    if pods.is_empty() {
        return LeaderDecision::NoReplicas;
    }
    if let Some(current) = current {
        if pods.iter().any(|p| p.name_any() == current) {
            return LeaderDecision::Keep(current.to_string());
        }
    }
    if let Some(labelled) = pods.iter().find(|p| is_labelled(p)) {
        return LeaderDecision::Adopt(labelled.name_any());
    }
    LeaderDecision::Designate(pods[0].name_any())
}

/// Whether a pod carries the leader label
pub fn is_labelled(pod: &Pod) -> bool {
    pod.labels().get(LEADER_LABEL_KEY).map(String::as_str) == Some(LEADER_LABEL_VALUE)
}

/// Label patches that leave exactly `leader` labelled: add the label where
/// it is missing, remove it from every other replica.
pub fn label_patches(leader: &str, pods: &[Pod]) -> Vec<(String, BTreeMap<String, Option<String>>)> {
    pods.iter()
        .filter_map(|pod| {
            let name = pod.name_any();
            let value = match (name == leader, is_labelled(pod)) {
                (true, false) => Some(LEADER_LABEL_VALUE.to_string()),
                (false, true) => None,
                _ => return None,
            };
            Some((name, BTreeMap::from([(LEADER_LABEL_KEY.to_string(), value)])))
        })
        .collect()
}
