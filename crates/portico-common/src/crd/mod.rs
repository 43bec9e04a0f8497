//! Custom Resource Definitions for Portico

mod gateway;

pub use gateway::{
    App, Autoscaling, BundleCsi, BundleSource, BundleVolume, BundleVolumeConfigMap,
    ClusterProperties, ClusterProperty, CsiVolumeAttributes, Database, Gateway, GatewayCondition,
    GatewayIngress, GatewayPhase, GatewayPort, GatewayService, GatewaySpec, GatewayStatus,
    Graphman, Hazelcast, HpaSpec, IngressRuleSpec, Java, JvmHeap, License, ListenPorts,
    Management, ManagementCluster, PodResources, ReplicaState, Repository, Restman, SystemConfig,
    UpdateStrategy, UpdateStrategyType,
};
