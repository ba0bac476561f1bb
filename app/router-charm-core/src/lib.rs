pub mod charm;
pub mod helpers;
pub mod kubernetes;
pub mod reconciler;
pub mod relation;
pub mod resources;
pub mod workload;

pub const MULTUS_RESOURCE_GROUP: &str = "k8s.cni.cncf.io";

pub const DEFAULT_FIELD_MANAGER: &str = "router-charm";
