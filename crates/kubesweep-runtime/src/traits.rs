use async_trait::async_trait;
use kubesweep_core::{Deployment, Namespace, Pod, Result};
use std::collections::BTreeMap;

/// Namespaced resource kinds whose finalizers the controller can strip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pod,
    Deployment,
}

impl ResourceKind {
    /// Every kind inspected when recovering a terminating namespace, in order
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Pod, ResourceKind::Deployment];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "Pod",
            ResourceKind::Deployment => "Deployment",
        }
    }

    /// REST collection path for this kind inside a namespace
    pub fn collection_path(&self, namespace: &str) -> String {
        match self {
            ResourceKind::Pod => format!("/api/v1/namespaces/{}/pods", namespace),
            ResourceKind::Deployment => {
                format!("/apis/apps/v1/namespaces/{}/deployments", namespace)
            }
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cluster operations the reconcile passes depend on
///
/// Every method may fail with a transient error; callers log it and move on
/// to the next item. Implementations: `KubeApiExecutor` (HTTP), `DryRunExecutor`
/// (logs mutations instead of issuing them) and `MockExecutor` (in-memory).
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    // --- Reads ---

    async fn list_namespaces(&self) -> Result<Vec<Namespace>>;

    /// Fetch a single namespace, used to re-read state after stripping
    async fn get_namespace(&self, name: &str) -> Result<Namespace>;

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>>;

    /// List pods matching every label in `selector`; an empty selector lists all pods
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>>;

    // --- Mutations ---

    async fn patch_deployment_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<()>;

    /// Replace `metadata.finalizers` of a namespaced resource
    async fn patch_resource_finalizers(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<()>;

    /// Replace the namespace's `spec.finalizers`
    async fn patch_namespace_finalizers(&self, name: &str, finalizers: Vec<String>) -> Result<()>;

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;

    async fn delete_namespace(&self, name: &str) -> Result<()>;
}
