use crate::traits::{ActionExecutor, ResourceKind};
use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::NamespaceStatus;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kubesweep_core::resources::{labels_match, object_name};
use kubesweep_core::{Deployment, Namespace, ObjectMeta, Pod, Result, SweepError};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// A mutating call that reached the mock cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockAction {
    ScaleDeployment {
        namespace: String,
        name: String,
        replicas: i32,
    },
    PatchFinalizers {
        kind: ResourceKind,
        namespace: String,
        name: String,
        finalizers: Vec<String>,
    },
    PatchNamespaceFinalizers {
        name: String,
        finalizers: Vec<String>,
    },
    DeletePod {
        namespace: String,
        name: String,
    },
    DeleteNamespace {
        name: String,
    },
}

/// Concurrency counters for `list_namespaces`, the first call of every pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingStats {
    /// Calls started so far
    pub started: usize,
    /// Calls currently waiting on the mock
    pub in_flight: usize,
    /// Highest `in_flight` seen since creation or the last reset
    pub peak_in_flight: usize,
}

#[derive(Debug, Default)]
struct MockCluster {
    namespaces: BTreeMap<String, Namespace>,
    deployments: Vec<Deployment>,
    pods: Vec<Pod>,
}

/// In-memory cluster for tests and local development
///
/// Keeps namespaces, deployments and pods in memory and applies mutations to
/// them. Every successful mutation is appended to an action log. Individual
/// operations can be made to fail with [`MockExecutor::fail_on`].
#[derive(Clone, Default)]
pub struct MockExecutor {
    cluster: Arc<RwLock<MockCluster>>,
    actions: Arc<RwLock<Vec<MockAction>>>,
    failures: Arc<RwLock<HashSet<String>>>,
    delay: Arc<RwLock<Option<Duration>>>,
    listings: Arc<RwLock<ListingStats>>,
}

fn in_namespace(meta: &ObjectMeta, namespace: &str) -> bool {
    meta.namespace.as_deref() == Some(namespace)
}

fn is_object(meta: &ObjectMeta, namespace: &str, name: &str) -> bool {
    in_namespace(meta, namespace) && meta.name.as_deref() == Some(name)
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_namespace(&self, namespace: Namespace) {
        let name = object_name(&namespace.metadata).to_string();
        self.cluster.write().await.namespaces.insert(name, namespace);
    }

    pub async fn add_deployment(&self, deployment: Deployment) {
        self.cluster.write().await.deployments.push(deployment);
    }

    pub async fn add_pod(&self, pod: Pod) {
        self.cluster.write().await.pods.push(pod);
    }

    /// Make `operation` fail for `target`.
    ///
    /// Operations: `list_namespaces`, `get_namespace`, `list_deployments`,
    /// `list_pods`, `scale`, `patch_finalizers`, `patch_namespace_finalizers`,
    /// `delete_pod`, `delete_namespace`. Targets are `namespace` or
    /// `namespace/name`; `list_namespaces` uses `*`.
    pub async fn fail_on(&self, operation: &str, target: &str) {
        self.failures
            .write()
            .await
            .insert(format!("{}:{}", operation, target));
    }

    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Make every call sleep for `delay` before answering
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write().await = delay;
    }

    pub async fn listing_stats(&self) -> ListingStats {
        *self.listings.read().await
    }

    /// Restart peak tracking from the current number of in-flight listings
    pub async fn reset_listing_peak(&self) {
        let mut stats = self.listings.write().await;
        stats.peak_in_flight = stats.in_flight;
    }

    /// Every successful mutation, in call order
    pub async fn actions(&self) -> Vec<MockAction> {
        self.actions.read().await.clone()
    }

    pub async fn namespace(&self, name: &str) -> Option<Namespace> {
        self.cluster.read().await.namespaces.get(name).cloned()
    }

    pub async fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.cluster
            .read()
            .await
            .pods
            .iter()
            .find(|p| is_object(&p.metadata, namespace, name))
            .cloned()
    }

    pub async fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.cluster
            .read()
            .await
            .deployments
            .iter()
            .find(|d| is_object(&d.metadata, namespace, name))
            .cloned()
    }

    async fn check_failure(&self, operation: &str, target: &str) -> Result<()> {
        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failures
            .read()
            .await
            .contains(&format!("{}:{}", operation, target))
        {
            return Err(SweepError::api_request(
                operation,
                format!("injected failure for {}", target),
            ));
        }
        Ok(())
    }

    async fn record(&self, action: MockAction) {
        debug!("Mock: {:?}", action);
        self.actions.write().await.push(action);
    }
}

#[async_trait]
impl ActionExecutor for MockExecutor {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        {
            let mut stats = self.listings.write().await;
            stats.started += 1;
            stats.in_flight += 1;
            stats.peak_in_flight = stats.peak_in_flight.max(stats.in_flight);
        }

        let result = match self.check_failure("list_namespaces", "*").await {
            Ok(()) => Ok(self.cluster.read().await.namespaces.values().cloned().collect()),
            Err(e) => Err(e),
        };

        self.listings.write().await.in_flight -= 1;
        result
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        self.check_failure("get_namespace", name).await?;
        self.namespace(name)
            .await
            .ok_or_else(|| SweepError::not_found(format!("namespaces/{}", name)))
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>> {
        self.check_failure("list_deployments", namespace).await?;
        Ok(self
            .cluster
            .read()
            .await
            .deployments
            .iter()
            .filter(|d| in_namespace(&d.metadata, namespace))
            .cloned()
            .collect())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        self.check_failure("list_pods", namespace).await?;
        Ok(self
            .cluster
            .read()
            .await
            .pods
            .iter()
            .filter(|p| in_namespace(&p.metadata, namespace))
            .filter(|p| labels_match(selector, p.metadata.labels.as_ref()))
            .cloned()
            .collect())
    }

    async fn patch_deployment_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<()> {
        let target = format!("{}/{}", namespace, name);
        self.check_failure("scale", &target).await?;
        {
            let mut cluster = self.cluster.write().await;
            let deployment = cluster
                .deployments
                .iter_mut()
                .find(|d| is_object(&d.metadata, namespace, name))
                .ok_or_else(|| {
                    SweepError::not_found(format!("{}/deployments/{}", namespace, name))
                })?;
            deployment.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
        }
        self.record(MockAction::ScaleDeployment {
            namespace: namespace.to_string(),
            name: name.to_string(),
            replicas,
        })
        .await;
        Ok(())
    }

    async fn patch_resource_finalizers(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<()> {
        let target = format!("{}/{}", namespace, name);
        self.check_failure("patch_finalizers", &target).await?;
        {
            let mut cluster = self.cluster.write().await;
            let meta = match kind {
                ResourceKind::Pod => cluster
                    .pods
                    .iter_mut()
                    .find(|p| is_object(&p.metadata, namespace, name))
                    .map(|p| &mut p.metadata),
                ResourceKind::Deployment => cluster
                    .deployments
                    .iter_mut()
                    .find(|d| is_object(&d.metadata, namespace, name))
                    .map(|d| &mut d.metadata),
            };
            let meta = meta.ok_or_else(|| {
                SweepError::not_found(format!("{}/{}/{}", namespace, kind, name))
            })?;
            meta.finalizers = Some(finalizers.clone());
        }
        self.record(MockAction::PatchFinalizers {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            finalizers,
        })
        .await;
        Ok(())
    }

    async fn patch_namespace_finalizers(&self, name: &str, finalizers: Vec<String>) -> Result<()> {
        self.check_failure("patch_namespace_finalizers", name).await?;
        {
            let mut cluster = self.cluster.write().await;
            let ns = cluster
                .namespaces
                .get_mut(name)
                .ok_or_else(|| SweepError::not_found(format!("namespaces/{}", name)))?;
            ns.spec.get_or_insert_with(Default::default).finalizers = Some(finalizers.clone());
        }
        self.record(MockAction::PatchNamespaceFinalizers {
            name: name.to_string(),
            finalizers,
        })
        .await;
        Ok(())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let target = format!("{}/{}", namespace, name);
        self.check_failure("delete_pod", &target).await?;
        {
            let mut cluster = self.cluster.write().await;
            let before = cluster.pods.len();
            cluster
                .pods
                .retain(|p| !is_object(&p.metadata, namespace, name));
            if cluster.pods.len() == before {
                return Err(SweepError::not_found(format!("{}/pods/{}", namespace, name)));
            }
        }
        self.record(MockAction::DeletePod {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
        .await;
        Ok(())
    }

    /// Marks the namespace Terminating, as the API server does on delete
    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.check_failure("delete_namespace", name).await?;
        {
            let mut cluster = self.cluster.write().await;
            let ns = cluster
                .namespaces
                .get_mut(name)
                .ok_or_else(|| SweepError::not_found(format!("namespaces/{}", name)))?;
            ns.metadata.deletion_timestamp = Some(Time(Utc::now()));
            ns.status = Some(NamespaceStatus {
                phase: Some("Terminating".to_string()),
                ..Default::default()
            });
        }
        self.record(MockAction::DeleteNamespace {
            name: name.to_string(),
        })
        .await;
        Ok(())
    }
}
