use crate::traits::{ActionExecutor, ResourceKind};
use kubesweep_core::resources::{
    namespace_phase, namespace_spec_finalizers, object_finalizers, object_name,
};
use kubesweep_core::{NamespacePhase, ObjectMeta, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one recovery attempt on a terminating namespace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StripReport {
    /// Resources whose finalizer list was patched
    pub resources_patched: usize,
    /// Resources (or listings) that failed and were skipped
    pub failures: usize,
    /// Whether the namespace's own finalizers were cleared
    pub namespace_cleared: bool,
}

/// Unblocks namespaces stuck in Terminating by removing a finalizer marker
/// whose owning controller is gone.
///
/// Contained resources are handled first, then the namespace is re-read and
/// its own `spec.finalizers` emptied if it is still terminating. Resources and
/// namespaces that no longer carry anything to strip produce no API calls.
pub struct FinalizerStripper {
    executor: Arc<dyn ActionExecutor>,
    marker: String,
}

impl FinalizerStripper {
    pub fn new(executor: Arc<dyn ActionExecutor>, marker: impl Into<String>) -> Self {
        Self {
            executor,
            marker: marker.into(),
        }
    }

    /// Run both recovery steps for `namespace`.
    ///
    /// Step-one failures are counted and logged; they never stop step two.
    pub async fn strip(&self, namespace: &str) -> StripReport {
        let mut report = StripReport::default();

        for kind in ResourceKind::ALL {
            self.strip_kind(kind, namespace, &mut report).await;
        }

        match self.clear_namespace(namespace).await {
            Ok(cleared) => report.namespace_cleared = cleared,
            Err(e) => {
                warn!(namespace, error = %e, "Failed to clear namespace finalizers");
                report.failures += 1;
            }
        }

        report
    }

    async fn strip_kind(&self, kind: ResourceKind, namespace: &str, report: &mut StripReport) {
        let metas = match self.list_metadata(kind, namespace).await {
            Ok(m) => m,
            Err(e) => {
                warn!(namespace, %kind, error = %e, "Failed to list resources");
                report.failures += 1;
                return;
            }
        };

        for meta in metas {
            let Some(remaining) = without_marker(object_finalizers(&meta), &self.marker) else {
                continue;
            };
            let name = object_name(&meta);

            info!(namespace, %kind, name, marker = %self.marker, "Removing finalizer");
            match self
                .executor
                .patch_resource_finalizers(kind, namespace, name, remaining)
                .await
            {
                Ok(()) => report.resources_patched += 1,
                Err(e) => {
                    warn!(namespace, %kind, name, error = %e, "Failed to remove finalizer");
                    report.failures += 1;
                }
            }
        }
    }

    async fn list_metadata(&self, kind: ResourceKind, namespace: &str) -> Result<Vec<ObjectMeta>> {
        Ok(match kind {
            ResourceKind::Pod => self
                .executor
                .list_pods(namespace, &BTreeMap::new())
                .await?
                .into_iter()
                .map(|p| p.metadata)
                .collect(),
            ResourceKind::Deployment => self
                .executor
                .list_deployments(namespace)
                .await?
                .into_iter()
                .map(|d| d.metadata)
                .collect(),
        })
    }

    /// Re-read the namespace and empty `spec.finalizers` if it is still terminating
    async fn clear_namespace(&self, namespace: &str) -> Result<bool> {
        let ns = self.executor.get_namespace(namespace).await?;

        if namespace_phase(&ns) != NamespacePhase::Terminating {
            debug!(namespace, "Namespace no longer terminating");
            return Ok(false);
        }
        if namespace_spec_finalizers(&ns).is_empty() {
            debug!(namespace, "Namespace has no finalizers left");
            return Ok(false);
        }

        info!(
            namespace,
            finalizers = ?namespace_spec_finalizers(&ns),
            "Clearing namespace finalizers"
        );
        self.executor
            .patch_namespace_finalizers(namespace, Vec::new())
            .await?;
        Ok(true)
    }
}

/// `finalizers` minus every occurrence of `marker`, or `None` if the marker is
/// absent and nothing needs patching. Other entries keep their order.
pub fn without_marker(finalizers: &[String], marker: &str) -> Option<Vec<String>> {
    if !finalizers.iter().any(|f| f == marker) {
        return None;
    }
    Some(
        finalizers
            .iter()
            .filter(|f| f.as_str() != marker)
            .cloned()
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAction, MockExecutor};
    use k8s_openapi::api::core::v1::{NamespaceSpec, NamespaceStatus};
    use kubesweep_core::{Deployment, Namespace, Pod};

    const MARKER: &str = "example.com/cleanup";

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn terminating_namespace(name: &str, finalizers: &[&str]) -> Namespace {
        let mut ns = Namespace::default();
        ns.metadata.name = Some(name.to_string());
        ns.spec = Some(NamespaceSpec {
            finalizers: Some(strings(finalizers)),
        });
        ns.status = Some(NamespaceStatus {
            phase: Some("Terminating".to_string()),
            ..Default::default()
        });
        ns
    }

    fn pod_with_finalizers(namespace: &str, name: &str, finalizers: &[&str]) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some(namespace.to_string());
        pod.metadata.finalizers = Some(strings(finalizers));
        pod
    }

    fn deployment_with_finalizers(namespace: &str, name: &str, finalizers: &[&str]) -> Deployment {
        let mut deployment = Deployment::default();
        deployment.metadata.name = Some(name.to_string());
        deployment.metadata.namespace = Some(namespace.to_string());
        deployment.metadata.finalizers = Some(strings(finalizers));
        deployment
    }

    #[test]
    fn test_without_marker_preserves_others() {
        assert_eq!(
            without_marker(&strings(&["a", MARKER, "b"]), MARKER),
            Some(strings(&["a", "b"]))
        );
        assert_eq!(without_marker(&strings(&["a", "b"]), MARKER), None);
        assert_eq!(without_marker(&[], MARKER), None);
        assert_eq!(without_marker(&strings(&[MARKER]), MARKER), Some(vec![]));
    }

    #[tokio::test]
    async fn test_strips_pod_then_namespace() {
        let mock = Arc::new(MockExecutor::new());
        mock.add_namespace(terminating_namespace("ns-stuck", &["kubernetes"]))
            .await;
        mock.add_pod(pod_with_finalizers("ns-stuck", "worker", &[MARKER]))
            .await;

        let stripper = FinalizerStripper::new(mock.clone(), MARKER);
        let report = stripper.strip("ns-stuck").await;

        assert_eq!(
            report,
            StripReport {
                resources_patched: 1,
                failures: 0,
                namespace_cleared: true,
            }
        );
        assert_eq!(
            mock.actions().await,
            vec![
                MockAction::PatchFinalizers {
                    kind: ResourceKind::Pod,
                    namespace: "ns-stuck".to_string(),
                    name: "worker".to_string(),
                    finalizers: vec![],
                },
                MockAction::PatchNamespaceFinalizers {
                    name: "ns-stuck".to_string(),
                    finalizers: vec![],
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_other_finalizers_untouched() {
        let mock = Arc::new(MockExecutor::new());
        mock.add_namespace(terminating_namespace("ns-stuck", &[]))
            .await;
        mock.add_deployment(deployment_with_finalizers(
            "ns-stuck",
            "web",
            &["keep.me/first", MARKER, "keep.me/second"],
        ))
        .await;
        mock.add_pod(pod_with_finalizers("ns-stuck", "clean", &["keep.me/first"]))
            .await;

        let stripper = FinalizerStripper::new(mock.clone(), MARKER);
        let report = stripper.strip("ns-stuck").await;

        assert_eq!(report.resources_patched, 1);
        assert!(!report.namespace_cleared);
        let deployment = mock.deployment("ns-stuck", "web").await.unwrap();
        assert_eq!(
            deployment.metadata.finalizers,
            Some(strings(&["keep.me/first", "keep.me/second"]))
        );
        let pod = mock.pod("ns-stuck", "clean").await.unwrap();
        assert_eq!(pod.metadata.finalizers, Some(strings(&["keep.me/first"])));
    }

    #[tokio::test]
    async fn test_second_run_is_a_noop() {
        let mock = Arc::new(MockExecutor::new());
        mock.add_namespace(terminating_namespace("ns-stuck", &["kubernetes"]))
            .await;
        mock.add_pod(pod_with_finalizers("ns-stuck", "worker", &[MARKER]))
            .await;

        let stripper = FinalizerStripper::new(mock.clone(), MARKER);
        stripper.strip("ns-stuck").await;
        let after_first = mock.actions().await.len();

        let report = stripper.strip("ns-stuck").await;
        assert_eq!(report, StripReport::default());
        assert_eq!(mock.actions().await.len(), after_first);
    }

    #[tokio::test]
    async fn test_resource_failure_does_not_block_namespace() {
        let mock = Arc::new(MockExecutor::new());
        mock.add_namespace(terminating_namespace("ns-stuck", &["kubernetes"]))
            .await;
        mock.add_pod(pod_with_finalizers("ns-stuck", "bad", &[MARKER]))
            .await;
        mock.add_pod(pod_with_finalizers("ns-stuck", "good", &[MARKER]))
            .await;
        mock.fail_on("patch_finalizers", "ns-stuck/bad").await;

        let stripper = FinalizerStripper::new(mock.clone(), MARKER);
        let report = stripper.strip("ns-stuck").await;

        assert_eq!(report.resources_patched, 1);
        assert_eq!(report.failures, 1);
        assert!(report.namespace_cleared);
        let good = mock.pod("ns-stuck", "good").await.unwrap();
        assert_eq!(good.metadata.finalizers, Some(vec![]));
    }

    #[tokio::test]
    async fn test_listing_failure_moves_on_to_next_kind() {
        let mock = Arc::new(MockExecutor::new());
        mock.add_namespace(terminating_namespace("ns-stuck", &["kubernetes"]))
            .await;
        mock.add_deployment(deployment_with_finalizers("ns-stuck", "web", &[MARKER]))
            .await;
        mock.fail_on("list_pods", "ns-stuck").await;

        let stripper = FinalizerStripper::new(mock.clone(), MARKER);
        let report = stripper.strip("ns-stuck").await;

        assert_eq!(report.failures, 1);
        assert_eq!(report.resources_patched, 1);
        assert!(report.namespace_cleared);
    }

    #[tokio::test]
    async fn test_namespace_that_became_active_is_left_alone() {
        let mock = Arc::new(MockExecutor::new());
        let mut ns = terminating_namespace("ns-back", &["kubernetes"]);
        ns.status = Some(NamespaceStatus {
            phase: Some("Active".to_string()),
            ..Default::default()
        });
        mock.add_namespace(ns).await;

        let report = FinalizerStripper::new(mock.clone(), MARKER)
            .strip("ns-back")
            .await;
        assert!(!report.namespace_cleared);
        assert!(mock.actions().await.is_empty());
    }

    #[tokio::test]
    async fn test_vanished_namespace_counts_as_failure() {
        let mock = Arc::new(MockExecutor::new());
        let report = FinalizerStripper::new(mock.clone(), MARKER)
            .strip("gone")
            .await;
        assert_eq!(report.failures, 1);
        assert!(mock.actions().await.is_empty());
    }
}
