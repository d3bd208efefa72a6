use crate::stripper::FinalizerStripper;
use crate::traits::ActionExecutor;
use kubesweep_core::resources::{
    deletion_requested, deployment_selector, label_selector_string, namespace_phase,
    namespace_spec_finalizers, object_name, pod_phase, pod_start_time,
};
use kubesweep_core::{Deployment, Namespace, NamespacePhase, Policies, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The three periodic cleanup tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    /// Scale deployments with long-pending pods to zero and delete stale pods
    Cleanup,
    /// Strip leftover finalizers from namespaces stuck in Terminating
    Recovery,
    /// Delete namespaces past their maximum age
    Expiry,
}

impl Task {
    pub const ALL: [Task; 3] = [Task::Cleanup, Task::Recovery, Task::Expiry];

    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Cleanup => "cleanup",
            Task::Recovery => "recovery",
            Task::Expiry => "expiry",
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counters for a single reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub namespaces_checked: usize,
    pub deployments_scaled: usize,
    pub pods_deleted: usize,
    pub finalizers_removed: usize,
    pub namespaces_deleted: usize,
    /// Items skipped because an API call failed
    pub failures: usize,
}

/// Runs the cleanup policies against a fresh cluster snapshot
///
/// Each pass lists namespaces once, keeps the ones the matcher selects and
/// decides everything against that listing. A failure on one namespace,
/// deployment or pod is logged and counted; the pass carries on with the next
/// item. Only a failed initial namespace listing ends a pass early.
pub struct Reconciler {
    executor: Arc<dyn ActionExecutor>,
    policies: Arc<Policies>,
    stripper: FinalizerStripper,
}

impl Reconciler {
    pub fn new(executor: Arc<dyn ActionExecutor>, policies: Arc<Policies>) -> Self {
        let stripper = FinalizerStripper::new(executor.clone(), policies.finalizer_marker.clone());
        Self {
            executor,
            policies,
            stripper,
        }
    }

    pub async fn run_task(&self, task: Task) -> Result<PassReport> {
        match task {
            Task::Cleanup => self.cleanup_workloads().await,
            Task::Recovery => self.recover_stuck_namespaces().await,
            Task::Expiry => self.expire_namespaces().await,
        }
    }

    /// Snapshot of every namespace the matcher selects
    async fn matched_namespaces(&self) -> Result<Vec<Namespace>> {
        let namespaces = self.executor.list_namespaces().await?;
        let matched: Vec<Namespace> = namespaces
            .into_iter()
            .filter(|ns| self.policies.matcher.matches(object_name(&ns.metadata)))
            .collect();

        debug!(
            namespaces = ?matched.iter().map(|ns| object_name(&ns.metadata)).collect::<Vec<_>>(),
            "Namespaces in scope"
        );
        Ok(matched)
    }

    // --- Workload cleanup ---

    pub async fn cleanup_workloads(&self) -> Result<PassReport> {
        let mut report = PassReport::default();

        for ns in self.matched_namespaces().await? {
            let namespace = object_name(&ns.metadata);
            report.namespaces_checked += 1;

            let deployments = match self.executor.list_deployments(namespace).await {
                Ok(d) => d,
                Err(e) => {
                    error!(namespace, error = %e, "Failed to list deployments");
                    report.failures += 1;
                    continue;
                }
            };

            for deployment in &deployments {
                self.cleanup_deployment(namespace, deployment, &mut report)
                    .await;
            }
        }

        info!(
            namespaces = report.namespaces_checked,
            scaled = report.deployments_scaled,
            pods_deleted = report.pods_deleted,
            failures = report.failures,
            "Workload cleanup pass complete"
        );
        Ok(report)
    }

    async fn cleanup_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
        report: &mut PassReport,
    ) {
        let name = object_name(&deployment.metadata);
        let selector = deployment_selector(deployment);
        if selector.is_empty() {
            warn!(
                namespace,
                deployment = name,
                "Deployment has no selector.matchLabels, skipping"
            );
            return;
        }

        let pods = match self.executor.list_pods(namespace, &selector).await {
            Ok(p) => p,
            Err(e) => {
                error!(
                    namespace,
                    deployment = name,
                    selector = %label_selector_string(&selector),
                    error = %e,
                    "Failed to list pods"
                );
                report.failures += 1;
                return;
            }
        };

        let health = &self.policies.pod_health;

        // One long-pending pod is enough to scale the whole deployment down
        if let Some(pod) = pods.iter().find(|p| health.is_pending_too_long(p)) {
            warn!(
                namespace,
                deployment = name,
                pod = object_name(&pod.metadata),
                threshold_minutes = health.pending_threshold().num_minutes(),
                "Pod pending too long, scaling deployment to 0"
            );
            match self
                .executor
                .patch_deployment_replicas(namespace, name, 0)
                .await
            {
                Ok(()) => {
                    info!(namespace, deployment = name, "Deployment scaled to 0");
                    report.deployments_scaled += 1;
                }
                Err(e) => {
                    error!(namespace, deployment = name, error = %e, "Failed to scale deployment");
                    report.failures += 1;
                }
            }
        }

        for pod in &pods {
            let pod_name = object_name(&pod.metadata);
            if !health.is_stale_non_running(pod) {
                debug!(
                    namespace,
                    pod = pod_name,
                    phase = %pod_phase(pod),
                    "Pod does not need deletion"
                );
                continue;
            }

            info!(
                namespace,
                pod = pod_name,
                phase = %pod_phase(pod),
                started = ?pod_start_time(pod),
                threshold_hours = health.stale_threshold().num_hours(),
                "Deleting pod that has not been running past the threshold"
            );
            match self.executor.delete_pod(namespace, pod_name).await {
                Ok(()) => {
                    info!(namespace, pod = pod_name, "Pod deleted");
                    report.pods_deleted += 1;
                }
                Err(e) => {
                    error!(namespace, pod = pod_name, error = %e, "Failed to delete pod");
                    report.failures += 1;
                }
            }
        }
    }

    // --- Stuck-namespace recovery ---

    pub async fn recover_stuck_namespaces(&self) -> Result<PassReport> {
        let mut report = PassReport::default();

        for ns in self.matched_namespaces().await? {
            report.namespaces_checked += 1;
            if namespace_phase(&ns) != NamespacePhase::Terminating {
                continue;
            }

            let namespace = object_name(&ns.metadata);
            info!(namespace, "Namespace stuck in Terminating, removing finalizers");

            let strip = self.stripper.strip(namespace).await;
            report.finalizers_removed += strip.resources_patched;
            if strip.namespace_cleared {
                report.finalizers_removed += 1;
            }
            report.failures += strip.failures;
        }

        info!(
            namespaces = report.namespaces_checked,
            finalizers_removed = report.finalizers_removed,
            failures = report.failures,
            "Stuck-namespace recovery pass complete"
        );
        Ok(report)
    }

    // --- Namespace expiry ---

    pub async fn expire_namespaces(&self) -> Result<PassReport> {
        let mut report = PassReport::default();
        let age_policy = &self.policies.namespace_age;

        for ns in self.matched_namespaces().await? {
            let namespace = object_name(&ns.metadata);
            report.namespaces_checked += 1;

            if deletion_requested(&ns.metadata) {
                // Already being deleted: only help it along, never gate on age
                let finalizers = namespace_spec_finalizers(&ns);
                if finalizers.is_empty() {
                    debug!(namespace, "Deletion in progress, nothing to strip");
                    continue;
                }

                info!(namespace, ?finalizers, "Deletion pending, clearing namespace finalizers");
                match self
                    .executor
                    .patch_namespace_finalizers(namespace, Vec::new())
                    .await
                {
                    Ok(()) => report.finalizers_removed += 1,
                    Err(e) => {
                        error!(namespace, error = %e, "Failed to clear namespace finalizers");
                        report.failures += 1;
                    }
                }
                continue;
            }

            if !age_policy.is_expired(&ns) {
                continue;
            }

            info!(
                namespace,
                age_days = age_policy.age(&ns).map(|a| a.num_days()),
                max_age_days = age_policy.max_age().num_days(),
                "Namespace expired, requesting deletion"
            );
            match self.executor.delete_namespace(namespace).await {
                Ok(()) => report.namespaces_deleted += 1,
                Err(e) => {
                    error!(namespace, error = %e, "Failed to delete namespace");
                    report.failures += 1;
                }
            }
        }

        info!(
            namespaces = report.namespaces_checked,
            deleted = report.namespaces_deleted,
            finalizers_removed = report.finalizers_removed,
            failures = report.failures,
            "Namespace expiry pass complete"
        );
        Ok(report)
    }
}
