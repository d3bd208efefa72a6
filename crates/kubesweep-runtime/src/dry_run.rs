use crate::traits::{ActionExecutor, ResourceKind};
use async_trait::async_trait;
use kubesweep_core::{Deployment, Namespace, Pod, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Passes reads through to the wrapped executor and only logs mutations
pub struct DryRunExecutor {
    inner: Arc<dyn ActionExecutor>,
}

impl DryRunExecutor {
    pub fn new(inner: Arc<dyn ActionExecutor>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ActionExecutor for DryRunExecutor {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        self.inner.list_namespaces().await
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        self.inner.get_namespace(name).await
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>> {
        self.inner.list_deployments(namespace).await
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        self.inner.list_pods(namespace, selector).await
    }

    async fn patch_deployment_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<()> {
        info!(namespace, deployment = name, replicas, "[dry-run] would scale deployment");
        Ok(())
    }

    async fn patch_resource_finalizers(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<()> {
        info!(
            namespace,
            %kind,
            name,
            ?finalizers,
            "[dry-run] would patch finalizers"
        );
        Ok(())
    }

    async fn patch_namespace_finalizers(&self, name: &str, finalizers: Vec<String>) -> Result<()> {
        info!(namespace = name, ?finalizers, "[dry-run] would patch namespace finalizers");
        Ok(())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        info!(namespace, pod = name, "[dry-run] would delete pod");
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        info!(namespace = name, "[dry-run] would delete namespace");
        Ok(())
    }
}
