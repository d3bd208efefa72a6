use crate::traits::{ActionExecutor, ResourceKind};
use async_trait::async_trait;
use kubesweep_core::resources::label_selector_string;
use kubesweep_core::{Deployment, Namespace, Pod, Result, SweepError};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const MERGE_PATCH: &str = "application/merge-patch+json";

/// In-cluster service account token
pub const IN_CLUSTER_TOKEN_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// In-cluster API server CA bundle
pub const IN_CLUSTER_CA_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Connection settings for the Kubernetes API server
#[derive(Debug, Clone)]
pub struct KubeApiConfig {
    /// API server URL (e.g., "https://kubernetes.default.svc")
    pub api_url: String,
    /// Bearer token sent with every request
    pub token: Option<String>,
    /// PEM bundle trusted in addition to the system roots
    pub ca_pem: Option<Vec<u8>>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl KubeApiConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            token: None,
            ca_pem: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Read the bearer token from `path`
    pub fn with_token_file(mut self, path: &Path) -> Result<Self> {
        let token = std::fs::read_to_string(path).map_err(|e| {
            SweepError::invalid_config(
                format!("failed to read token file '{}': {}", path.display(), e),
                "Point --token-file at a readable service account token",
            )
        })?;
        self.token = Some(token.trim().to_string());
        Ok(self)
    }

    /// Read the CA bundle from `path`
    pub fn with_ca_file(mut self, path: &Path) -> Result<Self> {
        let pem = std::fs::read(path).map_err(|e| {
            SweepError::invalid_config(
                format!("failed to read CA file '{}': {}", path.display(), e),
                "Point --ca-file at the PEM bundle of the API server",
            )
        })?;
        self.ca_pem = Some(pem);
        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// [`ActionExecutor`] backed by the Kubernetes REST API
pub struct KubeApiExecutor {
    base_url: String,
    client: Client,
    token: Option<String>,
}

impl KubeApiExecutor {
    pub fn new(config: KubeApiConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.timeout);

        if let Some(pem) = &config.ca_pem {
            let cert = reqwest::Certificate::from_pem(pem).map_err(|e| {
                SweepError::invalid_config(
                    format!("invalid CA certificate: {}", e),
                    "The CA file must contain PEM encoded certificates",
                )
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build().map_err(|e| {
            SweepError::invalid_config(
                format!("failed to build HTTP client: {}", e),
                "Check the TLS settings",
            )
        })?;

        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            client,
            token: config.token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let builder = self.client.request(method, &url);
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => builder,
        }
    }

    /// Send a request and map non-success statuses onto [`SweepError`]
    async fn send(
        &self,
        operation: &str,
        resource: &str,
        req: RequestBuilder,
    ) -> Result<Response> {
        let resp = req.send().await.map_err(|e| {
            SweepError::api_request(operation, format!("HTTP request failed: {}", e))
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(SweepError::not_found(resource));
        }

        let body = resp.text().await.unwrap_or_default();
        Err(SweepError::api_request(
            operation,
            format!("status {}: {}", status, body),
        ))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        resource: &str,
        req: RequestBuilder,
    ) -> Result<T> {
        let resp = self.send(operation, resource, req).await?;
        resp.json::<T>().await.map_err(|e| {
            SweepError::api_request(operation, format!("failed to parse response: {}", e))
        })
    }

    async fn merge_patch(
        &self,
        operation: &str,
        resource: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<()> {
        let req = self
            .request(reqwest::Method::PATCH, path)
            .header(CONTENT_TYPE, MERGE_PATCH)
            .body(body.to_string());
        self.send(operation, resource, req).await?;
        Ok(())
    }
}

#[async_trait]
impl ActionExecutor for KubeApiExecutor {
    /// GET /api/v1/namespaces
    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let req = self.request(reqwest::Method::GET, "/api/v1/namespaces");
        let list: ObjectList<Namespace> =
            self.get_json("list namespaces", "namespaces", req).await?;
        Ok(list.items)
    }

    /// GET /api/v1/namespaces/{name}
    async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        let path = format!("/api/v1/namespaces/{}", name);
        let req = self.request(reqwest::Method::GET, &path);
        self.get_json("get namespace", &format!("namespaces/{}", name), req)
            .await
    }

    /// GET /apis/apps/v1/namespaces/{namespace}/deployments
    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>> {
        let path = ResourceKind::Deployment.collection_path(namespace);
        let req = self.request(reqwest::Method::GET, &path);
        let list: ObjectList<Deployment> = self
            .get_json("list deployments", &format!("{}/deployments", namespace), req)
            .await?;
        Ok(list.items)
    }

    /// GET /api/v1/namespaces/{namespace}/pods?labelSelector=...
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        let path = ResourceKind::Pod.collection_path(namespace);
        let mut req = self.request(reqwest::Method::GET, &path);
        if !selector.is_empty() {
            req = req.query(&[("labelSelector", label_selector_string(selector))]);
        }
        let list: ObjectList<Pod> = self
            .get_json("list pods", &format!("{}/pods", namespace), req)
            .await?;
        Ok(list.items)
    }

    /// PATCH /apis/apps/v1/namespaces/{namespace}/deployments/{name}/scale
    async fn patch_deployment_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<()> {
        let path = format!(
            "{}/{}/scale",
            ResourceKind::Deployment.collection_path(namespace),
            name
        );
        self.merge_patch(
            "scale deployment",
            &format!("{}/deployments/{}", namespace, name),
            &path,
            json!({ "spec": { "replicas": replicas } }),
        )
        .await
    }

    /// PATCH {collection}/{name} with new metadata.finalizers
    async fn patch_resource_finalizers(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<()> {
        let path = format!("{}/{}", kind.collection_path(namespace), name);
        self.merge_patch(
            "patch finalizers",
            &format!("{}/{}/{}", namespace, kind, name),
            &path,
            json!({ "metadata": { "finalizers": finalizers } }),
        )
        .await
    }

    /// PUT /api/v1/namespaces/{name}/finalize
    ///
    /// `spec.finalizers` can only be changed through the finalize subresource,
    /// which takes the whole namespace object.
    async fn patch_namespace_finalizers(&self, name: &str, finalizers: Vec<String>) -> Result<()> {
        let mut namespace = self.get_namespace(name).await?;
        namespace.spec.get_or_insert_with(Default::default).finalizers = Some(finalizers);

        let path = format!("/api/v1/namespaces/{}/finalize", name);
        let req = self.request(reqwest::Method::PUT, &path).json(&namespace);
        self.send("finalize namespace", &format!("namespaces/{}", name), req)
            .await?;
        Ok(())
    }

    /// DELETE /api/v1/namespaces/{namespace}/pods/{name}
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let path = format!("{}/{}", ResourceKind::Pod.collection_path(namespace), name);
        let req = self.request(reqwest::Method::DELETE, &path);
        self.send("delete pod", &format!("{}/pods/{}", namespace, name), req)
            .await?;
        Ok(())
    }

    /// DELETE /api/v1/namespaces/{name}
    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let path = format!("/api/v1/namespaces/{}", name);
        let req = self.request(reqwest::Method::DELETE, &path);
        self.send("delete namespace", &format!("namespaces/{}", name), req)
            .await?;
        Ok(())
    }
}
