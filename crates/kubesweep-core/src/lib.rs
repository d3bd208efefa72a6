//! Kubesweep Core - Cleanup policies for multi-tenant Kubernetes clusters
//!
//! This crate provides:
//! - Namespace selection (exclusions, allow-list, prefix-anchored patterns)
//! - Pod health predicates (pending too long, stale non-running)
//! - Namespace age predicate
//! - Immutable controller configuration and error types with miette diagnostics
//!
//! Everything here is pure: time comes from an injected [`Clock`] and no
//! function touches the cluster.

pub mod clock;
pub mod config;
pub mod error;
pub mod matcher;
pub mod namespace_age;
pub mod pod_health;
pub mod resources;

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{parse_list, Policies, SweepConfig};
pub use error::{Result, SweepError};
pub use matcher::NamespaceMatcher;
pub use namespace_age::NamespaceAgePolicy;
pub use pod_health::PodHealthPolicy;
pub use resources::{NamespacePhase, PodPhase};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::apps::v1::Deployment;
pub use k8s_openapi::api::core::v1::{Namespace, Pod};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
