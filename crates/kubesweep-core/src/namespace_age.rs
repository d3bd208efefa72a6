use crate::clock::Clock;
use crate::resources::creation_time;
use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::core::v1::Namespace;
use std::sync::Arc;

pub const DEFAULT_NAMESPACE_MAX_AGE_DAYS: u32 = 200;

/// Age gate for ephemeral namespaces
#[derive(Clone)]
pub struct NamespaceAgePolicy {
    clock: Arc<dyn Clock>,
    max_age: Duration,
}

impl NamespaceAgePolicy {
    pub fn new(clock: Arc<dyn Clock>, max_age_days: u32) -> Self {
        Self {
            clock,
            max_age: Duration::days(i64::from(max_age_days)),
        }
    }

    pub fn is_expired(&self, namespace: &Namespace) -> bool {
        expired(namespace, self.max_age, self.clock.now())
    }

    /// Age of the namespace, if it carries a creation timestamp
    pub fn age(&self, namespace: &Namespace) -> Option<Duration> {
        creation_time(&namespace.metadata).map(|created| self.clock.now() - created)
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}

impl std::fmt::Debug for NamespaceAgePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceAgePolicy")
            .field("max_age", &self.max_age)
            .finish()
    }
}

/// Strictly older than `max_age`. Namespaces without a creation timestamp never expire.
pub fn expired(namespace: &Namespace, max_age: Duration, now: DateTime<Utc>) -> bool {
    match creation_time(&namespace.metadata) {
        Some(created) => now - created > max_age,
        None => false,
    }
}
