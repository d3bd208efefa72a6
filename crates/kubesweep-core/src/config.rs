use crate::clock::Clock;
use crate::error::{Result, SweepError};
use crate::matcher::{NamespaceMatcher, DEFAULT_EXCLUDED_NAMESPACES};
use crate::namespace_age::{NamespaceAgePolicy, DEFAULT_NAMESPACE_MAX_AGE_DAYS};
use crate::pod_health::{PodHealthPolicy, DEFAULT_PENDING_THRESHOLD, DEFAULT_STALE_THRESHOLD};
use std::sync::Arc;
use std::time::Duration;

/// Finalizer stripped from resources in wedged namespaces unless configured otherwise
pub const DEFAULT_FINALIZER_MARKER: &str = "foregroundDeletion";

/// Default namespace pattern: any name containing `std-`
pub const DEFAULT_NAMESPACE_PATTERN: &str = ".*std-.*";

/// Immutable controller configuration, built once at startup
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Namespaces added to the built-in exclusion set
    pub extra_excluded_namespaces: Vec<String>,
    /// Exact namespace names that are always in scope (unless excluded)
    pub namespace_list: Vec<String>,
    /// Prefix-anchored regular expressions selecting namespaces
    pub namespace_patterns: Vec<String>,
    /// Pending longer than this scales the owning deployment to zero
    pub pending_threshold: chrono::Duration,
    /// Started but not Running for longer than this deletes the pod
    pub stale_threshold: chrono::Duration,
    /// Namespaces older than this many days are deleted
    pub namespace_max_age_days: u32,
    /// Finalizer removed from resources in terminating namespaces
    pub finalizer_marker: String,
    /// Interval between workload cleanup passes
    pub cleanup_interval: Duration,
    /// Interval between stuck-namespace recovery passes
    pub recovery_interval: Duration,
    /// Interval between namespace expiry passes
    pub expiry_interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            extra_excluded_namespaces: Vec::new(),
            namespace_list: Vec::new(),
            namespace_patterns: vec![DEFAULT_NAMESPACE_PATTERN.to_string()],
            pending_threshold: DEFAULT_PENDING_THRESHOLD,
            stale_threshold: DEFAULT_STALE_THRESHOLD,
            namespace_max_age_days: DEFAULT_NAMESPACE_MAX_AGE_DAYS,
            finalizer_marker: DEFAULT_FINALIZER_MARKER.to_string(),
            cleanup_interval: Duration::from_secs(60 * 60),
            recovery_interval: Duration::from_secs(20 * 60),
            expiry_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl SweepConfig {
    /// Full exclusion set: the built-in system namespaces plus any extras
    pub fn excluded_namespaces(&self) -> Vec<String> {
        DEFAULT_EXCLUDED_NAMESPACES
            .iter()
            .map(|s| s.to_string())
            .chain(self.extra_excluded_namespaces.iter().cloned())
            .collect()
    }

    /// Check the values that cannot be expressed by the types alone
    pub fn validate(&self) -> Result<()> {
        if self.finalizer_marker.trim().is_empty() {
            return Err(SweepError::invalid_config(
                "finalizer marker is empty",
                "Set --finalizer-marker (FINALIZER_MARKER) to the finalizer that wedges deletions",
            ));
        }

        for (name, interval) in [
            ("cleanup", self.cleanup_interval),
            ("recovery", self.recovery_interval),
            ("expiry", self.expiry_interval),
        ] {
            if interval.is_zero() {
                return Err(SweepError::invalid_config(
                    format!("{} interval must be greater than zero", name),
                    "Use a positive number of seconds",
                ));
            }
        }

        if self.pending_threshold < chrono::Duration::zero()
            || self.stale_threshold < chrono::Duration::zero()
        {
            return Err(SweepError::invalid_config(
                "pod thresholds must not be negative",
                "Use a positive number of minutes/hours",
            ));
        }

        Ok(())
    }

    /// Validate the configuration and compile it into the policy set.
    ///
    /// A malformed namespace pattern fails here, at startup.
    pub fn policies(&self, clock: Arc<dyn Clock>) -> Result<Policies> {
        self.validate()?;

        let matcher = NamespaceMatcher::new(
            self.excluded_namespaces(),
            self.namespace_list.iter().cloned(),
            &self.namespace_patterns,
        )?;

        Ok(Policies {
            matcher,
            pod_health: PodHealthPolicy::new(
                clock.clone(),
                self.pending_threshold,
                self.stale_threshold,
            ),
            namespace_age: NamespaceAgePolicy::new(clock, self.namespace_max_age_days),
            finalizer_marker: self.finalizer_marker.clone(),
        })
    }
}

/// Every decision rule the reconcile passes consult, compiled from [`SweepConfig`]
#[derive(Debug, Clone)]
pub struct Policies {
    pub matcher: NamespaceMatcher,
    pub pod_health: PodHealthPolicy,
    pub namespace_age: NamespaceAgePolicy,
    pub finalizer_marker: String,
}

/// Split a comma-separated list, trimming entries and dropping empty ones
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    #[test]
    fn test_parse_list_trims_and_drops_empty() {
        assert_eq!(
            parse_list(" std-.*, review-.* ,,"),
            vec!["std-.*".to_string(), "review-.*".to_string()]
        );
        assert!(parse_list("").is_empty());
        assert!(parse_list(" , ").is_empty());
    }

    #[test]
    fn test_default_config_builds() {
        let policies = SweepConfig::default()
            .policies(Arc::new(SystemClock))
            .unwrap();
        assert!(policies.matcher.matches("team-std-preview"));
        assert!(!policies.matcher.matches("kube-system"));
        assert_eq!(policies.finalizer_marker, DEFAULT_FINALIZER_MARKER);
        assert_eq!(policies.namespace_age.max_age(), chrono::Duration::days(200));
    }

    #[test]
    fn test_extra_exclusions_are_added_to_defaults() {
        let config = SweepConfig {
            extra_excluded_namespaces: vec!["default".to_string()],
            namespace_patterns: vec![".*".to_string()],
            ..Default::default()
        };
        let excluded = config.excluded_namespaces();
        assert!(excluded.contains(&"kube-system".to_string()));
        assert!(excluded.contains(&"default".to_string()));

        let policies = config.policies(Arc::new(SystemClock)).unwrap();
        assert!(!policies.matcher.matches("default"));
        assert!(policies.matcher.matches("anything"));
    }

    #[test]
    fn test_bad_pattern_is_fatal() {
        let config = SweepConfig {
            namespace_patterns: vec!["std-[".to_string()],
            ..Default::default()
        };
        let err = config.policies(Arc::new(SystemClock)).unwrap_err();
        assert!(matches!(err, SweepError::InvalidPattern { .. }));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let config = SweepConfig {
            recovery_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SweepError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_empty_marker_is_rejected() {
        let config = SweepConfig {
            finalizer_marker: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_thresholds_are_rejected() {
        for config in [
            SweepConfig {
                pending_threshold: chrono::Duration::minutes(-5),
                ..Default::default()
            },
            SweepConfig {
                stale_threshold: chrono::Duration::hours(-1),
                ..Default::default()
            },
        ] {
            assert!(matches!(
                config.policies(Arc::new(SystemClock)),
                Err(SweepError::InvalidConfig { .. })
            ));
        }

        let zero = SweepConfig {
            pending_threshold: chrono::Duration::zero(),
            ..Default::default()
        };
        assert!(zero.validate().is_ok());
    }
}
