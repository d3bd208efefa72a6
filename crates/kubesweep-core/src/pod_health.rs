use crate::clock::Clock;
use crate::resources::{creation_time, pod_phase, pod_start_time, PodPhase};
use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;

/// Default age after which a Pending pod triggers a scale-to-zero
pub const DEFAULT_PENDING_THRESHOLD: Duration = Duration::hours(1);

/// Default age after which a started, non-Running pod is deleted
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::hours(24);

/// Health predicates over a pod's phase and timestamps
#[derive(Clone)]
pub struct PodHealthPolicy {
    clock: Arc<dyn Clock>,
    pending_threshold: Duration,
    stale_threshold: Duration,
}

impl PodHealthPolicy {
    pub fn new(
        clock: Arc<dyn Clock>,
        pending_threshold: Duration,
        stale_threshold: Duration,
    ) -> Self {
        Self {
            clock,
            pending_threshold,
            stale_threshold,
        }
    }

    pub fn is_pending_too_long(&self, pod: &Pod) -> bool {
        pending_too_long(pod, self.pending_threshold, self.clock.now())
    }

    pub fn is_stale_non_running(&self, pod: &Pod) -> bool {
        stale_non_running(pod, self.stale_threshold, self.clock.now())
    }

    pub fn pending_threshold(&self) -> Duration {
        self.pending_threshold
    }

    pub fn stale_threshold(&self) -> Duration {
        self.stale_threshold
    }
}

impl std::fmt::Debug for PodHealthPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodHealthPolicy")
            .field("pending_threshold", &self.pending_threshold)
            .field("stale_threshold", &self.stale_threshold)
            .finish()
    }
}

/// Pending for longer than `threshold`, measured from `startTime` or, when the
/// pod never started, from `creationTimestamp`. A pod with neither timestamp
/// cannot be evaluated and counts as healthy.
pub fn pending_too_long(pod: &Pod, threshold: Duration, now: DateTime<Utc>) -> bool {
    if pod_phase(pod) != PodPhase::Pending {
        return false;
    }

    let started = pod_start_time(pod).or_else(|| creation_time(&pod.metadata));
    match started {
        Some(start) => now - start > threshold,
        None => false,
    }
}

/// Not Running for longer than `threshold` since `startTime`.
///
/// There is no fallback to `creationTimestamp`: a pod that never started is
/// left to the pending rule, which only scales the deployment down.
pub fn stale_non_running(pod: &Pod, threshold: Duration, now: DateTime<Utc>) -> bool {
    if pod_phase(pod) == PodPhase::Running {
        return false;
    }

    match pod_start_time(pod) {
        Some(start) => now - start > threshold,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;
    use k8s_openapi::api::core::v1::PodStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn make_pod(phase: &str, created_ago: Option<Duration>, started_ago: Option<Duration>) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some("web-1".to_string());
        pod.metadata.creation_timestamp = created_ago.map(|d| Time(now() - d));
        pod.status = Some(PodStatus {
            phase: Some(phase.to_string()),
            start_time: started_ago.map(|d| Time(now() - d)),
            ..Default::default()
        });
        pod
    }

    fn policy() -> PodHealthPolicy {
        PodHealthPolicy::new(
            Arc::new(FixedClock(now())),
            DEFAULT_PENDING_THRESHOLD,
            DEFAULT_STALE_THRESHOLD,
        )
    }

    #[test]
    fn test_pending_falls_back_to_creation_timestamp() {
        let pod = make_pod("Pending", Some(Duration::hours(2)), None);
        assert!(policy().is_pending_too_long(&pod));
    }

    #[test]
    fn test_pending_prefers_start_time() {
        // Created long ago but only started recently
        let pod = make_pod(
            "Pending",
            Some(Duration::hours(5)),
            Some(Duration::minutes(10)),
        );
        assert!(!policy().is_pending_too_long(&pod));
    }

    #[test]
    fn test_pending_without_timestamps_is_healthy() {
        let pod = make_pod("Pending", None, None);
        assert!(!policy().is_pending_too_long(&pod));
    }

    #[test]
    fn test_pending_boundary_is_strict() {
        let pod = make_pod("Pending", Some(Duration::hours(1)), None);
        assert!(!policy().is_pending_too_long(&pod));

        let just_over = Duration::hours(1) + Duration::seconds(1);
        let pod = make_pod("Pending", Some(just_over), None);
        assert!(policy().is_pending_too_long(&pod));
    }

    #[test]
    fn test_running_is_never_pending_too_long() {
        let pod = make_pod("Running", Some(Duration::days(30)), Some(Duration::days(30)));
        assert!(!policy().is_pending_too_long(&pod));
    }

    #[test]
    fn test_stale_requires_start_time() {
        let pod = make_pod("Pending", Some(Duration::days(10)), None);
        assert!(!policy().is_stale_non_running(&pod));
    }

    #[test]
    fn test_failed_pod_past_threshold_is_stale() {
        let pod = make_pod("Failed", Some(Duration::hours(26)), Some(Duration::hours(25)));
        assert!(policy().is_stale_non_running(&pod));
    }

    #[test]
    fn test_stale_boundary_is_strict() {
        let pod = make_pod("Failed", Some(Duration::hours(26)), Some(Duration::hours(24)));
        assert!(!policy().is_stale_non_running(&pod));
    }

    #[test]
    fn test_running_is_never_stale() {
        let pod = make_pod("Running", Some(Duration::days(3)), Some(Duration::days(3)));
        assert!(!policy().is_stale_non_running(&pod));
    }

    #[test]
    fn test_unknown_and_succeeded_pods_can_be_stale() {
        let pod = make_pod("Succeeded", None, Some(Duration::hours(48)));
        assert!(policy().is_stale_non_running(&pod));

        let mut pod = make_pod("Unknown", None, Some(Duration::hours(48)));
        pod.status.as_mut().unwrap().phase = None;
        assert!(policy().is_stale_non_running(&pod));
    }

    #[test]
    fn test_custom_thresholds() {
        let policy = PodHealthPolicy::new(
            Arc::new(FixedClock(now())),
            Duration::minutes(15),
            Duration::hours(2),
        );
        let pod = make_pod("Pending", Some(Duration::minutes(20)), None);
        assert!(policy.is_pending_too_long(&pod));

        let pod = make_pod("Failed", None, Some(Duration::hours(3)));
        assert!(policy.is_stale_non_running(&pod));
    }
}
