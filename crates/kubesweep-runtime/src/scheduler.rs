use crate::reconciler::{Reconciler, Task};
use kubesweep_core::SweepConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Period of each reconciliation task
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub cleanup_interval: Duration,
    pub recovery_interval: Duration,
    pub expiry_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&SweepConfig::default())
    }
}

impl From<&SweepConfig> for SchedulerConfig {
    fn from(config: &SweepConfig) -> Self {
        Self {
            cleanup_interval: config.cleanup_interval,
            recovery_interval: config.recovery_interval,
            expiry_interval: config.expiry_interval,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self, task: Task) -> Duration {
        match task {
            Task::Cleanup => self.cleanup_interval,
            Task::Recovery => self.recovery_interval,
            Task::Expiry => self.expiry_interval,
        }
    }
}

/// Drives the three reconciliation tasks on independent timers
///
/// Each task gets its own tokio task and interval. Passes are awaited inline,
/// so a slow pass delays that task's next tick instead of overlapping with it.
/// Missed ticks are skipped rather than replayed.
pub struct ReconcileScheduler {
    reconciler: Arc<Reconciler>,
    config: SchedulerConfig,
}

impl ReconcileScheduler {
    pub fn new(reconciler: Arc<Reconciler>, config: SchedulerConfig) -> Self {
        Self { reconciler, config }
    }

    /// Run all tasks until `token` is cancelled.
    ///
    /// Every task fires once immediately. Cancellation is checked between
    /// passes; a pass already running is allowed to finish.
    pub async fn run(&self, token: CancellationToken) {
        info!(
            "Starting reconcile scheduler (cleanup: {:?}, recovery: {:?}, expiry: {:?})",
            self.config.cleanup_interval, self.config.recovery_interval, self.config.expiry_interval
        );

        let handles: Vec<_> = Task::ALL
            .into_iter()
            .map(|task| {
                tokio::spawn(task_loop(
                    self.reconciler.clone(),
                    task,
                    self.config.interval(task),
                    token.clone(),
                ))
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Reconcile task panicked: {}", e);
            }
        }

        info!("Reconcile scheduler stopped");
    }
}

async fn task_loop(
    reconciler: Arc<Reconciler>,
    task: Task,
    period: Duration,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!(%task, "Task shutting down");
                return;
            }
            _ = interval.tick() => {
                match reconciler.run_task(task).await {
                    Ok(report) => debug!(%task, ?report, "Pass finished"),
                    Err(e) if e.is_transient() => {
                        warn!(%task, error = %e, "Pass aborted, retrying on next tick")
                    }
                    Err(e) => error!(%task, error = %e, "Pass failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAction, MockExecutor};
    use chrono::{DateTime, TimeZone, Utc};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kubesweep_core::{FixedClock, Namespace};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap()
    }

    fn old_namespace(name: &str) -> Namespace {
        let mut ns = Namespace::default();
        ns.metadata.name = Some(name.to_string());
        ns.metadata.creation_timestamp = Some(Time(now() - chrono::Duration::days(260)));
        ns
    }

    fn scheduler(mock: &Arc<MockExecutor>) -> ReconcileScheduler {
        let config = SweepConfig {
            namespace_patterns: vec!["ns-old".to_string()],
            expiry_interval: Duration::from_secs(60),
            ..Default::default()
        };
        let policies = config.policies(Arc::new(FixedClock(now()))).unwrap();
        let reconciler = Reconciler::new(mock.clone(), Arc::new(policies));
        ReconcileScheduler::new(Arc::new(reconciler), SchedulerConfig::from(&config))
    }

    fn deleted(actions: &[MockAction], name: &str) -> usize {
        actions
            .iter()
            .filter(|a| matches!(a, MockAction::DeleteNamespace { name: n } if n == name))
            .count()
    }

    #[test]
    fn test_intervals_follow_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.interval(Task::Cleanup), Duration::from_secs(3600));
        assert_eq!(config.interval(Task::Recovery), Duration::from_secs(1200));
        assert_eq!(config.interval(Task::Expiry), Duration::from_secs(86400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_pass_runs_immediately() {
        let mock = Arc::new(MockExecutor::new());
        mock.add_namespace(old_namespace("ns-old")).await;

        let token = CancellationToken::new();
        let scheduler = scheduler(&mock);
        let run_token = token.clone();
        let handle = tokio::spawn(async move { scheduler.run(run_token).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(deleted(&mock.actions().await, "ns-old"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_ticks_see_new_state_and_cancel_stops_loops() {
        let mock = Arc::new(MockExecutor::new());
        mock.add_namespace(old_namespace("ns-old-a")).await;

        let token = CancellationToken::new();
        let scheduler = scheduler(&mock);
        let run_token = token.clone();
        let handle = tokio::spawn(async move { scheduler.run(run_token).await });

        tokio::time::sleep(Duration::from_secs(30)).await;
        mock.add_namespace(old_namespace("ns-old-b")).await;
        assert_eq!(deleted(&mock.actions().await, "ns-old-b"), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        let actions = mock.actions().await;
        assert_eq!(deleted(&actions, "ns-old-a"), 1);
        assert_eq!(deleted(&actions, "ns-old-b"), 1);

        token.cancel();
        handle.await.unwrap();

        mock.add_namespace(old_namespace("ns-old-c")).await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(deleted(&mock.actions().await, "ns-old-c"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_pass_never_overlaps_itself() {
        let mock = Arc::new(MockExecutor::new());
        // Every listing takes longer than the 60s expiry interval
        mock.set_delay(Some(Duration::from_secs(150))).await;

        let token = CancellationToken::new();
        let scheduler = scheduler(&mock);
        let run_token = token.clone();
        let handle = tokio::spawn(async move { scheduler.run(run_token).await });

        // All three tasks list at startup; cleanup and recovery are then idle for an hour
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(mock.listing_stats().await.in_flight, 3);

        tokio::time::sleep(Duration::from_secs(150)).await;
        mock.reset_listing_peak().await;
        let started_before = mock.listing_stats().await.started;

        tokio::time::sleep(Duration::from_secs(900)).await;
        let stats = mock.listing_stats().await;
        assert_eq!(stats.peak_in_flight, 1);
        assert!(stats.started >= started_before + 3);

        token.cancel();
        handle.await.unwrap();
        assert_eq!(mock.listing_stats().await.in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_listing_is_retried_on_next_tick() {
        let mock = Arc::new(MockExecutor::new());
        mock.add_namespace(old_namespace("ns-old")).await;
        mock.fail_on("list_namespaces", "*").await;

        let token = CancellationToken::new();
        let scheduler = scheduler(&mock);
        let run_token = token.clone();
        let handle = tokio::spawn(async move { scheduler.run(run_token).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(mock.actions().await.is_empty());

        mock.clear_failures().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(deleted(&mock.actions().await, "ns-old"), 1);

        token.cancel();
        handle.await.unwrap();
    }
}
