//! Kubesweep Runtime - Executors and reconciliation loops
//!
//! Talks to the cluster through the [`ActionExecutor`] trait. The HTTP
//! implementation targets the Kubernetes REST API; a dry-run wrapper and an
//! in-memory mock cover previews and tests.

pub mod api_client;
pub mod dry_run;
pub mod mock;
pub mod reconciler;
pub mod scheduler;
pub mod stripper;
pub mod traits;

// Re-export primary types
pub use api_client::{KubeApiConfig, KubeApiExecutor};
pub use dry_run::DryRunExecutor;
pub use mock::{ListingStats, MockAction, MockExecutor};
pub use traits::{ActionExecutor, ResourceKind};

// Re-export reconciliation types
pub use reconciler::{PassReport, Reconciler, Task};
pub use scheduler::{ReconcileScheduler, SchedulerConfig};
pub use stripper::{FinalizerStripper, StripReport};
