//! Role controller: starts and stops the lease sweeper and health
//! reporter as this replica's placement role changes.
//!
//! Drives an ordered, idempotent init/shutdown of a small named task
//! set -- scaled down to exactly two named tasks, since a replica only
//! ever owns a sweeper and a reporter, never an open set of services.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::health::{CapacitySource, HealthReporter, OperationCounters, SignalSink};
use crate::store::PartitionStateStore;
use crate::sweeper::LeaseSweeper;
use crate::PartitionReplica;

/// The three placement states a replica can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaRole {
    Primary,
    ActiveSecondary,
    Idle,
}

struct Tasks {
    sweeper: Option<LeaseSweeper>,
    reporter: Option<HealthReporter>,
}

/// Owns the currently-running background tasks and transitions them as
/// `transition` is called with a new role. Every transition is driven
/// purely by current vs. desired task presence, so repeating the same
/// role (or alternating `ActiveSecondary` <-> `ActiveSecondary`) never
/// starts a task twice or stops one that is not running.
pub struct RoleController<T, S> {
    replica: Arc<PartitionReplica<T, S>>,
    sink: Arc<dyn SignalSink>,
    tasks: Mutex<Tasks>,
}

impl<T, S> RoleController<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: PartitionStateStore<T> + 'static,
{
    #[must_use]
    pub fn new(replica: Arc<PartitionReplica<T, S>>, sink: Arc<dyn SignalSink>) -> Self {
        Self {
            replica,
            sink,
            tasks: Mutex::new(Tasks { sweeper: None, reporter: None }),
        }
    }

    /// Drives the task set to match `role`. Safe to call repeatedly with
    /// the same role, or in any order.
    pub fn transition(&self, role: ReplicaRole) {
        match role {
            ReplicaRole::Primary => {
                self.ensure_reporter_running();
                self.ensure_sweeper_running();
            }
            ReplicaRole::ActiveSecondary => {
                self.ensure_sweeper_stopped();
                self.ensure_reporter_running();
            }
            ReplicaRole::Idle => {
                self.ensure_sweeper_stopped();
                self.ensure_reporter_stopped();
            }
        }
    }

    fn ensure_sweeper_running(&self) {
        let mut tasks = self.tasks.lock();
        if tasks.sweeper.is_none() {
            tasks.sweeper = Some(LeaseSweeper::spawn(Arc::clone(&self.replica)));
        }
    }

    fn ensure_sweeper_stopped(&self) {
        if let Some(sweeper) = self.tasks.lock().sweeper.take() {
            sweeper.stop();
        }
    }

    fn ensure_reporter_running(&self) {
        let mut tasks = self.tasks.lock();
        if tasks.reporter.is_none() {
            let source: Arc<dyn CapacitySource> = Arc::clone(&self.replica) as Arc<dyn CapacitySource>;
            tasks.reporter = Some(HealthReporter::spawn(
                self.replica.config_arc(),
                self.replica.counters_arc(),
                Arc::clone(&self.sink),
                source,
            ));
        }
    }

    fn ensure_reporter_stopped(&self) {
        if let Some(reporter) = self.tasks.lock().reporter.take() {
            reporter.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::PartitionConfig;
    use crate::health::{LoggingSignalSink, OperationCounters};
    use crate::store::memory::InMemoryStateStore;

    use super::*;

    fn controller() -> RoleController<String, InMemoryStateStore<String>> {
        let mut config = PartitionConfig::default();
        config.health_check_start_delay_secs = 3600;
        config.lease_check_start_delay_secs = 3600;
        let replica = Arc::new(
            PartitionReplica::new(0, InMemoryStateStore::new(5), Arc::new(config), Arc::new(OperationCounters::new()))
                .unwrap(),
        );
        RoleController::new(replica, Arc::new(LoggingSignalSink))
    }

    #[tokio::test]
    async fn primary_starts_both_tasks() {
        let controller = controller();
        controller.transition(ReplicaRole::Primary);
        let tasks = controller.tasks.lock();
        assert!(tasks.sweeper.is_some());
        assert!(tasks.reporter.is_some());
    }

    #[tokio::test]
    async fn active_secondary_stops_sweeper_keeps_reporter() {
        let controller = controller();
        controller.transition(ReplicaRole::Primary);
        controller.transition(ReplicaRole::ActiveSecondary);
        let tasks = controller.tasks.lock();
        assert!(tasks.sweeper.is_none());
        assert!(tasks.reporter.is_some());
    }

    #[tokio::test]
    async fn idle_stops_both_tasks() {
        let controller = controller();
        controller.transition(ReplicaRole::Primary);
        controller.transition(ReplicaRole::Idle);
        let tasks = controller.tasks.lock();
        assert!(tasks.sweeper.is_none());
        assert!(tasks.reporter.is_none());
    }

    #[tokio::test]
    async fn repeating_a_role_is_idempotent() {
        let controller = controller();
        controller.transition(ReplicaRole::Primary);
        controller.transition(ReplicaRole::Primary);
        let tasks = controller.tasks.lock();
        assert!(tasks.sweeper.is_some());
        assert!(tasks.reporter.is_some());
    }
}
