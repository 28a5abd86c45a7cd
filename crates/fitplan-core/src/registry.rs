//! Process-wide single-flight registry for generation jobs.
//!
//! At most one job per `(user, kind)` is in flight. The first caller to
//! [`JobRegistry::try_begin`] becomes the leader and owns a [`JobTicket`];
//! later callers get a [`JobWaiter`] that resolves when the leader does.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fitplan_db::models::{PlanKind, PlanSource};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::GenerationError;

/// Identity of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub user_id: Uuid,
    pub kind: PlanKind,
}

impl JobKey {
    pub fn new(user_id: Uuid, kind: PlanKind) -> Self {
        Self { user_id, kind }
    }
}

/// How a leader's job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResolution {
    Ready { plan_id: Uuid, source: PlanSource },
    Failed(GenerationError),
}

type Slot = watch::Receiver<Option<JobResolution>>;
type Jobs = Arc<Mutex<HashMap<JobKey, Slot>>>;

fn lock_jobs(jobs: &Jobs) -> MutexGuard<'_, HashMap<JobKey, Slot>> {
    jobs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared map of in-flight jobs. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Jobs,
}

/// Result of asking the registry to start a job.
#[derive(Debug)]
pub enum Admission {
    /// The caller runs the job and must resolve the ticket.
    Leader(JobTicket),
    /// Another caller already runs the job.
    Follower(JobWaiter),
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically check for an in-flight job and claim it if there is none.
    pub fn try_begin(&self, key: JobKey) -> Admission {
        let mut jobs = lock_jobs(&self.jobs);
        if let Some(rx) = jobs.get(&key) {
            return Admission::Follower(JobWaiter {
                key,
                rx: rx.clone(),
            });
        }

        let (tx, rx) = watch::channel(None);
        jobs.insert(key, rx);
        Admission::Leader(JobTicket {
            key,
            tx: Some(tx),
            jobs: Arc::clone(&self.jobs),
        })
    }

    pub fn is_in_flight(&self, key: &JobKey) -> bool {
        lock_jobs(&self.jobs).contains_key(key)
    }

    /// Number of jobs currently in flight.
    pub fn len(&self) -> usize {
        lock_jobs(&self.jobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ownership of an in-flight job.
///
/// Dropping a ticket without calling [`JobTicket::resolve`] releases the key
/// and resolves waiters with [`GenerationError::Abandoned`].
#[derive(Debug)]
pub struct JobTicket {
    key: JobKey,
    tx: Option<watch::Sender<Option<JobResolution>>>,
    jobs: Jobs,
}

impl JobTicket {
    pub fn key(&self) -> JobKey {
        self.key
    }

    /// Publish the outcome to waiters and release the key.
    pub fn resolve(mut self, resolution: JobResolution) {
        self.finish(resolution);
    }

    fn finish(&mut self, resolution: JobResolution) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let mut jobs = lock_jobs(&self.jobs);
        jobs.remove(&self.key);
        // Sent under the lock so no waiter can observe a released key
        // with an unresolved slot.
        tx.send_replace(Some(resolution));
    }
}

impl Drop for JobTicket {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!(
                user_id = %self.key.user_id,
                kind = %self.key.kind,
                "generation job dropped without a result"
            );
            self.finish(JobResolution::Failed(GenerationError::Abandoned));
        }
    }
}

/// Handle on someone else's in-flight job.
#[derive(Debug)]
pub struct JobWaiter {
    key: JobKey,
    rx: Slot,
}

impl JobWaiter {
    pub fn key(&self) -> JobKey {
        self.key
    }

    /// Wait for the leader to resolve.
    pub async fn wait(mut self) -> JobResolution {
        let resolution = match self.rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        resolution.unwrap_or(JobResolution::Failed(GenerationError::Abandoned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> JobKey {
        JobKey::new(Uuid::new_v4(), PlanKind::Base)
    }

    #[test]
    fn second_caller_follows() {
        let registry = JobRegistry::new();
        let k = key();
        let first = registry.try_begin(k);
        let second = registry.try_begin(k);
        assert!(matches!(first, Admission::Leader(_)));
        assert!(matches!(second, Admission::Follower(_)));
        assert!(registry.is_in_flight(&k));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn kinds_are_independent() {
        let registry = JobRegistry::new();
        let user = Uuid::new_v4();
        let base = registry.try_begin(JobKey::new(user, PlanKind::Base));
        let daily = registry.try_begin(JobKey::new(user, PlanKind::Daily));
        assert!(matches!(base, Admission::Leader(_)));
        assert!(matches!(daily, Admission::Leader(_)));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn waiter_sees_leader_resolution() {
        let registry = JobRegistry::new();
        let k = key();
        let Admission::Leader(ticket) = registry.try_begin(k) else {
            panic!("expected leader");
        };
        let Admission::Follower(waiter) = registry.try_begin(k) else {
            panic!("expected follower");
        };

        let plan_id = Uuid::new_v4();
        let handle = tokio::spawn(waiter.wait());
        ticket.resolve(JobResolution::Ready {
            plan_id,
            source: PlanSource::Generated,
        });

        let resolution = handle.await.unwrap();
        assert_eq!(
            resolution,
            JobResolution::Ready {
                plan_id,
                source: PlanSource::Generated
            }
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn dropped_ticket_abandons_waiters() {
        let registry = JobRegistry::new();
        let k = key();
        let ticket = registry.try_begin(k);
        let Admission::Follower(waiter) = registry.try_begin(k) else {
            panic!("expected follower");
        };
        drop(ticket);

        assert_eq!(
            waiter.wait().await,
            JobResolution::Failed(GenerationError::Abandoned)
        );
        assert!(!registry.is_in_flight(&k));
        assert!(matches!(registry.try_begin(k), Admission::Leader(_)));
    }
}
