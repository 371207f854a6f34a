//! Tracks the state of long-running background generation jobs.
//!
//! The main components are:
//! - `JobsState`: a clonable, thread-safe struct holding the shared status
//!   of all jobs, shared between the scheduler and anything that polls.
//! - `JobUpdate`: a message struct used to communicate status changes from
//!   a background job back to the central state manager.
//! - `start_job_updater`: a long-running task that listens for `JobUpdate`
//!   messages on an MPSC channel and updates the shared map accordingly.

use common::jobs::JobStatus;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, RwLock};

const UPDATE_CHANNEL_CAPACITY: usize = 100;

/// A thread-safe, shareable container for the state of all background jobs.
#[derive(Clone)]
pub struct JobsState {
    /// A map from a unique job ID to its current `JobStatus`.
    ///
    /// This map is the single source of truth for job status. It is behind
    /// an `Arc<RwLock>` so progress polls read concurrently while the
    /// `start_job_updater` task takes exclusive writes.
    pub jobs: Arc<RwLock<HashMap<String, JobStatus>>>,

    /// Sender half of the update channel.
    ///
    /// Background workers push `JobUpdate` messages through this sender
    /// instead of writing the map directly, which keeps job execution
    /// decoupled from state bookkeeping.
    pub tx: mpsc::Sender<JobUpdate>,
}

impl JobsState {
    /// Creates the shared state together with the receiver the central
    /// updater task must be started with.
    pub fn new() -> (JobsState, mpsc::Receiver<JobUpdate>) {
        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let state = JobsState { jobs: Arc::new(RwLock::new(HashMap::new())), tx };
        (state, rx)
    }

    /// Current status of one job, if it is known.
    pub async fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.read().await.get(job_id).cloned()
    }
}

/// A status update for a specific background job.
#[derive(Debug)]
pub struct JobUpdate {
    pub job_id: String,
    pub status: JobStatus,
}

/// The central job state updater task.
///
/// Spawn this once at startup; it continuously drains `JobUpdate` messages
/// and writes each job's latest status into the shared map.
pub async fn start_job_updater(state: JobsState, mut rx: mpsc::Receiver<JobUpdate>) {
    while let Some(update) = rx.recv().await {
        let mut jobs = state.jobs.write().await;
        jobs.insert(update.job_id.clone(), update.status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn updater_applies_latest_status() {
        let (state, rx) = JobsState::new();
        tokio::spawn(start_job_updater(state.clone(), rx));

        state
            .tx
            .send(JobUpdate { job_id: "j1".into(), status: JobStatus::Pending })
            .await
            .unwrap();
        state
            .tx
            .send(JobUpdate { job_id: "j1".into(), status: JobStatus::Failed("boom".into()) })
            .await
            .unwrap();

        // Drain happens on the spawned task; poll until it lands.
        for _ in 0..50 {
            if let Some(JobStatus::Failed(msg)) = state.status("j1").await {
                assert_eq!(msg, "boom");
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("status never became Failed");
    }

    #[tokio::test]
    async fn unknown_jobs_have_no_status() {
        let (state, _rx) = JobsState::new();
        assert!(state.status("missing").await.is_none());
    }
}
