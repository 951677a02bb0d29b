//! Background job dispatch.
//!
//! Jobs either run as soon as they are dispatched or wait in a FIFO queue
//! until [`JobDispatcher::run_pending`] drains it. Callers don't branch on
//! the mode.

use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::errors::PipelineError;
use crate::processor::ProcessOutcome;
use crate::reindexer::ReindexSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Rewrite a collection's documents after its metadata or ACL changed.
    UpdateCollection(i64),
    ReindexEntities(Option<i64>),
    ProcessDocument(i64),
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::UpdateCollection(id) => write!(f, "update_collection({})", id),
            Job::ReindexEntities(Some(id)) => write!(f, "reindex_entities({})", id),
            Job::ReindexEntities(None) => write!(f, "reindex_entities(all)"),
            Job::ProcessDocument(id) => write!(f, "process_document({})", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Reindexed(ReindexSummary),
    Processed(ProcessOutcome),
}

/// Executes jobs. Implemented by the service that owns the pipeline.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_job(&self, job: Job) -> Result<JobOutcome, PipelineError>;
}

pub struct JobDispatcher {
    run_inline: bool,
    queue: Mutex<VecDeque<Job>>,
}

impl JobDispatcher {
    pub fn new(run_inline: bool) -> Self {
        Self {
            run_inline,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn runs_inline(&self) -> bool {
        self.run_inline
    }

    /// Run `job` now when inline, otherwise queue it and return `None`.
    #[instrument(skip(self, runner, job), fields(job = %job))]
    pub async fn dispatch(
        &self,
        runner: &dyn JobRunner,
        job: Job,
    ) -> Result<Option<JobOutcome>, PipelineError> {
        if self.run_inline {
            return runner.run_job(job).await.map(Some);
        }
        let mut queue = self.queue.lock().await;
        queue.push_back(job);
        debug!(queued = queue.len(), "Job queued");
        Ok(None)
    }

    /// Run queued jobs in dispatch order until the queue is empty.
    ///
    /// Jobs queued while draining run in the same call. A failing job stops
    /// the drain and goes back to the front of the queue, ahead of the jobs
    /// after it.
    pub async fn run_pending(&self, runner: &dyn JobRunner) -> Result<Vec<JobOutcome>, PipelineError> {
        let mut outcomes = Vec::new();
        loop {
            // The lock is released before the job runs so jobs may dispatch.
            let next = self.queue.lock().await.pop_front();
            let Some(job) = next else { break };
            match runner.run_job(job).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    self.queue.lock().await.push_front(job);
                    warn!(job = %job, error = %e, "Job failed; kept at the head of the queue");
                    return Err(e);
                }
            }
        }
        if !outcomes.is_empty() {
            info!(count = outcomes.len(), "Ran pending jobs");
        }
        Ok(outcomes)
    }

    pub async fn pending(&self) -> Vec<Job> {
        self.queue.lock().await.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockRunner {
        ran: Mutex<Vec<Job>>,
        fail_on: Option<Job>,
    }

    #[async_trait]
    impl JobRunner for MockRunner {
        async fn run_job(&self, job: Job) -> Result<JobOutcome, PipelineError> {
            if self.fail_on == Some(job) {
                return Err(PipelineError::not_found(job.to_string()));
            }
            self.ran.lock().await.push(job);
            Ok(JobOutcome::Reindexed(ReindexSummary::default()))
        }
    }

    #[tokio::test]
    async fn test_inline_runs_immediately() {
        let runner = MockRunner::default();
        let dispatcher = JobDispatcher::new(true);

        let outcome = dispatcher
            .dispatch(&runner, Job::UpdateCollection(1))
            .await
            .unwrap();
        assert!(outcome.is_some());
        assert_eq!(*runner.ran.lock().await, vec![Job::UpdateCollection(1)]);
        assert!(dispatcher.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_queued_jobs_run_in_order() {
        let runner = MockRunner::default();
        let dispatcher = JobDispatcher::new(false);

        for job in [
            Job::UpdateCollection(2),
            Job::ProcessDocument(7),
            Job::ReindexEntities(None),
        ] {
            assert!(dispatcher.dispatch(&runner, job).await.unwrap().is_none());
        }
        assert!(runner.ran.lock().await.is_empty());

        let outcomes = dispatcher.run_pending(&runner).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            *runner.ran.lock().await,
            vec![
                Job::UpdateCollection(2),
                Job::ProcessDocument(7),
                Job::ReindexEntities(None)
            ]
        );
        assert!(dispatcher.run_pending(&runner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_job_stays_queued() {
        let runner = MockRunner {
            fail_on: Some(Job::ProcessDocument(1)),
            ..MockRunner::default()
        };
        let dispatcher = JobDispatcher::new(false);
        dispatcher.dispatch(&runner, Job::ProcessDocument(1)).await.unwrap();
        dispatcher.dispatch(&runner, Job::ProcessDocument(2)).await.unwrap();

        let err = dispatcher.run_pending(&runner).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
        assert_eq!(
            dispatcher.pending().await,
            vec![Job::ProcessDocument(1), Job::ProcessDocument(2)]
        );
    }
}
