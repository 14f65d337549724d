use std::collections::HashMap;
use std::time::Duration;

use crate::model::task::{Task, TaskSet};
use crate::model::update::RelativePositionUpdate;
use crate::ops::positioning;

/// What the ordering service answered to a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitReply {
    /// Accepted; positions must be fetched separately if wanted
    Ack,
    /// Accepted, with the authoritative post-operation task list
    Tasks(Vec<Task>),
}

/// Error type for talking to the ordering service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorityError {
    #[error("ordering service did not answer within {0:?}")]
    Timeout(Duration),
    #[error("ordering service rejected the update: {0}")]
    Rejected(String),
    #[error("could not reach ordering service: {0}")]
    Transport(String),
}

/// The remote side that owns durable task order.
///
/// Implementations own the wire format and must give up after `timeout`,
/// returning `AuthorityError::Timeout`.
pub trait OrderingAuthority {
    fn submit(
        &mut self,
        job_id: &str,
        updates: &[RelativePositionUpdate],
        timeout: Duration,
    ) -> Result<SubmitReply, AuthorityError>;

    fn fetch(&mut self, job_id: &str, timeout: Duration) -> Result<Vec<Task>, AuthorityError>;
}

impl<A: OrderingAuthority + ?Sized> OrderingAuthority for &mut A {
    fn submit(
        &mut self,
        job_id: &str,
        updates: &[RelativePositionUpdate],
        timeout: Duration,
    ) -> Result<SubmitReply, AuthorityError> {
        (**self).submit(job_id, updates, timeout)
    }

    fn fetch(&mut self, job_id: &str, timeout: Duration) -> Result<Vec<Task>, AuthorityError> {
        (**self).fetch(job_id, timeout)
    }
}

/// Authority that keeps jobs in memory and renumbers with the same
/// sequential algorithm as the remote service. Useful for tests and demos.
#[derive(Debug, Default)]
pub struct InMemoryAuthority {
    jobs: HashMap<String, TaskSet>,
    /// Reply with the full task list instead of a bare ack
    pub echo_tasks: bool,
    submissions: Vec<(String, Vec<RelativePositionUpdate>)>,
}

impl InMemoryAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_job(mut self, tasks: TaskSet) -> Self {
        self.jobs.insert(tasks.job_id.clone(), tasks);
        self
    }

    pub fn job(&self, job_id: &str) -> Option<&TaskSet> {
        self.jobs.get(job_id)
    }

    /// Every accepted batch, oldest first
    pub fn submissions(&self) -> &[(String, Vec<RelativePositionUpdate>)] {
        &self.submissions
    }
}

impl OrderingAuthority for InMemoryAuthority {
    fn submit(
        &mut self,
        job_id: &str,
        updates: &[RelativePositionUpdate],
        _timeout: Duration,
    ) -> Result<SubmitReply, AuthorityError> {
        let current = self
            .jobs
            .get(job_id)
            .ok_or_else(|| AuthorityError::Rejected(format!("unknown job {}", job_id)))?;
        let outcome = positioning::apply(current, updates)
            .map_err(|e| AuthorityError::Rejected(e.to_string()))?;
        let reply = if self.echo_tasks {
            SubmitReply::Tasks(outcome.tasks.iter().cloned().collect())
        } else {
            SubmitReply::Ack
        };
        self.jobs.insert(job_id.to_string(), outcome.tasks);
        self.submissions.push((job_id.to_string(), updates.to_vec()));
        Ok(reply)
    }

    fn fetch(&mut self, job_id: &str, _timeout: Duration) -> Result<Vec<Task>, AuthorityError> {
        self.jobs
            .get(job_id)
            .map(|set| set.iter().cloned().collect())
            .ok_or_else(|| AuthorityError::Rejected(format!("unknown job {}", job_id)))
    }
}
