//! Optimistic reordering against a remote ordering authority.
//!
//! Every operation is predicted locally first, so callers see the new order
//! immediately. Operations are then submitted one at a time in FIFO order.
//! A failed submission restores the snapshot taken just before that
//! operation was predicted and cancels everything queued behind it. A
//! successful submission whose authoritative positions differ from the
//! prediction is reported as drift and otherwise left alone.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::model::config::SyncConfig;
use crate::model::task::{TaskId, TaskSet};
use crate::model::update::RelativePositionUpdate;
use crate::ops::positioning::{self, EngineError, Placement};
use crate::sync::authority::{AuthorityError, OrderingAuthority, SubmitReply};
use crate::sync::diagnostics::{DiagnosticEvent, DiagnosticSink, EventKind};

/// Lifecycle of one reorder operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Applied locally, waiting in the queue
    Predicted,
    /// Handed to the authority, reply outstanding
    Submitted,
    /// Accepted by the authority
    Committed,
    /// Rejected or timed out; the snapshot was restored
    RolledBack,
    /// Dropped because an earlier operation rolled back
    Cancelled,
}

impl Phase {
    fn can_become(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Predicted, Phase::Submitted)
                | (Phase::Predicted, Phase::Cancelled)
                | (Phase::Submitted, Phase::Committed)
                | (Phase::Submitted, Phase::RolledBack)
        )
    }
}

/// Where a task sits: its raw parent link and position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub parent_id: Option<TaskId>,
    pub position: u32,
}

/// A task whose authoritative placement differs from the prediction.
/// `None` on either side means the task only exists on the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Drift {
    pub task_id: TaskId,
    pub predicted: Option<Slot>,
    pub actual: Option<Slot>,
}

/// How a flushed operation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Committed { seq: u64, drift: Vec<Drift> },
    RolledBack { seq: u64, error: AuthorityError },
    Cancelled { seq: u64 },
}

impl Outcome {
    pub fn seq(&self) -> u64 {
        match self {
            Outcome::Committed { seq, .. }
            | Outcome::RolledBack { seq, .. }
            | Outcome::Cancelled { seq } => *seq,
        }
    }
}

/// Result of staging one operation
#[derive(Debug, Clone)]
pub struct Staged {
    pub seq: u64,
    pub operations: Vec<Placement>,
}

/// Result of a successful `submit`
#[derive(Debug, Clone, Serialize)]
pub struct SubmitReport {
    pub seq: u64,
    pub operations: Vec<Placement>,
    pub drift: Vec<Drift>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Rejected locally; nothing was predicted or sent
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("{message}")]
    Failure {
        #[source]
        source: AuthorityError,
        message: String,
    },
    #[error("operation {seq} was cancelled after an earlier reorder failed")]
    Cancelled { seq: u64 },
}

impl ReconcileError {
    /// Short text suitable for a status line
    pub fn user_message(&self) -> String {
        match self {
            ReconcileError::Engine(e) => e.to_string(),
            ReconcileError::Failure { message, .. } => message.clone(),
            ReconcileError::Cancelled { .. } => {
                "Reorder was not saved because an earlier change failed.".to_string()
            }
        }
    }
}

#[derive(Debug, Clone)]
struct PendingOperation {
    seq: u64,
    updates: Vec<RelativePositionUpdate>,
    /// State just before this operation was predicted
    snapshot: TaskSet,
    /// State just after
    predicted: TaskSet,
    phase: Phase,
}

impl PendingOperation {
    fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_become(next),
            "illegal transition {:?} -> {:?}",
            self.phase,
            next
        );
        tracing::debug!(seq = self.seq, from = ?self.phase, to = ?next, "phase change");
        self.phase = next;
    }
}

/// Owns the optimistic view of one job and its submission queue
pub struct Reconciler<A, S> {
    authority: A,
    sink: S,
    timeout: Duration,
    verify_positions: bool,
    current: TaskSet,
    pending: VecDeque<PendingOperation>,
    next_seq: u64,
}

impl<A: OrderingAuthority, S: DiagnosticSink> Reconciler<A, S> {
    pub fn new(authority: A, sink: S, tasks: TaskSet, config: &SyncConfig) -> Self {
        Reconciler {
            authority,
            sink,
            timeout: Duration::from_millis(config.timeout_ms),
            verify_positions: config.verify_positions,
            current: tasks,
            pending: VecDeque::new(),
            next_seq: 1,
        }
    }

    /// The optimistic view, including every staged operation
    pub fn tasks(&self) -> &TaskSet {
        &self.current
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Sequence numbers and phases of queued operations, oldest first
    pub fn queue(&self) -> Vec<(u64, Phase)> {
        self.pending.iter().map(|op| (op.seq, op.phase)).collect()
    }

    pub fn authority(&self) -> &A {
        &self.authority
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_tasks(self) -> TaskSet {
        self.current
    }

    /// Predict an operation and queue it for submission.
    ///
    /// Engine errors leave both the view and the queue untouched.
    pub fn stage(&mut self, updates: Vec<RelativePositionUpdate>) -> Result<Staged, EngineError> {
        let outcome = positioning::apply(&self.current, &updates)?;
        let seq = self.next_seq;
        self.next_seq += 1;

        let snapshot = std::mem::replace(&mut self.current, outcome.tasks.clone());
        tracing::debug!(seq, updates = updates.len(), "staged reorder");
        self.pending.push_back(PendingOperation {
            seq,
            updates,
            snapshot,
            predicted: outcome.tasks,
            phase: Phase::Predicted,
        });
        Ok(Staged {
            seq,
            operations: outcome.operations,
        })
    }

    /// Submit every queued operation in order
    pub fn flush(&mut self) -> Vec<Outcome> {
        let mut outcomes = Vec::with_capacity(self.pending.len());
        while let Some(mut op) = self.pending.pop_front() {
            let span = tracing::info_span!(
                "reconcile",
                job_id = %self.current.job_id,
                seq = op.seq,
                updates = op.updates.len()
            );
            let _guard = span.enter();

            op.advance(Phase::Submitted);
            match self.authority.submit(&self.current.job_id, &op.updates, self.timeout) {
                Ok(reply) => {
                    let drift = match self.authoritative(reply) {
                        Some(actual) => self.detect_drift(&op, &actual),
                        None => Vec::new(),
                    };
                    op.advance(Phase::Committed);
                    tracing::info!(drift = drift.len(), "reorder committed");
                    outcomes.push(Outcome::Committed { seq: op.seq, drift });
                }
                Err(error) => {
                    op.advance(Phase::RolledBack);
                    tracing::error!(error = %error, "reorder failed, rolling back");
                    self.sink.emit(DiagnosticEvent::new(
                        EventKind::ReconciliationFailure,
                        error.to_string(),
                        json!({
                            "job_id": self.current.job_id,
                            "seq": op.seq,
                            "updates": op.updates,
                        }),
                    ));
                    self.current = op.snapshot;
                    outcomes.push(Outcome::RolledBack {
                        seq: op.seq,
                        error,
                    });
                    self.cancel_queued(&mut outcomes);
                    break;
                }
            }
        }
        outcomes
    }

    /// Stage one operation and flush the queue.
    ///
    /// On failure the view is back to what it was before the failing
    /// operation was staged.
    pub fn submit(
        &mut self,
        updates: Vec<RelativePositionUpdate>,
    ) -> Result<SubmitReport, ReconcileError> {
        let staged = self.stage(updates)?;
        let outcomes = self.flush();
        let mine = outcomes.into_iter().find(|o| o.seq() == staged.seq);
        match mine {
            Some(Outcome::Committed { seq, drift }) => Ok(SubmitReport {
                seq,
                operations: staged.operations,
                drift,
            }),
            Some(Outcome::RolledBack { error, .. }) => Err(ReconcileError::Failure {
                message: failure_message(&error),
                source: error,
            }),
            Some(Outcome::Cancelled { .. }) | None => {
                Err(ReconcileError::Cancelled { seq: staged.seq })
            }
        }
    }

    /// Adopt authoritative data fetched elsewhere.
    ///
    /// Ignored while operations are queued, since the optimistic view would
    /// lose their effects. Returns whether the data was adopted.
    pub fn refresh(&mut self, tasks: TaskSet) -> bool {
        if !self.pending.is_empty() {
            tracing::debug!(pending = self.pending.len(), "refresh deferred");
            return false;
        }
        self.current = tasks;
        true
    }

    fn authoritative(&mut self, reply: SubmitReply) -> Option<TaskSet> {
        let job_id = self.current.job_id.clone();
        match reply {
            SubmitReply::Tasks(tasks) => Some(TaskSet::new(job_id, tasks)),
            SubmitReply::Ack if self.verify_positions => {
                match self.authority.fetch(&job_id, self.timeout) {
                    Ok(tasks) => Some(TaskSet::new(job_id, tasks)),
                    Err(e) => {
                        tracing::warn!(error = %e, "could not fetch positions for verification");
                        None
                    }
                }
            }
            SubmitReply::Ack => None,
        }
    }

    fn detect_drift(&mut self, op: &PendingOperation, actual: &TaskSet) -> Vec<Drift> {
        let drift = compare(&op.predicted, actual);
        if drift.is_empty() {
            return drift;
        }
        for d in &drift {
            tracing::warn!(
                task_id = %d.task_id,
                predicted = ?d.predicted,
                actual = ?d.actual,
                "position drift"
            );
        }
        self.sink.emit(DiagnosticEvent::new(
            EventKind::Drift,
            format!("{} task(s) differ from the predicted order", drift.len()),
            json!({
                "job_id": actual.job_id,
                "seq": op.seq,
                "sent": op.updates,
                "tasks": drift,
            }),
        ));
        drift
    }

    fn cancel_queued(&mut self, outcomes: &mut Vec<Outcome>) {
        for mut op in self.pending.drain(..) {
            op.advance(Phase::Cancelled);
            tracing::warn!(seq = op.seq, "queued reorder cancelled");
            self.sink.emit(DiagnosticEvent::new(
                EventKind::Cancelled,
                format!("operation {} cancelled", op.seq),
                json!({
                    "job_id": self.current.job_id,
                    "seq": op.seq,
                    "updates": op.updates,
                }),
            ));
            outcomes.push(Outcome::Cancelled { seq: op.seq });
        }
    }
}

fn failure_message(error: &AuthorityError) -> String {
    match error {
        AuthorityError::Timeout(_) => {
            "Reorder timed out. The previous order has been restored.".to_string()
        }
        AuthorityError::Rejected(_) | AuthorityError::Transport(_) => {
            "Reorder could not be saved. The previous order has been restored.".to_string()
        }
    }
}

/// Per-task differences between a predicted and an authoritative job
pub fn compare(predicted: &TaskSet, actual: &TaskSet) -> Vec<Drift> {
    let slot = |set: &TaskSet, id: &str| {
        set.get(id).map(|t| Slot {
            parent_id: t.parent_id.clone(),
            position: t.position,
        })
    };
    let mut drift: Vec<Drift> = predicted
        .iter()
        .filter_map(|t| {
            let p = slot(predicted, &t.id);
            let a = slot(actual, &t.id);
            (p != a).then(|| Drift {
                task_id: t.id.clone(),
                predicted: p,
                actual: a,
            })
        })
        .collect();
    drift.extend(
        actual
            .iter()
            .filter(|t| !predicted.contains(&t.id))
            .map(|t| Drift {
                task_id: t.id.clone(),
                predicted: None,
                actual: slot(actual, &t.id),
            }),
    );
    drift
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::Task;
    use crate::model::update::Anchor;
    use crate::sync::authority::InMemoryAuthority;

    fn job() -> TaskSet {
        TaskSet::new(
            "J-1",
            vec![
                Task::new("A", "a", 1),
                Task::new("B", "b", 2),
                Task::new("C", "c", 3),
            ],
        )
    }

    fn move_to(id: &str, anchor: Anchor) -> Vec<RelativePositionUpdate> {
        vec![RelativePositionUpdate::new(id, None, anchor)]
    }

    /// Fails every submission with the given error
    struct Failing(AuthorityError);

    impl OrderingAuthority for Failing {
        fn submit(
            &mut self,
            _: &str,
            _: &[RelativePositionUpdate],
            _: Duration,
        ) -> Result<SubmitReply, AuthorityError> {
            Err(self.0.clone())
        }

        fn fetch(&mut self, _: &str, _: Duration) -> Result<Vec<Task>, AuthorityError> {
            Err(self.0.clone())
        }
    }

    /// Accepts everything but reports a fixed task list
    struct Stale(Vec<Task>);

    impl OrderingAuthority for Stale {
        fn submit(
            &mut self,
            _: &str,
            _: &[RelativePositionUpdate],
            _: Duration,
        ) -> Result<SubmitReply, AuthorityError> {
            Ok(SubmitReply::Tasks(self.0.clone()))
        }

        fn fetch(&mut self, _: &str, _: Duration) -> Result<Vec<Task>, AuthorityError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn successful_submit_keeps_prediction() {
        let authority = InMemoryAuthority::new().with_job(job());
        let mut rec = Reconciler::new(authority, Vec::new(), job(), &SyncConfig::default());
        let report = rec.submit(move_to("A", Anchor::Last)).unwrap();
        assert_eq!(report.seq, 1);
        assert!(report.drift.is_empty());
        assert_eq!(rec.tasks().scope(None), vec!["B", "C", "A"]);
        assert_eq!(
            rec.authority().job("J-1").unwrap().scope(None),
            vec!["B", "C", "A"]
        );
        assert!(rec.sink().is_empty());
    }

    #[test]
    fn failure_restores_snapshot_exactly() {
        let before = job();
        let mut rec = Reconciler::new(
            Failing(AuthorityError::Timeout(Duration::from_millis(10))),
            Vec::new(),
            before.clone(),
            &SyncConfig::default(),
        );
        let err = rec.submit(move_to("C", Anchor::First)).unwrap_err();
        assert_eq!(rec.tasks(), &before);
        assert_eq!(
            err.user_message(),
            "Reorder timed out. The previous order has been restored."
        );
        assert_eq!(rec.sink().len(), 1);
        assert_eq!(rec.sink()[0].kind, EventKind::ReconciliationFailure);
    }

    #[test]
    fn engine_error_sends_nothing() {
        let mut rec = Reconciler::new(
            InMemoryAuthority::new().with_job(job()),
            Vec::new(),
            job(),
            &SyncConfig::default(),
        );
        let err = rec
            .submit(vec![RelativePositionUpdate::new("A", Some("A"), Anchor::Last)])
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Engine(EngineError::CircularNesting { .. })
        ));
        assert_eq!(rec.tasks(), &job());
        assert!(rec.authority().submissions().is_empty());
        assert_eq!(rec.pending(), 0);
    }

    #[test]
    fn failure_cancels_later_queued_operations() {
        let before = job();
        let mut rec = Reconciler::new(
            Failing(AuthorityError::Transport("connection reset".into())),
            Vec::new(),
            before.clone(),
            &SyncConfig::default(),
        );
        rec.stage(move_to("A", Anchor::Last)).unwrap();
        rec.stage(move_to("B", Anchor::Last)).unwrap();
        assert_eq!(rec.tasks().scope(None), vec!["C", "A", "B"]);
        assert_eq!(rec.queue(), vec![(1, Phase::Predicted), (2, Phase::Predicted)]);

        let outcomes = rec.flush();
        assert_eq!(
            outcomes,
            vec![
                Outcome::RolledBack {
                    seq: 1,
                    error: AuthorityError::Transport("connection reset".into())
                },
                Outcome::Cancelled { seq: 2 },
            ]
        );
        assert_eq!(rec.tasks(), &before);
        let kinds: Vec<EventKind> = rec.sink().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::ReconciliationFailure, EventKind::Cancelled]);
    }

    #[test]
    fn queued_operations_are_sent_in_order() {
        let authority = InMemoryAuthority::new().with_job(job());
        let mut rec = Reconciler::new(authority, Vec::new(), job(), &SyncConfig::default());
        rec.stage(move_to("A", Anchor::Last)).unwrap();
        rec.stage(move_to("C", Anchor::First)).unwrap();
        let outcomes = rec.flush();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(rec.tasks().scope(None), vec!["C", "B", "A"]);
        let sent: Vec<&str> = rec
            .authority()
            .submissions()
            .iter()
            .map(|(_, u)| u[0].id.as_str())
            .collect();
        assert_eq!(sent, vec!["A", "C"]);
    }

    #[test]
    fn drift_is_reported_without_rollback() {
        // authority kept the original order
        let mut rec = Reconciler::new(
            Stale(job().iter().cloned().collect()),
            Vec::new(),
            job(),
            &SyncConfig::default(),
        );
        let report = rec.submit(move_to("A", Anchor::Last)).unwrap();
        assert_eq!(report.drift.len(), 3);
        assert_eq!(
            report.drift[0],
            Drift {
                task_id: "A".into(),
                predicted: Some(Slot {
                    parent_id: None,
                    position: 3
                }),
                actual: Some(Slot {
                    parent_id: None,
                    position: 1
                }),
            }
        );
        assert_eq!(rec.tasks().scope(None), vec!["B", "C", "A"]);
        assert_eq!(rec.sink().len(), 1);
        assert_eq!(rec.sink()[0].kind, EventKind::Drift);
        assert_eq!(rec.sink()[0].details["seq"], 1);
    }

    #[test]
    fn verification_fetch_only_when_enabled() {
        let config = SyncConfig {
            verify_positions: true,
            ..SyncConfig::default()
        };
        let authority = InMemoryAuthority::new().with_job(job());
        let mut rec = Reconciler::new(authority, Vec::new(), job(), &config);
        let report = rec.submit(move_to("B", Anchor::First)).unwrap();
        assert!(report.drift.is_empty());
        assert!(rec.sink().is_empty());
    }

    #[test]
    fn refresh_waits_for_empty_queue() {
        let mut rec = Reconciler::new(
            InMemoryAuthority::new().with_job(job()),
            Vec::new(),
            job(),
            &SyncConfig::default(),
        );
        let fresh = TaskSet::new("J-1", vec![Task::new("Z", "z", 1)]);
        rec.stage(move_to("A", Anchor::Last)).unwrap();
        assert!(!rec.refresh(fresh.clone()));
        rec.flush();
        assert!(rec.refresh(fresh.clone()));
        assert_eq!(rec.tasks(), &fresh);
    }

    #[test]
    fn compare_reports_unexpected_tasks() {
        let predicted = TaskSet::new("J-1", vec![Task::new("A", "a", 1)]);
        let actual = TaskSet::new(
            "J-1",
            vec![Task::new("A", "a", 1), Task::new("N", "n", 2)],
        );
        let drift = compare(&predicted, &actual);
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].task_id, "N");
        assert!(drift[0].predicted.is_none());
    }
}
