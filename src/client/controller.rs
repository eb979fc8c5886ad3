//! Reconciliation controller: optimistic local board, reconciled against the
//! server after every gesture.
//!
//! Each gesture mutates the local [`Dashboard`] and records how to undo it
//! before the first `.await`, so the board reflects the user's intent
//! immediately and gestures can be interleaved with `tokio::spawn`. While a
//! call is in flight the task is marked reconciling, and its optimistic
//! effect is kept as an overlay that is replayed over every board fetched
//! before the call is answered. When the call fails the controller either
//! re-fetches the whole board or applies the recorded inverse, depending on
//! [`FailurePolicy`]. A failed gesture is never left silently applied.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use jobboard_common::protocol::{
    AddJobRequest, DeleteTaskRequest, EditJobRequest, JobFields, MoveTaskRequest,
};
use jobboard_common::{Dashboard, Location, Task, validate};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::transport::{SyncTransport, TransportError};
use crate::errors::ClientError;

/// Prefix of ids minted for tasks the server has not acknowledged yet.
/// Server ids are decimal integers, so the two can never collide.
pub const PROVISIONAL_PREFIX: &str = "local-";

const EVENT_CAPACITY: usize = 256;

/// What to do with the local board when a server call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Replace the local board with a fresh fetch.
    #[default]
    Refetch,
    /// Undo just the failed gesture.
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOp {
    Move,
    Add,
    Edit,
    Delete,
}

impl std::fmt::Display for SyncOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncOp::Move => "move",
            SyncOp::Add => "add",
            SyncOp::Edit => "edit",
            SyncOp::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// How a gesture ended once the server had answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The gesture changed nothing, so no call was made.
    Unchanged,
    /// The server accepted the change. `task_id` is the server's id.
    Confirmed { task_id: String },
    /// The call failed and the gesture was undone locally.
    RolledBack { error: TransportError },
    /// The call failed and the board was replaced with server truth.
    Resynced { error: TransportError },
}

impl SyncOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, SyncOutcome::Confirmed { .. })
    }
}

/// Progress notifications for observers of the board (UI, CLI, tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Applied { op: SyncOp, task_id: String },
    Confirmed { op: SyncOp, task_id: String },
    Failed { op: SyncOp, task_id: String, error: TransportError },
    RolledBack { op: SyncOp, task_id: String },
    Resynced,
    ResyncFailed { error: TransportError },
}

/// Undo record of one gesture. Applied by task id, so it stays valid when
/// later gestures have shifted indices.
#[derive(Debug, Clone)]
enum Inverse {
    /// Put the task back at `location`, dropping whatever copy is on the board.
    Restore { task: Task, location: Location },
    /// Drop a task that did not exist before the gesture.
    Discard { task_id: String },
}

/// Optimistic effect of a gesture whose call has not been answered.
#[derive(Debug, Clone)]
enum Overlay {
    Insert { column: String, task: Task },
    Move { task_id: String, to: Location },
    Replace { task: Task, column: String },
    Remove { task_id: String },
}

impl Overlay {
    /// Re-apply on a board fetched from the server. Effects the server has
    /// already absorbed are no-ops.
    fn apply(&self, dashboard: &mut Dashboard) {
        let result = match self {
            Overlay::Insert { column, task } => {
                if dashboard.find(&task.id).is_some() {
                    return;
                }
                dashboard.insert_task(column, None, task.clone()).map(|_| ())
            }
            Overlay::Move { task_id, to } => {
                let Some(from) = dashboard.find(task_id) else {
                    return;
                };
                let len = dashboard.column(&to.column).map_or(0, |c| c.tasks.len());
                let last = if from.column == to.column { len.saturating_sub(1) } else { len };
                let to = Location::new(to.column.clone(), to.index.min(last));
                if from == to {
                    return;
                }
                dashboard.move_task(&from, &to).map(|_| ())
            }
            Overlay::Replace { task, column } => {
                if dashboard.find(&task.id).is_none() {
                    return;
                }
                dashboard.replace_task(task.clone(), column).map(|_| ())
            }
            Overlay::Remove { task_id } => {
                if dashboard.find(task_id).is_none() {
                    return;
                }
                dashboard.remove_task(task_id).map(|_| ())
            }
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "pending gesture not replayed");
        }
    }
}

#[derive(Debug)]
struct LocalState {
    dashboard: Dashboard,
    in_flight: HashMap<String, usize>,
    /// Unanswered gestures by sequence number, oldest first.
    overlays: BTreeMap<u64, Overlay>,
    next_seq: u64,
}

impl LocalState {
    /// Adopt a fetched board, then replay every unanswered gesture on it.
    fn adopt(&mut self, dashboard: Dashboard) {
        self.dashboard = dashboard;
        for overlay in self.overlays.values() {
            overlay.apply(&mut self.dashboard);
        }
    }
}

pub struct ReconciliationController<T> {
    transport: T,
    state: Mutex<LocalState>,
    events: broadcast::Sender<SyncEvent>,
    policy: FailurePolicy,
    timeout: Option<Duration>,
}

impl<T: SyncTransport> ReconciliationController<T> {
    pub fn new(transport: T) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            state: Mutex::new(LocalState {
                dashboard: Dashboard::empty(),
                in_flight: HashMap::new(),
                overlays: BTreeMap::new(),
                next_seq: 0,
            }),
            events,
            policy: FailurePolicy::default(),
            timeout: None,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Give up on a server call after `timeout` and treat it as failed.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the local board.
    pub fn dashboard(&self) -> Dashboard {
        self.lock().dashboard.clone()
    }

    /// True while a server call for `task_id` has not been answered.
    pub fn is_reconciling(&self, task_id: &str) -> bool {
        self.lock().in_flight.contains_key(task_id)
    }

    pub fn pending(&self) -> usize {
        self.lock().in_flight.values().sum()
    }

    /// Replace the local board with the server's. Gestures still in flight
    /// stay applied on top of it.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let dashboard = self.call(self.transport.fetch()).await?;
        self.lock().adopt(dashboard);
        self.emit(SyncEvent::Resynced);
        Ok(())
    }

    /// Drag a card from `from` to `to`.
    pub async fn drag(&self, from: Location, to: Location) -> Result<SyncOutcome, ClientError> {
        if from == to {
            return Ok(SyncOutcome::Unchanged);
        }
        let dest_col = validate::column_key("destCol", &to.column)?;

        let (task_id, seq, inverse) = {
            let mut state = self.lock();
            if let Some(task) = state
                .dashboard
                .column(&from.column)
                .and_then(|c| c.tasks.get(from.index))
            {
                confirmed(&task.id)?;
            }
            let task = state.dashboard.move_task(&from, &to)?;
            let inverse = Inverse::Restore {
                task: task.clone(),
                location: from.clone(),
            };
            let seq = begin(
                &mut state,
                &task.id,
                Overlay::Move {
                    task_id: task.id.clone(),
                    to: to.clone(),
                },
            );
            (task.id, seq, inverse)
        };
        self.emit(SyncEvent::Applied {
            op: SyncOp::Move,
            task_id: task_id.clone(),
        });

        let req = MoveTaskRequest {
            task_id: task_id.clone(),
            source_col: from.column,
            dest_col,
            dest_index: Some(to.index as i64),
        };
        let result = self.call(self.transport.move_task(&req)).await;
        Ok(self.settle(SyncOp::Move, &task_id, seq, result, inverse).await)
    }

    /// Add a job as a new card at the end of its status column.
    pub async fn add(&self, req: AddJobRequest) -> Result<SyncOutcome, ClientError> {
        let fields = req.validate()?;
        let provisional = format!("{}{}", PROVISIONAL_PREFIX, uuid::Uuid::new_v4());
        let task = Task {
            id: provisional.clone(),
            content: fields.title.clone(),
            company: fields.company.clone(),
            added_at: Utc::now(),
            description: fields.description.clone(),
        };
        let seq = {
            let mut state = self.lock();
            state.dashboard.insert_task(&fields.status, None, task.clone())?;
            begin(
                &mut state,
                &provisional,
                Overlay::Insert {
                    column: fields.status.clone(),
                    task: task.clone(),
                },
            )
        };
        self.emit(SyncEvent::Applied {
            op: SyncOp::Add,
            task_id: provisional.clone(),
        });

        let req = AddJobRequest {
            title: fields.title,
            company: fields.company,
            status: fields.status.clone(),
            description: fields.description,
        };
        let result = self.call(self.transport.add(&req)).await;
        let inverse = Inverse::Discard {
            task_id: provisional.clone(),
        };
        match result {
            Ok(server_id) => {
                {
                    let mut state = self.lock();
                    finish(&mut state, &provisional, seq);
                    adopt_server_id(&mut state.dashboard, task, &fields.status, &server_id);
                }
                tracing::debug!(provisional = %provisional, task_id = %server_id, "add confirmed");
                self.emit(SyncEvent::Confirmed {
                    op: SyncOp::Add,
                    task_id: server_id.clone(),
                });
                Ok(SyncOutcome::Confirmed { task_id: server_id })
            }
            Err(error) => Ok(self
                .settle(SyncOp::Add, &provisional, seq, Err(error), inverse)
                .await),
        }
    }

    /// Overwrite a card's fields, moving it when the status changes.
    pub async fn edit(&self, task_id: &str, req: EditJobRequest) -> Result<SyncOutcome, ClientError> {
        let fields = req.validate()?;
        confirmed(task_id)?;
        let (seq, inverse) = {
            let mut state = self.lock();
            let location = state
                .dashboard
                .find(task_id)
                .ok_or_else(|| jobboard_common::BoardError::TaskNotFound(task_id.to_string()))?;
            let old = state
                .dashboard
                .task(task_id)
                .cloned()
                .ok_or_else(|| jobboard_common::BoardError::TaskNotFound(task_id.to_string()))?;
            let updated = edited_task(&old, &fields);
            if updated == old && location.column == fields.status {
                return Ok(SyncOutcome::Unchanged);
            }
            state.dashboard.replace_task(updated.clone(), &fields.status)?;
            let seq = begin(
                &mut state,
                task_id,
                Overlay::Replace {
                    task: updated,
                    column: fields.status.clone(),
                },
            );
            (seq, Inverse::Restore { task: old, location })
        };
        self.emit(SyncEvent::Applied {
            op: SyncOp::Edit,
            task_id: task_id.to_string(),
        });

        let req = EditJobRequest {
            title: fields.title,
            company: fields.company,
            status: fields.status,
            description: fields.description,
        };
        let result = self.call(self.transport.edit(task_id, &req)).await;
        Ok(self.settle(SyncOp::Edit, task_id, seq, result, inverse).await)
    }

    /// Remove a card.
    pub async fn delete(&self, task_id: &str) -> Result<SyncOutcome, ClientError> {
        confirmed(task_id)?;
        let (seq, inverse) = {
            let mut state = self.lock();
            let (task, location) = state.dashboard.remove_task(task_id)?;
            let seq = begin(
                &mut state,
                task_id,
                Overlay::Remove {
                    task_id: task_id.to_string(),
                },
            );
            (seq, Inverse::Restore { task, location })
        };
        self.emit(SyncEvent::Applied {
            op: SyncOp::Delete,
            task_id: task_id.to_string(),
        });

        let req = DeleteTaskRequest {
            task_id: task_id.to_string(),
        };
        let result = self.call(self.transport.delete(&req)).await;
        Ok(self.settle(SyncOp::Delete, task_id, seq, result, inverse).await)
    }

    // ── Reconciliation ────────────────────────────────────────────────

    async fn settle(
        &self,
        op: SyncOp,
        task_id: &str,
        seq: u64,
        result: Result<(), TransportError>,
        inverse: Inverse,
    ) -> SyncOutcome {
        let error = match result {
            Ok(()) => {
                finish(&mut self.lock(), task_id, seq);
                tracing::debug!(%op, task_id, "gesture confirmed");
                self.emit(SyncEvent::Confirmed {
                    op,
                    task_id: task_id.to_string(),
                });
                return SyncOutcome::Confirmed {
                    task_id: task_id.to_string(),
                };
            }
            Err(error) => error,
        };

        tracing::warn!(%op, task_id, error = %error, policy = ?self.policy, "gesture failed");
        self.emit(SyncEvent::Failed {
            op,
            task_id: task_id.to_string(),
            error: error.clone(),
        });

        if self.policy == FailurePolicy::Refetch {
            match self.call(self.transport.fetch()).await {
                Ok(dashboard) => {
                    {
                        let mut state = self.lock();
                        finish(&mut state, task_id, seq);
                        state.adopt(dashboard);
                    }
                    self.emit(SyncEvent::Resynced);
                    return SyncOutcome::Resynced { error };
                }
                Err(fetch_error) => {
                    tracing::warn!(error = %fetch_error, "resync failed, rolling back instead");
                    self.emit(SyncEvent::ResyncFailed { error: fetch_error });
                }
            }
        }

        {
            let mut state = self.lock();
            finish(&mut state, task_id, seq);
            undo(&mut state.dashboard, inverse);
        }
        self.emit(SyncEvent::RolledBack {
            op,
            task_id: task_id.to_string(),
        });
        SyncOutcome::RolledBack { error }
    }

    async fn call<R>(
        &self,
        fut: impl Future<Output = Result<R, TransportError>>,
    ) -> Result<R, TransportError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => fut.await,
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, LocalState> {
        // The state is always left consistent between statements, so a
        // poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Mark `task_id` reconciling and record the gesture's overlay. Returns the
/// gesture's sequence number.
fn begin(state: &mut LocalState, task_id: &str, overlay: Overlay) -> u64 {
    *state.in_flight.entry(task_id.to_string()).or_insert(0) += 1;
    let seq = state.next_seq;
    state.next_seq += 1;
    state.overlays.insert(seq, overlay);
    seq
}

fn finish(state: &mut LocalState, task_id: &str, seq: u64) {
    state.overlays.remove(&seq);
    if let Some(count) = state.in_flight.get_mut(task_id) {
        *count -= 1;
        if *count == 0 {
            state.in_flight.remove(task_id);
        }
    }
}

/// Gestures on a card the server has not acknowledged would reach the server
/// under an id it never issued.
fn confirmed(task_id: &str) -> Result<(), ClientError> {
    if task_id.starts_with(PROVISIONAL_PREFIX) {
        return Err(ClientError::Unconfirmed(task_id.to_string()));
    }
    Ok(())
}

/// Swap a confirmed card's provisional id for the server's. A refresh that
/// raced the add may already hold the server copy, or may have dropped the
/// provisional card.
fn adopt_server_id(dashboard: &mut Dashboard, task: Task, column: &str, server_id: &str) {
    let provisional = task.id.clone();
    if dashboard.find(server_id).is_some() {
        let _ = dashboard.remove_task(&provisional);
        return;
    }
    if dashboard.rename_task(&provisional, server_id).is_ok() {
        return;
    }
    let task = Task {
        id: server_id.to_string(),
        ..task
    };
    if let Err(e) = dashboard.insert_task(column, None, task) {
        tracing::debug!(error = %e, "confirmed task not placed");
    }
}

fn undo(dashboard: &mut Dashboard, inverse: Inverse) {
    match inverse {
        Inverse::Restore { task, location } => {
            let _ = dashboard.remove_task(&task.id);
            if let Err(e) = dashboard.insert_task(&location.column, Some(location.index), task) {
                tracing::debug!(error = %e, "rollback could not restore task");
            }
        }
        Inverse::Discard { task_id } => {
            let _ = dashboard.remove_task(&task_id);
        }
    }
}

fn edited_task(old: &Task, fields: &JobFields) -> Task {
    Task {
        id: old.id.clone(),
        content: fields.title.clone(),
        company: fields.company.clone(),
        added_at: old.added_at,
        description: fields.description.clone(),
    }
}
