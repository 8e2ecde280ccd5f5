//! Single-flight synchronization engine.
//!
//! [`Synchronizer`] owns everything a repository shares between concurrent
//! callers: the [`RepositoryState`], the one sync task currently allowed to
//! write that state back, and the observer registry. All three sit behind a
//! single async mutex, which is never held across a pull or push.
//!
//! # Task lifecycle
//!
//! ```text
//! start ──► assign_task (cancels previous) ──► body spawned
//!                                                │
//!                       ┌── cancelled ◄──────────┤ select
//!                       │                        │
//!                       ▼                        ▼
//!                  Cancelled             complete(id) under lock
//!                                        ├─ not current ─► Cancelled
//!                                        ├─ Ok  ─► Synced(value)
//!                                        └─ Err ─► demote, notify
//! ```
//!
//! Waiters never see `Cancelled`: [`Synchronizer::await_task`] re-reads the
//! current task and awaits that one instead.

use std::fmt;
use std::sync::{Arc, Weak};

use basekit_repo_core::{
    ObserverRegistry, RepositoryData, RepositoryObserver, RepositoryState, SourceError, SyncError,
};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Which way a sync moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    /// Pull from the source into memory.
    Downstream,
    /// Push the in-memory value to the source.
    Upstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Downstream => write!(f, "downstream"),
            Self::Upstream => write!(f, "upstream"),
        }
    }
}

/// The I/O a sync task performs, chosen from the state it starts from.
pub(crate) struct Operation<T> {
    direction: Direction,
    io: BoxFuture<'static, Result<T, SourceError>>,
}

impl<T> Operation<T> {
    pub(crate) fn downstream(io: BoxFuture<'static, Result<T, SourceError>>) -> Self {
        Self {
            direction: Direction::Downstream,
            io,
        }
    }

    pub(crate) fn upstream(io: BoxFuture<'static, Result<T, SourceError>>) -> Self {
        Self {
            direction: Direction::Upstream,
            io,
        }
    }
}

/// How a sync request is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Join the running task if it started from the present state.
    Join,
    /// Always start a new task, superseding the running one.
    Fresh,
}

/// What a task resolves to, as seen by waiters.
#[derive(Debug, Clone)]
enum TaskOutcome<T> {
    Done(T),
    Failed(SyncError),
    Cancelled,
}

type SharedOutcome<T> = Shared<BoxFuture<'static, TaskOutcome<T>>>;

/// A spawned sync operation.
struct SyncTask<T> {
    id: Uuid,
    origin: RepositoryState<T>,
    cancel: CancellationToken,
    outcome: SharedOutcome<T>,
    settled: bool,
}

struct Inner<T> {
    state: RepositoryState<T>,
    task: Option<SyncTask<T>>,
    observers: ObserverRegistry<T>,
}

impl<T: RepositoryData> Inner<T> {
    /// Compare-and-store. Observers hear about data they have not seen yet,
    /// and about a reset to `Initial` as a failure.
    fn store(&mut self, new_state: RepositoryState<T>) -> bool {
        if self.state == new_state {
            return false;
        }

        let previous = std::mem::replace(&mut self.state, new_state);

        match self.state.data() {
            Some(data) if previous.data() != Some(data) => {
                self.observers.notify(|o| o.on_data_changed(data));
            }
            Some(_) => {}
            None => self.observers.notify(|o| o.on_sync_failed(&SyncError::Reset)),
        }

        true
    }

    /// Make `task` the only one allowed to write back, cancelling the
    /// previous one.
    fn assign_task(&mut self, task: SyncTask<T>) {
        if let Some(previous) = self.task.replace(task) {
            previous.cancel.cancel();
        }
    }

    fn is_current(&self, id: Uuid) -> bool {
        self.task.as_ref().is_some_and(|task| task.id == id)
    }
}

/// Serialized owner of a repository's state, sync task and observers.
pub(crate) struct Synchronizer<T> {
    inner: Mutex<Inner<T>>,
    label: String,
    max_supersessions: u32,
}

impl<T: RepositoryData> Synchronizer<T> {
    pub(crate) fn new(label: &str, max_supersessions: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RepositoryState::Initial,
                task: None,
                observers: ObserverRegistry::new(),
            }),
            label: label.to_string(),
            max_supersessions,
        }
    }

    /// Snapshot of the current state.
    pub(crate) async fn state(&self) -> RepositoryState<T> {
        self.inner.lock().await.state.clone()
    }

    /// Store `new_state`, returning whether it differed from the current one.
    #[cfg(test)]
    pub(crate) async fn set_state(&self, new_state: RepositoryState<T>) -> bool {
        self.inner.lock().await.store(new_state)
    }

    pub(crate) async fn add_observer<O>(&self, observer: &Arc<O>)
    where
        O: RepositoryObserver<T> + 'static,
    {
        self.inner.lock().await.observers.add(observer);
    }

    pub(crate) async fn remove_observer<O>(&self, observer: &Arc<O>)
    where
        O: RepositoryObserver<T> + 'static,
    {
        self.inner.lock().await.observers.remove(observer);
    }

    /// Admit a sync request and return the id of the task that serves it.
    ///
    /// `dispatch` is only called when a new task is created; it receives the
    /// state the task starts from.
    pub(crate) async fn start<F>(self: &Arc<Self>, admission: Admission, dispatch: F) -> Uuid
    where
        F: FnOnce(&RepositoryState<T>) -> Operation<T>,
    {
        let mut inner = self.inner.lock().await;
        self.admit(&mut inner, admission, dispatch)
    }

    /// Stage a local write as unconfirmed data and admit the sync that
    /// confirms it, in one critical section.
    ///
    /// Returns `None`, leaving everything untouched, when `value` is already
    /// the synced value.
    pub(crate) async fn stage_and_start<F>(self: &Arc<Self>, value: T, dispatch: F) -> Option<Uuid>
    where
        F: FnOnce(&RepositoryState<T>) -> Operation<T>,
    {
        let mut inner = self.inner.lock().await;
        if matches!(&inner.state, RepositoryState::Synced(current) if *current == value) {
            return None;
        }
        inner.store(RepositoryState::NotSynced(value));
        Some(self.admit(&mut inner, Admission::Join, dispatch))
    }

    fn admit<F>(self: &Arc<Self>, inner: &mut Inner<T>, admission: Admission, dispatch: F) -> Uuid
    where
        F: FnOnce(&RepositoryState<T>) -> Operation<T>,
    {
        if admission == Admission::Join {
            if let Some(task) = inner.task.as_ref() {
                if !task.settled && task.origin == inner.state {
                    tracing::debug!(
                        repository = %self.label,
                        task = %task.id,
                        "Joining in-flight sync"
                    );
                    return task.id;
                }
            }
        }

        let origin = inner.state.clone();
        let operation = dispatch(&origin);
        let task = self.spawn_task(origin, operation);
        let id = task.id;

        if let Some(previous) = inner.task.as_ref().filter(|t| !t.settled) {
            tracing::debug!(
                repository = %self.label,
                task = %id,
                superseded = %previous.id,
                "Superseding in-flight sync"
            );
        }

        inner.assign_task(task);
        id
    }

    fn spawn_task(self: &Arc<Self>, origin: RepositoryState<T>, operation: Operation<T>) -> SyncTask<T> {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let synchronizer: Weak<Self> = Arc::downgrade(self);
        let label = self.label.clone();
        let Operation { direction, io } = operation;

        tracing::debug!(repository = %label, task = %id, "Syncing {}...", direction);

        let body = tokio::spawn(async move {
            // Own task, so superseding never aborts a pull or push midway.
            let io = tokio::spawn(io);

            let joined = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!(
                        repository = %label,
                        task = %id,
                        "Syncing {}... CANCEL: superseded",
                        direction
                    );
                    return TaskOutcome::Cancelled;
                }
                joined = io => joined,
            };

            let result = match joined {
                Ok(result) => result.map_err(SyncError::from),
                Err(e) => Err(SyncError::Aborted(e.to_string())),
            };

            match synchronizer.upgrade() {
                Some(synchronizer) => synchronizer.complete(id, direction, &token, result).await,
                None => TaskOutcome::Cancelled,
            }
        });

        let outcome = body
            .map(|joined| match joined {
                Ok(outcome) => outcome,
                Err(e) => TaskOutcome::Failed(SyncError::Aborted(e.to_string())),
            })
            .boxed()
            .shared();

        SyncTask {
            id,
            origin,
            cancel,
            outcome,
            settled: false,
        }
    }

    /// Write back the result of task `id`, unless it was superseded.
    async fn complete(
        &self,
        id: Uuid,
        direction: Direction,
        token: &CancellationToken,
        result: Result<T, SyncError>,
    ) -> TaskOutcome<T> {
        let mut inner = self.inner.lock().await;

        if token.is_cancelled() || !inner.is_current(id) {
            tracing::debug!(
                repository = %self.label,
                task = %id,
                "Syncing {}... CANCEL: result discarded",
                direction
            );
            return TaskOutcome::Cancelled;
        }

        if let Some(task) = inner.task.as_mut() {
            task.settled = true;
        }

        match result {
            Ok(value) => {
                tracing::debug!(
                    repository = %self.label,
                    task = %id,
                    "Syncing {}... OK: {:?}",
                    direction,
                    value
                );
                inner.store(RepositoryState::Synced(value.clone()));
                TaskOutcome::Done(value)
            }
            Err(error) => {
                tracing::warn!(
                    repository = %self.label,
                    task = %id,
                    "Syncing {}... ERR: {}",
                    direction,
                    error
                );
                if let RepositoryState::Synced(data) = &inner.state {
                    let stale = RepositoryState::NotSynced(data.clone());
                    inner.store(stale);
                }
                inner.observers.notify(|o| o.on_sync_failed(&error));
                TaskOutcome::Failed(error)
            }
        }
    }

    /// Await whichever task is current, following supersessions.
    pub(crate) async fn await_task(&self) -> Result<T, SyncError> {
        let mut superseded = 0u32;

        loop {
            let outcome = {
                let inner = self.inner.lock().await;
                match inner.task.as_ref() {
                    Some(task) => task.outcome.clone(),
                    None => return Err(SyncError::NoTask),
                }
            };

            match outcome.await {
                TaskOutcome::Done(value) => return Ok(value),
                TaskOutcome::Failed(error) => return Err(error),
                TaskOutcome::Cancelled => {
                    superseded += 1;
                    if superseded > self.max_supersessions {
                        return Err(SyncError::Superseded(superseded));
                    }
                }
            }
        }
    }
}
