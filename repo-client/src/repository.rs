//! Repository - the public face of a synchronized cache.
//!
//! A [`Repository`] keeps one value of type `T` in memory and keeps it in
//! step with an external source through a [`Puller`] and, for writable
//! repositories, a [`Pusher`].
//!
//! # Architecture
//!
//! ```text
//! Application → Repository → Synchronizer (state, task, observers)
//!                   ↓
//!            Puller / Pusher → Network, disk, platform API
//! ```
//!
//! What a repository can do is fixed by its access marker:
//!
//! | Type                                  | Operations                         |
//! |---------------------------------------|------------------------------------|
//! | `Repository<T, ReadOnly>`             | `get`, `sync`, `resync`, observers |
//! | `Repository<T, ReadWrite>`            | + `set`, `patch`                   |
//! | `Repository<Option<T>, ReadWrite>`    | + `delete`                         |
//!
//! # Example
//!
//! ```ignore
//! use basekit_repo::{MockSource, Repository, RepositoryConfig};
//!
//! let source = Arc::new(MockSource::new("old".to_string()));
//! let repo = Repository::read_write(source, RepositoryConfig::default());
//!
//! assert_eq!(repo.get().await?, "old");
//! repo.set("new".to_string()).await?;
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use basekit_repo_core::{
    RepositoryData, RepositoryError, RepositoryObserver, RepositoryState, SyncError,
};
use futures::FutureExt;
use uuid::Uuid;

use crate::config::RepositoryConfig;
use crate::source::{Puller, Pusher};
use crate::synchronizer::{Admission, Operation, Synchronizer};

mod sealed {
    pub trait Sealed {}
}

/// Marker for what a repository is allowed to do.
pub trait Access: sealed::Sealed + Send + Sync + 'static {}

/// Access marker: data can only be read and synced downstream.
#[derive(Debug, Clone, Copy)]
pub enum ReadOnly {}

/// Access marker: data can also be written and pushed upstream.
#[derive(Debug, Clone, Copy)]
pub enum ReadWrite {}

impl sealed::Sealed for ReadOnly {}
impl sealed::Sealed for ReadWrite {}
impl Access for ReadOnly {}
impl Access for ReadWrite {}

/// A repository whose data is read-only.
pub type ReadOnlyRepository<T> = Repository<T, ReadOnly>;

/// A repository whose data can be read and written.
pub type ReadWriteRepository<T> = Repository<T, ReadWrite>;

/// A repository whose data can be read, written and deleted. `None` is the
/// deleted value.
pub type ReadWriteDeleteRepository<T> = Repository<Option<T>, ReadWrite>;

/// Observable in-memory cache of externally-sourced data.
///
/// Cloning yields another handle to the same cache.
pub struct Repository<T: RepositoryData, A: Access = ReadOnly> {
    synchronizer: Arc<Synchronizer<T>>,
    puller: Arc<dyn Puller<T>>,
    pusher: Option<Arc<dyn Pusher<T>>>,
    config: RepositoryConfig,
    _access: PhantomData<fn() -> A>,
}

impl<T: RepositoryData> Repository<T, ReadOnly> {
    /// Create a read-only repository backed by `source`.
    ///
    /// With auto-sync enabled this kicks off a first pull in the background
    /// (see [`RepositoryConfig::auto_sync`]).
    pub fn read_only<S>(source: Arc<S>, config: RepositoryConfig) -> Self
    where
        S: Puller<T> + 'static,
    {
        Self::build(source, None, config)
    }
}

impl<T: RepositoryData> Repository<T, ReadWrite> {
    /// Create a read/write repository backed by one source that both pulls
    /// and pushes.
    pub fn read_write<S>(source: Arc<S>, config: RepositoryConfig) -> Self
    where
        S: Puller<T> + Pusher<T> + 'static,
    {
        let pusher: Arc<dyn Pusher<T>> = source.clone();
        Self::build(source, Some(pusher), config)
    }

    /// Create a read/write repository from separate pull and push sources.
    pub fn with_sources(
        puller: Arc<dyn Puller<T>>,
        pusher: Arc<dyn Pusher<T>>,
        config: RepositoryConfig,
    ) -> Self {
        Self::build(puller, Some(pusher), config)
    }

    /// Set the data, then push it upstream.
    ///
    /// Setting the value that is already synced does nothing and returns it.
    /// Otherwise the value is held as unconfirmed data until the push
    /// succeeds; if it fails, the next sync pushes it again.
    ///
    /// Returns the value as stored by the source.
    pub async fn set(&self, value: T) -> Result<T, RepositoryError> {
        let id = operation_id("SET");

        tracing::debug!(repository = %self.config.label, op = %id, "Setting data to {:?}...", value);

        let staged = self
            .synchronizer
            .stage_and_start(value.clone(), self.dispatcher())
            .await;
        if staged.is_none() {
            tracing::debug!(repository = %self.config.label, op = %id, "Setting data... SKIP: No change");
            return Ok(value);
        }

        match self.await_sync(&id).await {
            Ok(stored) => {
                tracing::debug!(repository = %self.config.label, op = %id, "Setting data... OK");
                Ok(stored)
            }
            Err(e) => {
                tracing::error!(repository = %self.config.label, op = %id, "Setting data... ERR: {}", e);
                Err(RepositoryError::Write(e))
            }
        }
    }

    /// Apply `mutate` to a copy of the current data and [`set`](Self::set)
    /// the result.
    ///
    /// Fails with [`RepositoryError::PatchWithoutBase`] if nothing has been
    /// synced yet.
    pub async fn patch<F>(&self, mutate: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut T),
    {
        let mut data = self
            .synchronizer
            .state()
            .await
            .into_data()
            .ok_or(RepositoryError::PatchWithoutBase)?;

        mutate(&mut data);
        self.set(data).await
    }
}

impl<T: RepositoryData> Repository<Option<T>, ReadWrite> {
    /// Delete the data, pushing the absence upstream.
    ///
    /// Deleting data that is already deleted succeeds without any I/O.
    pub async fn delete(&self) -> Result<(), RepositoryError> {
        match self.set(None).await {
            Ok(_) => Ok(()),
            Err(RepositoryError::Write(e)) => Err(RepositoryError::Delete(e)),
            Err(e) => Err(e),
        }
    }
}

impl<T: RepositoryData, A: Access> Repository<T, A> {
    fn build(
        puller: Arc<dyn Puller<T>>,
        pusher: Option<Arc<dyn Pusher<T>>>,
        config: RepositoryConfig,
    ) -> Self {
        let repository = Self {
            synchronizer: Arc::new(Synchronizer::new(&config.label, config.max_supersessions)),
            puller,
            pusher,
            config,
            _access: PhantomData,
        };

        if repository.config.auto_sync {
            repository.spawn_initial_sync();
        }

        repository
    }

    // Best effort: the outcome reaches observers and the log, nobody awaits it.
    fn spawn_initial_sync(&self) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::debug!(
                    repository = %self.config.label,
                    "No async runtime, skipping initial sync"
                );
                return;
            }
        };

        let synchronizer = self.synchronizer.clone();
        let dispatch = self.dispatcher();
        handle.spawn(async move {
            synchronizer.start(Admission::Join, dispatch).await;
        });
    }

    /// Pick the I/O for a new sync task: unconfirmed local data is pushed,
    /// anything else is pulled.
    fn dispatcher(&self) -> impl FnOnce(&RepositoryState<T>) -> Operation<T> + Send + 'static {
        let puller = self.puller.clone();
        let pusher = self.pusher.clone();

        move |state: &RepositoryState<T>| match (state, pusher) {
            (RepositoryState::NotSynced(data), Some(pusher)) => {
                let data = data.clone();
                Operation::upstream(async move { pusher.push(data).await }.boxed())
            }
            _ => Operation::downstream(async move { puller.pull().await }.boxed()),
        }
    }

    async fn run_sync(&self, admission: Admission, id: &str) -> Result<T, SyncError> {
        tracing::debug!(repository = %self.config.label, op = %id, "Syncing...");

        self.synchronizer.start(admission, self.dispatcher()).await;
        self.await_sync(id).await
    }

    async fn await_sync(&self, id: &str) -> Result<T, SyncError> {
        let result = self.synchronizer.await_task().await;
        match &result {
            Ok(data) => {
                tracing::debug!(repository = %self.config.label, op = %id, "Syncing... OK: {:?}", data)
            }
            Err(e) => {
                tracing::warn!(repository = %self.config.label, op = %id, "Syncing... ERR: {}", e)
            }
        }
        result
    }

    /// Return the data in memory, syncing first if there is none.
    ///
    /// Stale data (after a failed sync) is returned as is. With auto-sync
    /// disabled and nothing in memory this fails with
    /// [`RepositoryError::NotSynced`] instead of syncing.
    pub async fn get(&self) -> Result<T, RepositoryError> {
        let id = operation_id("GET");

        tracing::debug!(repository = %self.config.label, op = %id, "Getting data...");

        match self.synchronizer.state().await {
            RepositoryState::Synced(data) | RepositoryState::NotSynced(data) => {
                tracing::debug!(repository = %self.config.label, op = %id, "Getting data... OK: {:?}", data);
                Ok(data)
            }
            RepositoryState::Initial if !self.config.auto_sync => {
                tracing::debug!(
                    repository = %self.config.label,
                    op = %id,
                    "Getting data... ERR: not synced and auto-sync is disabled"
                );
                Err(RepositoryError::NotSynced)
            }
            RepositoryState::Initial => {
                tracing::debug!(
                    repository = %self.config.label,
                    op = %id,
                    "Getting data... repository not synced, proceeding to auto sync"
                );
                self.run_sync(Admission::Join, &id)
                    .await
                    .map_err(RepositoryError::Read)
            }
        }
    }

    /// Synchronize with the source.
    ///
    /// Unconfirmed local data is pushed, otherwise the source is pulled. If a
    /// sync from the same state is already running, this waits for it instead
    /// of starting another. Every caller receives the result of the latest
    /// sync.
    pub async fn sync(&self) -> Result<T, SyncError> {
        self.run_sync(Admission::Join, &operation_id("SYNC")).await
    }

    /// Like [`sync`](Self::sync), but always starts a new operation. A sync
    /// still running is superseded: its result is discarded and its callers
    /// receive the result of this one.
    pub async fn resync(&self) -> Result<T, SyncError> {
        self.run_sync(Admission::Fresh, &operation_id("RESYNC")).await
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> RepositoryState<T> {
        self.synchronizer.state().await
    }

    /// Register a weakly-held observer. Registering it again replaces the
    /// earlier registration.
    pub async fn add_observer<O>(&self, observer: &Arc<O>)
    where
        O: RepositoryObserver<T> + 'static,
    {
        self.synchronizer.add_observer(observer).await;
    }

    /// Unregister an observer.
    pub async fn remove_observer<O>(&self, observer: &Arc<O>)
    where
        O: RepositoryObserver<T> + 'static,
    {
        self.synchronizer.remove_observer(observer).await;
    }

    /// The configuration this repository was built with.
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }
}

impl<T: RepositoryData, A: Access> Clone for Repository<T, A> {
    fn clone(&self) -> Self {
        Self {
            synchronizer: Arc::clone(&self.synchronizer),
            puller: Arc::clone(&self.puller),
            pusher: self.pusher.clone(),
            config: self.config.clone(),
            _access: PhantomData,
        }
    }
}

impl<T: RepositoryData, A: Access> std::fmt::Debug for Repository<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("label", &self.config.label)
            .field("writable", &self.pusher.is_some())
            .finish()
    }
}

fn operation_id(kind: &str) -> String {
    format!("{}-{}", kind, Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockSource;

    fn manual() -> RepositoryConfig {
        RepositoryConfig::new().with_auto_sync(false)
    }

    // ===========================================
    // Construction Tests
    // ===========================================

    #[test]
    fn construction_outside_runtime_skips_initial_sync() {
        let source = Arc::new(MockSource::new(1u32));
        let repo: ReadOnlyRepository<u32> =
            Repository::read_only(source.clone(), RepositoryConfig::new());

        assert!(repo.config().auto_sync);
        assert_eq!(source.pull_count(), 0);
    }

    #[test]
    fn debug_shows_label_and_access() {
        let source = Arc::new(MockSource::new(1u32));
        let repo: ReadWriteRepository<u32> =
            Repository::read_write(source, manual().with_label("profile"));

        let debug = format!("{:?}", repo);
        assert!(debug.contains("profile"));
        assert!(debug.contains("writable: true"));
    }

    // ===========================================
    // Handle Tests
    // ===========================================

    #[tokio::test]
    async fn clones_share_one_cache() {
        let source = Arc::new(MockSource::new("v".to_string()));
        let repo: ReadWriteRepository<String> = Repository::read_write(source.clone(), manual());
        let other = repo.clone();

        repo.sync().await.unwrap();
        assert_eq!(other.get().await.unwrap(), "v");

        other.set("w".to_string()).await.unwrap();
        assert_eq!(repo.state().await, RepositoryState::Synced("w".to_string()));
        assert_eq!(source.pull_count(), 1);
    }

    #[tokio::test]
    async fn read_write_after_failed_pull_pushes_stale_value() {
        let source = Arc::new(MockSource::new("v".to_string()));
        let repo: ReadWriteRepository<String> = Repository::read_write(source.clone(), manual());
        repo.sync().await.unwrap();

        source.fail_next_pull("offline");
        repo.sync().await.unwrap_err();
        assert_eq!(repo.state().await, RepositoryState::NotSynced("v".to_string()));

        // Unconfirmed data is always pushed, even if it came from a pull.
        assert_eq!(repo.sync().await.unwrap(), "v");
        assert_eq!(source.push_count(), 1);
    }

    #[test]
    fn operation_ids_are_prefixed_and_unique() {
        let a = operation_id("GET");
        let b = operation_id("GET");

        assert!(a.starts_with("GET-"));
        assert_ne!(a, b);
    }
}
