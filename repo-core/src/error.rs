//! Error types for repositories and their data sources.

use std::sync::Arc;
use thiserror::Error;

/// Errors reported by a puller or pusher.
///
/// Clonable so that a single failure can be handed to every caller waiting
/// on the same sync.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The source unexpectedly holds no value.
    #[error("unexpected empty value")]
    UnexpectedEmpty,

    /// Reading from the source failed.
    #[error("read failed: {0}")]
    Read(String),

    /// Writing to the source failed.
    #[error("write failed: {0}")]
    Write(String),

    /// Deleting from the source failed.
    #[error("delete failed: {0}")]
    Delete(String),

    /// Any other collaborator error.
    #[error(transparent)]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl SourceError {
    /// Wrap an arbitrary error.
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Arc::new(error))
    }
}

/// Errors surfaced by a repository sync.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The pull or push backing the current sync failed.
    #[error("sync failed: {0}")]
    Source(#[from] SourceError),

    /// Awaited a sync while none was assigned.
    #[error("no sync task assigned")]
    NoTask,

    /// The awaited sync kept being superseded.
    #[error("sync superseded {0} times in a row")]
    Superseded(u32),

    /// The sync task ended without producing a result (panic or runtime
    /// shutdown).
    #[error("sync task aborted: {0}")]
    Aborted(String),

    /// The repository went back to holding no data.
    #[error("repository reset to its initial state")]
    Reset,
}

/// Errors surfaced by repository reads and writes.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    /// Read before anything was synced, with auto-sync disabled.
    #[error("repository has not synced yet")]
    NotSynced,

    /// Reading required a sync, which failed.
    #[error("read failed: {0}")]
    Read(#[source] SyncError),

    /// The new value could not be pushed. It stays in memory as stale data
    /// and is pushed again by the next sync.
    #[error("write failed: {0}")]
    Write(#[source] SyncError),

    /// The deletion could not be pushed.
    #[error("delete failed: {0}")]
    Delete(#[source] SyncError),

    /// Patch requested while the repository holds no data.
    #[error("cannot patch a repository that has never synced")]
    PatchWithoutBase,
}

impl RepositoryError {
    /// The sync failure behind this error, if any.
    pub fn sync_error(&self) -> Option<&SyncError> {
        match self {
            Self::Read(e) | Self::Write(e) | Self::Delete(e) => Some(e),
            Self::NotSynced | Self::PatchWithoutBase => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn error_display() {
        let err = RepositoryError::Write(SyncError::Source(SourceError::Write("offline".into())));
        assert_eq!(err.to_string(), "write failed: sync failed: write failed: offline");
    }

    #[test]
    fn errors_chain_to_their_cause() {
        let err = RepositoryError::Read(SyncError::Source(SourceError::UnexpectedEmpty));

        let sync = err.source().unwrap();
        assert_eq!(sync.to_string(), "sync failed: unexpected empty value");

        let source = sync.source().unwrap();
        assert_eq!(source.to_string(), "unexpected empty value");
    }

    #[test]
    fn other_wraps_foreign_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err = SourceError::other(io);
        assert_eq!(err.to_string(), "missing file");
        assert!(matches!(err.clone(), SourceError::Other(_)));
    }

    #[test]
    fn sync_error_is_exposed_for_wrapped_variants() {
        let err = RepositoryError::Delete(SyncError::NoTask);
        assert!(matches!(err.sync_error(), Some(SyncError::NoTask)));
        assert!(RepositoryError::PatchWithoutBase.sync_error().is_none());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SourceError>();
        assert_send_sync::<SyncError>();
        assert_send_sync::<RepositoryError>();
    }
}
