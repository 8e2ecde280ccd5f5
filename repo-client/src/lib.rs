//! # basekit-repo
//!
//! Observable, single-flight repository cache for BaseKit.
//!
//! This is the library applications use to keep externally-sourced data in
//! memory and in step with its source.
//!
//! ## Features
//!
//! - **Single-Flight Sync**: concurrent sync requests share one pull or push
//! - **Latest Wins**: superseded syncs are discarded, every caller gets the
//!   newest result
//! - **Stale Data Kept**: a failed sync never throws away the last good value
//! - **Weak Observers**: change notifications without lifetime coupling
//! - **Source Abstraction**: pluggable pullers and pushers (mock included)
//!
//! ## Example
//!
//! ```ignore
//! use basekit_repo::{MockSource, Repository, RepositoryConfig};
//!
//! let source = Arc::new(MockSource::new(Some("draft".to_string())));
//! let repo = Repository::read_write(source, RepositoryConfig::default());
//!
//! // Read (pulls on first access)
//! let value = repo.get().await?;
//!
//! // Write (pushes upstream)
//! repo.set(Some("final".to_string())).await?;
//!
//! // Delete
//! repo.delete().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod repository;
pub mod source;
mod synchronizer;

pub use basekit_repo_core::{
    ObserverRegistry, RepositoryData, RepositoryError, RepositoryObserver, RepositoryState,
    SourceError, SyncError,
};
pub use config::RepositoryConfig;
pub use repository::{
    Access, ReadOnly, ReadOnlyRepository, ReadWrite, ReadWriteDeleteRepository,
    ReadWriteRepository, Repository,
};
pub use source::{MockSource, Puller, Pusher};
