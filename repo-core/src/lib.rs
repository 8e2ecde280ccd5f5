//! # repo-core
//!
//! Pure logic for BaseKit repositories (no I/O, instant tests).
//!
//! This crate holds the value types shared by every repository: the
//! three-state lifecycle, the error taxonomy and the weak observer registry.
//! Nothing here is async; the synchronization engine that drives these types
//! lives in `basekit-repo`.
//!
//! ## Design Philosophy
//!
//! [`RepositoryState`] is a snapshot, not a state machine. Transitions are
//! decided in exactly one place (the synchronizer), which keeps this crate
//! free of locking and easy to reason about.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod observer;
pub mod state;

pub use error::{RepositoryError, SourceError, SyncError};
pub use observer::{ObserverRegistry, RepositoryObserver};
pub use state::{RepositoryData, RepositoryState};
