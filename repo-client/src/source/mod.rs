//! Data source abstraction for repositories.
//!
//! A repository never performs I/O itself. It reaches the outside world
//! through two capabilities supplied at construction:
//!
//! - [`Puller`] fetches the current truth (network, disk, platform API)
//! - [`Pusher`] writes a value and returns its canonical stored form
//!
//! # Design
//!
//! Both traits are async and take `&self`, so a single source value can be
//! shared between the repository and the rest of the application. A pull or
//! push may be superseded while running; the repository then discards its
//! result, so implementations must tolerate being ignored.
//!
//! # Example
//!
//! ```ignore
//! let source = Arc::new(MockSource::new("old".to_string()));
//! let repo = Repository::read_write(source.clone(), RepositoryConfig::default());
//! repo.set("new".to_string()).await?;
//! assert_eq!(source.remote(), Some("new".to_string()));
//! ```

mod mock;

pub use mock::MockSource;

use async_trait::async_trait;
use basekit_repo_core::SourceError;

/// Fetches data from an external source.
#[async_trait]
pub trait Puller<T: Send + 'static>: Send + Sync {
    /// Fetch the current value.
    ///
    /// Called once per sync; the repository does not retry.
    async fn pull(&self) -> Result<T, SourceError>;
}

/// Writes data to an external source.
#[async_trait]
pub trait Pusher<T: Send + 'static>: Send + Sync {
    /// Write `value` and return what the source actually stored, which may
    /// differ from what was sent (server-assigned fields and the like).
    async fn push(&self, value: T) -> Result<T, SourceError>;
}
