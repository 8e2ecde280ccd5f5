//! Mock data source for testing.
//!
//! Allows scripting failures, delays and pulled values, and records every
//! pull and push for verification.

use super::{Puller, Pusher};
use async_trait::async_trait;
use basekit_repo_core::SourceError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Canonicalize<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// In-memory puller and pusher.
///
/// Clones share state, so a test can keep one handle while the repository
/// owns another.
pub struct MockSource<T> {
    inner: Arc<Mutex<MockSourceInner<T>>>,
}

struct MockSourceInner<T> {
    remote: Option<T>,
    pull_count: usize,
    pushed: Vec<T>,
    delay: Duration,
    queued_delays: VecDeque<Duration>,
    queued_pulls: VecDeque<T>,
    pull_failures: VecDeque<String>,
    push_failures: VecDeque<String>,
    canonicalize: Option<Canonicalize<T>>,
}

impl<T: Clone + Send + 'static> MockSource<T> {
    /// Create a source holding `value`.
    pub fn new(value: T) -> Self {
        Self::with_remote(Some(value))
    }

    /// Create a source holding nothing. Pulls fail with
    /// [`SourceError::UnexpectedEmpty`] until something is pushed.
    pub fn empty() -> Self {
        Self::with_remote(None)
    }

    fn with_remote(remote: Option<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockSourceInner {
                remote,
                pull_count: 0,
                pushed: Vec::new(),
                delay: Duration::ZERO,
                queued_delays: VecDeque::new(),
                queued_pulls: VecDeque::new(),
                pull_failures: VecDeque::new(),
                push_failures: VecDeque::new(),
                canonicalize: None,
            })),
        }
    }

    /// Replace the value held by the source.
    pub fn set_remote(&self, value: T) {
        let mut inner = self.inner.lock().unwrap();
        inner.remote = Some(value);
    }

    /// The value currently held by the source.
    pub fn remote(&self) -> Option<T> {
        let inner = self.inner.lock().unwrap();
        inner.remote.clone()
    }

    /// Delay applied to every pull and push that has no queued delay.
    pub fn set_delay(&self, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.delay = delay;
    }

    /// Delay for the next call (pull or push), in call order.
    pub fn queue_delay(&self, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.queued_delays.push_back(delay);
    }

    /// Value returned by the next pull instead of the held value.
    pub fn queue_pull(&self, value: T) {
        let mut inner = self.inner.lock().unwrap();
        inner.queued_pulls.push_back(value);
    }

    /// Cause the next pull to fail with the given error.
    pub fn fail_next_pull(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.pull_failures.push_back(error.to_string());
    }

    /// Cause the next push to fail with the given error.
    pub fn fail_next_push(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.push_failures.push_back(error.to_string());
    }

    /// Transform pushed values before storing them, like a server filling in
    /// fields of its own.
    pub fn canonicalize_with<F>(&self, f: F)
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        inner.canonicalize = Some(Arc::new(f));
    }

    /// Number of pulls started so far.
    pub fn pull_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.pull_count
    }

    /// Number of pushes started so far.
    pub fn push_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.pushed.len()
    }

    /// Every value pushed so far, in call order.
    pub fn pushed_values(&self) -> Vec<T> {
        let inner = self.inner.lock().unwrap();
        inner.pushed.clone()
    }

    fn next_delay(inner: &mut MockSourceInner<T>) -> Duration {
        inner.queued_delays.pop_front().unwrap_or(inner.delay)
    }
}

impl<T> Clone for MockSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for MockSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Puller<T> for MockSource<T> {
    async fn pull(&self) -> Result<T, SourceError> {
        let (delay, failure, scripted) = {
            let mut inner = self.inner.lock().unwrap();
            inner.pull_count += 1;
            let delay = Self::next_delay(&mut inner);
            (
                delay,
                inner.pull_failures.pop_front(),
                inner.queued_pulls.pop_front(),
            )
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        // Check for forced failure
        if let Some(error) = failure {
            return Err(SourceError::Read(error));
        }

        if let Some(value) = scripted {
            return Ok(value);
        }

        let inner = self.inner.lock().unwrap();
        inner.remote.clone().ok_or(SourceError::UnexpectedEmpty)
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Pusher<T> for MockSource<T> {
    async fn push(&self, value: T) -> Result<T, SourceError> {
        let (delay, failure, canonicalize) = {
            let mut inner = self.inner.lock().unwrap();
            inner.pushed.push(value.clone());
            let delay = Self::next_delay(&mut inner);
            (
                delay,
                inner.push_failures.pop_front(),
                inner.canonicalize.clone(),
            )
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        // Check for forced failure
        if let Some(error) = failure {
            return Err(SourceError::Write(error));
        }

        let stored = match canonicalize {
            Some(f) => f(value),
            None => value,
        };

        let mut inner = self.inner.lock().unwrap();
        inner.remote = Some(stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===========================================
    // MockSource Basic Tests
    // ===========================================

    #[tokio::test]
    async fn pull_returns_remote_value() {
        let source = MockSource::new("remote".to_string());

        assert_eq!(source.pull().await.unwrap(), "remote");
        assert_eq!(source.pull_count(), 1);
    }

    #[tokio::test]
    async fn pull_from_empty_source_fails() {
        let source = MockSource::<String>::empty();

        let result = source.pull().await;
        assert!(matches!(result, Err(SourceError::UnexpectedEmpty)));
    }

    #[tokio::test]
    async fn push_stores_and_records_value() {
        let source = MockSource::new(1u32);

        assert_eq!(source.push(2).await.unwrap(), 2);
        assert_eq!(source.remote(), Some(2));
        assert_eq!(source.pushed_values(), vec![2]);
        assert_eq!(source.push_count(), 1);
    }

    #[tokio::test]
    async fn canonicalize_changes_stored_value() {
        let source = MockSource::new(String::new());
        source.canonicalize_with(|v: String| v.to_uppercase());

        assert_eq!(source.push("abc".to_string()).await.unwrap(), "ABC");
        assert_eq!(source.remote(), Some("ABC".to_string()));
        assert_eq!(source.pushed_values(), vec!["abc".to_string()]);
    }

    // ===========================================
    // Scripting Tests
    // ===========================================

    #[tokio::test]
    async fn forced_pull_failure() {
        let source = MockSource::new(5u8);
        source.fail_next_pull("offline");

        let result = source.pull().await;
        assert!(matches!(result, Err(SourceError::Read(_))));

        // Next pull should work
        assert_eq!(source.pull().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn forced_push_failure_keeps_remote() {
        let source = MockSource::new(5u8);
        source.fail_next_push("read-only");

        let result = source.push(6).await;
        assert!(matches!(result, Err(SourceError::Write(_))));
        assert_eq!(source.remote(), Some(5));

        assert_eq!(source.push(6).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn queued_pulls_take_precedence() {
        let source = MockSource::new("remote");
        source.queue_pull("scripted");

        assert_eq!(source.pull().await.unwrap(), "scripted");
        assert_eq!(source.pull().await.unwrap(), "remote");
    }

    #[tokio::test(start_paused = true)]
    async fn queued_delay_applies_to_next_call() {
        let source = MockSource::new(0u8);
        source.queue_delay(Duration::from_secs(5));

        let start = tokio::time::Instant::now();
        source.pull().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));

        let start = tokio::time::Instant::now();
        source.pull().await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    // ===========================================
    // Clone and Shared State Tests
    // ===========================================

    #[tokio::test]
    async fn clone_shares_state() {
        let source1 = MockSource::new(1u8);
        let source2 = source1.clone();

        source2.set_remote(9);
        assert_eq!(source1.pull().await.unwrap(), 9);
        assert_eq!(source2.pull_count(), 1);
    }
}
