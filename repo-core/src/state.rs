//! Repository lifecycle state.
//!
//! [`RepositoryState`] is a plain snapshot value. It carries no transition
//! logic of its own: every transition is performed by the async synchronizer
//! in `basekit-repo`, which is the only place a state is ever stored.

use std::fmt;

/// Bounds required of any value cached by a repository.
///
/// Equality is what decides whether a state transition is real, so it is
/// part of the contract rather than an optimization.
pub trait RepositoryData: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

impl<T> RepositoryData for T where T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

/// Lifecycle of the data held by a repository.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RepositoryState<T> {
    /// No data has ever been fetched.
    #[default]
    Initial,
    /// Data confirmed current as of the last successful sync.
    Synced(T),
    /// The last sync failed, or a local write has not been confirmed
    /// upstream yet. The held value is kept, never discarded.
    NotSynced(T),
}

impl<T> RepositoryState<T> {
    /// Borrow the held data, if any.
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Initial => None,
            Self::Synced(data) | Self::NotSynced(data) => Some(data),
        }
    }

    /// Take the held data, if any.
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Initial => None,
            Self::Synced(data) | Self::NotSynced(data) => Some(data),
        }
    }

    /// True if nothing has ever been synced.
    pub fn is_initial(&self) -> bool {
        matches!(self, Self::Initial)
    }

    /// True if the held data is confirmed current.
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced(_))
    }

    /// True if the held data is known to be unconfirmed.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::NotSynced(_))
    }
}

impl<T: fmt::Debug> fmt::Display for RepositoryState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Synced(data) => write!(f, "synced({:?})", data),
            Self::NotSynced(data) => write!(f, "not_synced({:?})", data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===========================================
    // Equality Tests
    // ===========================================

    #[test]
    fn same_variant_same_payload_is_equal() {
        assert_eq!(RepositoryState::Synced(1), RepositoryState::Synced(1));
        assert_eq!(RepositoryState::NotSynced(1), RepositoryState::NotSynced(1));
        assert_eq!(RepositoryState::<u8>::Initial, RepositoryState::Initial);
    }

    #[test]
    fn payload_or_variant_mismatch_is_not_equal() {
        assert_ne!(RepositoryState::Synced(1), RepositoryState::Synced(2));
        assert_ne!(RepositoryState::Synced(1), RepositoryState::NotSynced(1));
        assert_ne!(RepositoryState::Initial, RepositoryState::Synced(0));
    }

    // ===========================================
    // Accessor Tests
    // ===========================================

    #[test]
    fn data_is_available_for_synced_and_stale() {
        assert_eq!(RepositoryState::Synced("a").data(), Some(&"a"));
        assert_eq!(RepositoryState::NotSynced("b").data(), Some(&"b"));
        assert_eq!(RepositoryState::<&str>::Initial.data(), None);
        assert_eq!(RepositoryState::NotSynced(7).into_data(), Some(7));
    }

    #[test]
    fn predicates_match_variants() {
        let initial = RepositoryState::<u8>::default();
        assert!(initial.is_initial());
        assert!(!initial.is_synced());

        assert!(RepositoryState::Synced(1).is_synced());
        assert!(RepositoryState::NotSynced(1).is_stale());
        assert!(!RepositoryState::NotSynced(1).is_synced());
    }

    #[test]
    fn display_names_variant_and_value() {
        assert_eq!(RepositoryState::<u8>::Initial.to_string(), "initial");
        assert_eq!(RepositoryState::Synced("x").to_string(), "synced(\"x\")");
        assert_eq!(RepositoryState::NotSynced(3).to_string(), "not_synced(3)");
    }
}
