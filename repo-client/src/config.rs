//! Repository configuration.
//!
//! Usable on its own through the builder methods, or deserialized as part of
//! an application's TOML config:
//!
//! ```toml
//! [profile]
//! auto_sync = false
//! label = "profile"
//! ```

use serde::Deserialize;

/// Configuration for a repository.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryConfig {
    /// Sync on construction and when `get()` finds nothing in memory
    /// (default: true).
    #[serde(default = "default_auto_sync")]
    pub auto_sync: bool,
    /// Name attached to log events (default: "repository").
    #[serde(default = "default_label")]
    pub label: String,
    /// How many times in a row a waiter follows a superseding sync before
    /// giving up (default: 64).
    #[serde(default = "default_max_supersessions")]
    pub max_supersessions: u32,
}

impl RepositoryConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable auto-sync.
    pub fn with_auto_sync(mut self, auto_sync: bool) -> Self {
        self.auto_sync = auto_sync;
        self
    }

    /// Set the label used in log events.
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Set the supersession cap.
    pub fn with_max_supersessions(mut self, max: u32) -> Self {
        self.max_supersessions = max;
        self
    }
}

// Default value functions
fn default_auto_sync() -> bool {
    true
}

fn default_label() -> String {
    "repository".to_string()
}

fn default_max_supersessions() -> u32 {
    64
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            auto_sync: default_auto_sync(),
            label: default_label(),
            max_supersessions: default_max_supersessions(),
        }
    }
}
