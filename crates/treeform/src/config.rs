#![forbid(unsafe_code)]

//! Tree-wide configuration.
//!
//! A [`FormConfig`] travels with the [`ValidationModel`] it was created with,
//! so every leaf of a tree picks up the same defaults. Individual leaves can
//! still override the defer interval through
//! [`LeafConfig::defer_millis`](crate::leaf::LeafConfig::defer_millis).
//!
//! # Environment Variables
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `TREEFORM_DEFER_MS` | [`FormConfig::default_defer`] | `0` |
//! | `TREEFORM_TRACE_CAPACITY` | [`FormConfig::trace_capacity`] | `64` |
//!
//! Values that fail to parse are logged at `warn` and ignored.
//!
//! [`ValidationModel`]: crate::validation::ValidationModel

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable for [`FormConfig::default_defer`], in milliseconds.
pub const ENV_DEFER_MS: &str = "TREEFORM_DEFER_MS";
/// Environment variable for [`FormConfig::trace_capacity`].
pub const ENV_TRACE_CAPACITY: &str = "TREEFORM_TRACE_CAPACITY";

/// Defaults shared by every leaf in one form tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormConfig {
    /// Debounce window before deferred validators run.
    ///
    /// Zero means no timer: deferred validators start as soon as the runtime
    /// gets to them.
    pub default_defer: Duration,

    /// Number of run events each leaf keeps for inspection.
    pub trace_capacity: usize,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            default_defer: Duration::ZERO,
            trace_capacity: 64,
        }
    }
}

impl FormConfig {
    /// Defaults overridden by `TREEFORM_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_DEFER_MS) {
            config.default_defer = Duration::from_millis(ms);
        }
        if let Some(capacity) = parse_var::<usize>(&lookup, ENV_TRACE_CAPACITY) {
            config.trace_capacity = capacity;
        }
        config
    }

    /// Set the default debounce window.
    #[must_use]
    pub fn default_defer(mut self, defer: Duration) -> Self {
        self.default_defer = defer;
        self
    }

    /// Set the per-leaf run trace capacity.
    #[must_use]
    pub fn trace_capacity(mut self, capacity: usize) -> Self {
        self.trace_capacity = capacity;
        self
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable configuration value");
            None
        }
    }
}
