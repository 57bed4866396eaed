#![forbid(unsafe_code)]

//! Log output for hosts that do not install their own subscriber.
//!
//! The library only emits `tracing` events. Hosts with a subscriber already in
//! place should not call [`init`].
//!
//! # Environment Variables
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `TREEFORM_LOG` | Filter directives, e.g. `treeform=debug` |
//! | `RUST_LOG` | Used when `TREEFORM_LOG` is unset |
//!
//! Without either, events at `info` and above are printed.

use tracing_subscriber::EnvFilter;

/// Environment variable holding filter directives.
pub const ENV_LOG: &str = "TREEFORM_LOG";

/// Install a global fmt subscriber. Returns `false` if one was already set.
pub fn init() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .try_init()
        .is_ok()
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(ENV_LOG)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
