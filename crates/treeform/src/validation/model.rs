#![forbid(unsafe_code)]

//! The shared, tree-scoped aggregate of validation messages.
//!
//! One [`ValidationModel`] is created per form tree and handed to every leaf in
//! that tree. It maps locations to ordered message lists and tracks which
//! locations have deferred validation outstanding.
//!
//! # Invariants
//!
//! - Locations keep their first-registration position; clearing a location
//!   keeps its slot, so re-failing it does not reorder the error summary.
//! - Every mutation happens under one lock and bumps the revision once, however
//!   many locations it touches (see [`ValidationModel::update`]).
//! - Run tokens are issued here, under the same lock, and recorded per
//!   location. Only the latest run at a location may commit messages there or
//!   clear its validating flag, whichever leaf started it.
//! - After [`ValidationModel::teardown`] the state is released and every
//!   mutation is a no-op returning `false`.
//!
//! # Example
//!
//! ```rust
//! use treeform::validation::ValidationModel;
//!
//! let model = ValidationModel::new();
//! model.set("contact.firstName", vec!["Value is required".into()]);
//! model.set("billing.zip", vec!["Invalid zip".into()]);
//!
//! assert_eq!(model.all_errors_for_location(None).len(), 2);
//! assert_eq!(model.all_errors_for_location(Some("contact")).len(), 1);
//! assert!(!model.is_validating());
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::runner::RunToken;
use crate::config::FormConfig;
use crate::location::is_within;

/// Messages registered for one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub location: String,
    pub messages: Vec<String>,
}

/// Options for [`ValidationModel::all_errors_for_location_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorQuery {
    /// Also list locations with validation in flight, even without messages.
    pub include_validating: bool,
}

#[derive(Debug, Default)]
struct ModelState {
    errors: IndexMap<String, Vec<String>>,
    validating: BTreeSet<String>,
    last_token: u64,
    latest_runs: HashMap<String, RunToken>,
    revision: u64,
    torn_down: bool,
}

struct Shared {
    state: RwLock<ModelState>,
    changes: watch::Sender<u64>,
    config: FormConfig,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, ModelState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ModelState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A batch of mutations applied as one logical update.
///
/// Obtained through [`ValidationModel::update`].
pub struct ValidationEdit<'a> {
    state: &'a mut ModelState,
    changed: bool,
}

impl ValidationEdit<'_> {
    /// Replace the messages for `location`. An empty list clears it.
    pub fn set(&mut self, location: &str, messages: Vec<String>) {
        match self.state.errors.get_mut(location) {
            Some(existing) if *existing == messages => {}
            Some(existing) => {
                *existing = messages;
                self.changed = true;
            }
            None if messages.is_empty() => {}
            None => {
                self.state.errors.insert(location.to_owned(), messages);
                self.changed = true;
            }
        }
    }

    /// Add or remove `location` from the in-flight set.
    pub fn set_validating(&mut self, location: &str, validating: bool) {
        let changed = if validating {
            self.state.validating.insert(location.to_owned())
        } else {
            self.state.validating.remove(location)
        };
        self.changed |= changed;
    }

    /// Issue a token for a new run at `location`, superseding every earlier
    /// run there, and set the location's validating flag to `validating`.
    pub(crate) fn begin_run(&mut self, location: &str, validating: bool) -> RunToken {
        self.state.last_token += 1;
        let token = RunToken::from_raw(self.state.last_token);
        self.state.latest_runs.insert(location.to_owned(), token);
        self.set_validating(location, validating);
        token
    }

    /// The most recent run started at `location`.
    pub(crate) fn latest_run(&self, location: &str) -> Option<RunToken> {
        self.state.latest_runs.get(location).copied()
    }

    /// Replace the whole in-flight set.
    pub fn set_validating_locations<I, S>(&mut self, locations: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let next: BTreeSet<String> = locations.into_iter().map(Into::into).collect();
        if next != self.state.validating {
            self.state.validating = next;
            self.changed = true;
        }
    }
}

/// Shared validation state for one form tree. Cloning shares the same state.
#[derive(Clone)]
pub struct ValidationModel {
    shared: Arc<Shared>,
}

impl Default for ValidationModel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ValidationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.read();
        f.debug_struct("ValidationModel")
            .field("locations", &state.errors.len())
            .field("validating", &state.validating.len())
            .field("revision", &state.revision)
            .field("torn_down", &state.torn_down)
            .finish()
    }
}

impl ValidationModel {
    /// Create an empty model with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(FormConfig::default())
    }

    /// Create an empty model whose leaves inherit `config`.
    #[must_use]
    pub fn with_config(config: FormConfig) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(ModelState::default()),
                changes,
                config,
            }),
        }
    }

    /// Configuration shared by every leaf of this tree.
    #[must_use]
    pub fn config(&self) -> &FormConfig {
        &self.shared.config
    }

    /// Apply several mutations as one update.
    ///
    /// Returns `false`, without calling `f`, once the model is torn down.
    pub fn update(&self, f: impl FnOnce(&mut ValidationEdit<'_>)) -> bool {
        let revision = {
            let mut state = self.shared.write();
            if state.torn_down {
                tracing::trace!("validation model torn down, dropping update");
                return false;
            }
            let mut edit = ValidationEdit {
                state: &mut state,
                changed: false,
            };
            f(&mut edit);
            if !edit.changed {
                return true;
            }
            state.revision += 1;
            state.revision
        };
        self.shared.changes.send_replace(revision);
        true
    }

    /// Replace the messages for `location`. An empty list clears it.
    pub fn set(&self, location: &str, messages: Vec<String>) -> bool {
        self.update(|edit| edit.set(location, messages))
    }

    /// Replace the set of locations with validation in flight.
    pub fn set_validating_locations<I, S>(&self, locations: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update(|edit| edit.set_validating_locations(locations))
    }

    /// Messages for exactly `location`.
    #[must_use]
    pub fn get(&self, location: &str) -> Vec<String> {
        self.shared
            .read()
            .errors
            .get(location)
            .cloned()
            .unwrap_or_default()
    }

    /// Entries with messages at or below `prefix`, in first-registration order.
    ///
    /// `None` or `Some("")` lists every location with messages.
    #[must_use]
    pub fn all_errors_for_location(&self, prefix: Option<&str>) -> Vec<ErrorEntry> {
        self.all_errors_for_location_with(prefix, ErrorQuery::default())
    }

    /// Like [`all_errors_for_location`](Self::all_errors_for_location), with
    /// query options.
    ///
    /// Validating locations listed because of `include_validating` that have
    /// never registered messages come after the registered ones, sorted.
    #[must_use]
    pub fn all_errors_for_location_with(
        &self,
        prefix: Option<&str>,
        query: ErrorQuery,
    ) -> Vec<ErrorEntry> {
        let prefix = prefix.unwrap_or_default();
        let state = self.shared.read();
        let registered = state.errors.iter().filter(|(location, messages)| {
            is_within(location, prefix)
                && (!messages.is_empty()
                    || (query.include_validating && state.validating.contains(*location)))
        });
        let mut entries: Vec<ErrorEntry> = registered
            .map(|(location, messages)| ErrorEntry {
                location: location.clone(),
                messages: messages.clone(),
            })
            .collect();
        if query.include_validating {
            entries.extend(
                state
                    .validating
                    .iter()
                    .filter(|location| is_within(location, prefix))
                    .filter(|location| !state.errors.contains_key(*location))
                    .map(|location| ErrorEntry {
                        location: location.clone(),
                        messages: Vec::new(),
                    }),
            );
        }
        entries
    }

    /// Returns `true` while any location has validation in flight.
    #[must_use]
    pub fn is_validating(&self) -> bool {
        !self.shared.read().validating.is_empty()
    }

    /// Returns `true` while `location` has validation in flight.
    #[must_use]
    pub fn is_location_validating(&self, location: &str) -> bool {
        self.shared.read().validating.contains(location)
    }

    /// The latest run started at `location`.
    pub(crate) fn latest_run(&self, location: &str) -> Option<RunToken> {
        self.shared.read().latest_runs.get(location).copied()
    }

    /// Locations with validation in flight, sorted.
    #[must_use]
    pub fn validating_locations(&self) -> Vec<String> {
        self.shared.read().validating.iter().cloned().collect()
    }

    /// Counter bumped by every update that changed something.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.shared.read().revision
    }

    /// Receive the revision after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }

    /// End this model's scope. Releases all state; later updates are no-ops.
    pub fn teardown(&self) {
        let revision = {
            let mut state = self.shared.write();
            if state.torn_down {
                return;
            }
            state.errors.clear();
            state.validating.clear();
            state.latest_runs.clear();
            state.torn_down = true;
            state.revision += 1;
            state.revision
        };
        tracing::debug!(revision, "validation model torn down");
        self.shared.changes.send_replace(revision);
    }

    /// Returns `true` once [`teardown`](Self::teardown) has run.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.shared.read().torn_down
    }

    /// A handle that does not keep the model alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakValidationModel {
        WeakValidationModel {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

/// Non-owning handle held by pending asynchronous work.
#[derive(Clone, Debug)]
pub struct WeakValidationModel {
    shared: Weak<Shared>,
}

impl WeakValidationModel {
    /// The model, if it is still alive and not torn down.
    #[must_use]
    pub fn upgrade(&self) -> Option<ValidationModel> {
        self.shared
            .upgrade()
            .map(|shared| ValidationModel { shared })
            .filter(|model| !model.is_torn_down())
    }
}
