#![forbid(unsafe_code)]

//! Per-leaf validation runs with token-based staleness prevention.
//!
//! A [`ValidationRunner`] owns one leaf's immediate and deferred validators.
//! Every call to [`ValidationRunner::run`] starts a new run stamped with a
//! [`RunToken`] issued by the [`ValidationModel`]. Results are committed only
//! while their token is still the latest run at the location, so two leaves
//! bound to the same location never overwrite each other with stale results.
//!
//! # Design Principles
//!
//! 1. **Monotonic tokens**: a run supersedes every earlier run at its location,
//!    whichever runner started it.
//! 2. **Staleness prevention**: each commit re-checks its token under the
//!    runner lock and again under the model lock. Validator futures are never
//!    cancelled; their late results are discarded instead.
//! 3. **Incremental commits**: the immediate stage and the deferred stage each
//!    commit as soon as they finish. The committed list is always the current
//!    run's immediate messages followed by its deferred messages.
//! 4. **Debounce**: the deferred stage waits the defer interval on a timer the
//!    runner owns. A new run aborts a timer that has not fired yet.
//! 5. **Progress**: runs with deferred validators mark their location as
//!    validating from start until both stages have settled. Only the
//!    location's latest run sets or clears the flag.
//! 6. **Tracing**: lifecycle events go to a bounded [`RunTrace`] and to
//!    `tracing` at `debug`/`trace` level.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Older run at the location resolves late | `StaleDiscarded`, model untouched |
//! | Model torn down or dropped | `Abandoned`, model untouched |
//! | Validator panics or rejects | zero messages for that validator |
//! | Async work but no tokio runtime | [`FormError::NoRuntime`] |

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use super::model::{ValidationModel, WeakValidationModel};
use super::validator::{Validator, evaluate_all, evaluate_all_now};
use crate::error::{FormError, FormResult};
use crate::location::Location;

// ---------------------------------------------------------------------------
// RunToken
// ---------------------------------------------------------------------------

/// A monotonically increasing identifier of one validation run.
///
/// # Invariants
///
/// - Tokens issued by one validation model strictly increase, across all
///   locations.
/// - Token 0 is reserved for "no run yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RunToken(u64);

impl RunToken {
    /// The token before any run.
    pub const NONE: Self = Self(0);

    /// Create a token from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// The raw token value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns `true` for [`RunToken::NONE`].
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RunToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Run({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// RunEvent / RunTrace
// ---------------------------------------------------------------------------

/// Which validator set produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Immediate,
    Deferred,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Immediate => "immediate",
            Self::Deferred => "deferred",
        })
    }
}

/// An event in a runner's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// A run started.
    Started { token: RunToken, has_deferred: bool },
    /// A run was superseded by a newer one before settling.
    Superseded { token: RunToken, by: RunToken },
    /// A superseded run's debounce timer was aborted before firing.
    TimerCancelled { token: RunToken },
    /// A stage's messages were committed to the model.
    StageApplied {
        token: RunToken,
        stage: Stage,
        messages: usize,
    },
    /// A stage finished after its run was superseded; nothing was written.
    StaleDiscarded {
        token: RunToken,
        stage: Stage,
        current: RunToken,
    },
    /// Every stage of a run has been committed.
    Settled { token: RunToken },
    /// A stage finished after the model was torn down; nothing was written.
    Abandoned { token: RunToken, stage: Stage },
}

impl RunEvent {
    /// The run this event belongs to.
    #[must_use]
    pub fn token(&self) -> RunToken {
        match self {
            Self::Started { token, .. }
            | Self::Superseded { token, .. }
            | Self::TimerCancelled { token }
            | Self::StageApplied { token, .. }
            | Self::StaleDiscarded { token, .. }
            | Self::Settled { token }
            | Self::Abandoned { token, .. } => *token,
        }
    }

    /// Event type name for logging and trace queries.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Superseded { .. } => "superseded",
            Self::TimerCancelled { .. } => "timer_cancelled",
            Self::StageApplied { .. } => "stage_applied",
            Self::StaleDiscarded { .. } => "stale_discarded",
            Self::Settled { .. } => "settled",
            Self::Abandoned { .. } => "abandoned",
        }
    }
}

/// A bounded log of run events, oldest first.
#[derive(Debug, Clone)]
pub struct RunTrace {
    events: VecDeque<RunEvent>,
    capacity: usize,
}

impl RunTrace {
    /// Create a trace keeping at most `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(256)),
            capacity,
        }
    }

    /// Append an event, evicting the oldest when full.
    pub fn push(&mut self, event: RunEvent) {
        if self.capacity == 0 {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &RunEvent> {
        self.events.iter()
    }

    /// Whether an event of `event_type` was recorded for `token`.
    #[must_use]
    pub fn contains_event_type(&self, token: RunToken, event_type: &str) -> bool {
        self.events
            .iter()
            .any(|e| e.token() == token && e.event_type() == event_type)
    }

    /// All events recorded for `token`.
    #[must_use]
    pub fn events_for_token(&self, token: RunToken) -> Vec<&RunEvent> {
        self.events.iter().filter(|e| e.token() == token).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Check the trace against the runner's invariants.
    ///
    /// Returns a description of every violation found.
    #[must_use]
    pub fn verify_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let mut latest_started = RunToken::NONE;
        let mut settled = Vec::new();

        for event in &self.events {
            match event {
                RunEvent::Started { token, .. } => {
                    if *token <= latest_started {
                        violations.push(format!(
                            "non-monotonic start token: {token} after {latest_started}"
                        ));
                    }
                    latest_started = *token;
                }
                RunEvent::StageApplied { token, stage, .. } if *token < latest_started => {
                    violations.push(format!(
                        "{stage} result of {token} applied after {latest_started} started"
                    ));
                }
                RunEvent::StaleDiscarded { token, current, .. } if token >= current => {
                    violations.push(format!(
                        "stale discard of non-stale token: {token} >= {current}"
                    ));
                }
                RunEvent::Settled { token } => {
                    if settled.contains(token) {
                        violations.push(format!("{token} settled twice"));
                    }
                    settled.push(*token);
                }
                _ => {}
            }
        }

        violations
    }
}

// ---------------------------------------------------------------------------
// Runner state
// ---------------------------------------------------------------------------

/// The deferred stage's pending timer.
struct DebounceTimer {
    token: RunToken,
    handle: AbortHandle,
    /// Cleared once the timer fires and the deferred validators start.
    armed: Arc<AtomicBool>,
}

struct RunState {
    current: RunToken,
    immediate: Option<Vec<String>>,
    deferred: Option<Vec<String>>,
    pending_stages: u8,
    tracks_validating: bool,
    timer: Option<DebounceTimer>,
    trace: RunTrace,
}

impl RunState {
    /// Make `token` current, superseding the run in progress.
    fn supersede(&mut self, token: RunToken) {
        let previous = self.current;
        if !previous.is_none() && self.pending_stages > 0 {
            self.trace.push(RunEvent::Superseded {
                token: previous,
                by: token,
            });
        }
        if let Some(timer) = self.timer.take()
            && timer.armed.load(Ordering::SeqCst)
        {
            timer.handle.abort();
            self.trace.push(RunEvent::TimerCancelled { token: timer.token });
        }
        self.current = token;
        self.immediate = None;
        self.deferred = None;
        self.pending_stages = 0;
        self.tracks_validating = false;
    }

    /// Give up on the current run after a newer run at the location took over.
    fn yield_location(&mut self, token: RunToken, stage: Stage, latest: RunToken) {
        self.pending_stages = 0;
        self.tracks_validating = false;
        self.trace.push(RunEvent::StaleDiscarded {
            token,
            stage,
            current: latest,
        });
    }
}

struct RunnerShared {
    location: Location,
    model: WeakValidationModel,
    state: Mutex<RunState>,
}

impl RunnerShared {
    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue the next run token from the model, recording it as the latest run
    /// at this location. Falls back to a local token once the model is gone.
    fn issue_token(&self, state: &RunState, validating: bool) -> RunToken {
        let mut issued = None;
        if let Some(model) = self.model.upgrade() {
            model.update(|edit| {
                issued = Some(edit.begin_run(self.location.as_str(), validating));
            });
        }
        issued.unwrap_or_else(|| RunToken(state.current.raw() + 1))
    }

    /// Commit one stage's messages if `token` is still the latest run.
    fn commit(&self, token: RunToken, stage: Stage, messages: Vec<String>) {
        let mut state = self.lock();
        if token != state.current {
            let current = state.current;
            state.trace.push(RunEvent::StaleDiscarded {
                token,
                stage,
                current,
            });
            tracing::debug!(
                location = %self.location,
                %token,
                %current,
                %stage,
                "discarding stale validation result"
            );
            return;
        }

        match stage {
            Stage::Immediate => state.immediate = Some(messages),
            Stage::Deferred => state.deferred = Some(messages),
        }
        let settled = state.pending_stages <= 1;
        let clear_validating = settled && state.tracks_validating;
        let merged: Vec<String> = state
            .immediate
            .iter()
            .chain(state.deferred.iter())
            .flatten()
            .cloned()
            .collect();
        let count = merged.len();

        let location = self.location.as_str();
        let mut latest = None;
        let applied = self.model.upgrade().is_some_and(|model| {
            model.update(|edit| {
                latest = edit.latest_run(location);
                if latest != Some(token) {
                    return;
                }
                edit.set(location, merged);
                if clear_validating {
                    edit.set_validating(location, false);
                }
            })
        });

        if !applied {
            state.trace.push(RunEvent::Abandoned { token, stage });
            tracing::trace!(location, %token, %stage, "validation model gone, result dropped");
            return;
        }
        if let Some(newer) = latest.filter(|latest| *latest != token) {
            state.yield_location(token, stage, newer);
            tracing::debug!(
                location,
                %token,
                current = %newer,
                %stage,
                "discarding result superseded at location"
            );
            return;
        }

        state.pending_stages = state.pending_stages.saturating_sub(1);
        if clear_validating {
            state.tracks_validating = false;
        }
        state.trace.push(RunEvent::StageApplied {
            token,
            stage,
            messages: count,
        });
        tracing::trace!(location, %token, %stage, messages = count, "validation stage applied");
        if settled {
            state.trace.push(RunEvent::Settled { token });
        }
    }

    /// Returns `true` if `token` is still current for this runner and its
    /// location; records a stale discard otherwise.
    fn still_current(&self, token: RunToken, stage: Stage) -> bool {
        let mut state = self.lock();
        let current = state.current;
        if token != current {
            state.trace.push(RunEvent::StaleDiscarded {
                token,
                stage,
                current,
            });
            return false;
        }
        let latest = self
            .model
            .upgrade()
            .and_then(|model| model.latest_run(self.location.as_str()));
        match latest {
            Some(newer) if newer != token => {
                state.yield_location(token, stage, newer);
                false
            }
            _ => true,
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationRunner
// ---------------------------------------------------------------------------

/// Runs one location's validators and commits results into a
/// [`ValidationModel`].
///
/// Dropping the runner retires it: pending results are discarded and the
/// location's validating flag is cleared.
pub struct ValidationRunner {
    shared: Arc<RunnerShared>,
    validators: Arc<[Validator]>,
    deferred: Arc<[Validator]>,
    defer: Duration,
}

impl fmt::Debug for ValidationRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRunner")
            .field("location", &self.shared.location)
            .field("validators", &self.validators.len())
            .field("deferred", &self.deferred.len())
            .field("defer", &self.defer)
            .field("current_token", &self.current_token())
            .finish()
    }
}

impl ValidationRunner {
    /// Create a runner committing into `model` at `location`.
    #[must_use]
    pub fn new(
        location: Location,
        validators: Vec<Validator>,
        deferred: Vec<Validator>,
        defer: Duration,
        model: &ValidationModel,
    ) -> Self {
        let trace = RunTrace::with_capacity(model.config().trace_capacity);
        Self {
            shared: Arc::new(RunnerShared {
                location,
                model: model.downgrade(),
                state: Mutex::new(RunState {
                    current: RunToken::NONE,
                    immediate: None,
                    deferred: None,
                    pending_stages: 0,
                    tracks_validating: false,
                    timer: None,
                    trace,
                }),
            }),
            validators: validators.into(),
            deferred: deferred.into(),
            defer,
        }
    }

    /// The location results are committed to.
    #[must_use]
    pub fn location(&self) -> &Location {
        &self.shared.location
    }

    /// Returns `true` if any deferred validators are configured.
    #[must_use]
    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Start a run for `value`, superseding any earlier run at the location.
    ///
    /// Synchronous immediate validators are evaluated and committed before
    /// this returns. Asynchronous immediate validators and the deferred stage
    /// are spawned on the current tokio runtime, which is checked for before
    /// anything is evaluated.
    pub fn run(&self, value: Value) -> FormResult<RunToken> {
        let has_deferred = self.has_deferred();
        let all_sync = self.validators.iter().all(Validator::is_sync);
        let runtime = if has_deferred || !all_sync {
            Some(Handle::try_current().map_err(|_| FormError::NoRuntime {
                location: self.shared.location.to_string(),
            })?)
        } else {
            None
        };
        let inline = evaluate_all_now(&self.validators, &value);

        let token = {
            let mut state = self.shared.lock();
            let token = self.shared.issue_token(&state, has_deferred);
            state.supersede(token);
            state.pending_stages = 1 + u8::from(has_deferred);
            state.tracks_validating = has_deferred;
            state.trace.push(RunEvent::Started {
                token,
                has_deferred,
            });
            token
        };
        tracing::debug!(
            location = %self.shared.location,
            %token,
            has_deferred,
            inline = inline.is_some(),
            "validation run started"
        );

        match inline {
            Some(messages) => self.shared.commit(token, Stage::Immediate, messages),
            None => {
                let shared = Arc::clone(&self.shared);
                let validators = Arc::clone(&self.validators);
                let value = value.clone();
                if let Some(runtime) = &runtime {
                    runtime.spawn(async move {
                        let messages = evaluate_all(&validators, &value).await;
                        shared.commit(token, Stage::Immediate, messages);
                    });
                }
            }
        }

        if let Some(runtime) = runtime
            && has_deferred
        {
            self.spawn_deferred(&runtime, token, value);
        }

        Ok(token)
    }

    fn spawn_deferred(&self, runtime: &Handle, token: RunToken, value: Value) {
        let shared = Arc::clone(&self.shared);
        let deferred = Arc::clone(&self.deferred);
        let defer = self.defer;
        let armed = Arc::new(AtomicBool::new(true));
        let fired = Arc::clone(&armed);

        let task = runtime.spawn(async move {
            if !defer.is_zero() {
                tokio::time::sleep(defer).await;
            }
            fired.store(false, Ordering::SeqCst);
            if !shared.still_current(token, Stage::Deferred) {
                return;
            }
            let messages = evaluate_all(&deferred, &value).await;
            shared.commit(token, Stage::Deferred, messages);
        });

        let mut state = self.shared.lock();
        if state.current == token {
            state.timer = Some(DebounceTimer {
                token,
                handle: task.abort_handle(),
                armed,
            });
        }
    }

    /// Supersede this runner's runs and abort a pending timer.
    ///
    /// The location's validating flag is cleared only when this runner's run
    /// is still outstanding and is the latest run at the location.
    pub fn retire(&self) {
        let mut state = self.shared.lock();
        let previous = state.current;
        let owned_flag = state.pending_stages > 0 && state.tracks_validating;
        state.supersede(RunToken(previous.raw() + 1));
        if owned_flag && let Some(model) = self.shared.model.upgrade() {
            let location = self.shared.location.as_str();
            model.update(|edit| {
                if edit.latest_run(location) == Some(previous) {
                    edit.set_validating(location, false);
                }
            });
        }
        tracing::trace!(location = %self.shared.location, token = %previous, "validation runner retired");
    }

    /// The most recently issued token.
    #[must_use]
    pub fn current_token(&self) -> RunToken {
        self.shared.lock().current
    }

    /// Returns `true` while the current run has stages outstanding.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.shared.lock().pending_stages > 0
    }

    /// A copy of the run trace.
    #[must_use]
    pub fn trace(&self) -> RunTrace {
        self.shared.lock().trace.clone()
    }
}

impl Drop for ValidationRunner {
    fn drop(&mut self) {
        self.retire();
    }
}
