#![forbid(unsafe_code)]

//! Leaf controllers: one field-editing unit bound to one location.
//!
//! A [`LeafController`] reads its value out of the caller's model, turns edits
//! into full model replacements, and validates on blur. Errors stay hidden
//! while the leaf is [`LeafPhase::Pristine`] unless the leaf was configured to
//! show them immediately.
//!
//! # State Machine
//!
//! ```text
//!   Pristine ──blur──▶ Touched
//! ```
//!
//! The transition is one way; a leaf never becomes pristine again.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use treeform::validation::ValidationModel;
//! use treeform::validation::rules::Required;
//! use treeform::{LeafConfig, LeafController, ModelCell};
//!
//! let cell = ModelCell::new(json!({"contact": {"email": ""}}));
//! let validation = ValidationModel::new();
//! let email = LeafController::new(
//!     LeafConfig::new("contact.email").validator(Required::new()),
//!     &validation,
//!     cell.replacer(),
//! )
//! .unwrap();
//!
//! email.blur(&cell.get()).unwrap();
//! assert_eq!(email.errors(), ["Value is required"]);
//!
//! email.change(&cell.get(), json!("a@b.c")).unwrap();
//! email.blur(&cell.get()).unwrap();
//! assert!(email.errors().is_empty());
//! ```

use std::borrow::Cow;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FormResult, PathError};
use crate::location::Location;
use crate::model::ModelReplacer;
use crate::path;
use crate::validation::{RunToken, ValidationModel, ValidationRunner, Validator};

/// Whether a leaf has been blurred yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafPhase {
    /// Never blurred. Errors are hidden unless `show_errors` is set.
    #[default]
    Pristine,
    /// Blurred at least once. Errors are visible.
    Touched,
}

/// Options for one leaf.
#[derive(Debug, Clone)]
pub struct LeafConfig {
    location: String,
    fail_over_locations: Vec<String>,
    validators: Vec<Validator>,
    deferred_validators: Vec<Validator>,
    show_errors: bool,
    defer: Option<Duration>,
}

impl LeafConfig {
    /// Options for a leaf at `location`, with no validators.
    #[must_use]
    pub fn new(location: impl AsRef<str>) -> Self {
        Self {
            location: location.as_ref().to_owned(),
            fail_over_locations: Vec::new(),
            validators: Vec::new(),
            deferred_validators: Vec::new(),
            show_errors: false,
            defer: None,
        }
    }

    /// Add a location read when the primary and earlier failovers are undefined.
    #[must_use]
    pub fn fail_over(mut self, location: impl AsRef<str>) -> Self {
        self.fail_over_locations.push(location.as_ref().to_owned());
        self
    }

    /// Add an immediate validator.
    #[must_use]
    pub fn validator(mut self, validator: impl Into<Validator>) -> Self {
        self.validators.push(validator.into());
        self
    }

    /// Add a deferred validator.
    #[must_use]
    pub fn deferred_validator(mut self, validator: impl Into<Validator>) -> Self {
        self.deferred_validators.push(validator.into());
        self
    }

    /// Show errors before the first blur.
    #[must_use]
    pub fn show_errors(mut self, show: bool) -> Self {
        self.show_errors = show;
        self
    }

    /// Debounce window for deferred validators, in milliseconds.
    #[must_use]
    pub fn defer_millis(self, millis: u64) -> Self {
        self.defer(Duration::from_millis(millis))
    }

    /// Debounce window for deferred validators.
    ///
    /// Defaults to the validation model's
    /// [`FormConfig::default_defer`](crate::config::FormConfig::default_defer).
    #[must_use]
    pub fn defer(mut self, defer: Duration) -> Self {
        self.defer = Some(defer);
        self
    }
}

#[derive(Debug, Default)]
struct LeafState {
    phase: LeafPhase,
    last_validated: Option<Value>,
}

/// Controller for one location of the model.
///
/// Dropping the controller discards its pending validation results and clears
/// its validating flag.
pub struct LeafController {
    location: Location,
    fail_over: Vec<Location>,
    show_errors: bool,
    validation: ValidationModel,
    on_replace: ModelReplacer,
    runner: ValidationRunner,
    state: Mutex<LeafState>,
}

impl fmt::Debug for LeafController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafController")
            .field("location", &self.location)
            .field("fail_over", &self.fail_over)
            .field("show_errors", &self.show_errors)
            .field("phase", &self.phase())
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

impl LeafController {
    /// Create a leaf committing errors into `validation` and reporting model
    /// replacements to `on_replace`.
    pub fn new(
        config: LeafConfig,
        validation: &ValidationModel,
        on_replace: ModelReplacer,
    ) -> Result<Self, PathError> {
        let location = Location::parse(config.location)?;
        let fail_over = config
            .fail_over_locations
            .into_iter()
            .map(Location::parse)
            .collect::<Result<Vec<_>, _>>()?;
        let defer = config
            .defer
            .unwrap_or(validation.config().default_defer);
        let runner = ValidationRunner::new(
            location.clone(),
            config.validators,
            config.deferred_validators,
            defer,
            validation,
        );

        Ok(Self {
            location,
            fail_over,
            show_errors: config.show_errors,
            validation: validation.clone(),
            on_replace,
            runner,
            state: Mutex::new(LeafState::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LeafState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The primary location. Child leaves build their locations from it.
    #[must_use]
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// The current value, honoring failover locations.
    #[must_use]
    pub fn value<'m>(&self, model: &'m Value) -> Cow<'m, Value> {
        path::read_with_failover(model, &self.location, &self.fail_over)
    }

    /// Write `value` at the primary location and hand the new model to the
    /// replacement callback. Does not validate.
    pub fn change(&self, model: &Value, value: Value) -> Result<(), PathError> {
        let next = path::write(model, &self.location, value)?;
        tracing::trace!(location = %self.location, "leaf value changed");
        (self.on_replace)(next);
        Ok(())
    }

    /// Mark the leaf touched and validate its current value.
    pub fn blur(&self, model: &Value) -> FormResult<RunToken> {
        {
            let mut state = self.lock();
            if state.phase == LeafPhase::Pristine {
                state.phase = LeafPhase::Touched;
                tracing::debug!(location = %self.location, "leaf touched");
            }
        }
        self.validate(self.value(model).into_owned())
    }

    /// Validate if this leaf has never validated or its value changed since
    /// the last run. Returns `None` when nothing was started.
    ///
    /// Hosts call this after attaching a leaf and after each model
    /// replacement.
    pub fn sync(&self, model: &Value) -> FormResult<Option<RunToken>> {
        let value = self.value(model);
        if self.lock().last_validated.as_ref() == Some(value.as_ref()) {
            return Ok(None);
        }
        self.validate(value.into_owned()).map(Some)
    }

    fn validate(&self, value: Value) -> FormResult<RunToken> {
        let token = self.runner.run(value.clone())?;
        self.lock().last_validated = Some(value);
        Ok(token)
    }

    /// Messages to display: the model's messages for this location once
    /// touched or when `show_errors` is set, otherwise none.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        if self.show_errors || self.phase() == LeafPhase::Touched {
            self.validation.get(self.location.as_str())
        } else {
            Vec::new()
        }
    }

    #[must_use]
    pub fn phase(&self) -> LeafPhase {
        self.lock().phase
    }

    /// Returns `true` while deferred validation for this leaf is in flight.
    #[must_use]
    pub fn is_validating(&self) -> bool {
        self.validation
            .is_location_validating(self.location.as_str())
    }

    /// The validation model this leaf commits into.
    #[must_use]
    pub fn validation(&self) -> &ValidationModel {
        &self.validation
    }

    /// This leaf's validation runner, for inspecting run traces.
    #[must_use]
    pub fn runner(&self) -> &ValidationRunner {
        &self.runner
    }

    /// Hand a snapshot of the leaf to a rendering function.
    pub fn render<'a, R>(&'a self, model: &'a Value, render: impl FnOnce(LeafView<'a>) -> R) -> R {
        render(LeafView {
            leaf: self,
            model,
            value: self.value(model),
            errors: self.errors(),
            is_validating: self.is_validating(),
        })
    }
}

/// What a rendering function sees of a leaf.
#[derive(Debug)]
pub struct LeafView<'a> {
    leaf: &'a LeafController,
    model: &'a Value,
    value: Cow<'a, Value>,
    errors: Vec<String>,
    is_validating: bool,
}

impl LeafView<'_> {
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    #[must_use]
    pub fn location(&self) -> &Location {
        self.leaf.location()
    }

    #[must_use]
    pub fn is_validating(&self) -> bool {
        self.is_validating
    }

    #[must_use]
    pub fn phase(&self) -> LeafPhase {
        self.leaf.phase()
    }

    /// See [`LeafController::change`].
    pub fn change(&self, value: Value) -> Result<(), PathError> {
        self.leaf.change(self.model, value)
    }

    /// See [`LeafController::blur`].
    pub fn blur(&self) -> FormResult<RunToken> {
        self.leaf.blur(self.model)
    }

    /// Location of a nested key or index, for composing child leaves.
    pub fn child(&self, key: impl fmt::Display) -> Result<Location, PathError> {
        self.leaf.location().child(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelCell;
    use crate::validation::rules::Required;
    use serde_json::json;

    fn leaf(config: LeafConfig, validation: &ValidationModel, cell: &ModelCell) -> LeafController {
        LeafController::new(config, validation, cell.replacer()).unwrap()
    }

    #[test]
    fn invalid_locations_are_rejected() {
        let validation = ValidationModel::new();
        let cell = ModelCell::default();
        let err = LeafController::new(LeafConfig::new(""), &validation, cell.replacer())
            .unwrap_err();
        assert_eq!(err, PathError::Empty);
        let err = LeafController::new(
            LeafConfig::new("a").fail_over("b..c"),
            &validation,
            cell.replacer(),
        )
        .unwrap_err();
        assert!(matches!(err, PathError::EmptySegment { .. }));
    }

    #[test]
    fn change_replaces_without_validating() {
        let validation = ValidationModel::new();
        let cell = ModelCell::new(json!({"contact": {"email": "x"}}));
        let email = leaf(
            LeafConfig::new("contact.email").validator(Required::new()),
            &validation,
            &cell,
        );

        let before = cell.get();
        email.change(&before, json!("")).unwrap();
        assert_eq!(before, json!({"contact": {"email": "x"}}));
        assert_eq!(cell.get(), json!({"contact": {"email": ""}}));
        assert_eq!(validation.revision(), 0);
        assert_eq!(email.runner().current_token(), RunToken::NONE);
    }

    #[test]
    fn errors_hidden_until_blur() {
        let validation = ValidationModel::new();
        let cell = ModelCell::new(json!({"name": ""}));
        let name = leaf(LeafConfig::new("name").validator(Required::new()), &validation, &cell);

        name.sync(&cell.get()).unwrap();
        assert_eq!(validation.get("name"), ["Value is required"]);
        assert!(name.errors().is_empty());
        assert_eq!(name.phase(), LeafPhase::Pristine);

        name.blur(&cell.get()).unwrap();
        assert_eq!(name.phase(), LeafPhase::Touched);
        assert_eq!(name.errors(), ["Value is required"]);
    }

    #[test]
    fn sync_skips_unchanged_values() {
        let validation = ValidationModel::new();
        let cell = ModelCell::new(json!({"name": ""}));
        let name = leaf(LeafConfig::new("name").validator(Required::new()), &validation, &cell);

        assert!(name.sync(&cell.get()).unwrap().is_some());
        assert!(name.sync(&cell.get()).unwrap().is_none());
        name.change(&cell.get(), json!("Ada")).unwrap();
        assert!(name.sync(&cell.get()).unwrap().is_some());
        assert!(validation.get("name").is_empty());
    }

    #[test]
    fn failover_reads_and_primary_writes() {
        let validation = ValidationModel::new();
        let cell = ModelCell::new(json!({"legacy": {"mail": "old@example.com"}}));
        let email = leaf(
            LeafConfig::new("contact.email").fail_over("legacy.mail"),
            &validation,
            &cell,
        );

        assert_eq!(*email.value(&cell.get()), json!("old@example.com"));
        email.change(&cell.get(), json!("new@example.com")).unwrap();
        assert_eq!(
            cell.get(),
            json!({
                "legacy": {"mail": "old@example.com"},
                "contact": {"email": "new@example.com"}
            })
        );
        assert_eq!(*email.value(&cell.get()), json!("new@example.com"));
    }

    #[test]
    fn render_exposes_view_and_callbacks() {
        let validation = ValidationModel::new();
        let cell = ModelCell::new(json!({"name": ""}));
        let name = leaf(
            LeafConfig::new("name").validator(Required::new()).show_errors(true),
            &validation,
            &cell,
        );
        name.sync(&cell.get()).unwrap();

        let model = cell.get();
        let (value, errors, child) = name.render(&model, |view| {
            view.change(json!("Ada")).unwrap();
            (
                view.value().clone(),
                view.errors().to_vec(),
                view.child(0).unwrap(),
            )
        });
        assert_eq!(value, json!(""));
        assert_eq!(errors, ["Value is required"]);
        assert_eq!(child.as_str(), "name.0");
        assert_eq!(cell.get(), json!({"name": "Ada"}));
    }

    #[test]
    fn leaf_phase_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&LeafPhase::Touched).unwrap(),
            "\"touched\""
        );
    }

    #[test]
    fn defer_defaults_to_model_config() {
        use crate::config::FormConfig;

        let validation =
            ValidationModel::with_config(FormConfig::default().default_defer(Duration::from_millis(30)));
        let cell = ModelCell::default();
        let inherited = leaf(LeafConfig::new("a"), &validation, &cell);
        let overridden = leaf(LeafConfig::new("b").defer_millis(5), &validation, &cell);
        assert!(format!("{inherited:?}").contains("30ms"));
        assert!(format!("{overridden:?}").contains("5ms"));
    }
}
