#![forbid(unsafe_code)]

//! The validator contract: a function from the current value to messages.
//!
//! A validator answers with a [`Verdict`], which is nothing (valid), one
//! message, or several. Plain closures, async closures and built-in
//! [`Rule`](super::rules::Rule)s all become a [`Validator`]:
//!
//! ```rust
//! use serde_json::Value;
//! use treeform::validation::Validator;
//!
//! let is_required = Validator::new(|value: &Value| {
//!     value.as_str().is_some_and(|s| s.trim().is_empty()).then_some("Value is required")
//! });
//! let not_taken = Validator::from_async(|value: Value| async move {
//!     (value == "taken").then(|| format!("{value} is not available"))
//! });
//! # let _ = (is_required, not_taken);
//! ```
//!
//! A validator that panics, or a [`Validator::fallible`] future that returns
//! `Err`, contributes no messages. The failure is logged at `warn` and the rest
//! of the run proceeds.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// The outcome of one validator: an ordered, possibly empty, list of messages.
///
/// Empty strings are dropped on conversion, so a validator returning `""` is
/// treated as passing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict(Vec<String>);

impl Verdict {
    /// A passing verdict.
    #[must_use]
    pub fn pass() -> Self {
        Self(Vec::new())
    }

    /// A failing verdict with one message.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self::from(message.into())
    }

    /// Returns `true` when there are no messages.
    #[must_use]
    pub fn is_pass(&self) -> bool {
        self.0.is_empty()
    }

    /// The messages, in order.
    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.0
    }

    /// Consume into the message list.
    #[must_use]
    pub fn into_messages(self) -> Vec<String> {
        self.0
    }
}

impl From<()> for Verdict {
    fn from((): ()) -> Self {
        Self::pass()
    }
}

impl From<String> for Verdict {
    fn from(message: String) -> Self {
        if message.is_empty() {
            Self::pass()
        } else {
            Self(vec![message])
        }
    }
}

impl From<&str> for Verdict {
    fn from(message: &str) -> Self {
        Self::from(message.to_owned())
    }
}

impl<T: Into<Verdict>> From<Option<T>> for Verdict {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Self::pass, Into::into)
    }
}

impl From<Vec<String>> for Verdict {
    fn from(messages: Vec<String>) -> Self {
        Self(messages.into_iter().filter(|m| !m.is_empty()).collect())
    }
}

impl From<Vec<&str>> for Verdict {
    fn from(messages: Vec<&str>) -> Self {
        messages.into_iter().map(str::to_owned).collect::<Vec<_>>().into()
    }
}

impl<const N: usize> From<[&str; N]> for Verdict {
    fn from(messages: [&str; N]) -> Self {
        Vec::from(messages).into()
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

type SyncCheck = dyn Fn(&Value) -> Verdict + Send + Sync;
type AsyncCheck = dyn Fn(Value) -> BoxFuture<'static, Result<Verdict, String>> + Send + Sync;

#[derive(Clone)]
enum Check {
    Sync(Arc<SyncCheck>),
    Async(Arc<AsyncCheck>),
}

/// A synchronous or asynchronous validator, cheap to clone.
#[derive(Clone)]
pub struct Validator {
    name: Arc<str>,
    check: Check,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("name", &self.name)
            .field("is_sync", &self.is_sync())
            .finish()
    }
}

impl Validator {
    /// Wrap a synchronous check.
    pub fn new<F, V>(check: F) -> Self
    where
        F: Fn(&Value) -> V + Send + Sync + 'static,
        V: Into<Verdict>,
    {
        Self {
            name: Arc::from("anonymous"),
            check: Check::Sync(Arc::new(move |value: &Value| -> Verdict {
                check(value).into()
            })),
        }
    }

    /// Wrap an asynchronous check. The closure receives its own copy of the
    /// value so the returned future can outlive the call.
    pub fn from_async<F, Fut, V>(check: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = V> + Send + 'static,
        V: Into<Verdict>,
    {
        Self {
            name: Arc::from("anonymous"),
            check: Check::Async(Arc::new(
                move |value: Value| -> BoxFuture<'static, Result<Verdict, String>> {
                    check(value)
                        .map(|verdict| Ok::<Verdict, String>(verdict.into()))
                        .boxed()
                },
            )),
        }
    }

    /// Wrap an asynchronous check that may reject. A rejection counts as no
    /// messages for this validator.
    pub fn fallible<F, Fut, V, E>(check: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        V: Into<Verdict>,
        E: fmt::Display,
    {
        Self {
            name: Arc::from("anonymous"),
            check: Check::Async(Arc::new(
                move |value: Value| -> BoxFuture<'static, Result<Verdict, String>> {
                    check(value)
                        .map(|result| result.map(Into::into).map_err(|e| e.to_string()))
                        .boxed()
                },
            )),
        }
    }

    /// Name used in log output.
    #[must_use]
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    /// The validator's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` when the validator answers without suspending.
    #[must_use]
    pub fn is_sync(&self) -> bool {
        matches!(self.check, Check::Sync(_))
    }

    /// Evaluate a synchronous validator in place. `None` for async validators.
    pub(crate) fn evaluate_now(&self, value: &Value) -> Option<Vec<String>> {
        match &self.check {
            Check::Sync(check) => Some(
                match std::panic::catch_unwind(AssertUnwindSafe(|| check(value))) {
                    Ok(verdict) => verdict.into_messages(),
                    Err(_) => {
                        tracing::warn!(validator = %self.name, "validator panicked, ignoring");
                        Vec::new()
                    }
                },
            ),
            Check::Async(_) => None,
        }
    }

    /// Evaluate the validator, never failing.
    pub(crate) fn evaluate(&self, value: &Value) -> BoxFuture<'static, Vec<String>> {
        match &self.check {
            Check::Sync(_) => {
                let messages = self.evaluate_now(value).unwrap_or_default();
                futures::future::ready(messages).boxed()
            }
            Check::Async(check) => {
                let name = Arc::clone(&self.name);
                let future = check(value.clone());
                async move {
                    match AssertUnwindSafe(future).catch_unwind().await {
                        Ok(Ok(verdict)) => verdict.into_messages(),
                        Ok(Err(error)) => {
                            tracing::warn!(validator = %name, %error, "validator rejected, ignoring");
                            Vec::new()
                        }
                        Err(_) => {
                            tracing::warn!(validator = %name, "validator panicked, ignoring");
                            Vec::new()
                        }
                    }
                }
                .boxed()
            }
        }
    }
}

/// Evaluate every synchronous validator inline, concatenating in order.
///
/// Returns `None` when any validator is asynchronous.
pub(crate) fn evaluate_all_now(validators: &[Validator], value: &Value) -> Option<Vec<String>> {
    let mut messages = Vec::new();
    for validator in validators {
        messages.extend(validator.evaluate_now(value)?);
    }
    Some(messages)
}

/// Evaluate validators concurrently; messages are concatenated in declaration
/// order regardless of completion order.
pub(crate) async fn evaluate_all(validators: &[Validator], value: &Value) -> Vec<String> {
    join_all(validators.iter().map(|validator| validator.evaluate(value)))
        .await
        .into_iter()
        .flatten()
        .collect()
}
