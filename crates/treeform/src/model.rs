#![forbid(unsafe_code)]

//! A shared holder for the application model.
//!
//! Leaves never own the model. They read the `&Value` they are handed and
//! report replacements through a [`ModelReplacer`]. [`ModelCell`] is the
//! simplest host for that contract: it stores the current model and hands out
//! a replacer that swaps it.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

/// Callback receiving each full replacement model produced by a leaf.
pub type ModelReplacer = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Debug, Default)]
struct CellState {
    value: Value,
    revision: u64,
}

/// The current model plus a replacement counter. Cloning shares the cell.
#[derive(Clone, Default)]
pub struct ModelCell {
    inner: Arc<RwLock<CellState>>,
}

impl fmt::Debug for ModelCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ModelCell")
            .field("value", &state.value)
            .field("revision", &state.revision)
            .finish()
    }
}

impl ModelCell {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CellState { value, revision: 0 })),
        }
    }

    /// A copy of the current model.
    #[must_use]
    pub fn get(&self) -> Value {
        self.with(Value::clone)
    }

    /// Borrow the current model for the duration of `f`.
    ///
    /// Leaf operations that replace the model must not be called from inside
    /// `f` when the replacer targets this cell.
    pub fn with<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&state.value)
    }

    /// Store a new model and return the new revision.
    pub fn replace(&self, value: Value) -> u64 {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state.value = value;
        state.revision += 1;
        tracing::trace!(revision = state.revision, "model replaced");
        state.revision
    }

    /// Number of replacements so far.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .revision
    }

    /// A replacer that stores every model it receives in this cell.
    #[must_use]
    pub fn replacer(&self) -> ModelReplacer {
        let cell = self.clone();
        Arc::new(move |value: Value| {
            cell.replace(value);
        })
    }
}
