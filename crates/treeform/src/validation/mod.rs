#![forbid(unsafe_code)]

//! Validation: validators, the shared message aggregate and per-leaf runs.
//!
//! - [`Validator`] / [`Verdict`]: the validator contract.
//! - [`rules`]: built-in validators.
//! - [`ValidationModel`]: messages and in-flight state for one form tree.
//! - [`ValidationRunner`]: token-stamped runs committing into the model.

mod model;
pub mod rules;
mod runner;
mod validator;

pub use model::{ErrorEntry, ErrorQuery, ValidationEdit, ValidationModel, WeakValidationModel};
pub use rules::Rule;
pub use runner::{RunEvent, RunToken, RunTrace, Stage, ValidationRunner};
pub use validator::{Validator, Verdict};
