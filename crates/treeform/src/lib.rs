#![forbid(unsafe_code)]

//! Nested form state and validation over tree-shaped models.
//!
//! The application model is a [`serde_json::Value`] owned by the host. Leaves
//! address slices of it with dotted [`Location`]s, write edits back as full
//! replacement models, and validate on blur. A [`ValidationModel`] shared by
//! every leaf of one form tree aggregates their messages and in-flight state.
//!
//! # Key Components
//!
//! - [`path`]: reading and writing values at a location, with failover reads
//! - [`ValidationModel`]: per-location messages, prefix queries, validating set
//! - [`ValidationRunner`]: token-stamped validation runs with stale-result
//!   suppression and a debounced deferred stage
//! - [`LeafController`]: one field's value, edits, blur handling and errors
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use treeform::validation::ValidationModel;
//! use treeform::validation::rules::Required;
//! use treeform::{LeafConfig, LeafController, ModelCell};
//!
//! let cell = ModelCell::new(json!({"contact": {"firstName": "", "lastName": ""}}));
//! let validation = ValidationModel::new();
//! let leaves: Vec<LeafController> = ["contact.firstName", "contact.lastName"]
//!     .into_iter()
//!     .map(|location| {
//!         let config = LeafConfig::new(location)
//!             .validator(Required::new())
//!             .show_errors(true);
//!         LeafController::new(config, &validation, cell.replacer()).unwrap()
//!     })
//!     .collect();
//!
//! for leaf in &leaves {
//!     leaf.sync(&cell.get()).unwrap();
//! }
//! let summary = validation.all_errors_for_location(Some("contact"));
//! assert_eq!(summary[0].location, "contact.firstName");
//! assert_eq!(summary[1].location, "contact.lastName");
//! ```
//!
//! [`ValidationModel`]: validation::ValidationModel
//! [`ValidationRunner`]: validation::ValidationRunner

pub mod config;
pub mod error;
pub mod leaf;
pub mod location;
#[cfg(feature = "logging")]
pub mod logging;
pub mod model;
pub mod path;
pub mod validation;

pub use config::FormConfig;
pub use error::{FormError, FormResult, PathError};
pub use leaf::{LeafConfig, LeafController, LeafPhase, LeafView};
pub use location::{Location, Segment};
pub use model::{ModelCell, ModelReplacer};
