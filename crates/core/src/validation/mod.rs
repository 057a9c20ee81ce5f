//! Validation orchestrator.
//!
//! Turns a [`ValidationRequest`] into a report: derive the cache key, serve
//! the stored report when present, otherwise download the sources into the
//! project namespace, call the engine and persist what it returns.

mod service;
mod types;

pub use service::ValidationService;
pub use types::{
    InputKind, ValidationError, ValidationOutcome, ValidationRequest, DEFAULT_MODEL_EXTENSION,
    DEFAULT_SPEC_EXTENSION,
};
