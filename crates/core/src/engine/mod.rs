//! External validation engine client.
//!
//! The engine is a black-box service: it receives paths to a model, a
//! specification and an output file inside the shared uploads volume,
//! validates, and answers with a report.

mod http;
mod types;

pub use http::HttpValidationEngine;
pub use types::*;
