//! Remote file acquisition.
//!
//! This module provides a `RemoteFetcher` trait for downloading referenced
//! files over HTTP, used both for validation inputs and for the browser
//! download proxy.

mod http;
mod types;

pub use http::{parse_http_url, HttpFetcher};
pub use types::*;
