//! assetfeed library
//!
//! Normalizes CSV datasets and RSS transaction feeds and serves them as JSON
//! behind a Google ID-token access gate. The modules are exposed for the
//! binary and for integration tests.

pub mod auth;
pub mod cache;
pub mod cli;
pub mod data;
pub mod http;
pub mod refresh;
pub mod service;
pub mod snapshot;
pub mod source;
