//! genrisk-common - Shared error type used across all genrisk crates.

pub mod error;

pub use error::{GenriskError, Result};
