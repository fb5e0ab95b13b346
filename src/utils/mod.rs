//! The `utils` module provides shared definitions used across `personbus`.
//!
//! It centralizes the error taxonomy used by every layer and the logging
//! initialisation shared by the binary and the tests.

pub mod error;
pub mod logging;
