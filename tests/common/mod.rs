//! Shared test utilities for orderflow integration tests.
//!
//! This module provides:
//! - `TestHarness` for an isolated database + catalog + worker setup
//! - Builders for model payloads and document fixtures

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{TestHarness, ORG};
