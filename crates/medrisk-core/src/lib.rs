//! Core domain types and traits for the medrisk analysis platform.
//!
//! This crate contains:
//! - Job identifiers and lifecycle records
//! - Analysis request validation
//! - The analyzer trait (the seam to the clinical pipeline)
//! - Per-job workspace layout

pub mod analyzer;
pub mod error;
pub mod id;
pub mod job;
pub mod request;
pub mod workspace;

pub use error::{Error, Result};
pub use id::JobId;
