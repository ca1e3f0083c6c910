//! # MoodLens Common Library
//!
//! Shared code for the MoodLens analysis client crates:
//! - Error types
//! - TOML configuration model and resolution helpers
//! - Tracing initialisation
//! - Job lifecycle events (`AnalysisEvent`) and the `EventBus`

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
