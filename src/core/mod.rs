//! Core domain models for the task pipeline
//!
//! This module defines step definitions, their configuration, and the
//! immutable results produced by a run.

pub mod config;
pub mod state;
pub mod step;

pub use state::*;
pub use step::*;
