//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the decode engine:
//! - Logging and tracing infrastructure
//! - Runtime error type
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the other crates depend on. It
//! establishes the logging conventions used throughout the workspace.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
