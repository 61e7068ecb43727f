//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the collection core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus with broadcast observers and ordered subscribers
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the store, the backend and
//! the grouping index depend on. It establishes the logging conventions and
//! the notification channel used to carry collection deltas from the backend
//! worker to the index maintenance context.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
