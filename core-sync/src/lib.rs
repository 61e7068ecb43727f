//! # Collection Backend
//!
//! Every write path into the collection store.
//!
//! ## Overview
//!
//! This crate provides:
//! - **Reconciliation** of incoming song batches against persisted records
//! - **Compilation classification** per (directory, album) group
//! - **Directory lifecycle**, statistics, expiry and bulk reset operations
//! - Change notifications emitted after every committed transaction
//!
//! All operations go through [`CollectionBackend`], which serializes access to
//! the store and publishes [`core_library::CollectionEvent`]s in commit order.

pub mod backend;
pub mod compilation;
pub mod error;
pub mod reconciler;

pub use backend::CollectionBackend;
pub use error::{Result, SyncError};
pub use reconciler::{ReconcileMode, ReconcileOutcome, WriteStats};
