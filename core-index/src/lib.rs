//! # Grouping Index
//!
//! In-memory tree over the collection, grouped by up to three dimensions
//! with alphabetic or numeric dividers at the top level.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GroupBy`] dimensions and the [`Grouping`] configuration
//! - Key, display and sort text rules for every dimension
//! - [`CollectionIndex`], the incrementally maintained tree
//! - [`CollectionModel`], which populates the tree in the background and
//!   applies backend events in emission order

pub mod divider;
pub mod error;
pub mod grouping;
pub mod index;
pub mod model;
pub mod node;
pub mod text;

pub use error::{IndexError, Result};
pub use grouping::{GroupBy, Grouping, SavedGroupings, GROUPING_LEVELS};
pub use index::{CollectionIndex, IndexChange, LOADING_TEXT};
pub use model::CollectionModel;
pub use node::{Node, NodeId, NodeKind};
