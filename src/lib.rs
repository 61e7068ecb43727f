//! Music collection core.
//!
//! Re-exports the workspace crates so a host can depend on one package:
//! - [`runtime`]: configuration, logging and the event bus
//! - [`library`]: the record store and query planner
//! - [`sync`]: the backend, reconciler and compilation classifier
//! - [`index`]: the grouping index and its model

pub use core_index as index;
pub use core_library as library;
pub use core_runtime as runtime;
pub use core_sync as sync;
