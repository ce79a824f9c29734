//! Report materialization
//!
//! - [`Materializer`]: one run, from stored definition to published rows
//! - [`MaterializationQueue`]: background scheduling with per-report
//!   generations, status registry and failure broadcast

#[cfg(test)]
mod fixtures;
mod materializer;
mod queue;

pub use materializer::{Computed, Materializer};
pub use queue::{MaterializationFailure, MaterializationQueue};
