//! Field catalog
//!
//! Metadata about datastores and their fields, and the resolver that
//! loads a datastore together with everything its lookup fields reference.

mod resolver;
mod types;

pub use resolver::{CatalogResolver, FieldCatalog, ResolvedCatalog, StoreCatalog};
pub use types::{Datastore, Field, Relation};
