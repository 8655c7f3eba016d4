//! Read-only catalog introspection for the analyzer and the retain store.

pub mod catalog;
pub mod pattern;
pub mod postgres;
pub mod snapshot;

pub use catalog::{CatalogColumn, ForeignKeyReference, PrimaryKeyColumn, SchemaCatalog};
pub use pattern::{escape_like, like_matches, like_regex};
pub use postgres::PostgresCatalog;
pub use snapshot::SnapshotCatalog;
