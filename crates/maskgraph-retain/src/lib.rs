//! Retain marks: rows exempted from transformation, recorded by primary key
//! in `<table>_RETAINED` shadow tables of the transformation database.

pub mod errors;
pub mod primary_key;
pub mod sql;
pub mod store;

pub use errors::{RetainCause, RetainError};
pub use primary_key::PrimaryKey;
pub use sql::{RETAIN_SUFFIX, shadow_table_name, source_table_name};
pub use store::RetainStore;
