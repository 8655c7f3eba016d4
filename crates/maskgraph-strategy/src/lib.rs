//! Transformation strategies: the per-column unit of work applied to rows.
//!
//! A strategy receives a rule and a row and returns zero values (delete the
//! row) or one replacement value. Strategies are looked up by name through
//! [`StrategyRegistry`].

pub mod delete_row;
pub mod errors;
pub mod no_op;
pub mod predicate;
pub mod registry;
pub mod strategy;

pub use delete_row::DeleteRowStrategy;
pub use errors::StrategyError;
pub use no_op::NoOperationStrategy;
pub use predicate::{PredicateError, RowPredicate};
pub use registry::{DELETE_ROW_KIND, StrategyRegistry};
pub use strategy::{StrategyContext, TableRuleMap, TransformOutcome, TransformationStrategy};
