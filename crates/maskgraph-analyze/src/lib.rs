//! Dependency analysis over a rule set.
//!
//! The [`Analyzer`] completes a human-authored rule set against the live
//! catalog: it adds placeholder rules for primary keys, attaches foreign-key
//! dependants, proposes name-based candidates, drops rules that cannot apply
//! and finally prunes placeholders that ended up without dependants.

pub mod analyzer;
pub mod errors;
pub mod report;
pub mod validator;

pub use analyzer::Analyzer;
pub use errors::AnalyzeError;
pub use report::{AnalysisIssue, AnalysisOutcome, AnalysisSummary, IssueCode};
pub use validator::{RuleValidator, RuleVerdict};
