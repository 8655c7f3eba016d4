use serde::Serialize;

use maskgraph_core::{RuleSet, TableField};

/// Kind of recoverable problem found during analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    /// The rule was removed from the rule set.
    InvalidRule,
    /// A dependant column does not exist and was removed.
    MissingDependant,
    /// A dependant lies outside the configured schema or scope and was removed.
    OutOfScopeDependant,
}

impl IssueCode {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueCode::InvalidRule => "invalid_rule",
            IssueCode::MissingDependant => "missing_dependant",
            IssueCode::OutOfScopeDependant => "out_of_scope_dependant",
        }
    }
}

/// A rule or dependant the analyzer dropped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisIssue {
    pub code: IssueCode,
    /// Source field of the rule concerned.
    pub rule: TableField,
    /// Field that was dropped: the rule source or one of its dependants.
    pub field: TableField,
    pub message: String,
}

impl AnalysisIssue {
    pub fn new(
        code: IssueCode,
        rule: TableField,
        field: TableField,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            rule,
            field,
            message: message.into(),
        }
    }
}

/// Counters describing what one analysis run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisSummary {
    pub rules_in: usize,
    pub rules_out: usize,
    pub primary_key_rules_added: usize,
    pub foreign_key_rules_added: usize,
    pub dependants_added: usize,
    pub potential_dependants_added: usize,
    pub rules_dropped: usize,
    pub dependants_removed: usize,
    pub no_op_rules_pruned: usize,
}

/// Corrected rule set plus everything that was dropped on the way.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub rule_set: RuleSet,
    pub issues: Vec<AnalysisIssue>,
    pub summary: AnalysisSummary,
}

impl AnalysisOutcome {
    pub fn issues_with(&self, code: IssueCode) -> impl Iterator<Item = &AnalysisIssue> {
        self.issues.iter().filter(move |issue| issue.code == code)
    }
}
