use std::collections::{BTreeSet, HashMap, HashSet};

use maskgraph_core::{RuleSet, TableField};
use maskgraph_introspect::{ForeignKeyReference, SchemaCatalog, escape_like};
use maskgraph_strategy::StrategyRegistry;

use crate::errors::AnalyzeError;
use crate::report::{AnalysisIssue, AnalysisOutcome, AnalysisSummary, IssueCode};
use crate::validator::{RuleValidator, RuleVerdict};

/// Rule indexes grouped by source field, in rule order.
type RuleIndex = HashMap<TableField, Vec<usize>>;

/// Completes and checks a rule set against a schema catalog.
pub struct Analyzer<'a> {
    catalog: &'a dyn SchemaCatalog,
    strategies: &'a StrategyRegistry,
}

/// Mutable state of a single analysis run.
struct Run {
    rule_set: RuleSet,
    index: RuleIndex,
    dropped: HashSet<usize>,
    issues: Vec<AnalysisIssue>,
    summary: AnalysisSummary,
}

impl Run {
    /// True when a rule that has not been dropped lists `field` as a
    /// confirmed dependant. Potential dependants never hide a candidate from
    /// another rule.
    fn confirmed_by_live_rule(&self, field: &TableField) -> bool {
        self.rule_set
            .rules
            .iter()
            .enumerate()
            .filter(|(idx, _)| !self.dropped.contains(idx))
            .any(|(_, rule)| rule.dependants().contains(field))
    }

    /// True when a live rule on `source` lists `field`.
    fn live_rule_on_lists(&self, source: &TableField, field: &TableField) -> bool {
        self.index
            .get(source)
            .into_iter()
            .flatten()
            .filter(|idx| !self.dropped.contains(*idx))
            .any(|idx| self.rule_set.rules[*idx].mentions(field))
    }

    fn in_scope(&self, field: &TableField) -> bool {
        field.schema == self.rule_set.schema_name && self.rule_set.scope.contains(&field.table)
    }
}

impl<'a> Analyzer<'a> {
    pub fn new(catalog: &'a dyn SchemaCatalog, strategies: &'a StrategyRegistry) -> Self {
        Self {
            catalog,
            strategies,
        }
    }

    /// Run the full pipeline: primary-key gap fill, foreign-key dependants,
    /// per-rule validation with name-based candidates, then no-op pruning.
    pub async fn analyze(&self, rule_set: RuleSet) -> Result<AnalysisOutcome, AnalyzeError> {
        tracing::info!(
            event = "analysis_started",
            schema = %rule_set.schema_name,
            tables_in_scope = rule_set.scope.len(),
            rules = rule_set.rules.len()
        );

        let mut summary = AnalysisSummary {
            rules_in: rule_set.rules.len(),
            ..AnalysisSummary::default()
        };
        let mut rule_set = rule_set;

        let tables = self.scoped_tables(&rule_set).await?;
        summary.primary_key_rules_added = self.fill_primary_key_rules(&mut rule_set, &tables).await?;

        let index = index_rules(&rule_set);
        let mut run = Run {
            rule_set,
            index,
            dropped: HashSet::new(),
            issues: Vec::new(),
            summary,
        };

        self.add_foreign_key_dependants(&mut run, &tables).await?;
        self.check_rules(&mut run).await?;

        let Run {
            mut rule_set,
            dropped,
            issues,
            mut summary,
            ..
        } = run;

        let mut position = 0;
        rule_set.rules.retain(|_| {
            let keep = !dropped.contains(&position);
            position += 1;
            keep
        });
        summary.rules_dropped = dropped.len();

        summary.no_op_rules_pruned = rule_set.remove_no_op_rules_without_dependants();
        summary.rules_out = rule_set.rules.len();
        tracing::info!(
            event = "no_op_rules_pruned",
            count = summary.no_op_rules_pruned
        );
        tracing::info!(
            event = "analysis_finished",
            rules = summary.rules_out,
            issues = issues.len()
        );

        Ok(AnalysisOutcome {
            rule_set,
            issues,
            summary,
        })
    }

    /// Add a no-op rule for every primary key column of every in-scope table
    /// that no rule targets yet. Returns how many rules were added; running it
    /// twice adds nothing the second time.
    pub async fn add_rules_for_primary_key_columns(
        &self,
        rule_set: &mut RuleSet,
    ) -> Result<usize, AnalyzeError> {
        let tables = self.scoped_tables(rule_set).await?;
        self.fill_primary_key_rules(rule_set, &tables).await
    }

    /// Base tables of the configured schema that are in scope, in catalog order.
    async fn scoped_tables(&self, rule_set: &RuleSet) -> Result<Vec<String>, AnalyzeError> {
        let tables = self.catalog.list_tables(&rule_set.schema_name).await?;
        Ok(tables
            .into_iter()
            .filter(|table| rule_set.scope.contains(table))
            .collect())
    }

    async fn fill_primary_key_rules(
        &self,
        rule_set: &mut RuleSet,
        tables: &[String],
    ) -> Result<usize, AnalyzeError> {
        let mut added = 0;
        for table in tables {
            let key = self
                .catalog
                .primary_key_columns(&rule_set.schema_name, table)
                .await?;
            for column in key {
                let field = TableField::new(&rule_set.schema_name, table, column.column);
                if rule_set.has_rule_for(&field) {
                    continue;
                }
                tracing::debug!(event = "primary_key_rule_added", field = %field);
                rule_set.add_no_op_rule_for(field);
                added += 1;
            }
        }
        tracing::info!(event = "primary_key_rules_added", count = added);
        Ok(added)
    }

    async fn add_foreign_key_dependants(
        &self,
        run: &mut Run,
        tables: &[String],
    ) -> Result<(), AnalyzeError> {
        let schema = run.rule_set.schema_name.clone();
        for table in tables {
            let mut references = self.catalog.exported_keys(&schema, table).await?;
            references.extend(self.catalog.imported_keys(&schema, table).await?);

            for reference in references {
                attach_foreign_key(run, reference);
            }
        }
        Ok(())
    }

    /// Validate every rule in order, clean its dependants and look for
    /// name-based candidates. Invalid rules are marked dropped.
    async fn check_rules(&self, run: &mut Run) -> Result<(), AnalyzeError> {
        let validator = RuleValidator::new(
            self.catalog,
            self.strategies,
            &run.rule_set.schema_name,
            &run.rule_set.scope,
        );

        // Verdicts only depend on the catalog and the rule itself.
        let mut verdicts = Vec::with_capacity(run.rule_set.rules.len());
        for rule in &run.rule_set.rules {
            verdicts.push(validator.validate(rule).await?);
        }

        for (idx, verdict) in verdicts.into_iter().enumerate() {
            let source = run.rule_set.rules[idx].field.clone();
            if let RuleVerdict::Invalid(reason) = verdict {
                tracing::warn!(event = "rule_dropped", field = %source, reason = %reason);
                run.dropped.insert(idx);
                run.issues.push(AnalysisIssue::new(
                    IssueCode::InvalidRule,
                    source.clone(),
                    source,
                    reason,
                ));
                continue;
            }

            self.check_dependants(run, idx).await?;
            self.find_potential_dependants(run, idx).await?;
        }
        Ok(())
    }

    async fn check_dependants(&self, run: &mut Run, idx: usize) -> Result<(), AnalyzeError> {
        let rule = &run.rule_set.rules[idx];
        let source = rule.field.clone();
        let listed: BTreeSet<(TableField, bool)> = rule
            .dependants()
            .iter()
            .map(|field| (field.clone(), false))
            .chain(
                rule.potential_dependants()
                    .iter()
                    .map(|field| (field.clone(), true)),
            )
            .collect();

        for (dependant, potential) in listed {
            let (code, message) = if !run.in_scope(&dependant) {
                (
                    IssueCode::OutOfScopeDependant,
                    format!("dependant {dependant} is outside the analyzed schema or scope"),
                )
            } else if !self.catalog.column_exists(&dependant).await? {
                (
                    IssueCode::MissingDependant,
                    format!("dependant {dependant} does not exist"),
                )
            } else {
                continue;
            };

            let rule = &mut run.rule_set.rules[idx];
            if potential {
                rule.remove_potential_dependant(&dependant);
            } else {
                rule.remove_dependant(&dependant);
            }
            tracing::warn!(
                event = "dependant_removed",
                rule = %source,
                dependant = %dependant,
                code = code.as_str()
            );
            run.summary.dependants_removed += 1;
            run.issues
                .push(AnalysisIssue::new(code, source.clone(), dependant, message));
        }
        Ok(())
    }

    async fn find_potential_dependants(
        &self,
        run: &mut Run,
        idx: usize,
    ) -> Result<(), AnalyzeError> {
        let source = run.rule_set.rules[idx].field.clone();
        let pattern = format!("%{}%", escape_like(&source.column));
        let candidates = self
            .catalog
            .list_columns(&run.rule_set.schema_name, None, &pattern)
            .await?;

        for candidate in candidates {
            let field = candidate.field;
            if !run.in_scope(&field) || field == source {
                continue;
            }
            if run.confirmed_by_live_rule(&field) || run.live_rule_on_lists(&field, &source) {
                continue;
            }

            if run.rule_set.rules[idx].add_potential_dependant(field.clone()) {
                tracing::info!(
                    event = "potential_dependant_found",
                    rule = %source,
                    candidate = %field
                );
                run.summary.potential_dependants_added += 1;
            }
        }
        Ok(())
    }
}

fn index_rules(rule_set: &RuleSet) -> RuleIndex {
    let mut index = RuleIndex::new();
    for (idx, rule) in rule_set.rules.iter().enumerate() {
        index.entry(rule.field.clone()).or_default().push(idx);
    }
    index
}

/// Attach `reference.child` as a confirmed dependant of the first rule on
/// `reference.parent`, creating a no-op parent rule when needed.
fn attach_foreign_key(run: &mut Run, reference: ForeignKeyReference) {
    let ForeignKeyReference { parent, child, .. } = reference;
    if !run.in_scope(&parent) || !run.in_scope(&child) || parent == child {
        return;
    }

    let first = match run.index.get(&parent).and_then(|rules| rules.first()) {
        Some(idx) => *idx,
        None => {
            let idx = run.rule_set.add_no_op_rule_for(parent.clone());
            run.index.insert(parent.clone(), vec![idx]);
            run.summary.foreign_key_rules_added += 1;
            idx
        }
    };

    let already_listed = run
        .index
        .get(&parent)
        .into_iter()
        .flatten()
        .any(|idx| run.rule_set.rules[*idx].dependants().contains(&child));
    if already_listed {
        return;
    }

    let inverse = run
        .index
        .get(&child)
        .into_iter()
        .flatten()
        .any(|idx| run.rule_set.rules[*idx].mentions(&parent));
    if inverse {
        tracing::debug!(
            event = "inverse_dependant_skipped",
            parent = %parent,
            child = %child
        );
        return;
    }

    if run.rule_set.rules[first].add_dependant(child.clone()) {
        tracing::debug!(event = "dependant_found", parent = %parent, child = %child);
        run.summary.dependants_added += 1;
    }
}
