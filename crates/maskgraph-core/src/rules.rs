use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::field::TableField;

/// Registry key of the built-in no-operation strategy.
pub const NO_OP_STRATEGY: &str = "no_op";

/// A strategy assignment for one column plus the columns that must track it.
///
/// Field order matters for TOML output: scalars are emitted before nested
/// tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRule")]
pub struct Rule {
    /// Strategy name as registered in the rule set's strategy mapping.
    pub strategy: String,
    /// Strategy-specific configuration (e.g. a row predicate for delete-row).
    #[serde(default)]
    pub additional_info: String,
    /// Column whose values the strategy transforms.
    pub field: TableField,
    /// Confirmed dependants, typically discovered through foreign keys.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    dependants: BTreeSet<TableField>,
    /// Name-based candidates awaiting human confirmation.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    potential_dependants: BTreeSet<TableField>,
}

impl Rule {
    pub fn new(
        field: TableField,
        strategy: impl Into<String>,
        additional_info: impl Into<String>,
    ) -> Self {
        Self {
            strategy: strategy.into(),
            additional_info: additional_info.into(),
            field,
            dependants: BTreeSet::new(),
            potential_dependants: BTreeSet::new(),
        }
    }

    /// Placeholder rule that leaves `field` untouched.
    pub fn no_op(field: TableField) -> Self {
        Self::new(field, NO_OP_STRATEGY, "")
    }

    pub fn is_no_op(&self) -> bool {
        self.strategy == NO_OP_STRATEGY
    }

    pub fn dependants(&self) -> &BTreeSet<TableField> {
        &self.dependants
    }

    pub fn potential_dependants(&self) -> &BTreeSet<TableField> {
        &self.potential_dependants
    }

    /// Adds a confirmed dependant. Returns false for the rule's own field or
    /// an already present dependant.
    pub fn add_dependant(&mut self, field: TableField) -> bool {
        if field == self.field {
            return false;
        }
        self.dependants.insert(field)
    }

    /// Adds a potential dependant. Returns false for the rule's own field or
    /// an already present candidate.
    pub fn add_potential_dependant(&mut self, field: TableField) -> bool {
        if field == self.field {
            return false;
        }
        self.potential_dependants.insert(field)
    }

    pub fn remove_dependant(&mut self, field: &TableField) -> bool {
        self.dependants.remove(field)
    }

    pub fn remove_potential_dependant(&mut self, field: &TableField) -> bool {
        self.potential_dependants.remove(field)
    }

    /// True when `field` is a confirmed or potential dependant.
    pub fn mentions(&self, field: &TableField) -> bool {
        self.dependants.contains(field) || self.potential_dependants.contains(field)
    }

    pub fn has_any_dependants(&self) -> bool {
        !self.dependants.is_empty() || !self.potential_dependants.is_empty()
    }
}

/// On-disk shape of a rule, checked before it becomes a [`Rule`].
#[derive(Deserialize)]
struct RawRule {
    strategy: String,
    #[serde(default)]
    additional_info: String,
    field: TableField,
    #[serde(default)]
    dependants: Vec<TableField>,
    #[serde(default)]
    potential_dependants: Vec<TableField>,
}

impl TryFrom<RawRule> for Rule {
    type Error = Error;

    fn try_from(raw: RawRule) -> Result<Self> {
        let mut rule = Rule::new(raw.field, raw.strategy, raw.additional_info);
        let lists_itself = raw
            .dependants
            .iter()
            .chain(&raw.potential_dependants)
            .any(|dependant| dependant == &rule.field);
        if lists_itself {
            return Err(Error::InvalidRule(format!(
                "{} lists itself as a dependant",
                rule.field
            )));
        }
        for dependant in raw.dependants {
            rule.add_dependant(dependant);
        }
        for candidate in raw.potential_dependants {
            rule.add_potential_dependant(candidate);
        }
        Ok(rule)
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.field, self.strategy)?;
        if !self.additional_info.is_empty() {
            write!(f, " [{}]", self.additional_info)?;
        }
        Ok(())
    }
}

/// Tables eligible for analysis and transformation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope {
    tables: BTreeSet<String>,
}

impl Scope {
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Ordered rule collection plus the schema, scope and strategy mapping it
/// applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Schema all rule sources live in.
    #[serde(rename = "schema")]
    pub schema_name: String,
    #[serde(default)]
    pub scope: Scope,
    /// Strategy name -> strategy kind (e.g. `purge_cancelled = "delete_row"`).
    #[serde(default)]
    pub strategies: BTreeMap<String, String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(schema_name: impl Into<String>, scope: Scope) -> Self {
        Self {
            schema_name: schema_name.into(),
            scope,
            strategies: BTreeMap::new(),
            rules: Vec::new(),
        }
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Appends a no-op rule for `field` and returns its index.
    ///
    /// Callers check that no rule targets `field` yet.
    pub fn add_no_op_rule_for(&mut self, field: TableField) -> usize {
        self.rules.push(Rule::no_op(field));
        self.rules.len() - 1
    }

    /// Drops no-op rules without confirmed or potential dependants and
    /// returns how many were removed.
    pub fn remove_no_op_rules_without_dependants(&mut self) -> usize {
        let before = self.rules.len();
        self.rules
            .retain(|rule| !rule.is_no_op() || rule.has_any_dependants());
        before - self.rules.len()
    }

    pub fn rules_for<'a>(&'a self, field: &TableField) -> impl Iterator<Item = &'a Rule> {
        self.rules.iter().filter(move |rule| &rule.field == field)
    }

    pub fn has_rule_for(&self, field: &TableField) -> bool {
        self.rules.iter().any(|rule| &rule.field == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(table: &str, column: &str) -> TableField {
        TableField::new("app", table, column)
    }

    #[test]
    fn rule_refuses_own_field_as_dependant() {
        let mut rule = Rule::no_op(field("CUSTOMER", "ID"));
        assert!(!rule.add_dependant(field("CUSTOMER", "ID")));
        assert!(!rule.add_potential_dependant(field("CUSTOMER", "ID")));
        assert!(rule.add_dependant(field("ORDER", "CUSTOMER_ID")));
        assert!(!rule.add_dependant(field("ORDER", "CUSTOMER_ID")));
        assert_eq!(rule.dependants().len(), 1);
    }

    #[test]
    fn cleanup_keeps_rules_with_any_dependants() {
        let mut rules = RuleSet::new("app", Scope::new(["CUSTOMER", "ORDER"]));
        let customer = rules.add_no_op_rule_for(field("CUSTOMER", "ID"));
        rules.add_no_op_rule_for(field("ORDER", "ID"));
        let archive = rules.add_no_op_rule_for(field("ORDER", "NOTE_ID"));
        rules.rules.push(Rule::new(field("ORDER", "EMAIL"), "mask", ""));

        rules.rules[customer].add_dependant(field("ORDER", "CUSTOMER_ID"));
        rules.rules[archive].add_potential_dependant(field("ORDER", "OLD_NOTE_ID"));

        assert_eq!(rules.remove_no_op_rules_without_dependants(), 1);
        assert_eq!(rules.rules.len(), 3);
        assert!(!rules.has_rule_for(&field("ORDER", "ID")));
        assert!(rules.has_rule_for(&field("ORDER", "EMAIL")));
    }

    #[test]
    fn parses_rule_file() {
        let input = r#"
schema = "app"
scope = ["CUSTOMER", "ORDER"]

[strategies]
purge_cancelled = "delete_row"

[[rules]]
strategy = "purge_cancelled"
additional_info = "STATUS = 'CANCELLED'"
field = { schema = "app", table = "ORDER", column = "STATUS" }

[[rules]]
strategy = "no_op"
field = { schema = "app", table = "CUSTOMER", column = "ID" }
dependants = [{ schema = "app", table = "ORDER", column = "CUSTOMER_ID" }]
"#;
        let rules = RuleSet::from_toml_str(input).expect("parse rules");
        assert_eq!(rules.schema_name, "app");
        assert!(rules.scope.contains("ORDER"));
        assert_eq!(
            rules.strategies.get("purge_cancelled").map(String::as_str),
            Some("delete_row")
        );
        assert_eq!(rules.rules.len(), 2);
        assert_eq!(rules.rules[0].additional_info, "STATUS = 'CANCELLED'");
        assert!(rules.rules[1].is_no_op());
        assert!(
            rules.rules[1]
                .dependants()
                .contains(&field("ORDER", "CUSTOMER_ID"))
        );
    }
}
