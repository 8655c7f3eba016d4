use std::collections::BTreeMap;

use maskgraph_core::{NO_OP_STRATEGY, Rule};

use crate::delete_row::DeleteRowStrategy;
use crate::errors::StrategyError;
use crate::no_op::NoOperationStrategy;
use crate::strategy::{StrategyContext, TransformationStrategy};

/// Kind identifier of [`DeleteRowStrategy`].
pub const DELETE_ROW_KIND: &str = "delete_row";

/// Strategy instances keyed by the name rules refer to.
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Box<dyn TransformationStrategy>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyRegistry {
    /// Registry holding only the implicit no-op strategy.
    pub fn new() -> Self {
        let mut strategies: BTreeMap<String, Box<dyn TransformationStrategy>> = BTreeMap::new();
        strategies.insert(NO_OP_STRATEGY.to_string(), Box::new(NoOperationStrategy));
        Self { strategies }
    }

    /// Instantiate every `name -> kind` entry of a rule file's strategy table.
    pub fn from_mapping(
        mapping: &BTreeMap<String, String>,
        context: &StrategyContext,
    ) -> Result<Self, StrategyError> {
        let mut registry = Self::new();
        for (name, kind) in mapping {
            if name == NO_OP_STRATEGY && kind != NO_OP_STRATEGY {
                return Err(StrategyError::Load {
                    name: name.clone(),
                    message: format!("name {NO_OP_STRATEGY} is reserved for the no-op strategy"),
                });
            }
            let strategy = builtin(name, kind, context).ok_or_else(|| StrategyError::Load {
                name: name.clone(),
                message: format!("unknown strategy kind {kind}"),
            })?;
            tracing::debug!(event = "strategy_loaded", name = %name, kind = %kind);
            registry.register(name.clone(), strategy);
        }
        Ok(registry)
    }

    /// Add or replace a strategy under `name`.
    pub fn register(&mut self, name: impl Into<String>, strategy: Box<dyn TransformationStrategy>) {
        self.strategies.insert(name.into(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<&dyn TransformationStrategy> {
        self.strategies.get(name).map(|strategy| strategy.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn TransformationStrategy + 'static)> {
        self.strategies.get_mut(name).map(|strategy| strategy.as_mut())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Call `set_up_transformation` once per registered strategy with the
    /// rules naming it. Rules naming unknown strategies are ignored here.
    pub async fn set_up_all(&mut self, rules: &[Rule]) -> Result<(), StrategyError> {
        let mut by_strategy: BTreeMap<&str, Vec<Rule>> = BTreeMap::new();
        for rule in rules {
            by_strategy
                .entry(rule.strategy.as_str())
                .or_default()
                .push(rule.clone());
        }

        for (name, strategy) in self.strategies.iter_mut() {
            let assigned = by_strategy.remove(name.as_str()).unwrap_or_default();
            strategy.set_up_transformation(&assigned).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.strategies
                    .iter()
                    .map(|(name, strategy)| (name, strategy.kind())),
            )
            .finish()
    }
}

fn builtin(
    name: &str,
    kind: &str,
    context: &StrategyContext,
) -> Option<Box<dyn TransformationStrategy>> {
    match kind {
        NO_OP_STRATEGY => Some(Box::new(NoOperationStrategy)),
        DELETE_ROW_KIND => Some(Box::new(DeleteRowStrategy::new(
            name,
            context.catalog.clone(),
        ))),
        _ => None,
    }
}
