//! Per-model character budgets.

use llmgate_config::ModelsConfig;
use std::collections::HashMap;

/// Lookup table from model identifier to character budget.
///
/// Unknown models fall back to the configured default.
#[derive(Debug, Clone)]
pub struct CharacterBudgets {
    by_model: HashMap<String, usize>,
    default_budget: usize,
}

impl CharacterBudgets {
    pub fn new(default_budget: usize) -> Self {
        Self {
            by_model: HashMap::new(),
            default_budget,
        }
    }

    pub fn from_config(models: &ModelsConfig) -> Self {
        let mut budgets = Self::new(models.default_char_budget);
        for entry in &models.table {
            budgets.insert(&entry.id, entry.estimated_chars());
        }
        budgets
    }

    pub fn insert(&mut self, model: &str, chars: usize) {
        self.by_model.insert(model.to_string(), chars);
    }

    pub fn for_model(&self, model: &str) -> usize {
        self.by_model
            .get(model)
            .copied()
            .unwrap_or(self.default_budget)
    }
}

impl Default for CharacterBudgets {
    fn default() -> Self {
        Self::from_config(&ModelsConfig::default())
    }
}
