//! Mapping from rule categories to the ordered rules that apply to them.

use std::collections::HashMap;

/// Category -> ordered rule-id list.
///
/// Evaluation order is registration order within a category. A category with
/// no registered rules simply has nothing to evaluate.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    categories: HashMap<String, Vec<String>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule under a category, preserving order. Duplicate
    /// registrations are ignored.
    pub fn register(&mut self, category: impl Into<String>, rule_id: impl Into<String>) {
        let rules = self.categories.entry(category.into()).or_default();
        let rule_id = rule_id.into();
        if !rules.contains(&rule_id) {
            rules.push(rule_id);
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_rule(mut self, category: impl Into<String>, rule_id: impl Into<String>) -> Self {
        self.register(category, rule_id);
        self
    }

    /// The ordered rules for a category. Empty for unknown categories.
    pub fn rules_for(&self, category: &str) -> &[String] {
        self.categories
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All registered categories.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Total number of registered rules across all categories.
    pub fn rule_count(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }
}
