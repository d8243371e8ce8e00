//! Knowledge base: an immutable, ordered rule set with variable classification.
//!
//! Every variable a rule mentions is either *derived* (some rule assigns it)
//! or an *input* (read by an antecedent, never assigned). The two sets are
//! recomputed from scratch whenever a knowledge base is built, so adding a
//! rule that assigns a former input reclassifies it as derived.

use std::collections::BTreeSet;

use crate::core::rule::Rule;

/// An immutable, ordered collection of rules.
///
/// Rule order is significant: it is the tie-break order for conflict
/// resolution and the insertion reference for learned rules. Changes are
/// made by building a new knowledge base.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeBase {
    rules: Vec<Rule>,
    input_variables: BTreeSet<String>,
    derived_variables: BTreeSet<String>,
}

impl KnowledgeBase {
    /// Build a knowledge base from an ordered rule list.
    pub fn build(rules: Vec<Rule>) -> Self {
        let derived_variables: BTreeSet<String> = rules
            .iter()
            .flat_map(|rule| rule.outputs().map(str::to_string))
            .collect();

        let input_variables: BTreeSet<String> = rules
            .iter()
            .flat_map(|rule| rule.depending_variables())
            .filter(|name| !derived_variables.contains(*name))
            .map(str::to_string)
            .collect();

        Self {
            rules,
            input_variables,
            derived_variables,
        }
    }

    /// The rules, in priority order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Variables read by some antecedent but never assigned.
    pub fn input_variables(&self) -> &BTreeSet<String> {
        &self.input_variables
    }

    /// Variables assigned by at least one rule.
    pub fn derived_variables(&self) -> &BTreeSet<String> {
        &self.derived_variables
    }

    /// All classified variables (inputs first, then derived).
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.input_variables
            .iter()
            .chain(self.derived_variables.iter())
            .map(String::as_str)
    }

    /// Check if a variable is an input variable.
    pub fn is_input(&self, name: &str) -> bool {
        self.input_variables.contains(name)
    }

    /// Check if a variable is a derived variable.
    pub fn is_derived(&self, name: &str) -> bool {
        self.derived_variables.contains(name)
    }

    /// Rules assigning `output`, in priority order.
    pub fn rules_for<'a>(&'a self, output: &'a str) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules.iter().filter(move |rule| rule.assigns(output))
    }

    /// Check if an equal rule is already present.
    pub fn contains(&self, rule: &Rule) -> bool {
        self.rules.contains(rule)
    }

    /// Index of the first rule equal to `rule`.
    pub fn position(&self, rule: &Rule) -> Option<usize> {
        self.rules.iter().position(|r| r == rule)
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Build a new knowledge base with `rule` inserted at `index`.
    ///
    /// An index past the end appends.
    pub fn with_rule_at(&self, index: usize, rule: Rule) -> Self {
        let mut rules = self.rules.clone();
        let index = index.min(rules.len());
        rules.insert(index, rule);
        Self::build(rules)
    }

    /// Consume the knowledge base, returning its rules.
    pub fn into_rules(self) -> Vec<Rule> {
        self.rules
    }
}
