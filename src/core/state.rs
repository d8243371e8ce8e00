//! Evaluation state for a single resolution.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::core::knowledge_base::KnowledgeBase;
use crate::core::rule::Assignments;

/// Caller-supplied variable values, keyed by name.
pub type Inputs = BTreeMap<String, Value>;

/// Values of every classified variable during a resolution.
///
/// Each tracked variable is either set to a [`Value`] or unset. JSON `null`
/// is a value like any other; "unset" means no value has been supplied or
/// derived yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct State {
    values: BTreeMap<String, Option<Value>>,
}

impl State {
    /// Create a state tracking `variables`, all unset.
    pub fn new<'a>(variables: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            values: variables
                .into_iter()
                .map(|name| (name.to_string(), None))
                .collect(),
        }
    }

    /// Create a state over a knowledge base's variables, seeded from `inputs`.
    ///
    /// Inputs naming variables the knowledge base never mentions are ignored.
    pub fn seeded(knowledge_base: &KnowledgeBase, inputs: &Inputs) -> Self {
        let mut state = Self::new(knowledge_base.variables());
        for (name, slot) in state.values.iter_mut() {
            *slot = inputs.get(name).cloned();
        }
        state
    }

    /// Value of a variable, if set.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).and_then(Option::as_ref)
    }

    /// Check if a variable has a value.
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Check if a variable is tracked by this state.
    pub fn tracks(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Set a variable's value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), Some(value));
    }

    /// Apply a rule's assignments.
    pub fn assign(&mut self, assignments: &Assignments) {
        for (name, value) in assignments {
            self.set(name.clone(), value.clone());
        }
    }

    /// Names of all tracked variables.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Iterate over tracked variables and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_ref()))
    }

    /// All variables that are set.
    pub fn known(&self) -> Inputs {
        self.values
            .iter()
            .filter_map(|(name, value)| value.clone().map(|v| (name.clone(), v)))
            .collect()
    }

    /// The set values among `names`, keyed by name.
    pub fn select<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Inputs {
        names
            .into_iter()
            .filter_map(|name| self.get(name).map(|v| (name.to_string(), v.clone())))
            .collect()
    }
}
