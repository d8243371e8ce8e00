//! Rule language types.
//!
//! A rule pairs an antecedent (a condition or a logical expression over
//! conditions) with a consequent that assigns one or more output variables.
//! The antecedent is a closed AST: adding a condition kind or an operator is
//! a new enum variant, and every `match` over it is checked by the compiler.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output assignments made by a rule, keyed by variable name.
pub type Assignments = BTreeMap<String, Value>;

/// A test against the value of a single variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// Holds when the variable's value equals `value`.
    Equals { name: String, value: Value },
}

impl Condition {
    /// Create an equality condition.
    pub fn equals(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Name of the variable this condition reads.
    pub fn name(&self) -> &str {
        match self {
            Self::Equals { name, .. } => name,
        }
    }

    /// Evaluate the condition against the variable's value.
    pub fn evaluate(&self, value: &Value) -> bool {
        match self {
            Self::Equals { value: expected, .. } => expected == value,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals { name, value } => write!(f, "{} = {}", name, value),
        }
    }
}

/// Logical operator applied to the children of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    /// All children must hold.
    #[default]
    And,
}

impl Operator {
    /// Keyword used when displaying expressions.
    pub fn keyword(&self) -> &'static str {
        match self {
            Operator::And => "AND",
        }
    }
}

/// A logical expression over conditions and nested expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expression {
    /// Operator joining the children.
    pub operator: Operator,
    /// Ordered children; evaluation visits them in this order.
    pub children: Vec<Antecedent>,
}

impl Expression {
    /// Create a conjunction of the given children.
    pub fn and<A: Into<Antecedent>>(children: impl IntoIterator<Item = A>) -> Self {
        Self {
            operator: Operator::And,
            children: children.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.children.is_empty() {
            return write!(f, "TRUE");
        }
        let separator = format!(" {} ", self.operator.keyword());
        for (i, child) in self.children.iter().enumerate() {
            if i > 0 {
                f.write_str(&separator)?;
            }
            match child {
                Antecedent::Expression(inner) if inner.children.len() > 1 => {
                    write!(f, "({})", inner)?
                }
                _ => write!(f, "{}", child)?,
            }
        }
        Ok(())
    }
}

/// The guard of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Antecedent {
    /// A single condition.
    Condition(Condition),
    /// A logical expression.
    Expression(Expression),
}

impl Antecedent {
    /// Names of the variables read by this antecedent.
    ///
    /// Ordered by first appearance, without duplicates.
    pub fn variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for condition in self.conditions() {
            if !names.contains(&condition.name()) {
                names.push(condition.name());
            }
        }
        names
    }

    /// All conditions in this antecedent, flattened in evaluation order.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        collect_conditions(self, &mut out);
        out
    }
}

fn collect_conditions<'a>(antecedent: &'a Antecedent, out: &mut Vec<&'a Condition>) {
    match antecedent {
        Antecedent::Condition(condition) => out.push(condition),
        Antecedent::Expression(expression) => {
            for child in &expression.children {
                collect_conditions(child, out);
            }
        }
    }
}

impl From<Condition> for Antecedent {
    fn from(condition: Condition) -> Self {
        Self::Condition(condition)
    }
}

impl From<Expression> for Antecedent {
    fn from(expression: Expression) -> Self {
        Self::Expression(expression)
    }
}

impl fmt::Display for Antecedent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Condition(condition) => write!(f, "{}", condition),
            Self::Expression(expression) => write!(f, "{}", expression),
        }
    }
}

/// An IF/THEN rule.
///
/// Rules compare structurally: two rules with the same antecedent and
/// consequent are the same rule, regardless of where they came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Guard that must hold for the rule to fire.
    pub antecedent: Antecedent,
    /// Outputs assigned when the rule fires.
    pub consequent: Assignments,
}

impl Rule {
    /// Create a rule from an antecedent and its assignments.
    pub fn new(antecedent: impl Into<Antecedent>, consequent: Assignments) -> Self {
        Self {
            antecedent: antecedent.into(),
            consequent,
        }
    }

    /// Create a rule assigning a single output.
    pub fn assigning(
        antecedent: impl Into<Antecedent>,
        output: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        let mut consequent = Assignments::new();
        consequent.insert(output.into(), value.into());
        Self::new(antecedent, consequent)
    }

    /// Check if this rule assigns the given variable.
    pub fn assigns(&self, name: &str) -> bool {
        self.consequent.contains_key(name)
    }

    /// Names of the outputs this rule assigns, in sorted order.
    pub fn outputs(&self) -> impl Iterator<Item = &str> {
        self.consequent.keys().map(String::as_str)
    }

    /// Names of the variables this rule's antecedent reads.
    pub fn depending_variables(&self) -> Vec<&str> {
        self.antecedent.variables()
    }

    /// Canonical text form of the rule, usable as a map key.
    ///
    /// Equal rules always produce equal fingerprints.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.to_string())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IF {} THEN ", self.antecedent)?;
        for (i, (name, value)) in self.consequent.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} = {}", name, value)?;
        }
        Ok(())
    }
}
