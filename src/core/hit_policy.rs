//! Hit policies: conflict resolution among rules firing for the same output.
//!
//! Resolution happens in two steps. [`resolve_conflicts`] selects the
//! surviving rules (or reports a violation), then [`merge`] turns the
//! survivors into the assignments written to the state. Single-hit policies
//! keep at most one rule and assign its consequent; multi-hit policies keep
//! every fired rule and assign a list or an aggregate.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::core::rule::{Assignments, Rule};
use crate::error::{ChainError, Result};

/// Hit policy per output variable.
pub type HitPolicies = BTreeMap<String, HitPolicy>;

/// Allowed values per output variable, highest priority first.
pub type OutputPriorities = BTreeMap<String, Vec<Value>>;

/// Declared conflict-resolution strategy for an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HitPolicy {
    /// At most one rule may fire.
    #[default]
    Unique,
    /// The first fired rule in rule order wins.
    First,
    /// The fired rule with the highest-priority output value wins.
    Priority,
    /// Any number may fire if they all assign the same values.
    Any,
    /// All fired rules, as a list.
    Collect,
    /// Sum of the fired rules' numeric outputs.
    CollectSum,
    /// Minimum of the fired rules' numeric outputs.
    CollectMin,
    /// Maximum of the fired rules' numeric outputs.
    CollectMax,
    /// Number of distinct output values among fired rules.
    CollectCount,
    /// All fired rules in rule order, as a list.
    RuleOrder,
    /// All fired rules sorted by output priority, as a list.
    OutputOrder,
}

impl HitPolicy {
    /// Get all hit policy variants.
    pub fn all() -> &'static [HitPolicy] {
        &[
            HitPolicy::Unique,
            HitPolicy::First,
            HitPolicy::Priority,
            HitPolicy::Any,
            HitPolicy::Collect,
            HitPolicy::CollectSum,
            HitPolicy::CollectMin,
            HitPolicy::CollectMax,
            HitPolicy::CollectCount,
            HitPolicy::RuleOrder,
            HitPolicy::OutputOrder,
        ]
    }

    /// Canonical upper-case name.
    pub fn name(&self) -> &'static str {
        match self {
            HitPolicy::Unique => "UNIQUE",
            HitPolicy::First => "FIRST",
            HitPolicy::Priority => "PRIORITY",
            HitPolicy::Any => "ANY",
            HitPolicy::Collect => "COLLECT",
            HitPolicy::CollectSum => "COLLECT_SUM",
            HitPolicy::CollectMin => "COLLECT_MIN",
            HitPolicy::CollectMax => "COLLECT_MAX",
            HitPolicy::CollectCount => "COLLECT_COUNT",
            HitPolicy::RuleOrder => "RULE_ORDER",
            HitPolicy::OutputOrder => "OUTPUT_ORDER",
        }
    }

    /// Check if this policy yields a single rule's consequent.
    pub fn is_single_hit(&self) -> bool {
        matches!(
            self,
            HitPolicy::Unique | HitPolicy::First | HitPolicy::Priority | HitPolicy::Any
        )
    }

    /// Check if this policy aggregates outputs into one number.
    pub fn is_aggregation(&self) -> bool {
        matches!(
            self,
            HitPolicy::CollectSum
                | HitPolicy::CollectMin
                | HitPolicy::CollectMax
                | HitPolicy::CollectCount
        )
    }
}

impl fmt::Display for HitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HitPolicy {
    type Err = ChainError;

    /// Parse a policy name.
    ///
    /// Accepts the canonical names in any case, with spaces, dashes or
    /// underscores as separators (`COLLECT SUM`, `rule-order`), and the DMN
    /// single-letter forms (`U`, `F`, `P`, `A`, `C`, `C+`, `C<`, `C>`, `C#`,
    /// `R`, `O`).
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();

        let policy = match normalized.as_str() {
            "UNIQUE" | "U" => HitPolicy::Unique,
            "FIRST" | "F" => HitPolicy::First,
            "PRIORITY" | "P" => HitPolicy::Priority,
            "ANY" | "A" => HitPolicy::Any,
            "COLLECT" | "C" => HitPolicy::Collect,
            "COLLECT_SUM" | "C+" => HitPolicy::CollectSum,
            "COLLECT_MIN" | "C<" => HitPolicy::CollectMin,
            "COLLECT_MAX" | "C>" => HitPolicy::CollectMax,
            "COLLECT_COUNT" | "C#" => HitPolicy::CollectCount,
            "RULE_ORDER" | "R" => HitPolicy::RuleOrder,
            "OUTPUT_ORDER" | "O" => HitPolicy::OutputOrder,
            _ => {
                return Err(ChainError::config(format!(
                    "unknown hit policy '{}'",
                    s.trim()
                )))
            }
        };
        Ok(policy)
    }
}

impl<'de> Deserialize<'de> for HitPolicy {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Select the rules that survive `policy` for `output`.
///
/// `fired` must be in rule order. `priorities` ranks the output's values
/// (highest first) for PRIORITY and OUTPUT_ORDER; values missing from the
/// list rank last and ties keep rule order.
pub fn resolve_conflicts<'r>(
    fired: &[&'r Rule],
    policy: HitPolicy,
    output: &str,
    priorities: Option<&[Value]>,
) -> Result<Vec<&'r Rule>> {
    match policy {
        HitPolicy::Unique => {
            if fired.len() > 1 {
                return Err(ChainError::hit_policy(
                    output,
                    policy.name(),
                    format!("{} rules fired, at most one allowed", fired.len()),
                ));
            }
            Ok(fired.to_vec())
        }
        HitPolicy::First => Ok(fired.first().copied().into_iter().collect()),
        HitPolicy::Any => {
            let Some(first) = fired.first() else {
                return Ok(Vec::new());
            };
            if let Some(divergent) = fired.iter().find(|r| r.consequent != first.consequent) {
                return Err(ChainError::hit_policy(
                    output,
                    policy.name(),
                    format!(
                        "fired rules assign different values ({} vs {})",
                        first, divergent
                    ),
                ));
            }
            Ok(vec![*first])
        }
        HitPolicy::Priority => {
            let best = fired
                .iter()
                .enumerate()
                .min_by_key(|(index, rule)| (priority_rank(rule, output, priorities), *index))
                .map(|(_, rule)| *rule);
            Ok(best.into_iter().collect())
        }
        HitPolicy::OutputOrder => {
            let mut sorted = fired.to_vec();
            // stable: equal ranks keep rule order
            sorted.sort_by_key(|rule| priority_rank(rule, output, priorities));
            Ok(sorted)
        }
        HitPolicy::Collect
        | HitPolicy::CollectSum
        | HitPolicy::CollectMin
        | HitPolicy::CollectMax
        | HitPolicy::CollectCount
        | HitPolicy::RuleOrder => Ok(fired.to_vec()),
    }
}

fn priority_rank(rule: &Rule, output: &str, priorities: Option<&[Value]>) -> usize {
    let Some(priorities) = priorities else {
        return 0;
    };
    rule.consequent
        .get(output)
        .and_then(|value| priorities.iter().position(|p| p == value))
        .unwrap_or(usize::MAX)
}

/// Turn surviving rules into the assignments written to the state.
///
/// Returns `None` when nothing survived. Single-hit policies assign the
/// survivor's whole consequent. List policies assign, per output, the array
/// of survivor values; aggregations assign one number per output.
pub fn merge(survivors: &[&Rule], policy: HitPolicy, output: &str) -> Result<Option<Assignments>> {
    let Some(first) = survivors.first() else {
        return Ok(None);
    };

    if policy.is_single_hit() {
        return Ok(Some(first.consequent.clone()));
    }

    let mut assignments = Assignments::new();
    for name in first.consequent.keys() {
        let values: Vec<&Value> = survivors
            .iter()
            .filter_map(|rule| rule.consequent.get(name))
            .collect();
        let merged = match policy {
            HitPolicy::CollectSum => sum(&values, name, policy)?,
            HitPolicy::CollectMin => extreme(&values, name, policy, |a, b| a < b)?,
            HitPolicy::CollectMax => extreme(&values, name, policy, |a, b| a > b)?,
            HitPolicy::CollectCount => Value::from(distinct_count(&values)),
            _ => Value::Array(values.into_iter().cloned().collect()),
        };
        assignments.insert(name.clone(), merged);
    }

    tracing::trace!(
        output,
        policy = policy.name(),
        survivors = survivors.len(),
        "merged multi-hit outputs"
    );
    Ok(Some(assignments))
}

fn numeric(value: &Value, name: &str, policy: HitPolicy) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        ChainError::hit_policy(
            name,
            policy.name(),
            format!("cannot aggregate non-numeric value {}", value),
        )
    })
}

fn sum(values: &[&Value], name: &str, policy: HitPolicy) -> Result<Value> {
    if values.iter().all(|v| v.is_i64()) {
        let total = values
            .iter()
            .filter_map(|v| v.as_i64())
            .try_fold(0i64, |acc, v| acc.checked_add(v));
        if let Some(total) = total {
            return Ok(Value::from(total));
        }
    }

    let mut total = 0.0;
    for value in values {
        total += numeric(value, name, policy)?;
    }
    Number::from_f64(total).map(Value::Number).ok_or_else(|| {
        ChainError::hit_policy(name, policy.name(), "sum is not a finite number")
    })
}

fn extreme(
    values: &[&Value],
    name: &str,
    policy: HitPolicy,
    better: impl Fn(f64, f64) -> bool,
) -> Result<Value> {
    let mut best: Option<(f64, &Value)> = None;
    for &value in values {
        let n = numeric(value, name, policy)?;
        match best {
            Some((current, _)) if !better(n, current) => {}
            _ => best = Some((n, value)),
        }
    }
    Ok(best.map(|(_, v)| v.clone()).unwrap_or(Value::Null))
}

fn distinct_count(values: &[&Value]) -> usize {
    let mut seen: Vec<&Value> = Vec::with_capacity(values.len());
    for &value in values {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen.len()
}

/// Applies each output's declared hit policy.
#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver<'a> {
    policies: &'a HitPolicies,
    priorities: &'a OutputPriorities,
    default_policy: HitPolicy,
}

impl<'a> ConflictResolver<'a> {
    /// Create a resolver over declared policies and priorities.
    ///
    /// Outputs without a declared policy use `default_policy`.
    pub fn new(
        policies: &'a HitPolicies,
        priorities: &'a OutputPriorities,
        default_policy: HitPolicy,
    ) -> Self {
        Self {
            policies,
            priorities,
            default_policy,
        }
    }

    /// Policy applying to `output`.
    pub fn policy_for(&self, output: &str) -> HitPolicy {
        self.policies
            .get(output)
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Resolve the rules fired for `output` into assignments.
    pub fn decide(&self, output: &str, fired: &[&Rule]) -> Result<Option<Assignments>> {
        let policy = self.policy_for(output);
        let priorities = self.priorities.get(output).map(Vec::as_slice);
        let survivors = resolve_conflicts(fired, policy, output, priorities)?;
        merge(&survivors, policy, output)
    }
}
