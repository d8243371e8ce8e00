//! Decision-table documents.
//!
//! A document holds one or more decision tables. Each table declares its
//! input and output columns and a list of rows; every row becomes one rule
//! whose antecedent is a conjunction of equality conditions over the non-empty
//! input cells. Cells are JSON literals stored as strings, so `"1"` is the
//! number one and `"\"gold\""` is the string `gold`.
//!
//! ```json
//! {
//!   "tables": [{
//!     "id": "beverage",
//!     "hit_policy": "UNIQUE",
//!     "inputs": ["dish"],
//!     "outputs": ["beverage"],
//!     "rules": [{"id": "r1", "inputs": ["\"steak\""], "outputs": ["\"red wine\""]}]
//!   }]
//! }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::hit_policy::{HitPolicy, OutputPriorities};
use crate::core::rule::{Assignments, Condition, Expression, Rule};
use crate::error::{ChainError, Result};

/// A collection of decision tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDocument {
    /// Optional document name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// When the document was last written by an update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Tables in document order.
    #[serde(default)]
    pub tables: Vec<DecisionTable>,
}

impl TableDocument {
    /// Parse a document from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the document as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The table assigning `output`, if any.
    pub fn table_for_output(&self, output: &str) -> Option<&DecisionTable> {
        self.tables
            .iter()
            .find(|table| table.outputs.iter().any(|o| o == output))
    }

    /// Total number of rows across all tables.
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|table| table.rules.len()).sum()
    }
}

/// One decision table: columns, hit policy and rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionTable {
    /// Stable table identifier.
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Declared hit policy; the engine default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_policy: Option<HitPolicy>,

    /// Input column names, in cell order.
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Output column names, in cell order.
    pub outputs: Vec<String>,

    /// Allowed values per output as JSON literals, highest priority first.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub output_values: BTreeMap<String, Vec<String>>,

    /// Rows in priority order.
    #[serde(default)]
    pub rules: Vec<TableRow>,
}

/// A table row.
///
/// Fields this crate does not know about are kept and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    /// Stable row identifier.
    pub id: String,

    /// Input cells; `null`, `""` and `"-"` match any value.
    #[serde(default)]
    pub inputs: Vec<Option<String>>,

    /// Output cells.
    pub outputs: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parse a JSON literal cell.
pub fn parse_literal(text: &str) -> serde_json::Result<Value> {
    serde_json::from_str(text.trim())
}

/// Format a value as a JSON literal cell.
pub fn format_literal(value: &Value) -> String {
    value.to_string()
}

/// Check if an input cell matches any value.
pub fn is_wildcard(cell: Option<&str>) -> bool {
    match cell {
        None => true,
        Some(text) => matches!(text.trim(), "" | "-"),
    }
}

impl DecisionTable {
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Convert a row into a rule.
    pub fn row_to_rule(&self, row: &TableRow) -> Result<Rule> {
        if row.inputs.len() != self.inputs.len() {
            return Err(ChainError::table(format!(
                "table '{}' row '{}' has {} input cells, expected {}",
                self.label(),
                row.id,
                row.inputs.len(),
                self.inputs.len()
            )));
        }
        if row.outputs.len() != self.outputs.len() {
            return Err(ChainError::table(format!(
                "table '{}' row '{}' has {} output cells, expected {}",
                self.label(),
                row.id,
                row.outputs.len(),
                self.outputs.len()
            )));
        }

        let mut conditions = Vec::new();
        for (name, cell) in self.inputs.iter().zip(&row.inputs) {
            let Some(text) = cell.as_deref().filter(|t| !is_wildcard(Some(*t))) else {
                continue;
            };
            let value = parse_literal(text).map_err(|e| self.cell_error(row, name, text, e))?;
            conditions.push(Condition::equals(name.as_str(), value));
        }

        let mut consequent = Assignments::new();
        for (name, text) in self.outputs.iter().zip(&row.outputs) {
            let value = parse_literal(text).map_err(|e| self.cell_error(row, name, text, e))?;
            consequent.insert(name.clone(), value);
        }

        Ok(Rule::new(Expression::and(conditions), consequent))
    }

    fn cell_error(
        &self,
        row: &TableRow,
        column: &str,
        text: &str,
        err: serde_json::Error,
    ) -> ChainError {
        ChainError::table(format!(
            "table '{}' row '{}' column '{}': invalid literal '{}': {}",
            self.label(),
            row.id,
            column,
            text,
            err
        ))
    }

    /// Convert a rule into a new row with the given id.
    ///
    /// Fails if the rule reads a variable that is not an input column, has
    /// conflicting conditions on one column, or does not assign exactly this
    /// table's outputs.
    pub fn rule_to_row(&self, rule: &Rule, id: impl Into<String>) -> Result<TableRow> {
        if !self.assigns_group(rule) {
            return Err(ChainError::table(format!(
                "table '{}' cannot hold rule '{}': outputs differ",
                self.label(),
                rule
            )));
        }

        let conditions = rule.antecedent.conditions();
        if let Some(stray) = conditions
            .iter()
            .find(|c| !self.inputs.iter().any(|name| name == c.name()))
        {
            return Err(ChainError::table(format!(
                "table '{}' has no input column '{}'",
                self.label(),
                stray.name()
            )));
        }

        let mut inputs = Vec::with_capacity(self.inputs.len());
        for name in &self.inputs {
            let mut cell: Option<&Value> = None;
            for condition in conditions.iter().filter(|c| c.name() == name) {
                let Condition::Equals { value, .. } = condition;
                match cell {
                    Some(existing) if existing != value => {
                        return Err(ChainError::table(format!(
                            "rule '{}' has conflicting conditions on '{}'",
                            rule, name
                        )))
                    }
                    _ => cell = Some(value),
                }
            }
            inputs.push(cell.map(format_literal));
        }

        let outputs = self
            .outputs
            .iter()
            .map(|name| {
                rule.consequent.get(name).map(format_literal).ok_or_else(|| {
                    ChainError::table(format!("rule '{}' does not assign '{}'", rule, name))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TableRow {
            id: id.into(),
            inputs,
            outputs,
            description: None,
            extra: Map::new(),
        })
    }

    /// Check if a rule assigns exactly this table's outputs.
    pub fn assigns_group(&self, rule: &Rule) -> bool {
        rule.consequent.len() == self.outputs.len()
            && self.outputs.iter().all(|name| rule.assigns(name))
    }

    /// Parsed output priorities for this table's outputs.
    pub fn output_priorities(&self) -> Result<OutputPriorities> {
        let mut priorities = OutputPriorities::new();
        for (output, literals) in &self.output_values {
            let values = literals
                .iter()
                .map(|text| {
                    parse_literal(text).map_err(|e| {
                        ChainError::table(format!(
                            "table '{}' output value '{}' for '{}': {}",
                            self.label(),
                            text,
                            output,
                            e
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            priorities.insert(output.clone(), values);
        }
        Ok(priorities)
    }
}
