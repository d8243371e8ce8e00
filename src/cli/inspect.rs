//! Inspect command for backchain.
//!
//! Shows what a table document declares: the variables a caller can supply,
//! the derived variables, and each table's hit policy and rules.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::Config;
use crate::core::decision::{Engine, ModelHandler};
use crate::error::Result;
use crate::storage::FileTableStore;
use crate::table::TableHandler;

/// Options for the inspect command.
#[derive(Debug, Clone, Default)]
pub struct InspectOptions {
    /// Table document to inspect.
    pub table: PathBuf,
    /// Output as JSON.
    pub json: bool,
}

/// One decision table.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Declared hit policy, or the configured default.
    pub hit_policy: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    /// `row id: rule` per row, in row order.
    pub rules: Vec<String>,
}

/// Output format for the inspect command.
#[derive(Debug, Clone, Serialize)]
pub struct InspectOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Variables a caller may supply.
    pub inputs: Vec<String>,
    /// Variables some rule assigns.
    pub derived: Vec<String>,
    pub tables: Vec<TableSummary>,
}

/// The inspect command implementation.
pub struct InspectCommand {
    config: Config,
}

impl InspectCommand {
    /// Create a new inspect command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the inspect command.
    pub fn run(&self, options: &InspectOptions) -> Result<InspectOutput> {
        let store = FileTableStore::new(&options.table)
            .with_max_bytes(self.config.table.max_document_bytes);
        let handler = TableHandler::load(&store)?;

        let mut tables = Vec::new();
        for table in &handler.document().tables {
            let mut rules = Vec::with_capacity(table.rules.len());
            for row in &table.rules {
                rules.push(format!("{}: {}", row.id, table.row_to_rule(row)?));
            }
            let policy = table
                .hit_policy
                .unwrap_or(self.config.engine.default_hit_policy);
            tables.push(TableSummary {
                id: table.id.clone(),
                name: table.name.clone(),
                hit_policy: policy.to_string(),
                inputs: table.inputs.clone(),
                outputs: table.outputs.clone(),
                rules,
            });
        }

        let name = handler.document().name.clone();
        let mut derived: Vec<String> = handler.dependencies().keys().cloned().collect();
        let engine = Engine::new(handler);
        derived.extend(engine.knowledge_base().derived_variables().iter().cloned());
        derived.sort();
        derived.dedup();

        Ok(InspectOutput {
            name,
            inputs: engine.inputs().into_iter().collect(),
            derived,
            tables,
        })
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &InspectOutput, options: &InspectOptions) -> String {
        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    /// Format output as human-readable text.
    fn format_human_readable(&self, output: &InspectOutput) -> String {
        let mut text = String::new();
        if let Some(name) = &output.name {
            text.push_str(&format!("Document: {}\n", name));
        }
        text.push_str(&format!("Inputs:  {}\n", output.inputs.join(", ")));
        text.push_str(&format!("Derived: {}\n", output.derived.join(", ")));

        for table in &output.tables {
            text.push_str(&format!(
                "\n[{}] {} -> {} ({})\n",
                table.id,
                table.inputs.join(", "),
                table.outputs.join(", "),
                table.hit_policy
            ));
            if table.rules.is_empty() {
                text.push_str("  (no rules)\n");
            }
            for rule in &table.rules {
                text.push_str(&format!("  {}\n", rule));
            }
        }
        text
    }
}
