//! Decide command for backchain.
//!
//! Loads a table document and decides one goal from `NAME=JSON` inputs.
//! Learned rules are written only to an explicit output path; the source
//! document is never modified.

use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::core::decision::{Engine, EngineOptions, RuleFactoryProvider};
use crate::core::state::Inputs;
use crate::error::{ChainError, Result};
use crate::storage::FileTableStore;
use crate::table::{InsertedRow, TableHandler};

/// Options for the decide command.
#[derive(Debug, Clone, Default)]
pub struct DecideOptions {
    /// Table document to decide against.
    pub table: PathBuf,
    /// Variable to decide.
    pub goal: String,
    /// Raw `NAME=JSON` input pairs.
    pub inputs: Vec<String>,
    /// Where to write the document if rules are learned.
    pub output: Option<PathBuf>,
    /// Ask for new rules when nothing decides an output.
    pub learn: bool,
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the decide command.
#[derive(Debug, Clone, Serialize)]
pub struct DecideOutput {
    /// The decided variable.
    pub goal: String,
    /// Its value.
    pub value: Value,
    /// Rules learned while deciding, in learning order.
    pub learned: Vec<String>,
    /// Number of times resolution restarted.
    pub restarts: usize,
    /// Rows added to the document.
    pub inserted: Vec<InsertedRow>,
    /// Document the learned rows were written to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub written_to: Option<PathBuf>,
}

/// Parse `NAME=JSON` pairs into inputs.
///
/// The value must be a JSON literal, so strings need quotes:
/// `season="winter"`, `guests=8`, `vegetarian=true`.
pub fn parse_inputs(pairs: &[String]) -> Result<Inputs> {
    let mut inputs = Inputs::new();
    for pair in pairs {
        let (name, text) = pair.split_once('=').ok_or_else(|| {
            ChainError::invalid_input(format!("'{}' is not of the form NAME=JSON", pair))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ChainError::invalid_input(format!(
                "'{}' has an empty variable name",
                pair
            )));
        }
        let value: Value = serde_json::from_str(text).map_err(|e| {
            ChainError::invalid_input(format!(
                "value of '{}' is not JSON ({}); quote strings, e.g. {}=\"{}\"",
                name, e, name, text
            ))
        })?;
        if inputs.insert(name.to_string(), value).is_some() {
            return Err(ChainError::invalid_input(format!(
                "'{}' is given more than once",
                name
            )));
        }
    }
    Ok(inputs)
}

/// The decide command implementation.
pub struct DecideCommand {
    config: Config,
}

impl DecideCommand {
    /// Create a new decide command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the command, asking `provider` for a rule factory.
    pub fn run<P: RuleFactoryProvider>(
        &self,
        options: &DecideOptions,
        provider: &P,
    ) -> Result<DecideOutput> {
        let inputs = parse_inputs(&options.inputs)?;

        let source = FileTableStore::new(&options.table)
            .with_max_bytes(self.config.table.max_document_bytes);
        let mut handler = TableHandler::load(&source)?
            .with_row_id_prefix(self.config.table.row_id_prefix.clone());
        if let Some(destination) = &options.output {
            handler = handler.with_destination(FileTableStore::new(destination));
        }

        let mut engine_options = EngineOptions::from(&self.config);
        engine_options.learning_enabled &= options.learn;
        let mut engine = Engine::with_options(handler, engine_options);

        let report = engine.decide_with_report(provider, &inputs, &options.goal)?;
        let inserted = engine.handler().last_sync().inserted.clone();
        let written_to = options
            .output
            .clone()
            .filter(|_| !report.learned.is_empty());

        Ok(DecideOutput {
            goal: report.goal,
            value: report.value,
            learned: report.learned.iter().map(ToString::to_string).collect(),
            restarts: report.restarts,
            inserted,
            written_to,
        })
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &DecideOutput, options: &DecideOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    /// Format output as human-readable text.
    fn format_human_readable(&self, output: &DecideOutput) -> String {
        let mut text = format!("{} = {}\n", output.goal, output.value);
        if !output.learned.is_empty() {
            text.push_str(&format!("\nLearned {} rule(s):\n", output.learned.len()));
            for rule in &output.learned {
                text.push_str(&format!("  {}\n", rule));
            }
        }
        match &output.written_to {
            Some(path) => text.push_str(&format!("Written to {}\n", path.display())),
            None if !output.learned.is_empty() => {
                text.push_str("Not saved; pass --output to keep learned rules.\n")
            }
            None => {}
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decision::{no_learning, ModelHandler, RuleFactory};
    use crate::core::rule::{Condition, Expression, Rule};
    use crate::core::state::State;
    use crate::table::TableDocument;
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const DISH: &str = r#"{
        "tables": [
            {
                "id": "dish",
                "inputs": ["season"],
                "outputs": ["dish"],
                "rules": [
                    {"id": "d1", "inputs": ["\"winter\""], "outputs": ["\"roastbeef\""]}
                ]
            }
        ]
    }"#;

    fn write_table(dir: &Path) -> PathBuf {
        let path = dir.join("dish.json");
        fs::write(&path, DISH).unwrap();
        path
    }

    fn options(table: PathBuf, inputs: &[&str]) -> DecideOptions {
        DecideOptions {
            table,
            goal: "dish".to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            ..DecideOptions::default()
        }
    }

    struct Salad;

    impl RuleFactory for Salad {
        fn create_rule(&mut self, state: &State, fired: &[&Rule], _: &str) -> Result<Option<Rule>> {
            if !fired.is_empty() {
                return Ok(None);
            }
            let season = state.get("season").cloned().unwrap_or_default();
            Ok(Some(Rule::assigning(
                Expression::and([Condition::equals("season", season)]),
                "dish",
                "salad",
            )))
        }
    }

    #[test]
    fn test_parse_inputs() {
        let pairs = vec![
            "season=\"winter\"".to_string(),
            "guests=8".to_string(),
            "note=null".to_string(),
            "tags=[\"a\",\"b\"]".to_string(),
        ];
        let inputs = parse_inputs(&pairs).unwrap();
        assert_eq!(inputs["season"], json!("winter"));
        assert_eq!(inputs["guests"], json!(8));
        assert_eq!(inputs["note"], Value::Null);
        assert_eq!(inputs["tags"], json!(["a", "b"]));
    }

    #[test]
    fn test_parse_inputs_value_may_contain_equals() {
        let inputs = parse_inputs(&["formula=\"a=b\"".to_string()]).unwrap();
        assert_eq!(inputs["formula"], json!("a=b"));
    }

    #[test]
    fn test_parse_inputs_rejects_malformed_pairs() {
        for bad in ["season", "=1", "season=winter"] {
            let err = parse_inputs(&[bad.to_string()]).unwrap_err();
            assert!(matches!(err, ChainError::InvalidInput { .. }), "{}", bad);
        }
        let twice = vec!["a=1".to_string(), "a=2".to_string()];
        assert!(parse_inputs(&twice).is_err());
    }

    #[test]
    fn test_decide_without_learning_leaves_document_alone() {
        let temp = TempDir::new().unwrap();
        let table = write_table(temp.path());
        let cmd = DecideCommand::new(Config::default());

        let output = cmd
            .run(&options(table.clone(), &["season=\"winter\""]), &no_learning)
            .unwrap();
        assert_eq!(output.value, json!("roastbeef"));
        assert!(output.written_to.is_none());
        assert_eq!(fs::read_to_string(&table).unwrap(), DISH);
    }

    #[test]
    fn test_unresolved_goal_is_error() {
        let temp = TempDir::new().unwrap();
        let table = write_table(temp.path());
        let cmd = DecideCommand::new(Config::default());

        let err = cmd
            .run(&options(table, &["season=\"summer\""]), &no_learning)
            .unwrap_err();
        assert!(err.is_unresolved());
    }

    #[test]
    fn test_learn_flag_required_for_learning() {
        let temp = TempDir::new().unwrap();
        let table = write_table(temp.path());
        let cmd = DecideCommand::new(Config::default());

        let provider = |_: &dyn ModelHandler| Salad;
        let err = cmd
            .run(&options(table, &["season=\"summer\""]), &provider)
            .unwrap_err();
        assert!(err.is_unresolved());
    }

    #[test]
    fn test_learned_rule_written_to_output_path() {
        let temp = TempDir::new().unwrap();
        let table = write_table(temp.path());
        let out = temp.path().join("learned.json");
        let mut config = Config::default();
        config.table.row_id_prefix = "Learned_".to_string();
        let cmd = DecideCommand::new(config);

        let mut opts = options(table.clone(), &["season=\"summer\""]);
        opts.learn = true;
        opts.output = Some(out.clone());

        let provider = |_: &dyn ModelHandler| Salad;
        let output = cmd.run(&opts, &provider).unwrap();
        assert_eq!(output.value, json!("salad"));
        assert_eq!(output.learned.len(), 1);
        assert_eq!(output.restarts, 1);
        assert_eq!(output.written_to.as_deref(), Some(out.as_path()));

        let saved = TableDocument::from_json(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(saved.tables[0].rules.len(), 2);
        assert!(saved.tables[0].rules[1].id.starts_with("Learned_"));
        assert_eq!(fs::read_to_string(&table).unwrap(), DISH);

        let text = cmd.format_output(&output, &opts);
        assert!(text.starts_with("dish = \"salad\""));
        assert!(text.contains("Learned 1 rule(s)"));
    }

    #[test]
    fn test_learning_without_output_path_leaves_source_alone() {
        let temp = TempDir::new().unwrap();
        let table = write_table(temp.path());
        let cmd = DecideCommand::new(Config::default());

        let mut opts = options(table.clone(), &["season=\"summer\""]);
        opts.learn = true;

        let provider = |_: &dyn ModelHandler| Salad;
        let output = cmd.run(&opts, &provider).unwrap();
        assert_eq!(output.value, json!("salad"));
        assert_eq!(output.learned.len(), 1);
        assert!(output.written_to.is_none());
        assert_eq!(fs::read_to_string(&table).unwrap(), DISH);
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);

        let text = cmd.format_output(&output, &opts);
        assert!(!text.contains("Written to"));
        assert!(text.contains("Not saved"));
    }

    #[test]
    fn test_format_output_json_and_quiet() {
        let cmd = DecideCommand::new(Config::default());
        let output = DecideOutput {
            goal: "dish".to_string(),
            value: json!("roastbeef"),
            learned: Vec::new(),
            restarts: 0,
            inserted: Vec::new(),
            written_to: None,
        };

        let json_opts = DecideOptions {
            json: true,
            ..DecideOptions::default()
        };
        let parsed: Value = serde_json::from_str(&cmd.format_output(&output, &json_opts)).unwrap();
        assert_eq!(parsed["value"], json!("roastbeef"));
        assert!(parsed.get("written_to").is_none());

        let quiet = DecideOptions {
            quiet: true,
            ..DecideOptions::default()
        };
        assert!(cmd.format_output(&output, &quiet).is_empty());
    }
}
