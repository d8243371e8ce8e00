//! Line-oriented rule factory.
//!
//! Asks a person whether a rule should be added when no rule decides an
//! output, then reads one JSON value per output the rule assigns.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};

use serde_json::Value;

use crate::core::decision::{is_fully_informed, Dependencies, ModelHandler, RuleFactory};
use crate::core::rule::{Assignments, Condition, Expression, Rule};
use crate::core::state::{Inputs, State};
use crate::error::{ChainError, Result};

/// Answer to the yes/no question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Yes,
    No,
    Closed,
}

/// Rule factory that prompts on `writer` and reads answers from `reader`.
pub struct PromptRuleFactory<R, W> {
    reader: R,
    writer: W,
    dependencies: Dependencies,
    groups: BTreeMap<String, Vec<String>>,
    rejections: Vec<(String, Inputs)>,
}

impl<R: BufRead, W: Write> PromptRuleFactory<R, W> {
    /// Create a factory for the outputs `handler` declares.
    pub fn new(handler: &dyn ModelHandler, reader: R, writer: W) -> Self {
        let dependencies = handler.dependencies().clone();
        let groups = dependencies
            .keys()
            .map(|output| (output.clone(), handler.output_group(output)))
            .collect();
        Self {
            reader,
            writer,
            dependencies,
            groups,
            rejections: Vec::new(),
        }
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).map_err(prompt_error)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn ask(&mut self, question: &str) -> Result<Answer> {
        loop {
            write!(self.writer, "{} [Y/n] ", question).map_err(prompt_error)?;
            self.writer.flush().map_err(prompt_error)?;
            let Some(answer) = self.read_line()? else {
                return Ok(Answer::Closed);
            };
            match answer.to_ascii_lowercase().as_str() {
                "" | "y" | "yes" => return Ok(Answer::Yes),
                "n" | "no" => return Ok(Answer::No),
                _ => writeln!(self.writer, "Please answer y or n.").map_err(prompt_error)?,
            }
        }
    }

    fn read_value(&mut self, output: &str) -> Result<Option<Value>> {
        loop {
            write!(self.writer, "Value for '{}' (JSON): ", output).map_err(prompt_error)?;
            self.writer.flush().map_err(prompt_error)?;
            let Some(text) = self.read_line()? else {
                return Ok(None);
            };
            match serde_json::from_str(&text) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => writeln!(self.writer, "Invalid JSON: {}", e).map_err(prompt_error)?,
            }
        }
    }
}

impl<R: BufRead, W: Write> RuleFactory for PromptRuleFactory<R, W> {
    fn create_rule(&mut self, state: &State, fired: &[&Rule], output: &str) -> Result<Option<Rule>> {
        let input_names = self.dependencies.get(output).cloned().unwrap_or_default();
        if is_fully_informed(fired, state, &input_names) {
            return Ok(None);
        }

        let known = state.select(input_names.iter().map(String::as_str));
        let key = (output.to_string(), known.clone());
        if self.rejections.contains(&key) {
            return Ok(None);
        }

        let situation = if known.is_empty() {
            "no inputs".to_string()
        } else {
            input_names
                .iter()
                .filter_map(|name| known.get(name).map(|value| format!("{} = {}", name, value)))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let question = if fired.is_empty() {
            format!("No rule decides '{}' for {}. Add one?", output, situation)
        } else {
            format!(
                "{} rule(s) decide '{}' for {} without using all of it. Add a more specific one?",
                fired.len(),
                output,
                situation
            )
        };

        match self.ask(&question)? {
            Answer::Yes => {}
            Answer::No => {
                tracing::debug!(output, "rule declined");
                self.rejections.push(key);
                return Ok(None);
            }
            Answer::Closed => return Ok(None),
        }

        let group = self
            .groups
            .get(output)
            .cloned()
            .unwrap_or_else(|| vec![output.to_string()]);
        let mut consequent = Assignments::new();
        for name in group {
            let Some(value) = self.read_value(&name)? else {
                return Ok(None);
            };
            consequent.insert(name, value);
        }

        let antecedent = Expression::and(input_names.iter().filter_map(|name| {
            known
                .get(name)
                .map(|value| Condition::equals(name.clone(), value.clone()))
        }));
        Ok(Some(Rule::new(antecedent, consequent)))
    }
}

fn prompt_error(err: io::Error) -> ChainError {
    ChainError::factory(format!("prompt failed: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decision::Engine;
    use crate::core::rule::Antecedent;
    use crate::table::{TableDocument, TableHandler};
    use serde_json::json;
    use std::io::Cursor;

    const MENU: &str = r#"{
        "tables": [
            {
                "id": "drink",
                "hit_policy": "UNIQUE",
                "inputs": ["season", "guests"],
                "outputs": ["drink", "glass"],
                "rules": [
                    {"id": "r1", "inputs": ["\"winter\"", null], "outputs": ["\"tea\"", "\"mug\""]}
                ]
            }
        ]
    }"#;

    fn handler() -> TableHandler {
        TableHandler::from_document(TableDocument::from_json(MENU).unwrap()).unwrap()
    }

    fn factory(answers: &str) -> PromptRuleFactory<Cursor<Vec<u8>>, Vec<u8>> {
        PromptRuleFactory::new(&handler(), Cursor::new(answers.as_bytes().to_vec()), Vec::new())
    }

    fn state(pairs: &[(&str, Value)]) -> State {
        let mut state = State::new(["season", "guests", "drink", "glass"]);
        for (name, value) in pairs {
            state.set(*name, value.clone());
        }
        state
    }

    fn transcript(factory: &PromptRuleFactory<Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8(factory.writer.clone()).unwrap()
    }

    #[test]
    fn test_yes_builds_rule_for_whole_group() {
        let mut factory = factory("\n\"lemonade\"\n\"glass\"\n");
        let state = state(&[("season", json!("summer"))]);

        let rule = factory.create_rule(&state, &[], "drink").unwrap().unwrap();

        let mut consequent = Assignments::new();
        consequent.insert("drink".to_string(), json!("lemonade"));
        consequent.insert("glass".to_string(), json!("glass"));
        let expected = Rule::new(
            Expression::and([Condition::equals("season", "summer")]),
            consequent,
        );
        assert_eq!(rule, expected);
        assert!(transcript(&factory).contains("No rule decides 'drink'"));
    }

    #[test]
    fn test_conditions_follow_input_column_order() {
        let mut factory = factory("y\n\"punch\"\n\"bowl\"\n");
        let state = state(&[("season", json!("summer")), ("guests", json!(12))]);

        let rule = factory.create_rule(&state, &[], "drink").unwrap().unwrap();
        assert_eq!(
            rule.antecedent,
            Antecedent::from(Expression::and([
                Condition::equals("season", "summer"),
                Condition::equals("guests", 12),
            ]))
        );
        assert!(transcript(&factory).contains("season = \"summer\", guests = 12"));
    }

    #[test]
    fn test_no_is_remembered() {
        let mut factory = factory("n\n");
        let state = state(&[("season", json!("summer"))]);

        assert!(factory.create_rule(&state, &[], "drink").unwrap().is_none());
        // Input is exhausted, so a second question would read EOF; the
        // rejection short-circuits before asking.
        let before = transcript(&factory);
        assert!(factory.create_rule(&state, &[], "drink").unwrap().is_none());
        assert_eq!(transcript(&factory), before);
    }

    #[test]
    fn test_invalid_json_is_asked_again() {
        let mut factory = factory("yes\nlemonade\n\"lemonade\"\nnull\n");
        let state = state(&[("season", json!("summer"))]);

        let rule = factory.create_rule(&state, &[], "drink").unwrap().unwrap();
        assert_eq!(rule.consequent["glass"], Value::Null);
        assert!(transcript(&factory).contains("Invalid JSON"));
    }

    #[test]
    fn test_end_of_input_declines() {
        let mut factory = factory("");
        let state = state(&[]);
        assert!(factory.create_rule(&state, &[], "drink").unwrap().is_none());

        let mut factory = self::factory("y\n\"lemonade\"\n");
        let state = self::state(&[]);
        assert!(factory.create_rule(&state, &[], "drink").unwrap().is_none());
    }

    #[test]
    fn test_unrecognised_answer_is_asked_again() {
        let mut factory = factory("maybe\nno\n");
        let state = state(&[]);
        assert!(factory.create_rule(&state, &[], "drink").unwrap().is_none());
        assert!(transcript(&factory).contains("Please answer y or n."));
    }

    #[test]
    fn test_fully_informed_rule_skips_question() {
        let handler = handler();
        let fired = handler.rules()[0].clone();
        let mut factory = factory("");
        let state = state(&[("season", json!("winter"))]);

        assert!(factory.create_rule(&state, &[&fired], "drink").unwrap().is_none());
        assert!(transcript(&factory).is_empty());
    }

    #[test]
    fn test_learns_through_engine() {
        let mut engine = Engine::new(handler());
        let provider = |handler: &dyn ModelHandler| {
            PromptRuleFactory::new(handler, Cursor::new(b"y\n\"water\"\n\"cup\"\n".to_vec()), io::sink())
        };
        let inputs: Inputs = [("season".to_string(), json!("summer"))].into_iter().collect();

        let report = engine.decide_with_report(&provider, &inputs, "glass").unwrap();
        assert_eq!(report.value, json!("cup"));
        assert_eq!(report.learned.len(), 1);
        assert_eq!(engine.handler().document().tables[0].rules.len(), 2);
    }
}
