//! Model handler backed by a decision-table document.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;

use crate::core::decision::{Dependencies, ModelHandler};
use crate::core::hit_policy::{HitPolicies, OutputPriorities};
use crate::core::knowledge_base::KnowledgeBase;
use crate::core::rule::Rule;
use crate::error::{ChainError, Result};
use crate::storage::TableStore;
use crate::table::document::TableDocument;
use crate::table::sync::{new_row_id, synchronize, RowIds, SyncReport};

/// Prefix for generated row identifiers.
pub const DEFAULT_ROW_ID_PREFIX: &str = "DecisionRule_";

/// Serves rules, dependencies and hit policies from a [`TableDocument`] and
/// writes learned rules back into it.
pub struct TableHandler {
    document: TableDocument,
    rules: Vec<Rule>,
    row_ids: RowIds,
    dependencies: Dependencies,
    hit_policies: HitPolicies,
    output_priorities: OutputPriorities,
    groups: BTreeMap<String, Vec<String>>,
    destination: Option<Box<dyn TableStore>>,
    row_id_prefix: String,
    last_sync: SyncReport,
}

impl fmt::Debug for TableHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandler")
            .field("tables", &self.document.tables.len())
            .field("rules", &self.rules.len())
            .field(
                "destination",
                &self.destination.as_ref().map(|store| store.describe()),
            )
            .finish_non_exhaustive()
    }
}

impl TableHandler {
    /// Build a handler from a document.
    ///
    /// Rows that parse to the same rule collapse into one; the first row
    /// keeps backing it.
    pub fn from_document(document: TableDocument) -> Result<Self> {
        let mut rules = Vec::new();
        let mut row_ids = RowIds::new();
        let mut dependencies = Dependencies::new();
        let mut hit_policies = HitPolicies::new();
        let mut output_priorities = OutputPriorities::new();
        let mut groups = BTreeMap::new();

        for table in &document.tables {
            for output in &table.outputs {
                if dependencies.contains_key(output) {
                    return Err(ChainError::table(format!(
                        "output '{}' is declared by more than one table",
                        output
                    )));
                }
                dependencies.insert(output.clone(), table.inputs.clone());
                groups.insert(output.clone(), table.outputs.clone());
                if let Some(policy) = table.hit_policy {
                    hit_policies.insert(output.clone(), policy);
                }
            }
            output_priorities.extend(table.output_priorities()?);

            for row in &table.rules {
                let rule = table.row_to_rule(row)?;
                if row_ids.insert(&rule, row.id.clone()) {
                    rules.push(rule);
                } else {
                    tracing::warn!(
                        table = %table.id,
                        row = %row.id,
                        kept = row_ids.get(&rule).unwrap_or_default(),
                        "duplicate row collapsed"
                    );
                }
            }
        }

        tracing::debug!(
            tables = document.tables.len(),
            rules = rules.len(),
            "loaded table document"
        );

        Ok(Self {
            document,
            rules,
            row_ids,
            dependencies,
            hit_policies,
            output_priorities,
            groups,
            destination: None,
            row_id_prefix: DEFAULT_ROW_ID_PREFIX.to_string(),
            last_sync: SyncReport::default(),
        })
    }

    /// Build a handler from the document in `store`.
    pub fn load(store: &dyn TableStore) -> Result<Self> {
        Self::from_document(store.load()?)
    }

    /// Save updated documents to `store`.
    pub fn with_destination(mut self, store: impl TableStore + 'static) -> Self {
        self.destination = Some(Box::new(store));
        self
    }

    /// Use `prefix` for generated row identifiers.
    pub fn with_row_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.row_id_prefix = prefix.into();
        self
    }

    /// The current document, including rows added by updates.
    pub fn document(&self) -> &TableDocument {
        &self.document
    }

    /// Rows added by the most recent update.
    pub fn last_sync(&self) -> &SyncReport {
        &self.last_sync
    }

    /// Identifier of the row backing `rule`.
    pub fn row_id(&self, rule: &Rule) -> Option<&str> {
        self.row_ids.get(rule)
    }
}

impl ModelHandler for TableHandler {
    fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    fn rules(&self) -> &[Rule] {
        &self.rules
    }

    fn hit_policies(&self) -> &HitPolicies {
        &self.hit_policies
    }

    fn output_priorities(&self) -> &OutputPriorities {
        &self.output_priorities
    }

    fn output_group(&self, output: &str) -> Vec<String> {
        self.groups
            .get(output)
            .cloned()
            .unwrap_or_else(|| vec![output.to_string()])
    }

    /// Write the knowledge base's new rules into the document.
    ///
    /// The document, row identifiers and rules are replaced only once every
    /// rule has a row and the destination, if any, accepted the save.
    fn update(&mut self, knowledge_base: &KnowledgeBase) -> Result<()> {
        if let Some(rule) = knowledge_base
            .rules()
            .iter()
            .find(|rule| !self.document.tables.iter().any(|t| t.assigns_group(rule)))
        {
            return Err(ChainError::handler(format!(
                "no table assigns exactly the outputs of '{}'",
                rule
            )));
        }

        let mut document = self.document.clone();
        let mut row_ids = self.row_ids.clone();
        let prefix = self.row_id_prefix.clone();
        let mut next_id = || new_row_id(&prefix);
        let report = synchronize(&mut document, knowledge_base, &mut row_ids, &mut next_id)?;

        if !report.is_unchanged() {
            document.updated_at = Some(Utc::now());
        }
        if let Some(destination) = &self.destination {
            destination.save(&document)?;
            tracing::debug!(
                destination = %destination.describe(),
                inserted = report.inserted.len(),
                "table document written"
            );
        }

        self.document = document;
        self.row_ids = row_ids;
        self.rules = knowledge_base.rules().to_vec();
        self.last_sync = report;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decision::{no_learning, Engine, RuleFactory};
    use crate::core::hit_policy::HitPolicy;
    use crate::core::rule::{Condition, Expression};
    use crate::core::state::{Inputs, State};
    use crate::storage::MemoryTableStore;
    use serde_json::{json, Value};
    use std::sync::Arc;

    const DINNER: &str = r#"{
        "name": "dinner",
        "tables": [
            {
                "id": "dish",
                "hit_policy": "UNIQUE",
                "inputs": ["season", "guests"],
                "outputs": ["dish"],
                "rules": [
                    {"id": "d1", "inputs": ["\"fall\"", null], "outputs": ["\"spareribs\""]},
                    {"id": "d2", "inputs": ["\"winter\"", null], "outputs": ["\"roastbeef\""]},
                    {"id": "d3", "inputs": ["\"fall\"", null], "outputs": ["\"spareribs\""]}
                ]
            },
            {
                "id": "beverage",
                "hit_policy": "COLLECT",
                "inputs": ["dish", "guests"],
                "outputs": ["beverage", "glass"],
                "rules": [
                    {"id": "b1", "inputs": ["\"spareribs\"", "-"], "outputs": ["\"aecht schlenkerla\"", "\"mug\""]},
                    {"id": "b2", "inputs": ["\"roastbeef\"", ""], "outputs": ["\"bordeaux\"", "\"wine\""]}
                ]
            }
        ]
    }"#;

    fn handler() -> TableHandler {
        TableHandler::from_document(TableDocument::from_json(DINNER).unwrap()).unwrap()
    }

    fn inputs(pairs: &[(&str, Value)]) -> Inputs {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_load_collapses_duplicate_rows() {
        let handler = handler();
        assert_eq!(handler.rules().len(), 4);
        assert_eq!(handler.row_id(&handler.rules()[0]), Some("d1"));
    }

    #[test]
    fn test_dependencies_policies_and_groups() {
        let handler = handler();
        assert_eq!(handler.dependencies()["dish"], vec!["season", "guests"]);
        assert_eq!(handler.dependencies()["glass"], vec!["dish", "guests"]);
        assert_eq!(handler.hit_policies()["beverage"], HitPolicy::Collect);
        assert_eq!(handler.output_group("glass"), vec!["beverage", "glass"]);
        assert_eq!(handler.output_group("unknown"), vec!["unknown"]);
    }

    #[test]
    fn test_duplicate_output_across_tables_is_rejected() {
        let mut document = TableDocument::from_json(DINNER).unwrap();
        let mut copy = document.tables[0].clone();
        copy.id = "dish-2".to_string();
        document.tables.push(copy);
        assert!(TableHandler::from_document(document).is_err());
    }

    #[test]
    fn test_decide_through_tables() {
        let mut engine = Engine::new(handler());
        let value = engine
            .decide(&no_learning, &inputs(&[("season", json!("winter"))]), "beverage")
            .unwrap();
        assert_eq!(value, json!(["bordeaux"]));
    }

    #[test]
    fn test_update_writes_learned_rows() {
        let destination = Arc::new(MemoryTableStore::new());
        let handler = handler()
            .with_destination(Arc::clone(&destination))
            .with_row_id_prefix("Learned_");

        struct Summer;
        impl RuleFactory for Summer {
            fn create_rule(
                &mut self,
                state: &State,
                fired: &[&Rule],
                output: &str,
            ) -> Result<Option<Rule>> {
                let summer = state.get("season") == Some(&json!("summer"));
                if output == "dish" && fired.is_empty() && summer {
                    return Ok(Some(Rule::assigning(
                        Expression::and([Condition::equals("season", "summer")]),
                        "dish",
                        "salad",
                    )));
                }
                Ok(None)
            }
        }

        let mut engine = Engine::new(handler);
        let value = engine
            .decide(
                &|_: &dyn ModelHandler| Summer,
                &inputs(&[("season", json!("summer"))]),
                "dish",
            )
            .unwrap();
        assert_eq!(value, json!("salad"));

        let handler = engine.into_handler();
        let inserted = &handler.last_sync().inserted;
        assert_eq!(inserted.len(), 1);
        assert!(inserted[0].row_id.starts_with("Learned_"));
        // Spliced before d3, the next row no rule consumed.
        assert_eq!(inserted[0].position, 2);

        let saved = destination.snapshot().unwrap();
        assert_eq!(destination.save_count(), 1);
        assert!(saved.updated_at.is_some());
        let row = &saved.tables[0].rules[2];
        assert_eq!(row.inputs, vec![Some("\"summer\"".to_string()), None]);
        assert_eq!(row.outputs, vec!["\"salad\"".to_string()]);
        assert_eq!(saved.tables[0].rules[3].id, "d3");
    }

    #[test]
    fn test_update_with_unchanged_rules_is_idempotent() {
        let mut handler = handler();
        let before = handler.document().clone();
        let kb = KnowledgeBase::build(handler.rules().to_vec());

        handler.update(&kb).unwrap();
        handler.update(&kb).unwrap();
        assert!(handler.last_sync().is_unchanged());
        assert_eq!(handler.document(), &before);
    }

    struct Proposes(Rule);

    impl RuleFactory for Proposes {
        fn create_rule(&mut self, _: &State, fired: &[&Rule], _: &str) -> Result<Option<Rule>> {
            Ok(fired.is_empty().then(|| self.0.clone()))
        }
    }

    #[test]
    fn test_failed_sync_leaves_handler_and_engine_unchanged() {
        let destination = Arc::new(MemoryTableStore::new());
        let handler = handler().with_destination(Arc::clone(&destination));
        let before = handler.document().clone();

        // "mood" is not an input column of the dish table.
        let moody = Rule::assigning(
            Expression::and([
                Condition::equals("season", "summer"),
                Condition::equals("mood", "happy"),
            ]),
            "dish",
            "salad",
        );
        let summer = inputs(&[("season", json!("summer")), ("mood", json!("happy"))]);

        let mut engine = Engine::new(handler);
        let provider = |_: &dyn ModelHandler| Proposes(moody.clone());
        let err = engine.decide(&provider, &summer, "dish").unwrap_err();
        assert!(matches!(err, ChainError::Table { .. }));

        assert_eq!(engine.knowledge_base().len(), 4);
        assert_eq!(engine.handler().rules().len(), 4);
        assert_eq!(engine.handler().document(), &before);
        assert_eq!(destination.save_count(), 0);

        let err = engine.decide(&no_learning, &summer, "dish").unwrap_err();
        assert!(err.is_unresolved());
    }

    #[test]
    fn test_update_rejects_rule_no_table_holds() {
        let mut handler = handler();
        let before = handler.document().clone();
        let mut rules = handler.rules().to_vec();
        rules.push(Rule::assigning(
            Expression::and([Condition::equals("dish", "salad")]),
            "glass",
            "cup",
        ));

        let err = handler.update(&KnowledgeBase::build(rules)).unwrap_err();
        assert!(matches!(err, ChainError::Handler { .. }));
        assert_eq!(handler.document(), &before);
        assert_eq!(handler.rules().len(), 4);
    }

    #[test]
    fn test_load_from_store() {
        let store = MemoryTableStore::with_document(TableDocument::from_json(DINNER).unwrap());
        let handler = TableHandler::load(&store).unwrap();
        assert_eq!(handler.document().name.as_deref(), Some("dinner"));
    }
}
