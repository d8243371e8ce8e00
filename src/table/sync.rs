//! Writing a knowledge base back onto a table document.
//!
//! Rows that already back a rule keep their identifier and position. Rules
//! without a row are serialized into new rows and spliced in where the rule
//! list puts them: just before the next existing row, or at the end.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::core::knowledge_base::KnowledgeBase;
use crate::core::rule::Rule;
use crate::error::Result;
use crate::table::document::TableDocument;

/// Row identifiers per rule, keyed by rule fingerprint.
#[derive(Debug, Clone, Default)]
pub struct RowIds {
    ids: HashMap<String, String>,
}

impl RowIds {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier of the row backing `rule`.
    pub fn get(&self, rule: &Rule) -> Option<&str> {
        self.ids.get(&rule.fingerprint()).map(String::as_str)
    }

    /// Record the row backing `rule`; an existing entry is kept.
    pub fn insert(&mut self, rule: &Rule, id: impl Into<String>) -> bool {
        let key = rule.fingerprint();
        if self.ids.contains_key(&key) {
            return false;
        }
        self.ids.insert(key, id.into());
        true
    }

    /// Check if `rule` is backed by a row.
    pub fn contains(&self, rule: &Rule) -> bool {
        self.ids.contains_key(&rule.fingerprint())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A row added by [`synchronize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertedRow {
    /// Table the row was added to.
    pub table_id: String,
    /// Identifier of the new row.
    pub row_id: String,
    /// Index of the row within its table after insertion.
    pub position: usize,
}

/// Rows added by one synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub inserted: Vec<InsertedRow>,
}

impl SyncReport {
    /// Check if the document was left unchanged.
    pub fn is_unchanged(&self) -> bool {
        self.inserted.is_empty()
    }
}

/// Generate a fresh row identifier.
pub fn new_row_id(prefix: &str) -> String {
    format!("{}{}", prefix, Uuid::new_v4().simple())
}

/// Add rows for the knowledge base's unbacked rules to `document`.
///
/// Tables are visited in document order. For each, the rules assigning
/// exactly that table's outputs are walked in knowledge-base order alongside
/// the table's existing rows. `next_id` supplies identifiers for new rows and
/// `ids` is updated as rows are added.
pub fn synchronize(
    document: &mut TableDocument,
    knowledge_base: &KnowledgeBase,
    ids: &mut RowIds,
    next_id: &mut dyn FnMut() -> String,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for table in &mut document.tables {
        let group: Vec<&Rule> = knowledge_base
            .rules()
            .iter()
            .filter(|rule| table.assigns_group(rule))
            .collect();
        let mut cursor = 0;

        for rule in group {
            if ids.contains(rule) {
                cursor += 1;
                continue;
            }

            let row = table.rule_to_row(rule, next_id())?;
            let position = cursor.min(table.rules.len());
            tracing::debug!(table = %table.id, row = %row.id, position, "inserting row");

            ids.insert(rule, row.id.clone());
            report.inserted.push(InsertedRow {
                table_id: table.id.clone(),
                row_id: row.id.clone(),
                position,
            });
            table.rules.insert(position, row);
            cursor = position + 1;
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::document::{DecisionTable, TableRow};

    fn row(id: &str, x: &str, y: &str) -> TableRow {
        TableRow {
            id: id.to_string(),
            inputs: vec![Some(x.to_string())],
            outputs: vec![y.to_string()],
            ..TableRow::default()
        }
    }

    fn document() -> TableDocument {
        TableDocument {
            tables: vec![DecisionTable {
                id: "y".to_string(),
                inputs: vec!["x".to_string()],
                outputs: vec!["y".to_string()],
                rules: vec![row("a", "1", "10"), row("b", "2", "20")],
                ..DecisionTable::default()
            }],
            ..TableDocument::default()
        }
    }

    fn rules_and_ids(doc: &TableDocument) -> (Vec<Rule>, RowIds) {
        let table = &doc.tables[0];
        let mut ids = RowIds::new();
        let rules = table
            .rules
            .iter()
            .map(|r| {
                let rule = table.row_to_rule(r).unwrap();
                ids.insert(&rule, r.id.clone());
                rule
            })
            .collect();
        (rules, ids)
    }

    fn counter() -> impl FnMut() -> String {
        let mut n = 0;
        move || {
            n += 1;
            format!("new-{}", n)
        }
    }

    fn row_ids(doc: &TableDocument) -> Vec<&str> {
        doc.tables[0].rules.iter().map(|r| r.id.as_str()).collect()
    }

    fn learned(doc: &TableDocument, x: &str, y: &str) -> Rule {
        doc.tables[0].row_to_rule(&row("tmp", x, y)).unwrap()
    }

    #[test]
    fn test_unchanged_rules_insert_nothing() {
        let mut doc = document();
        let (rules, mut ids) = rules_and_ids(&doc);
        let kb = KnowledgeBase::build(rules);

        let report = synchronize(&mut doc, &kb, &mut ids, &mut counter()).unwrap();
        assert!(report.is_unchanged());
        assert_eq!(doc, document());
    }

    #[test]
    fn test_new_rule_spliced_before_next_existing_row() {
        let mut doc = document();
        let (mut rules, mut ids) = rules_and_ids(&doc);
        rules.insert(1, learned(&doc, "3", "30"));
        let kb = KnowledgeBase::build(rules);

        let report = synchronize(&mut doc, &kb, &mut ids, &mut counter()).unwrap();

        assert_eq!(row_ids(&doc), vec!["a", "new-1", "b"]);
        assert_eq!(
            report.inserted,
            vec![InsertedRow {
                table_id: "y".to_string(),
                row_id: "new-1".to_string(),
                position: 1,
            }]
        );
    }

    #[test]
    fn test_consecutive_new_rules_keep_rule_order() {
        let mut doc = document();
        let (mut rules, mut ids) = rules_and_ids(&doc);
        rules.insert(0, learned(&doc, "4", "40"));
        rules.insert(0, learned(&doc, "3", "30"));
        rules.push(learned(&doc, "5", "50"));
        let kb = KnowledgeBase::build(rules);

        synchronize(&mut doc, &kb, &mut ids, &mut counter()).unwrap();

        assert_eq!(row_ids(&doc), vec!["new-1", "new-2", "a", "b", "new-3"]);
        assert_eq!(doc.tables[0].rules[0].inputs, vec![Some("3".to_string())]);
        assert_eq!(doc.tables[0].rules[1].inputs, vec![Some("4".to_string())]);
    }

    #[test]
    fn test_ids_are_updated_incrementally() {
        let mut doc = document();
        let (mut rules, mut ids) = rules_and_ids(&doc);
        rules.push(learned(&doc, "3", "30"));
        let kb = KnowledgeBase::build(rules);

        synchronize(&mut doc, &kb, &mut ids, &mut counter()).unwrap();
        assert_eq!(ids.len(), 3);
        let snapshot = doc.clone();

        let report = synchronize(&mut doc, &kb, &mut ids, &mut counter()).unwrap();
        assert!(report.is_unchanged());
        assert_eq!(doc, snapshot);
    }

    #[test]
    fn test_rules_for_other_tables_are_ignored() {
        let mut doc = document();
        let (mut rules, mut ids) = rules_and_ids(&doc);
        rules.push(Rule::assigning(
            crate::core::rule::Condition::equals("x", 1),
            "z",
            1,
        ));
        let kb = KnowledgeBase::build(rules);

        let report = synchronize(&mut doc, &kb, &mut ids, &mut counter()).unwrap();
        assert!(report.is_unchanged());
    }

    #[test]
    fn test_new_row_id_has_prefix_and_is_unique() {
        let a = new_row_id("DecisionRule_");
        let b = new_row_id("DecisionRule_");
        assert!(a.starts_with("DecisionRule_"));
        assert_eq!(a.len(), "DecisionRule_".len() + 32);
        assert_ne!(a, b);
    }
}
