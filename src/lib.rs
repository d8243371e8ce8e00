//! backchain - backward-chaining decision tables that learn new rules
//!
//! Rules are IF/THEN statements over named variables. Given a goal variable
//! and some inputs, the engine derives the goal by recursively resolving the
//! variables its rules depend on, settles conflicts with a hit policy, and
//! can ask a rule factory for a new rule whenever nothing decides an output.
//! Learned rules are written back into the decision-table document they
//! belong to without disturbing existing rows.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod table;
pub mod util;

pub use config::Config;
pub use self::core::{
    decide, evaluate, resolve, Antecedent, Assignments, Condition, ConflictResolver,
    DecisionReport, Dependencies, Engine, EngineOptions, Expression, HitPolicies, HitPolicy,
    Inputs, KnowledgeBase, ModelHandler, NoLearning, Operator, OutputPriorities, Resolution,
    Resolver, Rule, RuleFactory, RuleFactoryProvider, State,
};
pub use error::{ChainError, Result};
pub use storage::{FileTableStore, MemoryTableStore, TableStore};
pub use table::{DecisionTable, SyncReport, TableDocument, TableHandler, TableRow};

// CLI commands
pub use cli::{DecideCommand, InspectCommand, PromptRuleFactory};
