//! Core types and logic for backchain.
//!
//! This module contains the rule language, the knowledge base, backward
//! chaining resolution, hit policies and the learn-and-retry decision loop.

pub mod decision;
pub mod evaluate;
pub mod hit_policy;
pub mod knowledge_base;
pub mod resolver;
pub mod rule;
pub mod state;

pub use decision::{
    decide, is_fully_informed, no_learning, DecisionReport, Dependencies, Engine, EngineOptions,
    ModelHandler, NoLearning, RuleFactory, RuleFactoryProvider,
};
pub use evaluate::evaluate;
pub use hit_policy::{
    merge, resolve_conflicts, ConflictResolver, HitPolicies, HitPolicy, OutputPriorities,
};
pub use knowledge_base::KnowledgeBase;
pub use resolver::{
    resolve, EvaluationHook, HookAction, Learned, NoHook, Resolution, Resolver,
};
pub use rule::{Antecedent, Assignments, Condition, Expression, Operator, Rule};
pub use state::{Inputs, State};
