//! Backward-chaining resolution.
//!
//! Resolving a goal walks the rules that assign it, recursively resolving the
//! derived variables each rule reads before evaluating its antecedent. Input
//! variables are never resolved: an unset input simply disqualifies the rule.
//! A per-call visiting set breaks cycles, so a variable that depends on itself
//! resolves to unset instead of recursing forever.
//!
//! After the rules for an output have been evaluated, an [`EvaluationHook`]
//! sees the state and the fired rules. It may let resolution proceed (the hit
//! policy then decides) or cancel the whole pass with a learned rule.

use std::collections::BTreeSet;
use std::ops::ControlFlow;

use crate::core::evaluate::evaluate;
use crate::core::hit_policy::{ConflictResolver, HitPolicies, HitPolicy, OutputPriorities};
use crate::core::knowledge_base::KnowledgeBase;
use crate::core::rule::Rule;
use crate::core::state::{Inputs, State};
use crate::error::Result;

/// A rule proposed during resolution, with where it should be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct Learned {
    /// The proposed rule.
    pub rule: Rule,
    /// Output whose evaluation triggered the proposal.
    pub output: String,
    /// Insertion index in the rule list; `None` appends.
    pub index: Option<usize>,
}

/// What to do after the rules for an output have been evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum HookAction {
    /// Let the hit policy decide among the fired rules.
    Proceed,
    /// Abandon this pass; the caller inserts the rule and restarts.
    Learn(Learned),
}

/// Called once per output evaluated, intermediates included.
pub trait EvaluationHook {
    /// Inspect the state before the output is assigned.
    fn after_output(&mut self, state: &State, output: &str, fired: &[&Rule])
        -> Result<HookAction>;
}

/// A hook that never intervenes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHook;

impl EvaluationHook for NoHook {
    fn after_output(&mut self, _: &State, _: &str, _: &[&Rule]) -> Result<HookAction> {
        Ok(HookAction::Proceed)
    }
}

impl<H: EvaluationHook + ?Sized> EvaluationHook for &mut H {
    fn after_output(
        &mut self,
        state: &State,
        output: &str,
        fired: &[&Rule],
    ) -> Result<HookAction> {
        (**self).after_output(state, output, fired)
    }
}

/// Outcome of one resolution pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The goal was assigned.
    Resolved(State),
    /// Resolution finished with the goal unset.
    Exhausted(State),
    /// A hook cancelled the pass with a learned rule.
    Cancelled(Learned),
}

impl Resolution {
    /// The final state, unless the pass was cancelled.
    pub fn into_state(self) -> Option<State> {
        match self {
            Resolution::Resolved(state) | Resolution::Exhausted(state) => Some(state),
            Resolution::Cancelled(_) => None,
        }
    }
}

/// Resolves goals against a knowledge base.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    knowledge_base: &'a KnowledgeBase,
    conflicts: ConflictResolver<'a>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver with explicit hit policies and priorities.
    pub fn new(knowledge_base: &'a KnowledgeBase, conflicts: ConflictResolver<'a>) -> Self {
        Self {
            knowledge_base,
            conflicts,
        }
    }

    /// Resolve `goal` from `inputs`.
    ///
    /// Returns the final state; the goal is unset if no rule could decide it.
    pub fn resolve(&self, goal: &str, inputs: &Inputs) -> Result<State> {
        let resolution = self.resolve_with(goal, inputs, NoHook)?;
        // NoHook never cancels
        Ok(resolution.into_state().unwrap_or_default())
    }

    /// Resolve `goal` from `inputs`, consulting `hook` after each output.
    pub fn resolve_with(
        &self,
        goal: &str,
        inputs: &Inputs,
        mut hook: impl EvaluationHook,
    ) -> Result<Resolution> {
        let mut state = State::seeded(self.knowledge_base, inputs);
        let mut visiting = BTreeSet::new();

        tracing::debug!(goal, rules = self.knowledge_base.len(), "resolving");

        if let ControlFlow::Break(learned) =
            self.resolve_variable(goal, &mut state, &mut visiting, &mut hook)?
        {
            tracing::debug!(goal, output = %learned.output, "resolution cancelled");
            return Ok(Resolution::Cancelled(learned));
        }

        if state.is_set(goal) {
            Ok(Resolution::Resolved(state))
        } else {
            Ok(Resolution::Exhausted(state))
        }
    }

    fn resolve_variable(
        &self,
        goal: &str,
        state: &mut State,
        visiting: &mut BTreeSet<String>,
        hook: &mut dyn EvaluationHook,
    ) -> Result<ControlFlow<Learned>> {
        if state.is_set(goal) {
            return Ok(ControlFlow::Continue(()));
        }
        if !visiting.insert(goal.to_string()) {
            tracing::trace!(goal, "cycle detected, leaving unset");
            return Ok(ControlFlow::Continue(()));
        }

        let flow = self.evaluate_rules(goal, state, visiting, hook);
        visiting.remove(goal);
        flow
    }

    fn evaluate_rules(
        &self,
        goal: &str,
        state: &mut State,
        visiting: &mut BTreeSet<String>,
        hook: &mut dyn EvaluationHook,
    ) -> Result<ControlFlow<Learned>> {
        let mut fired: Vec<&Rule> = Vec::new();

        'rules: for rule in self.knowledge_base.rules_for(goal) {
            for name in rule.depending_variables() {
                if state.is_set(name) {
                    continue;
                }
                if self.knowledge_base.is_input(name) {
                    tracing::trace!(goal, input = name, %rule, "skipping rule, input unset");
                    continue 'rules;
                }
                if let ControlFlow::Break(learned) =
                    self.resolve_variable(name, state, visiting, hook)?
                {
                    return Ok(ControlFlow::Break(learned));
                }
                if !state.is_set(name) {
                    tracing::trace!(goal, variable = name, %rule, "skipping rule, unresolved");
                    continue 'rules;
                }
            }

            if evaluate(&rule.antecedent, state) {
                tracing::trace!(goal, %rule, "rule fired");
                fired.push(rule);
            } else {
                tracing::trace!(goal, %rule, "rule did not fire");
            }
        }

        if let HookAction::Learn(learned) = hook.after_output(state, goal, &fired)? {
            return Ok(ControlFlow::Break(learned));
        }

        match self.conflicts.decide(goal, &fired)? {
            Some(assignments) => {
                tracing::debug!(goal, fired = fired.len(), "assigned");
                state.assign(&assignments);
            }
            None => tracing::debug!(goal, "no rule fired"),
        }
        Ok(ControlFlow::Continue(()))
    }
}

/// Resolve `goal` with the default hit policy for every output.
pub fn resolve(knowledge_base: &KnowledgeBase, goal: &str, inputs: &Inputs) -> Result<State> {
    let policies = HitPolicies::new();
    let priorities = OutputPriorities::new();
    let conflicts = ConflictResolver::new(&policies, &priorities, HitPolicy::default());
    Resolver::new(knowledge_base, conflicts).resolve(goal, inputs)
}
