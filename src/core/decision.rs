//! Decision controller: resolution with learn-and-retry.
//!
//! An [`Engine`] owns a model handler and the live knowledge base built from
//! its rules. `decide` resolves a goal while a rule factory watches every
//! output evaluation. When the factory proposes a rule, the pass is cancelled,
//! the rule is inserted and resolution restarts on the rebuilt knowledge base.
//! Once the loop settles, a grown rule set is handed back to the handler once
//! and becomes the engine's live knowledge base only if the handler accepts it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::core::hit_policy::{ConflictResolver, HitPolicies, HitPolicy, OutputPriorities};
use crate::core::knowledge_base::KnowledgeBase;
use crate::core::resolver::{EvaluationHook, HookAction, Learned, NoHook, Resolution, Resolver};
use crate::core::rule::Rule;
use crate::core::state::{Inputs, State};
use crate::error::{ChainError, Result};

/// Ordered input names per output variable.
pub type Dependencies = BTreeMap<String, Vec<String>>;

static NO_PRIORITIES: OutputPriorities = BTreeMap::new();

/// Source of rules and policies, and sink for learned rule sets.
pub trait ModelHandler {
    /// Input names each output depends on.
    fn dependencies(&self) -> &Dependencies;

    /// Rules in priority order.
    fn rules(&self) -> &[Rule];

    /// Declared hit policy per output.
    fn hit_policies(&self) -> &HitPolicies;

    /// Allowed output values per output, highest priority first.
    fn output_priorities(&self) -> &OutputPriorities {
        &NO_PRIORITIES
    }

    /// Outputs assigned together with `output`, in declaration order.
    fn output_group(&self, output: &str) -> Vec<String> {
        vec![output.to_string()]
    }

    /// Persist a knowledge base that grew during `decide`.
    ///
    /// Must be safe to call repeatedly with the same content.
    fn update(&mut self, knowledge_base: &KnowledgeBase) -> Result<()>;
}

impl<H: ModelHandler + ?Sized> ModelHandler for &mut H {
    fn dependencies(&self) -> &Dependencies {
        (**self).dependencies()
    }

    fn rules(&self) -> &[Rule] {
        (**self).rules()
    }

    fn hit_policies(&self) -> &HitPolicies {
        (**self).hit_policies()
    }

    fn output_priorities(&self) -> &OutputPriorities {
        (**self).output_priorities()
    }

    fn output_group(&self, output: &str) -> Vec<String> {
        (**self).output_group(output)
    }

    fn update(&mut self, knowledge_base: &KnowledgeBase) -> Result<()> {
        (**self).update(knowledge_base)
    }
}

/// Proposes rules when the existing ones cannot decide an output.
///
/// Given the same `(state, fired, output)`, a factory should either always
/// propose the same rule or always decline; rejections are cached on that
/// assumption.
pub trait RuleFactory {
    /// Propose a rule for `output`, or decline with `None`.
    fn create_rule(&mut self, state: &State, fired: &[&Rule], output: &str)
        -> Result<Option<Rule>>;
}

impl<F: RuleFactory + ?Sized> RuleFactory for Box<F> {
    fn create_rule(
        &mut self,
        state: &State,
        fired: &[&Rule],
        output: &str,
    ) -> Result<Option<Rule>> {
        (**self).create_rule(state, fired, output)
    }
}

/// Creates a fresh rule factory for each `decide` call.
pub trait RuleFactoryProvider {
    /// Factory type produced.
    type Factory: RuleFactory;

    /// Create a factory for one decision.
    fn factory(&self, handler: &dyn ModelHandler) -> Self::Factory;
}

impl<P, F> RuleFactoryProvider for P
where
    P: Fn(&dyn ModelHandler) -> F,
    F: RuleFactory,
{
    type Factory = F;

    fn factory(&self, handler: &dyn ModelHandler) -> F {
        self(handler)
    }
}

/// A factory that always declines.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLearning;

impl RuleFactory for NoLearning {
    fn create_rule(&mut self, _: &State, _: &[&Rule], _: &str) -> Result<Option<Rule>> {
        Ok(None)
    }
}

/// Provider for [`NoLearning`].
pub fn no_learning(_: &dyn ModelHandler) -> NoLearning {
    NoLearning
}

/// Check whether a fired rule already uses every available dependency input.
///
/// `input_names` are the output's dependency inputs; the ones set in `state`
/// are available. Returns false when nothing fired.
pub fn is_fully_informed(fired: &[&Rule], state: &State, input_names: &[String]) -> bool {
    let available: BTreeSet<&str> = input_names
        .iter()
        .map(String::as_str)
        .filter(|name| state.is_set(name))
        .collect();

    fired.iter().any(|rule| {
        let reads: BTreeSet<&str> = rule.depending_variables().into_iter().collect();
        available.is_subset(&reads)
    })
}

/// Engine behaviour settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Hit policy for outputs the handler declares none for.
    pub default_hit_policy: HitPolicy,
    /// Whether the rule factory is consulted at all.
    pub learning_enabled: bool,
    /// Maximum number of rules one `decide` call may learn.
    pub max_new_rules: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_hit_policy: HitPolicy::Unique,
            learning_enabled: true,
            max_new_rules: 32,
        }
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            default_hit_policy: config.engine.default_hit_policy,
            learning_enabled: config.learning.enabled,
            max_new_rules: config.learning.max_new_rules,
        }
    }
}

/// Result of a decision, with what was learned along the way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionReport {
    /// The decided variable.
    pub goal: String,
    /// Its value.
    pub value: Value,
    /// Rules learned during the call, in learning order.
    pub learned: Vec<Rule>,
    /// Number of cancelled resolution passes.
    pub restarts: usize,
    /// Final evaluation state.
    pub state: State,
}

/// Rejection memory key: output plus the inputs it was asked about.
type Rejection = (String, Inputs);

struct LearningHook<'a, F: ?Sized> {
    factory: &'a mut F,
    knowledge_base: &'a KnowledgeBase,
    dependencies: &'a Dependencies,
    rejections: &'a mut Vec<Rejection>,
}

impl<F: RuleFactory + ?Sized> LearningHook<'_, F> {
    fn relevant_inputs(&self, state: &State, output: &str) -> Inputs {
        match self.dependencies.get(output) {
            Some(names) => state.select(names.iter().map(String::as_str)),
            None => state.select(
                self.knowledge_base
                    .input_variables()
                    .iter()
                    .map(String::as_str),
            ),
        }
    }
}

impl<F: RuleFactory + ?Sized> EvaluationHook for LearningHook<'_, F> {
    fn after_output(&mut self, state: &State, output: &str, fired: &[&Rule]) -> Result<HookAction> {
        let key = (output.to_string(), self.relevant_inputs(state, output));
        if self.rejections.contains(&key) {
            tracing::trace!(output, "previously rejected, not asking again");
            return Ok(HookAction::Proceed);
        }

        let Some(rule) = self.factory.create_rule(state, fired, output)? else {
            if fired.is_empty() {
                tracing::debug!(output, inputs = ?key.1, "factory declined, remembering");
                self.rejections.push(key);
            }
            return Ok(HookAction::Proceed);
        };

        if self.knowledge_base.contains(&rule) {
            tracing::debug!(output, %rule, "proposed rule already known");
            return Ok(HookAction::Proceed);
        }

        let index = fired
            .first()
            .and_then(|first| self.knowledge_base.position(first));
        tracing::debug!(output, %rule, ?index, "learned rule");
        Ok(HookAction::Learn(Learned {
            rule,
            output: output.to_string(),
            index,
        }))
    }
}

/// Decision engine over a model handler.
#[derive(Debug)]
pub struct Engine<H> {
    handler: H,
    knowledge_base: Arc<KnowledgeBase>,
    options: EngineOptions,
}

impl<H: ModelHandler> Engine<H> {
    /// Create an engine with default options.
    pub fn new(handler: H) -> Self {
        Self::with_options(handler, EngineOptions::default())
    }

    /// Create an engine with explicit options.
    pub fn with_options(handler: H, options: EngineOptions) -> Self {
        let knowledge_base = Arc::new(KnowledgeBase::build(handler.rules().to_vec()));
        Self {
            handler,
            knowledge_base,
            options,
        }
    }

    /// The model handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Consume the engine, returning the handler.
    pub fn into_handler(self) -> H {
        self.handler
    }

    /// The live knowledge base.
    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge_base
    }

    /// Engine options.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Variables a caller may supply.
    ///
    /// The knowledge base's input variables, plus every name in the
    /// dependency map that is not itself a dependency's output.
    pub fn inputs(&self) -> BTreeSet<String> {
        let dependencies = self.handler.dependencies();
        let mut inputs = self.knowledge_base.input_variables().clone();
        inputs.extend(
            dependencies
                .values()
                .flatten()
                .filter(|name| !dependencies.contains_key(*name))
                .cloned(),
        );
        inputs
    }

    /// Decide `goal` from `inputs`, returning its value.
    pub fn decide<P: RuleFactoryProvider>(
        &mut self,
        provider: &P,
        inputs: &Inputs,
        goal: &str,
    ) -> Result<Value> {
        self.decide_with_report(provider, inputs, goal)
            .map(|report| report.value)
    }

    /// Decide `goal` from `inputs`, reporting learned rules and restarts.
    ///
    /// Fails with [`ChainError::Unresolved`] if the goal stays unset once no
    /// further rules are learned.
    pub fn decide_with_report<P: RuleFactoryProvider>(
        &mut self,
        provider: &P,
        inputs: &Inputs,
        goal: &str,
    ) -> Result<DecisionReport> {
        let mut factory = provider.factory(&self.handler);
        let mut rejections: Vec<Rejection> = Vec::new();
        let mut knowledge_base = Arc::clone(&self.knowledge_base);
        let mut learned: Vec<Rule> = Vec::new();
        let mut restarts = 0;

        let conflicts = ConflictResolver::new(
            self.handler.hit_policies(),
            self.handler.output_priorities(),
            self.options.default_hit_policy,
        );

        let state = loop {
            let resolver = Resolver::new(&knowledge_base, conflicts);

            let learning =
                self.options.learning_enabled && learned.len() < self.options.max_new_rules;
            let resolution = if learning {
                let hook = LearningHook {
                    factory: &mut factory,
                    knowledge_base: &knowledge_base,
                    dependencies: self.handler.dependencies(),
                    rejections: &mut rejections,
                };
                resolver.resolve_with(goal, inputs, hook)?
            } else {
                resolver.resolve_with(goal, inputs, NoHook)?
            };

            match resolution {
                Resolution::Resolved(state) | Resolution::Exhausted(state) => break state,
                Resolution::Cancelled(proposal) => {
                    let index = proposal.index.unwrap_or(knowledge_base.len());
                    let rebuilt = knowledge_base.with_rule_at(index, proposal.rule.clone());
                    learned.push(proposal.rule);
                    restarts += 1;
                    tracing::debug!(goal, restarts, rules = rebuilt.len(), "restarting");
                    knowledge_base = Arc::new(rebuilt);
                }
            }
        };

        if !learned.is_empty() {
            self.handler.update(&knowledge_base)?;
            self.knowledge_base = knowledge_base;
            tracing::debug!(learned = learned.len(), "handler updated");
        }

        let value = state
            .get(goal)
            .cloned()
            .ok_or_else(|| ChainError::unresolved(goal))?;

        Ok(DecisionReport {
            goal: goal.to_string(),
            value,
            learned,
            restarts,
            state,
        })
    }
}

/// Decide `goal` once against `handler` with default options.
pub fn decide<H, P>(handler: &mut H, provider: &P, inputs: &Inputs, goal: &str) -> Result<Value>
where
    H: ModelHandler + ?Sized,
    P: RuleFactoryProvider,
{
    Engine::new(handler).decide(provider, inputs, goal)
}
