//! Antecedent evaluation.

use crate::core::rule::{Antecedent, Expression, Operator};
use crate::core::state::State;

/// Evaluate an antecedent against the current state.
///
/// A condition over an unset variable does not hold.
pub fn evaluate(antecedent: &Antecedent, state: &State) -> bool {
    match antecedent {
        Antecedent::Condition(condition) => state
            .get(condition.name())
            .is_some_and(|value| condition.evaluate(value)),
        Antecedent::Expression(expression) => evaluate_expression(expression, state),
    }
}

fn evaluate_expression(expression: &Expression, state: &State) -> bool {
    match expression.operator {
        // `all` stops at the first child that does not hold
        Operator::And => expression
            .children
            .iter()
            .all(|child| evaluate(child, state)),
    }
}
