//! CLI commands for backchain.
//!
//! - **decide**: decide a goal against a table document, optionally learning
//! - **inspect**: show a document's variables, hit policies and rules
//! - **prompt**: the interactive rule factory used by `decide --learn`

pub mod decide;
pub mod inspect;
pub mod prompt;

pub use decide::{parse_inputs, DecideCommand, DecideOptions, DecideOutput};
pub use inspect::{InspectCommand, InspectOptions, InspectOutput, TableSummary};
pub use prompt::PromptRuleFactory;
