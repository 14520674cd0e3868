//! The five rule variants and their shared metadata.
//!
//! A [`Rule`] is a tagged union over the behavioural families; the engine
//! dispatches with an exhaustive match rather than dynamic dispatch, so a
//! new family cannot be added without the compiler pointing at every site
//! that must learn about it.

pub mod allocation;
pub mod assignment;
pub mod buildup;
pub mod formula;
pub mod lookup;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::CancelToken;
use crate::error::RuleError;
use crate::types::EvalContext;

pub use allocation::{AllocationConfig, AllocationRule, AllocationStrategy, AllocationTarget};
pub use assignment::{AssignmentConfig, AssignmentRule, ValueFn};
pub use buildup::{BuildupConfig, BuildupRule};
pub use formula::{FormulaConfig, FormulaFn, FormulaRule};
pub use lookup::{LookupConfig, LookupRule};

/// The behavioural family of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFamily {
    Assignment,
    Formula,
    Allocation,
    Lookup,
    Buildup,
}

impl fmt::Display for RuleFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleFamily::Assignment => "assignment",
            RuleFamily::Formula => "formula",
            RuleFamily::Allocation => "allocation",
            RuleFamily::Lookup => "lookup",
            RuleFamily::Buildup => "buildup",
        };
        write!(f, "{s}")
    }
}

/// Metadata shared by every rule variant. The dependency list is
/// informational only; rules always run in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleMeta {
    pub id: String,
    pub name: String,
    pub description: String,
    pub deps: Vec<String>,
}

/// A unit of evaluable logic with a stable id.
#[derive(Debug)]
pub enum Rule {
    Assignment(AssignmentRule),
    Formula(FormulaRule),
    Allocation(AllocationRule),
    Lookup(LookupRule),
    Buildup(BuildupRule),
}

impl Rule {
    /// The unique identifier for this rule.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.meta().id
    }

    #[must_use]
    pub fn meta(&self) -> &RuleMeta {
        match self {
            Rule::Assignment(rule) => rule.meta(),
            Rule::Formula(rule) => rule.meta(),
            Rule::Allocation(rule) => rule.meta(),
            Rule::Lookup(rule) => rule.meta(),
            Rule::Buildup(rule) => rule.meta(),
        }
    }

    #[must_use]
    pub fn family(&self) -> RuleFamily {
        match self {
            Rule::Assignment(_) => RuleFamily::Assignment,
            Rule::Formula(_) => RuleFamily::Formula,
            Rule::Allocation(_) => RuleFamily::Allocation,
            Rule::Lookup(_) => RuleFamily::Lookup,
            Rule::Buildup(_) => RuleFamily::Buildup,
        }
    }

    /// Execute the rule against the given context.
    ///
    /// # Errors
    ///
    /// Returns a [`RuleError`] scoped to this rule on any failure.
    pub fn evaluate(&self, cancel: &CancelToken, ctx: &EvalContext) -> Result<(), RuleError> {
        match self {
            Rule::Assignment(rule) => rule.evaluate(cancel, ctx),
            Rule::Formula(rule) => rule.evaluate(cancel, ctx),
            Rule::Allocation(rule) => rule.evaluate(cancel, ctx),
            Rule::Lookup(rule) => rule.evaluate(cancel, ctx),
            Rule::Buildup(rule) => rule.evaluate(cancel, ctx),
        }
    }
}

impl From<AssignmentRule> for Rule {
    fn from(rule: AssignmentRule) -> Self {
        Rule::Assignment(rule)
    }
}

impl From<FormulaRule> for Rule {
    fn from(rule: FormulaRule) -> Self {
        Rule::Formula(rule)
    }
}

impl From<AllocationRule> for Rule {
    fn from(rule: AllocationRule) -> Self {
        Rule::Allocation(rule)
    }
}

impl From<LookupRule> for Rule {
    fn from(rule: LookupRule) -> Self {
        Rule::Lookup(rule)
    }
}

impl From<BuildupRule> for Rule {
    fn from(rule: BuildupRule) -> Self {
        Rule::Buildup(rule)
    }
}
