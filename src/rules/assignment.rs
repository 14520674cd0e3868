use std::fmt;
use std::sync::Arc;

use crate::engine::CancelToken;
use crate::error::{Error, Phase, RuleError};
use crate::types::{EvalContext, Value};

use super::{RuleFamily, RuleMeta};

/// Computes a value dynamically from the evaluation context.
pub type ValueFn = Arc<dyn Fn(&CancelToken, &EvalContext) -> Result<Value, Error> + Send + Sync>;

/// Configuration for an [`AssignmentRule`].
///
/// Exactly one of `value` and `value_fn` must be set.
#[derive(Clone, Default)]
pub struct AssignmentConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub deps: Vec<String>,

    /// The context key to write.
    pub target: String,

    /// The static value to assign.
    pub value: Option<Value>,

    /// Computes the value dynamically.
    pub value_fn: Option<ValueFn>,
}

/// Writes a static or computed value to the evaluation context.
pub struct AssignmentRule {
    meta: RuleMeta,
    target: String,
    value: Option<Value>,
    value_fn: Option<ValueFn>,
}

impl AssignmentRule {
    /// Validate the configuration and build the rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRule`] when `id` or `target` is missing, or
    /// when not exactly one of `value` and `value_fn` is set.
    pub fn new(config: AssignmentConfig) -> Result<Self, Error> {
        if config.id.is_empty() {
            return Err(Error::InvalidRule("assignment rule requires an id".into()));
        }
        if config.target.is_empty() {
            return Err(Error::InvalidRule(format!(
                "assignment rule '{}' requires a target",
                config.id
            )));
        }
        match (&config.value, &config.value_fn) {
            (None, None) => {
                return Err(Error::InvalidRule(format!(
                    "assignment rule '{}' requires a value or a value function",
                    config.id
                )));
            }
            (Some(_), Some(_)) => {
                return Err(Error::InvalidRule(format!(
                    "assignment rule '{}' takes either a value or a value function, not both",
                    config.id
                )));
            }
            _ => {}
        }

        Ok(Self {
            meta: RuleMeta {
                id: config.id,
                name: config.name,
                description: config.description,
                deps: config.deps,
            },
            target: config.target,
            value: config.value,
            value_fn: config.value_fn,
        })
    }

    /// Build the rule, panicking on an invalid configuration.
    ///
    /// # Panics
    ///
    /// Panics if [`new`](Self::new) would return an error.
    #[must_use]
    pub fn must(config: AssignmentConfig) -> Self {
        match Self::new(config) {
            Ok(rule) => rule,
            Err(err) => panic!("{err}"),
        }
    }

    #[must_use]
    pub fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    /// The context key this rule writes.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Write the configured value to the context.
    ///
    /// # Errors
    ///
    /// Wraps any `value_fn` failure in a [`RuleError`].
    pub fn evaluate(&self, cancel: &CancelToken, ctx: &EvalContext) -> Result<(), RuleError> {
        let value = match &self.value_fn {
            Some(value_fn) => value_fn(cancel, ctx).map_err(|cause| {
                RuleError::new(
                    &self.meta.id,
                    Some(RuleFamily::Assignment),
                    Phase::Evaluate,
                    cause,
                )
            })?,
            None => self.value.clone().unwrap_or_default(),
        };

        ctx.set(self.target.clone(), value);
        Ok(())
    }
}

impl fmt::Debug for AssignmentRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssignmentRule")
            .field("id", &self.meta.id)
            .field("target", &self.target)
            .field("value", &self.value)
            .field("value_fn", &self.value_fn.as_ref().map(|_| ".."))
            .finish()
    }
}
