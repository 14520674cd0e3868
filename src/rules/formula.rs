use std::fmt;
use std::sync::Arc;

use crate::engine::CancelToken;
use crate::error::{Error, Phase, RuleError};
use crate::expr::Expression;
use crate::types::{EvalContext, Value};

use super::{RuleFamily, RuleMeta};

/// Computes a value from the evaluation context.
pub type FormulaFn = Arc<dyn Fn(&CancelToken, &EvalContext) -> Result<Value, Error> + Send + Sync>;

/// Configuration for a [`FormulaRule`].
///
/// Exactly one of `formula` and `expression` must be set.
#[derive(Clone, Default)]
pub struct FormulaConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub deps: Vec<String>,

    /// The context key to store the result.
    pub target: String,

    /// Required input keys. Informational only; nothing is re-ordered or
    /// checked against this list.
    pub inputs: Vec<String>,

    /// A host function for complex rules.
    pub formula: Option<FormulaFn>,

    /// An expression string for config-driven rules, compiled at
    /// construction time.
    pub expression: Option<String>,
}

/// Calculates a value using a host function or a compiled expression.
pub struct FormulaRule {
    meta: RuleMeta,
    target: String,
    inputs: Vec<String>,
    formula: Option<FormulaFn>,
    compiled: Option<Expression>,
}

impl FormulaRule {
    /// Validate the configuration, compiling the expression if present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRule`] for missing fields and
    /// [`Error::InvalidExpression`] when the expression does not compile.
    pub fn new(config: FormulaConfig) -> Result<Self, Error> {
        if config.id.is_empty() {
            return Err(Error::InvalidRule("formula rule requires an id".into()));
        }
        if config.target.is_empty() {
            return Err(Error::InvalidRule(format!(
                "formula rule '{}' requires a target",
                config.id
            )));
        }
        let compiled = match (&config.formula, config.expression.as_deref()) {
            (None, None) => {
                return Err(Error::InvalidRule(format!(
                    "formula rule '{}' requires a formula or an expression",
                    config.id
                )));
            }
            (Some(_), Some(_)) => {
                return Err(Error::InvalidRule(format!(
                    "formula rule '{}' takes either a formula or an expression, not both",
                    config.id
                )));
            }
            (None, Some(expression)) => {
                Some(Expression::compile(expression).map_err(|err| match err {
                    Error::InvalidExpression(msg) => Error::InvalidExpression(format!(
                        "formula rule '{}': {msg}",
                        config.id
                    )),
                    other => other,
                })?)
            }
            (Some(_), None) => None,
        };

        Ok(Self {
            meta: RuleMeta {
                id: config.id,
                name: config.name,
                description: config.description,
                deps: config.deps,
            },
            target: config.target,
            inputs: config.inputs,
            formula: config.formula,
            compiled,
        })
    }

    /// Build the rule, panicking on an invalid configuration.
    ///
    /// # Panics
    ///
    /// Panics if [`new`](Self::new) would return an error.
    #[must_use]
    pub fn must(config: FormulaConfig) -> Self {
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

    /// The declared input keys.
    #[must_use]
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// The expression source, if this rule was built from one.
    #[must_use]
    pub fn expression(&self) -> Option<&str> {
        self.compiled.as_ref().map(Expression::raw)
    }

    /// Compute and store the result.
    ///
    /// # Errors
    ///
    /// Wraps formula and expression failures in a [`RuleError`].
    pub fn evaluate(&self, cancel: &CancelToken, ctx: &EvalContext) -> Result<(), RuleError> {
        let result = if let Some(formula) = &self.formula {
            formula(cancel, ctx)
        } else if let Some(compiled) = &self.compiled {
            compiled.eval(ctx)
        } else {
            Err(Error::InvalidRule(format!(
                "formula rule '{}' has no formula or expression",
                self.meta.id
            )))
        };

        let value = result.map_err(|cause| {
            RuleError::new(
                &self.meta.id,
                Some(RuleFamily::Formula),
                Phase::Evaluate,
                cause,
            )
        })?;

        ctx.set(self.target.clone(), value);
        Ok(())
    }
}

impl fmt::Debug for FormulaRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormulaRule")
            .field("id", &self.meta.id)
            .field("target", &self.target)
            .field("expression", &self.expression())
            .field("formula", &self.formula.as_ref().map(|_| ".."))
            .finish()
    }
}

// Common formula helpers over context keys.

/// A [`FormulaFn`] that adds two context values.
#[must_use]
pub fn add(a: &str, b: &str) -> FormulaFn {
    let (a, b) = (a.to_owned(), b.to_owned());
    Arc::new(move |_, ctx| Ok(Value::Number(ctx.get_f64(&a)? + ctx.get_f64(&b)?)))
}

/// A [`FormulaFn`] that subtracts the value under `b` from the value under `a`.
#[must_use]
pub fn subtract(a: &str, b: &str) -> FormulaFn {
    let (a, b) = (a.to_owned(), b.to_owned());
    Arc::new(move |_, ctx| Ok(Value::Number(ctx.get_f64(&a)? - ctx.get_f64(&b)?)))
}

/// A [`FormulaFn`] that multiplies two context values.
#[must_use]
pub fn multiply(a: &str, b: &str) -> FormulaFn {
    let (a, b) = (a.to_owned(), b.to_owned());
    Arc::new(move |_, ctx| Ok(Value::Number(ctx.get_f64(&a)? * ctx.get_f64(&b)?)))
}

/// A [`FormulaFn`] that divides the value under `a` by the value under `b`.
#[must_use]
pub fn divide(a: &str, b: &str) -> FormulaFn {
    let (a, b) = (a.to_owned(), b.to_owned());
    Arc::new(move |_, ctx| {
        let divisor = ctx.get_f64(&b)?;
        if divisor == 0.0 {
            return Err(Error::DivisionByZero);
        }
        Ok(Value::Number(ctx.get_f64(&a)? / divisor))
    })
}

/// A [`FormulaFn`] that takes a percentage of a context value.
#[must_use]
pub fn percentage(key: &str, percent: f64) -> FormulaFn {
    let key = key.to_owned();
    Arc::new(move |_, ctx| Ok(Value::Number(ctx.get_f64(&key)? * percent / 100.0)))
}

/// A [`FormulaFn`] that returns `then_value` when the boolean under
/// `condition` is true, else `else_value`.
#[must_use]
pub fn conditional(condition: &str, then_value: Value, else_value: Value) -> FormulaFn {
    let condition = condition.to_owned();
    Arc::new(move |_, ctx| {
        if ctx.get_bool(&condition)? {
            Ok(then_value.clone())
        } else {
            Ok(else_value.clone())
        }
    })
}
