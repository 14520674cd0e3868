//! A small expression DSL for formula rules.
//!
//! Supported operations:
//! - Arithmetic: `+ - * / %`
//! - Comparison: `== != < <= > >=`
//! - Logical: `&& || !`
//! - Functions: `min, max, abs, floor, ceil, round, if, sqrt, pow`
//!
//! Example expressions:
//!
//! ```text
//! base_salary * tax_rate
//! if(age >= 65, senior_discount, 0)
//! round(total * 0.0825, 2)
//! min(calculated, max_amount)
//! ```
//!
//! Identifiers resolve through a [`ValueGetter`] at evaluation time, so the
//! same compiled [`Expression`] can run against many contexts.

mod ast;
mod eval;
mod lexer;
mod parser;
mod token;

use std::collections::HashMap;
use std::fmt;

use crate::error::Error;
use crate::types::Value;

pub use ast::{BinaryOp, Node, UnaryOp};
pub use eval::{ExprFn, ValueGetter};
pub use token::{Token, TokenKind};

use eval::Evaluator;

/// Tokenize an expression string, for diagnostics and tooling.
#[must_use]
pub fn tokenize(input: &str) -> Vec<Token> {
    lexer::tokenize(input)
}

/// Parse an expression string into an AST without building an [`Expression`].
///
/// # Errors
///
/// Returns [`Error::InvalidExpression`] on malformed input.
pub fn parse(input: &str) -> Result<Node, Error> {
    parser::parse(input)
}

/// A compiled expression: the source string, its AST, and a per-expression
/// function registry.
#[derive(Clone)]
pub struct Expression {
    raw: String,
    ast: Node,
    evaluator: Evaluator,
}

impl Expression {
    /// Parse and compile an expression string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExpression`] on malformed input.
    pub fn compile(input: &str) -> Result<Self, Error> {
        let ast = parser::parse(input)?;
        Ok(Self {
            raw: input.to_owned(),
            ast,
            evaluator: Evaluator::new(),
        })
    }

    /// Compile an expression, panicking on error.
    ///
    /// # Panics
    ///
    /// Panics if the input is not a valid expression.
    #[must_use]
    pub fn must_compile(input: &str) -> Self {
        match Self::compile(input) {
            Ok(expression) => expression,
            Err(err) => panic!("invalid expression {input:?}: {err}"),
        }
    }

    /// The original expression string.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The compiled AST.
    #[must_use]
    pub fn ast(&self) -> &Node {
        &self.ast
    }

    /// Evaluate against a value getter.
    ///
    /// # Errors
    ///
    /// Propagates coercion failures, undefined identifiers and functions,
    /// and division by zero.
    pub fn eval(&self, getter: &dyn ValueGetter) -> Result<Value, Error> {
        self.evaluator.eval(&self.ast, getter)
    }

    /// Evaluate and coerce the result to `f64`.
    ///
    /// # Errors
    ///
    /// As [`eval`](Self::eval), plus [`Error::TypeMismatch`] for a
    /// non-numeric result.
    pub fn eval_f64(&self, getter: &dyn ValueGetter) -> Result<f64, Error> {
        self.eval(getter)?.as_f64()
    }

    /// Evaluate and read the result as a bool. A non-bool result reads as
    /// `false` rather than an error.
    ///
    /// # Errors
    ///
    /// As [`eval`](Self::eval).
    pub fn eval_bool(&self, getter: &dyn ValueGetter) -> Result<bool, Error> {
        Ok(self.eval(getter)?.as_bool().unwrap_or(false))
    }

    /// Evaluate using a plain map as the value source.
    ///
    /// # Errors
    ///
    /// As [`eval`](Self::eval).
    pub fn eval_with_map(&self, values: &HashMap<String, Value>) -> Result<Value, Error> {
        self.eval(values)
    }

    /// Register a custom function for this expression.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.evaluator.register_fn(name, std::sync::Arc::new(f));
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression").field("raw", &self.raw).finish()
    }
}
