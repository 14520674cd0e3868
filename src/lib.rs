//! Cortex is a rules engine for business-logic evaluation.
//!
//! An engine holds an ordered collection of typed rules that read from and
//! write to a shared, thread-safe [`EvalContext`]. Five rule families are
//! supported:
//!
//! - **Assignment**: set values directly on the context
//! - **Formula**: calculate values using expressions or host functions
//! - **Allocation**: distribute a value across multiple targets
//! - **Lookup**: retrieve values from registered lookup tables
//! - **Buildup**: accumulate values (running totals, aggregations)
//!
//! Rules evaluate sequentially in insertion order, with configurable
//! error-handling modes, an optional deadline, and short-circuit on halt.
//! Formulas can be written in a small expression DSL (see [`expr`]) that
//! compiles to an AST at rule-construction time.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use cortex::{
//!     AssignmentConfig, AssignmentRule, Config, Engine, EvalContext, FormulaConfig,
//!     FormulaRule, LookupConfig, LookupRule, RangeLookup, TaxBracket, Value,
//! };
//!
//! let engine = Engine::new("payroll", Config::default());
//! engine
//!     .register_lookup(RangeLookup::from_tax_brackets(
//!         "tax_brackets",
//!         &[
//!             TaxBracket { min: 0.0, max: 50_000.0, rate: 0.10 },
//!             TaxBracket { min: 50_000.0, max: 0.0, rate: 0.22 },
//!         ],
//!     ))
//!     .unwrap();
//! engine
//!     .add_rules([
//!         AssignmentRule::must(AssignmentConfig {
//!             id: "base".into(),
//!             target: "salary".into(),
//!             value: Some(Value::from(75_000.0)),
//!             ..Default::default()
//!         })
//!         .into(),
//!         LookupRule::must(LookupConfig {
//!             id: "rate".into(),
//!             table: "tax_brackets".into(),
//!             key: "salary".into(),
//!             target: "tax_rate".into(),
//!             ..Default::default()
//!         })
//!         .into(),
//!         FormulaRule::must(FormulaConfig {
//!             id: "tax".into(),
//!             target: "tax".into(),
//!             expression: Some("salary * tax_rate".into()),
//!             ..Default::default()
//!         })
//!         .into(),
//!     ])
//!     .unwrap();
//!
//! let ctx = Arc::new(EvalContext::new());
//! let result = engine.evaluate(Arc::clone(&ctx)).unwrap();
//!
//! assert!(result.success());
//! assert_eq!(ctx.get_f64("tax").unwrap(), 16_500.0);
//! ```

mod engine;
mod error;
mod obs;
mod types;

pub mod expr;
pub mod rules;

pub use engine::{CancelCause, CancelToken, Engine};
pub use error::{Error, ErrorKind, EvaluateError, Phase, RuleError};
pub use expr::Expression;
pub use obs::{Logger, Metrics, Observability, Span, Tracer, TracingLogger, TracingTracer};
pub use rules::{
    AllocationConfig, AllocationRule, AllocationStrategy, AllocationTarget, AssignmentConfig,
    AssignmentRule, BuildupConfig, BuildupRule, FormulaConfig, FormulaFn, FormulaRule,
    LookupConfig, LookupRule, Rule, RuleFamily, RuleMeta, ValueFn,
};
pub use types::{
    Buildup, BuildupOperation, Config, EvalContext, EvalMode, EvalResult, Lookup, LookupKey,
    MapLookup, RangeEntry, RangeLookup, TaxBracket, Value,
};
