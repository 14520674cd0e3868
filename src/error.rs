use std::fmt;

use thiserror::Error;

use crate::engine::CancelCause;
use crate::rules::RuleFamily;
use crate::types::EvalResult;

/// Errors produced by the engine, the evaluation context, lookups, and the
/// expression subsystem.
///
/// Callers branch on the failure kind via [`Error::kind`] (or by matching the
/// variant directly); the payloads only feed the message.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    #[error("rule not found: {0}")]
    RuleNotFound(String),

    #[error("lookup table not found: {0}")]
    LookupNotFound(String),

    #[error("key {key} not found in lookup table {table}")]
    KeyNotFound { table: String, key: String },

    #[error("value not found in context: {0}")]
    ValueNotFound(String),

    #[error("buildup not found: {0}")]
    BuildupNotFound(String),

    #[error("invalid rule configuration: {0}")]
    InvalidRule(String),

    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("allocation percentages must sum to 100: {0}")]
    AllocationSum(String),

    #[error("circular dependency detected: {0}")]
    CircularDep(String),

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("evaluation short-circuited by rule {0}")]
    ShortCircuit(String),

    #[error("engine is closed")]
    EngineClosed,

    #[error("evaluation timeout: {0}")]
    Timeout(CancelCause),

    #[error("missing evaluation context")]
    NilContext,

    #[error("duplicate rule id: {0}")]
    DuplicateRule(String),

    #[error("duplicate lookup table name: {0}")]
    DuplicateLookup(String),
}

/// The failure kind of an [`Error`], stripped of its payload.
///
/// This is the equality handle for programmatic control flow: a
/// [`RuleError`] exposes the kind of its underlying cause, so callers can
/// check "was this a timeout?" without destructuring messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RuleNotFound,
    LookupNotFound,
    KeyNotFound,
    ValueNotFound,
    BuildupNotFound,
    InvalidRule,
    InvalidExpression,
    TypeMismatch,
    DivisionByZero,
    AllocationSum,
    CircularDep,
    Evaluation,
    ShortCircuit,
    EngineClosed,
    Timeout,
    NilContext,
    DuplicateRule,
    DuplicateLookup,
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::RuleNotFound(_) => ErrorKind::RuleNotFound,
            Error::LookupNotFound(_) => ErrorKind::LookupNotFound,
            Error::KeyNotFound { .. } => ErrorKind::KeyNotFound,
            Error::ValueNotFound(_) => ErrorKind::ValueNotFound,
            Error::BuildupNotFound(_) => ErrorKind::BuildupNotFound,
            Error::InvalidRule(_) => ErrorKind::InvalidRule,
            Error::InvalidExpression(_) => ErrorKind::InvalidExpression,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::DivisionByZero => ErrorKind::DivisionByZero,
            Error::AllocationSum(_) => ErrorKind::AllocationSum,
            Error::CircularDep(_) => ErrorKind::CircularDep,
            Error::Evaluation(_) => ErrorKind::Evaluation,
            Error::ShortCircuit(_) => ErrorKind::ShortCircuit,
            Error::EngineClosed => ErrorKind::EngineClosed,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::NilContext => ErrorKind::NilContext,
            Error::DuplicateRule(_) => ErrorKind::DuplicateRule,
            Error::DuplicateLookup(_) => ErrorKind::DuplicateLookup,
        }
    }
}

/// The lifecycle phase in which a rule failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validate,
    Evaluate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Validate => write!(f, "validate"),
            Phase::Evaluate => write!(f, "evaluate"),
        }
    }
}

/// An [`Error`] scoped to the rule that raised it.
///
/// Renders as `rule "<id>" (<family>) <phase>: <cause>`, with the family
/// segment omitted when unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleError {
    rule_id: String,
    family: Option<RuleFamily>,
    phase: Phase,
    cause: Error,
}

impl RuleError {
    #[must_use]
    pub fn new(
        rule_id: impl Into<String>,
        family: Option<RuleFamily>,
        phase: Phase,
        cause: Error,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            family,
            phase,
            cause,
        }
    }

    #[must_use]
    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    #[must_use]
    pub fn family(&self) -> Option<RuleFamily> {
        self.family
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The underlying cause.
    #[must_use]
    pub fn cause(&self) -> &Error {
        &self.cause
    }

    /// The failure kind of the underlying cause.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.cause.kind()
    }

    #[must_use]
    pub fn into_cause(self) -> Error {
        self.cause
    }
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.family {
            Some(family) => write!(
                f,
                "rule \"{}\" ({}) {}: {}",
                self.rule_id, family, self.phase, self.cause
            ),
            None => write!(f, "rule \"{}\" {}: {}", self.rule_id, self.phase, self.cause),
        }
    }
}

impl std::error::Error for RuleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Error returned by [`Engine::evaluate`](crate::Engine::evaluate).
#[derive(Debug, Error)]
pub enum EvaluateError {
    /// The engine could not run or finish: closed engine, missing context,
    /// or an expired deadline.
    #[error(transparent)]
    Engine(#[from] Error),

    /// A rule failed under [`EvalMode::FailFast`](crate::EvalMode::FailFast).
    /// Carries the state accumulated before the failing rule.
    #[error("{error}")]
    FailFast {
        error: RuleError,
        result: Box<EvalResult>,
    },
}

impl EvaluateError {
    /// The failure kind, regardless of which side of the split it sits on.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvaluateError::Engine(err) => err.kind(),
            EvaluateError::FailFast { error, .. } => error.kind(),
        }
    }
}
