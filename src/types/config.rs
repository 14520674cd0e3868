use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// How rule-level errors propagate to the engine result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalMode {
    /// Stop at the first error and return it with the partial result.
    #[default]
    FailFast,
    /// Evaluate every rule and collect all errors.
    CollectAll,
    /// Like [`CollectAll`](EvalMode::CollectAll), but each error is also
    /// handed to the log sink at error level.
    ContinueOnError,
}

impl fmt::Display for EvalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvalMode::FailFast => "fail_fast",
            EvalMode::CollectAll => "collect_all",
            EvalMode::ContinueOnError => "continue_on_error",
        };
        write!(f, "{s}")
    }
}

impl FromStr for EvalMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "fail_fast" => Ok(EvalMode::FailFast),
            "collect_all" => Ok(EvalMode::CollectAll),
            "continue_on_error" => Ok(EvalMode::ContinueOnError),
            other => Err(Error::InvalidRule(format!("unknown eval mode '{other}'"))),
        }
    }
}

/// Engine behaviour knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Error handling behaviour.
    pub mode: EvalMode,

    /// Deadline for an entire `evaluate` call. `None` means no deadline.
    pub timeout: Option<Duration>,

    /// Honour [`EvalContext::halt`](super::EvalContext::halt) between rules.
    pub short_circuit: bool,

    /// Emit evaluation metrics through the metrics sink.
    pub enable_metrics: bool,

    /// Cap on the rule-list length. `0` means unlimited.
    pub max_rules: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: EvalMode::FailFast,
            timeout: None,
            short_circuit: true,
            enable_metrics: true,
            max_rules: 0,
        }
    }
}

impl Config {
    /// Check the configuration for contradictory settings.
    ///
    /// A zero timeout is rejected: "no deadline" is spelled `None`. The
    /// negative timeouts and rule caps of looser hosts are unrepresentable
    /// here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRule`] on a zero timeout.
    pub fn validate(&self) -> Result<(), Error> {
        if self.timeout == Some(Duration::ZERO) {
            return Err(Error::InvalidRule(
                "timeout must be positive; use None for no deadline".into(),
            ));
        }
        Ok(())
    }
}
