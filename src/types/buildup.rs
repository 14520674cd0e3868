use std::fmt;
use std::str::FromStr;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// How a [`Buildup`] folds incoming values into its running aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildupOperation {
    /// Add values together.
    #[default]
    Sum,
    /// Keep the minimum value.
    Min,
    /// Keep the maximum value.
    Max,
    /// Running average.
    #[serde(alias = "average")]
    Avg,
    /// Count occurrences, ignoring the values themselves.
    Count,
    /// Multiply values together.
    Product,
}

impl fmt::Display for BuildupOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildupOperation::Sum => "sum",
            BuildupOperation::Min => "min",
            BuildupOperation::Max => "max",
            BuildupOperation::Avg => "avg",
            BuildupOperation::Count => "count",
            BuildupOperation::Product => "product",
        };
        write!(f, "{s}")
    }
}

impl FromStr for BuildupOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "sum" => Ok(BuildupOperation::Sum),
            "min" => Ok(BuildupOperation::Min),
            "max" => Ok(BuildupOperation::Max),
            "avg" | "average" => Ok(BuildupOperation::Avg),
            "count" => Ok(BuildupOperation::Count),
            "product" => Ok(BuildupOperation::Product),
            other => Err(Error::InvalidRule(format!(
                "unknown buildup operation '{other}'"
            ))),
        }
    }
}

/// A named running aggregate over a stream of numbers.
///
/// Internally synchronised: `add` and `current` may be called from
/// concurrent rule functions observing the same context.
#[derive(Debug)]
pub struct Buildup {
    name: String,
    operation: BuildupOperation,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    value: f64,
    count: i64,
}

impl Buildup {
    #[must_use]
    pub fn new(name: impl Into<String>, operation: BuildupOperation, initial: f64) -> Self {
        Self {
            name: name.into(),
            operation,
            state: Mutex::new(State {
                value: initial,
                count: 0,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn operation(&self) -> BuildupOperation {
        self.operation
    }

    /// Fold `value` into the aggregate.
    #[allow(clippy::cast_precision_loss)]
    pub fn add(&self, value: f64) {
        let mut state = self.state.lock();
        state.count += 1;

        match self.operation {
            BuildupOperation::Sum | BuildupOperation::Avg => state.value += value,
            BuildupOperation::Min => {
                if state.count == 1 || value < state.value {
                    state.value = value;
                }
            }
            BuildupOperation::Max => {
                if state.count == 1 || value > state.value {
                    state.value = value;
                }
            }
            BuildupOperation::Count => state.value = state.count as f64,
            BuildupOperation::Product => {
                if state.count == 1 {
                    state.value = value;
                } else {
                    state.value *= value;
                }
            }
        }
    }

    /// The current aggregate value. For [`BuildupOperation::Avg`] this is the
    /// accumulated sum divided by the number of additions.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn current(&self) -> f64 {
        let state = self.state.lock();
        if self.operation == BuildupOperation::Avg && state.count > 0 {
            return state.value / state.count as f64;
        }
        state.value
    }

    /// The number of values added so far.
    #[must_use]
    pub fn count(&self) -> i64 {
        self.state.lock().count
    }

    /// Zero the count and reset the value to `initial`.
    pub fn reset(&self, initial: f64) {
        let mut state = self.state.lock();
        state.value = initial;
        state.count = 0;
    }
}
