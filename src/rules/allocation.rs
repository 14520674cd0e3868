use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::CancelToken;
use crate::error::{Error, Phase, RuleError};
use crate::types::EvalContext;

use super::{RuleFamily, RuleMeta};

/// How an [`AllocationRule`] splits its source value across targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// Distribute by percentage; the amounts must sum to 100.
    #[default]
    Percentage,
    /// Distribute fixed amounts, unrelated to the source value.
    Fixed,
    /// Distribute proportionally to the amounts.
    Weighted,
    /// Distribute equally among all targets.
    Equal,
    /// Distribute by ratio (e.g. 2:3:5). Same maths as weighted.
    Ratio,
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AllocationStrategy::Percentage => "percentage",
            AllocationStrategy::Fixed => "fixed",
            AllocationStrategy::Weighted => "weighted",
            AllocationStrategy::Equal => "equal",
            AllocationStrategy::Ratio => "ratio",
        };
        write!(f, "{s}")
    }
}

impl FromStr for AllocationStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "percentage" => Ok(AllocationStrategy::Percentage),
            "fixed" => Ok(AllocationStrategy::Fixed),
            "weighted" => Ok(AllocationStrategy::Weighted),
            "equal" => Ok(AllocationStrategy::Equal),
            "ratio" => Ok(AllocationStrategy::Ratio),
            other => Err(Error::InvalidRule(format!(
                "unknown allocation strategy '{other}'"
            ))),
        }
    }
}

/// A single allocation destination. The meaning of `amount` depends on the
/// strategy: a percentage, a fixed amount, a weight, or a ratio part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationTarget {
    /// The context key to write.
    pub key: String,
    pub amount: f64,
}

/// Configuration for an [`AllocationRule`].
#[derive(Debug, Clone, Default)]
pub struct AllocationConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub deps: Vec<String>,

    /// The context key holding the value to allocate.
    pub source: String,

    pub strategy: AllocationStrategy,

    pub targets: Vec<AllocationTarget>,

    /// Optional context key for the rounding remainder.
    pub remainder: Option<String>,

    /// Decimal precision for each share. `0` falls back to the default of 2.
    pub precision: u32,
}

/// Distributes a source value across multiple targets.
#[derive(Debug)]
pub struct AllocationRule {
    meta: RuleMeta,
    source: String,
    strategy: AllocationStrategy,
    targets: Vec<AllocationTarget>,
    remainder: Option<String>,
    precision: u32,
}

impl AllocationRule {
    /// Validate the configuration and build the rule.
    ///
    /// Percentage amounts are checked at construction; weighted and ratio
    /// totals defer to evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRule`] for missing fields or negative
    /// amounts, and [`Error::AllocationSum`] when percentages do not sum
    /// to 100.
    pub fn new(config: AllocationConfig) -> Result<Self, Error> {
        if config.id.is_empty() {
            return Err(Error::InvalidRule("allocation rule requires an id".into()));
        }
        if config.source.is_empty() {
            return Err(Error::InvalidRule(format!(
                "allocation rule '{}' requires a source",
                config.id
            )));
        }
        if config.targets.is_empty() {
            return Err(Error::InvalidRule(format!(
                "allocation rule '{}' requires at least one target",
                config.id
            )));
        }

        match config.strategy {
            AllocationStrategy::Percentage => {
                let sum: f64 = config.targets.iter().map(|t| t.amount).sum();
                if (sum - 100.0).abs() > 1e-4 {
                    return Err(Error::AllocationSum(format!(
                        "allocation rule '{}' percentages sum to {sum:.2}, not 100",
                        config.id
                    )));
                }
            }
            AllocationStrategy::Equal => {}
            AllocationStrategy::Fixed
            | AllocationStrategy::Weighted
            | AllocationStrategy::Ratio => {
                for target in &config.targets {
                    if target.amount < 0.0 {
                        return Err(Error::InvalidRule(format!(
                            "allocation rule '{}' has a negative amount for '{}'",
                            config.id, target.key
                        )));
                    }
                }
            }
        }

        let precision = if config.precision == 0 {
            2
        } else {
            config.precision
        };

        Ok(Self {
            meta: RuleMeta {
                id: config.id,
                name: config.name,
                description: config.description,
                deps: config.deps,
            },
            source: config.source,
            strategy: config.strategy,
            targets: config.targets,
            remainder: config.remainder,
            precision,
        })
    }

    /// Build the rule, panicking on an invalid configuration.
    ///
    /// # Panics
    ///
    /// Panics if [`new`](Self::new) would return an error.
    #[must_use]
    pub fn must(config: AllocationConfig) -> Self {
        match Self::new(config) {
            Ok(rule) => rule,
            Err(err) => panic!("{err}"),
        }
    }

    #[must_use]
    pub fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn strategy(&self) -> AllocationStrategy {
        self.strategy
    }

    #[must_use]
    pub fn targets(&self) -> &[AllocationTarget] {
        &self.targets
    }

    /// Split the source value and write each share, plus the remainder when
    /// a remainder key is configured and the remainder is non-zero.
    ///
    /// # Errors
    ///
    /// Wraps a missing or non-numeric source in a [`RuleError`].
    pub fn evaluate(&self, _cancel: &CancelToken, ctx: &EvalContext) -> Result<(), RuleError> {
        let source = ctx.get_f64(&self.source).map_err(|cause| {
            RuleError::new(
                &self.meta.id,
                Some(RuleFamily::Allocation),
                Phase::Evaluate,
                cause,
            )
        })?;

        let (shares, remainder) = self.calculate(source);

        for (target, share) in self.targets.iter().zip(&shares) {
            ctx.set(target.key.clone(), *share);
        }

        if let Some(remainder_key) = &self.remainder
            && remainder != 0.0
        {
            ctx.set(remainder_key.clone(), remainder);
        }

        Ok(())
    }

    /// Per-target shares plus the remainder `source - sum(shares)`.
    #[allow(clippy::cast_precision_loss)]
    fn calculate(&self, source: f64) -> (Vec<f64>, f64) {
        let n = self.targets.len();
        let mut shares = vec![0.0; n];

        match self.strategy {
            AllocationStrategy::Percentage => {
                let mut total = 0.0;
                for (i, target) in self.targets.iter().enumerate() {
                    shares[i] = self.round(source * target.amount / 100.0);
                    total += shares[i];
                }
                (shares, source - total)
            }

            AllocationStrategy::Fixed => {
                let mut total = 0.0;
                for (i, target) in self.targets.iter().enumerate() {
                    shares[i] = self.round(target.amount);
                    total += shares[i];
                }
                (shares, source - total)
            }

            AllocationStrategy::Weighted | AllocationStrategy::Ratio => {
                let total_weight: f64 = self.targets.iter().map(|t| t.amount).sum();
                if total_weight == 0.0 {
                    return (shares, source);
                }
                let mut total = 0.0;
                for (i, target) in self.targets.iter().enumerate() {
                    shares[i] = self.round(source * target.amount / total_weight);
                    total += shares[i];
                }
                (shares, source - total)
            }

            AllocationStrategy::Equal => {
                let each = self.round(source / n as f64);
                let mut total = 0.0;
                for share in &mut shares {
                    *share = each;
                    total += each;
                }
                (shares, source - total)
            }
        }
    }

    /// Round half away from zero to the configured precision.
    fn round(&self, value: f64) -> f64 {
        let multiplier = 10_f64.powi(i32::try_from(self.precision).unwrap_or(i32::MAX));
        (value * multiplier).round() / multiplier
    }
}
