use crate::engine::CancelToken;
use crate::error::{Error, Phase, RuleError};
use crate::types::{BuildupOperation, EvalContext};

use super::{RuleFamily, RuleMeta};

/// Configuration for a [`BuildupRule`].
#[derive(Debug, Clone, Default)]
pub struct BuildupConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub deps: Vec<String>,

    /// The buildup accumulator name, created on first use.
    pub buildup: String,

    pub operation: BuildupOperation,

    /// The context key holding the value to add. Required for every
    /// operation except [`BuildupOperation::Count`].
    pub source: Option<String>,

    /// Initial value for a newly created accumulator. A zero initial is
    /// replaced with the operation's neutral element: `+inf` for min,
    /// `-inf` for max, `1` for product.
    pub initial: f64,

    /// Optional context key that receives the accumulator's current value
    /// after each add.
    pub target: Option<String>,
}

/// Feeds a named accumulator and optionally publishes its running value.
#[derive(Debug)]
pub struct BuildupRule {
    meta: RuleMeta,
    buildup: String,
    operation: BuildupOperation,
    source: Option<String>,
    initial: f64,
    target: Option<String>,
}

impl BuildupRule {
    /// Validate the configuration and build the rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRule`] when `id` or `buildup` is missing, or
    /// when `source` is absent for a non-count operation.
    pub fn new(config: BuildupConfig) -> Result<Self, Error> {
        if config.id.is_empty() {
            return Err(Error::InvalidRule("buildup rule requires an id".into()));
        }
        if config.buildup.is_empty() {
            return Err(Error::InvalidRule(format!(
                "buildup rule '{}' requires a buildup name",
                config.id
            )));
        }
        if config.source.as_deref().unwrap_or_default().is_empty()
            && config.operation != BuildupOperation::Count
        {
            return Err(Error::InvalidRule(format!(
                "buildup rule '{}' requires a source (except for count)",
                config.id
            )));
        }

        let initial = if config.initial == 0.0 {
            match config.operation {
                BuildupOperation::Min => f64::INFINITY,
                BuildupOperation::Max => f64::NEG_INFINITY,
                BuildupOperation::Product => 1.0,
                _ => config.initial,
            }
        } else {
            config.initial
        };

        Ok(Self {
            meta: RuleMeta {
                id: config.id,
                name: config.name,
                description: config.description,
                deps: config.deps,
            },
            buildup: config.buildup,
            operation: config.operation,
            source: config.source,
            initial,
            target: config.target,
        })
    }

    /// Build the rule, panicking on an invalid configuration.
    ///
    /// # Panics
    ///
    /// Panics if [`new`](Self::new) would return an error.
    #[must_use]
    pub fn must(config: BuildupConfig) -> Self {
        match Self::new(config) {
            Ok(rule) => rule,
            Err(err) => panic!("{err}"),
        }
    }

    #[must_use]
    pub fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    /// The accumulator this rule feeds.
    #[must_use]
    pub fn buildup_name(&self) -> &str {
        &self.buildup
    }

    /// Read the source value (count ignores it and adds 1), feed the
    /// accumulator, and publish the current value when a target is set.
    ///
    /// # Errors
    ///
    /// Wraps a missing or non-numeric source in a [`RuleError`].
    pub fn evaluate(&self, _cancel: &CancelToken, ctx: &EvalContext) -> Result<(), RuleError> {
        let value = if self.operation == BuildupOperation::Count {
            1.0
        } else {
            let source = self.source.as_deref().unwrap_or_default();
            ctx.get_f64(source).map_err(|cause| {
                RuleError::new(
                    &self.meta.id,
                    Some(RuleFamily::Buildup),
                    Phase::Evaluate,
                    cause,
                )
            })?
        };

        let buildup = ctx.get_or_create_buildup(&self.buildup, self.operation, self.initial);
        buildup.add(value);

        if let Some(target) = &self.target {
            ctx.set(target.clone(), buildup.current());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sum_rule(id: &str, target: Option<&str>) -> BuildupRule {
        BuildupRule::must(BuildupConfig {
            id: id.into(),
            buildup: "total".into(),
            operation: BuildupOperation::Sum,
            source: Some("value".into()),
            target: target.map(Into::into),
            ..Default::default()
        })
    }

    #[test]
    fn sum_accumulates_across_evaluations() {
        let ctx = EvalContext::new();
        let rule = sum_rule("add", None);

        ctx.set("value", 10.0);
        rule.evaluate(&CancelToken::new(), &ctx).unwrap();
        ctx.set("value", 20.0);
        rule.evaluate(&CancelToken::new(), &ctx).unwrap();

        assert_eq!(ctx.buildup("total").unwrap().current(), 30.0);
        assert_eq!(ctx.buildup("total").unwrap().count(), 2);
    }

    #[test]
    fn target_receives_running_value() {
        let ctx = EvalContext::new();
        let rule = sum_rule("add", Some("running"));

        ctx.set("value", 5.0);
        rule.evaluate(&CancelToken::new(), &ctx).unwrap();
        assert_eq!(ctx.get_f64("running").unwrap(), 5.0);

        ctx.set("value", 7.0);
        rule.evaluate(&CancelToken::new(), &ctx).unwrap();
        assert_eq!(ctx.get_f64("running").unwrap(), 12.0);
    }

    #[test]
    fn count_needs_no_source() {
        let rule = BuildupRule::must(BuildupConfig {
            id: "tick".into(),
            buildup: "events".into(),
            operation: BuildupOperation::Count,
            target: Some("seen".into()),
            ..Default::default()
        });

        let ctx = EvalContext::new();
        rule.evaluate(&CancelToken::new(), &ctx).unwrap();
        rule.evaluate(&CancelToken::new(), &ctx).unwrap();
        rule.evaluate(&CancelToken::new(), &ctx).unwrap();
        assert_eq!(ctx.get_f64("seen").unwrap(), 3.0);
    }

    #[test]
    fn zero_initial_is_replaced_by_neutral_element() {
        let min = BuildupRule::must(BuildupConfig {
            id: "low".into(),
            buildup: "low".into(),
            operation: BuildupOperation::Min,
            source: Some("value".into()),
            ..Default::default()
        });

        let ctx = EvalContext::new();
        ctx.set("value", 50.0);
        min.evaluate(&CancelToken::new(), &ctx).unwrap();
        // With a zero initial the accumulator starts at +inf, so the first
        // observed value wins.
        assert_eq!(ctx.buildup("low").unwrap().current(), 50.0);
    }

    #[test]
    fn explicit_initial_is_kept() {
        let rule = BuildupRule::must(BuildupConfig {
            id: "add".into(),
            buildup: "total".into(),
            operation: BuildupOperation::Sum,
            source: Some("value".into()),
            initial: 100.0,
            ..Default::default()
        });

        let ctx = EvalContext::new();
        ctx.set("value", 1.0);
        rule.evaluate(&CancelToken::new(), &ctx).unwrap();
        assert_eq!(ctx.buildup("total").unwrap().current(), 101.0);
    }

    #[test]
    fn missing_source_is_wrapped() {
        let ctx = EvalContext::new();
        let err = sum_rule("add", None)
            .evaluate(&CancelToken::new(), &ctx)
            .unwrap_err();
        assert_eq!(err.family(), Some(RuleFamily::Buildup));
        assert_eq!(err.kind(), ErrorKind::ValueNotFound);
    }

    #[test]
    fn source_required_except_for_count() {
        let err = BuildupRule::new(BuildupConfig {
            id: "r".into(),
            buildup: "b".into(),
            operation: BuildupOperation::Sum,
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRule);

        let ok = BuildupRule::new(BuildupConfig {
            id: "r".into(),
            buildup: "b".into(),
            operation: BuildupOperation::Count,
            ..Default::default()
        });
        assert!(ok.is_ok());
    }

    #[test]
    fn missing_buildup_name_is_rejected() {
        let err = BuildupRule::new(BuildupConfig {
            id: "r".into(),
            operation: BuildupOperation::Sum,
            source: Some("v".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRule);
    }
}
