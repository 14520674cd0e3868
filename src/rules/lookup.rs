use crate::engine::CancelToken;
use crate::error::{Error, Phase, RuleError};
use crate::types::{EvalContext, Value};

use super::{RuleFamily, RuleMeta};

/// Configuration for a [`LookupRule`].
#[derive(Debug, Clone, Default)]
pub struct LookupConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub deps: Vec<String>,

    /// The lookup table name (must be registered with the engine or the
    /// context).
    pub table: String,

    /// The context key whose value is used as the lookup key.
    pub key: String,

    /// The context key to store the result.
    pub target: String,

    /// The value to store when the key is not found. Ignored when
    /// `required` is set; an absent default stores [`Value::Null`].
    pub default: Option<Value>,

    /// Error with [`Error::KeyNotFound`] when the lookup misses.
    pub required: bool,
}

/// Retrieves a value from a registered lookup table.
#[derive(Debug)]
pub struct LookupRule {
    meta: RuleMeta,
    table: String,
    key: String,
    target: String,
    default: Option<Value>,
    required: bool,
}

impl LookupRule {
    /// Validate the configuration and build the rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRule`] when `id`, `table`, `key`, or
    /// `target` is missing.
    pub fn new(config: LookupConfig) -> Result<Self, Error> {
        if config.id.is_empty() {
            return Err(Error::InvalidRule("lookup rule requires an id".into()));
        }
        if config.table.is_empty() {
            return Err(Error::InvalidRule(format!(
                "lookup rule '{}' requires a table",
                config.id
            )));
        }
        if config.key.is_empty() {
            return Err(Error::InvalidRule(format!(
                "lookup rule '{}' requires a key",
                config.id
            )));
        }
        if config.target.is_empty() {
            return Err(Error::InvalidRule(format!(
                "lookup rule '{}' requires a target",
                config.id
            )));
        }

        Ok(Self {
            meta: RuleMeta {
                id: config.id,
                name: config.name,
                description: config.description,
                deps: config.deps,
            },
            table: config.table,
            key: config.key,
            target: config.target,
            default: config.default,
            required: config.required,
        })
    }

    /// Build the rule, panicking on an invalid configuration.
    ///
    /// # Panics
    ///
    /// Panics if [`new`](Self::new) would return an error.
    #[must_use]
    pub fn must(config: LookupConfig) -> Self {
        match Self::new(config) {
            Ok(rule) => rule,
            Err(err) => panic!("{err}"),
        }
    }

    #[must_use]
    pub fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    /// The lookup table this rule queries.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fetch the lookup key from the context, query the table, and store
    /// the result (or the default).
    ///
    /// # Errors
    ///
    /// [`Error::ValueNotFound`] when the source key is absent,
    /// [`Error::LookupNotFound`] when the table is unknown, and
    /// [`Error::KeyNotFound`] on a required miss, all wrapped in a
    /// [`RuleError`].
    pub fn evaluate(&self, _cancel: &CancelToken, ctx: &EvalContext) -> Result<(), RuleError> {
        let key = ctx
            .get(&self.key)
            .ok_or_else(|| self.wrap(Error::ValueNotFound(self.key.clone())))?;

        let found = ctx
            .lookup(&self.table, &key)
            .map_err(|cause| self.wrap(cause))?;

        let value = match found {
            Some(value) => value,
            None if self.required => {
                return Err(self.wrap(Error::KeyNotFound {
                    table: self.table.clone(),
                    key: key.to_string(),
                }));
            }
            None => self.default.clone().unwrap_or_default(),
        };

        ctx.set(self.target.clone(), value);
        Ok(())
    }

    fn wrap(&self, cause: Error) -> RuleError {
        RuleError::new(&self.meta.id, Some(RuleFamily::Lookup), Phase::Evaluate, cause)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::ErrorKind;
    use crate::types::MapLookup;

    fn rates_ctx() -> EvalContext {
        let ctx = EvalContext::new();
        ctx.register_lookup(MapLookup::new(
            "discounts",
            HashMap::from([("gold".to_owned(), 0.2), ("silver".to_owned(), 0.1)]),
        ));
        ctx
    }

    fn rule(required: bool, default: Option<Value>) -> LookupRule {
        LookupRule::must(LookupConfig {
            id: "get-discount".into(),
            table: "discounts".into(),
            key: "tier".into(),
            target: "discount".into(),
            default,
            required,
            ..Default::default()
        })
    }

    #[test]
    fn hit_stores_the_value() {
        let ctx = rates_ctx();
        ctx.set("tier", "gold");
        rule(false, None).evaluate(&CancelToken::new(), &ctx).unwrap();
        assert_eq!(ctx.get_f64("discount").unwrap(), 0.2);
    }

    #[test]
    fn missing_source_key_errors() {
        let ctx = rates_ctx();
        let err = rule(false, None)
            .evaluate(&CancelToken::new(), &ctx)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueNotFound);
        assert_eq!(err.family(), Some(RuleFamily::Lookup));
    }

    #[test]
    fn unknown_table_errors() {
        let ctx = EvalContext::new();
        ctx.set("tier", "gold");
        let err = rule(false, None)
            .evaluate(&CancelToken::new(), &ctx)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LookupNotFound);
    }

    #[test]
    fn required_miss_is_key_not_found() {
        let ctx = rates_ctx();
        ctx.set("tier", "bronze");
        let err = rule(true, None)
            .evaluate(&CancelToken::new(), &ctx)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyNotFound);
        assert!(!ctx.has("discount"));
    }

    #[test]
    fn optional_miss_stores_the_default() {
        let ctx = rates_ctx();
        ctx.set("tier", "bronze");
        rule(false, Some(Value::Number(0.0)))
            .evaluate(&CancelToken::new(), &ctx)
            .unwrap();
        assert_eq!(ctx.get_f64("discount").unwrap(), 0.0);
    }

    #[test]
    fn optional_miss_without_default_stores_null() {
        let ctx = rates_ctx();
        ctx.set("tier", "bronze");
        rule(false, None).evaluate(&CancelToken::new(), &ctx).unwrap();
        assert_eq!(ctx.get("discount"), Some(Value::Null));
    }

    #[test]
    fn required_fields_are_validated() {
        for config in [
            LookupConfig::default(),
            LookupConfig {
                id: "r".into(),
                key: "k".into(),
                target: "t".into(),
                ..Default::default()
            },
            LookupConfig {
                id: "r".into(),
                table: "tbl".into(),
                target: "t".into(),
                ..Default::default()
            },
            LookupConfig {
                id: "r".into(),
                table: "tbl".into(),
                key: "k".into(),
                ..Default::default()
            },
        ] {
            let err = LookupRule::new(config).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRule);
        }
    }
}
