use std::sync::Arc;
use std::time::Duration;

use super::context::EvalContext;
use crate::error::RuleError;

/// Outcome of a single [`Engine::evaluate`](crate::Engine::evaluate) call.
#[derive(Debug, Clone)]
#[must_use]
pub struct EvalResult {
    id: String,
    success: bool,
    rules_evaluated: i64,
    rules_failed: usize,
    errors: Vec<RuleError>,
    duration: Duration,
    halted_by: Option<String>,
    context: Arc<EvalContext>,
}

impl EvalResult {
    pub(crate) fn new(context: &Arc<EvalContext>, errors: Vec<RuleError>) -> Self {
        Self {
            id: context.id().to_owned(),
            success: errors.is_empty() && !context.is_halted(),
            rules_evaluated: context.rules_evaluated(),
            rules_failed: errors.len(),
            errors,
            duration: context.duration(),
            halted_by: context.halted_by(),
            context: Arc::clone(context),
        }
    }

    /// The evaluation context id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether every rule evaluated without error and nothing halted.
    #[must_use]
    pub fn success(&self) -> bool {
        self.success
    }

    /// The number of rules that ran successfully.
    #[must_use]
    pub fn rules_evaluated(&self) -> i64 {
        self.rules_evaluated
    }

    /// The number of rules that failed.
    #[must_use]
    pub fn rules_failed(&self) -> usize {
        self.rules_failed
    }

    /// All collected rule errors, in rule order.
    #[must_use]
    pub fn errors(&self) -> &[RuleError] {
        &self.errors
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// The first collected error, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&RuleError> {
        self.errors.first()
    }

    /// Rendered messages for every collected error.
    #[must_use]
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// Total evaluation time.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// The rule id that halted evaluation, if any.
    #[must_use]
    pub fn halted_by(&self) -> Option<&str> {
        self.halted_by.as_deref()
    }

    /// The final evaluation context, populated with whatever prior rules
    /// wrote even when the evaluation failed.
    #[must_use]
    pub fn context(&self) -> &Arc<EvalContext> {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Phase};
    use crate::rules::RuleFamily;

    fn rule_error(id: &str) -> RuleError {
        RuleError::new(
            id,
            Some(RuleFamily::Formula),
            Phase::Evaluate,
            Error::DivisionByZero,
        )
    }

    #[test]
    fn clean_run_is_success() {
        let ctx = Arc::new(EvalContext::new());
        ctx.inc_rules_evaluated();
        let result = EvalResult::new(&ctx, Vec::new());

        assert!(result.success());
        assert_eq!(result.id(), ctx.id());
        assert_eq!(result.rules_evaluated(), 1);
        assert_eq!(result.rules_failed(), 0);
        assert!(!result.has_errors());
        assert!(result.first_error().is_none());
        assert_eq!(result.halted_by(), None);
    }

    #[test]
    fn errors_mean_failure() {
        let ctx = Arc::new(EvalContext::new());
        let result = EvalResult::new(&ctx, vec![rule_error("a"), rule_error("b")]);

        assert!(!result.success());
        assert_eq!(result.rules_failed(), 2);
        assert_eq!(result.first_error().unwrap().rule_id(), "a");
        assert_eq!(result.error_messages().len(), 2);
    }

    #[test]
    fn halted_context_means_failure() {
        let ctx = Arc::new(EvalContext::new());
        ctx.halt("stopper");
        let result = EvalResult::new(&ctx, Vec::new());

        assert!(!result.success());
        assert_eq!(result.halted_by(), Some("stopper"));
    }
}
