use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::error::{Error, EvaluateError, RuleError};
use crate::obs::Observability;
use crate::rules::Rule;
use crate::types::{Config, EvalContext, EvalMode, EvalResult, Lookup};

/// Why a [`CancelToken`] reads as cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// [`CancelToken::cancel`] was called.
    Cancelled,
    /// The token's deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelCause::Cancelled => write!(f, "cancelled"),
            CancelCause::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Cooperative cancellation handle threaded through every rule call.
///
/// Clones share the cancellation flag; deriving a child narrows the
/// deadline without widening the parent's. The engine checks the token
/// between rules; user-supplied rule functions are expected to honour it
/// but cannot be forced to.
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token with no deadline that only cancels explicitly.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// A token that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A token that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// Derive a token sharing this one's cancellation flag, with a deadline
    /// no later than `timeout` from now.
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) => existing.min(candidate),
            None => candidate,
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(deadline),
        }
    }

    /// Fire the cancellation flag. Visible to every clone and child.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cause().is_some()
    }

    /// Why the token reads as cancelled, or `None` while it is still live.
    /// Explicit cancellation takes precedence over an expired deadline.
    #[must_use]
    pub fn cause(&self) -> Option<CancelCause> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Some(CancelCause::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Some(CancelCause::DeadlineExceeded);
        }
        None
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluates rules in insertion order against a shared context.
///
/// The engine owns no background threads; all work happens on the caller's
/// thread. Concurrent `evaluate` calls on distinct contexts are safe.
#[derive(Debug)]
pub struct Engine {
    name: String,
    config: Config,
    obs: Observability,
    closed: AtomicBool,
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    rules: Vec<Arc<Rule>>,
    rule_ids: HashSet<String>,
    lookups: HashMap<String, Arc<dyn Lookup>>,
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("rules", &self.rules.len())
            .field("lookups", &self.lookups.len())
            .finish()
    }
}

impl Engine {
    /// Create an engine. A zero timeout in the configuration is normalised
    /// to "no deadline".
    #[must_use]
    pub fn new(name: impl Into<String>, mut config: Config) -> Self {
        if config.timeout == Some(Duration::ZERO) {
            config.timeout = None;
        }
        Self {
            name: name.into(),
            config,
            obs: Observability::default(),
            closed: AtomicBool::new(false),
            state: RwLock::new(State::default()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Install observability capabilities. Capabilities not set on `obs`
    /// stay no-ops.
    #[must_use]
    pub fn with_observability(mut self, obs: Observability) -> Self {
        self.obs = obs;
        self
    }

    /// Append a rule.
    ///
    /// # Errors
    ///
    /// [`Error::EngineClosed`] after [`close`](Self::close),
    /// [`Error::DuplicateRule`] on an id collision, and
    /// [`Error::InvalidRule`] when `max_rules` is reached.
    pub fn add_rule(&self, rule: impl Into<Rule>) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::EngineClosed);
        }

        let rule = rule.into();
        let mut state = self.state.write();

        if state.rule_ids.contains(rule.id()) {
            return Err(Error::DuplicateRule(rule.id().to_owned()));
        }
        if self.config.max_rules > 0 && state.rules.len() >= self.config.max_rules {
            return Err(Error::InvalidRule(format!(
                "max rules limit reached ({})",
                self.config.max_rules
            )));
        }

        state.rule_ids.insert(rule.id().to_owned());
        state.rules.push(Arc::new(rule));
        Ok(())
    }

    /// Append several rules, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// As [`add_rule`](Self::add_rule).
    pub fn add_rules(&self, rules: impl IntoIterator<Item = Rule>) -> Result<(), Error> {
        for rule in rules {
            self.add_rule(rule)?;
        }
        Ok(())
    }

    /// Register a lookup table under its own name.
    ///
    /// # Errors
    ///
    /// [`Error::EngineClosed`] after [`close`](Self::close) and
    /// [`Error::DuplicateLookup`] on a name collision.
    pub fn register_lookup<L: Lookup + 'static>(&self, lookup: L) -> Result<(), Error> {
        self.register_lookup_shared(Arc::new(lookup))
    }

    /// Register an already-shared lookup table.
    ///
    /// # Errors
    ///
    /// As [`register_lookup`](Self::register_lookup).
    pub fn register_lookup_shared(&self, lookup: Arc<dyn Lookup>) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::EngineClosed);
        }

        let mut state = self.state.write();
        let name = lookup.name().to_owned();
        if state.lookups.contains_key(&name) {
            return Err(Error::DuplicateLookup(name));
        }
        state.lookups.insert(name, lookup);
        Ok(())
    }

    /// Register several lookup tables, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// As [`register_lookup`](Self::register_lookup).
    pub fn register_lookups(
        &self,
        lookups: impl IntoIterator<Item = Arc<dyn Lookup>>,
    ) -> Result<(), Error> {
        for lookup in lookups {
            self.register_lookup_shared(lookup)?;
        }
        Ok(())
    }

    /// The number of rules.
    #[must_use]
    pub fn rules(&self) -> usize {
        self.state.read().rules.len()
    }

    /// The number of registered lookup tables.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.state.read().lookups.len()
    }

    /// Run all rules against `eval_ctx` with no caller-side cancellation.
    ///
    /// # Errors
    ///
    /// As [`evaluate_with_cancel`](Self::evaluate_with_cancel).
    pub fn evaluate(&self, eval_ctx: Arc<EvalContext>) -> Result<EvalResult, EvaluateError> {
        self.evaluate_with_cancel(&CancelToken::new(), eval_ctx)
    }

    /// Run all rules against `eval_ctx` in insertion order.
    ///
    /// The engine's lookups are registered into the context first. Between
    /// rules the driver checks the cancellation token and, when
    /// `short_circuit` is on, the context's halt flag. Errors are handled
    /// per the configured [`EvalMode`].
    ///
    /// # Errors
    ///
    /// [`EvaluateError::Engine`] for a closed engine or an expired
    /// deadline; [`EvaluateError::FailFast`] when a rule fails under
    /// fail-fast mode, carrying the partial result.
    #[allow(clippy::cast_precision_loss)]
    pub fn evaluate_with_cancel(
        &self,
        cancel: &CancelToken,
        eval_ctx: Arc<EvalContext>,
    ) -> Result<EvalResult, EvaluateError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::EngineClosed.into());
        }

        let cancel = match self.config.timeout {
            Some(timeout) => cancel.child_with_timeout(timeout),
            None => cancel.clone(),
        };

        let span = self
            .obs
            .tracer()
            .start_span("cortex.evaluate", &[("engine", &self.name)]);
        let start = Instant::now();

        let rules = {
            let state = self.state.read();
            for lookup in state.lookups.values() {
                eval_ctx.register_lookup_shared(Arc::clone(lookup));
            }
            state.rules.clone()
        };

        let mut errors: Vec<RuleError> = Vec::new();

        for rule in &rules {
            if let Some(cause) = cancel.cause() {
                self.obs
                    .metrics()
                    .incr("cortex.evaluation.timeout", &[("engine", &self.name)]);
                let err = Error::Timeout(cause);
                span.end(Some(&err));
                return Err(err.into());
            }

            if self.config.short_circuit && eval_ctx.is_halted() {
                break;
            }

            match self.evaluate_rule(&cancel, rule, &eval_ctx) {
                Ok(()) => eval_ctx.inc_rules_evaluated(),
                Err(err) => {
                    eval_ctx.inc_errors();
                    self.obs.metrics().incr(
                        "cortex.rules.failed",
                        &[("engine", &self.name), ("rule_id", rule.id())],
                    );

                    match self.config.mode {
                        EvalMode::FailFast => {
                            errors.push(err.clone());
                            let result = EvalResult::new(&eval_ctx, errors);
                            span.end(Some(&err));
                            return Err(EvaluateError::FailFast {
                                error: err,
                                result: Box::new(result),
                            });
                        }
                        EvalMode::CollectAll => errors.push(err),
                        EvalMode::ContinueOnError => {
                            self.obs.logger().error(
                                "rule evaluation failed",
                                &err,
                                &[("rule_id", rule.id())],
                            );
                            errors.push(err);
                        }
                    }
                }
            }
        }

        let duration = start.elapsed();
        span.end(None);

        if self.config.enable_metrics {
            self.obs
                .metrics()
                .incr("cortex.evaluations", &[("engine", &self.name)]);
            self.obs.metrics().add(
                "cortex.rules.evaluated",
                eval_ctx.rules_evaluated() as f64,
                &[("engine", &self.name)],
            );
            self.obs.metrics().histogram(
                "cortex.evaluation.duration",
                duration.as_secs_f64(),
                &[("engine", &self.name)],
            );
        }

        Ok(EvalResult::new(&eval_ctx, errors))
    }

    fn evaluate_rule(
        &self,
        cancel: &CancelToken,
        rule: &Rule,
        eval_ctx: &EvalContext,
    ) -> Result<(), RuleError> {
        let span = self
            .obs
            .tracer()
            .start_span("cortex.rule", &[("rule_id", rule.id())]);
        let start = Instant::now();

        let result = rule.evaluate(cancel, eval_ctx);

        let duration = start.elapsed();
        match &result {
            Ok(()) => span.end(None),
            Err(err) => span.end(Some(err)),
        }

        if self.config.enable_metrics {
            self.obs.metrics().histogram(
                "cortex.rule.duration",
                duration.as_secs_f64(),
                &[("rule_id", rule.id())],
            );
        }

        result
    }

    /// Close the engine. Subsequent mutations and evaluations fail with
    /// [`Error::EngineClosed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// A new engine with the same configuration, observability, and lookup
    /// tables, but no rules.
    #[must_use]
    pub fn clone_with_name(&self, name: impl Into<String>) -> Self {
        let clone = Engine::new(name, self.config.clone()).with_observability(self.obs.clone());
        {
            let mut clone_state = clone.state.write();
            clone_state.lookups = self.state.read().lookups.clone();
        }
        clone
    }
}
