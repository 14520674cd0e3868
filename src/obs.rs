//! Observability capabilities: logging, metrics, and tracing.
//!
//! The engine emits through these traits and nothing else; no-op
//! implementations install by default, so observability is strictly opt-in.
//! [`TracingLogger`] and [`TracingTracer`] bridge to the `tracing`
//! ecosystem; metrics sinks are expected to be supplied by the host.
//!
//! Metric names emitted by the engine:
//!
//! | Name | Kind |
//! |------|------|
//! | `cortex.evaluations` | counter |
//! | `cortex.rules.failed` | counter |
//! | `cortex.evaluation.timeout` | counter |
//! | `cortex.rules.evaluated` | counter add |
//! | `cortex.evaluation.duration` | histogram (seconds) |
//! | `cortex.rule.duration` | histogram (seconds) |
//!
//! Tags: `engine=<name>`, `rule_id=<id>`.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Structured log sink.
pub trait Logger: Send + Sync {
    fn debug(&self, msg: &str, fields: &[(&str, &str)]);
    fn info(&self, msg: &str, fields: &[(&str, &str)]);
    fn warn(&self, msg: &str, fields: &[(&str, &str)]);
    fn error(&self, msg: &str, err: &dyn StdError, fields: &[(&str, &str)]);
}

/// Metrics sink.
pub trait Metrics: Send + Sync {
    /// Increment a counter by one.
    fn incr(&self, name: &str, tags: &[(&str, &str)]);
    /// Add an amount to a counter.
    fn add(&self, name: &str, value: f64, tags: &[(&str, &str)]);
    /// Record a histogram observation.
    fn histogram(&self, name: &str, value: f64, tags: &[(&str, &str)]);
}

/// Span factory.
pub trait Tracer: Send + Sync {
    fn start_span(&self, name: &str, attrs: &[(&str, &str)]) -> Box<dyn Span>;
}

/// An in-flight span, ended exactly once with the outcome.
pub trait Span: Send {
    fn end(self: Box<Self>, err: Option<&dyn StdError>);
}

struct NopLogger;

impl Logger for NopLogger {
    fn debug(&self, _msg: &str, _fields: &[(&str, &str)]) {}
    fn info(&self, _msg: &str, _fields: &[(&str, &str)]) {}
    fn warn(&self, _msg: &str, _fields: &[(&str, &str)]) {}
    fn error(&self, _msg: &str, _err: &dyn StdError, _fields: &[(&str, &str)]) {}
}

struct NopMetrics;

impl Metrics for NopMetrics {
    fn incr(&self, _name: &str, _tags: &[(&str, &str)]) {}
    fn add(&self, _name: &str, _value: f64, _tags: &[(&str, &str)]) {}
    fn histogram(&self, _name: &str, _value: f64, _tags: &[(&str, &str)]) {}
}

struct NopTracer;

struct NopSpan;

impl Tracer for NopTracer {
    fn start_span(&self, _name: &str, _attrs: &[(&str, &str)]) -> Box<dyn Span> {
        Box::new(NopSpan)
    }
}

impl Span for NopSpan {
    fn end(self: Box<Self>, _err: Option<&dyn StdError>) {}
}

/// The bundle of observability capabilities used by an engine.
///
/// Capabilities left unset keep their no-op defaults.
#[derive(Clone)]
pub struct Observability {
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn Metrics>,
    tracer: Arc<dyn Tracer>,
}

impl Default for Observability {
    fn default() -> Self {
        Self {
            logger: Arc::new(NopLogger),
            metrics: Arc::new(NopMetrics),
            tracer: Arc::new(NopTracer),
        }
    }
}

impl Observability {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: impl Metrics + 'static) -> Self {
        self.metrics = Arc::new(metrics);
        self
    }

    #[must_use]
    pub fn with_tracer(mut self, tracer: impl Tracer + 'static) -> Self {
        self.tracer = Arc::new(tracer);
        self
    }

    #[must_use]
    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    #[must_use]
    pub fn metrics(&self) -> &dyn Metrics {
        self.metrics.as_ref()
    }

    #[must_use]
    pub fn tracer(&self) -> &dyn Tracer {
        self.tracer.as_ref()
    }
}

impl fmt::Debug for Observability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Observability")
    }
}

/// [`Logger`] bridging to the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, msg: &str, fields: &[(&str, &str)]) {
        tracing::debug!(target: "cortex", ?fields, "{msg}");
    }

    fn info(&self, msg: &str, fields: &[(&str, &str)]) {
        tracing::info!(target: "cortex", ?fields, "{msg}");
    }

    fn warn(&self, msg: &str, fields: &[(&str, &str)]) {
        tracing::warn!(target: "cortex", ?fields, "{msg}");
    }

    fn error(&self, msg: &str, err: &dyn StdError, fields: &[(&str, &str)]) {
        tracing::error!(target: "cortex", error = %err, ?fields, "{msg}");
    }
}

/// [`Tracer`] bridging to `tracing` spans.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTracer;

struct TracingSpan {
    span: tracing::Span,
}

impl Tracer for TracingTracer {
    fn start_span(&self, name: &str, attrs: &[(&str, &str)]) -> Box<dyn Span> {
        let span = tracing::info_span!(target: "cortex", "cortex.span", op = %name, ?attrs);
        Box::new(TracingSpan { span })
    }
}

impl Span for TracingSpan {
    fn end(self: Box<Self>, err: Option<&dyn StdError>) {
        if let Some(err) = err {
            let _guard = self.span.enter();
            tracing::error!(target: "cortex", error = %err, "span ended with error");
        }
    }
}
