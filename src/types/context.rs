use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use super::buildup::{Buildup, BuildupOperation};
use super::lookup::Lookup;
use super::value::Value;
use crate::error::Error;
use crate::expr::ValueGetter;

/// Shared, mutable state threaded through a single evaluate call.
///
/// All map access goes through one reader-writer lock, so the halt flag and
/// its source are always observed as a coherent pair. Counters are atomic
/// and only ever grow for the life of the context.
pub struct EvalContext {
    id: String,
    inner: RwLock<Inner>,
    rules_evaluated: AtomicI64,
    err_count: AtomicI64,
    start_time: Instant,
}

#[derive(Default)]
struct Inner {
    values: HashMap<String, Value>,
    buildups: HashMap<String, Arc<Buildup>>,
    lookups: HashMap<String, Arc<dyn Lookup>>,
    metadata: HashMap<String, String>,
    halted: bool,
    halted_by: Option<String>,
}

static CONTEXT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generate_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let n = CONTEXT_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("eval-{nanos}-{n}")
}

impl EvalContext {
    /// Create a context with a generated id (wall time plus a process-wide
    /// monotonic counter).
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(generate_id())
    }

    /// Create a context with a caller-chosen id.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inner: RwLock::new(Inner::default()),
            rules_evaluated: AtomicI64::new(0),
            err_count: AtomicI64::new(0),
            start_time: Instant::now(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Store a value under `key`.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.write().values.insert(key.into(), value.into());
    }

    /// Read the value under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().values.get(key).cloned()
    }

    /// Remove the value under `key`.
    pub fn delete(&self, key: &str) {
        self.inner.write().values.remove(key);
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.inner.read().values.contains_key(key)
    }

    /// All value keys, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().values.keys().cloned().collect()
    }

    /// A snapshot copy of the value map. Mutating the returned map does not
    /// affect the live context.
    #[must_use]
    pub fn values(&self) -> HashMap<String, Value> {
        self.inner.read().values.clone()
    }

    /// Read the value under `key` projected to a concrete type.
    ///
    /// # Errors
    ///
    /// [`Error::ValueNotFound`] if the key is absent, [`Error::TypeMismatch`]
    /// if the value has the wrong shape.
    pub fn get_as<T>(&self, key: &str) -> Result<T, Error>
    where
        T: TryFrom<Value, Error = Error>,
    {
        let value = self
            .get(key)
            .ok_or_else(|| Error::ValueNotFound(key.to_owned()))?;
        T::try_from(value)
    }

    /// Read a numeric value as `f64`. See [`get_as`](Self::get_as).
    pub fn get_f64(&self, key: &str) -> Result<f64, Error> {
        self.get_as(key)
    }

    /// Read a numeric value as `i64`, truncating. See [`get_as`](Self::get_as).
    pub fn get_i64(&self, key: &str) -> Result<i64, Error> {
        self.get_as(key)
    }

    /// Read a string value. See [`get_as`](Self::get_as).
    pub fn get_string(&self, key: &str) -> Result<String, Error> {
        self.get_as(key)
    }

    /// Read a boolean value. See [`get_as`](Self::get_as).
    pub fn get_bool(&self, key: &str) -> Result<bool, Error> {
        self.get_as(key)
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.write().metadata.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<String> {
        self.inner.read().metadata.get(key).cloned()
    }

    /// Register a lookup table under its own name.
    pub fn register_lookup<L: Lookup + 'static>(&self, lookup: L) {
        self.register_lookup_shared(Arc::new(lookup));
    }

    /// Register an already-shared lookup table under its own name.
    pub fn register_lookup_shared(&self, lookup: Arc<dyn Lookup>) {
        let name = lookup.name().to_owned();
        self.inner.write().lookups.insert(name, lookup);
    }

    /// Query the named lookup table.
    ///
    /// Returns `Ok(None)` for a registered table with no matching entry.
    ///
    /// # Errors
    ///
    /// [`Error::LookupNotFound`] if no table with that name is registered.
    pub fn lookup(&self, table: &str, key: &Value) -> Result<Option<Value>, Error> {
        let lookup = self
            .inner
            .read()
            .lookups
            .get(table)
            .cloned()
            .ok_or_else(|| Error::LookupNotFound(table.to_owned()))?;
        Ok(lookup.get(key))
    }

    /// The buildup registered under `key`, if any.
    #[must_use]
    pub fn buildup(&self, key: &str) -> Option<Arc<Buildup>> {
        self.inner.read().buildups.get(key).cloned()
    }

    /// Return the existing buildup under `key`, or create one with the given
    /// operation and initial value. The check and insert happen under a
    /// single write lock; a later call with a different operation or initial
    /// returns the original accumulator unchanged.
    pub fn get_or_create_buildup(
        &self,
        key: &str,
        operation: BuildupOperation,
        initial: f64,
    ) -> Arc<Buildup> {
        self.inner
            .write()
            .buildups
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Buildup::new(key, operation, initial)))
            .clone()
    }

    /// Signal that evaluation should stop. The first halter wins:
    /// `halted_by` records the rule that transitioned the context into the
    /// halted state, and later calls leave it untouched.
    pub fn halt(&self, rule_id: &str) {
        let mut inner = self.inner.write();
        if !inner.halted {
            inner.halted = true;
            inner.halted_by = Some(rule_id.to_owned());
        }
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.inner.read().halted
    }

    /// The rule id that halted evaluation, if any.
    #[must_use]
    pub fn halted_by(&self) -> Option<String> {
        self.inner.read().halted_by.clone()
    }

    pub(crate) fn inc_rules_evaluated(&self) {
        self.rules_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_errors(&self) {
        self.err_count.fetch_add(1, Ordering::Relaxed);
    }

    /// The number of rules evaluated successfully so far.
    #[must_use]
    pub fn rules_evaluated(&self) -> i64 {
        self.rules_evaluated.load(Ordering::Relaxed)
    }

    /// The number of rule errors recorded so far.
    #[must_use]
    pub fn error_count(&self) -> i64 {
        self.err_count.load(Ordering::Relaxed)
    }

    /// Time elapsed since the context was created.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloning produces an independent context for a fresh evaluation: new id,
/// deep-copied values and metadata, shared lookup tables, no buildups, reset
/// counters, and a new start time.
impl Clone for EvalContext {
    fn clone(&self) -> Self {
        let inner = self.inner.read();
        let clone = Self::new();
        {
            let mut clone_inner = clone.inner.write();
            clone_inner.values = inner.values.clone();
            clone_inner.metadata = inner.metadata.clone();
            clone_inner.lookups = inner.lookups.clone();
        }
        clone
    }
}

impl ValueGetter for EvalContext {
    fn get(&self, key: &str) -> Option<Value> {
        EvalContext::get(self, key)
    }
}

impl fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("EvalContext")
            .field("id", &self.id)
            .field("values", &inner.values.len())
            .field("buildups", &inner.buildups.len())
            .field("lookups", &inner.lookups.len())
            .field("halted", &inner.halted)
            .field("rules_evaluated", &self.rules_evaluated())
            .field("error_count", &self.error_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::types::lookup::MapLookup;

    #[test]
    fn set_get_delete_has() {
        let ctx = EvalContext::new();
        ctx.set("x", 10.0);
        assert_eq!(ctx.get("x"), Some(Value::Number(10.0)));
        assert!(ctx.has("x"));

        ctx.delete("x");
        assert_eq!(ctx.get("x"), None);
        assert!(!ctx.has("x"));
    }

    #[test]
    fn keys_and_values_snapshot() {
        let ctx = EvalContext::new();
        ctx.set("a", 1.0);
        ctx.set("b", "two");

        let mut keys = ctx.keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_owned(), "b".to_owned()]);

        let mut snapshot = ctx.values();
        snapshot.insert("c".to_owned(), Value::Bool(true));
        assert!(!ctx.has("c"));
    }

    #[test]
    fn typed_getters() {
        let ctx = EvalContext::new();
        ctx.set("f", 1.5);
        ctx.set("i", 42_i64);
        ctx.set("s", "hello");
        ctx.set("b", true);

        assert_eq!(ctx.get_f64("f").unwrap(), 1.5);
        assert_eq!(ctx.get_i64("i").unwrap(), 42);
        assert_eq!(ctx.get_string("s").unwrap(), "hello");
        assert!(ctx.get_bool("b").unwrap());
    }

    #[test]
    fn typed_getter_missing_key_is_value_not_found() {
        let ctx = EvalContext::new();
        assert!(matches!(
            ctx.get_f64("missing"),
            Err(Error::ValueNotFound(_))
        ));
    }

    #[test]
    fn typed_getter_wrong_shape_is_type_mismatch() {
        let ctx = EvalContext::new();
        ctx.set("s", "text");
        assert!(matches!(
            ctx.get_f64("s"),
            Err(Error::TypeMismatch { .. })
        ));
        ctx.set("n", 1.0);
        assert!(matches!(
            ctx.get_bool("n"),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn generic_getter() {
        let ctx = EvalContext::new();
        ctx.set("n", 7_i32);
        let n: i64 = ctx.get_as("n").unwrap();
        assert_eq!(n, 7);
    }

    #[test]
    fn metadata_round_trip() {
        let ctx = EvalContext::new();
        ctx.set_metadata("tenant", "acme");
        assert_eq!(ctx.metadata("tenant"), Some("acme".to_owned()));
        assert_eq!(ctx.metadata("other"), None);
    }

    #[test]
    fn lookup_unknown_table_errors() {
        let ctx = EvalContext::new();
        let err = ctx.lookup("nope", &Value::from("k")).unwrap_err();
        assert!(matches!(err, Error::LookupNotFound(_)));
    }

    #[test]
    fn lookup_registered_table() {
        let ctx = EvalContext::new();
        ctx.register_lookup(MapLookup::new(
            "codes",
            HashMap::from([("a".to_owned(), 1.0)]),
        ));
        assert_eq!(
            ctx.lookup("codes", &Value::from("a")).unwrap(),
            Some(Value::Number(1.0))
        );
        assert_eq!(ctx.lookup("codes", &Value::from("z")).unwrap(), None);
    }

    #[test]
    fn get_or_create_buildup_is_idempotent() {
        let ctx = EvalContext::new();
        let first = ctx.get_or_create_buildup("total", BuildupOperation::Sum, 0.0);
        first.add(5.0);

        // A second call with a different operation returns the original.
        let second = ctx.get_or_create_buildup("total", BuildupOperation::Max, 99.0);
        assert_eq!(second.operation(), BuildupOperation::Sum);
        assert_eq!(second.current(), 5.0);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn halt_first_halter_wins() {
        let ctx = EvalContext::new();
        assert!(!ctx.is_halted());
        assert_eq!(ctx.halted_by(), None);

        ctx.halt("rule-a");
        ctx.halt("rule-b");
        assert!(ctx.is_halted());
        assert_eq!(ctx.halted_by(), Some("rule-a".to_owned()));
    }

    #[test]
    fn counters_grow() {
        let ctx = EvalContext::new();
        ctx.inc_rules_evaluated();
        ctx.inc_rules_evaluated();
        ctx.inc_errors();
        assert_eq!(ctx.rules_evaluated(), 2);
        assert_eq!(ctx.error_count(), 1);
    }

    #[test]
    fn ids_are_unique() {
        let a = EvalContext::new();
        let b = EvalContext::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn clone_semantics() {
        let ctx = EvalContext::new();
        ctx.set("x", 1.0);
        ctx.set_metadata("run", "1");
        ctx.register_lookup(MapLookup::new(
            "codes",
            HashMap::from([("a".to_owned(), 1.0)]),
        ));
        ctx.get_or_create_buildup("total", BuildupOperation::Sum, 0.0)
            .add(5.0);
        ctx.inc_rules_evaluated();

        let clone = ctx.clone();
        assert_ne!(clone.id(), ctx.id());
        assert_eq!(clone.get("x"), Some(Value::Number(1.0)));
        assert_eq!(clone.metadata("run"), Some("1".to_owned()));
        assert!(clone.lookup("codes", &Value::from("a")).is_ok());
        assert!(clone.buildup("total").is_none());
        assert_eq!(clone.rules_evaluated(), 0);

        // Writes to the clone do not leak back.
        clone.set("x", 2.0);
        assert_eq!(ctx.get("x"), Some(Value::Number(1.0)));
    }
}
