use std::collections::HashMap;
use std::hash::Hash;

use super::value::Value;

/// A named, read-only table associating keys to values.
///
/// Lookups never error: a key that does not match the table's key type, or
/// matches no entry, simply reads as `None`.
pub trait Lookup: Send + Sync {
    /// The table name used for registration.
    fn name(&self) -> &str;

    /// Retrieve the value for `key`, if any.
    fn get(&self, key: &Value) -> Option<Value>;
}

/// Key types a [`MapLookup`] can cast a dynamic value into.
pub trait LookupKey: Eq + Hash {
    fn from_value(value: &Value) -> Option<Self>
    where
        Self: Sized;
}

impl LookupKey for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl LookupKey for i64 {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n)
                if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n <= i64::MAX as f64 =>
            {
                Some(*n as i64)
            }
            _ => None,
        }
    }
}

impl LookupKey for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Exact-key lookup over an owned map.
///
/// The incoming dynamic key is cast to `K` at query time; a failed cast reads
/// as a miss.
#[derive(Debug, Clone)]
pub struct MapLookup<K, V> {
    name: String,
    items: HashMap<K, V>,
}

impl<K, V> MapLookup<K, V>
where
    K: LookupKey,
    V: Clone + Into<Value>,
{
    /// Create a lookup owning `items`.
    #[must_use]
    pub fn new(name: impl Into<String>, items: HashMap<K, V>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K, V> Lookup for MapLookup<K, V>
where
    K: LookupKey + Send + Sync,
    V: Clone + Into<Value> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &Value) -> Option<Value> {
        let k = K::from_value(key)?;
        self.items.get(&k).map(|v| v.clone().into())
    }
}

/// A single half-open interval `[min, max)` in a [`RangeLookup`].
#[derive(Debug, Clone, PartialEq)]
pub struct RangeEntry<V> {
    /// Inclusive lower bound.
    pub min: f64,
    /// Exclusive upper bound. Use `f64::INFINITY` for an unbounded top.
    pub max: f64,
    pub value: V,
}

/// Range-based lookup (e.g. tax brackets).
///
/// The key coerces to `f64`; entries are scanned in declaration order and the
/// first interval containing the key wins. Boundary values belong to the
/// upper interval.
#[derive(Debug, Clone)]
pub struct RangeLookup<V> {
    name: String,
    ranges: Vec<RangeEntry<V>>,
}

impl<V> RangeLookup<V>
where
    V: Clone + Into<Value>,
{
    #[must_use]
    pub fn new(name: impl Into<String>, ranges: Vec<RangeEntry<V>>) -> Self {
        Self {
            name: name.into(),
            ranges,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl<V> Lookup for RangeLookup<V>
where
    V: Clone + Into<Value> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &Value) -> Option<Value> {
        let k = key.as_f64().ok()?;
        self.ranges
            .iter()
            .find(|r| k >= r.min && k < r.max)
            .map(|r| r.value.clone().into())
    }
}

/// Convenience shape for tax-bracket style range tables.
///
/// A `max` of `0` is read as an unbounded top bracket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxBracket {
    pub min: f64,
    pub max: f64,
    pub rate: f64,
}

impl RangeLookup<f64> {
    /// Build a rate table from `(min, max, rate)` brackets.
    #[must_use]
    pub fn from_tax_brackets(name: impl Into<String>, brackets: &[TaxBracket]) -> Self {
        let ranges = brackets
            .iter()
            .map(|b| RangeEntry {
                min: b.min,
                max: if b.max == 0.0 { f64::INFINITY } else { b.max },
                value: b.rate,
            })
            .collect();
        Self::new(name, ranges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates() -> RangeLookup<f64> {
        RangeLookup::new(
            "tax_brackets",
            vec![
                RangeEntry {
                    min: 0.0,
                    max: 50_000.0,
                    value: 0.10,
                },
                RangeEntry {
                    min: 50_000.0,
                    max: 100_000.0,
                    value: 0.22,
                },
                RangeEntry {
                    min: 100_000.0,
                    max: f64::INFINITY,
                    value: 0.35,
                },
            ],
        )
    }

    #[test]
    fn map_lookup_hits_every_entry() {
        let mut items = HashMap::new();
        items.insert("us".to_owned(), 1.0);
        items.insert("eu".to_owned(), 2.0);
        let lookup = MapLookup::new("regions", items.clone());

        for (k, v) in &items {
            assert_eq!(
                lookup.get(&Value::from(k.as_str())),
                Some(Value::Number(*v))
            );
        }
    }

    #[test]
    fn map_lookup_misses_unknown_key() {
        let lookup = MapLookup::new("regions", HashMap::from([("us".to_owned(), 1.0)]));
        assert_eq!(lookup.get(&Value::from("mars")), None);
    }

    #[test]
    fn map_lookup_key_type_mismatch_is_a_miss() {
        let lookup = MapLookup::new("regions", HashMap::from([("us".to_owned(), 1.0)]));
        assert_eq!(lookup.get(&Value::Number(7.0)), None);
        assert_eq!(lookup.get(&Value::Bool(true)), None);
        assert_eq!(lookup.get(&Value::Null), None);
    }

    #[test]
    fn map_lookup_integral_number_casts_to_i64_key() {
        let lookup = MapLookup::new("codes", HashMap::from([(404_i64, "not found".to_owned())]));
        assert_eq!(
            lookup.get(&Value::Number(404.0)),
            Some(Value::from("not found"))
        );
        assert_eq!(lookup.get(&Value::Number(404.5)), None);
    }

    #[test]
    fn range_lookup_finds_interval() {
        let rates = rates();
        assert_eq!(rates.get(&Value::Number(75_000.0)), Some(Value::Number(0.22)));
        assert_eq!(rates.get(&Value::Number(10.0)), Some(Value::Number(0.10)));
        assert_eq!(
            rates.get(&Value::Number(2_000_000.0)),
            Some(Value::Number(0.35))
        );
    }

    #[test]
    fn range_lookup_boundary_goes_up() {
        let rates = rates();
        assert_eq!(rates.get(&Value::Number(50_000.0)), Some(Value::Number(0.22)));
        assert_eq!(
            rates.get(&Value::Number(100_000.0)),
            Some(Value::Number(0.35))
        );
    }

    #[test]
    fn range_lookup_below_all_intervals_misses() {
        assert_eq!(rates().get(&Value::Number(-1.0)), None);
    }

    #[test]
    fn range_lookup_non_numeric_key_is_a_miss() {
        assert_eq!(rates().get(&Value::from("50000")), None);
    }

    #[test]
    fn range_lookup_first_declared_interval_wins() {
        let overlapping = RangeLookup::new(
            "overlap",
            vec![
                RangeEntry {
                    min: 0.0,
                    max: 100.0,
                    value: 1.0,
                },
                RangeEntry {
                    min: 50.0,
                    max: 150.0,
                    value: 2.0,
                },
            ],
        );
        assert_eq!(overlapping.get(&Value::Number(75.0)), Some(Value::Number(1.0)));
    }

    #[test]
    fn tax_brackets_zero_max_means_unbounded() {
        let lookup = RangeLookup::from_tax_brackets(
            "brackets",
            &[
                TaxBracket {
                    min: 0.0,
                    max: 50_000.0,
                    rate: 0.10,
                },
                TaxBracket {
                    min: 50_000.0,
                    max: 0.0,
                    rate: 0.30,
                },
            ],
        );
        assert_eq!(
            lookup.get(&Value::Number(9_000_000.0)),
            Some(Value::Number(0.30))
        );
    }
}
