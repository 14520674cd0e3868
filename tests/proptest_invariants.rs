//! Property tests for the lookup tables, the buildup accumulator, the
//! allocation maths, and the expression evaluator.

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use cortex::{
    AllocationConfig, AllocationRule, AllocationStrategy, AllocationTarget, Buildup,
    BuildupOperation, CancelToken, EvalContext, Expression, Lookup, MapLookup, RangeEntry,
    RangeLookup, Value,
};

// ---------------------------------------------------------------------------
// Map lookup: every inserted key is found with its value; anything else is
// a miss.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn map_lookup_finds_exactly_the_inserted_keys(
        items in proptest::collection::hash_map("[a-z]{1,8}", -1e9_f64..1e9, 0..32),
        probe in "[a-z]{1,8}",
    ) {
        let lookup = MapLookup::new("table", items.clone());

        for (key, value) in &items {
            prop_assert_eq!(
                lookup.get(&Value::from(key.as_str())),
                Some(Value::Number(*value))
            );
        }

        let expected = items.get(&probe).map(|v| Value::Number(*v));
        prop_assert_eq!(lookup.get(&Value::from(probe.as_str())), expected);

        // A key of the wrong type is always a miss.
        prop_assert_eq!(lookup.get(&Value::Bool(true)), None);
    }
}

// ---------------------------------------------------------------------------
// Range lookup: for consecutive intervals, a boundary value belongs to the
// upper interval.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn range_lookup_boundaries_go_up(
        raw_cuts in proptest::collection::vec(-1e6_f64..1e6, 3..10),
    ) {
        let mut cuts = raw_cuts;
        cuts.sort_by(f64::total_cmp);
        cuts.dedup();
        prop_assume!(cuts.len() >= 2);
        let entries: Vec<RangeEntry<f64>> = cuts
            .windows(2)
            .enumerate()
            .map(|(i, window)| RangeEntry {
                min: window[0],
                max: window[1],
                value: i as f64,
            })
            .collect();
        let lookup = RangeLookup::new("ranges", entries.clone());

        // Each interior cut is the min of interval i and the max of
        // interval i-1; the lookup must return interval i.
        for (i, entry) in entries.iter().enumerate() {
            prop_assert_eq!(
                lookup.get(&Value::Number(entry.min)),
                Some(Value::Number(i as f64)),
                "cut {} fell into the wrong interval", entry.min
            );
        }

        // The final max is exclusive.
        let last = entries.last().unwrap();
        prop_assert_eq!(lookup.get(&Value::Number(last.max)), None);
    }
}

// ---------------------------------------------------------------------------
// Buildup: sum equals the fold of the inputs, count tracks the number of
// additions regardless of values.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn buildup_sum_matches_sequential_fold(values in proptest::collection::vec(-1e6_f64..1e6, 0..64)) {
        let buildup = Buildup::new("total", BuildupOperation::Sum, 0.0);
        let mut expected = 0.0;
        for v in &values {
            buildup.add(*v);
            expected += v;
        }
        prop_assert_eq!(buildup.current(), expected);
        prop_assert_eq!(buildup.count(), values.len() as i64);
    }

    #[test]
    fn buildup_count_ignores_values(values in proptest::collection::vec(-1e6_f64..1e6, 0..64)) {
        let buildup = Buildup::new("n", BuildupOperation::Count, 0.0);
        for v in &values {
            buildup.add(*v);
        }
        prop_assert_eq!(buildup.current(), values.len() as f64);
    }

    #[test]
    fn buildup_min_max_match_iterator_extremes(values in proptest::collection::vec(-1e6_f64..1e6, 1..64)) {
        let min = Buildup::new("min", BuildupOperation::Min, f64::INFINITY);
        let max = Buildup::new("max", BuildupOperation::Max, f64::NEG_INFINITY);
        for v in &values {
            min.add(*v);
            max.add(*v);
        }
        prop_assert_eq!(min.current(), values.iter().copied().fold(f64::INFINITY, f64::min));
        prop_assert_eq!(max.current(), values.iter().copied().fold(f64::NEG_INFINITY, f64::max));
    }
}

// ---------------------------------------------------------------------------
// Allocation: shares plus remainder conserve the source value, for every
// strategy that derives shares from it.
// ---------------------------------------------------------------------------

fn conservation_case(
    strategy: AllocationStrategy,
    amounts: &[f64],
    source: f64,
) -> Result<(), TestCaseError> {
    let targets: Vec<AllocationTarget> = amounts
        .iter()
        .enumerate()
        .map(|(i, amount)| AllocationTarget {
            key: format!("t{i}"),
            amount: *amount,
        })
        .collect();

    let rule = AllocationRule::must(AllocationConfig {
        id: "split".into(),
        source: "source".into(),
        strategy,
        targets: targets.clone(),
        remainder: Some("remainder".into()),
        ..Default::default()
    });

    let ctx = EvalContext::new();
    ctx.set("source", source);
    rule.evaluate(&CancelToken::new(), &ctx)
        .map_err(|e| TestCaseError::fail(e.to_string()))?;

    let mut total = 0.0;
    for (i, _) in targets.iter().enumerate() {
        total += ctx
            .get_f64(&format!("t{i}"))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
    }
    if ctx.has("remainder") {
        total += ctx
            .get_f64("remainder")
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
    }

    prop_assert!(
        (total - source).abs() <= source.abs() * 1e-12 + 1e-9,
        "strategy {strategy}: shares + remainder = {total}, source = {source}"
    );
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn allocation_conserves_the_source_weighted(
        amounts in proptest::collection::vec(0.0_f64..1e3, 1..8),
        source in -1e6_f64..1e6,
    ) {
        conservation_case(AllocationStrategy::Weighted, &amounts, source)?;
    }

    #[test]
    fn allocation_conserves_the_source_ratio(
        amounts in proptest::collection::vec(0.0_f64..100.0, 1..8),
        source in -1e6_f64..1e6,
    ) {
        conservation_case(AllocationStrategy::Ratio, &amounts, source)?;
    }

    #[test]
    fn allocation_conserves_the_source_equal(
        n in 1_usize..8,
        source in -1e6_f64..1e6,
    ) {
        conservation_case(AllocationStrategy::Equal, &vec![0.0; n], source)?;
    }

    #[test]
    fn allocation_conserves_the_source_percentage(source in -1e6_f64..1e6) {
        for amounts in [
            vec![50.0, 30.0, 20.0],
            vec![33.0, 33.0, 34.0],
            vec![25.0, 25.0, 25.0, 25.0],
            vec![100.0],
        ] {
            conservation_case(AllocationStrategy::Percentage, &amounts, source)?;
        }
    }
}

// ---------------------------------------------------------------------------
// Expression evaluator: source spacing does not change the AST or the
// result.
// ---------------------------------------------------------------------------

/// A tiny expression tree over three known variables, rendered both with
/// minimal and generous spacing.
#[derive(Debug, Clone)]
enum GenExpr {
    Var(&'static str),
    Num(i32),
    Add(Box<GenExpr>, Box<GenExpr>),
    Sub(Box<GenExpr>, Box<GenExpr>),
    Mul(Box<GenExpr>, Box<GenExpr>),
    Min(Box<GenExpr>, Box<GenExpr>),
}

impl GenExpr {
    fn render(&self, spaced: bool) -> String {
        let pad = if spaced { " " } else { "" };
        match self {
            GenExpr::Var(name) => (*name).to_owned(),
            GenExpr::Num(n) => n.to_string(),
            GenExpr::Add(a, b) => {
                format!("({pad}{}{pad}+{pad}{}{pad})", a.render(spaced), b.render(spaced))
            }
            GenExpr::Sub(a, b) => {
                format!("({pad}{}{pad}-{pad}{}{pad})", a.render(spaced), b.render(spaced))
            }
            GenExpr::Mul(a, b) => {
                format!("({pad}{}{pad}*{pad}{}{pad})", a.render(spaced), b.render(spaced))
            }
            GenExpr::Min(a, b) => format!(
                "min({pad}{},{pad}{}{pad})",
                a.render(spaced),
                b.render(spaced)
            ),
        }
    }
}

fn arb_gen_expr() -> impl Strategy<Value = GenExpr> {
    let leaf = prop_oneof![
        prop_oneof![Just("a"), Just("b"), Just("c")].prop_map(GenExpr::Var),
        (-100_i32..100).prop_map(GenExpr::Num),
    ];
    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| GenExpr::Add(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| GenExpr::Sub(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| GenExpr::Mul(Box::new(a), Box::new(b))),
            (inner.clone(), inner).prop_map(|(a, b)| GenExpr::Min(Box::new(a), Box::new(b))),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn spacing_never_changes_evaluation(
        expr in arb_gen_expr(),
        a in -100_i32..100,
        b in -100_i32..100,
        c in -100_i32..100,
    ) {
        let compact = Expression::compile(&expr.render(false)).unwrap();
        let spaced = Expression::compile(&expr.render(true)).unwrap();
        prop_assert_eq!(compact.ast(), spaced.ast());

        let values: HashMap<String, Value> = [
            ("a".to_owned(), Value::from(a)),
            ("b".to_owned(), Value::from(b)),
            ("c".to_owned(), Value::from(c)),
        ]
        .into();

        let lhs = compact.eval_with_map(&values).unwrap();
        let rhs = spaced.eval_with_map(&values).unwrap();
        prop_assert_eq!(lhs, rhs);
    }
}

// ---------------------------------------------------------------------------
// Lookup trait objects compose with the context regardless of value type.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn registered_lookup_round_trips_through_the_context(
        items in proptest::collection::hash_map("[a-z]{1,6}", "[a-z]{1,6}", 1..16),
    ) {
        let ctx = EvalContext::new();
        let lookup: Arc<dyn Lookup> = Arc::new(MapLookup::new("names", items.clone()));
        ctx.register_lookup_shared(lookup);

        for (key, value) in &items {
            let found = ctx.lookup("names", &Value::from(key.as_str())).unwrap();
            prop_assert_eq!(found, Some(Value::from(value.as_str())));
        }
    }
}
