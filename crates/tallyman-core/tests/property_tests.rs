//! Property-based tests for tallyman-core.
//!
//! Run with: cargo test -p tallyman-core --test property_tests

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use tallyman_core::number::divide;
use tallyman_core::{Amount, Cost, CostSpec, InternedStr, Inventory, NumberError, Position};

// ============================================================================
// Arbitrary generators
// ============================================================================

fn arb_decimal() -> impl Strategy<Value = Decimal> {
    (-1_000_000i64..1_000_000i64).prop_map(|n| Decimal::new(n, 2))
}

fn arb_positive_decimal() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|n| Decimal::new(n, 2))
}

fn arb_currency() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("USD".to_string()),
        Just("EUR".to_string()),
        Just("HOOL".to_string()),
        Just("BTC".to_string()),
    ]
}

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (2020i32..2025i32, 1u32..13u32, 1u32..29u32)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

fn arb_cost() -> impl Strategy<Value = Cost> {
    (arb_positive_decimal(), prop::option::of(arb_date())).prop_map(|(n, date)| {
        let mut cost = Cost::new(n, "USD");
        cost.date = date;
        cost
    })
}

fn arb_position() -> impl Strategy<Value = Position> {
    (arb_positive_decimal(), arb_currency(), prop::option::of(arb_cost())).prop_map(
        |(n, currency, cost)| match cost {
            Some(c) => Position::with_cost(Amount::new(n, currency), c),
            None => Position::simple(Amount::new(n, currency)),
        },
    )
}

fn arb_inventory() -> impl Strategy<Value = Inventory> {
    prop::collection::vec(arb_position(), 0..10).prop_map(|positions| positions.into_iter().collect())
}

// ============================================================================
// Number properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// An exact quotient multiplies back to the dividend.
    #[test]
    fn prop_exact_division_round_trips(a in arb_decimal(), b in arb_decimal()) {
        prop_assume!(!b.is_zero());
        match divide(a, b, None) {
            Ok(q) => {
                prop_assert!(q.exact);
                prop_assert_eq!(q.value * b, a);
            }
            Err(err) => {
                let is_precision = matches!(err, NumberError::Precision { .. });
                prop_assert!(is_precision);
            }
        }
    }

    /// With a cap, division always succeeds and respects the cap.
    #[test]
    fn prop_capped_division_respects_scale(a in arb_decimal(), b in arb_decimal(), cap in 0u32..12) {
        prop_assume!(!b.is_zero());
        let q = divide(a, b, Some(cap)).unwrap();
        if !q.exact {
            prop_assert!(q.value.scale() <= cap);
        }
    }

    /// Adding amounts of different currencies never succeeds.
    #[test]
    fn prop_mismatched_currencies_fail(n1 in arb_decimal(), n2 in arb_decimal()) {
        let usd = Amount::new(n1, "USD");
        let eur = Amount::new(n2, "EUR");
        prop_assert!(usd.checked_add(&eur).is_err());
        prop_assert!(usd.checked_sub(&eur).is_err());
    }
}

// ============================================================================
// Inventory properties
// ============================================================================

proptest! {
    /// Adding a position changes the units of its currency by exactly its number.
    #[test]
    fn prop_add_changes_units(inv in arb_inventory(), pos in arb_position()) {
        let currency = pos.units.currency.clone();
        let before = inv.units(&currency).unwrap();
        let mut inv = inv;
        inv.add(pos.clone());
        prop_assert_eq!(inv.units(&currency).unwrap(), before + pos.units.number);
    }

    /// Every signature appears at most once.
    #[test]
    fn prop_signatures_are_unique(inv in arb_inventory()) {
        let lots: Vec<_> = inv.lots().collect();
        for (i, a) in lots.iter().enumerate() {
            for b in &lots[i + 1..] {
                prop_assert!(!a.same_lot(b));
            }
        }
    }

    /// balance() agrees with units() for every currency.
    #[test]
    fn prop_balance_matches_units(inv in arb_inventory()) {
        let balance = inv.balance().unwrap();
        for currency in ["USD", "EUR", "HOOL", "BTC"] {
            let expected = inv.units(currency).unwrap();
            prop_assert_eq!(balance.get(currency).copied().unwrap_or_default(), expected);
        }
    }

    /// Merging inventories adds their units.
    #[test]
    fn prop_merge_adds_units(a in arb_inventory(), b in arb_inventory()) {
        let mut merged = a.clone();
        merged.merge(&b).unwrap();
        let mut expected: std::collections::HashMap<InternedStr, Decimal> = Default::default();
        for pos in a.lots().chain(b.lots()) {
            *expected.entry(pos.units.currency.clone()).or_default() += pos.units.number;
        }
        for (currency, n) in expected {
            prop_assert_eq!(merged.units(&currency).unwrap(), n);
        }
    }

    /// A failed reduction leaves the inventory untouched; a successful one
    /// never drives the matched lot negative.
    #[test]
    fn prop_reduce_keeps_lots_non_negative(inv in arb_inventory(), n in arb_positive_decimal(), currency in arb_currency()) {
        let mut after = inv.clone();
        match after.reduce(&Amount::new(-n, currency.as_str()), &CostSpec::empty()) {
            Ok(taken) => {
                prop_assert_eq!(taken.units.number, -n);
                prop_assert_eq!(after.units(&currency).unwrap(), inv.units(&currency).unwrap() - n);
            }
            Err(_) => prop_assert_eq!(&after, &inv),
        }
        for pos in after.lots() {
            prop_assert!(pos.units.number > Decimal::ZERO);
        }
    }

    /// Averaging preserves units and (within rounding) book value.
    #[test]
    fn prop_merge_average_preserves_totals(inv in arb_inventory(), currency in arb_currency()) {
        let units = inv.units(&currency).unwrap();
        let book = inv.book_value(&currency).unwrap().get("USD").copied().unwrap_or_default();
        let mut averaged = inv;
        if let Ok(Some(lot)) = averaged.merge_average(&currency, Some(10)) {
            prop_assert_eq!(averaged.units(&currency).unwrap(), units);
            let merged_book = lot.book_value().unwrap().unwrap().number;
            prop_assert!((merged_book - book).abs() <= lot.units.number * Decimal::new(1, 10));
        }
    }
}

// ============================================================================
// Cost properties
// ============================================================================

proptest! {
    /// A spec built from a cost selects it.
    #[test]
    fn prop_spec_from_cost_matches(cost in arb_cost()) {
        prop_assert!(CostSpec::from_cost(&cost).matches(&cost));
        prop_assert!(CostSpec::empty().matches(&cost));
    }

    /// A dated spec matches only the same date.
    #[test]
    fn prop_date_matching(n in arb_positive_decimal(), d1 in arb_date(), d2 in arb_date()) {
        let cost = Cost::new(n, "USD").with_date(d1);
        prop_assert_eq!(CostSpec::empty().with_date(d2).matches(&cost), d1 == d2);
    }
}
