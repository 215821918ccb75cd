use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::models::{Invoice, LineItem, NewLineItem};

/// Largest magnitude any stored money field may hold, `999999999999.99`,
/// matching the `NUMERIC(14, 2)` columns.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0x107a_3fff, 0x5af3, 0, false, 2);

/// A line amount or invoice total left the storable range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("amount exceeds the largest supported value of {MAX_AMOUNT}")]
pub struct AmountOverflow;

/// Anything carrying a quantity and a unit rate.
pub trait Billable {
    fn quantity(&self) -> i32;
    fn rate(&self) -> Decimal;

    /// Unrounded `quantity × rate`.
    fn extended(&self) -> Result<Decimal, AmountOverflow> {
        Decimal::from(self.quantity())
            .checked_mul(self.rate())
            .ok_or(AmountOverflow)
    }
}

impl<T: Billable + ?Sized> Billable for &T {
    fn quantity(&self) -> i32 {
        (**self).quantity()
    }

    fn rate(&self) -> Decimal {
        (**self).rate()
    }
}

impl Billable for LineItem {
    fn quantity(&self) -> i32 {
        self.quantity
    }

    fn rate(&self) -> Decimal {
        self.rate
    }
}

impl Billable for NewLineItem {
    fn quantity(&self) -> i32 {
        self.quantity
    }

    fn rate(&self) -> Decimal {
        self.rate
    }
}

/// A bare `(quantity, rate)` pair.
impl Billable for (i32, Decimal) {
    fn quantity(&self) -> i32 {
        self.0
    }

    fn rate(&self) -> Decimal {
        self.1
    }
}

/// Derived monetary fields of an invoice, each with exactly two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

impl InvoiceTotals {
    pub fn apply_to(self, invoice: &mut Invoice) {
        invoice.subtotal = self.subtotal;
        invoice.tax_amount = self.tax_amount;
        invoice.total = self.total;
    }
}

/// Rounds half away from zero to two decimals and pins the scale at 2, so the
/// value always serializes as `"150.00"` rather than `"150"`.
pub fn to_cents(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

fn bounded(value: Decimal) -> Result<Decimal, AmountOverflow> {
    let cents = to_cents(value);
    if cents.abs() > MAX_AMOUNT {
        return Err(AmountOverflow);
    }
    Ok(cents)
}

/// Stored amount of a single line item.
pub fn line_amount(quantity: i32, rate: Decimal) -> Result<Decimal, AmountOverflow> {
    let product = Decimal::from(quantity)
        .checked_mul(rate)
        .ok_or(AmountOverflow)?;
    bounded(product)
}

/// Computes subtotal, tax and total for a set of line items.
///
/// Item products are summed unrounded and the subtotal is rounded once; the tax
/// is taken on the rounded subtotal so that a stored invoice satisfies
/// `tax_amount == round2(subtotal * tax_rate / 100)` exactly.
///
/// Fails when any line amount or the resulting total exceeds [`MAX_AMOUNT`].
pub fn compute_totals<T: Billable>(
    items: &[T],
    tax_rate: Decimal,
) -> Result<InvoiceTotals, AmountOverflow> {
    let mut raw = Decimal::ZERO;
    for item in items {
        line_amount(item.quantity(), item.rate())?;
        raw = raw.checked_add(item.extended()?).ok_or(AmountOverflow)?;
    }

    let subtotal = bounded(raw)?;
    let tax = subtotal
        .checked_mul(tax_rate)
        .and_then(|taxed| taxed.checked_div(Decimal::ONE_HUNDRED))
        .ok_or(AmountOverflow)?;
    let tax_amount = bounded(tax)?;
    let total = bounded(subtotal.checked_add(tax_amount).ok_or(AmountOverflow)?)?;

    Ok(InvoiceTotals {
        subtotal,
        tax_amount,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn item(quantity: i32, rate: &str) -> NewLineItem {
        NewLineItem {
            description: "work".to_string(),
            quantity,
            rate: d(rate),
        }
    }

    #[test]
    fn empty_invoice_is_zero() {
        let totals = compute_totals::<NewLineItem>(&[], d("20")).unwrap();
        assert_eq!(totals.subtotal.to_string(), "0.00");
        assert_eq!(totals.tax_amount.to_string(), "0.00");
        assert_eq!(totals.total.to_string(), "0.00");
    }

    #[test]
    fn sums_items_and_applies_tax() {
        let items = vec![item(2, "50"), item(3, "19.99")];
        let totals = compute_totals(&items, d("8.25")).unwrap();

        assert_eq!(totals.subtotal.to_string(), "159.97");
        // 159.97 * 0.0825 = 13.197525
        assert_eq!(totals.tax_amount.to_string(), "13.20");
        assert_eq!(totals.total.to_string(), "173.17");
    }

    #[test]
    fn rounds_subtotal_once_after_summing() {
        // Each product is 0.333; rounding per item first would give 0.99.
        let items = vec![item(1, "0.333"), item(1, "0.333"), item(1, "0.333")];
        let totals = compute_totals(&items, Decimal::ZERO).unwrap();
        assert_eq!(totals.subtotal.to_string(), "1.00");
    }

    #[test]
    fn midpoint_rounds_away_from_zero() {
        assert_eq!(to_cents(d("0.125")).to_string(), "0.13");
        assert_eq!(to_cents(d("2.675")).to_string(), "2.68");
        assert_eq!(to_cents(d("7")).to_string(), "7.00");
    }

    #[test]
    fn line_amount_has_two_decimals() {
        assert_eq!(line_amount(3, d("33.335")).unwrap().to_string(), "100.01");
        assert_eq!(line_amount(4, d("25")).unwrap().to_string(), "100.00");
    }

    #[test]
    fn max_amount_matches_column_precision() {
        assert_eq!(MAX_AMOUNT.to_string(), "999999999999.99");
        assert_eq!(line_amount(1, MAX_AMOUNT), Ok(MAX_AMOUNT));
    }

    #[test]
    fn oversized_rate_is_rejected_instead_of_panicking() {
        let rate = Decimal::MAX;
        assert_eq!(line_amount(2, rate), Err(AmountOverflow));
        assert_eq!(
            compute_totals(&[item(2, "79228162514264337593543950335")], Decimal::ZERO),
            Err(AmountOverflow)
        );
        assert_eq!(line_amount(i32::MAX, d("1000")), Err(AmountOverflow));
    }

    #[test]
    fn sum_past_the_limit_is_rejected() {
        let items = vec![item(1, "999999999999.99"), item(1, "0.01")];
        assert_eq!(compute_totals(&items, Decimal::ZERO), Err(AmountOverflow));
    }

    #[test]
    fn tax_pushing_total_past_the_limit_is_rejected() {
        let items = vec![item(1, "900000000000")];
        assert!(compute_totals(&items, d("10")).is_ok());
        assert_eq!(compute_totals(&items, d("20")), Err(AmountOverflow));
    }

    proptest! {
        #[test]
        fn subtotal_is_rounded_sum_of_products(
            rows in prop::collection::vec((1i32..500, 0i64..1_000_000), 0..20),
            tax_cents in 0i64..10_000,
        ) {
            let items: Vec<NewLineItem> = rows
                .iter()
                .map(|(q, r)| NewLineItem {
                    description: "row".to_string(),
                    quantity: *q,
                    rate: Decimal::new(*r, 3),
                })
                .collect();
            let tax_rate = Decimal::new(tax_cents, 2);
            let totals = compute_totals(&items, tax_rate).unwrap();

            let expected: Decimal = items
                .iter()
                .map(|i| Decimal::from(i.quantity) * i.rate)
                .sum();
            prop_assert_eq!(totals.subtotal, to_cents(expected));
            prop_assert_eq!(
                totals.tax_amount,
                to_cents(totals.subtotal * tax_rate / Decimal::ONE_HUNDRED)
            );
            prop_assert_eq!(totals.total, totals.subtotal + totals.tax_amount);
            prop_assert_eq!(totals.total.scale(), 2);
        }

        #[test]
        fn recomputing_is_stable(
            rows in prop::collection::vec((1i32..100, 0i64..100_000), 1..10),
            tax_cents in 0i64..10_000,
        ) {
            let items: Vec<NewLineItem> = rows
                .iter()
                .map(|(q, r)| NewLineItem {
                    description: "row".to_string(),
                    quantity: *q,
                    rate: Decimal::new(*r, 2),
                })
                .collect();
            let tax_rate = Decimal::new(tax_cents, 2);
            prop_assert_eq!(compute_totals(&items, tax_rate), compute_totals(&items, tax_rate));
        }

        #[test]
        fn never_panics_on_any_rate(
            quantity in 1i32..=i32::MAX,
            mantissa in any::<i64>(),
            scale in 0u32..=28,
        ) {
            let rate = Decimal::new(mantissa, scale).abs();
            let items = vec![NewLineItem {
                description: "row".to_string(),
                quantity,
                rate,
            }];
            if let Ok(totals) = compute_totals(&items, Decimal::ONE_HUNDRED) {
                prop_assert!(totals.total <= MAX_AMOUNT);
            }
        }
    }
}
