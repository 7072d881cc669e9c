use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};

use crate::db_types::{Piconero, RefundSplit};

/// Returns true if `factor` lies in the closed interval [0, 1]
pub fn is_valid_refund_factor(factor: Decimal) -> bool {
    factor >= Decimal::ZERO && factor <= Decimal::ONE
}

/// Divides the escrowed `total` of a disputed order between customer and vendor.
///
/// The customer receives `total × factor`, rounded to the nearest piconero. An exact half rounds toward zero, i.e.
/// in the vendor's favour. The vendor receives the remainder, so the two shares always sum to `total` exactly.
///
/// Returns `None` if the factor is outside [0, 1].
pub fn split_refund(total: Piconero, factor: Decimal) -> Option<RefundSplit> {
    if !is_valid_refund_factor(factor) {
        return None;
    }
    let customer = (Decimal::from(total.value()) * factor)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointTowardZero)
        .to_i64()?;
    let customer_refund = Piconero::from(customer);
    Some(RefundSplit { customer_refund, vendor_refund: total - customer_refund })
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn simple_splits() {
        let total = Piconero::from(1_000);
        let split = split_refund(total, dec!(0.25)).unwrap();
        assert_eq!(split.customer_refund, Piconero::from(250));
        assert_eq!(split.vendor_refund, Piconero::from(750));

        let split = split_refund(total, Decimal::ZERO).unwrap();
        assert_eq!(split.customer_refund, Piconero::from(0));
        assert_eq!(split.vendor_refund, total);

        let split = split_refund(total, Decimal::ONE).unwrap();
        assert_eq!(split.customer_refund, total);
        assert_eq!(split.vendor_refund, Piconero::from(0));
    }

    #[test]
    fn ties_favour_the_vendor() {
        // 5 * 0.5 = 2.5 -> 2
        let split = split_refund(Piconero::from(5), dec!(0.5)).unwrap();
        assert_eq!(split.customer_refund, Piconero::from(2));
        assert_eq!(split.vendor_refund, Piconero::from(3));
        // 7 * 0.3 = 2.1 -> 2, 7 * 0.4 = 2.8 -> 3
        assert_eq!(split_refund(Piconero::from(7), dec!(0.3)).unwrap().customer_refund, Piconero::from(2));
        assert_eq!(split_refund(Piconero::from(7), dec!(0.4)).unwrap().customer_refund, Piconero::from(3));
    }

    #[test]
    fn rejects_out_of_range_factors() {
        assert!(split_refund(Piconero::from(100), dec!(1.01)).is_none());
        assert!(split_refund(Piconero::from(100), dec!(-0.01)).is_none());
    }

    proptest! {
        #[test]
        fn shares_sum_to_total(total in 0i64..=1_000_000_000_000_000_000, bp in 0u32..=10_000) {
            let factor = Decimal::new(i64::from(bp), 4);
            let total = Piconero::from(total);
            let split = split_refund(total, factor).unwrap();
            prop_assert_eq!(split.customer_refund + split.vendor_refund, total);
            prop_assert!(split.customer_refund.value() >= 0);
            prop_assert!(split.vendor_refund.value() >= 0);
            // within half a unit of the exact product
            let exact = Decimal::from(total.value()) * factor;
            let diff = (exact - Decimal::from(split.customer_refund.value())).abs();
            prop_assert!(diff <= dec!(0.5));
        }
    }
}
