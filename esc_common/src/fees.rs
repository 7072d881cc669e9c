//! Flat settlement fee arithmetic.
//!
//! The marketplace charges a 5% fee on top of every order. The customer pays `add_fee(total)`, the vendor is
//! credited `total`. All results are truncated toward zero, and intermediate products are computed in 128 bits so
//! that large amounts cannot overflow.
use crate::Piconero;

/// The settlement fee, in percent
pub const FEE_PERCENT: i64 = 5;

fn scale(amount: Piconero, numerator: i64, denominator: i64) -> Piconero {
    let value = i128::from(amount.value()) * i128::from(numerator) / i128::from(denominator);
    // |numerator / denominator| <= 1.05 and amounts are bounded well below i64::MAX / 1.05 in practice. Saturate
    // rather than wrap if that assumption is ever broken.
    Piconero::from(i64::try_from(value).unwrap_or(if value > 0 { i64::MAX } else { i64::MIN }))
}

/// The fee owed on `amount`
pub fn fee(amount: Piconero) -> Piconero {
    scale(amount, FEE_PERCENT, 100)
}

/// `amount` plus the fee
pub fn add_fee(amount: Piconero) -> Piconero {
    scale(amount, 100 + FEE_PERCENT, 100)
}

/// Recovers the pre-fee amount from a fee-inclusive one
pub fn sub_fee(amount: Piconero) -> Piconero {
    scale(amount, 100, 100 + FEE_PERCENT)
}
