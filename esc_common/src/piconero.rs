use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const XMR_CURRENCY_CODE: &str = "XMR";
/// Number of atomic units in one whole XMR
pub const PICONERO_PER_XMR: i64 = 1_000_000_000_000;

//--------------------------------------      Piconero       ---------------------------------------------------------
/// An amount of crypto, in atomic units (1 XMR = 10^12 piconero).
///
/// All ledger arithmetic happens on this integer representation. Floating point only appears when an amount is
/// formatted for humans.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Piconero(i64);

op!(binary Piconero, Add, add);
op!(binary Piconero, Sub, sub);
op!(inplace Piconero, AddAssign, add_assign);
op!(inplace Piconero, SubAssign, sub_assign);
op!(unary Piconero, Neg, neg);

impl Mul<i64> for Piconero {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Piconero {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in piconero: {0}")]
pub struct PiconeroConversionError(String);

impl From<i64> for Piconero {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for Piconero {
    type Error = PiconeroConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Self)
            .map_err(|_| PiconeroConversionError(format!("{value} is too large to convert to Piconero")))
    }
}

impl TryFrom<Piconero> for u64 {
    type Error = PiconeroConversionError;

    fn try_from(value: Piconero) -> Result<Self, Self::Error> {
        u64::try_from(value.0).map_err(|_| PiconeroConversionError(format!("{value} is negative")))
    }
}

impl Display for Piconero {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.abs() < 1_000_000 {
            write!(f, "{}pɱ", self.0)
        } else {
            let xmr = self.0 as f64 / PICONERO_PER_XMR as f64;
            write!(f, "{xmr:0.4}ɱ")
        }
    }
}

impl Piconero {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_xmr(xmr: i64) -> Self {
        Self(xmr * PICONERO_PER_XMR)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }
}
