use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Neg, Sub, SubAssign},
    str::FromStr,
};

use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

pub const TON_CURRENCY_CODE: &str = "TON";
/// 1 TON = 10⁹ nanoTon. All on-chain amounts are integers at this scale.
pub const NANO_PER_TON: i64 = 1_000_000_000;
pub const TON_DECIMALS: u32 = 9;

//--------------------------------------     NanoTon       -----------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct NanoTon(i64);

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in nanoTon: {0}")]
pub struct NanoTonConversionError(String);

impl From<i64> for NanoTon {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Add for NanoTon {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for NanoTon {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for NanoTon {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for NanoTon {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Sum for NanoTon {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl FromStr for NanoTon {
    type Err = NanoTonConversionError;

    /// Parses an integer nanoTon string, e.g. "3000000000" => 3 TON.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let nanos = s
            .trim()
            .parse::<i64>()
            .map_err(|e| NanoTonConversionError(format!("'{s}' is not an integer nanoTon amount: {e}")))?;
        Ok(Self(nanos))
    }
}

impl TryFrom<Decimal> for NanoTon {
    type Error = NanoTonConversionError;

    /// Converts a TON display-unit decimal into nanoTon, truncating (never rounding) anything below
    /// the 9th fractional digit.
    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        let truncated = value.trunc_with_scale(TON_DECIMALS);
        let nanos = (truncated * Decimal::from(NANO_PER_TON))
            .to_i64()
            .ok_or_else(|| NanoTonConversionError(format!("{value} TON overflows the nanoTon range")))?;
        Ok(Self(nanos))
    }
}

impl Display for NanoTon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl NanoTon {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_ton(ton: i64) -> Self {
        Self(ton * NANO_PER_TON)
    }

    /// The exact display-unit representation at scale 9, e.g. 3000000000 => 3.000000000.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::from_i128_with_scale(i128::from(self.0), TON_DECIMALS)
    }
}
