use std::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::AmountError;

const NANO_DECIMALS: u32 = 9;
const NANOS_PER_TON: u64 = 1_000_000_000;

/// An amount in the ledger's smallest unit (1 TON = 10^9 nanotons).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Nanotons(u64);

impl Nanotons {
    pub const ZERO: Nanotons = Nanotons(0);

    pub const fn new(nano: u64) -> Self {
        Self(nano)
    }

    pub const fn as_nano(&self) -> u64 {
        self.0
    }

    /// Parses a plain decimal TON amount such as `1`, `0.25` or `12.000000001`.
    pub fn from_ton_str(s: &str) -> Result<Self, AmountError> {
        if s.is_empty() {
            return Err(AmountError::Empty);
        }

        let (whole, fraction) = match s.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (s, ""),
        };
        let digits_only = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !digits_only(whole) || !digits_only(fraction) {
            return Err(AmountError::Malformed(s.to_string()));
        }
        if s.ends_with('.') {
            return Err(AmountError::Malformed(s.to_string()));
        }
        if fraction.len() > NANO_DECIMALS as usize {
            return Err(AmountError::TooManyDecimals(s.to_string()));
        }

        let ton = Decimal::from_str_exact(s).map_err(|_| AmountError::Overflow(s.to_string()))?;
        let nano = ton
            .checked_mul(Decimal::from(NANOS_PER_TON))
            .and_then(|nano| nano.to_u64())
            .ok_or_else(|| AmountError::Overflow(s.to_string()))?;

        Ok(Self(nano))
    }

    pub fn checked_add(self, other: Nanotons) -> Option<Nanotons> {
        self.0.checked_add(other.0).map(Nanotons)
    }

    pub fn to_ton(&self) -> Decimal {
        Decimal::from_i128_with_scale(i128::from(self.0), NANO_DECIMALS).normalize()
    }
}

impl fmt::Display for Nanotons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} TON", self.to_ton())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whole_and_fractional() {
        assert_eq!(Nanotons::from_ton_str("1").unwrap().as_nano(), 1_000_000_000);
        assert_eq!(Nanotons::from_ton_str("0.25").unwrap().as_nano(), 250_000_000);
        assert_eq!(Nanotons::from_ton_str("0.000000001").unwrap().as_nano(), 1);
        assert_eq!(Nanotons::from_ton_str("0").unwrap(), Nanotons::ZERO);
        assert_eq!(
            Nanotons::from_ton_str("12.5").unwrap().as_nano(),
            12_500_000_000
        );
    }

    #[test]
    fn test_rejects_signs_and_exponents() {
        for input in ["-1", "+1", "1e3", "abc", "1.2.3", ".5", "5.", " 1", "1,5"] {
            assert!(
                matches!(Nanotons::from_ton_str(input), Err(AmountError::Malformed(_))),
                "expected {input:?} to be malformed"
            );
        }
        assert_eq!(Nanotons::from_ton_str(""), Err(AmountError::Empty));
    }

    #[test]
    fn test_rejects_sub_nano_precision() {
        assert_eq!(
            Nanotons::from_ton_str("1.0000000001"),
            Err(AmountError::TooManyDecimals("1.0000000001".to_string()))
        );
    }

    #[test]
    fn test_rejects_overflow() {
        assert!(matches!(
            Nanotons::from_ton_str("99999999999999999999"),
            Err(AmountError::Overflow(_))
        ));
    }

    #[test]
    fn test_display_trims_trailing_zeros() {
        assert_eq!(Nanotons::new(1_500_000_000).to_string(), "1.5 TON");
        assert_eq!(Nanotons::new(300_000).to_string(), "0.0003 TON");
        assert_eq!(Nanotons::ZERO.to_string(), "0 TON");
    }
}
