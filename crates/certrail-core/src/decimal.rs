//! Exact fixed-point decimal arithmetic.
//!
//! [`FixedDecimal`] is an immutable value backed by an `i128` count of
//! 10^-18 units. Construction is from integers or canonical decimal strings
//! only — binary floating point is a forbidden input everywhere in this
//! system, so no float constructor or conversion exists.
//!
//! All four arithmetic operations are checked: a result whose magnitude
//! exceeds [`FixedDecimal::MAX_UNITS`] fails with
//! [`CertrailError::Overflow`]; nothing wraps or truncates silently. Every
//! division in the crate (including the rescaling division inside `mul`)
//! rounds with a single uniform policy: floor, toward negative infinity.
//! Equality and ordering are exact integer comparisons at the internal scale.

use crate::{CertrailError, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of decimal fraction digits carried by every value.
pub const FRACTION_DIGITS: u32 = 18;

/// Units per whole: 10^18.
const SCALE: u128 = 1_000_000_000_000_000_000;

/// An exact decimal number at scale 10^18.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixedDecimal {
    units: i128,
}

impl FixedDecimal {
    /// Maximum representable magnitude in units: 10^36, i.e. absolute values
    /// up to 10^18 whole units with a full 18-digit fraction.
    pub const MAX_UNITS: i128 = 1_000_000_000_000_000_000_000_000_000_000_000_000;

    pub const ZERO: FixedDecimal = FixedDecimal { units: 0 };
    pub const ONE: FixedDecimal = FixedDecimal { units: SCALE as i128 };
    /// The smallest positive representable value, 10^-18.
    pub const EPSILON: FixedDecimal = FixedDecimal { units: 1 };

    fn from_units(units: i128) -> Result<Self> {
        if units.unsigned_abs() > Self::MAX_UNITS as u128 {
            return Err(CertrailError::Overflow(format!(
                "magnitude {} exceeds representable range",
                units.unsigned_abs()
            )));
        }
        Ok(FixedDecimal { units })
    }

    /// Construct from a whole integer.
    pub fn from_integer(i: i64) -> Result<Self> {
        let units = (i as i128)
            .checked_mul(SCALE as i128)
            .ok_or_else(|| CertrailError::Overflow(format!("integer {i} not representable")))?;
        Self::from_units(units)
    }

    /// Parse a canonical decimal string.
    ///
    /// Accepted form: optional leading `-`, one or more integer digits,
    /// optionally `.` followed by 1 to 18 fraction digits. Exponents, `+`
    /// signs, empty parts and fraction digits beyond the scale are rejected
    /// with [`CertrailError::Validation`] — excess precision is never
    /// silently truncated. Magnitudes beyond the representable range fail
    /// with [`CertrailError::Overflow`].
    pub fn from_decimal_string(s: &str) -> Result<Self> {
        let (negative, rest) = match s.strip_prefix('-') {
            Some(r) => (true, r),
            None => (false, s),
        };
        if rest.is_empty() {
            return Err(CertrailError::Validation("empty decimal string".into()));
        }

        let (int_str, frac_str) = match rest.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (rest, None),
        };

        if int_str.is_empty() || !int_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CertrailError::Validation(format!(
                "malformed integer part in decimal string {s:?}"
            )));
        }
        if let Some(f) = frac_str {
            if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) {
                return Err(CertrailError::Validation(format!(
                    "malformed fraction part in decimal string {s:?}"
                )));
            }
            if f.len() > FRACTION_DIGITS as usize {
                return Err(CertrailError::Validation(format!(
                    "fraction exceeds {FRACTION_DIGITS} digits in decimal string {s:?}"
                )));
            }
        }

        let whole: u128 = int_str
            .parse()
            .map_err(|_| CertrailError::Overflow(format!("integer part of {s:?} out of range")))?;

        let frac_units: u128 = match frac_str {
            None => 0,
            Some(f) => {
                // Digits already validated; pad right to the full scale.
                let parsed: u128 = f.parse().expect("validated digits");
                parsed * 10u128.pow(FRACTION_DIGITS - f.len() as u32)
            }
        };

        let magnitude = whole
            .checked_mul(SCALE)
            .and_then(|w| w.checked_add(frac_units))
            .ok_or_else(|| CertrailError::Overflow(format!("decimal {s:?} out of range")))?;
        if magnitude > Self::MAX_UNITS as u128 {
            return Err(CertrailError::Overflow(format!("decimal {s:?} out of range")));
        }

        let units = if negative {
            -(magnitude as i128)
        } else {
            magnitude as i128
        };
        Ok(FixedDecimal { units })
    }

    /// Checked addition.
    pub fn add(&self, other: &FixedDecimal) -> Result<FixedDecimal> {
        let units = self
            .units
            .checked_add(other.units)
            .ok_or_else(|| CertrailError::Overflow("addition overflow".into()))?;
        Self::from_units(units)
    }

    /// Checked subtraction.
    pub fn sub(&self, other: &FixedDecimal) -> Result<FixedDecimal> {
        let units = self
            .units
            .checked_sub(other.units)
            .ok_or_else(|| CertrailError::Overflow("subtraction overflow".into()))?;
        Self::from_units(units)
    }

    /// Checked multiplication with floor rounding of the discarded fraction.
    ///
    /// Magnitudes are split at the scale boundary so every intermediate
    /// product stays within checked `u128` arithmetic; any intermediate
    /// overflow implies the true result is outside the representable range.
    pub fn mul(&self, other: &FixedDecimal) -> Result<FixedDecimal> {
        let negative = (self.units < 0) != (other.units < 0);
        let ma = self.units.unsigned_abs();
        let mb = other.units.unsigned_abs();

        let (a1, a0) = (ma / SCALE, ma % SCALE);
        let (b1, b0) = (mb / SCALE, mb % SCALE);

        let overflow = || CertrailError::Overflow("multiplication overflow".into());
        let hi = a1
            .checked_mul(b1)
            .and_then(|x| x.checked_mul(SCALE))
            .ok_or_else(overflow)?;
        let mid1 = a1.checked_mul(b0).ok_or_else(overflow)?;
        let mid2 = a0.checked_mul(b1).ok_or_else(overflow)?;
        let low = a0 * b0; // both < 10^18, product < 10^36
        let low_q = low / SCALE;
        let low_r = low % SCALE;

        let mut magnitude = hi
            .checked_add(mid1)
            .and_then(|x| x.checked_add(mid2))
            .and_then(|x| x.checked_add(low_q))
            .ok_or_else(overflow)?;
        if negative && low_r != 0 {
            magnitude = magnitude.checked_add(1).ok_or_else(overflow)?;
        }
        Self::signed(negative, magnitude, overflow)
    }

    /// Checked division with floor rounding.
    ///
    /// Division by zero fails with [`CertrailError::Validation`]. The
    /// fractional digits are produced by base-10 long division, so the
    /// result is exact up to the scale and floored beyond it.
    pub fn div(&self, other: &FixedDecimal) -> Result<FixedDecimal> {
        if other.units == 0 {
            return Err(CertrailError::Validation("division by zero".into()));
        }
        let negative = (self.units < 0) != (other.units < 0);
        let ma = self.units.unsigned_abs();
        let mb = other.units.unsigned_abs();

        let overflow = || CertrailError::Overflow("division overflow".into());
        let q0 = ma / mb;
        let mut rem = ma % mb;
        let int_part = q0.checked_mul(SCALE).ok_or_else(overflow)?;

        let mut frac: u128 = 0;
        for _ in 0..FRACTION_DIGITS {
            rem *= 10; // rem < mb <= 10^36, no overflow at 10^37
            frac = frac * 10 + rem / mb;
            rem %= mb;
        }

        let mut magnitude = int_part.checked_add(frac).ok_or_else(overflow)?;
        if negative && rem != 0 {
            magnitude = magnitude.checked_add(1).ok_or_else(overflow)?;
        }
        Self::signed(negative, magnitude, overflow)
    }

    fn signed(
        negative: bool,
        magnitude: u128,
        overflow: impl Fn() -> CertrailError,
    ) -> Result<FixedDecimal> {
        if magnitude > Self::MAX_UNITS as u128 {
            return Err(overflow());
        }
        let units = if negative {
            -(magnitude as i128)
        } else {
            magnitude as i128
        };
        Ok(FixedDecimal { units })
    }

    /// Exact comparison (integer comparison at the internal scale).
    pub fn compare(&self, other: &FixedDecimal) -> std::cmp::Ordering {
        self.units.cmp(&other.units)
    }

    pub fn is_negative(&self) -> bool {
        self.units < 0
    }

    pub fn is_zero(&self) -> bool {
        self.units == 0
    }

    /// Canonical minimal rendering: fraction trailing zeros trimmed, no
    /// decimal point when the fraction is zero. Round-trips through
    /// [`FixedDecimal::from_decimal_string`].
    pub fn to_decimal_string(&self) -> String {
        let magnitude = self.units.unsigned_abs();
        let sign = if self.units < 0 { "-" } else { "" };
        let whole = magnitude / SCALE;
        let frac = magnitude % SCALE;
        if frac == 0 {
            format!("{sign}{whole}")
        } else {
            let digits = format!("{frac:018}");
            format!("{sign}{whole}.{}", digits.trim_end_matches('0'))
        }
    }
}

impl std::fmt::Display for FixedDecimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_decimal_string())
    }
}

impl Serialize for FixedDecimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal_string())
    }
}

impl<'de> Deserialize<'de> for FixedDecimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FixedDecimal::from_decimal_string(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cmp::Ordering;

    fn dec(s: &str) -> FixedDecimal {
        FixedDecimal::from_decimal_string(s).expect("valid decimal")
    }

    #[test]
    fn addition_is_exact() {
        assert_eq!(dec("10.5").add(&dec("5.25")).unwrap(), dec("15.75"));
        // The classic binary-float counterexample stays exact here.
        assert_eq!(dec("0.1").add(&dec("0.2")).unwrap(), dec("0.3"));
    }

    #[test]
    fn subtraction_crosses_zero() {
        assert_eq!(dec("1.5").sub(&dec("2")).unwrap(), dec("-0.5"));
    }

    #[test]
    fn multiplication_is_exact_within_scale() {
        assert_eq!(dec("1.5").mul(&dec("2")).unwrap(), dec("3"));
        assert_eq!(dec("0.5").mul(&dec("0.5")).unwrap(), dec("0.25"));
        assert_eq!(dec("-2.5").mul(&dec("4")).unwrap(), dec("-10"));
    }

    #[test]
    fn division_floors_uniformly() {
        // 1/3 floors the 19th digit away.
        assert_eq!(dec("1").div(&dec("3")).unwrap(), dec("0.333333333333333333"));
        // Floor rounds negative results toward negative infinity.
        assert_eq!(
            dec("-1").div(&dec("3")).unwrap(),
            dec("-0.333333333333333334")
        );
        assert_eq!(dec("-7").div(&dec("2")).unwrap(), dec("-3.5"));
    }

    #[test]
    fn multiplication_floors_discarded_fraction() {
        // epsilon * 0.1 = 10^-19, floored to zero for positive values...
        assert_eq!(
            FixedDecimal::EPSILON.mul(&dec("0.1")).unwrap(),
            FixedDecimal::ZERO
        );
        // ...and to -epsilon for negative ones.
        assert_eq!(
            dec("-0.000000000000000001").mul(&dec("0.1")).unwrap(),
            dec("-0.000000000000000001")
        );
    }

    #[test]
    fn division_by_zero_is_validation() {
        let err = dec("1").div(&FixedDecimal::ZERO).unwrap_err();
        assert!(matches!(err, CertrailError::Validation(_)));
    }

    #[test]
    fn overflow_never_wraps() {
        let huge = dec("999999999999999999");
        let err = huge.mul(&huge).unwrap_err();
        assert!(matches!(err, CertrailError::Overflow(_)));

        let max = dec("1000000000000000000");
        assert!(matches!(
            max.add(&FixedDecimal::EPSILON).unwrap_err(),
            CertrailError::Overflow(_)
        ));
    }

    #[test]
    fn malformed_strings_rejected() {
        for s in [
            "", "-", ".", "1.", ".5", "+1", "1e5", "1.2.3", "abc", "1,5", " 1", "1 ",
            "0.0000000000000000001", // 19 fraction digits
        ] {
            let err = FixedDecimal::from_decimal_string(s).unwrap_err();
            assert!(
                matches!(err, CertrailError::Validation(_)),
                "expected Validation for {s:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn out_of_range_string_is_overflow() {
        let err = FixedDecimal::from_decimal_string("1000000000000000001").unwrap_err();
        assert!(matches!(err, CertrailError::Overflow(_)));
    }

    #[test]
    fn canonical_rendering_is_minimal() {
        assert_eq!(dec("10.500").to_decimal_string(), "10.5");
        assert_eq!(dec("10.000000000000000000").to_decimal_string(), "10");
        assert_eq!(dec("-0.25").to_decimal_string(), "-0.25");
        assert_eq!(FixedDecimal::ZERO.to_decimal_string(), "0");
        assert_eq!(dec("-0").to_decimal_string(), "0");
    }

    #[test]
    fn from_integer_matches_strings() {
        assert_eq!(FixedDecimal::from_integer(42).unwrap(), dec("42"));
        assert_eq!(FixedDecimal::from_integer(-7).unwrap(), dec("-7"));
        assert!(matches!(
            FixedDecimal::from_integer(i64::MAX).unwrap_err(),
            CertrailError::Overflow(_)
        ));
    }

    #[test]
    fn ordering_is_exact() {
        assert_eq!(dec("1.5").compare(&dec("1.5")), Ordering::Equal);
        assert_eq!(dec("-2").compare(&dec("1")), Ordering::Less);
        assert_eq!(
            dec("0.000000000000000002").compare(&dec("0.000000000000000001")),
            Ordering::Greater
        );
    }

    fn small_decimal() -> impl Strategy<Value = FixedDecimal> {
        (-1_000_000_000i64..=1_000_000_000, 0u32..=17).prop_map(|(n, shift)| {
            let base = FixedDecimal::from_integer(n).unwrap();
            let divisor = FixedDecimal::from_integer(10i64.pow(shift)).unwrap();
            base.div(&divisor).unwrap()
        })
    }

    proptest! {
        #[test]
        fn string_roundtrip(d in small_decimal()) {
            let s = d.to_decimal_string();
            prop_assert_eq!(FixedDecimal::from_decimal_string(&s).unwrap(), d);
        }

        #[test]
        fn addition_commutes(a in small_decimal(), b in small_decimal()) {
            prop_assert_eq!(a.add(&b).unwrap(), b.add(&a).unwrap());
        }

        #[test]
        fn multiplication_commutes(a in small_decimal(), b in small_decimal()) {
            prop_assert_eq!(a.mul(&b).unwrap(), b.mul(&a).unwrap());
        }

        #[test]
        fn add_then_sub_roundtrips(a in small_decimal(), b in small_decimal()) {
            prop_assert_eq!(a.add(&b).unwrap().sub(&b).unwrap(), a);
        }

        #[test]
        fn division_result_times_divisor_never_exceeds_dividend_magnitude(
            n in 1i64..=1_000_000, d in 1i64..=1_000_000
        ) {
            let a = FixedDecimal::from_integer(n).unwrap();
            let b = FixedDecimal::from_integer(d).unwrap();
            let q = a.div(&b).unwrap();
            let back = q.mul(&b).unwrap();
            prop_assert!(back.compare(&a) != Ordering::Greater);
        }
    }
}
