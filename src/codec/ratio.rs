//! Exact rational numbers for register scaling
//!
//! Scale factors such as `0.1` or `0.01` are kept as reduced fractions so
//! that decoding `245` with scale `0.1` yields exactly `49/2` (24.5) and
//! encoding it back yields exactly `245`, with no floating-point drift.

use crate::error::{Result, SolarmapError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Longest decimal fraction accepted when parsing or printing
const MAX_FRACTION_DIGITS: u32 = 18;

/// Reduced fraction with a positive denominator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ratio {
    numer: i64,
    denom: i64,
}

fn gcd(a: i128, b: i128) -> i128 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl Ratio {
    pub const ZERO: Ratio = Ratio { numer: 0, denom: 1 };
    pub const ONE: Ratio = Ratio { numer: 1, denom: 1 };

    /// Build a reduced fraction. Returns `None` for a zero denominator.
    pub fn new(numer: i64, denom: i64) -> Option<Self> {
        Self::from_i128(i128::from(numer), i128::from(denom))
    }

    fn from_i128(numer: i128, denom: i128) -> Option<Self> {
        if denom == 0 {
            return None;
        }
        let g = gcd(numer, denom).max(1);
        let (mut n, mut d) = (numer / g, denom / g);
        if d < 0 {
            n = -n;
            d = -d;
        }
        Some(Self {
            numer: i64::try_from(n).ok()?,
            denom: i64::try_from(d).ok()?,
        })
    }

    pub const fn from_integer(value: i64) -> Self {
        Self {
            numer: value,
            denom: 1,
        }
    }

    pub const fn numer(&self) -> i64 {
        self.numer
    }

    pub const fn denom(&self) -> i64 {
        self.denom
    }

    pub const fn is_integer(&self) -> bool {
        self.denom == 1
    }

    pub const fn is_zero(&self) -> bool {
        self.numer == 0
    }

    pub fn checked_mul(self, other: Ratio) -> Option<Ratio> {
        Self::from_i128(
            i128::from(self.numer) * i128::from(other.numer),
            i128::from(self.denom) * i128::from(other.denom),
        )
    }

    pub fn checked_div(self, other: Ratio) -> Option<Ratio> {
        if other.numer == 0 {
            return None;
        }
        Self::from_i128(
            i128::from(self.numer) * i128::from(other.denom),
            i128::from(self.denom) * i128::from(other.numer),
        )
    }

    /// Nearest integer, ties rounded away from zero
    pub fn round(self) -> i128 {
        let n = i128::from(self.numer);
        let d = i128::from(self.denom);
        let floor = n.div_euclid(d);
        let rem = n.rem_euclid(d);
        match (2 * rem).cmp(&d) {
            Ordering::Greater => floor + 1,
            Ordering::Equal if n >= 0 => floor + 1,
            _ => floor,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(self) -> f64 {
        self.numer as f64 / self.denom as f64
    }

    /// Convert a float through its shortest decimal representation, so
    /// `24.5` becomes `49/2` and `0.1` becomes `1/10`.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        value.to_string().parse().ok()
    }

    /// Number of decimal places needed to print this value exactly, if any
    fn decimal_places(&self) -> Option<u32> {
        let d = i128::from(self.denom);
        (0..=MAX_FRACTION_DIGITS).find(|places| 10i128.pow(*places) % d == 0)
    }
}

impl Default for Ratio {
    fn default() -> Self {
        Ratio::ZERO
    }
}

impl From<i64> for Ratio {
    fn from(value: i64) -> Self {
        Ratio::from_integer(value)
    }
}

impl Ord for Ratio {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = i128::from(self.numer) * i128::from(other.denom);
        let rhs = i128::from(other.numer) * i128::from(self.denom);
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for Ratio {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(places) = self.decimal_places() else {
            return write!(f, "{}/{}", self.numer, self.denom);
        };
        let scale = 10i128.pow(places);
        let scaled = i128::from(self.numer) * (scale / i128::from(self.denom));
        let sign = if scaled < 0 { "-" } else { "" };
        let abs = scaled.abs();
        if places == 0 {
            write!(f, "{}{}", sign, abs)
        } else {
            write!(
                f,
                "{}{}.{:0width$}",
                sign,
                abs / scale,
                abs % scale,
                width = places as usize
            )
        }
    }
}

impl FromStr for Ratio {
    type Err = SolarmapError;

    /// Accepts integers (`10`), decimals (`-0.01`) and fractions (`1/3`)
    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        let invalid = || SolarmapError::invalid_input(format!("Invalid rational number: {:?}", s));

        if let Some((n, d)) = text.split_once('/') {
            let n: i64 = n.trim().parse().map_err(|_| invalid())?;
            let d: i64 = d.trim().parse().map_err(|_| invalid())?;
            return Ratio::new(n, d).ok_or_else(invalid);
        }

        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty())
            || !all_digits(int_part)
            || !all_digits(frac_part)
            || frac_part.len() > MAX_FRACTION_DIGITS as usize
        {
            return Err(invalid());
        }

        let mut numer: i128 = format!("{}{}", int_part, frac_part)
            .parse()
            .map_err(|_| invalid())?;
        if negative {
            numer = -numer;
        }
        let denom = 10i128.pow(u32::try_from(frac_part.len()).map_err(|_| invalid())?);
        Ratio::from_i128(numer, denom).ok_or_else(invalid)
    }
}

impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.is_integer() {
            serializer.serialize_i64(self.numer)
        } else {
            serializer.serialize_f64(self.to_f64())
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RatioRepr {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match RatioRepr::deserialize(deserializer)? {
            RatioRepr::Integer(v) => Ok(Ratio::from_integer(v)),
            RatioRepr::Float(v) => Ratio::from_f64(v).ok_or_else(|| {
                serde::de::Error::custom(format!("cannot represent {} as a ratio", v))
            }),
            RatioRepr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
