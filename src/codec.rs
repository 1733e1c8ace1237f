//! Register codec
//!
//! Pure conversions between raw 16-bit register words and typed values.
//! Multi-word values are big-endian: the first register holds the high word.
//! Nothing in here performs I/O.

mod ratio;

pub use ratio::Ratio;

use crate::error::{Result, SolarmapError};
use crate::registers::Encoding;
use chrono::{NaiveTime, Timelike};
use serde::Serialize;
use std::fmt;

/// Enum register value. Firmware may report states missing from the mapping,
/// so those are preserved instead of rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EnumValue {
    Known(String),
    RawUnmapped(u32),
}

/// Typed value of a register (or of one field of a composite setting)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TypedValue {
    Unsigned(u32),
    Signed(i32),
    Decimal(Ratio),
    Enum(EnumValue),
    Time(NaiveTime),
    Flag(bool),
}

impl TypedValue {
    /// Numeric view used by range and ordering rules
    pub fn as_ratio(&self) -> Option<Ratio> {
        match self {
            TypedValue::Unsigned(v) => Some(Ratio::from_integer(i64::from(*v))),
            TypedValue::Signed(v) => Some(Ratio::from_integer(i64::from(*v))),
            TypedValue::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            TypedValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            TypedValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    /// Convenience for hosts that hold measurements as floats
    pub fn decimal_from_f64(value: f64) -> Option<Self> {
        Ratio::from_f64(value).map(TypedValue::Decimal)
    }

    pub fn known<S: Into<String>>(label: S) -> Self {
        TypedValue::Enum(EnumValue::Known(label.into()))
    }

    /// Time of day from hour and minute, `None` when out of range
    pub fn time(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(TypedValue::Time)
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Unsigned(v) => write!(f, "{}", v),
            TypedValue::Signed(v) => write!(f, "{}", v),
            TypedValue::Decimal(v) => write!(f, "{}", v),
            TypedValue::Enum(EnumValue::Known(label)) => write!(f, "{}", label),
            TypedValue::Enum(EnumValue::RawUnmapped(raw)) => write!(f, "unmapped({})", raw),
            TypedValue::Time(t) => write!(f, "{}", t.format("%H:%M")),
            TypedValue::Flag(b) => write!(f, "{}", b),
        }
    }
}

impl From<u32> for TypedValue {
    fn from(value: u32) -> Self {
        TypedValue::Unsigned(value)
    }
}

impl From<i32> for TypedValue {
    fn from(value: i32) -> Self {
        TypedValue::Signed(value)
    }
}

impl From<Ratio> for TypedValue {
    fn from(value: Ratio) -> Self {
        TypedValue::Decimal(value)
    }
}

impl From<NaiveTime> for TypedValue {
    fn from(value: NaiveTime) -> Self {
        TypedValue::Time(value)
    }
}

impl From<bool> for TypedValue {
    fn from(value: bool) -> Self {
        TypedValue::Flag(value)
    }
}

/// Encoder/decoder with a configurable rounding tolerance for scaled writes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Codec {
    /// Largest distance (in raw register units) between a scaled value and
    /// the nearest integer that is still accepted and rounded
    rounding_tolerance: f64,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            rounding_tolerance: 1e-6,
        }
    }
}

impl Codec {
    pub fn new(rounding_tolerance: f64) -> Self {
        Self {
            rounding_tolerance: rounding_tolerance.abs(),
        }
    }

    pub fn rounding_tolerance(&self) -> f64 {
        self.rounding_tolerance
    }

    /// Decode raw words; see [`decode`]
    pub fn decode(&self, encoding: &Encoding, words: &[u16]) -> Result<TypedValue> {
        decode(encoding, words)
    }

    /// Encode a typed value into `word_count` raw words
    pub fn encode(
        &self,
        encoding: &Encoding,
        word_count: u8,
        value: &TypedValue,
    ) -> Result<Vec<u16>> {
        let words = check_word_count(encoding, usize::from(word_count))?;
        match encoding {
            Encoding::UnsignedInt16 | Encoding::UnsignedInt32 => {
                pack(integer_of(encoding, value)?, words, false)
            }
            Encoding::SignedInt16 | Encoding::SignedInt32 => {
                pack(integer_of(encoding, value)?, words, true)
            }
            Encoding::ScaledDecimal { scale, signed } => {
                let raw = self.unscale(value, *scale)?;
                pack(raw, words, *signed)
            }
            Encoding::BitEnum { mapping } => {
                let raw = match value {
                    TypedValue::Enum(EnumValue::Known(label)) => mapping
                        .iter()
                        .find(|(_, l)| *l == label)
                        .map(|(raw, _)| *raw)
                        .ok_or_else(|| {
                            SolarmapError::invalid_input(format!("Unknown enum label {:?}", label))
                        })?,
                    TypedValue::Enum(EnumValue::RawUnmapped(raw)) | TypedValue::Unsigned(raw) => {
                        *raw
                    }
                    other => return Err(type_mismatch(encoding, other)),
                };
                pack(i64::from(raw), words, false)
            }
            Encoding::TimeOfDay => {
                let time = value
                    .as_time()
                    .ok_or_else(|| type_mismatch(encoding, value))?;
                if time.second() != 0 || time.nanosecond() != 0 {
                    return Err(SolarmapError::invalid_input(format!(
                        "Time {} has sub-minute precision",
                        time
                    )));
                }
                pack(i64::from((time.hour() << 8) | time.minute()), words, false)
            }
            Encoding::Flag => {
                let raw = match value {
                    TypedValue::Flag(b) => u32::from(*b),
                    TypedValue::Unsigned(raw @ (0 | 1)) => *raw,
                    other => return Err(type_mismatch(encoding, other)),
                };
                pack(i64::from(raw), words, false)
            }
        }
    }

    /// Divide by the scale and snap to an integer register value
    fn unscale(&self, value: &TypedValue, scale: Ratio) -> Result<i64> {
        let ratio = value.as_ratio().ok_or_else(|| {
            SolarmapError::invalid_input(format!("Expected a numeric value, got {:?}", value))
        })?;
        let quotient = ratio.checked_div(scale).ok_or_else(|| {
            SolarmapError::invalid_input(format!("Cannot scale {} by {}", ratio, scale))
        })?;
        let nearest = quotient.round();
        if !quotient.is_integer() {
            // Compare |quotient - nearest| * denom, an exact integer no larger
            // than denom / 2, so large register values lose no precision
            let denom = i128::from(quotient.denom());
            let offset = (i128::from(quotient.numer()) - nearest * denom).abs();
            #[allow(clippy::cast_precision_loss)]
            let within = offset as f64 <= self.rounding_tolerance * denom as f64;
            if !within {
                return Err(SolarmapError::invalid_input(format!(
                    "{} is not a multiple of scale {}",
                    ratio, scale
                )));
            }
        }
        i64::try_from(nearest)
            .map_err(|_| SolarmapError::out_of_range(format!("{} overflows a register", ratio)))
    }
}

/// Decode raw words under an encoding.
///
/// Integer encodings combine words high word first and apply two's
/// complement for the signed variants. Scaled decimals multiply the integer
/// by the exact scale. Unmapped enum values come back as
/// [`EnumValue::RawUnmapped`].
pub fn decode(encoding: &Encoding, words: &[u16]) -> Result<TypedValue> {
    let count = check_word_count(encoding, words.len())?;
    let raw = combine(words);
    let value = match encoding {
        Encoding::UnsignedInt16 | Encoding::UnsignedInt32 => TypedValue::Unsigned(raw),
        Encoding::SignedInt16 | Encoding::SignedInt32 => {
            let signed = sign_extend(raw, count);
            TypedValue::Signed(i32::try_from(signed).map_err(|_| {
                SolarmapError::out_of_range(format!("{} does not fit in i32", signed))
            })?)
        }
        Encoding::ScaledDecimal { scale, signed } => {
            let int = if *signed {
                sign_extend(raw, count)
            } else {
                i64::from(raw)
            };
            let scaled = Ratio::from_integer(int).checked_mul(*scale).ok_or_else(|| {
                SolarmapError::out_of_range(format!("{} scaled by {} overflows", int, scale))
            })?;
            TypedValue::Decimal(scaled)
        }
        Encoding::BitEnum { mapping } => TypedValue::Enum(match mapping.get(&raw) {
            Some(label) => EnumValue::Known(label.clone()),
            None => EnumValue::RawUnmapped(raw),
        }),
        Encoding::TimeOfDay => {
            let (hour, minute) = (raw >> 8, raw & 0xFF);
            let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
                SolarmapError::invalid_input(format!(
                    "Register value {:#06x} is not a time of day",
                    raw
                ))
            })?;
            TypedValue::Time(time)
        }
        Encoding::Flag => TypedValue::Flag(raw != 0),
    };
    Ok(value)
}

fn check_word_count(encoding: &Encoding, count: usize) -> Result<usize> {
    let accepted = match encoding.required_word_count() {
        Some(required) => count == usize::from(required),
        None => count == 1 || count == 2,
    };
    if accepted {
        Ok(count)
    } else {
        Err(SolarmapError::invalid_input(format!(
            "{} cannot use {} register words",
            encoding.kind_name(),
            count
        )))
    }
}

fn combine(words: &[u16]) -> u32 {
    words
        .iter()
        .fold(0u32, |acc, w| (acc << 16) | u32::from(*w))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn sign_extend(raw: u32, words: usize) -> i64 {
    if words == 1 {
        i64::from(raw as u16 as i16)
    } else {
        i64::from(raw as i32)
    }
}

fn integer_of(encoding: &Encoding, value: &TypedValue) -> Result<i64> {
    match value {
        TypedValue::Unsigned(v) => Ok(i64::from(*v)),
        TypedValue::Signed(v) => Ok(i64::from(*v)),
        TypedValue::Decimal(r) if r.is_integer() => Ok(r.numer()),
        other => Err(type_mismatch(encoding, other)),
    }
}

/// Range-check and split an integer into big-endian words
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pack(raw: i64, words: usize, signed: bool) -> Result<Vec<u16>> {
    let (min, max) = match (words, signed) {
        (1, false) => (0, i64::from(u16::MAX)),
        (1, true) => (i64::from(i16::MIN), i64::from(i16::MAX)),
        (_, false) => (0, i64::from(u32::MAX)),
        (_, true) => (i64::from(i32::MIN), i64::from(i32::MAX)),
    };
    if raw < min || raw > max {
        return Err(SolarmapError::out_of_range(format!(
            "{} does not fit in {} {} register word(s)",
            raw,
            words,
            if signed { "signed" } else { "unsigned" }
        )));
    }
    let bits = raw as u32;
    Ok(if words == 1 {
        vec![bits as u16]
    } else {
        vec![(bits >> 16) as u16, bits as u16]
    })
}

fn type_mismatch(encoding: &Encoding, value: &TypedValue) -> SolarmapError {
    SolarmapError::invalid_input(format!(
        "{:?} cannot be encoded as {}",
        value,
        encoding.kind_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn scaled(scale: &str, signed: bool) -> Encoding {
        Encoding::ScaledDecimal {
            scale: scale.parse().unwrap(),
            signed,
        }
    }

    #[test]
    fn test_decode_scaled_decimal() {
        let value = decode(&scaled("0.1", false), &[245]).unwrap();
        assert_eq!(value, TypedValue::Decimal("24.5".parse().unwrap()));
        assert_eq!(value.to_string(), "24.5");
    }

    #[test]
    fn test_decode_signed_int16() {
        let value = decode(&Encoding::SignedInt16, &[0xFFFE]).unwrap();
        assert_eq!(value, TypedValue::Signed(-2));
    }

    #[test]
    fn test_decode_32bit_high_word_first() {
        let value = decode(&Encoding::UnsignedInt32, &[0x0001, 0x0002]).unwrap();
        assert_eq!(value, TypedValue::Unsigned(0x0001_0002));
        let value = decode(&Encoding::SignedInt32, &[0xFFFF, 0xFFFF]).unwrap();
        assert_eq!(value, TypedValue::Signed(-1));
    }

    #[test]
    fn test_decode_signed_scaled() {
        let value = decode(&scaled("0.01", true), &[0xFF9C]).unwrap();
        assert_eq!(value, TypedValue::Decimal("-1".parse().unwrap()));
    }

    #[test]
    fn test_decode_bit_enum_unmapped() {
        let mut mapping = BTreeMap::new();
        mapping.insert(0, "self_use".to_string());
        let encoding = Encoding::BitEnum { mapping };
        assert_eq!(
            decode(&encoding, &[0]).unwrap(),
            TypedValue::known("self_use")
        );
        assert_eq!(
            decode(&encoding, &[7]).unwrap(),
            TypedValue::Enum(EnumValue::RawUnmapped(7))
        );
    }

    #[test]
    fn test_decode_time_of_day() {
        assert_eq!(
            decode(&Encoding::TimeOfDay, &[0x0517]).unwrap(),
            TypedValue::time(5, 23).unwrap()
        );
        assert!(decode(&Encoding::TimeOfDay, &[0x1800]).is_err());
        assert!(decode(&Encoding::TimeOfDay, &[0x003C]).is_err());
    }

    #[test]
    fn test_decode_wrong_word_count() {
        assert!(decode(&Encoding::UnsignedInt32, &[1]).is_err());
        assert!(decode(&Encoding::UnsignedInt16, &[1, 2]).is_err());
        assert!(decode(&scaled("0.1", false), &[]).is_err());
    }

    #[test]
    fn test_encode_out_of_range() {
        let codec = Codec::default();
        let err = codec
            .encode(&Encoding::SignedInt16, 1, &TypedValue::Signed(40_000))
            .unwrap_err();
        assert!(matches!(err, SolarmapError::ValueOutOfRange { .. }));
        let err = codec
            .encode(&Encoding::UnsignedInt16, 1, &TypedValue::Signed(-1))
            .unwrap_err();
        assert!(matches!(err, SolarmapError::ValueOutOfRange { .. }));
    }

    #[test]
    fn test_encode_scaled_rounding_tolerance() {
        let strict = Codec::new(0.0);
        let value = TypedValue::Decimal("24.55".parse().unwrap());
        let err = strict.encode(&scaled("0.1", false), 1, &value).unwrap_err();
        assert!(matches!(err, SolarmapError::InvalidEncodingInput { .. }));

        let lenient = Codec::new(0.5);
        assert_eq!(
            lenient.encode(&scaled("0.1", false), 1, &value).unwrap(),
            vec![246]
        );
    }

    #[test]
    fn test_encode_tolerance_near_u32_max() {
        let codec = Codec::default();
        let base = i64::from(u32::MAX) * 10_000_000;
        let close = TypedValue::Decimal(Ratio::new(base + 5, 10_000_000).unwrap());
        assert_eq!(
            codec.encode(&scaled("1", false), 2, &close).unwrap(),
            vec![0xFFFF, 0xFFFF]
        );

        let far = TypedValue::Decimal(Ratio::new(base + 11, 10_000_000).unwrap());
        let err = codec.encode(&scaled("1", false), 2, &far).unwrap_err();
        assert!(matches!(err, SolarmapError::InvalidEncodingInput { .. }));
    }

    #[test]
    fn test_encode_type_mismatch() {
        let codec = Codec::default();
        let err = codec
            .encode(&Encoding::TimeOfDay, 1, &TypedValue::Unsigned(3))
            .unwrap_err();
        assert!(matches!(err, SolarmapError::InvalidEncodingInput { .. }));
        let err = codec
            .encode(&Encoding::Flag, 1, &TypedValue::Unsigned(2))
            .unwrap_err();
        assert!(matches!(err, SolarmapError::InvalidEncodingInput { .. }));
    }

    #[test]
    fn test_round_trip_representative_values() {
        let codec = Codec::default();
        let mut mapping = BTreeMap::new();
        mapping.insert(1, "feed_in_first".to_string());
        let cases: Vec<(Encoding, u8, TypedValue)> = vec![
            (Encoding::UnsignedInt16, 1, TypedValue::Unsigned(65_535)),
            (Encoding::UnsignedInt32, 2, TypedValue::Unsigned(123_456_789)),
            (Encoding::SignedInt16, 1, TypedValue::Signed(-32_768)),
            (Encoding::SignedInt32, 2, TypedValue::Signed(-70_000)),
            (scaled("0.1", false), 1, TypedValue::Decimal("24.5".parse().unwrap())),
            (scaled("0.01", true), 2, TypedValue::Decimal("-1234.56".parse().unwrap())),
            (Encoding::BitEnum { mapping: mapping.clone() }, 1, TypedValue::known("feed_in_first")),
            (Encoding::BitEnum { mapping }, 1, TypedValue::Enum(EnumValue::RawUnmapped(9))),
            (Encoding::TimeOfDay, 1, TypedValue::time(23, 59).unwrap()),
            (Encoding::Flag, 1, TypedValue::Flag(true)),
        ];
        for (encoding, words, value) in cases {
            let raw = codec.encode(&encoding, words, &value).unwrap();
            assert_eq!(raw.len(), usize::from(words));
            assert_eq!(decode(&encoding, &raw).unwrap(), value, "{:?}", encoding);
        }
    }
}
