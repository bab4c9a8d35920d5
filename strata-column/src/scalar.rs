//! The tagged single-value currency used for uniform reads and
//! writes across every physical dtype.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::dtype::Dtype;
use crate::validity::Status;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
/// A 64-bit time value, milliseconds since the unix epoch.
pub struct Time(i64);

impl Time {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> i64 {
        self.0
    }

    /// Converts a [DateTime] into its stored representation.
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime.timestamp_millis())
    }

    /// Converts the stored value back into a [DateTime].
    ///
    /// Returns `None` if the raw value is outside chrono's
    /// representable range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
/// A 32-bit packed calendar date: year in the high 16 bits, then
/// month and day bytes.
pub struct Date(u32);

impl Date {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn from_ymd(year: u16, month: u8, day: u8) -> Self {
        Self(((year as u32) << 16) | ((month as u32) << 8) | day as u32)
    }

    #[inline]
    pub fn year(self) -> u16 {
        (self.0 >> 16) as u16
    }

    #[inline]
    pub fn month(self) -> u8 {
        (self.0 >> 8) as u8
    }

    #[inline]
    pub fn day(self) -> u8 {
        self.0 as u8
    }

    /// Packs a [NaiveDate].
    ///
    /// Returns `None` for years outside the packable `0..=u16::MAX` range.
    pub fn from_naive(date: NaiveDate) -> Option<Self> {
        let year = u16::try_from(date.year()).ok()?;
        Some(Self::from_ymd(year, date.month() as u8, date.day() as u8))
    }

    /// Unpacks into a [NaiveDate], if the stored fields form a real date.
    pub fn to_naive(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year() as i32, self.month() as u32, self.day() as u32)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
/// The stored cell of a [Dtype::Ratio] column.
///
/// Written through the raw typed path; scalar reads collapse it to
/// `num / den`.
pub struct RatioPair {
    pub num: f64,
    pub den: f64,
}

#[derive(Debug, Clone, PartialEq)]
/// A single value of any physical dtype.
pub enum Value {
    None,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Time(Time),
    Date(Date),
    Str(Arc<str>),
}

#[derive(Debug, Clone, PartialEq)]
/// A [Value] with its per-row validity attached.
///
/// String payloads are shared with the owning column's dictionary via
/// [Arc], so reading a scalar never copies string bytes.
pub struct Scalar {
    pub value: Value,
    pub status: Status,
}

macro_rules! numeric_accessors {
    ($($name:ident -> $t:ty),* $(,)?) => {
        $(
            /// Reads the value as the target width, casting numerics and
            /// reading non-numeric payloads as zero.
            pub fn $name(&self) -> $t {
                match &self.value {
                    Value::None => 0 as $t,
                    Value::Bool(v) => *v as u8 as $t,
                    Value::I8(v) => *v as $t,
                    Value::I16(v) => *v as $t,
                    Value::I32(v) => *v as $t,
                    Value::I64(v) => *v as $t,
                    Value::U8(v) => *v as $t,
                    Value::U16(v) => *v as $t,
                    Value::U32(v) => *v as $t,
                    Value::U64(v) => *v as $t,
                    Value::F32(v) => *v as $t,
                    Value::F64(v) => *v as $t,
                    Value::Time(v) => v.raw() as $t,
                    Value::Date(v) => v.raw() as $t,
                    Value::Str(_) => 0 as $t,
                }
            }
        )*
    };
}

impl Scalar {
    /// An unset value marked invalid.
    pub fn null() -> Self {
        Self {
            value: Value::None,
            status: Status::Invalid,
        }
    }

    /// Wraps a string payload.
    pub fn str(value: impl Into<Arc<str>>) -> Self {
        Self {
            value: Value::Str(value.into()),
            status: Status::Valid,
        }
    }

    /// Replaces the attached validity status.
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Returns the dtype tag of the held value.
    pub fn dtype(&self) -> Dtype {
        match self.value {
            Value::None => Dtype::None,
            Value::Bool(_) => Dtype::Bool,
            Value::I8(_) => Dtype::I8,
            Value::I16(_) => Dtype::I16,
            Value::I32(_) => Dtype::I32,
            Value::I64(_) => Dtype::I64,
            Value::U8(_) => Dtype::U8,
            Value::U16(_) => Dtype::U16,
            Value::U32(_) => Dtype::U32,
            Value::U64(_) => Dtype::U64,
            Value::F32(_) => Dtype::F32,
            Value::F64(_) => Dtype::F64,
            Value::Time(_) => Dtype::Time,
            Value::Date(_) => Dtype::Date,
            Value::Str(_) => Dtype::Str,
        }
    }

    numeric_accessors! {
        as_i8 -> i8,
        as_i16 -> i16,
        as_i32 -> i32,
        as_i64 -> i64,
        as_u8 -> u8,
        as_u16 -> u16,
        as_u32 -> u32,
        as_u64 -> u64,
        as_f32 -> f32,
        as_f64 -> f64,
    }

    /// Reads the value as a boolean; any non-zero numeric is `true`.
    pub fn as_bool(&self) -> bool {
        match &self.value {
            Value::Bool(v) => *v,
            Value::F32(v) => *v != 0.0,
            Value::F64(v) => *v != 0.0,
            Value::Str(_) | Value::None => false,
            _ => self.as_i64() != 0,
        }
    }

    pub fn as_time(&self) -> Time {
        Time::new(self.as_i64())
    }

    pub fn as_date(&self) -> Date {
        Date::new(self.as_u32())
    }

    /// Returns the string payload, if the value carries one.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Value::$variant(value)
                }
            }

            impl From<$t> for Scalar {
                fn from(value: $t) -> Self {
                    Self {
                        value: Value::$variant(value),
                        status: Status::Valid,
                    }
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Time => Time,
    Date => Date,
    Arc<str> => Str,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::str(value)
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::str(value)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Scalar::from(300i32), 300, 44, 300.0)]
    #[case(Scalar::from(-2i64), -2, 254, -2.0)]
    #[case(Scalar::from(2.75f64), 2, 2, 2.75)]
    #[case(Scalar::from(true), 1, 1, 1.0)]
    #[case(Scalar::str("abc"), 0, 0, 0.0)]
    #[case(Scalar::null(), 0, 0, 0.0)]
    fn test_numeric_coercion(
        #[case] scalar: Scalar,
        #[case] as_i64: i64,
        #[case] as_u8: u8,
        #[case] as_f64: f64,
    ) {
        assert_eq!(scalar.as_i64(), as_i64);
        assert_eq!(scalar.as_u8(), as_u8);
        assert_eq!(scalar.as_f64(), as_f64);
    }

    #[test]
    fn test_scalar_tags_and_status() {
        assert_eq!(Scalar::from(1i32).dtype(), Dtype::I32);
        assert_eq!(Scalar::str("x").dtype(), Dtype::Str);
        assert_eq!(Scalar::null().dtype(), Dtype::None);
        assert_eq!(Scalar::null().status, Status::Invalid);
        assert_eq!(
            Scalar::from(1u8).with_status(Status::Cleared).status,
            Status::Cleared
        );
    }

    #[test]
    fn test_date_packing_round_trip() {
        let date = Date::from_ymd(2017, 3, 9);
        assert_eq!(date.year(), 2017);
        assert_eq!(date.month(), 3);
        assert_eq!(date.day(), 9);

        let naive = date.to_naive().expect("Unpack stored date");
        assert_eq!(Date::from_naive(naive), Some(date));
    }

    #[test]
    fn test_time_chrono_round_trip() {
        let datetime = Utc.with_ymd_and_hms(2017, 3, 9, 12, 30, 5).unwrap();
        let time = Time::from_datetime(datetime);
        assert_eq!(time.to_datetime(), Some(datetime));
    }

    #[test]
    fn test_string_payload_is_shared() {
        let backing: Arc<str> = Arc::from("shared");
        let scalar = Scalar::str(backing.clone());
        assert_eq!(scalar.as_str(), Some("shared"));
        assert_eq!(Arc::strong_count(&backing), 2);
    }
}
