use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// The physical representation of a column's values as stored
/// in its primary buffer.
///
/// This is a closed set: every typed entry point of the column
/// dispatches over it exactly once per call.
pub enum Dtype {
    /// The unset marker. Columns of this dtype store nothing.
    None = 0,
    I8 = 1,
    I16 = 2,
    I32 = 3,
    I64 = 4,
    U8 = 5,
    U16 = 6,
    U32 = 7,
    U64 = 8,
    F32 = 9,
    F64 = 10,
    Bool = 11,
    /// A 64-bit time value (milliseconds since the unix epoch).
    Time = 12,
    /// A 32-bit packed calendar date.
    Date = 13,
    /// A numerator/denominator pair of 64-bit floats.
    Ratio = 14,
    /// Variable-length string data, stored by dictionary id.
    Str = 15,
    /// An opaque caller-defined fixed-size payload.
    ///
    /// Bypasses the size invariant checks; only constructible by
    /// attaching an explicit buffer descriptor.
    UserFixed = 16,
}

impl Dtype {
    /// Returns the byte width of one stored element.
    ///
    /// [Dtype::Str] columns store a fixed-width dictionary id, so they
    /// report the id width here. Asking for the width of a
    /// [Dtype::UserFixed] column is a contract violation.
    pub fn fixed_width(self) -> usize {
        match self {
            Dtype::None => 0,
            Dtype::I8 | Dtype::U8 | Dtype::Bool => 1,
            Dtype::I16 | Dtype::U16 => 2,
            Dtype::I32 | Dtype::U32 | Dtype::F32 | Dtype::Date => 4,
            Dtype::I64 | Dtype::U64 | Dtype::F64 | Dtype::Time | Dtype::Str => 8,
            Dtype::Ratio => 16,
            Dtype::UserFixed => {
                panic!("User-fixed dtype has no statically known element width")
            },
        }
    }

    #[inline]
    /// Returns `true` if values of this dtype are stored by
    /// dictionary indirection.
    pub fn is_vlen(self) -> bool {
        matches!(self, Dtype::Str)
    }

    #[inline]
    /// Returns `true` if the element width is known without
    /// caller-provided context.
    pub fn has_deterministic_width(self) -> bool {
        !matches!(self, Dtype::UserFixed)
    }
}

impl Display for Dtype {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Dtype::None => "none",
            Dtype::I8 => "i8",
            Dtype::I16 => "i16",
            Dtype::I32 => "i32",
            Dtype::I64 => "i64",
            Dtype::U8 => "u8",
            Dtype::U16 => "u16",
            Dtype::U32 => "u32",
            Dtype::U64 => "u64",
            Dtype::F32 => "f32",
            Dtype::F64 => "f64",
            Dtype::Bool => "bool",
            Dtype::Time => "time",
            Dtype::Date => "date",
            Dtype::Ratio => "ratio",
            Dtype::Str => "str",
            Dtype::UserFixed => "user-fixed",
        };
        write!(f, "{name}")
    }
}
