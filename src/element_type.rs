//! Element types that random values can be produced for.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use bytemuck::Pod;
use half::{bf16, f16};

use crate::error::{Error, Result};

/// Runtime tag of an output element type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    Boolean,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F16,
    BF16,
    F32,
    F64,
}

impl ElementType {
    pub const ALL: [ElementType; 13] = [
        ElementType::Boolean,
        ElementType::I8,
        ElementType::U8,
        ElementType::I16,
        ElementType::U16,
        ElementType::I32,
        ElementType::U32,
        ElementType::I64,
        ElementType::U64,
        ElementType::F16,
        ElementType::BF16,
        ElementType::F32,
        ElementType::F64,
    ];

    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            ElementType::Boolean | ElementType::I8 | ElementType::U8 => 1,
            ElementType::I16 | ElementType::U16 | ElementType::F16 | ElementType::BF16 => 2,
            ElementType::I32 | ElementType::U32 | ElementType::F32 => 4,
            ElementType::I64 | ElementType::U64 | ElementType::F64 => 8,
        }
    }

    pub const fn is_real(self) -> bool {
        matches!(
            self,
            ElementType::F16 | ElementType::BF16 | ElementType::F32 | ElementType::F64
        )
    }

    pub const fn is_integral(self) -> bool {
        !self.is_real() && !matches!(self, ElementType::Boolean)
    }

    pub const fn name(self) -> &'static str {
        match self {
            ElementType::Boolean => "boolean",
            ElementType::I8 => "i8",
            ElementType::U8 => "u8",
            ElementType::I16 => "i16",
            ElementType::U16 => "u16",
            ElementType::I32 => "i32",
            ElementType::U32 => "u32",
            ElementType::I64 => "i64",
            ElementType::U64 => "u64",
            ElementType::F16 => "f16",
            ElementType::BF16 => "bf16",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ElementType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        ElementType::ALL
            .into_iter()
            .find(|t| t.name() == lower)
            .ok_or_else(|| Error::UnknownElementType(s.to_string()))
    }
}

/// Maps a Rust type to its [ElementType].
pub trait Element: Pod + PartialOrd {
    const TYPE: ElementType;
}

macro_rules! impl_element {
    ($($t:ty => $tag:ident),* $(,)?) => {
        $(impl Element for $t {
            const TYPE: ElementType = ElementType::$tag;
        })*
    };
}

impl_element!(
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f16 => F16,
    bf16 => BF16,
    f32 => F32,
    f64 => F64,
);

/// Read the first element of `bytes`. The slice must hold at least `size_of::<T>()` bytes.
#[inline]
pub(crate) fn read_scalar<T: Pod>(bytes: &[u8]) -> T {
    bytemuck::pod_read_unaligned(&bytes[..size_of::<T>()])
}

/// Whether `[min, max)` holds at least one value. Unordered floats (NaN) are never a valid range.
pub(crate) fn is_valid_range(elem_type: ElementType, min: &[u8], max: &[u8]) -> bool {
    fn less<T: Pod + PartialOrd>(min: &[u8], max: &[u8]) -> bool {
        read_scalar::<T>(min).partial_cmp(&read_scalar::<T>(max)) == Some(Ordering::Less)
    }
    match elem_type {
        ElementType::Boolean | ElementType::U8 => less::<u8>(min, max),
        ElementType::I8 => less::<i8>(min, max),
        ElementType::I16 => less::<i16>(min, max),
        ElementType::U16 => less::<u16>(min, max),
        ElementType::I32 => less::<i32>(min, max),
        ElementType::U32 => less::<u32>(min, max),
        ElementType::I64 => less::<i64>(min, max),
        ElementType::U64 => less::<u64>(min, max),
        ElementType::F16 => less::<f16>(min, max),
        ElementType::BF16 => less::<bf16>(min, max),
        ElementType::F32 => less::<f32>(min, max),
        ElementType::F64 => less::<f64>(min, max),
    }
}

#[test]
fn test_element_type_names() {
    for t in ElementType::ALL {
        assert_eq!(t.to_string().parse::<ElementType>(), Ok(t));
    }
    assert_eq!("BF16".parse::<ElementType>(), Ok(ElementType::BF16));
    assert_eq!(" f32 ".parse::<ElementType>(), Ok(ElementType::F32));
    assert_eq!(
        "f8".parse::<ElementType>(),
        Err(Error::UnknownElementType("f8".to_string()))
    );
}

#[test]
fn test_element_type_sizes() {
    assert_eq!(<f16 as Element>::TYPE.size(), size_of::<f16>());
    assert_eq!(<bf16 as Element>::TYPE.size(), size_of::<bf16>());
    assert_eq!(<i64 as Element>::TYPE.size(), 8);
    assert_eq!(<u8 as Element>::TYPE.size(), 1);
    assert!(ElementType::BF16.is_real());
    assert!(ElementType::U16.is_integral());
    assert!(!ElementType::Boolean.is_integral());
    assert!(!ElementType::Boolean.is_real());
}

#[test]
fn test_valid_range() {
    let b = |v: f32| v.to_ne_bytes();
    assert!(is_valid_range(ElementType::F32, &b(0.0), &b(1.0)));
    assert!(!is_valid_range(ElementType::F32, &b(1.0), &b(1.0)));
    assert!(!is_valid_range(ElementType::F32, &b(f32::NAN), &b(1.0)));
    assert!(is_valid_range(
        ElementType::I64,
        &(-5i64).to_ne_bytes(),
        &3i64.to_ne_bytes()
    ));
    assert!(!is_valid_range(
        ElementType::U32,
        &7u32.to_ne_bytes(),
        &3u32.to_ne_bytes()
    ));
    assert!(is_valid_range(
        ElementType::BF16,
        &bf16::from_f32(-1.0).to_ne_bytes(),
        &bf16::from_f32(1.0).to_ne_bytes()
    ));
}
