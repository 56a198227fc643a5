//! Conversion of Philox output blocks into typed values of a range.
//!
//! A converter is bound to one destination buffer, element type, element count and
//! `[min, max)` range. Every [PhiloxConverter::convert] call consumes one block of four
//! `u32` words and writes [PhiloxConverter::converted_elements_count] values at the
//! block's position in the output.

mod mock;
mod pytorch;
mod tensorflow;

use std::fmt;
use std::str::FromStr;

use bytemuck::Pod;
use num::traits::AsPrimitive;
use num::{Float, PrimInt};

pub use mock::MockPhiloxConverter;
pub use philox::PhiloxOutput;
pub use pytorch::PyTorchPhiloxConverter;
pub use tensorflow::TensorflowPhiloxConverter;

use crate::element_type::{ElementType, read_scalar};
use crate::error::{Error, Result};

/// Number of `u32` words produced by one execution of the generator.
pub const ELEMENTS_PER_EXECUTION: usize = 4;

pub trait PhiloxConverter {
    /// Number of output elements produced by one [PhiloxConverter::convert] call.
    fn converted_elements_count(&self) -> usize;

    /// Converts `result` to the target element type and writes it at the `k`-th block of the output.
    fn convert(&mut self, result: PhiloxOutput, k: usize);
}

/// Which ecosystem's conversion rules a converter reproduces.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PhiloxAlignment {
    Mock,
    Tensorflow,
    Pytorch,
}

impl PhiloxAlignment {
    pub const fn name(self) -> &'static str {
        match self {
            PhiloxAlignment::Mock => "mock",
            PhiloxAlignment::Tensorflow => "tensorflow",
            PhiloxAlignment::Pytorch => "pytorch",
        }
    }

    pub const fn supports(self, elem_type: ElementType) -> bool {
        match self {
            PhiloxAlignment::Mock => !matches!(elem_type, ElementType::Boolean),
            PhiloxAlignment::Tensorflow | PhiloxAlignment::Pytorch => matches!(
                elem_type,
                ElementType::F16
                    | ElementType::BF16
                    | ElementType::F32
                    | ElementType::F64
                    | ElementType::I32
                    | ElementType::U32
                    | ElementType::I64
                    | ElementType::U64
            ),
        }
    }
}

impl fmt::Display for PhiloxAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PhiloxAlignment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(PhiloxAlignment::Mock),
            "tensorflow" => Ok(PhiloxAlignment::Tensorflow),
            "pytorch" => Ok(PhiloxAlignment::Pytorch),
            _ => Err(Error::UnknownAlignment(s.to_string())),
        }
    }
}

/// Destination and range shared by every converter.
struct ConverterTarget<'a> {
    out: &'a mut [u8],
    elem_type: ElementType,
    elem_count: usize,
    min_val: &'a [u8],
    max_val: &'a [u8],
}

impl<'a> ConverterTarget<'a> {
    fn new(
        alignment: PhiloxAlignment,
        out: &'a mut [u8],
        elem_type: ElementType,
        elem_count: usize,
        min_val: &'a [u8],
        max_val: &'a [u8],
    ) -> Result<Self> {
        if !alignment.supports(elem_type) {
            return Err(Error::UnsupportedElementType {
                elem_type,
                alignment,
            });
        }
        let size = elem_type.size();
        let required = elem_count
            .checked_mul(size)
            .ok_or(Error::BufferSizeOverflow(elem_count, size))?;
        if out.len() < required {
            return Err(Error::BufferTooSmall {
                required,
                actual: out.len(),
            });
        }
        if let Some(bound) = [min_val, max_val].into_iter().find(|b| b.len() < size) {
            return Err(Error::BoundTooSmall {
                required: size,
                actual: bound.len(),
            });
        }
        Ok(ConverterTarget {
            out,
            elem_type,
            elem_count,
            min_val,
            max_val,
        })
    }

    #[inline]
    fn bounds<T: Pod>(&self) -> (T, T) {
        (read_scalar(self.min_val), read_scalar(self.max_val))
    }

    /// Writes `values` as the `k`-th block, dropping whatever falls past `elem_count`.
    #[inline]
    fn store<T: Pod>(&mut self, k: usize, values: &[T]) {
        self.store_bytes(k, values.len(), bytemuck::cast_slice(values));
    }

    #[inline]
    fn store_bytes(&mut self, k: usize, step: usize, bytes: &[u8]) {
        let start = k.saturating_mul(step);
        if start >= self.elem_count {
            return;
        }
        let size = self.elem_type.size();
        let count = step.min(self.elem_count - start);
        self.out[start * size..(start + count) * size].copy_from_slice(&bytes[..count * size]);
    }
}

/// Maps a unit value in `[0, 1)` onto `[mn, mx)`.
///
/// Rounding may yield `mx` itself when the range is only a few ulps wide; both reference
/// implementations round the same way.
#[inline(always)]
fn affine<T: Float>(unit: T, mn: T, mx: T) -> T {
    unit * (mx - mn) + mn
}

/// `(v % (mx - mn)) + mn` computed on the unsigned representation, so signed ranges
/// wider than `T::MAX` are still reduced without overflow. An empty range yields `mn`.
#[inline(always)]
fn reduce_int<T>(v: u64, mn: T, mx: T) -> T
where
    T: PrimInt + AsPrimitive<u64>,
    u64: AsPrimitive<T>,
{
    let mn_bits: u64 = mn.as_();
    let mx_bits: u64 = mx.as_();
    let range = mx_bits.wrapping_sub(mn_bits) & unsigned_mask::<T>();
    if range == 0 {
        return mn;
    }
    AsPrimitive::<T>::as_((v % range).wrapping_add(mn_bits))
}

#[inline(always)]
fn unsigned_mask<T>() -> u64 {
    u64::MAX >> (64 - 8 * size_of::<T>())
}

/// Constructs the converter matching `alignment`.
pub fn make_philox_converter<'a>(
    out: &'a mut [u8],
    elem_type: ElementType,
    elem_count: usize,
    min_val: &'a [u8],
    max_val: &'a [u8],
    alignment: PhiloxAlignment,
) -> Result<Box<dyn PhiloxConverter + 'a>> {
    log::debug!("Creating {alignment} Philox converter for {elem_count} × {elem_type}");
    Ok(match alignment {
        PhiloxAlignment::Mock => Box::new(MockPhiloxConverter::new(
            out, elem_type, elem_count, min_val, max_val,
        )?),
        PhiloxAlignment::Tensorflow => Box::new(TensorflowPhiloxConverter::new(
            out, elem_type, elem_count, min_val, max_val,
        )?),
        PhiloxAlignment::Pytorch => Box::new(PyTorchPhiloxConverter::new(
            out, elem_type, elem_count, min_val, max_val,
        )?),
    })
}

#[cfg(test)]
const TEST_BLOCK: PhiloxOutput = [0x00000000, 0xFFFFFFFF, 0x12345678, 0x89ABCDEF];

#[test]
fn test_alignment_names() {
    for a in [
        PhiloxAlignment::Mock,
        PhiloxAlignment::Tensorflow,
        PhiloxAlignment::Pytorch,
    ] {
        assert_eq!(a.to_string().parse::<PhiloxAlignment>(), Ok(a));
    }
    assert_eq!("PyTorch".parse::<PhiloxAlignment>(), Ok(PhiloxAlignment::Pytorch));
    assert_eq!(
        "jax".parse::<PhiloxAlignment>(),
        Err(Error::UnknownAlignment("jax".to_string()))
    );
}

#[test]
fn test_factory_rejects_unsupported_type() {
    let mut out = [0u8; 16];
    let b = [0u8; 8];
    for alignment in [PhiloxAlignment::Tensorflow, PhiloxAlignment::Pytorch] {
        for elem_type in [ElementType::Boolean, ElementType::I8, ElementType::U16] {
            let res = make_philox_converter(&mut out, elem_type, 1, &b, &b, alignment);
            assert_eq!(
                res.err(),
                Some(Error::UnsupportedElementType {
                    elem_type,
                    alignment
                })
            );
        }
    }
    let res = make_philox_converter(
        &mut out,
        ElementType::Boolean,
        1,
        &b,
        &b,
        PhiloxAlignment::Mock,
    );
    assert!(res.is_err());
}

#[test]
fn test_factory_checks_buffers() {
    let mut out = [0u8; 12];
    let b = [0u8; 4];
    let res = make_philox_converter(
        &mut out,
        ElementType::F32,
        4,
        &b,
        &b,
        PhiloxAlignment::Tensorflow,
    );
    assert_eq!(
        res.err(),
        Some(Error::BufferTooSmall {
            required: 16,
            actual: 12
        })
    );

    let res = make_philox_converter(
        &mut out,
        ElementType::I64,
        1,
        &b,
        &b,
        PhiloxAlignment::Pytorch,
    );
    assert_eq!(
        res.err(),
        Some(Error::BoundTooSmall {
            required: 8,
            actual: 4
        })
    );

    let res = make_philox_converter(
        &mut out,
        ElementType::U64,
        usize::MAX,
        &b,
        &b,
        PhiloxAlignment::Mock,
    );
    assert_eq!(res.err(), Some(Error::BufferSizeOverflow(usize::MAX, 8)));
}

#[test]
fn test_reduce_int_wide_signed_range() {
    assert_eq!(reduce_int::<i32>(5, i32::MIN, i32::MAX), i32::MIN + 5);
    assert_eq!(reduce_int::<i32>(u32::MAX as u64, -10, 10), -10 + 15);
    assert_eq!(reduce_int::<i64>(u64::MAX, i64::MIN, i64::MAX), i64::MIN);
    assert_eq!(reduce_int::<u32>(1234, 7, 7), 7);
    assert_eq!(reduce_int::<u64>(1 << 40, 0, 1 << 40), 0);
}

#[test]
fn test_cross_alignment_divergence() {
    let mut tf = [0u8; 16];
    let mut pt = [0u8; 16];
    let mn = 0.0f32.to_ne_bytes();
    let mx = 1.0f32.to_ne_bytes();
    for (out, alignment) in [
        (&mut tf, PhiloxAlignment::Tensorflow),
        (&mut pt, PhiloxAlignment::Pytorch),
    ] {
        let mut conv = make_philox_converter(out, ElementType::F32, 4, &mn, &mx, alignment).unwrap();
        conv.convert(TEST_BLOCK, 0);
    }
    assert_ne!(tf, pt);

    let mut tf = [0u8; 32];
    let mut pt = [0u8; 32];
    let mn = 0i64.to_ne_bytes();
    let mx = (1i64 << 40).to_ne_bytes();
    for (out, alignment) in [
        (&mut tf, PhiloxAlignment::Tensorflow),
        (&mut pt, PhiloxAlignment::Pytorch),
    ] {
        let mut conv = make_philox_converter(out, ElementType::I64, 4, &mn, &mx, alignment).unwrap();
        conv.convert(TEST_BLOCK, 0);
        conv.convert([1, 2, 3, 4], 1);
    }
    assert_ne!(tf, pt);
}
