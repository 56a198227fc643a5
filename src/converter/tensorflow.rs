use half::{bf16, f16};

use super::{
    ConverterTarget, ELEMENTS_PER_EXECUTION, PhiloxAlignment, PhiloxConverter, PhiloxOutput,
    affine, reduce_int,
};
use crate::element_type::ElementType;
use crate::error::Result;

/// Conversion rules of TensorFlow's stateless random ops.
///
/// Floats keep the mantissa bits of a word, force the exponent so the value lies in `[1, 2)`
/// and subtract one. 64-bit outputs use a pair of words, the first one being the low half.
pub struct TensorflowPhiloxConverter<'a> {
    target: ConverterTarget<'a>,
    step: usize,
}

impl<'a> TensorflowPhiloxConverter<'a> {
    pub fn new(
        out: &'a mut [u8],
        elem_type: ElementType,
        elem_count: usize,
        min_val: &'a [u8],
        max_val: &'a [u8],
    ) -> Result<Self> {
        let target = ConverterTarget::new(
            PhiloxAlignment::Tensorflow,
            out,
            elem_type,
            elem_count,
            min_val,
            max_val,
        )?;
        // f64 and 64-bit integers consume two words per value.
        let step = if elem_type.size() > 4 {
            ELEMENTS_PER_EXECUTION / 2
        } else {
            ELEMENTS_PER_EXECUTION
        };
        Ok(TensorflowPhiloxConverter { target, step })
    }
}

/// sign 0, exponent 15, 10 mantissa bits.
#[inline(always)]
fn uint32_to_f16(x: u32) -> f16 {
    f16::from_bits((15 << 10) | (x as u16 & 0x3ff)) - f16::ONE
}

/// sign 0, exponent 127, 7 mantissa bits.
#[inline(always)]
fn uint32_to_bf16(x: u32) -> bf16 {
    bf16::from_bits((127 << 7) | (x as u16 & 0x7f)) - bf16::ONE
}

/// sign 0, exponent 127, 23 mantissa bits.
#[inline(always)]
fn uint32_to_f32(x: u32) -> f32 {
    f32::from_bits((127 << 23) | (x & 0x7f_ffff)) - 1.0
}

/// sign 0, exponent 1023, 20 mantissa bits from `x1` followed by the 32 bits of `x2`.
#[inline(always)]
fn uint32_to_f64(x1: u32, x2: u32) -> f64 {
    let mantissa = ((x1 as u64 & 0xf_ffff) << 32) | x2 as u64;
    f64::from_bits((1023 << 52) | mantissa) - 1.0
}

#[inline(always)]
fn unite_low_high(low: u32, high: u32) -> u64 {
    ((high as u64) << 32) | low as u64
}

impl PhiloxConverter for TensorflowPhiloxConverter<'_> {
    fn converted_elements_count(&self) -> usize {
        self.step
    }

    fn convert(&mut self, r: PhiloxOutput, k: usize) {
        let t = &mut self.target;
        match t.elem_type {
            ElementType::F16 => {
                let (mn, mx) = t.bounds::<f16>();
                t.store(k, &r.map(|x| affine(uint32_to_f16(x), mn, mx)));
            }
            ElementType::BF16 => {
                let (mn, mx) = t.bounds::<bf16>();
                t.store(k, &r.map(|x| affine(uint32_to_bf16(x), mn, mx)));
            }
            ElementType::F32 => {
                let (mn, mx) = t.bounds::<f32>();
                t.store(k, &r.map(|x| affine(uint32_to_f32(x), mn, mx)));
            }
            ElementType::F64 => {
                let (mn, mx) = t.bounds::<f64>();
                t.store(
                    k,
                    &[
                        affine(uint32_to_f64(r[0], r[1]), mn, mx),
                        affine(uint32_to_f64(r[2], r[3]), mn, mx),
                    ],
                );
            }
            ElementType::I32 => {
                let (mn, mx) = t.bounds::<i32>();
                t.store(k, &r.map(|x| reduce_int(x as u64, mn, mx)));
            }
            ElementType::U32 => {
                let (mn, mx) = t.bounds::<u32>();
                t.store(k, &r.map(|x| reduce_int(x as u64, mn, mx)));
            }
            ElementType::I64 => {
                let (mn, mx) = t.bounds::<i64>();
                t.store(
                    k,
                    &[
                        reduce_int(unite_low_high(r[0], r[1]), mn, mx),
                        reduce_int(unite_low_high(r[2], r[3]), mn, mx),
                    ],
                );
            }
            ElementType::U64 => {
                let (mn, mx) = t.bounds::<u64>();
                t.store(
                    k,
                    &[
                        reduce_int(unite_low_high(r[0], r[1]), mn, mx),
                        reduce_int(unite_low_high(r[2], r[3]), mn, mx),
                    ],
                );
            }
            // Rejected by `PhiloxAlignment::supports` at construction.
            ElementType::Boolean
            | ElementType::I8
            | ElementType::U8
            | ElementType::I16
            | ElementType::U16 => {}
        }
    }
}

#[cfg(test)]
fn convert_block<T: bytemuck::Pod>(
    elem_type: ElementType,
    count: usize,
    mn: T,
    mx: T,
    blocks: &[PhiloxOutput],
) -> Vec<T> {
    let mut out = vec![T::zeroed(); count];
    let mut conv = TensorflowPhiloxConverter::new(
        bytemuck::cast_slice_mut(out.as_mut_slice()),
        elem_type,
        count,
        bytemuck::bytes_of(&mn),
        bytemuck::bytes_of(&mx),
    )
    .unwrap();
    for (k, block) in blocks.iter().enumerate() {
        conv.convert(*block, k);
    }
    out
}

#[test]
fn test_tensorflow_f32_reference_block() {
    let out = convert_block(ElementType::F32, 4, 0.0f32, 1.0, &[super::TEST_BLOCK]);
    let mantissa = |x: u32| (x & 0x7f_ffff) as f32 / (1u32 << 23) as f32;
    assert_eq!(out[0], 0.0);
    assert_eq!(out[1], 1.0 - f32::EPSILON);
    assert_eq!(out[2], mantissa(0x12345678));
    assert_eq!(out[3], mantissa(0x89ABCDEF));
    assert!(out.iter().all(|v| (0.0..1.0).contains(v)));
}

#[test]
fn test_tensorflow_f32_scaled() {
    let out = convert_block(ElementType::F32, 4, -2.0f32, 6.0, &[super::TEST_BLOCK]);
    assert_eq!(out[0], -2.0);
    assert!(out.iter().all(|v| (-2.0..6.0).contains(v)));
    assert_eq!(out[2], uint32_to_f32(0x12345678) * 8.0 - 2.0);
}

#[test]
fn test_tensorflow_half_precision() {
    let out = convert_block(
        ElementType::F16,
        4,
        f16::ZERO,
        f16::ONE,
        &[super::TEST_BLOCK],
    );
    assert_eq!(out[0], f16::ZERO);
    assert_eq!(out[1], f16::from_f32(1023.0 / 1024.0));
    assert_eq!(out[2], f16::from_f32((0x5678 & 0x3ff) as f32 / 1024.0));

    let out = convert_block(
        ElementType::BF16,
        4,
        bf16::ZERO,
        bf16::ONE,
        &[super::TEST_BLOCK],
    );
    assert_eq!(out[1], bf16::from_f32(127.0 / 128.0));
    assert_eq!(out[3], bf16::from_f32((0xEF & 0x7f) as f32 / 128.0));
}

#[test]
fn test_tensorflow_f64_uses_word_pairs() {
    let out = convert_block(
        ElementType::F64,
        2,
        0.0f64,
        1.0,
        &[[0xFFFFFFFF, 0xFFFFFFFF, 0x00000000, 0x00000001]],
    );
    assert_eq!(out[0], 1.0 - f64::EPSILON);
    assert_eq!(out[1], f64::EPSILON);
}

#[test]
fn test_tensorflow_integers() {
    let out = convert_block(ElementType::I32, 4, -10i32, 10, &[[0, 21, 7, u32::MAX]]);
    assert_eq!(out, [-10, -9, -3, 5]);

    let out = convert_block(ElementType::U32, 4, 100u32, 103, &[[0, 1, 2, 3]]);
    assert_eq!(out, [100, 101, 102, 100]);

    let out = convert_block(ElementType::I64, 2, 0i64, 1 << 40, &[[1, 2, 3, 4]]);
    assert_eq!(out, [(2 << 32) | 1, (4 << 32) | 3]);

    let out = convert_block(ElementType::U64, 2, 5u64, 105, &[[250, 0, 7, 0]]);
    assert_eq!(out, [55, 12]);
}

#[test]
fn test_tensorflow_counts() {
    let mut out = [0u8; 32];
    let b = [0u8; 8];
    for (elem_type, expected) in [
        (ElementType::F16, 4),
        (ElementType::BF16, 4),
        (ElementType::F32, 4),
        (ElementType::I32, 4),
        (ElementType::U32, 4),
        (ElementType::F64, 2),
        (ElementType::I64, 2),
        (ElementType::U64, 2),
    ] {
        let conv = TensorflowPhiloxConverter::new(&mut out, elem_type, 4, &b, &b).unwrap();
        assert_eq!(conv.converted_elements_count(), expected);
        assert_eq!(conv.converted_elements_count(), expected);
    }
}

/// A single requested element must not spill into the rest of the buffer.
#[test]
fn test_tensorflow_clamps_to_elem_count() {
    let mut out = [0xAAu8; 16];
    let mn = 0.0f32.to_ne_bytes();
    let mx = 1.0f32.to_ne_bytes();
    let mut conv =
        TensorflowPhiloxConverter::new(&mut out, ElementType::F32, 1, &mn, &mx).unwrap();
    conv.convert([0x12345678; 4], 0);
    conv.convert([0x12345678; 4], 1);
    assert_eq!(out[..4], uint32_to_f32(0x12345678).to_ne_bytes());
    assert!(out[4..].iter().all(|&b| b == 0xAA));
}

/// A range one ulp wide rounds the upper half of the unit interval up to `max`, the same way
/// TensorFlow's kernel does.
#[test]
fn test_tensorflow_one_ulp_range_rounds_to_max() {
    let mn = 1.0f32;
    let mx = f32::from_bits(mn.to_bits() + 1);
    let out = convert_block(
        ElementType::F32,
        4,
        mn,
        mx,
        &[[0, 0xFFFFFFFF, 0x0040_0000, 0x0040_0001]],
    );
    assert_eq!(out, [mn, mx, mn, mx]);
}

/// Types without a TensorFlow conversion are refused before any block is converted.
#[test]
fn test_tensorflow_rejects_narrow_types() {
    use crate::error::Error;

    let mut out = [0x5Au8; 16];
    let b = [0u8; 8];
    for elem_type in [
        ElementType::Boolean,
        ElementType::I8,
        ElementType::U8,
        ElementType::I16,
        ElementType::U16,
    ] {
        assert_eq!(
            TensorflowPhiloxConverter::new(&mut out, elem_type, 4, &b, &b).err(),
            Some(Error::UnsupportedElementType {
                elem_type,
                alignment: PhiloxAlignment::Tensorflow,
            })
        );
    }
    assert!(out.iter().all(|&b| b == 0x5A));
}
