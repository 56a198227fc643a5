use half::{bf16, f16};

use super::{
    ConverterTarget, ELEMENTS_PER_EXECUTION, PhiloxAlignment, PhiloxConverter, PhiloxOutput,
    affine, reduce_int,
};
use crate::element_type::ElementType;
use crate::error::Result;

/// Conversion rules of PyTorch's random sampling.
///
/// Floats take as many low bits of a word as the target has mantissa digits and scale them
/// by `2^-digits`; integers are reduced modulo the range. 64-bit values are built from a pair
/// of words, the first one being the high half, unless the range fits in 32 bits.
pub struct PyTorchPhiloxConverter<'a> {
    target: ConverterTarget<'a>,
    step: usize,
    // PyTorch draws a single 32-bit word for a 64-bit integer when the range fits in u32.
    optimization_enabled: bool,
}

impl<'a> PyTorchPhiloxConverter<'a> {
    pub fn new(
        out: &'a mut [u8],
        elem_type: ElementType,
        elem_count: usize,
        min_val: &'a [u8],
        max_val: &'a [u8],
    ) -> Result<Self> {
        let target = ConverterTarget::new(
            PhiloxAlignment::Pytorch,
            out,
            elem_type,
            elem_count,
            min_val,
            max_val,
        )?;
        let optimization_enabled = match elem_type {
            ElementType::I64 => {
                let (mn, mx) = target.bounds::<i64>();
                fits_u32(mx.wrapping_sub(mn) as u64)
            }
            ElementType::U64 => {
                let (mn, mx) = target.bounds::<u64>();
                fits_u32(mx.wrapping_sub(mn))
            }
            _ => false,
        };
        log::trace!(
            "PyTorch Philox converter for {elem_type}: optimization {optimization_enabled}"
        );
        let step = if elem_type.size() > 4 && !optimization_enabled {
            ELEMENTS_PER_EXECUTION / 2
        } else {
            ELEMENTS_PER_EXECUTION
        };
        Ok(PyTorchPhiloxConverter {
            target,
            step,
            optimization_enabled,
        })
    }

    /// Whether 64-bit integers are produced from single words.
    pub fn optimization_enabled(&self) -> bool {
        self.optimization_enabled
    }
}

#[inline(always)]
fn fits_u32(range: u64) -> bool {
    range <= u32::MAX as u64
}

#[inline(always)]
fn unite_high_low(high: u32, low: u32) -> u64 {
    ((high as u64) << 32) | low as u64
}

/// `(v & (2^digits - 1)) * 2^-digits`, exact for every target since `digits` never exceeds
/// the precision of the intermediate type.
#[inline(always)]
fn low_bits_f32(v: u32, digits: u32) -> f32 {
    (v & ((1 << digits) - 1)) as f32 / (1u32 << digits) as f32
}

#[inline(always)]
fn uint32_to_f16(x: u32) -> f16 {
    f16::from_f32(low_bits_f32(x, f16::MANTISSA_DIGITS))
}

#[inline(always)]
fn uint32_to_bf16(x: u32) -> bf16 {
    bf16::from_f32(low_bits_f32(x, bf16::MANTISSA_DIGITS))
}

#[inline(always)]
fn uint32_to_f32(x: u32) -> f32 {
    low_bits_f32(x, f32::MANTISSA_DIGITS)
}

#[inline(always)]
fn uint64_to_f64(v: u64) -> f64 {
    (v & ((1 << f64::MANTISSA_DIGITS) - 1)) as f64 / (1u64 << f64::MANTISSA_DIGITS) as f64
}

impl PhiloxConverter for PyTorchPhiloxConverter<'_> {
    fn converted_elements_count(&self) -> usize {
        self.step
    }

    fn convert(&mut self, r: PhiloxOutput, k: usize) {
        let t = &mut self.target;
        let pairs = [unite_high_low(r[0], r[1]), unite_high_low(r[2], r[3])];
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
                t.store(k, &pairs.map(|v| affine(uint64_to_f64(v), mn, mx)));
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
                if self.optimization_enabled {
                    t.store(k, &r.map(|x| reduce_int(x as u64, mn, mx)));
                } else {
                    t.store(k, &pairs.map(|v| reduce_int(v, mn, mx)));
                }
            }
            ElementType::U64 => {
                let (mn, mx) = t.bounds::<u64>();
                if self.optimization_enabled {
                    t.store(k, &r.map(|x| reduce_int(x as u64, mn, mx)));
                } else {
                    t.store(k, &pairs.map(|v| reduce_int(v, mn, mx)));
                }
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
fn pytorch_converter<'a, T: bytemuck::Pod>(
    out: &'a mut [T],
    elem_type: ElementType,
    mn: &'a T,
    mx: &'a T,
) -> PyTorchPhiloxConverter<'a> {
    let count = out.len();
    PyTorchPhiloxConverter::new(
        bytemuck::cast_slice_mut(out),
        elem_type,
        count,
        bytemuck::bytes_of(mn),
        bytemuck::bytes_of(mx),
    )
    .unwrap()
}

#[test]
fn test_pytorch_optimization_flag() {
    let mut out = [0i64; 8];
    let conv = pytorch_converter(&mut out, ElementType::I64, &0, &100);
    assert!(conv.optimization_enabled());
    assert_eq!(conv.converted_elements_count(), 4);
    assert_eq!(conv.converted_elements_count(), 4);

    let conv = pytorch_converter(&mut out, ElementType::I64, &0, &(1 << 40));
    assert!(!conv.optimization_enabled());
    assert_eq!(conv.converted_elements_count(), 2);

    // The range decides, not the magnitude of the bounds.
    let conv = pytorch_converter(&mut out, ElementType::I64, &(1 << 40), &((1 << 40) + 7));
    assert!(conv.optimization_enabled());
    let conv = pytorch_converter(&mut out, ElementType::I64, &-1, &(u32::MAX as i64));
    assert!(!conv.optimization_enabled());

    let mut out = [0u64; 8];
    let conv = pytorch_converter(&mut out, ElementType::U64, &0, &(u32::MAX as u64));
    assert!(conv.optimization_enabled());

    let mut out = [0f64; 8];
    let conv = pytorch_converter(&mut out, ElementType::F64, &0.0, &1.0);
    assert!(!conv.optimization_enabled());
    assert_eq!(conv.converted_elements_count(), 2);

    let mut out = [0f32; 8];
    let conv = pytorch_converter(&mut out, ElementType::F32, &0.0, &1.0);
    assert!(!conv.optimization_enabled());
    assert_eq!(conv.converted_elements_count(), 4);
}

#[test]
fn test_pytorch_int64_fast_path() {
    let mut out = [0i64; 4];
    let mut conv = pytorch_converter(&mut out, ElementType::I64, &0, &100);
    conv.convert([7, 250, 1000, u32::MAX], 0);
    assert_eq!(out, [7, 50, 0, 95]);
}

#[test]
fn test_pytorch_int64_slow_path() {
    let mut out = [0i64; 4];
    let mut conv = pytorch_converter(&mut out, ElementType::I64, &0, &(1 << 40));
    conv.convert([1, 2, 3, 4], 0);
    conv.convert([0, 0, 0x100, 5], 1);
    assert_eq!(out, [(1 << 32) | 2, (3 << 32) | 4, 0, 5]);

    let mut out = [0i64; 2];
    let mut conv = pytorch_converter(&mut out, ElementType::I64, &i64::MIN, &i64::MAX);
    conv.convert([0, 5, 0, 0], 0);
    assert_eq!(out, [i64::MIN + 5, i64::MIN]);
}

#[test]
fn test_pytorch_floats() {
    let mut out = [0f32; 4];
    let mut conv = pytorch_converter(&mut out, ElementType::F32, &0.0, &1.0);
    conv.convert(super::TEST_BLOCK, 0);
    let scale = 1.0 / (1u32 << 24) as f32;
    assert_eq!(
        out,
        [
            0.0,
            0xFF_FFFF as f32 * scale,
            0x34_5678 as f32 * scale,
            0xAB_CDEF as f32 * scale
        ]
    );

    let mut out = [f16::ZERO; 4];
    let mut conv = pytorch_converter(&mut out, ElementType::F16, &f16::ZERO, &f16::ONE);
    conv.convert(super::TEST_BLOCK, 0);
    assert_eq!(out[1], f16::from_f32(2047.0 / 2048.0));
    assert_eq!(out[2], f16::from_f32((0x678 & 0x7ff) as f32 / 2048.0));

    let mut out = [bf16::ZERO; 4];
    let mut conv = pytorch_converter(&mut out, ElementType::BF16, &bf16::ZERO, &bf16::ONE);
    conv.convert(super::TEST_BLOCK, 0);
    assert_eq!(out[1], bf16::from_f32(255.0 / 256.0));
    assert_eq!(out[3], bf16::from_f32(0xEF as f32 / 256.0));

    let mut out = [0f64; 2];
    let mut conv = pytorch_converter(&mut out, ElementType::F64, &-1.0, &1.0);
    conv.convert([u32::MAX, u32::MAX, 0, 0], 0);
    assert_eq!(out, [1.0 - f64::EPSILON, -1.0]);
}

#[test]
fn test_pytorch_clamps_to_elem_count() {
    let mut out = [0x55u8; 16];
    let mn = 0i64.to_ne_bytes();
    let mx = 100i64.to_ne_bytes();
    let mut conv = PyTorchPhiloxConverter::new(&mut out, ElementType::I64, 1, &mn, &mx).unwrap();
    assert_eq!(conv.converted_elements_count(), 4);
    conv.convert([42, 43, 44, 45], 0);
    assert_eq!(out[..8], 42i64.to_ne_bytes());
    assert!(out[8..].iter().all(|&b| b == 0x55));
}

/// A range one ulp wide rounds the upper half of the unit interval up to `max`, the same way
/// PyTorch's sampler does.
#[test]
fn test_pytorch_one_ulp_range_rounds_to_max() {
    let mn = 1.0f32;
    let mx = f32::from_bits(mn.to_bits() + 1);
    let mut out = [0f32; 4];
    let mut conv = pytorch_converter(&mut out, ElementType::F32, &mn, &mx);
    conv.convert([0, 0xFFFFFFFF, 0x0040_0000, 0x0080_0001], 0);
    assert_eq!(out, [mn, mx, mn, mx]);
}

/// Types without a PyTorch conversion are refused before any block is converted.
#[test]
fn test_pytorch_rejects_narrow_types() {
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
            PyTorchPhiloxConverter::new(&mut out, elem_type, 4, &b, &b).err(),
            Some(Error::UnsupportedElementType {
                elem_type,
                alignment: PhiloxAlignment::Pytorch,
            })
        );
    }
    assert!(out.iter().all(|&b| b == 0x5A));
}
