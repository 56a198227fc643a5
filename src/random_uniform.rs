//! Uniform random tensors from a Philox4x32 stream.
//!
//! [RandomUniform] plays the part of the op executor: it asks the converter how many values a
//! block yields, runs the generator once per block and hands every block to the converter.

use philox::CounterRng;
use philox::philox::Philox4x32;

use crate::converter::{PhiloxAlignment, make_philox_converter};
use crate::element_type::{Element, ElementType, is_valid_range};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomUniform {
    generator: Philox4x32,
    alignment: PhiloxAlignment,
}

impl RandomUniform {
    /// The global seed keys the generator and the op seed selects the counter stream.
    pub fn new(global_seed: u64, op_seed: u64, alignment: PhiloxAlignment) -> Self {
        RandomUniform {
            generator: Philox4x32::new(global_seed, op_seed),
            alignment,
        }
    }

    /// Set a different number of Philox rounds.
    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.generator = self.generator.with_rounds(rounds);
        self
    }

    pub fn alignment(&self) -> PhiloxAlignment {
        self.alignment
    }

    /// Fill `out` with `elem_count` values of `elem_type` in `[min, max)`, starting the stream
    /// at block `offset`.
    ///
    /// Returns the first block that was not consumed, so successive calls continue the stream.
    /// Block counters wrap around at `u64::MAX` like the Philox counter itself.
    pub fn fill(
        &self,
        out: &mut [u8],
        elem_type: ElementType,
        elem_count: usize,
        min: &[u8],
        max: &[u8],
        offset: u64,
    ) -> Result<u64> {
        let mut converter =
            make_philox_converter(out, elem_type, elem_count, min, max, self.alignment)?;
        if self.alignment != PhiloxAlignment::Mock && !is_valid_range(elem_type, min, max) {
            return Err(Error::InvalidRange);
        }
        let step = converter.converted_elements_count();
        let blocks = elem_count.div_ceil(step);
        log::debug!(
            "Generating {elem_count} × {elem_type} ({}) from {blocks} Philox blocks at offset {offset}",
            self.alignment
        );
        for k in 0..blocks {
            converter.convert(self.generator.generate(offset.wrapping_add(k as u64)), k);
        }
        Ok(offset.wrapping_add(blocks as u64))
    }

    /// Typed version of [RandomUniform::fill] starting at block 0.
    pub fn generate<T: Element>(&self, count: usize, min: T, max: T) -> Result<Vec<T>> {
        let mut out = vec![T::zeroed(); count];
        self.fill(
            bytemuck::cast_slice_mut(out.as_mut_slice()),
            T::TYPE,
            count,
            bytemuck::bytes_of(&min),
            bytemuck::bytes_of(&max),
            0,
        )?;
        Ok(out)
    }
}

#[cfg(test)]
fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[cfg(test)]
fn assert_in_range<T: Element + std::fmt::Debug>(alignment: PhiloxAlignment, min: T, max: T) {
    let rng = RandomUniform::new(150, 10, alignment);
    // 37 is not a multiple of any block size, so the last block is partial.
    let values = rng.generate(37, min, max).unwrap();
    assert_eq!(values.len(), 37);
    for v in values {
        assert!(min <= v && v < max, "{v:?} not in [{min:?}, {max:?}) for {alignment}");
    }
}

#[test]
fn test_values_in_range() {
    use half::{bf16, f16};

    init_logger();
    for alignment in [PhiloxAlignment::Tensorflow, PhiloxAlignment::Pytorch] {
        assert_in_range(alignment, f16::from_f32(-3.0), f16::from_f32(5.0));
        assert_in_range(alignment, bf16::from_f32(-3.0), bf16::from_f32(5.0));
        assert_in_range(alignment, -3.0f32, 5.0);
        assert_in_range(alignment, -3.0f64, 5.0);
        assert_in_range(alignment, 0.0f32, 1.0);
        assert_in_range(alignment, -1000i32, 1000);
        assert_in_range(alignment, i32::MIN, i32::MAX);
        assert_in_range(alignment, 10u32, 20);
        assert_in_range(alignment, -7i64, 100);
        assert_in_range(alignment, -(1i64 << 40), 1 << 40);
        assert_in_range(alignment, i64::MIN, i64::MAX);
        assert_in_range(alignment, 0u64, 1 << 40);
        assert_in_range(alignment, 1u64 << 50, (1 << 50) + 3);
    }
}

#[test]
fn test_generate_is_deterministic() {
    let rng = RandomUniform::new(7, 3, PhiloxAlignment::Pytorch);
    let a = rng.generate(16, 0.0f32, 1.0).unwrap();
    assert_eq!(a, rng.generate(16, 0.0f32, 1.0).unwrap());
    assert_ne!(
        a,
        RandomUniform::new(7, 4, PhiloxAlignment::Pytorch)
            .generate(16, 0.0f32, 1.0)
            .unwrap()
    );
    assert_ne!(a, rng.with_rounds(7).generate(16, 0.0f32, 1.0).unwrap());
}

#[test]
fn test_mock_surfaces_generator_output() {
    let rng = RandomUniform::new(1, 2, PhiloxAlignment::Mock);
    let values = rng.generate(6, 0u32, 0).unwrap();
    let generator = Philox4x32::new(1, 2);
    let expected: Vec<u32> = generator
        .generate(0)
        .into_iter()
        .chain(generator.generate(1))
        .take(6)
        .collect();
    assert_eq!(values, expected);
}

#[test]
fn test_fill_continues_stream() {
    init_logger();
    let rng = RandomUniform::new(150, 10, PhiloxAlignment::Tensorflow);
    let whole = rng.generate(16, -5i64, 5).unwrap();

    let mut parts = vec![0i64; 16];
    let (first, second) = parts.split_at_mut(8);
    let mn = (-5i64).to_ne_bytes();
    let mx = 5i64.to_ne_bytes();
    let next = rng
        .fill(bytemuck::cast_slice_mut(first), ElementType::I64, 8, &mn, &mx, 0)
        .unwrap();
    assert_eq!(next, 4);
    let next = rng
        .fill(bytemuck::cast_slice_mut(second), ElementType::I64, 8, &mn, &mx, next)
        .unwrap();
    assert_eq!(next, 8);
    assert_eq!(parts, whole);
}

/// Block aligned chunks with disjoint offsets can be filled from separate threads.
#[test]
fn test_parallel_chunks_match_sequential() {
    let rng = RandomUniform::new(42, 0, PhiloxAlignment::Pytorch);
    let whole = rng.generate(64, -1.0f32, 1.0).unwrap();

    let mut out = vec![0f32; 64];
    let mn = (-1.0f32).to_ne_bytes();
    let mx = 1.0f32.to_ne_bytes();
    std::thread::scope(|s| {
        for (i, chunk) in out.chunks_mut(16).enumerate() {
            let (mn, mx) = (&mn, &mx);
            s.spawn(move || {
                rng.fill(
                    bytemuck::cast_slice_mut(chunk),
                    ElementType::F32,
                    16,
                    mn,
                    mx,
                    4 * i as u64,
                )
                .unwrap();
            });
        }
    });
    assert_eq!(out, whole);
}

#[test]
fn test_fill_rejects_invalid_range() {
    let rng = RandomUniform::new(0, 0, PhiloxAlignment::Tensorflow);
    assert_eq!(rng.generate(4, 1.0f32, 1.0), Err(Error::InvalidRange));
    assert_eq!(rng.generate(4, 3i32, -3), Err(Error::InvalidRange));
    assert_eq!(rng.generate(4, f32::NAN, 1.0), Err(Error::InvalidRange));
    assert_eq!(
        RandomUniform::new(0, 0, PhiloxAlignment::Pytorch).generate(2, 9u64, 9),
        Err(Error::InvalidRange)
    );
}

#[test]
fn test_fill_empty_and_unsupported() {
    let rng = RandomUniform::new(0, 0, PhiloxAlignment::Pytorch);
    assert_eq!(rng.generate::<f32>(0, 0.0, 1.0), Ok(vec![]));
    let mn = 0u8.to_ne_bytes();
    let mx = 1u8.to_ne_bytes();
    let mut out = [0u8; 4];
    assert_eq!(
        rng.fill(&mut out, ElementType::U8, 4, &mn, &mx, 9),
        Err(Error::UnsupportedElementType {
            elem_type: ElementType::U8,
            alignment: PhiloxAlignment::Pytorch,
        })
    );
    let mut empty = [0u8; 0];
    let one = 1.0f32.to_ne_bytes();
    assert_eq!(
        rng.fill(&mut empty, ElementType::F32, 0, &[0; 4], &one, 9),
        Ok(9)
    );
}

/// Narrow float ranges keep the reference rounding: values land on `min` or on `max`.
#[test]
fn test_one_ulp_range_keeps_reference_rounding() {
    let mn = 1.0f32;
    let mx = f32::from_bits(mn.to_bits() + 1);
    for alignment in [PhiloxAlignment::Tensorflow, PhiloxAlignment::Pytorch] {
        let values = RandomUniform::new(150, 10, alignment)
            .generate(64, mn, mx)
            .unwrap();
        assert!(values.iter().all(|&v| v == mn || v == mx));
        assert!(values.contains(&mn));
        assert!(values.contains(&mx));
    }
}

/// The block counter wraps around past `u64::MAX` instead of overflowing.
#[test]
fn test_fill_wraps_block_counter() {
    let rng = RandomUniform::new(150, 10, PhiloxAlignment::Tensorflow);
    let mn = 0.0f32.to_ne_bytes();
    let mx = 1.0f32.to_ne_bytes();

    let mut wrapped = [0f32; 8];
    let next = rng
        .fill(
            bytemuck::cast_slice_mut(wrapped.as_mut_slice()),
            ElementType::F32,
            8,
            &mn,
            &mx,
            u64::MAX,
        )
        .unwrap();
    assert_eq!(next, 1);

    let mut last = [0f32; 4];
    let next = rng
        .fill(
            bytemuck::cast_slice_mut(last.as_mut_slice()),
            ElementType::F32,
            4,
            &mn,
            &mx,
            u64::MAX,
        )
        .unwrap();
    assert_eq!(next, 0);
    let mut first = [0f32; 4];
    rng.fill(
        bytemuck::cast_slice_mut(first.as_mut_slice()),
        ElementType::F32,
        4,
        &mn,
        &mx,
        0,
    )
    .unwrap();
    assert_eq!(wrapped[..4], last);
    assert_eq!(wrapped[4..], first);
}
