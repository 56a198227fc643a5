use super::{ConverterTarget, PhiloxAlignment, PhiloxConverter, PhiloxOutput};
use crate::element_type::ElementType;
use crate::error::Result;

/// Writes the raw generator bytes without any range mapping.
///
/// Used to check the generator output itself: the four words are copied to the output as
/// they are laid out in memory, so one block yields `16 / size` elements.
pub struct MockPhiloxConverter<'a> {
    target: ConverterTarget<'a>,
    step: usize,
}

impl<'a> MockPhiloxConverter<'a> {
    pub fn new(
        out: &'a mut [u8],
        elem_type: ElementType,
        elem_count: usize,
        min_val: &'a [u8],
        max_val: &'a [u8],
    ) -> Result<Self> {
        let target = ConverterTarget::new(
            PhiloxAlignment::Mock,
            out,
            elem_type,
            elem_count,
            min_val,
            max_val,
        )?;
        Ok(MockPhiloxConverter {
            step: size_of::<PhiloxOutput>() / elem_type.size(),
            target,
        })
    }
}

impl PhiloxConverter for MockPhiloxConverter<'_> {
    fn converted_elements_count(&self) -> usize {
        self.step
    }

    fn convert(&mut self, result: PhiloxOutput, k: usize) {
        self.target
            .store_bytes(k, self.step, bytemuck::bytes_of(&result));
    }
}

#[test]
fn test_mock_reproduces_raw_bits() {
    use super::TEST_BLOCK;

    let b = [0u8; 8];
    let mut out = [0u16; 8];
    let mut conv = MockPhiloxConverter::new(
        bytemuck::cast_slice_mut(out.as_mut_slice()),
        ElementType::U16,
        8,
        &b,
        &b,
    )
    .unwrap();
    assert_eq!(conv.converted_elements_count(), 8);
    conv.convert(TEST_BLOCK, 0);
    assert_eq!(out, bytemuck::cast::<PhiloxOutput, [u16; 8]>(TEST_BLOCK));

    let mut out = [0u64; 3];
    let mut conv = MockPhiloxConverter::new(
        bytemuck::cast_slice_mut(out.as_mut_slice()),
        ElementType::U64,
        3,
        &b,
        &b,
    )
    .unwrap();
    assert_eq!(conv.converted_elements_count(), 2);
    conv.convert(TEST_BLOCK, 0);
    conv.convert([1, 2, 3, 4], 1);
    let first: [u64; 2] = bytemuck::cast(TEST_BLOCK);
    let second: [u64; 2] = bytemuck::cast([1u32, 2, 3, 4]);
    assert_eq!(out, [first[0], first[1], second[0]]);
}

#[test]
fn test_mock_counts_by_width() {
    let b = [0u8; 8];
    let mut out = [0u8; 64];
    for (elem_type, expected) in [
        (ElementType::U8, 16),
        (ElementType::I8, 16),
        (ElementType::F16, 8),
        (ElementType::BF16, 8),
        (ElementType::F32, 4),
        (ElementType::I32, 4),
        (ElementType::F64, 2),
        (ElementType::I64, 2),
    ] {
        let conv = MockPhiloxConverter::new(&mut out, elem_type, 4, &b, &b).unwrap();
        assert_eq!(conv.converted_elements_count(), expected);
        assert_eq!(conv.converted_elements_count(), expected);
    }
}

/// Mock values are not range mapped: bounds are ignored.
#[test]
fn test_mock_ignores_bounds() {
    let mut out = [0u32; 4];
    let mn = 10u32.to_ne_bytes();
    let mx = 20u32.to_ne_bytes();
    let mut conv = MockPhiloxConverter::new(
        bytemuck::cast_slice_mut(out.as_mut_slice()),
        ElementType::U32,
        4,
        &mn,
        &mx,
    )
    .unwrap();
    conv.convert(super::TEST_BLOCK, 0);
    assert_eq!(out, super::TEST_BLOCK);
}
