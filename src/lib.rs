//! Conversion of Philox4x32 output into uniformly distributed values, bit compatible with the
//! stateless random ops of TensorFlow and PyTorch.

pub mod converter;
pub mod element_type;
pub mod error;
pub mod random_uniform;

pub use converter::{
    MockPhiloxConverter, PhiloxAlignment, PhiloxConverter, PhiloxOutput, PyTorchPhiloxConverter,
    TensorflowPhiloxConverter, make_philox_converter,
};
pub use element_type::{Element, ElementType};
pub use error::{Error, Result};
pub use random_uniform::RandomUniform;
