use thiserror::Error;

use crate::converter::PhiloxAlignment;
use crate::element_type::ElementType;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown Philox alignment: {0}")]
    UnknownAlignment(String),

    #[error("Unknown element type: {0}")]
    UnknownElementType(String),

    #[error("Unsupported element type {elem_type} for {alignment} alignment")]
    UnsupportedElementType {
        elem_type: ElementType,
        alignment: PhiloxAlignment,
    },

    #[error("Buffer size overflow: {0} elements × {1} bytes per element")]
    BufferSizeOverflow(usize, usize),

    #[error("Output buffer size ({actual}) is smaller than expected ({required})")]
    BufferTooSmall { required: usize, actual: usize },

    #[error("Range bound size ({actual}) is smaller than the element size ({required})")]
    BoundTooSmall { required: usize, actual: usize },

    #[error("Invalid range: min must be less than max")]
    InvalidRange,
}
