#![no_std]

pub mod philox;

/// Words produced by one run of the generator for one counter value.
pub type PhiloxOutput = [u32; 4];

/// Counter based generator: the output for `n` depends only on the generator key and `n`.
pub trait CounterRng: Clone {
    fn generate(&self, n: u64) -> PhiloxOutput;
}
