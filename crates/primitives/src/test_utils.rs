//! Test helpers for generating arbitrary instances of primitive types.

use arbitrary::{Arbitrary, Unstructured};
use rand::RngCore;

const ARB_GEN_LEN: usize = 16384;

pub struct ArbitraryGenerator {
    buf: Vec<u8>,
}

impl Default for ArbitraryGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ArbitraryGenerator {
    pub fn new() -> Self {
        Self::new_with_size(ARB_GEN_LEN)
    }

    pub fn new_with_size(n: usize) -> Self {
        let mut buf = vec![0; n];
        rand::rngs::OsRng.fill_bytes(&mut buf);
        Self { buf }
    }

    pub fn generate<'a, T: Arbitrary<'a> + Clone>(&'a self) -> T {
        let mut u = Unstructured::new(&self.buf);
        T::arbitrary(&mut u).expect("test: generate arbitrary instance")
    }
}
