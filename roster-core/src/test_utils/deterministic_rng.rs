/*!
    Deterministic randomness for reproducible tests

    Join tokens normally come from the OS-seeded CSPRNG. Tests that need
    reproducible tokens (or forced collisions) plug one of these sources
    into a `TokenGenerator` instead.
*/

use crate::core_access::token::TokenSource;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::Mutex;

/// Default seed for deterministic tests
pub const DEFAULT_TEST_SEED: u64 = 42;

/// Create a deterministic RNG with a custom seed
pub fn test_rng_with_seed(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Seeded token source; two sources with the same seed yield the same tokens
pub struct SeededTokenSource {
    rng: Mutex<StdRng>,
}

impl SeededTokenSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(test_rng_with_seed(seed)),
        }
    }
}

impl Default for SeededTokenSource {
    fn default() -> Self {
        Self::new(DEFAULT_TEST_SEED)
    }
}

impl TokenSource for SeededTokenSource {
    fn fill(&self, buf: &mut [u8]) {
        self.rng.lock().unwrap().fill_bytes(buf);
    }
}

/// Source that always yields the same byte, so every token collides
pub struct ConstantTokenSource(pub u8);

impl TokenSource for ConstantTokenSource {
    fn fill(&self, buf: &mut [u8]) {
        buf.fill(self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_source_is_deterministic() {
        let a = SeededTokenSource::new(7);
        let b = SeededTokenSource::new(7);
        let (mut x, mut y) = ([0u8; 32], [0u8; 32]);
        a.fill(&mut x);
        b.fill(&mut y);
        assert_eq!(x, y);

        a.fill(&mut x);
        assert_ne!(x, y);
    }

    #[test]
    fn test_constant_source() {
        let mut buf = [0u8; 4];
        ConstantTokenSource(9).fill(&mut buf);
        assert_eq!(buf, [9; 4]);
    }
}
