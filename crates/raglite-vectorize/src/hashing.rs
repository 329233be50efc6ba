//! Signed feature hashing.
//!
//! index = H1(name) mod D, sign = ±1 from H2(name). H1 and H2 are seeded
//! xxh3 with independent seeds derived from the configured base seed, so
//! the mapping is deterministic across runs and processes.

use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Hashes named features into a fixed-dimension slice with the sign trick.
#[derive(Debug, Clone, Copy)]
pub struct FeatureHasher {
    seed: u64,
}

const SIGN_SEED_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

impl FeatureHasher {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Bucket index for a feature name within `dims` buckets.
    pub fn index(&self, name: &str, dims: usize) -> usize {
        (xxh3_64_with_seed(name.as_bytes(), self.seed) % dims as u64) as usize
    }

    /// Deterministic ±1 sign, independent of `index`.
    pub fn sign(&self, name: &str) -> f32 {
        if xxh3_64_with_seed(name.as_bytes(), self.seed ^ SIGN_SEED_SALT) & 1 == 0 {
            1.0
        } else {
            -1.0
        }
    }

    /// vec[offset + H1(name) mod dims] += sign(name) * weight
    pub fn add(&self, vec: &mut [f32], offset: usize, dims: usize, name: &str, weight: f32) {
        debug_assert!(offset + dims <= vec.len());
        let idx = offset + self.index(name, dims);
        vec[idx] += self.sign(name) * weight;
    }

    /// Unsigned variant for count-style features.
    pub fn add_unsigned(
        &self,
        vec: &mut [f32],
        offset: usize,
        dims: usize,
        name: &str,
        weight: f32,
    ) {
        let idx = offset + self.index(name, dims);
        vec[idx] += weight;
    }

    /// Raw 64-bit hash of a name (neighborhood signatures).
    pub fn raw(&self, name: &str) -> u64 {
        xxh3_64_with_seed(name.as_bytes(), self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_across_instances() {
        let a = FeatureHasher::new(42);
        let b = FeatureHasher::new(42);
        assert_eq!(a.index("has_func", 256), b.index("has_func", 256));
        assert_eq!(a.sign("has_func"), b.sign("has_func"));
    }

    #[test]
    fn seed_changes_mapping() {
        let a = FeatureHasher::new(42);
        let b = FeatureHasher::new(43);
        let moved = (0..64)
            .filter(|i| a.index(&format!("f{i}"), 1024) != b.index(&format!("f{i}"), 1024))
            .count();
        assert!(moved > 32);
    }

    #[test]
    fn index_stays_in_range() {
        let h = FeatureHasher::new(7);
        for i in 0..1000 {
            assert!(h.index(&format!("feature_{i}"), 128) < 128);
        }
    }

    #[test]
    fn signs_are_mixed() {
        let h = FeatureHasher::new(42);
        let positive = (0..128)
            .filter(|i| h.sign(&format!("n{i}")) > 0.0)
            .count();
        assert!(positive > 32 && positive < 96);
    }

    #[test]
    fn add_accumulates_with_sign() {
        let h = FeatureHasher::new(42);
        let mut vec = vec![0.0f32; 16];
        h.add(&mut vec, 0, 16, "x", 2.0);
        h.add(&mut vec, 0, 16, "x", 1.0);
        let idx = h.index("x", 16);
        assert_eq!(vec[idx], h.sign("x") * 3.0);
    }
}
