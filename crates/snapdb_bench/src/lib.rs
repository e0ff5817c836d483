//! Benchmark utilities.

use rand::Rng;

/// Generate random value bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` distinct little-endian keys.
pub fn generate_keys(count: usize) -> Vec<Vec<u8>> {
    (0..count as u64).map(|k| k.to_le_bytes().to_vec()).collect()
}
