//! Test fixtures for generating test data.

use bytes::Bytes;

/// One mebibyte.
#[allow(dead_code)]
pub const MIB: u64 = 1024 * 1024;

/// Generate deterministic test data based on a seed.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Split `data` into consecutive parts of `part_size` bytes (the last may be shorter).
///
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn split_into_chunks(data: &Bytes, part_size: usize) -> Vec<Bytes> {
    (0..data.len())
        .step_by(part_size)
        .map(|start| data.slice(start..(start + part_size).min(data.len())))
        .collect()
}
