//! Trial RNG seeding with ChaCha8.
//!
//! Each random-order trial gets its own ChaCha8Rng seeded from
//! `(seed + stream)`. Same seed -> same index sequence, always.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Create a deterministic RNG for a trial seed and stream id.
pub fn trial_rng(seed: u64, stream: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed.wrapping_add(stream))
}
