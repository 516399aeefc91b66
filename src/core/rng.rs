//! Seeded Random Number Generator
//!
//! Xorshift128+ with SplitMix64 seeding. Every match session owns one, so the
//! serve direction and the bot's reaction rolls are reproducible from the seed.

use sha2::{Digest, Sha256};

/// Xorshift128+ PRNG.
///
/// Given the same seed, produces the same sequence on every platform.
///
/// # Example
///
/// ```
/// use pong_arena::core::rng::SessionRng;
///
/// let mut a = SessionRng::new(12345);
/// let mut b = SessionRng::new(12345);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug)]
pub struct SessionRng {
    state: [u64; 2],
}

impl Default for SessionRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SessionRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, so weak seeds
    /// (0, 1, 2, ...) still produce well-distributed sequences.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Xorshift must never run from the all-zero state
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Uniform float in `[0, 1)`.
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        // 53 high bits fill the mantissa exactly
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// `true` with the given probability (clamped to `[0, 1]`).
    #[inline]
    pub fn chance(&mut self, probability: f64) -> bool {
        self.next_f64() < probability.clamp(0.0, 1.0)
    }

    /// `1.0` or `-1.0` with equal probability.
    #[inline]
    pub fn next_sign(&mut self) -> f64 {
        if self.next_f64() > 0.5 {
            1.0
        } else {
            -1.0
        }
    }
}

/// SplitMix64 for seed initialization.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive a session seed from the match identity and a nonce.
///
/// The reactor passes a fresh random nonce per match; tests pass a constant
/// to pin the sequence.
pub fn derive_session_seed(game_id: i64, player_ids: [i64; 2], nonce: u128) -> u64 {
    let mut hasher = Sha256::new();

    hasher.update(b"PONG_ARENA_SEED_V1");
    hasher.update(game_id.to_le_bytes());
    for pid in player_ids {
        hasher.update(pid.to_le_bytes());
    }
    hasher.update(nonce.to_le_bytes());

    let hash = hasher.finalize();

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&hash[..8]);
    u64::from_le_bytes(seed)
}
