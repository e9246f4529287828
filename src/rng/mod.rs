//! Random number generation for corruption and data splitting
//!
//! Evaluation is reproducible only when a seed is supplied; without one the
//! generator is seeded from the operating system on every call.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Seed used by the command line when none is given
pub const DEFAULT_SEED: u64 = 8;

/// Build a fresh generator, seeded deterministically when `seed` is set
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}
