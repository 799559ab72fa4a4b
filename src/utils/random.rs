//! Random draws for starting blocks and breakdown recovery.

use faer::Mat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A generator seeded from `seed`, or from OS entropy when `None`.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_os_rng(),
    }
}

/// An `n x b` matrix with entries uniform in `[-0.5, 0.5)`.
pub fn random_block(rng: &mut StdRng, n: usize, b: usize) -> Mat<f64> {
    Mat::from_fn(n, b, |_, _| rng.random::<f64>() - 0.5)
}
