//! Deterministic pseudo-randomness for sample collection.
//!
//! Training must be reproducible across platforms and runs, so subsampling
//! uses a fixed LCG instead of a system RNG.

/// Linear Congruential Generator with glibc-compatible constants.
#[derive(Clone, Debug)]
pub struct LcgRng {
    state: i64,
}

impl LcgRng {
    const MULTIPLIER: i64 = 1103515245;
    const INCREMENT: i64 = 12345;
    const MODULUS: i64 = 1 << 31;

    pub fn new(seed: i64) -> Self {
        Self {
            state: seed.abs() % Self::MODULUS,
        }
    }

    /// Next value in `[0, MODULUS)`.
    pub fn next_i64(&mut self) -> i64 {
        self.state = self
            .state
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::INCREMENT);
        (self.state & (Self::MODULUS - 1)).abs()
    }

    /// Next value in the open unit interval.
    pub fn next_unit(&mut self) -> f64 {
        (self.next_i64() as f64 + 0.5) / Self::MODULUS as f64
    }

    /// Number of failures before the first success of a Bernoulli(`p`) trial.
    pub fn geometric(&mut self, p: f64) -> usize {
        if p >= 1.0 {
            return 0;
        }
        let u = self.next_unit();
        (u.ln() / (1.0 - p).ln()) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = LcgRng::new(42);
        let mut b = LcgRng::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_i64(), b.next_i64());
        }
    }

    #[test]
    fn unit_values_in_range() {
        let mut rng = LcgRng::new(7);
        for _ in 0..100 {
            let u = rng.next_unit();
            assert!(u > 0.0 && u < 1.0);
        }
    }

    #[test]
    fn geometric_mean_tracks_probability() {
        let mut rng = LcgRng::new(3);
        let p = 0.25;
        let n = 10_000;
        let total: usize = (0..n).map(|_| rng.geometric(p)).sum();
        let mean = total as f64 / n as f64;
        // E[failures] = (1 - p) / p = 3.
        assert!((mean - 3.0).abs() < 0.2, "mean {mean}");
    }

    #[test]
    fn certain_success_never_skips() {
        let mut rng = LcgRng::new(1);
        assert_eq!(rng.geometric(1.0), 0);
    }
}
