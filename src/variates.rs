//! Random variate generation used by the Gibbs sampler.
//!
//! All draws go through the [`Variates`] trait so that the chain can be run
//! with a seeded random generator, or with a scripted source in tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Bernoulli, Binomial, Distribution, Gamma};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VariateError {
    #[error("Invalid gamma shape parameter {0}")]
    GammaShape(f64),
    #[error("Invalid binomial parameters n={n}, p={p}")]
    Binomial { n: u64, p: f64 },
    #[error("Invalid bernoulli probability {0}")]
    BernoulliProbability(f64),
}

pub type Result<T> = std::result::Result<T, VariateError>;

/// The random draws needed by one Gibbs iteration.
pub trait Variates {
    /// Draw from `Gamma(shape, 1)`.
    fn gamma(&mut self, shape: f64) -> Result<f64>;

    /// Draw a Bernoulli variable, `true` with probability `p`.
    fn bernoulli(&mut self, p: f64) -> Result<bool>;

    fn binomial(&mut self, n: u64, p: f64) -> Result<u64>;

    /// Draw from `Multinomial(n, probs)` into `out`.
    ///
    /// `probs` must sum to one. The draw is built from conditional binomials,
    /// and the last category receives whatever is left, so `out` always sums
    /// to exactly `n`.
    fn multinomial(&mut self, n: u64, probs: &[f64], out: &mut [u64]) -> Result<()> {
        assert!(probs.len() == out.len());
        out.fill(0);

        let Some(last) = probs.len().checked_sub(1) else {
            return Ok(());
        };

        let mut remaining = n;
        let mut mass = 1f64;
        for (&p, slot) in probs[..last].iter().zip(out[..last].iter_mut()) {
            if remaining == 0 {
                break;
            }
            if p > 0. {
                let conditional = if mass > p { p / mass } else { 1. };
                let draw = self.binomial(remaining, conditional.min(1.))?;
                *slot = draw;
                remaining -= draw;
            }
            mass -= p;
        }
        out[last] += remaining;
        Ok(())
    }
}

/// Variates that can be split into independent streams for parallel work.
pub trait ForkVariates: Variates + Send + Sized {
    /// Split off `count` independent streams. Calling this advances `self`,
    /// so consecutive forks yield different streams.
    fn fork(&mut self, count: usize) -> Vec<Self>;
}

/// [`Variates`] backed by any [`rand::Rng`].
#[derive(Debug, Clone)]
pub struct RngVariates<R> {
    rng: R,
}

impl<R: Rng> RngVariates<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngVariates<ChaCha8Rng> {
    pub fn seed_from_u64(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng> Variates for RngVariates<R> {
    fn gamma(&mut self, shape: f64) -> Result<f64> {
        let dist = Gamma::new(shape, 1f64).map_err(|_| VariateError::GammaShape(shape))?;
        Ok(dist.sample(&mut self.rng))
    }

    fn bernoulli(&mut self, p: f64) -> Result<bool> {
        let dist = Bernoulli::new(p).map_err(|_| VariateError::BernoulliProbability(p))?;
        Ok(dist.sample(&mut self.rng))
    }

    fn binomial(&mut self, n: u64, p: f64) -> Result<u64> {
        let dist = Binomial::new(n, p).map_err(|_| VariateError::Binomial { n, p })?;
        Ok(dist.sample(&mut self.rng))
    }
}

impl ForkVariates for RngVariates<ChaCha8Rng> {
    fn fork(&mut self, count: usize) -> Vec<Self> {
        let seed: u64 = self.rng.random();
        (0..count)
            .map(|stream| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(stream as u64);
                Self::new(rng)
            })
            .collect()
    }
}

pub mod scripted {
    //! A deterministic variate source for testing.

    use std::collections::VecDeque;

    use super::{ForkVariates, Result, VariateError, Variates};

    /// Returns the mean for gamma and binomial draws (the binomial rounded to
    /// the nearest integer), and plays back a script of bernoulli outcomes.
    ///
    /// Once the script is exhausted, bernoulli draws are `true` only for
    /// `p >= 1`.
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedVariates {
        bernoulli: VecDeque<bool>,
        pub gamma_calls: usize,
        pub bernoulli_calls: usize,
    }

    impl ScriptedVariates {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_bernoulli(outcomes: impl IntoIterator<Item = bool>) -> Self {
            Self {
                bernoulli: outcomes.into_iter().collect(),
                ..Default::default()
            }
        }
    }

    impl Variates for ScriptedVariates {
        fn gamma(&mut self, shape: f64) -> Result<f64> {
            if !(shape > 0.) || !shape.is_finite() {
                return Err(VariateError::GammaShape(shape));
            }
            self.gamma_calls += 1;
            Ok(shape)
        }

        fn bernoulli(&mut self, p: f64) -> Result<bool> {
            if !(0f64..=1f64).contains(&p) {
                return Err(VariateError::BernoulliProbability(p));
            }
            self.bernoulli_calls += 1;
            Ok(self.bernoulli.pop_front().unwrap_or(p >= 1.))
        }

        fn binomial(&mut self, n: u64, p: f64) -> Result<u64> {
            if !(0f64..=1f64).contains(&p) {
                return Err(VariateError::Binomial { n, p });
            }
            Ok(((n as f64 * p).round() as u64).min(n))
        }
    }

    impl ForkVariates for ScriptedVariates {
        fn fork(&mut self, count: usize) -> Vec<Self> {
            (0..count).map(|_| ScriptedVariates::new()).collect()
        }
    }
}
