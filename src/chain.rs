use anyhow::{Context, Result};
use tracing::trace;

use crate::{
    abundance::{update_abundance, Normalization},
    model::{self, check_len},
    strategy::{AllocationStrategy, Execution, IterationSummary},
    variates::{self, ForkVariates},
};

/// The state after one Gibbs iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainState {
    /// Abundance draw of this iteration.
    pub pi: Box<[f64]>,
    /// Counts allocated to each protein in this iteration.
    pub y: Box<[f64]>,
    /// Peptides that contributed to each protein, if tracked.
    pub detected: Option<Box<[f64]>>,
}

/// Where the chain starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialAbundance {
    /// All abundances equal to one.
    #[default]
    Flat,
    /// Abundances equal to the Dirichlet prior concentrations.
    Prior,
}

impl InitialAbundance {
    pub fn init(&self, prior: &[f64]) -> Box<[f64]> {
        match self {
            InitialAbundance::Flat => vec![1f64; prior.len()].into(),
            InitialAbundance::Prior => prior.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOptions {
    pub normalization: Normalization,
    pub execution: Execution,
    pub store_detected: bool,
}

/// Run one Gibbs iteration starting from the abundances `pi`.
///
/// First the counts are allocated given `pi`, then new abundances are drawn
/// given the counts. Nothing but the returned state carries over to the next
/// iteration.
///
/// # Panics
///
/// If `pi` or `prior` do not have one entry per protein of `strategy`.
pub fn step<S: AllocationStrategy, V: ForkVariates>(
    pi: &[f64],
    strategy: &S,
    prior: &[f64],
    options: &StepOptions,
    rng: &mut V,
) -> variates::Result<(ChainState, IterationSummary)> {
    let dim = strategy.num_proteins();
    let mut y = vec![0f64; dim].into_boxed_slice();
    let mut detected = options
        .store_detected
        .then(|| vec![0f64; dim].into_boxed_slice());

    let summary =
        strategy.accumulate(pi, options.execution, rng, &mut y, detected.as_deref_mut())?;
    let pi = update_abundance(&y, prior, options.normalization, rng)?;

    Ok((ChainState { pi, y, detected }, summary))
}

#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct Progress {
    /// Index of the iteration that produced the draw.
    pub draw: u64,
    pub summary: IterationSummary,
}

/// A single Markov chain over protein abundances.
pub struct GibbsChain<'a, S, V> {
    strategy: &'a S,
    prior: &'a [f64],
    options: StepOptions,
    rng: V,
    pi: Box<[f64]>,
    draw_count: u64,
}

impl<'a, S, V> GibbsChain<'a, S, V>
where
    S: AllocationStrategy,
    V: ForkVariates,
{
    /// Fails if `prior` does not have one entry per protein of `strategy`.
    pub fn new(
        strategy: &'a S,
        prior: &'a [f64],
        init: InitialAbundance,
        options: StepOptions,
        rng: V,
    ) -> model::Result<Self> {
        check_len("delta_prior", strategy.num_proteins(), prior.len())?;
        Ok(Self {
            strategy,
            prior,
            options,
            rng,
            pi: init.init(prior),
            draw_count: 0,
        })
    }

    /// Run the next iteration and return its state.
    pub fn draw(&mut self) -> Result<(ChainState, Progress)> {
        let (state, summary) = step(
            &self.pi,
            self.strategy,
            self.prior,
            &self.options,
            &mut self.rng,
        )
        .with_context(|| format!("Gibbs iteration {} failed", self.draw_count))?;

        trace!(draw = self.draw_count, ?summary, "Finished iteration");
        let progress = Progress {
            draw: self.draw_count,
            summary,
        };
        self.draw_count += 1;
        self.pi.copy_from_slice(&state.pi);
        Ok((state, progress))
    }

    /// The current abundances, the starting point of the next draw.
    pub fn pi(&self) -> &[f64] {
        &self.pi
    }

    pub fn draw_count(&self) -> u64 {
        self.draw_count
    }
}
