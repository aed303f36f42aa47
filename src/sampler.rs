use std::time::Instant;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    abundance::Normalization,
    chain::{GibbsChain, InitialAbundance, StepOptions},
    model::{DirichletPrior, MultiMappedPeptides, PeptidesPerProtein, UniqueCounts, UniquePeptides},
    strategy::{AllocationStrategy, Execution, FullAllocation, PepFiltered, UniqueOnly},
    trace::{Trace, TraceBuilder},
    variates::RngVariates,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("The chain needs at least one iteration")]
    NoIterations,
    #[error("The thinning interval must be at least one")]
    ZeroThin,
    #[error("burn_in ({burn_in}) must be smaller than num_iterations ({num_iterations})")]
    BurnInTooLong { burn_in: u64, num_iterations: u64 },
    #[error("No draws would be retained with thin={thin} after burn-in of {burn_in} out of {num_iterations} iterations")]
    NoDraws {
        num_iterations: u64,
        burn_in: u64,
        thin: u64,
    },
    #[error("The parallel chunk size must be at least one")]
    ZeroChunkSize,
}

/// Settings for a Gibbs sampler run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerSettings {
    /// Total number of iterations, including burn-in.
    pub num_iterations: u64,
    /// Number of initial iterations that are never stored.
    pub burn_in: u64,
    /// Store only iterations that are a multiple of `thin`.
    pub thin: u64,
    pub seed: u64,
    /// Override how abundances are normalized. If `None`, every variant uses
    /// its own convention: the unique-only sampler normalizes to the
    /// simplex, the allocating samplers store raw Gamma draws.
    pub normalization: Option<Normalization>,
    pub init: InitialAbundance,
    /// Allocate ambiguous peptides on the rayon thread pool.
    pub parallel: bool,
    /// Number of peptides per parallel work item.
    pub chunk_size: usize,
    /// Also record how many peptides contributed to each protein.
    pub store_detected: bool,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            num_iterations: 2000,
            burn_in: 1000,
            thin: 1,
            seed: 0,
            normalization: None,
            init: InitialAbundance::Flat,
            parallel: false,
            chunk_size: 256,
            store_detected: false,
        }
    }
}

impl SamplerSettings {
    pub fn validate(&self) -> std::result::Result<(), SettingsError> {
        if self.num_iterations == 0 {
            return Err(SettingsError::NoIterations);
        }
        if self.thin == 0 {
            return Err(SettingsError::ZeroThin);
        }
        if self.burn_in >= self.num_iterations {
            return Err(SettingsError::BurnInTooLong {
                burn_in: self.burn_in,
                num_iterations: self.num_iterations,
            });
        }
        if self.num_draws() == 0 {
            return Err(SettingsError::NoDraws {
                num_iterations: self.num_iterations,
                burn_in: self.burn_in,
                thin: self.thin,
            });
        }
        if self.parallel && self.chunk_size == 0 {
            return Err(SettingsError::ZeroChunkSize);
        }
        Ok(())
    }

    /// Number of rows in the output trace, `(num_iterations - burn_in) / thin`.
    pub fn num_draws(&self) -> usize {
        match self.num_iterations.checked_sub(self.burn_in) {
            Some(kept) if self.thin > 0 => (kept / self.thin) as usize,
            _ => 0,
        }
    }

    /// The trace row that iteration `draw` is stored in, if any.
    ///
    /// Iterations are kept if they are a multiple of `thin` and not part of
    /// the burn-in. Rows beyond the end of the trace are dropped.
    pub fn retained_row(&self, draw: u64) -> Option<usize> {
        if self.thin == 0 || draw % self.thin != 0 || draw < self.burn_in {
            return None;
        }
        let row = ((draw - self.burn_in) / self.thin) as usize;
        (row < self.num_draws()).then_some(row)
    }

    fn execution(&self) -> Execution {
        if self.parallel {
            Execution::Parallel {
                chunk_size: self.chunk_size,
            }
        } else {
            Execution::Sequential
        }
    }
}

/// Run a chain with any allocation strategy and collect the retained draws.
pub fn sample<S: AllocationStrategy>(
    strategy: &S,
    prior: &DirichletPrior,
    settings: &SamplerSettings,
) -> Result<Trace> {
    settings.validate().context("Invalid sampler settings")?;

    let options = StepOptions {
        normalization: settings
            .normalization
            .unwrap_or_else(|| strategy.default_normalization()),
        execution: settings.execution(),
        store_detected: settings.store_detected,
    };
    let num_draws = settings.num_draws();
    info!(
        proteins = strategy.num_proteins(),
        iterations = settings.num_iterations,
        draws = num_draws,
        ?options,
        "Starting Gibbs sampler"
    );

    let start = Instant::now();
    let rng = RngVariates::seed_from_u64(settings.seed);
    let mut chain = GibbsChain::new(strategy, prior.as_slice(), settings.init, options, rng)
        .context("Prior does not match the model")?;
    let mut trace = TraceBuilder::new(num_draws, strategy.num_proteins(), settings.store_detected);

    for _ in 0..settings.num_iterations {
        let (state, progress) = chain.draw()?;
        if let Some(row) = settings.retained_row(progress.draw) {
            trace.set_row(row, progress.draw, &state);
        }
    }

    let trace = trace.finalize();
    let unfilled = trace.iterations.iter().filter(|it| it.is_none()).count();
    if unfilled > 0 {
        debug!(unfilled, "Some trace rows were not written by any iteration");
    }
    info!(elapsed = ?start.elapsed(), "Finished Gibbs sampler");
    Ok(trace)
}

/// Sample abundances from unique peptide counts only.
pub fn sample_unique(
    unique: &UniqueCounts,
    prior: &DirichletPrior,
    settings: &SamplerSettings,
) -> Result<Trace> {
    let strategy = UniqueOnly::new(unique);
    sample(&strategy, prior, settings)
}

/// Sample abundances from unique counts and ambiguous peptides, allocating
/// every ambiguous peptide in every iteration.
pub fn sample_full(
    peptides: &MultiMappedPeptides,
    unique: &UniqueCounts,
    peptides_per_protein: &PeptidesPerProtein,
    prior: &DirichletPrior,
    settings: &SamplerSettings,
) -> Result<Trace> {
    let strategy = FullAllocation::new(unique, peptides, peptides_per_protein)
        .context("Inconsistent model dimensions")?;
    sample(&strategy, prior, settings)
}

/// Sample abundances where every peptide-spectrum match is only taken into
/// account with probability one minus its posterior error probability.
pub fn sample_pep(
    peptides: &MultiMappedPeptides,
    unique: &UniquePeptides,
    peptides_per_protein: &PeptidesPerProtein,
    prior: &DirichletPrior,
    settings: &SamplerSettings,
) -> Result<Trace> {
    let strategy = PepFiltered::new(unique, peptides, peptides_per_protein)
        .context("Invalid PEP model")?;
    sample(&strategy, prior, settings)
}
