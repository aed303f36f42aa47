//! Gibbs sampling of protein abundances from peptide spectral counts.
//!
//! Peptides that are shared between several proteins make it ambiguous
//! which protein their spectra belong to. This crate samples from a
//! Dirichlet–multinomial model of the problem: each iteration allocates the
//! counts of every ambiguous peptide to its candidate proteins with a
//! multinomial draw, then draws new protein abundances from the Dirichlet
//! posterior given the allocated counts.
//!
//! Three variants are available:
//!
//! * [`sample_unique`] only uses peptides that are unique to one protein.
//! * [`sample_full`] also allocates the ambiguous peptides.
//! * [`sample_pep`] additionally drops every peptide-spectrum match with
//!   probability equal to its posterior error probability, independently in
//!   each iteration.
//!
//! ```
//! use razor_gibbs::{
//!     sample_full, DirichletPrior, MultiMappedPeptides, PeptidesPerProtein, SamplerSettings,
//!     UniqueCounts,
//! };
//!
//! // Protein indices are 1-based.
//! let peptides = MultiMappedPeptides::from_one_based(&[vec![1, 2]], vec![12.], 2)?;
//! let unique = UniqueCounts::new(vec![10., 0.], 2)?;
//! let normalizer = PeptidesPerProtein::uniform(2);
//! let prior = DirichletPrior::flat(2, 1.)?;
//! let settings = SamplerSettings {
//!     num_iterations: 200,
//!     burn_in: 100,
//!     seed: 42,
//!     ..Default::default()
//! };
//! let trace = sample_full(&peptides, &unique, &normalizer, &prior, &settings)?;
//! assert_eq!(trace.pi.nrows(), 100);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub(crate) mod abundance;
pub(crate) mod allocation;
pub(crate) mod chain;
pub(crate) mod math;
pub(crate) mod model;
pub(crate) mod pep;
pub(crate) mod sampler;
pub(crate) mod strategy;
pub(crate) mod trace;
pub mod variates;

pub use abundance::{update_abundance, Normalization};
pub use allocation::{allocate_all, par_allocate_all, AllocationSummary, Allocator};
pub use chain::{step, ChainState, GibbsChain, InitialAbundance, Progress, StepOptions};
pub use model::{
    DirichletPrior, InputError, MultiMappedPeptides, PeptideClass, PeptidesPerProtein,
    UniqueCounts, UniquePeptides,
};
pub use pep::{accumulate_unique, passes};
pub use sampler::{sample, sample_full, sample_pep, sample_unique, SamplerSettings, SettingsError};
pub use strategy::{
    AllocationStrategy, Execution, FullAllocation, IterationSummary, PepFiltered, UniqueOnly,
};
pub use trace::{Matrix, Trace, TraceBuilder};
pub use variates::{ForkVariates, RngVariates, VariateError, Variates};
