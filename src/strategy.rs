//! The three model variants, expressed as allocation strategies.
//!
//! A strategy produces the per-protein counts `y` for one iteration from the
//! current abundances. The chain driver is the same for all of them.

use tracing::trace;

use crate::{
    abundance::Normalization,
    allocation::{allocate_all, par_allocate_all, AllocationSummary},
    model::{
        InputError, MultiMappedPeptides, PeptidesPerProtein, Result as InputResult, UniqueCounts,
        UniquePeptides,
    },
    pep,
    variates::{ForkVariates, Result},
};

/// How the per-peptide work of one iteration is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Execution {
    #[default]
    Sequential,
    /// Split ambiguous peptides into chunks of this size and allocate them
    /// on the rayon thread pool.
    Parallel { chunk_size: usize },
}

/// Per-iteration bookkeeping of a strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationSummary {
    pub ambiguous: AllocationSummary,
    /// Unique peptides excluded by the PEP gate.
    pub unique_excluded: usize,
}

/// Fills the allocation counts `y` for one iteration.
pub trait AllocationStrategy: Sync {
    fn num_proteins(&self) -> usize;

    /// Whether abundances are normalized when no explicit choice is made.
    fn default_normalization(&self) -> Normalization;

    /// Write the counts of this iteration into `y`, which arrives zeroed.
    ///
    /// If `detected` is given, it counts the peptides that contributed at
    /// least one spectrum to each protein.
    fn accumulate<V: ForkVariates>(
        &self,
        pi: &[f64],
        execution: Execution,
        rng: &mut V,
        y: &mut [f64],
        detected: Option<&mut [f64]>,
    ) -> Result<IterationSummary>;
}

fn check_proteins(name: &'static str, expected: usize, actual: usize) -> InputResult<()> {
    if expected != actual {
        return Err(InputError::LengthMismatch {
            name,
            expected,
            actual,
        });
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn allocate_ambiguous<V: ForkVariates>(
    peptides: &MultiMappedPeptides,
    peptides_per_protein: &PeptidesPerProtein,
    gated: bool,
    pi: &[f64],
    execution: Execution,
    rng: &mut V,
    y: &mut [f64],
    detected: Option<&mut [f64]>,
) -> Result<AllocationSummary> {
    let normalizer = peptides_per_protein.as_slice();
    match execution {
        Execution::Sequential => allocate_all(peptides, pi, normalizer, gated, rng, y, detected),
        Execution::Parallel { chunk_size } => {
            par_allocate_all(peptides, pi, normalizer, gated, chunk_size, rng, y, detected)
        }
    }
}

/// Only unique peptides: `y` is the same every iteration.
#[derive(Debug, Clone, Copy)]
pub struct UniqueOnly<'a> {
    unique: &'a UniqueCounts,
}

impl<'a> UniqueOnly<'a> {
    pub fn new(unique: &'a UniqueCounts) -> Self {
        Self { unique }
    }
}

impl AllocationStrategy for UniqueOnly<'_> {
    fn num_proteins(&self) -> usize {
        self.unique.num_proteins()
    }

    fn default_normalization(&self) -> Normalization {
        Normalization::Simplex
    }

    fn accumulate<V: ForkVariates>(
        &self,
        _pi: &[f64],
        _execution: Execution,
        _rng: &mut V,
        y: &mut [f64],
        _detected: Option<&mut [f64]>,
    ) -> Result<IterationSummary> {
        y.copy_from_slice(self.unique.as_slice());
        Ok(IterationSummary::default())
    }
}

/// Unique counts per protein plus allocation of every ambiguous peptide.
#[derive(Debug, Clone, Copy)]
pub struct FullAllocation<'a> {
    unique: &'a UniqueCounts,
    peptides: &'a MultiMappedPeptides,
    peptides_per_protein: &'a PeptidesPerProtein,
}

impl<'a> FullAllocation<'a> {
    pub fn new(
        unique: &'a UniqueCounts,
        peptides: &'a MultiMappedPeptides,
        peptides_per_protein: &'a PeptidesPerProtein,
    ) -> InputResult<Self> {
        let num_proteins = unique.num_proteins();
        check_proteins("EC_numeric_multi_map", num_proteins, peptides.num_proteins())?;
        check_proteins(
            "N_peptides_per_protein",
            num_proteins,
            peptides_per_protein.num_proteins(),
        )?;
        Ok(Self {
            unique,
            peptides,
            peptides_per_protein,
        })
    }
}

impl AllocationStrategy for FullAllocation<'_> {
    fn num_proteins(&self) -> usize {
        self.unique.num_proteins()
    }

    fn default_normalization(&self) -> Normalization {
        Normalization::None
    }

    fn accumulate<V: ForkVariates>(
        &self,
        pi: &[f64],
        execution: Execution,
        rng: &mut V,
        y: &mut [f64],
        detected: Option<&mut [f64]>,
    ) -> Result<IterationSummary> {
        y.copy_from_slice(self.unique.as_slice());
        let ambiguous = allocate_ambiguous(
            self.peptides,
            self.peptides_per_protein,
            false,
            pi,
            execution,
            rng,
            y,
            detected,
        )?;
        trace!(?ambiguous, "Allocated ambiguous peptides");
        Ok(IterationSummary {
            ambiguous,
            unique_excluded: 0,
        })
    }
}

/// Unique and ambiguous peptides, each gated by its posterior error
/// probability before it contributes.
#[derive(Debug, Clone, Copy)]
pub struct PepFiltered<'a> {
    unique: &'a UniquePeptides,
    peptides: &'a MultiMappedPeptides,
    peptides_per_protein: &'a PeptidesPerProtein,
}

impl<'a> PepFiltered<'a> {
    pub fn new(
        unique: &'a UniquePeptides,
        peptides: &'a MultiMappedPeptides,
        peptides_per_protein: &'a PeptidesPerProtein,
    ) -> InputResult<Self> {
        if !peptides.has_pep() && !peptides.is_empty() {
            return Err(InputError::MissingPep);
        }
        let num_proteins = unique.num_proteins();
        check_proteins("EC_numeric_multi_map", num_proteins, peptides.num_proteins())?;
        check_proteins(
            "N_peptides_per_protein",
            num_proteins,
            peptides_per_protein.num_proteins(),
        )?;
        Ok(Self {
            unique,
            peptides,
            peptides_per_protein,
        })
    }
}

impl AllocationStrategy for PepFiltered<'_> {
    fn num_proteins(&self) -> usize {
        self.unique.num_proteins()
    }

    fn default_normalization(&self) -> Normalization {
        Normalization::None
    }

    fn accumulate<V: ForkVariates>(
        &self,
        pi: &[f64],
        execution: Execution,
        rng: &mut V,
        y: &mut [f64],
        mut detected: Option<&mut [f64]>,
    ) -> Result<IterationSummary> {
        let unique_excluded = pep::accumulate_unique(self.unique, rng, y, detected.as_deref_mut())?;
        let ambiguous = allocate_ambiguous(
            self.peptides,
            self.peptides_per_protein,
            true,
            pi,
            execution,
            rng,
            y,
            detected,
        )?;
        trace!(unique_excluded, ?ambiguous, "Gated and allocated peptides");
        Ok(IterationSummary {
            ambiguous,
            unique_excluded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variates::{scripted::ScriptedVariates, RngVariates};
    use pretty_assertions::assert_eq;

    fn ambiguous(num_proteins: usize) -> MultiMappedPeptides {
        MultiMappedPeptides::from_one_based(&[vec![1, 2], vec![2, 3]], vec![10., 4.], num_proteins)
            .unwrap()
    }

    #[test]
    fn unique_only_copies_counts() {
        let unique = UniqueCounts::new(vec![3., 0., 2.], 3).unwrap();
        let strategy = UniqueOnly::new(&unique);
        let mut y = [0f64; 3];
        let mut rng = ScriptedVariates::new();
        strategy
            .accumulate(&[1.; 3], Execution::Sequential, &mut rng, &mut y, None)
            .unwrap();
        assert_eq!(y, [3., 0., 2.]);
        assert_eq!(strategy.default_normalization(), Normalization::Simplex);
    }

    #[test]
    fn full_allocation_adds_unique_counts() {
        let unique = UniqueCounts::new(vec![1., 1., 1.], 3).unwrap();
        let peptides = ambiguous(3);
        let normalizer = PeptidesPerProtein::uniform(3);
        let strategy = FullAllocation::new(&unique, &peptides, &normalizer).unwrap();
        assert_eq!(strategy.default_normalization(), Normalization::None);

        let mut rng = ScriptedVariates::new();
        let mut y = [0f64; 3];
        let summary = strategy
            .accumulate(&[1.; 3], Execution::Sequential, &mut rng, &mut y, None)
            .unwrap();
        assert_eq!(y, [6., 8., 3.]);
        assert_eq!(summary.ambiguous.allocated, 2);

        let mut rng = RngVariates::seed_from_u64(1);
        let mut y = [0f64; 3];
        strategy
            .accumulate(
                &[1.; 3],
                Execution::Parallel { chunk_size: 1 },
                &mut rng,
                &mut y,
                None,
            )
            .unwrap();
        assert_eq!(y.iter().sum::<f64>(), 17.);
    }

    #[test]
    fn dimension_mismatch() {
        let unique = UniqueCounts::new(vec![1., 1.], 2).unwrap();
        let peptides = ambiguous(3);
        let normalizer = PeptidesPerProtein::uniform(2);
        assert!(FullAllocation::new(&unique, &peptides, &normalizer).is_err());
    }

    #[test]
    fn pep_requires_probabilities() {
        let unique = UniquePeptides::from_one_based(&[1], vec![1.], vec![0.], 3).unwrap();
        let peptides = ambiguous(3);
        let normalizer = PeptidesPerProtein::uniform(3);
        assert_eq!(
            PepFiltered::new(&unique, &peptides, &normalizer).unwrap_err(),
            InputError::MissingPep
        );
    }

    #[test]
    fn pep_filtered_gates_everything() {
        let unique =
            UniquePeptides::from_one_based(&[1, 3], vec![5., 2.], vec![0.2, 0.7], 3).unwrap();
        let peptides = ambiguous(3).with_pep(vec![0.1, 0.1]).unwrap();
        let normalizer = PeptidesPerProtein::uniform(3);
        let strategy = PepFiltered::new(&unique, &peptides, &normalizer).unwrap();
        assert_eq!(strategy.default_normalization(), Normalization::None);

        // Unique gates first, then the ambiguous ones, in order.
        let mut rng = ScriptedVariates::with_bernoulli([false, true, true, false]);
        let mut y = [0f64; 3];
        let mut detected = [0f64; 3];
        let summary = strategy
            .accumulate(
                &[1.; 3],
                Execution::Sequential,
                &mut rng,
                &mut y,
                Some(&mut detected),
            )
            .unwrap();
        assert_eq!(y, [5., 2., 2.]);
        assert_eq!(detected, [1., 1., 1.]);
        assert_eq!(summary.unique_excluded, 1);
        assert_eq!(summary.ambiguous.excluded, 1);
        assert_eq!(summary.ambiguous.allocated, 1);
    }
}
