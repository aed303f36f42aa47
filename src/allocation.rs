//! Allocation of ambiguous peptide counts to their candidate proteins.
//!
//! Given the current abundances `pi`, the count of a peptide is split over
//! its equivalence class by a multinomial draw with probabilities
//! proportional to `pi[p] / peptides_per_protein[p]`.

use std::ops::AddAssign;

use rayon::prelude::*;

use crate::{
    math::{add_assign, add_assign_opt},
    model::{MultiMappedPeptides, PeptideClass},
    pep,
    variates::{ForkVariates, Result, VariateError, Variates},
};

/// What happened to the ambiguous peptides during one allocation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationSummary {
    /// Peptides whose count was distributed over their class.
    pub allocated: usize,
    /// Peptides skipped because all candidate weights were zero.
    pub degenerate: usize,
    /// Peptides excluded by the PEP gate.
    pub excluded: usize,
}

impl AddAssign for AllocationSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.allocated += rhs.allocated;
        self.degenerate += rhs.degenerate;
        self.excluded += rhs.excluded;
    }
}

/// Scratch buffers for allocating one peptide at a time.
#[derive(Debug, Default)]
pub struct Allocator {
    probs: Vec<f64>,
    draws: Vec<u64>,
}

impl Allocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split the count of `class` over its candidates and add the result
    /// to `y`.
    ///
    /// Returns `false` without drawing anything if the candidate weights sum
    /// to zero. The count is truncated to a whole number of spectra.
    pub fn allocate<V: Variates + ?Sized>(
        &mut self,
        class: &PeptideClass<'_>,
        pi: &[f64],
        peptides_per_protein: &[f64],
        rng: &mut V,
        y: &mut [f64],
        detected: Option<&mut [f64]>,
    ) -> Result<bool> {
        self.probs.clear();
        self.probs.extend(
            class
                .proteins
                .iter()
                .map(|&protein| pi[protein] / peptides_per_protein[protein]),
        );

        let total: f64 = self.probs.iter().sum();
        // Only an exact zero (or NaN) sum is degenerate, tiny sums still
        // normalize fine since every weight is at most the total.
        if !(total > 0.) {
            return Ok(false);
        }
        self.probs.iter_mut().for_each(|p| *p /= total);

        self.draws.clear();
        self.draws.resize(self.probs.len(), 0);
        rng.multinomial(class.count.floor() as u64, &self.probs, &mut self.draws)?;

        for (&protein, &draw) in class.proteins.iter().zip(self.draws.iter()) {
            y[protein] += draw as f64;
        }
        if let Some(detected) = detected {
            for (&protein, &draw) in class.proteins.iter().zip(self.draws.iter()) {
                if draw > 0 {
                    detected[protein] += 1.;
                }
            }
        }
        Ok(true)
    }
}

#[allow(clippy::too_many_arguments)]
fn process_peptide<V: Variates + ?Sized>(
    allocator: &mut Allocator,
    class: &PeptideClass<'_>,
    pi: &[f64],
    peptides_per_protein: &[f64],
    gated: bool,
    rng: &mut V,
    y: &mut [f64],
    detected: Option<&mut [f64]>,
    summary: &mut AllocationSummary,
) -> Result<()> {
    if let Some(pep) = class.pep.filter(|_| gated) {
        if !pep::passes(rng, pep)? {
            summary.excluded += 1;
            return Ok(());
        }
    }
    if allocator.allocate(class, pi, peptides_per_protein, rng, y, detected)? {
        summary.allocated += 1;
    } else {
        summary.degenerate += 1;
    }
    Ok(())
}

/// Allocate every ambiguous peptide in order, drawing from a single stream.
///
/// If `gated` is set, each peptide that carries a PEP is first passed
/// through the PEP gate.
pub fn allocate_all<V: Variates + ?Sized>(
    peptides: &MultiMappedPeptides,
    pi: &[f64],
    peptides_per_protein: &[f64],
    gated: bool,
    rng: &mut V,
    y: &mut [f64],
    mut detected: Option<&mut [f64]>,
) -> Result<AllocationSummary> {
    let mut allocator = Allocator::new();
    let mut summary = AllocationSummary::default();
    for class in peptides.iter() {
        process_peptide(
            &mut allocator,
            &class,
            pi,
            peptides_per_protein,
            gated,
            rng,
            y,
            detected.as_deref_mut(),
            &mut summary,
        )?;
    }
    Ok(summary)
}

/// Allocate the ambiguous peptides in parallel.
///
/// Peptides are split into chunks of `chunk_size`. Each chunk draws from its
/// own stream forked off `rng` and accumulates into a private buffer, and the
/// buffers are summed at the end. Since all allocated counts are whole
/// numbers, the result only depends on the seed of `rng` and `chunk_size`,
/// not on how rayon schedules the chunks.
#[allow(clippy::too_many_arguments)]
pub fn par_allocate_all<V: ForkVariates>(
    peptides: &MultiMappedPeptides,
    pi: &[f64],
    peptides_per_protein: &[f64],
    gated: bool,
    chunk_size: usize,
    rng: &mut V,
    y: &mut [f64],
    detected: Option<&mut [f64]>,
) -> Result<AllocationSummary> {
    let chunk_size = chunk_size.max(1);
    let num_chunks = peptides.len().div_ceil(chunk_size);
    let streams = rng.fork(num_chunks);
    let dim = y.len();
    let track_detected = detected.is_some();

    let zeros = || {
        (
            vec![0f64; dim].into_boxed_slice(),
            track_detected.then(|| vec![0f64; dim].into_boxed_slice()),
            AllocationSummary::default(),
        )
    };

    let (local_y, local_detected, summary) = streams
        .into_par_iter()
        .enumerate()
        .map(|(chunk, mut stream)| {
            let (mut y, mut detected, mut summary) = zeros();
            let mut allocator = Allocator::new();
            let start = chunk * chunk_size;
            let end = (start + chunk_size).min(peptides.len());
            for peptide in start..end {
                process_peptide(
                    &mut allocator,
                    &peptides.get(peptide),
                    pi,
                    peptides_per_protein,
                    gated,
                    &mut stream,
                    &mut y,
                    detected.as_deref_mut(),
                    &mut summary,
                )?;
            }
            Ok::<_, VariateError>((y, detected, summary))
        })
        .try_reduce(zeros, |mut acc, other| {
            add_assign(&mut acc.0, &other.0);
            add_assign_opt(&mut acc.1, &other.1);
            acc.2 += other.2;
            Ok(acc)
        })?;

    add_assign(y, &local_y);
    if let (Some(detected), Some(local)) = (detected, local_detected.as_deref()) {
        add_assign(detected, local);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variates::{scripted::ScriptedVariates, RngVariates};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn make_peptides(
        classes: &[Vec<usize>],
        counts: Vec<f64>,
        num_proteins: usize,
    ) -> MultiMappedPeptides {
        MultiMappedPeptides::from_one_based(classes, counts, num_proteins).unwrap()
    }

    #[test]
    fn single_candidate_is_deterministic() {
        let peptides = make_peptides(&[vec![2]], vec![7.], 3);
        let mut rng = RngVariates::seed_from_u64(1);
        for _ in 0..20 {
            let mut y = [0f64; 3];
            let summary =
                allocate_all(&peptides, &[0.1, 5., 0.3], &[1.; 3], false, &mut rng, &mut y, None)
                    .unwrap();
            assert_eq!(y, [0., 7., 0.]);
            assert_eq!(summary.allocated, 1);
        }
    }

    #[test]
    fn zero_weights_are_skipped() {
        let peptides = make_peptides(&[vec![1, 2], vec![2, 3]], vec![5., 3.], 3);
        let mut rng = RngVariates::seed_from_u64(2);
        let mut y = [0f64; 3];
        let summary =
            allocate_all(&peptides, &[0., 0., 1.], &[1.; 3], false, &mut rng, &mut y, None)
                .unwrap();
        assert_eq!(y, [0., 0., 3.]);
        assert_eq!(
            summary,
            AllocationSummary {
                allocated: 1,
                degenerate: 1,
                excluded: 0,
            }
        );
    }

    #[test]
    fn tiny_weights_are_not_degenerate() {
        let peptides = make_peptides(&[vec![1, 2]], vec![1000.], 2);
        let mut rng = RngVariates::seed_from_u64(3);
        let mut y = [0f64; 2];
        let summary =
            allocate_all(&peptides, &[1e-300, 3e-300], &[1e10, 1e10], false, &mut rng, &mut y, None)
                .unwrap();
        assert_eq!(summary.allocated, 1);
        assert_eq!(y.iter().sum::<f64>(), 1000.);
    }

    #[test]
    fn normalizer_shifts_weights() {
        // Protein 1 has twice the abundance but four times the peptides.
        let peptides = make_peptides(&[vec![1, 2]], vec![30.], 2);
        let mut rng = ScriptedVariates::new();
        let mut y = [0f64; 2];
        allocate_all(&peptides, &[1., 2.], &[1., 4.], false, &mut rng, &mut y, None).unwrap();
        assert_eq!(y, [20., 10.]);
    }

    #[test]
    fn gate_excludes_whole_peptide() {
        let peptides = make_peptides(&[vec![1, 2], vec![1, 2]], vec![4., 6.], 2)
            .with_pep(vec![0.5, 0.5])
            .unwrap();
        let mut rng = ScriptedVariates::with_bernoulli([true, false]);
        let mut y = [0f64; 2];
        let summary =
            allocate_all(&peptides, &[1., 1.], &[1., 1.], true, &mut rng, &mut y, None).unwrap();
        assert_eq!(summary.excluded, 1);
        assert_eq!(y.iter().sum::<f64>(), 6.);

        // Without gating the PEPs are ignored.
        let mut rng = ScriptedVariates::with_bernoulli([true, true]);
        let mut y = [0f64; 2];
        allocate_all(&peptides, &[1., 1.], &[1., 1.], false, &mut rng, &mut y, None).unwrap();
        assert_eq!(y.iter().sum::<f64>(), 10.);
        assert_eq!(rng.bernoulli_calls, 0);
    }

    #[test]
    fn detected_counts() {
        let peptides = make_peptides(&[vec![1, 2], vec![2, 3]], vec![4., 0.], 3);
        let mut rng = ScriptedVariates::new();
        let mut y = [0f64; 3];
        let mut detected = [0f64; 3];
        allocate_all(
            &peptides,
            &[1., 1., 1.],
            &[1.; 3],
            false,
            &mut rng,
            &mut y,
            Some(&mut detected),
        )
        .unwrap();
        assert_eq!(y, [2., 2., 0.]);
        assert_eq!(detected, [1., 1., 0.]);
    }

    #[test]
    fn parallel_is_reproducible() {
        let classes: Vec<Vec<usize>> = (0..500)
            .map(|j| vec![j % 7 + 1, (j * 3) % 7 + 1, 8])
            .collect();
        let counts: Vec<f64> = (0..500).map(|j| (j % 13) as f64).collect();
        let total: f64 = counts.iter().sum();
        let peptides = make_peptides(&classes, counts, 8);
        let pi = [1., 2., 3., 4., 0.5, 0.1, 2., 1.];

        let run = |seed| {
            let mut rng = RngVariates::seed_from_u64(seed);
            let mut y = [0f64; 8];
            let mut detected = [0f64; 8];
            par_allocate_all(
                &peptides,
                &pi,
                &[1.; 8],
                false,
                37,
                &mut rng,
                &mut y,
                Some(&mut detected),
            )
            .unwrap();
            (y, detected)
        };

        let (y1, d1) = run(9);
        let (y2, d2) = run(9);
        assert_eq!(y1, y2);
        assert_eq!(d1, d2);
        assert_eq!(y1.iter().sum::<f64>(), total);
    }

    proptest! {
        #[test]
        fn allocation_conserves_counts(
            counts in prop::collection::vec(0u32..50, 1..40),
            pi in prop::collection::vec(0.01f64..10., 5),
            seed in any::<u64>(),
        ) {
            let classes: Vec<Vec<usize>> = (0..counts.len())
                .map(|j| (0..(j % 5 + 1)).map(|k| (j + k) % 5 + 1).collect())
                .collect();
            let counts: Vec<f64> = counts.into_iter().map(f64::from).collect();
            let total: f64 = counts.iter().sum();
            let peptides = make_peptides(&classes, counts, 5);

            let mut rng = RngVariates::seed_from_u64(seed);
            let mut y = [0f64; 5];
            allocate_all(&peptides, &pi, &[1.; 5], false, &mut rng, &mut y, None).unwrap();
            prop_assert_eq!(y.iter().sum::<f64>(), total);
            prop_assert!(y.iter().all(|&v| v >= 0.));

            let mut y = [0f64; 5];
            par_allocate_all(&peptides, &pi, &[1.; 5], false, 4, &mut rng, &mut y, None).unwrap();
            prop_assert_eq!(y.iter().sum::<f64>(), total);
        }
    }
}
