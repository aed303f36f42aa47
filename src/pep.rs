//! Posterior error probability gating.
//!
//! Every iteration each peptide-spectrum match is flagged as a false positive
//! with probability equal to its PEP. Flagged matches sit out that iteration.

use crate::{
    model::UniquePeptides,
    variates::{Result, Variates},
};

/// Draw the gate for one match. Returns `true` if the match takes part in
/// this iteration.
#[inline]
pub fn passes<V: Variates + ?Sized>(rng: &mut V, pep: f64) -> Result<bool> {
    Ok(!rng.bernoulli(pep)?)
}

/// Add the counts of the unique peptides that pass their gate to `y`.
///
/// Returns the number of peptides that were excluded.
pub fn accumulate_unique<V: Variates + ?Sized>(
    unique: &UniquePeptides,
    rng: &mut V,
    y: &mut [f64],
    mut detected: Option<&mut [f64]>,
) -> Result<usize> {
    let mut excluded = 0;
    for (protein, count, pep) in unique.iter() {
        if !passes(rng, pep)? {
            excluded += 1;
            continue;
        }
        y[protein] += count;
        if let Some(detected) = detected.as_deref_mut() {
            if count > 0. {
                detected[protein] += 1.;
            }
        }
    }
    Ok(excluded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variates::{scripted::ScriptedVariates, RngVariates};
    use pretty_assertions::assert_eq;

    fn unique(pep: Vec<f64>) -> UniquePeptides {
        UniquePeptides::from_one_based(&[1, 2, 2], vec![4., 2., 0.], pep, 2).unwrap()
    }

    #[test]
    fn scripted_gate() {
        let unique = unique(vec![0.5, 0.5, 0.5]);
        let mut rng = ScriptedVariates::with_bernoulli([true, false, false]);
        let mut y = [0f64; 2];
        let mut detected = [0f64; 2];
        let excluded = accumulate_unique(&unique, &mut rng, &mut y, Some(&mut detected)).unwrap();
        assert_eq!(excluded, 1);
        assert_eq!(y, [0., 2.]);
        // The zero-count peptide passes but is not a detection.
        assert_eq!(detected, [0., 1.]);
        assert_eq!(rng.bernoulli_calls, 3);
    }

    #[test]
    fn certain_errors_are_always_excluded() {
        let unique = unique(vec![1., 1., 1.]);
        let mut rng = RngVariates::seed_from_u64(11);
        for _ in 0..50 {
            let mut y = [0f64; 2];
            let excluded = accumulate_unique(&unique, &mut rng, &mut y, None).unwrap();
            assert_eq!(excluded, 3);
            assert_eq!(y, [0., 0.]);
        }
    }

    #[test]
    fn certain_matches_are_always_kept() {
        let unique = unique(vec![0., 0., 0.]);
        let mut rng = RngVariates::seed_from_u64(12);
        for _ in 0..50 {
            let mut y = [0f64; 2];
            accumulate_unique(&unique, &mut rng, &mut y, None).unwrap();
            assert_eq!(y, [4., 2.]);
        }
    }

    #[test]
    fn gate_frequency() {
        let mut rng = RngVariates::seed_from_u64(5);
        let kept = (0..10_000)
            .filter(|_| passes(&mut rng, 0.3).unwrap())
            .count();
        let rate = kept as f64 / 10_000.;
        assert!((rate - 0.7).abs() < 0.03, "pass rate {rate}");
    }
}
