//! Drawing protein abundances from their Dirichlet posterior.

use crate::{
    math::normalize_in_place,
    variates::{Result, Variates},
};

/// How the Gamma draws of the abundance update are stored.
///
/// A Dirichlet draw is a vector of independent `Gamma(alpha_i, 1)` draws
/// divided by their sum. The unique-only sampler normalizes by default and
/// the allocating samplers keep the raw Gamma draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// Keep the raw Gamma draws. Allocation probabilities only depend on
    /// ratios of abundances, so the chain itself is unaffected.
    None,
    /// Divide by the sum, so that the abundances lie on the simplex.
    Simplex,
}

/// Draw `pi[i] ~ Gamma(y[i] + prior[i], 1)` for every protein.
pub fn update_abundance<V: Variates + ?Sized>(
    y: &[f64],
    prior: &[f64],
    normalization: Normalization,
    rng: &mut V,
) -> Result<Box<[f64]>> {
    assert!(y.len() == prior.len());
    let mut pi = y
        .iter()
        .zip(prior)
        .map(|(&y, &delta)| rng.gamma(y + delta))
        .collect::<Result<Box<[f64]>>>()?;

    if normalization == Normalization::Simplex {
        normalize_in_place(&mut pi);
    }
    Ok(pi)
}
