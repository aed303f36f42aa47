//! Validated input data for the protein abundance model.
//!
//! Protein indices arrive 1-based (as they are written in peptide to protein
//! mapping tables) and are stored 0-based. All checks happen here, before a
//! chain is started, so the sampler itself never has to bounds-check.

use itertools::Itertools;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("The model needs at least one protein")]
    NoProteins,
    #[error("Length mismatch for {name}: expected {expected}, got {actual}")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Peptide {peptide} maps to protein index {index}, but indices must be in 1..={num_proteins}")]
    IndexOutOfRange {
        peptide: usize,
        index: usize,
        num_proteins: usize,
    },
    #[error("Peptide {peptide} has an empty equivalence class")]
    EmptyClass { peptide: usize },
    #[error("Invalid value {value} in {name} at position {position}: {reason}")]
    InvalidValue {
        name: &'static str,
        position: usize,
        value: f64,
        reason: &'static str,
    },
    #[error("Peptides were given no posterior error probabilities")]
    MissingPep,
}

pub type Result<T> = std::result::Result<T, InputError>;

pub(crate) fn check_len(name: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(InputError::LengthMismatch {
            name,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_values(
    name: &'static str,
    values: &[f64],
    reason: &'static str,
    valid: impl Fn(f64) -> bool,
) -> Result<()> {
    match values.iter().find_position(|&&v| !valid(v)) {
        Some((position, &value)) => Err(InputError::InvalidValue {
            name,
            position,
            value,
            reason,
        }),
        None => Ok(()),
    }
}

fn check_counts(name: &'static str, values: &[f64]) -> Result<()> {
    check_values(name, values, "counts must be finite and non-negative", |v| {
        v.is_finite() && v >= 0.
    })
}

fn check_probabilities(name: &'static str, values: &[f64]) -> Result<()> {
    check_values(name, values, "probabilities must be in [0, 1]", |v| {
        (0f64..=1f64).contains(&v)
    })
}

fn to_zero_based(peptide: usize, index: usize, num_proteins: usize) -> Result<usize> {
    if index == 0 || index > num_proteins {
        return Err(InputError::IndexOutOfRange {
            peptide,
            index,
            num_proteins,
        });
    }
    Ok(index - 1)
}

/// Dirichlet concentration parameters, one per protein.
#[derive(Debug, Clone, PartialEq)]
pub struct DirichletPrior {
    delta: Box<[f64]>,
}

impl DirichletPrior {
    pub fn new(delta: Vec<f64>) -> Result<Self> {
        if delta.is_empty() {
            return Err(InputError::NoProteins);
        }
        check_values("delta_prior", &delta, "must be finite and positive", |v| {
            v.is_finite() && v > 0.
        })?;
        Ok(Self {
            delta: delta.into(),
        })
    }

    /// A flat prior with every concentration set to `value`.
    pub fn flat(num_proteins: usize, value: f64) -> Result<Self> {
        Self::new(vec![value; num_proteins])
    }

    pub fn num_proteins(&self) -> usize {
        self.delta.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.delta
    }
}

/// Number of peptides per protein, used to down-weight proteins with many
/// peptides during allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PeptidesPerProtein {
    counts: Box<[f64]>,
}

impl PeptidesPerProtein {
    pub fn new(counts: Vec<f64>, num_proteins: usize) -> Result<Self> {
        check_len("N_peptides_per_protein", num_proteins, counts.len())?;
        check_values(
            "N_peptides_per_protein",
            &counts,
            "must be finite and positive",
            |v| v.is_finite() && v > 0.,
        )?;
        Ok(Self {
            counts: counts.into(),
        })
    }

    /// Weight every protein equally.
    pub fn uniform(num_proteins: usize) -> Self {
        Self {
            counts: vec![1f64; num_proteins].into(),
        }
    }

    pub fn num_proteins(&self) -> usize {
        self.counts.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.counts
    }
}

/// Spectral counts of unique peptides, summed per protein.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueCounts {
    counts: Box<[f64]>,
}

impl UniqueCounts {
    pub fn new(counts: Vec<f64>, num_proteins: usize) -> Result<Self> {
        check_len("Y_unique", num_proteins, counts.len())?;
        check_counts("Y_unique", &counts)?;
        Ok(Self {
            counts: counts.into(),
        })
    }

    pub fn num_proteins(&self) -> usize {
        self.counts.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.counts
    }

    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }
}

/// Unique peptides listed one by one, each with its own error probability.
#[derive(Debug, Clone, PartialEq)]
pub struct UniquePeptides {
    num_proteins: usize,
    proteins: Box<[usize]>,
    counts: Box<[f64]>,
    pep: Box<[f64]>,
}

impl UniquePeptides {
    /// `proteins` holds the 1-based protein index of each peptide.
    pub fn from_one_based(
        proteins: &[usize],
        counts: Vec<f64>,
        pep: Vec<f64>,
        num_proteins: usize,
    ) -> Result<Self> {
        check_len("PSM_unique", proteins.len(), counts.len())?;
        check_len("PEP_unique", proteins.len(), pep.len())?;
        check_counts("PSM_unique", &counts)?;
        check_probabilities("PEP_unique", &pep)?;
        let proteins = proteins
            .iter()
            .enumerate()
            .map(|(peptide, &index)| to_zero_based(peptide, index, num_proteins))
            .collect::<Result<Box<[_]>>>()?;
        debug!(peptides = proteins.len(), "Validated unique peptides");
        Ok(Self {
            num_proteins,
            proteins,
            counts: counts.into(),
            pep: pep.into(),
        })
    }

    pub fn num_proteins(&self) -> usize {
        self.num_proteins
    }

    pub fn len(&self) -> usize {
        self.proteins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proteins.is_empty()
    }

    /// Iterate over `(protein, count, pep)` with 0-based protein indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64, f64)> + '_ {
        itertools::izip!(
            self.proteins.iter().copied(),
            self.counts.iter().copied(),
            self.pep.iter().copied()
        )
    }
}

/// A borrowed view of one ambiguous peptide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeptideClass<'a> {
    /// Candidate proteins, 0-based.
    pub proteins: &'a [usize],
    /// Total observed spectral count.
    pub count: f64,
    pub pep: Option<f64>,
}

/// Peptides that map to more than one protein, with their equivalence
/// classes stored back to back.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiMappedPeptides {
    num_proteins: usize,
    offsets: Box<[usize]>,
    proteins: Box<[usize]>,
    counts: Box<[f64]>,
    pep: Option<Box<[f64]>>,
}

impl MultiMappedPeptides {
    /// `classes[j]` lists the 1-based candidate proteins of peptide `j`,
    /// and `counts[j]` its total spectral count.
    pub fn from_one_based(
        classes: &[Vec<usize>],
        counts: Vec<f64>,
        num_proteins: usize,
    ) -> Result<Self> {
        check_len("PSM_multi_map", classes.len(), counts.len())?;
        check_counts("PSM_multi_map", &counts)?;

        let mut offsets = Vec::with_capacity(classes.len() + 1);
        let mut proteins = Vec::with_capacity(classes.iter().map(Vec::len).sum());
        offsets.push(0);
        for (peptide, class) in classes.iter().enumerate() {
            if class.is_empty() {
                return Err(InputError::EmptyClass { peptide });
            }
            for &index in class {
                proteins.push(to_zero_based(peptide, index, num_proteins)?);
            }
            offsets.push(proteins.len());
        }
        debug!(
            peptides = classes.len(),
            entries = proteins.len(),
            "Validated equivalence classes"
        );

        Ok(Self {
            num_proteins,
            offsets: offsets.into(),
            proteins: proteins.into(),
            counts: counts.into(),
            pep: None,
        })
    }

    /// Attach a posterior error probability to every peptide.
    pub fn with_pep(mut self, pep: Vec<f64>) -> Result<Self> {
        check_len("PEP", self.len(), pep.len())?;
        check_probabilities("PEP", &pep)?;
        self.pep = Some(pep.into());
        Ok(self)
    }

    pub fn num_proteins(&self) -> usize {
        self.num_proteins
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn has_pep(&self) -> bool {
        self.pep.is_some()
    }

    pub fn total_count(&self) -> f64 {
        self.counts.iter().sum()
    }

    pub fn get(&self, peptide: usize) -> PeptideClass<'_> {
        let start = self.offsets[peptide];
        let end = self.offsets[peptide + 1];
        PeptideClass {
            proteins: &self.proteins[start..end],
            count: self.counts[peptide],
            pep: self.pep.as_ref().map(|pep| pep[peptide]),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = PeptideClass<'_>> + '_ {
        (0..self.len()).map(|peptide| self.get(peptide))
    }
}
