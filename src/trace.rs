//! The retained draws of a chain.

use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, FixedSizeListBuilder, Float64Builder, RecordBatch, UInt64Builder};
use arrow::datatypes::{Field, Schema};

use crate::chain::ChainState;

/// A dense row-major matrix, one row per retained draw and one column per
/// protein.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    nrows: usize,
    ncols: usize,
    data: Box<[f64]>,
}

impl Matrix {
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            data: vec![0f64; nrows * ncols].into(),
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.ncols..(row + 1) * self.ncols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.ncols..(row + 1) * self.ncols]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.data.chunks_exact(self.ncols.max(1)).take(self.nrows)
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.ncols + col]
    }

    /// The whole matrix in row-major order.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// The mean of each column.
    pub fn column_means(&self) -> Vec<f64> {
        let mut means = vec![0f64; self.ncols];
        if self.nrows == 0 {
            return means;
        }
        for row in self.rows() {
            means.iter_mut().zip(row).for_each(|(m, &v)| *m += v);
        }
        means.iter_mut().for_each(|m| *m /= self.nrows as f64);
        means
    }

    fn to_arrow(&self) -> ArrayRef {
        let values = Float64Builder::with_capacity(self.data.len());
        let mut builder =
            FixedSizeListBuilder::with_capacity(values, self.ncols as i32, self.nrows);
        for row in self.rows() {
            builder.values().append_slice(row);
            builder.append(true);
        }
        Arc::new(builder.finish())
    }
}

/// The output of a sampler run.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    /// Abundance draws (`PI`).
    pub pi: Matrix,
    /// Allocated counts (`Y`).
    pub y: Matrix,
    /// Number of peptides that contributed to each protein, if requested.
    pub detected: Option<Matrix>,
    /// The chain iteration stored in each row. `None` marks a row that no
    /// iteration was written to.
    pub iterations: Box<[Option<u64>]>,
}

impl Trace {
    pub fn num_draws(&self) -> usize {
        self.pi.nrows()
    }

    pub fn num_proteins(&self) -> usize {
        self.pi.ncols()
    }

    /// Export the trace as a record batch with one row per retained draw.
    ///
    /// The columns `PI`, `Y` (and `detected`, if stored) are fixed size
    /// lists with one entry per protein; `iteration` is the chain iteration
    /// of the row.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut iteration = UInt64Builder::with_capacity(self.iterations.len());
        for &it in self.iterations.iter() {
            iteration.append_option(it);
        }

        let mut columns: Vec<(&str, ArrayRef, bool)> = vec![
            ("iteration", Arc::new(iteration.finish()) as ArrayRef, true),
            ("PI", self.pi.to_arrow(), false),
            ("Y", self.y.to_arrow(), false),
        ];
        if let Some(detected) = &self.detected {
            columns.push(("detected", detected.to_arrow(), false));
        }

        let fields: Vec<Field> = columns
            .iter()
            .map(|(name, array, nullable)| {
                Field::new(*name, array.data_type().clone(), *nullable)
            })
            .collect();
        let arrays = columns.into_iter().map(|(_, array, _)| array).collect();
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
            .context("Could not assemble record batch from trace")
    }
}

/// Collects retained chain states into a [`Trace`].
#[derive(Debug)]
pub struct TraceBuilder {
    pi: Matrix,
    y: Matrix,
    detected: Option<Matrix>,
    iterations: Box<[Option<u64>]>,
}

impl TraceBuilder {
    pub fn new(num_draws: usize, num_proteins: usize, store_detected: bool) -> Self {
        Self {
            pi: Matrix::zeros(num_draws, num_proteins),
            y: Matrix::zeros(num_draws, num_proteins),
            detected: store_detected.then(|| Matrix::zeros(num_draws, num_proteins)),
            iterations: vec![None; num_draws].into(),
        }
    }

    /// Store `state` in row `row`. Rows past the end are ignored.
    pub fn set_row(&mut self, row: usize, iteration: u64, state: &ChainState) -> bool {
        if row >= self.iterations.len() {
            return false;
        }
        self.pi.row_mut(row).copy_from_slice(&state.pi);
        self.y.row_mut(row).copy_from_slice(&state.y);
        if let (Some(matrix), Some(detected)) =
            (self.detected.as_mut(), state.detected.as_deref())
        {
            matrix.row_mut(row).copy_from_slice(detected);
        }
        self.iterations[row] = Some(iteration);
        true
    }

    pub fn finalize(self) -> Trace {
        Trace {
            pi: self.pi,
            y: self.y,
            detected: self.detected,
            iterations: self.iterations,
        }
    }
}
