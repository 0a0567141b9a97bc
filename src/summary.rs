//! Mean contact distance and contact probability per atom pair.

use crate::accumulator::ContactDensities;
use crate::errors::CmDataError;
use crate::histogram::DensityTensor;
use polars::prelude::*;
use std::fmt;

/// Density-weighted mean distance over bins with positive density.
/// An empty histogram has a mean of zero.
pub fn calc_mean(hist: &[f64], dx: f64) -> f64 {
    let mut dm = 0.0;
    let mut norm = 0.0;
    for (i, &v) in hist.iter().enumerate() {
        if v > 0.0 {
            let d = dx * i as f64 + 0.5 * dx;
            dm += v * d;
            norm += v;
        }
    }
    if norm == 0.0 {
        norm = 1.0;
    }
    dm / norm
}

/// Probability mass below the cutoff, clamped to 1.
pub fn calc_prob(hist: &[f64], dx: f64) -> f64 {
    let prob: f64 = hist.iter().filter(|&&v| v > 0.0).map(|v| v * dx).sum();
    prob.min(1.0)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContactKind {
    /// Atoms of the same molecule instance
    Intra,
    /// Atoms of different molecule instances
    Inter,
}

impl fmt::Display for ContactKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ContactKind::Intra => write!(f, "intra"),
            ContactKind::Inter => write!(f, "inter"),
        }
    }
}

/// One line of a contact matrix. Indices are 0-based.
#[derive(Clone, Debug, PartialEq)]
pub struct SummaryEntry {
    pub mol_i: usize,
    pub atom_i: usize,
    pub mol_j: usize,
    pub atom_j: usize,
    pub distance: f64,
    pub probability: f64,
}

/// All atom pairs of one pair of molecule types.
#[derive(Clone, Debug, PartialEq)]
pub struct ContactMatrix {
    pub kind: ContactKind,
    pub mol_i: usize,
    pub mol_j: usize,
    pub entries: Vec<SummaryEntry>,
}

fn summarize_block(
    tensor: &DensityTensor,
    block: usize,
    kind: ContactKind,
    (mol_i, mol_j): (usize, usize),
    dx: f64,
) -> ContactMatrix {
    let (rows, cols) = tensor.shape(block);
    let entries = (0..rows)
        .flat_map(|a| (0..cols).map(move |b| (a, b)))
        .map(|(a, b)| {
            let hist = tensor.histogram(block, a, b);
            SummaryEntry {
                mol_i,
                atom_i: a,
                mol_j,
                atom_j: b,
                distance: calc_mean(hist, dx),
                probability: calc_prob(hist, dx),
            }
        })
        .collect();
    ContactMatrix {
        kind,
        mol_i,
        mol_j,
        entries,
    }
}

/// Contact matrices for every pair of molecule types: for each type the
/// same-type intermolecular and the intramolecular matrix, followed by the
/// cross-type matrices with every later type.
pub fn contact_matrices(densities: &ContactDensities) -> Vec<ContactMatrix> {
    let dx = densities.grid.dx();
    let tensors = &densities.tensors;
    let n_types = densities.types.len();
    let mut matrices = Vec::with_capacity(n_types * 2 + densities.cross_index.len());
    for i in 0..n_types {
        matrices.push(summarize_block(
            &tensors.same,
            i,
            ContactKind::Inter,
            (i, i),
            dx,
        ));
        matrices.push(summarize_block(
            &tensors.intra,
            i,
            ContactKind::Intra,
            (i, i),
            dx,
        ));
        for j in (i + 1)..n_types {
            if let Some(pair) = densities.cross_index.get(i, j) {
                matrices.push(summarize_block(
                    &tensors.cross,
                    pair,
                    ContactKind::Inter,
                    (i, j),
                    dx,
                ));
            }
        }
    }
    matrices
}

/// Flatten contact matrices into a `DataFrame` with 1-based indices.
pub fn matrices_to_df(matrices: &[ContactMatrix]) -> Result<DataFrame, CmDataError> {
    let rows = || {
        matrices
            .iter()
            .flat_map(|m| m.entries.iter().map(move |e| (m.kind, e)))
    };
    let index = |v: usize| u32::try_from(v + 1).unwrap_or(u32::MAX);
    let df = df!(
        "kind" => rows().map(|(k, _)| k.to_string()).collect::<Vec<String>>(),
        "mol_i" => rows().map(|(_, e)| index(e.mol_i)).collect::<Vec<u32>>(),
        "atom_i" => rows().map(|(_, e)| index(e.atom_i)).collect::<Vec<u32>>(),
        "mol_j" => rows().map(|(_, e)| index(e.mol_j)).collect::<Vec<u32>>(),
        "atom_j" => rows().map(|(_, e)| index(e.atom_j)).collect::<Vec<u32>>(),
        "distance" => rows().map(|(_, e)| e.distance).collect::<Vec<f64>>(),
        "probability" => rows().map(|(_, e)| e.probability).collect::<Vec<f64>>(),
    )?;
    Ok(df)
}
