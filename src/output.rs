//! Writers for contact matrices and raw density histograms.

use crate::accumulator::ContactDensities;
use crate::errors::CmDataError;
use crate::histogram::DensityTensor;
use crate::summary::{ContactKind, ContactMatrix};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Insert `_<a>_<b>` (1-based) before the extension of `stem`, or append it
/// when there is no extension.
pub fn output_path(stem: &Path, mol_i: usize, mol_j: usize) -> PathBuf {
    let suffix = format!("_{}_{}", mol_i + 1, mol_j + 1);
    let base = stem
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match stem.extension() {
        Some(ext) => format!("{base}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{base}{suffix}"),
    };
    stem.with_file_name(file_name)
}

/// Write one matrix, one atom pair per line:
/// `mol_i atom_i mol_j atom_j distance probability`.
pub fn write_matrix<W: Write>(writer: &mut W, matrix: &ContactMatrix) -> std::io::Result<()> {
    for e in &matrix.entries {
        writeln!(
            writer,
            "{:4} {:4} {:4} {:4} {:9.6} {:9.6}",
            e.mol_i + 1,
            e.atom_i + 1,
            e.mol_j + 1,
            e.atom_j + 1,
            e.distance,
            e.probability
        )?;
    }
    Ok(())
}

/// Write every matrix to the file derived from the intra- or intermolecular
/// stem. Returns the written paths in order.
pub fn write_matrices(
    matrices: &[ContactMatrix],
    intra_stem: &Path,
    inter_stem: &Path,
) -> Result<Vec<PathBuf>, CmDataError> {
    let mut written = Vec::with_capacity(matrices.len());
    for matrix in matrices {
        let stem = match matrix.kind {
            ContactKind::Intra => intra_stem,
            ContactKind::Inter => inter_stem,
        };
        let path = output_path(stem, matrix.mol_i, matrix.mol_j);
        let mut writer = BufWriter::new(File::create(&path)?);
        write_matrix(&mut writer, matrix)?;
        writer.flush()?;
        debug!("Wrote {} atom pairs to {}", matrix.entries.len(), path.display());
        written.push(path);
    }
    info!("Wrote {} contact matrices", written.len());
    Ok(written)
}

/// Write the histograms of atom `atom` against every partner atom: one row per
/// bin with the bin center followed by one density per partner.
pub fn write_histogram_rows<W: Write>(
    writer: &mut W,
    centers: &[f64],
    tensor: &DensityTensor,
    block: usize,
    atom: usize,
) -> std::io::Result<()> {
    let (_, partners) = tensor.shape(block);
    for (k, center) in centers.iter().enumerate() {
        write!(writer, "{center:.6}")?;
        for b in 0..partners {
            write!(writer, " {:.6}", tensor.histogram(block, atom, b)[k])?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

fn write_histogram_file(
    path: &Path,
    centers: &[f64],
    tensor: &DensityTensor,
    block: usize,
    atom: usize,
) -> Result<(), CmDataError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_histogram_rows(&mut writer, centers, tensor, block, atom)?;
    writer.flush()?;
    Ok(())
}

/// Write all raw histograms into `dir`, one file per molecule-type pair and atom.
pub fn write_histograms(densities: &ContactDensities, dir: &Path) -> Result<usize, CmDataError> {
    let centers = densities.grid.centers();
    let tensors = &densities.tensors;
    let n_types = densities.types.len();
    let mut n_files = 0;
    for i in 0..n_types {
        for a in 0..densities.types[i].natom {
            let inter = dir.join(format!("inter_mol_{}_{}_aa_{}.dat", i + 1, i + 1, a + 1));
            write_histogram_file(&inter, centers, &tensors.same, i, a)?;
            let intra = dir.join(format!("intra_mol_{}_{}_aa_{}.dat", i + 1, i + 1, a + 1));
            write_histogram_file(&intra, centers, &tensors.intra, i, a)?;
            n_files += 2;
        }
        for j in (i + 1)..n_types {
            let Some(pair) = densities.cross_index.get(i, j) else {
                continue;
            };
            for a in 0..densities.types[i].natom {
                let cross = dir.join(format!("inter_mol_{}_{}_aa_{}.dat", i + 1, j + 1, a + 1));
                write_histogram_file(&cross, centers, &tensors.cross, pair, a)?;
                n_files += 1;
            }
        }
    }
    info!("Wrote {n_files} histogram files to {}", dir.display());
    Ok(n_files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::SummaryEntry;

    #[test]
    fn test_output_path() {
        assert_eq!(
            output_path(Path::new("intermat.ndx"), 0, 2),
            PathBuf::from("intermat_1_3.ndx")
        );
        assert_eq!(
            output_path(Path::new("out/run.1/intramat.ndx"), 1, 1),
            PathBuf::from("out/run.1/intramat_2_2.ndx")
        );
        assert_eq!(
            output_path(Path::new("contacts"), 0, 0),
            PathBuf::from("contacts_1_1")
        );
        // Only the last extension moves
        assert_eq!(
            output_path(Path::new("mat.v2.ndx"), 0, 1),
            PathBuf::from("mat.v2_1_2.ndx")
        );
    }

    #[test]
    fn test_matrix_format() {
        let matrix = ContactMatrix {
            kind: ContactKind::Inter,
            mol_i: 0,
            mol_j: 1,
            entries: vec![SummaryEntry {
                mol_i: 0,
                atom_i: 2,
                mol_j: 1,
                atom_j: 10,
                distance: 0.312345678,
                probability: 1.0,
            }],
        };
        let mut buf = Vec::new();
        write_matrix(&mut buf, &matrix).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "   1    3    2   11  0.312346  1.000000\n"
        );
    }

    #[test]
    fn test_histogram_rows() {
        let mut tensor = DensityTensor::zeros(&[(1, 2)], 2);
        tensor.histogram_mut(0, 0, 1).copy_from_slice(&[0.5, 2.0]);
        let mut buf = Vec::new();
        write_histogram_rows(&mut buf, &[0.1, 0.3], &tensor, 0, 0).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "0.100000 0.000000 0.500000\n0.300000 0.000000 2.000000\n"
        );
    }
}
