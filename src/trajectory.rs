//! Topology and frame providers consumed by the accumulator.
//!
//! The analysis only needs a partition of the atoms into molecule instances,
//! atom names, and per-frame coordinates with an optional periodic box.
//! [`PdbTrajectory`] supplies all three from a (multi-model) PDB or mmCIF file.

use crate::errors::CmDataError;
use crate::pbc::SimBox;
use nalgebra::Vector3;
use pdbtbx::*;
use std::ops::Range;
use tracing::{debug, warn};

/// Nanometers per Ångström
const ANGSTROM_TO_NM: f64 = 0.1;

/// Supplies molecule instances and atom names.
pub trait Topology {
    /// Atom ranges of the molecule instances, in topology order.
    fn partition(&self) -> &[Range<usize>];

    /// Name of the atom with global index `index`.
    fn atom_name(&self, index: usize) -> &str;

    fn n_atoms(&self) -> usize;
}

/// A single trajectory snapshot.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Frame number in the trajectory, used by the stride policy
    pub index: usize,
    /// Atom positions, indexed like the topology
    pub positions: Vec<Vector3<f64>>,
    /// Periodic box, `None` for non-periodic systems
    pub simbox: Option<SimBox>,
}

/// Periodic box of a crystallographic unit cell in nm. The 1 Å cubic
/// placeholder cell written for non-crystal structures means "no box".
fn cell_box(cell: &UnitCell) -> Result<Option<SimBox>, CmDataError> {
    let lengths = [cell.a(), cell.b(), cell.c()];
    if lengths.iter().all(|&l| (l - 1.0).abs() < 1e-6) {
        return Ok(None);
    }
    SimBox::from_lengths_angles(
        lengths.map(|l| l * ANGSTROM_TO_NM),
        [cell.alpha(), cell.beta(), cell.gamma()],
    )
    .map(Some)
}

/// In-memory topology built from atom names and molecule ranges.
#[derive(Clone, Debug, Default)]
pub struct SimpleTopology {
    names: Vec<String>,
    molecules: Vec<Range<usize>>,
}

impl SimpleTopology {
    pub fn new(names: Vec<String>, molecules: Vec<Range<usize>>) -> Self {
        Self { names, molecules }
    }

    /// Append a molecule made of the given atom names.
    pub fn push_molecule<S: AsRef<str>>(&mut self, atom_names: &[S]) {
        let start = self.names.len();
        self.names
            .extend(atom_names.iter().map(|n| n.as_ref().to_string()));
        self.molecules.push(start..self.names.len());
    }
}

impl Topology for SimpleTopology {
    fn partition(&self) -> &[Range<usize>] {
        &self.molecules
    }

    fn atom_name(&self, index: usize) -> &str {
        &self.names[index]
    }

    fn n_atoms(&self) -> usize {
        self.names.len()
    }
}

/// Trajectory read from a PDB or mmCIF file: each model is a frame, each chain
/// of the first model a molecule instance.
pub struct PdbTrajectory {
    topology: SimpleTopology,
    frames: Vec<Frame>,
}

impl PdbTrajectory {
    /// Read all models of `input_file`.
    pub fn open(input_file: &str) -> Result<Self, CmDataError> {
        let (pdb, warnings) = pdbtbx::ReadOptions::default()
            .set_only_atomic_coords(false)
            .set_level(pdbtbx::StrictnessLevel::Loose)
            .read(input_file)
            .map_err(|errors| {
                CmDataError::Topology(
                    errors
                        .iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("; "),
                )
            })?;
        for e in &warnings {
            warn!("{e}");
        }
        Self::from_pdb(&pdb)
    }

    /// Build the topology from the first model and one frame per model.
    pub fn from_pdb(pdb: &PDB) -> Result<Self, CmDataError> {
        let first = pdb
            .models()
            .next()
            .ok_or_else(|| CmDataError::Topology("structure has no models".to_string()))?;
        let mut topology = SimpleTopology::default();
        for chain in first.chains() {
            let names: Vec<&str> = chain.atoms().map(|a| a.name()).collect();
            topology.push_molecule(&names);
        }
        debug!(
            "Read {} molecule(s) with {} atoms from the first model",
            topology.partition().len(),
            topology.n_atoms()
        );

        let simbox = match &pdb.unit_cell {
            Some(cell) => cell_box(cell)?,
            None => None,
        };
        match &simbox {
            Some(b) => debug!("Periodic box {:?}", b.vectors().diagonal().as_slice()),
            None => debug!("No periodic box, distances are not wrapped"),
        }

        let frames = pdb
            .models()
            .enumerate()
            .map(|(index, model)| {
                let positions: Vec<Vector3<f64>> = model
                    .chains()
                    .flat_map(|c| c.atoms())
                    .map(|a| {
                        let (x, y, z) = a.pos();
                        Vector3::new(x, y, z) * ANGSTROM_TO_NM
                    })
                    .collect();
                if positions.len() != topology.n_atoms() {
                    return Err(CmDataError::FrameMismatch {
                        expected: topology.n_atoms(),
                        found: positions.len(),
                    });
                }
                Ok(Frame {
                    index,
                    positions,
                    simbox,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { topology, frames })
    }

    pub fn topology(&self) -> &SimpleTopology {
        &self.topology
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    /// Split into the topology and a frame source.
    pub fn into_parts(
        self,
    ) -> (
        SimpleTopology,
        impl Iterator<Item = Result<Frame, CmDataError>> + Send,
    ) {
        (self.topology, self.frames.into_iter().map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_file() -> String {
        let root = env!("CARGO_MANIFEST_DIR");
        format!("{}/{}", root, "test-data/dimer.pdb")
    }

    #[test]
    fn test_simple_topology() {
        let mut topology = SimpleTopology::default();
        topology.push_molecule(&["C1", "H1", "O1"]);
        topology.push_molecule(&["N"]);
        assert_eq!(topology.partition(), &[0..3, 3..4]);
        assert_eq!(topology.atom_name(1), "H1");
        assert_eq!(topology.n_atoms(), 4);
    }

    #[test]
    fn test_read_multi_model_pdb() {
        let trajectory = match PdbTrajectory::open(&test_file()) {
            Ok(t) => t,
            Err(e) => panic!("Error reading trajectory: {e}"),
        };
        assert_eq!(trajectory.n_frames(), 2);

        let topology = trajectory.topology();
        assert_eq!(topology.partition(), &[0..2, 2..4]);
        assert_eq!(topology.atom_name(0), "C1");

        let (_, frames) = trajectory.into_parts();
        let frames: Vec<Frame> = frames.map(|f| f.unwrap()).collect();
        assert_eq!(frames[1].index, 1);
        // Å are converted to nm
        assert!((frames[0].positions[1].x - 0.15).abs() < 1e-6);
        let simbox = frames[0].simbox.expect("CRYST1 record should give a box");
        assert!((simbox.vectors()[(0, 0)] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_placeholder_cell_is_not_a_box() {
        let root = env!("CARGO_MANIFEST_DIR");
        let trajectory =
            PdbTrajectory::open(&format!("{}/{}", root, "test-data/no_box.pdb")).unwrap();
        assert_eq!(trajectory.n_frames(), 1);
        let (_, frames) = trajectory.into_parts();
        for frame in frames {
            assert!(frame.unwrap().simbox.is_none());
        }
    }
}
