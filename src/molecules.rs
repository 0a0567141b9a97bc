//! Molecule type classification from the instance partition of a topology.
//!
//! Consecutive molecule instances with the same number of atoms are assumed to
//! be copies of the same molecule. This is a topology-order heuristic: two
//! instances of equal size separated by an instance of a different size start
//! two different types.

use crate::errors::CmDataError;
use std::ops::Range;
use tracing::debug;

/// An equivalence class of molecule instances.
#[derive(Clone, Debug, PartialEq)]
pub struct MoleculeType {
    /// Dense id in discovery order
    pub id: usize,
    /// Number of atoms, hydrogens included
    pub natom: usize,
    /// Number of instances of this type
    pub count: usize,
}

impl MoleculeType {
    pub fn inv_count(&self) -> f64 {
        1.0 / self.count as f64
    }
}

/// One physical copy of a molecule.
#[derive(Clone, Debug, PartialEq)]
pub struct MoleculeInstance {
    /// Atom indices of this instance in the global atom array
    pub atoms: Range<usize>,
    /// Id of the molecule type
    pub mol_type: usize,
    /// Inverse multiplicity of the molecule type
    pub inv_count: f64,
}

impl MoleculeInstance {
    pub fn natom(&self) -> usize {
        self.atoms.len()
    }
}

/// Dense index over unordered pairs of distinct molecule types.
///
/// Only pairs `(i, j)` with `i < j` are stored; lookups with `i > j` are
/// answered by symmetry.
#[derive(Clone, Debug, PartialEq)]
pub struct TypePairIndex {
    ntypes: usize,
}

impl TypePairIndex {
    pub fn new(ntypes: usize) -> Self {
        Self { ntypes }
    }

    /// Number of cross-type pairs.
    pub fn len(&self) -> usize {
        self.ntypes * self.ntypes.saturating_sub(1) / 2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the unordered pair `{i, j}`, `None` when `i == j` or out of range.
    pub fn get(&self, i: usize, j: usize) -> Option<usize> {
        if i == j || i >= self.ntypes || j >= self.ntypes {
            return None;
        }
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        // Pairs are numbered row by row: (0,1), (0,2), ..., (1,2), ...
        Some(lo * (2 * self.ntypes - lo - 1) / 2 + (hi - lo - 1))
    }

    /// All stored pairs `(i, j, index)` with `i < j`, in index order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        (0..self.ntypes).flat_map(move |i| {
            ((i + 1)..self.ntypes).map(move |j| (i, j, self.get(i, j).unwrap_or_default()))
        })
    }
}

/// Molecule types and instances of a system, immutable after classification.
#[derive(Clone, Debug)]
pub struct MoleculeTopology {
    pub types: Vec<MoleculeType>,
    pub instances: Vec<MoleculeInstance>,
    pub cross_index: TypePairIndex,
}

impl MoleculeTopology {
    /// Classify molecule instances given as contiguous atom ranges in
    /// topology order.
    pub fn classify(partition: &[Range<usize>]) -> Result<Self, CmDataError> {
        if partition.is_empty() {
            return Err(CmDataError::EmptyPartition);
        }
        validate_partition(partition)?;

        let mut types: Vec<MoleculeType> = Vec::new();
        let mut type_ids = Vec::with_capacity(partition.len());
        for range in partition {
            match types.last_mut() {
                Some(current) if current.natom == range.len() => current.count += 1,
                _ => types.push(MoleculeType {
                    id: types.len(),
                    natom: range.len(),
                    count: 1,
                }),
            }
            type_ids.push(types.len() - 1);
        }

        let instances = partition
            .iter()
            .zip(type_ids)
            .map(|(range, mol_type)| MoleculeInstance {
                atoms: range.clone(),
                mol_type,
                inv_count: types[mol_type].inv_count(),
            })
            .collect();

        for t in &types {
            debug!(
                "Molecule type {} has {} atoms and {} instance(s)",
                t.id + 1,
                t.natom,
                t.count
            );
        }

        let cross_index = TypePairIndex::new(types.len());
        Ok(Self {
            types,
            instances,
            cross_index,
        })
    }

    pub fn n_types(&self) -> usize {
        self.types.len()
    }

    pub fn n_instances(&self) -> usize {
        self.instances.len()
    }

    /// Total number of atoms covered by the partition.
    pub fn n_atoms(&self) -> usize {
        self.instances.last().map_or(0, |m| m.atoms.end)
    }

    /// Atom count of the molecule type `mol_type`.
    pub fn natom(&self, mol_type: usize) -> usize {
        self.types[mol_type].natom
    }
}

/// Ranges must start at zero, be non-empty and follow each other without gaps.
fn validate_partition(partition: &[Range<usize>]) -> Result<(), CmDataError> {
    let mut expected_start = 0;
    for (i, range) in partition.iter().enumerate() {
        if range.start != expected_start {
            return Err(CmDataError::InvalidPartition(format!(
                "molecule {} starts at atom {} instead of {}",
                i + 1,
                range.start,
                expected_start
            )));
        }
        if range.end <= range.start {
            return Err(CmDataError::InvalidPartition(format!(
                "molecule {} has no atoms",
                i + 1
            )));
        }
        expected_start = range.end;
    }
    Ok(())
}

/// Build contiguous ranges from a list of instance sizes.
pub fn partition_from_sizes(sizes: &[usize]) -> Vec<Range<usize>> {
    let mut start = 0;
    sizes
        .iter()
        .map(|&n| {
            let range = start..start + n;
            start += n;
            range
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_runs() {
        // Two copies of a 3-atom molecule, one 5-atom molecule, three 2-atom molecules
        let topology = MoleculeTopology::classify(&partition_from_sizes(&[3, 3, 5, 2, 2, 2]))
            .unwrap();
        assert_eq!(topology.n_types(), 3);
        assert_eq!(
            topology.types.iter().map(|t| t.natom).collect::<Vec<_>>(),
            vec![3, 5, 2]
        );
        assert_eq!(
            topology.types.iter().map(|t| t.count).collect::<Vec<_>>(),
            vec![2, 1, 3]
        );
        assert_eq!(
            topology
                .instances
                .iter()
                .map(|m| m.mol_type)
                .collect::<Vec<_>>(),
            vec![0, 0, 1, 2, 2, 2]
        );
        assert!((topology.instances[4].inv_count - 1.0 / 3.0).abs() < 1e-12);
        assert!((topology.instances[2].inv_count - 1.0).abs() < 1e-12);
        assert_eq!(topology.n_atoms(), 17);
    }

    #[test]
    fn test_same_size_not_adjacent() {
        // Equal atom counts separated by another size are different types
        let topology =
            MoleculeTopology::classify(&partition_from_sizes(&[4, 6, 4])).unwrap();
        assert_eq!(topology.n_types(), 3);
        assert_eq!(topology.types[2].natom, 4);
        assert_eq!(topology.types[2].count, 1);
    }

    #[test]
    fn test_empty_partition() {
        let err = MoleculeTopology::classify(&[]).unwrap_err();
        assert!(matches!(err, CmDataError::EmptyPartition));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_malformed_partitions() {
        assert!(matches!(
            MoleculeTopology::classify(&[0..3, 4..6]),
            Err(CmDataError::InvalidPartition(_))
        ));
        assert!(matches!(
            MoleculeTopology::classify(&[1..3]),
            Err(CmDataError::InvalidPartition(_))
        ));
        assert!(matches!(
            MoleculeTopology::classify(&[0..3, 3..3]),
            Err(CmDataError::InvalidPartition(_))
        ));
    }

    #[test]
    fn test_type_pair_index() {
        let index = TypePairIndex::new(4);
        assert_eq!(index.len(), 6);
        let collected: Vec<usize> = index.pairs().map(|(_, _, k)| k).collect();
        assert_eq!(collected, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(index.get(0, 1), Some(0));
        assert_eq!(index.get(2, 3), Some(5));
        assert_eq!(index.get(3, 1), index.get(1, 3));
        assert_eq!(index.get(2, 2), None);
        assert_eq!(index.get(0, 4), None);

        assert!(TypePairIndex::new(1).is_empty());
    }
}
