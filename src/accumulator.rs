//! Per-frame accumulation of minimum contact distances into density histograms.
//!
//! For every molecule instance `I` the accumulator scans all instances `J`
//! whose center is within `mol_cutoff`, keeps the shortest heavy-atom distance
//! per atom pair found in the frame, and feeds it to the kernel density
//! estimator. Three histogram collections are filled:
//! - same type, different instances (indexed by molecule type)
//! - different types (indexed by [`TypePairIndex`](crate::molecules::TypePairIndex))
//! - same instance (indexed by molecule type)

use crate::errors::CmDataError;
use crate::histogram::{kernel_density_estimator, BinGrid, DensityTensor};
use crate::molecules::{MoleculeTopology, MoleculeType, TypePairIndex};
use crate::pbc::{pbc_dx, SimBox};
use crate::settings::Settings;
use crate::trajectory::{Frame, Topology};
use nalgebra::Vector3;
use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

/// Immutable data shared by every frame: classification, bin grid, cutoffs.
#[derive(Clone, Debug)]
pub struct ContactAnalysis {
    pub settings: Settings,
    pub molecules: MoleculeTopology,
    pub grid: BinGrid,
    /// `false` for hydrogens, by global atom index
    heavy: Vec<bool>,
    mcut2: f64,
    cut_sig2: f64,
}

impl ContactAnalysis {
    pub fn new(settings: Settings, topology: &impl Topology) -> Result<Self, CmDataError> {
        settings.validate()?;
        let molecules = MoleculeTopology::classify(topology.partition())?;
        if molecules.n_atoms() > topology.n_atoms() {
            return Err(CmDataError::InvalidPartition(format!(
                "molecules cover {} atoms but the topology has {}",
                molecules.n_atoms(),
                topology.n_atoms()
            )));
        }
        let heavy: Vec<bool> = (0..molecules.n_atoms())
            .map(|i| !settings.is_hydrogen(topology.atom_name(i)))
            .collect();
        if !heavy.iter().any(|&h| h) {
            warn!("No heavy atoms found in the topology; all densities will be zero");
        }

        let grid = BinGrid::new(settings.cutoff);
        info!("Number of different molecules {}", molecules.n_types());
        debug!(
            "Using {} bins of width {:.5} up to {}",
            grid.len(),
            grid.dx(),
            grid.cutoff()
        );

        Ok(Self {
            mcut2: settings.mol_cutoff2(),
            cut_sig2: settings.signal_cutoff2(),
            settings,
            molecules,
            grid,
            heavy,
        })
    }

    /// Zero-filled histogram collections shaped after the molecule types.
    pub fn new_tensors(&self) -> DensityTensors {
        DensityTensors::zeros(&self.molecules, self.grid.len())
    }

    pub fn new_scratch(&self) -> FrameScratch {
        FrameScratch::new(&self.molecules)
    }

    /// Accumulate one frame into `tensors`. The stride policy is not applied here.
    pub fn accumulate_frame(
        &self,
        positions: &[Vector3<f64>],
        simbox: Option<&SimBox>,
        scratch: &mut FrameScratch,
        tensors: &mut DensityTensors,
    ) -> Result<(), CmDataError> {
        if positions.len() < self.molecules.n_atoms() {
            return Err(CmDataError::FrameMismatch {
                expected: self.molecules.n_atoms(),
                found: positions.len(),
            });
        }
        let mols = &self.molecules.instances;

        // Unweighted centers of the molecules
        scratch.centers.clear();
        scratch.centers.extend(mols.iter().map(|m| {
            let sum: Vector3<f64> = positions[m.atoms.clone()].iter().sum();
            sum / m.natom() as f64
        }));

        for (i, mol_i) in mols.iter().enumerate() {
            let ti = mol_i.mol_type;
            let buffers = &mut scratch.per_type[ti];
            buffers.reset();

            for (j, mol_j) in mols.iter().enumerate() {
                if j != i {
                    let d = pbc_dx(simbox, &scratch.centers[i], &scratch.centers[j]);
                    if d.norm_squared() > self.mcut2 {
                        continue;
                    }
                }
                let tj = mol_j.mol_type;
                // Cross-type pairs are visited once, same-type pairs in both directions
                if ti != tj && j < i {
                    continue;
                }
                let inter_same = i != j && ti == tj;

                for (a_i, ii) in mol_i.atoms.clone().enumerate() {
                    if !self.heavy[ii] {
                        continue;
                    }
                    for (a_j, jj) in mol_j.atoms.clone().enumerate() {
                        if !self.heavy[jj] {
                            continue;
                        }
                        let mut d2 = pbc_dx(simbox, &positions[ii], &positions[jj]).norm_squared();
                        if inter_same {
                            // Atom numbering may run in either direction along the
                            // molecule: also try the swapped labels
                            let inv_i = mol_i.atoms.start + a_j;
                            let inv_j = mol_j.atoms.start + a_i;
                            let d3 = pbc_dx(simbox, &positions[inv_i], &positions[inv_j])
                                .norm_squared();
                            d2 = d2.min(d3);
                        }
                        if d2 >= self.cut_sig2 {
                            continue;
                        }
                        let target = if i == j {
                            &mut buffers.intra
                        } else if ti == tj {
                            &mut buffers.same
                        } else {
                            &mut buffers.cross[tj]
                        };
                        target.record(a_i, a_j, d2);
                    }
                }
            }

            self.flush_molecule(ti, mol_i.inv_count, buffers, tensors);
        }
        Ok(())
    }

    /// Feed the minimum distances found for one outer molecule to the estimator.
    fn flush_molecule(
        &self,
        ti: usize,
        inv_count: f64,
        buffers: &TypeScratch,
        tensors: &mut DensityTensors,
    ) {
        let natom = self.molecules.natom(ti);
        for a in 0..natom {
            for b in a..natom {
                if let Some(d2) = buffers.same.get(a, b) {
                    kernel_density_estimator(
                        tensors.same.histogram_mut(ti, a, b),
                        &self.grid,
                        d2.sqrt(),
                        inv_count,
                    );
                }
                if let Some(d2) = buffers.intra.get(a, b) {
                    kernel_density_estimator(
                        tensors.intra.histogram_mut(ti, a, b),
                        &self.grid,
                        d2.sqrt(),
                        inv_count,
                    );
                }
            }
        }

        let types = &self.molecules.types;
        for tj in (ti + 1)..types.len() {
            let Some(pair) = self.molecules.cross_index.get(ti, tj) else {
                continue;
            };
            let norm = types[ti].inv_count().max(types[tj].inv_count());
            let cross = &buffers.cross[tj];
            for a in 0..natom {
                for b in 0..types[tj].natom {
                    if let Some(d2) = cross.get(a, b) {
                        kernel_density_estimator(
                            tensors.cross.histogram_mut(pair, a, b),
                            &self.grid,
                            d2.sqrt(),
                            norm,
                        );
                    }
                }
            }
        }
    }

    /// Serial accumulation over a frame source, applying the stride policy.
    pub fn accumulate<I>(&self, frames: I) -> Result<ContactDensities, CmDataError>
    where
        I: IntoIterator<Item = Result<Frame, CmDataError>>,
    {
        let mut accumulator = FrameAccumulator::new(self);
        for frame in frames {
            accumulator.process(&frame?)?;
        }
        Ok(accumulator.finish())
    }

    /// Parallel accumulation: every worker owns its scratch buffers and partial
    /// histograms, which are summed once all frames are consumed.
    pub fn accumulate_parallel<I>(&self, frames: I) -> Result<ContactDensities, CmDataError>
    where
        I: Iterator<Item = Result<Frame, CmDataError>> + Send,
    {
        let accumulator = frames
            .par_bridge()
            .try_fold(
                || FrameAccumulator::new(self),
                |mut acc, frame| {
                    acc.process(&frame?)?;
                    Ok::<_, CmDataError>(acc)
                },
            )
            .try_reduce(
                || FrameAccumulator::new(self),
                |mut a, b| {
                    a.merge(b);
                    Ok(a)
                },
            )?;
        Ok(accumulator.finish())
    }
}

/// Minimum squared distance per atom pair, with an explicit "found" state.
#[derive(Clone, Debug, Default)]
pub struct ScratchMatrix {
    cols: usize,
    data: Vec<Option<f64>>,
}

impl ScratchMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            cols,
            data: vec![None; rows * cols],
        }
    }

    pub fn reset(&mut self) {
        self.data.fill(None);
    }

    /// Keep the smaller of the stored and the new squared distance.
    pub fn record(&mut self, a: usize, b: usize, d2: f64) {
        let slot = &mut self.data[a * self.cols + b];
        *slot = Some(slot.map_or(d2, |old| old.min(d2)));
    }

    pub fn get(&self, a: usize, b: usize) -> Option<f64> {
        self.data[a * self.cols + b]
    }
}

/// Scratch matrices for one outer molecule of a given type.
#[derive(Clone, Debug, Default)]
pub struct TypeScratch {
    same: ScratchMatrix,
    intra: ScratchMatrix,
    /// Indexed by partner type; only partner types above the own type are allocated
    cross: Vec<ScratchMatrix>,
}

impl TypeScratch {
    fn reset(&mut self) {
        self.same.reset();
        self.intra.reset();
        self.cross.iter_mut().for_each(ScratchMatrix::reset);
    }
}

/// Per-frame transient state, owned by a single worker.
#[derive(Clone, Debug)]
pub struct FrameScratch {
    centers: Vec<Vector3<f64>>,
    per_type: Vec<TypeScratch>,
}

impl FrameScratch {
    pub fn new(molecules: &MoleculeTopology) -> Self {
        let types = &molecules.types;
        let per_type = types
            .iter()
            .map(|t| TypeScratch {
                same: ScratchMatrix::new(t.natom, t.natom),
                intra: ScratchMatrix::new(t.natom, t.natom),
                cross: types
                    .iter()
                    .map(|u| {
                        if u.id > t.id {
                            ScratchMatrix::new(t.natom, u.natom)
                        } else {
                            ScratchMatrix::default()
                        }
                    })
                    .collect(),
            })
            .collect();
        Self {
            centers: Vec::with_capacity(molecules.n_instances()),
            per_type,
        }
    }
}

/// The three histogram collections.
#[derive(Clone, Debug, PartialEq)]
pub struct DensityTensors {
    /// `[type][atom_a][atom_b]`, different instances of the same type
    pub same: DensityTensor,
    /// `[type pair][atom_a][atom_b]`, `atom_a` in the lower type id
    pub cross: DensityTensor,
    /// `[type][atom_a][atom_b]`, atoms of the same instance
    pub intra: DensityTensor,
}

impl DensityTensors {
    pub fn zeros(molecules: &MoleculeTopology, n_bins: usize) -> Self {
        let square: Vec<(usize, usize)> =
            molecules.types.iter().map(|t| (t.natom, t.natom)).collect();
        let cross: Vec<(usize, usize)> = molecules
            .cross_index
            .pairs()
            .map(|(i, j, _)| (molecules.natom(i), molecules.natom(j)))
            .collect();
        Self {
            same: DensityTensor::zeros(&square, n_bins),
            cross: DensityTensor::zeros(&cross, n_bins),
            intra: DensityTensor::zeros(&square, n_bins),
        }
    }

    pub fn add_assign(&mut self, other: &DensityTensors) {
        self.same.add_assign(&other.same);
        self.cross.add_assign(&other.cross);
        self.intra.add_assign(&other.intra);
    }

    /// Average over `n_frames` and fill the lower triangle of the symmetric
    /// collections from the upper one.
    pub fn normalize(&mut self, n_frames: usize) {
        if n_frames > 0 {
            let norm = 1.0 / n_frames as f64;
            self.same.scale(norm);
            self.cross.scale(norm);
            self.intra.scale(norm);
        }
        self.same.mirror_upper_triangle();
        self.intra.mirror_upper_triangle();
    }
}

/// Mutable accumulation state: scratch buffers, partial histograms and frame counts.
pub struct FrameAccumulator<'a> {
    analysis: &'a ContactAnalysis,
    scratch: FrameScratch,
    tensors: DensityTensors,
    n_accepted: usize,
    n_seen: usize,
}

impl<'a> FrameAccumulator<'a> {
    pub fn new(analysis: &'a ContactAnalysis) -> Self {
        Self {
            analysis,
            scratch: analysis.new_scratch(),
            tensors: analysis.new_tensors(),
            n_accepted: 0,
            n_seen: 0,
        }
    }

    /// Process `frame` if the stride policy accepts it. Returns whether the
    /// frame was accepted.
    pub fn process(&mut self, frame: &Frame) -> Result<bool, CmDataError> {
        self.n_seen += 1;
        if !self.analysis.settings.accepts_frame(frame.index) {
            trace!("Skipping frame {}", frame.index);
            return Ok(false);
        }
        let expected = self.analysis.molecules.n_atoms();
        if frame.positions.len() != expected {
            return Err(CmDataError::FrameMismatch {
                expected,
                found: frame.positions.len(),
            });
        }
        trace!("Processing frame {}", frame.index);
        self.analysis.accumulate_frame(
            &frame.positions,
            frame.simbox.as_ref(),
            &mut self.scratch,
            &mut self.tensors,
        )?;
        self.n_accepted += 1;
        Ok(true)
    }

    pub fn n_accepted(&self) -> usize {
        self.n_accepted
    }

    /// Combine the partial results of another worker.
    pub fn merge(&mut self, other: FrameAccumulator<'_>) {
        self.tensors.add_assign(&other.tensors);
        self.n_accepted += other.n_accepted;
        self.n_seen += other.n_seen;
    }

    /// Normalize by the number of accepted frames.
    pub fn finish(self) -> ContactDensities {
        let Self {
            analysis,
            mut tensors,
            n_accepted,
            n_seen,
            ..
        } = self;
        if n_accepted == 0 {
            warn!("No frames were accepted out of {n_seen}; densities are all zero");
        } else {
            info!("Analyzed {n_accepted} of {n_seen} frame(s)");
        }
        tensors.normalize(n_accepted);
        ContactDensities {
            grid: analysis.grid.clone(),
            types: analysis.molecules.types.clone(),
            cross_index: analysis.molecules.cross_index.clone(),
            tensors,
            n_frames: n_accepted,
        }
    }
}

/// Time-averaged densities, read-only after normalization.
#[derive(Clone, Debug)]
pub struct ContactDensities {
    pub grid: BinGrid,
    pub types: Vec<MoleculeType>,
    pub cross_index: TypePairIndex,
    pub tensors: DensityTensors,
    /// Number of accepted frames used for the average
    pub n_frames: usize,
}
