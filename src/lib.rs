//! # cmdata
//!
//! Time-averaged contact statistics between heavy atoms of a molecular
//! trajectory. For every pair of atoms the library builds a smoothed density
//! of their minimum distance per frame, separately for atoms of the same
//! molecule, of two copies of the same molecule, and of two different
//! molecules. From these densities it derives a mean contact distance and a
//! contact probability per atom pair.
//!
//! Distances are in nanometers.

mod accumulator;
mod errors;
mod histogram;
mod molecules;
mod output;
mod pbc;
mod settings;
mod summary;
mod trajectory;
mod utils;

pub use accumulator::{
    ContactAnalysis, ContactDensities, DensityTensors, FrameAccumulator, FrameScratch,
};
pub use errors::CmDataError;
pub use histogram::{kernel_density_estimator, n_bins, BinGrid, DensityTensor};
pub use molecules::{
    partition_from_sizes, MoleculeInstance, MoleculeTopology, MoleculeType, TypePairIndex,
};
pub use output::{output_path, write_histograms, write_matrices, write_matrix};
pub use pbc::{pbc_dx, BoxShape, MinimumImage, SimBox};
pub use settings::{Settings, DEFAULT_CUTOFF, DEFAULT_MOL_CUTOFF};
pub use summary::{
    calc_mean, calc_prob, contact_matrices, matrices_to_df, ContactKind, ContactMatrix,
    SummaryEntry,
};
pub use trajectory::{Frame, PdbTrajectory, SimpleTopology, Topology};
pub use utils::{run_with_threads, write_df_to_file, DataFrameFileType};

use tracing::debug;

/// Accumulate contact densities over a trajectory and summarize them.
///
/// # Arguments
///
/// * `topology` - Molecule partition and atom names
/// * `frames` - Trajectory frames in order
/// * `settings` - Cutoffs, stride and thread count
///
/// # Returns
///
/// The normalized densities and one [`ContactMatrix`] per pair of molecule
/// types, intramolecular matrices included.
///
/// # Example
///
/// ```no_run
/// use cmdata::{get_contact_matrices, PdbTrajectory, Settings};
///
/// let trajectory = PdbTrajectory::open("path/to/trajectory.pdb").unwrap();
/// let (topology, frames) = trajectory.into_parts();
/// let (_densities, matrices) =
///     get_contact_matrices(&topology, frames, &Settings::default()).unwrap();
/// println!("Computed {} contact matrices", matrices.len());
/// ```
pub fn get_contact_matrices<T, I>(
    topology: &T,
    frames: I,
    settings: &Settings,
) -> Result<(ContactDensities, Vec<ContactMatrix>), CmDataError>
where
    T: Topology,
    I: Iterator<Item = Result<Frame, CmDataError>> + Send,
{
    let analysis = ContactAnalysis::new(settings.clone(), topology)?;
    let densities = if settings.num_threads == 1 {
        analysis.accumulate(frames)?
    } else {
        run_with_threads(settings.num_threads, || {
            debug!("Using {} thread(s)", rayon::current_num_threads());
            analysis.accumulate_parallel(frames)
        })?
    };
    let matrices = contact_matrices(&densities);
    Ok((densities, matrices))
}
