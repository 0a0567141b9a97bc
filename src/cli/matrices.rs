use clap::Parser;
use cmdata::{
    get_contact_matrices, matrices_to_df, write_df_to_file, write_histograms, write_matrices,
    CmDataError, DataFrameFileType, PdbTrajectory, Settings, DEFAULT_CUTOFF, DEFAULT_MOL_CUTOFF,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub(crate) struct Args {
    /// Path to the multi-model PDB file; every MODEL is one frame and every
    /// chain of the first model one molecule
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Largest atom-atom distance (nm) tracked by the histograms
    #[arg(long, default_value_t = DEFAULT_CUTOFF)]
    cutoff: f64,

    /// Molecules whose centers are further apart (nm) are not compared
    #[arg(long = "mol-cutoff", default_value_t = DEFAULT_MOL_CUTOFF)]
    mol_cutoff: f64,

    /// Also write the raw histograms of every atom
    #[arg(long, default_value_t = false)]
    histo: bool,

    /// File name stem of the intramolecular matrices
    #[arg(long, default_value_t = String::from("intramat.ndx"))]
    intra: String,

    /// File name stem of the intermolecular matrices
    #[arg(long, default_value_t = String::from("intermat.ndx"))]
    inter: String,

    /// Only analyze every n-th frame; 0 analyzes all frames
    #[arg(long, default_value_t = 0)]
    stride: usize,

    /// Number of threads to use for parallel processing; 0 uses all cores
    #[arg(short = 'j', long = "num-threads", default_value_t = 1)]
    num_threads: usize,

    /// Also write all contacts as one table in this format
    #[arg(short = 't', long = "summary-format")]
    summary_format: Option<DataFrameFileType>,
}

impl Args {
    fn settings(&self, output_dir: &Path) -> Settings {
        Settings {
            cutoff: self.cutoff,
            mol_cutoff: self.mol_cutoff,
            histo: self.histo,
            intra_stem: output_dir.join(&self.intra).to_string_lossy().into_owned(),
            inter_stem: output_dir.join(&self.inter).to_string_lossy().into_owned(),
            stride: self.stride,
            num_threads: self.num_threads,
            ..Default::default()
        }
    }
}

pub(crate) fn run(args: &Args) -> Result<(), CmDataError> {
    trace!("{args:?}");

    let input_path = args.input.canonicalize()?;
    let output_path = std::path::absolute(&args.output)?;
    std::fs::create_dir_all(&output_path)?;
    debug!("Results will be saved to {}", output_path.display());

    let settings = args.settings(&output_path);
    settings.validate()?;

    let input_file = input_path.to_string_lossy();
    let trajectory = PdbTrajectory::open(&input_file)?;
    info!(
        "Loaded {} frame(s) from {}",
        trajectory.n_frames(),
        input_path.display()
    );
    let (topology, frames) = trajectory.into_parts();

    let (densities, matrices) = get_contact_matrices(&topology, frames, &settings)?;
    write_matrices(
        &matrices,
        Path::new(&settings.intra_stem),
        Path::new(&settings.inter_stem),
    )?;

    if settings.histo {
        write_histograms(&densities, &output_path)?;
    }

    if let Some(file_type) = args.summary_format {
        let mut df = matrices_to_df(&matrices)?;
        let output_file = output_path.join("contacts");
        write_df_to_file(&mut df, &output_file, file_type)?;
        info!(
            "Contact table saved to {}",
            output_file.with_extension(file_type.to_string()).display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_settings() {
        let args = Args::parse_from(["matrices", "--input", "traj.pdb"]);
        let settings = args.settings(Path::new("out"));
        let defaults = Settings::default();
        assert_eq!(settings.stride, defaults.stride);
        assert_eq!(settings.cutoff, defaults.cutoff);
        assert_eq!(settings.mol_cutoff, defaults.mol_cutoff);
        assert_eq!(settings.num_threads, defaults.num_threads);
        assert_eq!(settings.histo, defaults.histo);
        assert_eq!(
            Path::new(&settings.intra_stem),
            Path::new("out").join(&defaults.intra_stem)
        );
    }
}
