use clap::Parser;
use cmdata::{CmDataError, MoleculeTopology, PdbTrajectory, Topology};
use std::path::PathBuf;
use tracing::trace;

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub(crate) struct Args {
    /// Path to the PDB file
    #[arg(short, long)]
    input: PathBuf,
}

pub(crate) fn run(args: &Args) -> Result<(), CmDataError> {
    trace!("{args:?}");

    let input_path = args.input.canonicalize()?;
    let trajectory = PdbTrajectory::open(&input_path.to_string_lossy())?;
    let topology = trajectory.topology();
    let molecules = MoleculeTopology::classify(topology.partition())?;

    println!("{:>4} {:>8} {:>8}", "type", "atoms", "copies");
    for t in &molecules.types {
        println!("{:>4} {:>8} {:>8}", t.id + 1, t.natom, t.count);
    }
    Ok(())
}
