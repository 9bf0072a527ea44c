use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mlem_core::config::Parameters;
use mlem_core::io::{read_phantom, write_snapshots};
use mlem_core::mlem::{ProgressObserver, Reconstructed, Reconstruction, Silent};
use mlem_core::system_matrix::{load_system_matrix, prune_zero_rows};

/// ML-EM reconstruction of a simulated phantom from a precomputed system matrix.
///
/// The phantom is forward projected through the system matrix to produce the
/// measured data, which is then reconstructed starting from a flat image.
/// Every `scale`-th estimate is saved to the output archive.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON parameter file shared with the system matrix generator
    #[arg(long, default_value = "../SysMatConfig/Parameters.json")]
    parameters: PathBuf,

    /// Directory holding circle-phantom.npz and circle-phantom_noise.npz
    #[arg(long, default_value = "../ImageReconstructor/input")]
    phantom_dir: PathBuf,

    /// Output archive for the saved estimates
    #[arg(long, default_value = "images/contrast-recon-data.npz")]
    output: PathBuf,

    /// Save the estimate every this many iterations
    #[arg(long, default_value = "100")]
    scale: NonZeroUsize,

    /// Override ReconstructionIterations from the parameter file
    #[arg(long)]
    iterations: Option<usize>,

    /// Do not draw a progress bar
    #[arg(long)]
    no_progress: bool,
}

struct Bar(ProgressBar);

impl Bar {
    fn new(total: usize) -> Result<Self> {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("Iteration: {wide_bar} {pos}/{len} ({eta_precise})")?,
        );
        Ok(Self(bar))
    }
}

impl ProgressObserver for Bar {
    fn on_progress(&mut self, completed: usize, total: usize) {
        self.0.set_position(completed as u64);
        if completed == total {
            self.0.finish();
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let parameters = Parameters::from_file(&args.parameters).context("load parameters")?;
    let n_iterations = args.iterations.unwrap_or(parameters.reconstruction_iterations);
    let shape = parameters.matrix_shape();

    // --- System matrix, without detector elements that see nothing ---
    let sysmat_file = parameters.sysmat_file();
    let matrix = load_system_matrix(&sysmat_file, shape).context("load system matrix")?;
    let matrix = prune_zero_rows(matrix.view());

    // --- Simulated measurement ---
    let phantom_file = parameters.phantom_file(&args.phantom_dir);
    let phantom = read_phantom(&phantom_file, shape.cols()).context("load phantom")?;
    let reconstruction = Reconstruction::from_phantom(matrix, phantom.view());

    info!("Iterative reconstruction: {n_iterations} iterations, saving every {}", args.scale);
    let Reconstructed { snapshots, anomalies, .. } = if args.no_progress {
        reconstruction.run(n_iterations, args.scale, &mut Silent)
    } else {
        reconstruction.run(n_iterations, args.scale, &mut Bar::new(n_iterations)?)
    };
    anomalies.log();

    write_snapshots(&args.output, snapshots.view()).context("write output")?;
    Ok(())
}
