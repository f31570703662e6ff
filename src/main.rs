use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use packflow::config::{ParameterSet, SolverSettings};
use packflow::models::procurement::ledger::Ledgers;
use packflow::models::procurement::model::{ProcurementSolver, SolveOutcome};
use packflow::problem::Problem;

/// Two-echelon packing procurement planner.
#[derive(Parser)]
#[clap(name = "packflow", version)]
struct Args {
    /// Problem instance (JSON tables)
    problem: PathBuf,

    /// Parameter-set file (JSON); defaults apply when omitted
    #[clap(long)]
    config: Option<PathBuf>,

    /// Directory the output ledgers are written to
    #[clap(long, default_value = "output")]
    out: PathBuf,

    /// Wall-clock limit in seconds handed to the solver
    #[clap(long)]
    time_limit: Option<f64>,

    /// Relative MIP gap at which the solver may stop
    #[clap(long)]
    mip_gap: Option<f64>,

    /// Suppress solver console output
    #[clap(long)]
    quiet: bool,

    /// Dump the model here when the solve does not end optimal
    #[clap(long)]
    write_model: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let reader = BufReader::new(File::open(&args.problem)?);
    let problem: Problem = serde_json::from_reader(reader)?;
    info!(
        "Loaded problem: {} items over {} periods",
        problem.items().len(),
        problem.periods().len()
    );

    let config: ParameterSet = match &args.config {
        Some(path) => serde_json::from_reader(BufReader::new(File::open(path)?))?,
        None => ParameterSet::default(),
    };
    config.validate()?;

    let settings = SolverSettings {
        time_limit: args.time_limit,
        mip_gap: args.mip_gap,
        quiet: args.quiet,
        write_model_to: args.write_model,
    };

    let outcome = ProcurementSolver::solve(&problem, &config, &settings)?;
    match &outcome {
        SolveOutcome::Optimal(results) => {
            info!("Total cost: {}", results.objective);
            let ledgers = Ledgers::from_results(results, problem.demand());
            ledgers.write_csv(&args.out)?;
            Ok(ExitCode::SUCCESS)
        }
        SolveOutcome::Terminated(status) => {
            error!("no optimal solution: solver status {:?}", status);
            Ok(ExitCode::FAILURE)
        }
    }
}
