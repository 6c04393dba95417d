use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use json::JsonValue;
use log::{error, info};

use edgepredict::{
    datatypes::SimulationReport,
    error::EdgePredictError,
    input, post_processor,
    simulation::Simulation,
    solver::{JohnsonCookSolver, StepSolver},
    stiffness::StiffnessSolver,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SolverKind {
    /// Node-local Johnson-Cook flow stress with adiabatic heating
    JohnsonCook,
    /// Assembled conduction system solved with conjugate gradient
    Stiffness,
}

#[derive(Parser)]
#[command(name = "edgepredict")]
#[command(version, about = "Cutting tool temperature and stress simulation")]
struct Cli {
    /// Path to the job description (JSON)
    input: PathBuf,

    /// Tool mesh, ASCII or binary STL
    #[arg(short, long, default_value = "tool.stl")]
    mesh: PathBuf,

    /// Where to write the report
    #[arg(short, long, default_value = "output.json")]
    output: PathBuf,

    /// Step solver backend
    #[arg(short, long, value_enum, default_value_t = SolverKind::JohnsonCook)]
    solver: SolverKind,

    /// Also write nodes.csv and elements.csv with the final mesh state
    #[arg(long)]
    csv: bool,
}

fn run(cli: &Cli) -> Result<(), EdgePredictError> {
    info!("reading input from {}", cli.input.display());

    let report = match input::load_input_file(&cli.input) {
        Ok(input_json) => {
            let solver: Box<dyn StepSolver> = match cli.solver {
                SolverKind::JohnsonCook => Box::new(JohnsonCookSolver::new()),
                SolverKind::Stiffness => Box::new(StiffnessSolver::new()),
            };
            let mut simulation = Simulation::new(solver).with_progress(true);
            let report = simulation.run(&input_json, &cli.mesh);
            post_processor::write_report(&report, &cli.output)?;

            if cli.csv && report.error.is_none() {
                post_processor::csv_output(
                    simulation.mesh(),
                    Path::new("nodes.csv"),
                    Path::new("elements.csv"),
                )?;
            }
            report
        }
        Err(err @ EdgePredictError::Input(_)) => return Err(err),
        Err(err) => {
            error!("{err}");
            let report = SimulationReport::failed(JsonValue::Null, err.to_string());
            post_processor::write_report(&report, &cli.output)?;
            report
        }
    };

    info!("engine finished with status {}", report.status.as_str());

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
