use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use json::JsonValue;
use log::{debug, error, info};

use crate::{
    datatypes::{
        field_maxima, ExecutionStatus, Mesh, SimulationReport, SummaryMetrics, TimeSample,
    },
    error::Result,
    input::JobDescription,
    mesher,
    post_processor::recommendations,
    solver::{ensure_finite, StepSolver},
};

/// Strain added before every solver call
pub const STRAIN_INCREMENT: f64 = 0.01;

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    NotStarted,
    MeshLoaded,
    MeshLoadFailed,
    Stepping,
    Done(ExecutionStatus),
}

/// Owns the mesh of one run and drives the step solver over it
pub struct Simulation<S: StepSolver> {
    solver: S,
    mesh: Mesh,
    state: ExecutionState,
    progress: bool,
}

impl<S: StepSolver> Simulation<S> {
    pub fn new(solver: S) -> Simulation<S> {
        Simulation {
            solver,
            mesh: Mesh::default(),
            state: ExecutionState::NotStarted,
            progress: false,
        }
    }

    /// Draws a progress bar over the stepping loop
    pub fn with_progress(mut self, progress: bool) -> Simulation<S> {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// The mesh as left by the last run
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Runs one job. Every failure after the job file was read lands in a
    /// Failed report rather than an error.
    ///
    /// # Arguments
    /// * `input_json` - The parsed job description
    /// * `stl_file` - The tool mesh
    pub fn run(&mut self, input_json: &JsonValue, stl_file: &Path) -> SimulationReport {
        let simulation_id = input_json["simulation_id"].clone();
        info!("starting simulation for ID: {simulation_id}");

        match self.try_run(input_json, stl_file) {
            Ok(report) => {
                self.state = ExecutionState::Done(ExecutionStatus::Success);
                report
            }
            Err(err) => {
                error!("{err}");
                self.state = ExecutionState::Done(ExecutionStatus::Failed);
                SimulationReport::failed(simulation_id, err.to_string())
            }
        }
    }

    fn try_run(&mut self, input_json: &JsonValue, stl_file: &Path) -> Result<SimulationReport> {
        self.state = ExecutionState::NotStarted;
        let job = JobDescription::from_json(input_json)?;
        self.load_mesh(stl_file)?;
        self.solver.prepare(&self.mesh.elements)?;
        let time_series = self.step_all(&job)?;
        Ok(self.summarize(&job, time_series))
    }

    fn load_mesh(&mut self, stl_file: &Path) -> Result<()> {
        self.mesh = Mesh::default();
        match mesher::run(stl_file) {
            Ok(mesh) => {
                self.mesh = mesh;
                self.state = ExecutionState::MeshLoaded;
                Ok(())
            }
            Err(err) => {
                self.state = ExecutionState::MeshLoadFailed;
                Err(err)
            }
        }
    }

    /// Runs the fixed-count stepping loop
    ///
    /// # Arguments
    /// * `job` - The run configuration
    ///
    /// # Returns
    /// One sample per step, in step order
    fn step_all(&mut self, job: &JobDescription) -> Result<Vec<TimeSample>> {
        self.state = ExecutionState::Stepping;
        info!(
            "running {} simulation for {} steps...",
            self.solver.name(),
            job.time_steps
        );

        let bar = if self.progress {
            ProgressBar::new(job.time_steps as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} steps {msg}") {
            bar.set_style(style);
        }

        let dt = if job.time_steps > 0 {
            job.duration_sec / job.time_steps as f64
        } else {
            0.0
        };
        let mut strain = 0.0;
        let mut time_series = Vec::new();

        for i in 0..job.time_steps {
            strain += STRAIN_INCREMENT;
            self.solver
                .advance(&mut self.mesh.nodes, strain, &job.material_params)?;
            ensure_finite(&self.mesh.nodes)?;

            let (temperature, stress) = field_maxima(&self.mesh.nodes);
            debug!(
                "step {}/{} | max temp: {temperature:.2} C | max stress: {stress:.2} MPa",
                i + 1,
                job.time_steps
            );

            time_series.push(TimeSample {
                time_sec: (i + 1) as f64 * dt,
                temperature_celsius: temperature,
                stress_mpa: stress,
            });
            bar.inc(1);
        }
        bar.finish_with_message("done");

        Ok(time_series)
    }

    fn summarize(&self, job: &JobDescription, time_series: Vec<TimeSample>) -> SimulationReport {
        // rescan rather than reuse the last sample
        let (max_temperature, max_stress) = field_maxima(&self.mesh.nodes);
        let summary = SummaryMetrics {
            max_temperature_celsius: max_temperature,
            max_von_mises_stress_mpa: max_stress,
            tool_life_estimate_min: self.solver.tool_life_estimate(),
        };

        info!(
            "simulation complete: max temp {max_temperature:.2} C, max stress {max_stress:.2} MPa"
        );

        SimulationReport {
            simulation_id: job.simulation_id.clone(),
            recommendations: recommendations(&summary, self.solver.name()),
            summary: Some(summary),
            time_series,
            status: ExecutionStatus::Success,
            error: None,
        }
    }
}
