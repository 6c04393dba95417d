use std::io::Write;
use std::path::Path;

use json::JsonValue;
use log::info;

use crate::{
    datatypes::{ExecutionStatus, Mesh, SimulationReport, SummaryMetrics, TimeSample},
    error::{EdgePredictError, Result},
};

/// Indent used when pretty-printing the report
pub const REPORT_INDENT: u16 = 4;
/// Above this temperature the tool is approaching thermal softening
pub const HOT_TOOL_CELSIUS: f64 = 600.0;
/// Above this stress the cutting edge is at risk of chipping
pub const HIGH_STRESS_MPA: f64 = 1000.0;

/// Advice attached to a successful report
///
/// # Arguments
/// * `summary` - The final summary metrics
/// * `solver_name` - The backend that produced them
pub fn recommendations(summary: &SummaryMetrics, solver_name: &str) -> Vec<String> {
    let mut advice = vec![format!("Fields computed with the {solver_name} step solver.")];

    if summary.max_temperature_celsius > HOT_TOOL_CELSIUS {
        advice.push(format!(
            "Peak tool temperature {:.0} C exceeds {HOT_TOOL_CELSIUS:.0} C; reduce cutting speed or apply coolant.",
            summary.max_temperature_celsius
        ));
    }
    if summary.max_von_mises_stress_mpa > HIGH_STRESS_MPA {
        advice.push(format!(
            "Peak stress {:.0} MPa exceeds {HIGH_STRESS_MPA:.0} MPa; reduce feed or depth of cut.",
            summary.max_von_mises_stress_mpa
        ));
    }
    if advice.len() == 1 {
        advice.push("Temperature and stress remain within nominal limits.".to_owned());
    }

    advice
}

fn sample_to_json(sample: &TimeSample) -> JsonValue {
    let mut data = JsonValue::new_object();
    data["time_sec"] = sample.time_sec.into();
    data["temperature_celsius"] = sample.temperature_celsius.into();
    data["stress_mpa"] = sample.stress_mpa.into();
    data
}

/// Lays out the report document. Failed reports carry no metrics and no
/// time series.
pub fn report_to_json(report: &SimulationReport) -> JsonValue {
    let mut output = JsonValue::new_object();

    if !report.simulation_id.is_null() {
        output["simulation_id"] = report.simulation_id.clone();
    }

    if report.status == ExecutionStatus::Success {
        if let Some(summary) = &report.summary {
            output["summary_metrics"]["max_temperature_celsius"] =
                summary.max_temperature_celsius.into();
            output["summary_metrics"]["max_von_mises_stress_mpa"] =
                summary.max_von_mises_stress_mpa.into();
            output["summary_metrics"]["tool_life_estimate_min"] =
                summary.tool_life_estimate_min.into();
        }
        output["time_series_data"] =
            JsonValue::Array(report.time_series.iter().map(sample_to_json).collect());
    }

    output["execution_summary"]["status"] = report.status.as_str().into();
    if let Some(error) = &report.error {
        output["execution_summary"]["error"] = error.as_str().into();
    }

    output["recommendations"] = JsonValue::Array(
        report
            .recommendations
            .iter()
            .map(|r| r.as_str().into())
            .collect(),
    );

    output
}

/// Writes the report, pretty-printed
///
/// # Arguments
/// * `report` - The finished report
/// * `output_file` - Where to write it
pub fn write_report(report: &SimulationReport, output_file: &Path) -> Result<()> {
    std::fs::write(output_file, report_to_json(report).pretty(REPORT_INDENT)).map_err(|err| {
        EdgePredictError::Output(format!(
            "Failed to write report to {}: {err}",
            output_file.display()
        ))
    })?;

    info!("wrote results to {}", output_file.display());
    Ok(())
}

/// Writes the final mesh state to two CSV files
///
/// # Arguments
/// * `mesh` - The post-run mesh
/// * `nodes_output` - The filename of the output nodes csv
/// * `elements_output` - The filename of the output elements csv
pub fn csv_output(mesh: &Mesh, nodes_output: &Path, elements_output: &Path) -> Result<()> {
    let create = |path: &Path| {
        std::fs::File::create(path).map_err(|err| {
            EdgePredictError::Output(format!("Failed to create {}: {err}", path.display()))
        })
    };
    let write_err =
        |err: std::io::Error| EdgePredictError::Output(format!("Failed to write csv: {err}"));

    let mut nodes_file = std::io::BufWriter::new(create(nodes_output)?);
    let mut elements_file = std::io::BufWriter::new(create(elements_output)?);

    // Write nodes
    writeln!(nodes_file, "id,x,y,z,temperature,stress").map_err(write_err)?;
    for node in &mesh.nodes {
        writeln!(
            nodes_file,
            "{id},{x},{y},{z},{temperature},{stress}",
            id = node.id,
            x = node.position.x,
            y = node.position.y,
            z = node.position.z,
            temperature = node.temperature,
            stress = node.stress,
        )
        .map_err(write_err)?;
    }
    nodes_file.flush().map_err(write_err)?;

    // Write elements
    writeln!(elements_file, "id,n0,n1,n2").map_err(write_err)?;
    for element in &mesh.elements {
        writeln!(
            elements_file,
            "{id},{n0},{n1},{n2}",
            id = element.id,
            n0 = element.nodes[0],
            n1 = element.nodes[1],
            n2 = element.nodes[2],
        )
        .map_err(write_err)?;
    }
    elements_file.flush().map_err(write_err)?;

    info!(
        "wrote mesh to {} and {}",
        nodes_output.display(),
        elements_output.display()
    );

    Ok(())
}
