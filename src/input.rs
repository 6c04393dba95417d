use std::path::Path;

use json::JsonValue;

use crate::error::{EdgePredictError, Result};

/// Fields of the job description consumed by a run
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescription {
    pub simulation_id: JsonValue,
    pub time_steps: usize,
    pub duration_sec: f64,
    /// Johnson-Cook bundle, handed to the step solver untouched
    pub material_params: JsonValue,
}

/// Reads and parses the job description file
///
/// # Arguments
/// * `input_file` - The path to the input json
///
/// # Returns
/// A JsonValue object
pub fn load_input_file(input_file: &Path) -> Result<JsonValue> {
    let file_string = std::fs::read_to_string(input_file).map_err(|err| {
        EdgePredictError::Input(format!(
            "Unable to open input file {}: {err}",
            input_file.display()
        ))
    })?;

    json::parse(&file_string)
        .map_err(|err| EdgePredictError::Schema(format!("Error in input file json: {err}")))
}

/// Looks up `section.field`, failing with a schema error naming the path
fn require<'a>(input_json: &'a JsonValue, section: &str, field: &str) -> Result<&'a JsonValue> {
    if !input_json.has_key(section) {
        return Err(EdgePredictError::Schema(format!(
            "Input json missing {section} section"
        )));
    }
    if !input_json[section].has_key(field) {
        return Err(EdgePredictError::Schema(format!(
            "Input json missing {field} field in {section} section"
        )));
    }

    Ok(&input_json[section][field])
}

impl JobDescription {
    /// Extracts the run configuration from a parsed job description
    ///
    /// # Arguments
    /// * `input_json` - The input file as a JsonValue object
    pub fn from_json(input_json: &JsonValue) -> Result<JobDescription> {
        if !input_json.has_key("simulation_id") {
            return Err(EdgePredictError::Schema(
                "Input json missing simulation_id field".to_owned(),
            ));
        }

        let time_steps = require(input_json, "simulation_settings", "time_steps")?
            .as_f64()
            .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64)
            .ok_or_else(|| {
                EdgePredictError::Schema("time_steps must be a non-negative integer".to_owned())
            })? as usize;

        let duration_sec = require(input_json, "simulation_settings", "duration_sec")?
            .as_f64()
            .filter(|d| d.is_finite() && *d >= 0.0)
            .ok_or_else(|| {
                EdgePredictError::Schema("duration_sec must be a non-negative number".to_owned())
            })?;

        if time_steps > 0 && duration_sec <= 0.0 {
            return Err(EdgePredictError::Schema(
                "duration_sec must be positive when time_steps is positive".to_owned(),
            ));
        }

        let material_params =
            require(input_json, "workpiece_material", "johnson_cook_params")?.clone();

        Ok(JobDescription {
            simulation_id: input_json["simulation_id"].clone(),
            time_steps,
            duration_sec,
            material_params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_json(settings: &str) -> JsonValue {
        json::parse(&format!(
            r#"{{
                "simulation_id": "sim-42",
                "simulation_settings": {settings},
                "workpiece_material": {{ "johnson_cook_params": {{ "A": 862 }} }}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn parses_all_fields() {
        let job =
            JobDescription::from_json(&job_json(r#"{"time_steps": 10, "duration_sec": 2.5}"#))
                .unwrap();

        assert_eq!(job.simulation_id, JsonValue::from("sim-42"));
        assert_eq!(job.time_steps, 10);
        assert_eq!(job.duration_sec, 2.5);
        assert_eq!(job.material_params["A"].as_f64(), Some(862.0));
    }

    #[test]
    fn zero_steps_allow_zero_duration() {
        let job =
            JobDescription::from_json(&job_json(r#"{"time_steps": 0, "duration_sec": 0}"#))
                .unwrap();
        assert_eq!(job.time_steps, 0);
    }

    #[test]
    fn rejects_bad_settings() {
        for settings in [
            r#"{"duration_sec": 1.0}"#,
            r#"{"time_steps": 10}"#,
            r#"{"time_steps": -1, "duration_sec": 1.0}"#,
            r#"{"time_steps": 2.5, "duration_sec": 1.0}"#,
            r#"{"time_steps": "ten", "duration_sec": 1.0}"#,
            r#"{"time_steps": 10, "duration_sec": 0}"#,
        ] {
            let err = JobDescription::from_json(&job_json(settings)).unwrap_err();
            assert!(matches!(err, EdgePredictError::Schema(_)), "{settings}");
        }
    }

    #[test]
    fn rejects_missing_material() {
        let input = json::parse(
            r#"{"simulation_id": 1, "simulation_settings": {"time_steps": 1, "duration_sec": 1}}"#,
        )
        .unwrap();
        let err = JobDescription::from_json(&input).unwrap_err();
        assert_eq!(
            err,
            EdgePredictError::Schema("Input json missing workpiece_material section".to_owned())
        );
    }

    #[test]
    fn load_reports_unreadable_file() {
        assert!(matches!(
            load_input_file(Path::new("missing/job.json")),
            Err(EdgePredictError::Input(_))
        ));
    }
}
