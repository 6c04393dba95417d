use thiserror::Error;

/// Errors raised while loading, simulating or reporting a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EdgePredictError {
    /// The job description could not be read.
    #[error("Input error: {0}")]
    Input(String),

    /// The mesh file is missing or unreadable.
    #[error("File error: {0}")]
    File(String),

    /// No triangles were recovered, or a required text block was malformed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Welding produced zero nodes.
    #[error("Mesh error: mesh contains no nodes")]
    MeshEmpty,

    /// The step solver failed to advance the mesh.
    #[error("Solver error: {0}")]
    Solver(String),

    /// A field of the job description is missing or mistyped.
    #[error("Schema error: {0}")]
    Schema(String),

    /// The report or an export could not be written.
    #[error("Output error: {0}")]
    Output(String),
}

pub type Result<T> = std::result::Result<T, EdgePredictError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_error_kind() {
        let err = EdgePredictError::Parse("No triangles were read".to_owned());
        assert_eq!(err.to_string(), "Parse error: No triangles were read");
        assert_eq!(
            EdgePredictError::MeshEmpty.to_string(),
            "Mesh error: mesh contains no nodes"
        );
    }
}
