use nalgebra::Point3;

/// Ambient temperature every node starts a run at
pub const REST_TEMPERATURE: f64 = 25.0;
/// Stress every node starts a run at
pub const REST_STRESS: f64 = 0.0;

/// A point as stored in the mesh file
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vertex {
    pub fn new(x: f32, y: f32, z: f32) -> Vertex {
        Vertex { x, y, z }
    }

    /// Exact-equality key used for welding. Positive and negative zero map to
    /// the same key since they compare equal.
    pub fn key(&self) -> [u32; 3] {
        [self.x, self.y, self.z].map(|c| if c == 0.0 { 0.0f32.to_bits() } else { c.to_bits() })
    }

    pub fn to_point(&self) -> Point3<f64> {
        Point3::new(self.x as f64, self.y as f64, self.z as f64)
    }
}

/// One facet of the input triangle soup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub normal: Vertex,
    pub vertices: [Vertex; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: usize,
    pub position: Point3<f64>,
    pub temperature: f64,
    pub stress: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: usize,
    pub nodes: [usize; 3],
}

/// Shared-vertex mesh owned by a single simulation run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    pub nodes: Vec<Node>,
    pub elements: Vec<Element>,
}

/// Mesh-wide maxima recorded after one step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    pub time_sec: f64,
    pub temperature_celsius: f64,
    pub stress_mpa: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryMetrics {
    pub max_temperature_celsius: f64,
    pub max_von_mises_stress_mpa: f64,
    pub tool_life_estimate_min: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "Success",
            ExecutionStatus::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    /// Echoed unchanged from the job description; `Null` when it never parsed
    pub simulation_id: json::JsonValue,
    pub summary: Option<SummaryMetrics>,
    pub time_series: Vec<TimeSample>,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub recommendations: Vec<String>,
}

impl SimulationReport {
    /// Builds the report of a run that never entered the stepping loop
    pub fn failed(simulation_id: json::JsonValue, error: String) -> SimulationReport {
        SimulationReport {
            simulation_id,
            summary: None,
            time_series: Vec::new(),
            status: ExecutionStatus::Failed,
            error: Some(error),
            recommendations: Vec::new(),
        }
    }
}

/// Largest temperature and stress across the nodes, in that order
pub fn field_maxima(nodes: &[Node]) -> (f64, f64) {
    nodes.iter().fold(
        (f64::NEG_INFINITY, f64::NEG_INFINITY),
        |(max_temp, max_stress), node| (max_temp.max(node.temperature), max_stress.max(node.stress)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: usize, temperature: f64, stress: f64) -> Node {
        Node {
            id,
            position: Point3::origin(),
            temperature,
            stress,
        }
    }

    #[test]
    fn signed_zero_shares_a_key() {
        assert_eq!(Vertex::new(0.0, -0.0, 1.0).key(), Vertex::new(-0.0, 0.0, 1.0).key());
        assert_ne!(Vertex::new(0.0, 0.0, 1.0).key(), Vertex::new(0.0, 0.0, 1.0000001).key());
    }

    #[test]
    fn maxima_are_taken_independently() {
        let nodes = vec![node(0, 30.0, 5.0), node(1, 80.0, 2.0), node(2, 40.0, 9.0)];
        assert_eq!(field_maxima(&nodes), (80.0, 9.0));
    }
}
