use std::collections::HashMap;
use std::path::Path;

use log::info;

use crate::{
    datatypes::{Element, Mesh, Node, Triangle, Vertex, REST_STRESS, REST_TEMPERATURE},
    error::{EdgePredictError, Result},
    stl,
};

/// Welds triangle soup into a shared-vertex mesh.
///
/// Vertices are merged only when their coordinates are exactly equal. Each
/// builder owns its own vertex map, so separate runs never share ids.
#[derive(Debug, Default)]
pub struct MeshBuilder {
    vertex_map: HashMap<[u32; 3], usize>,
    nodes: Vec<Node>,
    elements: Vec<Element>,
}

impl MeshBuilder {
    pub fn new() -> MeshBuilder {
        MeshBuilder::default()
    }

    /// Resolves a vertex to a node id, creating the node on first sight
    fn process_vertex(&mut self, vertex: &Vertex) -> usize {
        let next_id = self.nodes.len();
        let id = *self.vertex_map.entry(vertex.key()).or_insert(next_id);

        if id == next_id {
            self.nodes.push(Node {
                id,
                position: vertex.to_point(),
                temperature: REST_TEMPERATURE,
                stress: REST_STRESS,
            });
        }

        id
    }

    /// Adds one triangle as an element. Coincident and degenerate triangles
    /// are kept as-is.
    pub fn push_triangle(&mut self, triangle: &Triangle) -> usize {
        let nodes = triangle.vertices.map(|v| self.process_vertex(&v));
        let id = self.elements.len();
        self.elements.push(Element { id, nodes });
        id
    }

    pub fn finish(self) -> Mesh {
        Mesh {
            nodes: self.nodes,
            elements: self.elements,
        }
    }

    /// Welds a full triangle sequence in one pass
    ///
    /// # Arguments
    /// * `triangles` - The triangles, in file order
    ///
    /// # Returns
    /// The welded mesh, with node ids assigned in first-seen order
    pub fn build(triangles: &[Triangle]) -> Mesh {
        let mut builder = MeshBuilder::new();
        for triangle in triangles {
            builder.push_triangle(triangle);
        }
        builder.finish()
    }
}

/// Runs the mesher
///
/// # Arguments
/// * `stl_file` - The mesh file, in either STL encoding
///
/// # Returns
/// The welded mesh, with every node at its rest field state
pub fn run(stl_file: &Path) -> Result<Mesh> {
    info!("loading mesh from STL file {}", stl_file.display());
    let triangles = stl::read(stl_file)?;
    let mesh = MeshBuilder::build(&triangles);

    if mesh.nodes.is_empty() {
        return Err(EdgePredictError::MeshEmpty);
    }

    info!(
        "loaded {} nodes and {} elements",
        mesh.nodes.len(),
        mesh.elements.len()
    );

    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> Triangle {
        Triangle {
            normal: Vertex::new(0.0, 0.0, 1.0),
            vertices: [a, b, c].map(|p| Vertex::new(p[0], p[1], p[2])),
        }
    }

    fn square() -> Vec<Triangle> {
        vec![
            tri([0., 0., 0.], [1., 0., 0.], [1., 1., 0.]),
            tri([0., 0., 0.], [1., 1., 0.], [0., 1., 0.]),
        ]
    }

    #[test]
    fn square_welds_to_four_nodes() {
        let mesh = MeshBuilder::build(&square());

        assert_eq!(mesh.nodes.len(), 4);
        assert_eq!(mesh.elements.len(), 2);
        assert_eq!(mesh.elements[0].nodes, [0, 1, 2]);
        assert_eq!(mesh.elements[1].nodes, [0, 2, 3]);

        // shared edge (0,0,0)-(1,1,0) is referenced by both elements
        for shared in [0, 2] {
            assert!(mesh.elements.iter().all(|e| e.nodes.contains(&shared)));
        }
    }

    #[test]
    fn nodes_start_at_rest() {
        let mesh = MeshBuilder::build(&square());
        for (i, node) in mesh.nodes.iter().enumerate() {
            assert_eq!(node.id, i);
            assert_eq!(node.temperature, REST_TEMPERATURE);
            assert_eq!(node.stress, REST_STRESS);
        }
        assert_eq!(mesh.nodes[3].position, nalgebra::Point3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn coincident_triangles_stay_distinct() {
        let t = tri([0., 0., 0.], [1., 0., 0.], [0., 1., 0.]);
        let mesh = MeshBuilder::build(&[t, t]);

        assert_eq!(mesh.nodes.len(), 3);
        assert_eq!(mesh.elements.len(), 2);
        assert_eq!(mesh.elements[0].nodes, mesh.elements[1].nodes);
        assert_eq!(mesh.elements[1].id, 1);
    }

    #[test]
    fn degenerate_triangle_repeats_node() {
        let mesh = MeshBuilder::build(&[tri([0., 0., 0.], [0., 0., 0.], [1., 0., 0.])]);
        assert_eq!(mesh.nodes.len(), 2);
        assert_eq!(mesh.elements[0].nodes, [0, 0, 1]);
    }

    #[test]
    fn no_tolerance_on_vertex_keys() {
        let mesh = MeshBuilder::build(&[
            tri([0., 0., 0.], [1., 0., 0.], [0., 1., 0.]),
            tri([0., 0., 1e-7], [1., 0., 0.], [0., 1., 0.]),
        ]);
        assert_eq!(mesh.nodes.len(), 4);
    }

    #[test]
    fn welding_is_deterministic() {
        let mut triangles = square();
        triangles.push(tri([2., 0., 0.], [1., 0., 0.], [1., 1., 0.]));
        triangles.push(tri([2., 0., 0.], [1., 1., 0.], [5., 5., 5.]));

        let first = MeshBuilder::build(&triangles);
        let second = MeshBuilder::build(&triangles);
        assert_eq!(first, second);

        assert!(first.nodes.len() <= 3 * triangles.len());
        assert_eq!(first.elements.len(), triangles.len());
        for element in &first.elements {
            assert!(element.nodes.iter().all(|&n| n < first.nodes.len()));
        }
    }

    #[test]
    fn run_reports_missing_file() {
        assert!(matches!(
            run(Path::new("no_such_tool.stl")),
            Err(EdgePredictError::File(_))
        ));
    }
}
