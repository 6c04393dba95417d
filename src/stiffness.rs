use argmin::{
    core::{
        observers::{Observe, ObserverMode},
        Error, Executor, Operator, State, KV,
    },
    solver::conjugategradient::ConjugateGradient,
};
use json::JsonValue;
use log::debug;
use nalgebra::{DVector, SMatrix, Vector3};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::{
    datatypes::{Element, Node},
    error::{EdgePredictError, Result},
    solver::{contact_weights, ensure_finite, JohnsonCookParams, StepSolver},
};

pub const MIN_CG_ITER: u64 = 1000;
pub const TARGET_CG_COST: f64 = 1e-9;
/// Lumped mass given to nodes that belong to no usable element
const MASS_FLOOR: f64 = 1e-12;

/// Runs multiplication for Conjugate Gradient Solver
struct ConjugateGradientOperator<'a> {
    a: &'a CsrMatrix<f64>,
}

impl<'a> Operator for ConjugateGradientOperator<'a> {
    type Param = Vec<f64>;
    type Output = Vec<f64>;

    fn apply(&self, x: &Self::Param) -> std::result::Result<Self::Output, Error> {
        let product = self.a * &DVector::from_column_slice(x);
        Ok(product.as_slice().to_vec())
    }
}

/// Logs how far the conjugate gradient solve got
#[derive(Default)]
struct ConjugateGradientLogger {
    iterations: u64,
}

impl<I> Observe<I> for ConjugateGradientLogger
where
    I: State<Float = f64>,
{
    fn observe_init(&mut self, _name: &str, _state: &I, _kv: &KV) -> std::result::Result<(), Error> {
        Ok(())
    }

    fn observe_iter(&mut self, state: &I, _kv: &KV) -> std::result::Result<(), Error> {
        self.iterations = state.get_iter();
        Ok(())
    }

    fn observe_final(&mut self, state: &I) -> std::result::Result<(), Error> {
        debug!(
            "conjugate gradient finished after {} iterations, residual {:e}",
            self.iterations,
            state.get_best_cost()
        );
        Ok(())
    }
}

/// Solves a system of equations using the conjugate gradient method.
///
/// This function returns an approximation for x in `Ax=b`
///
/// # Arguments
/// * `a` - A square positive definite matrix
/// * `b` - A vector of the solutions to the system
/// * `initial_guess` - Starting point for the iteration
///
/// # Returns
/// An approximation of `x`
fn run_conjugate_gradient(
    a: &CsrMatrix<f64>,
    b: &[f64],
    initial_guess: Vec<f64>,
) -> Result<Vec<f64>> {
    let solver: ConjugateGradient<_, f64> = ConjugateGradient::new(b.to_vec());
    let operator = ConjugateGradientOperator { a };
    let max_iters = MIN_CG_ITER.max(10 * b.len() as u64);

    let res = Executor::new(operator, solver)
        .configure(|state| {
            state
                .param(initial_guess)
                .max_iters(max_iters)
                .target_cost(TARGET_CG_COST)
        })
        .add_observer(ConjugateGradientLogger::default(), ObserverMode::Always)
        .run()
        .map_err(|err| EdgePredictError::Solver(format!("Conjugate Gradient error: {err}")))?;

    let state = res.state();
    state
        .get_best_param()
        .or_else(|| state.get_param())
        .cloned()
        .ok_or_else(|| {
            EdgePredictError::Solver(
                "Conjugate Gradient could not produce best parameter".to_owned(),
            )
        })
}

/// Calculates the area of the element
///
/// # Arguments
/// * `element` - The Element to target
/// * `nodes` - A reference to the vector of nodes
pub fn compute_element_area(element: &Element, nodes: &[Node]) -> f64 {
    let [p0, p1, p2] = element.nodes.map(|i| nodes[i].position);
    0.5 * (p1 - p0).cross(&(p2 - p0)).norm()
}

/// Computes the conduction matrix for a linear triangle in 3D
///
/// # Arguments
/// * `element` - The element to target
/// * `nodes` - A reference to the vector of nodes
/// * `conductivity` - Thermal conductivity of the tool
///
/// # Returns
/// A 3x3 conduction matrix, or None if the element has no area
pub fn compute_element_conduction_matrix(
    element: &Element,
    nodes: &[Node],
    conductivity: f64,
) -> Option<SMatrix<f64, 3, 3>> {
    let [p0, p1, p2] = element.nodes.map(|i| nodes[i].position);

    // edge opposite each corner
    let edges: [Vector3<f64>; 3] = [p2 - p1, p0 - p2, p1 - p0];
    let area = compute_element_area(element, nodes);
    let longest = edges.iter().map(|e| e.norm_squared()).fold(0.0, f64::max);

    if area <= 1e-12 * longest {
        return None;
    }

    Some(SMatrix::from_fn(|i, j| {
        conductivity * edges[i].dot(&edges[j]) / (4.0 * area)
    }))
}

/// Assembles `K + (1 + h) M` over all usable elements
///
/// # Arguments
/// * `nodes` - A reference to the vector of nodes
/// * `elements` - A reference to the vector of elements
/// * `conductivity` - Thermal conductivity of the tool
/// * `convection` - Convective loss coefficient
///
/// # Returns
/// The system matrix and the lumped mass of each node
fn build_system_matrix(
    nodes: &[Node],
    elements: &[Element],
    conductivity: f64,
    convection: f64,
) -> (CsrMatrix<f64>, Vec<f64>) {
    let mut coo = CooMatrix::new(nodes.len(), nodes.len());
    let mut lumped_mass = vec![0.0; nodes.len()];
    let mut skipped = 0;

    for element in elements {
        let conduction = match compute_element_conduction_matrix(element, nodes, conductivity) {
            Some(k) => k,
            None => {
                skipped += 1;
                continue;
            }
        };
        let area = compute_element_area(element, nodes);

        for (local_row, node_row) in element.nodes.iter().enumerate() {
            lumped_mass[*node_row] += area / 3.0;
            for (local_col, node_col) in element.nodes.iter().enumerate() {
                coo.push(*node_row, *node_col, conduction[(local_row, local_col)]);
            }
        }
    }

    for (i, mass) in lumped_mass.iter_mut().enumerate() {
        *mass = mass.max(MASS_FLOOR);
        coo.push(i, i, (1.0 + convection) * *mass);
    }

    if skipped > 0 {
        debug!("skipped {skipped} degenerate elements during assembly");
    }

    (CsrMatrix::from(&coo), lumped_mass)
}

struct AssembledSystem {
    matrix: CsrMatrix<f64>,
    lumped_mass: Vec<f64>,
}

/// Conduction backend that assembles a global system over the mesh and
/// solves one implicit step per call
#[derive(Default)]
pub struct StiffnessSolver {
    elements: Vec<Element>,
    system: Option<AssembledSystem>,
    last_strain: f64,
}

impl StiffnessSolver {
    pub fn new() -> StiffnessSolver {
        StiffnessSolver::default()
    }
}

impl StepSolver for StiffnessSolver {
    fn name(&self) -> &str {
        "matrix-assembly conduction"
    }

    fn prepare(&mut self, elements: &[Element]) -> Result<()> {
        self.elements = elements.to_vec();
        self.system = None;
        self.last_strain = 0.0;
        Ok(())
    }

    fn advance(&mut self, nodes: &mut [Node], strain: f64, material: &JsonValue) -> Result<()> {
        let params = JohnsonCookParams::from_json(material)?;

        if let Some(element) = self
            .elements
            .iter()
            .find(|e| e.nodes.iter().any(|&n| n >= nodes.len()))
        {
            return Err(EdgePredictError::Solver(format!(
                "element {} references a node outside the mesh",
                element.id
            )));
        }

        let system = match self.system.take() {
            Some(system) => system,
            None => {
                let (matrix, lumped_mass) =
                    build_system_matrix(nodes, &self.elements, params.conductivity, params.convection);
                AssembledSystem {
                    matrix,
                    lumped_mass,
                }
            }
        };

        let strain_increment = strain - self.last_strain;
        let weights = contact_weights(nodes, params.contact_length);

        // right-hand side M (theta_old + source), in excess over room temperature
        let current: Vec<f64> = nodes.iter().map(|n| n.temperature - params.room_temp).collect();
        let rhs: Vec<f64> = nodes
            .iter()
            .zip(&weights)
            .zip(&current)
            .zip(&system.lumped_mass)
            .map(|(((node, weight), theta), mass)| {
                let stress = params.flow_stress(strain, node.temperature);
                mass * (theta + weight * params.adiabatic_rise(stress, strain_increment))
            })
            .collect();

        let solution = run_conjugate_gradient(&system.matrix, &rhs, current)?;

        for ((node, theta), weight) in nodes.iter_mut().zip(solution).zip(&weights) {
            node.temperature = params.room_temp + theta;
            node.stress = weight * params.flow_stress(strain, node.temperature);
        }

        self.system = Some(system);
        self.last_strain = strain;

        ensure_finite(nodes)
    }
}
