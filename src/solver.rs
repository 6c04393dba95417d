use json::JsonValue;
use log::debug;

use crate::{
    datatypes::{Element, Node},
    error::{EdgePredictError, Result},
};

/// Tool life reported when a backend has no model of its own, in minutes
pub const DEFAULT_TOOL_LIFE_ESTIMATE_MIN: f64 = 118.5;

/// Physics backend that updates node temperature and stress once per step.
///
/// The driver calls `advance` strictly sequentially and never while another
/// call is in flight.
pub trait StepSolver {
    fn name(&self) -> &str;

    /// Called once after the mesh is loaded, before the first step
    fn prepare(&mut self, _elements: &[Element]) -> Result<()> {
        Ok(())
    }

    /// Updates every node in place for the given accumulated strain
    ///
    /// # Arguments
    /// * `nodes` - The mesh nodes, mutated in place
    /// * `strain` - The accumulated strain, already advanced for this step
    /// * `material` - The Johnson-Cook bundle from the job description
    fn advance(&mut self, nodes: &mut [Node], strain: f64, material: &JsonValue) -> Result<()>;

    fn tool_life_estimate(&self) -> f64 {
        DEFAULT_TOOL_LIFE_ESTIMATE_MIN
    }
}

impl<S: StepSolver + ?Sized> StepSolver for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn prepare(&mut self, elements: &[Element]) -> Result<()> {
        (**self).prepare(elements)
    }

    fn advance(&mut self, nodes: &mut [Node], strain: f64, material: &JsonValue) -> Result<()> {
        (**self).advance(nodes, strain, material)
    }

    fn tool_life_estimate(&self) -> f64 {
        (**self).tool_life_estimate()
    }
}

/// Johnson-Cook constitutive constants plus the thermal properties the
/// built-in backends need
#[derive(Debug, Clone, PartialEq)]
pub struct JohnsonCookParams {
    /// Yield stress, MPa
    pub a: f64,
    /// Hardening modulus, MPa
    pub b: f64,
    pub n: f64,
    pub c: f64,
    pub m: f64,
    pub melt_temp: f64,
    pub room_temp: f64,
    pub strain_rate: f64,
    pub ref_strain_rate: f64,
    /// Fraction of plastic work converted to heat
    pub taylor_quinney: f64,
    /// Density times specific heat, MJ/(m^3 K)
    pub volumetric_heat_capacity: f64,
    /// Heat source decay length, as a fraction of tool height
    pub contact_length: f64,
    pub conductivity: f64,
    pub convection: f64,
}

fn required(bundle: &JsonValue, key: &str) -> Result<f64> {
    bundle[key]
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            EdgePredictError::Solver(format!(
                "johnson_cook_params missing numeric field '{key}'"
            ))
        })
}

fn optional(bundle: &JsonValue, key: &str, default: f64) -> Result<f64> {
    if bundle[key].is_null() {
        Ok(default)
    } else {
        required(bundle, key)
    }
}

impl JohnsonCookParams {
    /// Reads the parameter bundle
    ///
    /// # Arguments
    /// * `bundle` - The `johnson_cook_params` object of the job description
    pub fn from_json(bundle: &JsonValue) -> Result<JohnsonCookParams> {
        if !bundle.is_object() {
            return Err(EdgePredictError::Solver(
                "johnson_cook_params must be an object".to_owned(),
            ));
        }

        let params = JohnsonCookParams {
            a: required(bundle, "A")?,
            b: required(bundle, "B")?,
            n: required(bundle, "n")?,
            c: required(bundle, "C")?,
            m: required(bundle, "m")?,
            melt_temp: optional(bundle, "T_melt", 1500.0)?,
            room_temp: optional(bundle, "T_room", 25.0)?,
            strain_rate: optional(bundle, "strain_rate", 1.0)?,
            ref_strain_rate: optional(bundle, "ref_strain_rate", 1.0)?,
            taylor_quinney: optional(bundle, "taylor_quinney", 0.9)?,
            volumetric_heat_capacity: optional(bundle, "volumetric_heat_capacity", 3.5)?,
            contact_length: optional(bundle, "contact_length", 0.1)?,
            conductivity: optional(bundle, "conductivity", 0.05)?,
            convection: optional(bundle, "convection", 0.01)?,
        };

        if params.melt_temp <= params.room_temp {
            return Err(EdgePredictError::Solver(
                "T_melt must be greater than T_room".to_owned(),
            ));
        }
        if params.strain_rate <= 0.0 || params.ref_strain_rate <= 0.0 {
            return Err(EdgePredictError::Solver(
                "strain rates must be positive".to_owned(),
            ));
        }
        if params.volumetric_heat_capacity <= 0.0 {
            return Err(EdgePredictError::Solver(
                "volumetric_heat_capacity must be positive".to_owned(),
            ));
        }
        if params.conductivity < 0.0 || params.convection < 0.0 || params.contact_length < 0.0 {
            return Err(EdgePredictError::Solver(
                "conductivity, convection and contact_length must not be negative".to_owned(),
            ));
        }

        Ok(params)
    }

    /// T* of the thermal softening term, clamped to [0, 1]
    pub fn homologous_temperature(&self, temperature: f64) -> f64 {
        ((temperature - self.room_temp) / (self.melt_temp - self.room_temp)).clamp(0.0, 1.0)
    }

    /// Johnson-Cook flow stress in MPa
    pub fn flow_stress(&self, strain: f64, temperature: f64) -> f64 {
        let hardening = self.a + self.b * strain.max(0.0).powf(self.n);
        let rate = 1.0 + self.c * (self.strain_rate / self.ref_strain_rate).ln();
        let softening = 1.0 - self.homologous_temperature(temperature).powf(self.m);

        hardening * rate * softening
    }

    /// Temperature rise from plastic work with no heat loss
    pub fn adiabatic_rise(&self, flow_stress: f64, strain_increment: f64) -> f64 {
        self.taylor_quinney * flow_stress * strain_increment / self.volumetric_heat_capacity
    }
}

/// Weights each node by its distance above the lowest point of the tool,
/// where the cut is made
///
/// # Arguments
/// * `nodes` - The mesh nodes
/// * `contact_length` - Decay length as a fraction of tool height
pub fn contact_weights(nodes: &[Node], contact_length: f64) -> Vec<f64> {
    let (z_min, z_max) = nodes.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), n| {
        (lo.min(n.position.z), hi.max(n.position.z))
    });
    let decay = contact_length * (z_max - z_min);

    nodes
        .iter()
        .map(|n| {
            if decay > 0.0 {
                (-(n.position.z - z_min) / decay).exp()
            } else {
                1.0
            }
        })
        .collect()
}

/// Fails if the backend left a non-finite field on any node
pub fn ensure_finite(nodes: &[Node]) -> Result<()> {
    match nodes
        .iter()
        .find(|n| !n.temperature.is_finite() || !n.stress.is_finite())
    {
        Some(node) => Err(EdgePredictError::Solver(format!(
            "non-finite field at node {}",
            node.id
        ))),
        None => Ok(()),
    }
}

/// Node-local Johnson-Cook backend with adiabatic heating
#[derive(Debug, Default)]
pub struct JohnsonCookSolver {
    last_strain: f64,
}

impl JohnsonCookSolver {
    pub fn new() -> JohnsonCookSolver {
        JohnsonCookSolver::default()
    }
}

impl StepSolver for JohnsonCookSolver {
    fn name(&self) -> &str {
        "Johnson-Cook"
    }

    fn prepare(&mut self, _elements: &[Element]) -> Result<()> {
        self.last_strain = 0.0;
        Ok(())
    }

    fn advance(&mut self, nodes: &mut [Node], strain: f64, material: &JsonValue) -> Result<()> {
        let params = JohnsonCookParams::from_json(material)?;
        let strain_increment = strain - self.last_strain;
        let weights = contact_weights(nodes, params.contact_length);

        for (node, weight) in nodes.iter_mut().zip(weights) {
            let stress = params.flow_stress(strain, node.temperature);
            node.temperature += weight * params.adiabatic_rise(stress, strain_increment);
            node.stress = weight * params.flow_stress(strain, node.temperature);
        }

        self.last_strain = strain;
        debug!("advanced {} nodes to strain {strain:.3}", nodes.len());

        ensure_finite(nodes)
    }
}
