//! Cutting tool thermal and stress simulation driven from an STL mesh.
//!
//! The pipeline reads a triangle soup ([`stl`]), welds it into a shared-vertex
//! mesh ([`mesher`]), then advances a strain state over a fixed number of steps
//! while a pluggable [`solver::StepSolver`] updates node temperature and stress
//! ([`simulation`]). Results are written as a JSON report ([`post_processor`]).

pub mod datatypes;
pub mod error;
pub mod input;
pub mod mesher;
pub mod post_processor;
pub mod simulation;
pub mod solver;
pub mod stiffness;
pub mod stl;

pub use error::{EdgePredictError, Result};
