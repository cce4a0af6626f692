//! `armbridge-kinematics` – boundary to the external inverse-kinematics solver.
//!
//! The solver itself lives outside this workspace.  This crate only moves a
//! batch of physical points across the boundary and brings the joint angles
//! back, keeping row *i* of the output bound to row *i* of the input.
//!
//! # Modules
//!
//! - [`solver`] – the [`KinematicsSolver`][solver::KinematicsSolver] trait and
//!   its out-of-process backends ([`CommandSolver`][solver::CommandSolver],
//!   [`HttpSolver`][solver::HttpSolver]).
//! - [`gateway`] – [`KinematicsGateway`][gateway::KinematicsGateway]: reads
//!   `physical_coordinates`, calls the solver once, validates the result and
//!   replaces `joint_angles`.

pub mod gateway;
pub mod solver;

pub use gateway::{GatewayReport, KinematicsGateway};
pub use solver::{CommandSolver, HttpSolver, KinematicsSolver, SolverConfig, SolverError};
