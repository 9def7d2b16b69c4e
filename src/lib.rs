//! # copymin
//!
//! Optimal copy coalescing for graph-coloring register allocators. The
//! input is a routine whose values already carry a feasible coloring, an
//! interference graph over those values, and an affinity graph of value
//! pairs that save a copy instruction when they share a register. The crate
//! encodes the recoloring problem as a 0/1 integer linear program, hands it
//! to an external MIP engine behind the [`problem::Solver`] trait, and maps
//! the solution back onto the routine. The result is interference-safe and
//! minimizes the total weighted cost of the affinity pairs left in
//! different registers.
//!
//! The problem is NP-hard; what makes the model practical are two
//! strengthening constraint families generated by graph search, clique-star
//! constraints over each node's affinity neighborhood and path constraints
//! over affinity chains with interfering endpoints. See
//! [`mod@solve_copy_minimization`] for the formulation.
//!
//! Interference/liveness construction, the heuristic allocator that
//! produced the input coloring, spilling, and the MIP engine itself are all
//! out of scope here and live with the caller.

pub mod affinity;
pub mod node;
pub mod problem;
pub mod reg_class;
pub mod routine;
pub mod solve_copy_minimization;
pub mod utils;

pub use solve_copy_minimization::solve_copy_minimization;

#[cfg(test)]
mod tests;
