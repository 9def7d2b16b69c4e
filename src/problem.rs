//! The ILP instance handed to the external solving engine: binary decision
//! variables with objective coefficients and MIP-start values, linear
//! constraints, and an optional objective lower bound. The engine itself is
//! a black box behind the `Solver` trait; `write_lp` serializes the model in
//! CPLEX-LP text form for out-of-process solvers and debugging.

use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Binary,
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    LessEqual,
    Equal,
    GreaterEqual,
}

impl Relation {
    fn lp_symbol(self) -> &'static str {
        match self {
            Relation::LessEqual => "<=",
            Relation::Equal => "=",
            Relation::GreaterEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveSense {
    Minimize,
    Maximize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionStatus {
    Optimal,
    /// The incumbent is feasible but the engine could not prove optimality.
    Feasible,
    Infeasible,
    Unbounded,
    Unknown,
}

struct Var {
    kind: VarKind,
    obj_coefficient: f64,
    start_value: Option<f64>,
}

struct Constraint {
    relation: Relation,
    rhs: f64,
    terms: Vec<(VarId, f64)>,
}

pub struct Problem {
    sense: ObjectiveSense,
    vars: Vec<Var>,
    constraints: Vec<Constraint>,
    objective_lower_bound: Option<f64>,
}

impl Problem {
    pub fn new(sense: ObjectiveSense) -> Self {
        Self {
            sense,
            vars: Vec::new(),
            constraints: Vec::new(),
            objective_lower_bound: None,
        }
    }

    pub fn add_var(&mut self, kind: VarKind, obj_coefficient: f64) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(Var {
            kind,
            obj_coefficient,
            start_value: None,
        });
        id
    }

    pub fn add_constraint(&mut self, relation: Relation, rhs: f64) -> ConstraintId {
        let id = ConstraintId(self.constraints.len() as u32);
        self.constraints.push(Constraint {
            relation,
            rhs,
            terms: Vec::new(),
        });
        id
    }

    pub fn set_coefficient(&mut self, constraint: ConstraintId, var: VarId, value: f64) {
        debug_assert!((var.0 as usize) < self.vars.len());
        self.constraints[constraint.0 as usize].terms.push((var, value));
    }

    /// Seeds the engine with a known-feasible value for `var`.
    pub fn set_start_value(&mut self, var: VarId, value: f64) {
        self.vars[var.0 as usize].start_value = Some(value);
    }

    pub fn set_objective_lower_bound(&mut self, bound: f64) {
        self.objective_lower_bound = Some(bound);
    }

    pub fn sense(&self) -> ObjectiveSense {
        self.sense
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn var_kind(&self, var: VarId) -> VarKind {
        self.vars[var.0 as usize].kind
    }

    pub fn obj_coefficient(&self, var: VarId) -> f64 {
        self.vars[var.0 as usize].obj_coefficient
    }

    pub fn start_value(&self, var: VarId) -> Option<f64> {
        self.vars[var.0 as usize].start_value
    }

    pub fn objective_lower_bound(&self) -> Option<f64> {
        self.objective_lower_bound
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        debug_assert_eq!(values.len(), self.vars.len());
        self.vars
            .iter()
            .zip(values.iter())
            .map(|(var, value)| var.obj_coefficient * value)
            .sum()
    }

    /// True iff `values` satisfies every constraint up to `tolerance`.
    pub fn is_feasible(&self, values: &[f64], tolerance: f64) -> bool {
        self.constraints.iter().all(|constraint| {
            let lhs: f64 = constraint
                .terms
                .iter()
                .map(|&(var, coefficient)| coefficient * values[var.0 as usize])
                .sum();
            match constraint.relation {
                Relation::LessEqual => lhs <= constraint.rhs + tolerance,
                Relation::Equal => (lhs - constraint.rhs).abs() <= tolerance,
                Relation::GreaterEqual => lhs >= constraint.rhs - tolerance,
            }
        })
    }

    /// Serializes the model in CPLEX-LP format with synthesized `v{i}` and
    /// `c{i}` names.
    pub fn write_lp<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        match self.sense {
            ObjectiveSense::Minimize => writeln!(out, "Minimize")?,
            ObjectiveSense::Maximize => writeln!(out, "Maximize")?,
        }
        write!(out, " obj:")?;
        for (i, var) in self.vars.iter().enumerate() {
            if var.obj_coefficient != 0.0 {
                write!(out, " {:+} v{}", var.obj_coefficient, i)?;
            }
        }
        writeln!(out)?;

        writeln!(out, "Subject To")?;
        for (i, constraint) in self.constraints.iter().enumerate() {
            write!(out, " c{}:", i)?;
            for &(var, coefficient) in constraint.terms.iter() {
                write!(out, " {:+} v{}", coefficient, var.0)?;
            }
            writeln!(out, " {} {}", constraint.relation.lp_symbol(), constraint.rhs)?;
        }

        let binaries: Vec<usize> = self
            .vars
            .iter()
            .enumerate()
            .filter(|(_, var)| var.kind == VarKind::Binary)
            .map(|(i, _)| i)
            .collect();
        if !binaries.is_empty() {
            writeln!(out, "Binaries")?;
            write!(out, " ")?;
            for i in binaries {
                write!(out, " v{}", i)?;
            }
            writeln!(out)?;
        }
        writeln!(out, "End")
    }
}

/// A solution vector as returned by the engine, indexed by `VarId`.
pub struct Solution {
    pub status: SolutionStatus,
    pub values: Vec<f64>,
}

/// The external MIP engine. Implementations wrap whatever actually solves
/// the model — an in-process library, or a subprocess fed by `write_lp`.
pub trait Solver {
    fn solve(&mut self, problem: &Problem) -> Solution;
}
