//! Copy minimization as a 0/1 integer program.
//!
//! Two families of binary variables: coloring variables `x(n,c)` (node `n`
//! holds color `c`) and affinity variables `y(a,b)` (the affinity pair
//! `(a,b)` ends up with different colors, so a copy stays in the program).
//! For values `V`, affinity pairs `Q` with weights `w`, palette `C` and the
//! maximal interference cliques `K`:
//!
//! ```text
//! min  sum_{(a,b) in Q} w_ab * y_ab
//!
//!      sum_{c in allowed(n)} x_nc  =  1          n in V
//!      x_nc                        =  0          n in V, c not in allowed(n)
//!      sum_{n in K} x_nc          <=  1          K in cliques, c in C
//!      x_ac - x_bc - y_ab         <=  0          (a,b) in Q, c in C
//!      sum_{e in p} y_e           >=  1          p affinity path, interfering ends
//!      sum_{m in S} y_cm          >= |S| - 1     S interference clique in the
//!                                                affinity neighborhood of c
//! ```
//!
//! The last two constraint families are redundant for correctness but cut
//! off large parts of the fractional polytope, which is what makes the model
//! solvable in practice.

use indexmap::{IndexMap, IndexSet};
use tinyvec::TinyVec;

use crate::affinity::AffinityGraph;
use crate::node::Node;
use crate::problem::{
    ObjectiveSense, Problem, Relation, Solution, SolutionStatus, Solver, VarId, VarKind,
};
use crate::reg_class::RegClass;
use crate::routine::Routine;
use crate::utils::bitset::BitSet;
use crate::utils::interference_graph::InterferenceGraph;

/// Tolerance when reading near-binary solver output back as exact 0/1.
const EPSILON: f64 = 1e-9;

/// Recolors `routine` so that the total weighted cost of affinity pairs
/// ending up in different registers is minimal, while keeping the coloring
/// interference-safe. The existing coloring seeds the solver as a MIP start,
/// so the result never costs more than the input. Returns true iff the
/// solver proved its solution optimal.
pub fn solve_copy_minimization<I: InterferenceGraph, S: Solver>(
    routine: &mut Routine,
    class: &RegClass,
    interference: &I,
    affinities: &AffinityGraph,
    solver: &mut S,
) -> bool {
    if affinities.is_empty() {
        log::trace!("no affinity units, keeping the existing coloring");
        return true;
    }

    let mut coalescer = Coalescer::new(routine, class, interference, affinities);
    coalescer.build();

    let start = std::time::Instant::now();
    let solution = solver.solve(&coalescer.problem);
    log::debug!(
        "solved {} vars / {} constraints in {:?}: {:?}",
        coalescer.problem.var_count(),
        coalescer.problem.constraint_count(),
        start.elapsed(),
        solution.status
    );

    coalescer.apply(&solution);
    solution.status == SolutionStatus::Optimal
}

/// Wide nodes must start on a slot boundary; anything else is not
/// representable in this model.
fn has_aligned_slots(routine: &Routine, node: Node) -> bool {
    let req = routine.req(node);
    assert!(
        req.aligned || req.width == 1,
        "unaligned wide node {} is not representable",
        node
    );
    req.aligned && req.width > 1
}

fn canonical_pair(a: Node, b: Node) -> (u32, u32) {
    let (a, b) = (a.index() as u32, b.index() as u32);
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn canonical_indices(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

struct Coalescer<'a, I: InterferenceGraph> {
    routine: &'a mut Routine,
    class: &'a RegClass,
    interference: &'a I,
    affinities: &'a AffinityGraph,
    problem: Problem,
    /// x(node, color), dense: node-major, one slot per palette color.
    color_vars: Vec<VarId>,
    /// y(a, b), keyed by canonical (low, high) node index pair.
    affinity_vars: IndexMap<(u32, u32), VarId>,
}

impl<'a, I: InterferenceGraph> Coalescer<'a, I> {
    fn new(
        routine: &'a mut Routine,
        class: &'a RegClass,
        interference: &'a I,
        affinities: &'a AffinityGraph,
    ) -> Self {
        let slots = routine.node_count() * class.n_colors() as usize;
        Self {
            routine,
            class,
            interference,
            affinities,
            problem: Problem::new(ObjectiveSense::Minimize),
            color_vars: vec![VarId(0); slots],
            affinity_vars: IndexMap::new(),
        }
    }

    fn x_var(&self, node: Node, color: u32) -> VarId {
        self.color_vars[node.index() * self.class.n_colors() as usize + color as usize]
    }

    fn build(&mut self) {
        self.build_coloring_constraints();
        self.build_interference_constraints();
        self.build_affinity_constraints();
        self.build_clique_star_constraints();
        self.build_path_constraints();

        let bound = self
            .affinities
            .copy_cost_lower_bound(self.routine, self.class, self.interference)
            - self
                .affinities
                .fixed_copy_costs(self.routine, self.class, self.interference);
        self.problem.set_objective_lower_bound(bound);
        log::trace!("objective lower bound {}", bound);
    }

    /// Every node takes exactly one of its feasible colors; every other
    /// color of the palette is pinned to zero so later constraints can refer
    /// to any (node, color) pair uniformly. The current coloring becomes the
    /// MIP start.
    fn build_coloring_constraints(&mut self) {
        let n_colors = self.class.n_colors();

        for node in self.routine.nodes() {
            has_aligned_slots(self.routine, node);
            let allowed = self.routine.feasible_colors(node, self.class);
            let current = self.routine.color(node);

            let pick_one = self.problem.add_constraint(Relation::Equal, 1.0);
            for color in 0..n_colors {
                if !allowed.get(color as usize) {
                    continue;
                }
                let var = self.problem.add_var(VarKind::Binary, 0.0);
                self.problem.set_coefficient(pick_one, var, 1.0);
                self.problem
                    .set_start_value(var, if color == current { 1.0 } else { 0.0 });
                self.color_vars[node.index() * n_colors as usize + color as usize] = var;
            }

            for color in 0..n_colors {
                if allowed.get(color as usize) {
                    continue;
                }
                let var = self.problem.add_var(VarKind::Binary, 0.0);
                let pinned = self.problem.add_constraint(Relation::Equal, 0.0);
                self.problem.set_coefficient(pinned, var, 1.0);
                self.problem.set_start_value(var, 0.0);
                self.color_vars[node.index() * n_colors as usize + color as usize] = var;
            }
        }
    }

    /// Per maximal clique and allocatable color: at most one member holds
    /// it. A wide node's occupancy is tracked through its base slot, the
    /// only independently colorable one.
    fn build_interference_constraints(&mut self) {
        let routine = &*self.routine;
        let class = self.class;
        let n_colors = class.n_colors() as usize;
        let problem = &mut self.problem;
        let color_vars = &self.color_vars;

        self.interference.for_each_maximal_clique(|clique: &[Node]| {
            if clique.len() < 2 {
                return;
            }

            for color in class.allocatable_colors().iter_set_bits() {
                let color = color as u32;
                let cst = problem.add_constraint(Relation::LessEqual, 1.0);
                for &member in clique {
                    let alignment_offset = if has_aligned_slots(routine, member) {
                        color % routine.width(member)
                    } else {
                        0
                    };
                    let var =
                        color_vars[member.index() * n_colors + (color - alignment_offset) as usize];
                    problem.set_coefficient(cst, var, 1.0);
                }
            }
        });
    }

    /// One y variable per unit pair, tied to the color variables so that
    /// y(root,arg) = 1 whenever root and arg take different colors: for the
    /// color where root is active but arg is not, x_root - x_arg - y <= 0
    /// degenerates to 1 <= y.
    fn build_affinity_constraints(&mut self) {
        let affinities = self.affinities;

        for unit in affinities.units() {
            let root = unit.root;
            let root_color = self.routine.color(root);

            for &(arg, cost) in unit.members.iter() {
                let y = self.problem.add_var(VarKind::Binary, cost);
                let previous = self.affinity_vars.insert(canonical_pair(root, arg), y);
                assert!(
                    previous.is_none(),
                    "affinity pair ({}, {}) appears in more than one unit",
                    root,
                    arg
                );
                let violated = root_color != self.routine.color(arg);
                self.problem
                    .set_start_value(y, if violated { 1.0 } else { 0.0 });

                for color in self.class.allocatable_colors().iter_set_bits() {
                    let root_var = self.x_var(root, color as u32);
                    let arg_var = self.x_var(arg, color as u32);
                    let cst = self.problem.add_constraint(Relation::LessEqual, 0.0);
                    self.problem.set_coefficient(cst, root_var, 1.0);
                    self.problem.set_coefficient(cst, arg_var, -1.0);
                    self.problem.set_coefficient(cst, y, -1.0);
                }
            }
        }
    }

    /// Searches, per affinity node, for interference cliques among its
    /// affinity neighbors. At most one member of such a clique can share the
    /// center's color, so at least |clique| - 1 of the affinities must
    /// break. The neighborhood's interference edges are covered greedily
    /// with maximal cliques.
    fn build_clique_star_constraints(&mut self) {
        let affinities = self.affinities;
        let interference = self.interference;

        for center in affinities.affinity_nodes() {
            if self.routine.is_ignored(center) {
                continue;
            }

            let neighbors: TinyVec<[u32; 8]> = affinities
                .neighbors(center)
                .iter()
                .map(|&(neighbor, _)| neighbor)
                .filter(|&neighbor| !self.routine.is_ignored(neighbor))
                .map(|neighbor| neighbor.index() as u32)
                .collect();

            // All interference edges between the neighbors.
            let mut edges: IndexSet<(u32, u32)> = IndexSet::new();
            for (i, &a) in neighbors.iter().enumerate() {
                for &b in neighbors.iter().take(i) {
                    if interference.connected(
                        Node::from_index(a as usize),
                        Node::from_index(b as usize),
                    ) {
                        edges.insert(canonical_indices(a, b));
                    }
                }
            }

            // Cover them with maximal cliques, one constraint each.
            while let Some(&(a, b)) = edges.get_index(0) {
                let mut clique: TinyVec<[u32; 8]> = TinyVec::new();
                clique.push(a);
                clique.push(b);
                edges.swap_remove(&(a, b));

                loop {
                    let candidate = neighbors.iter().copied().find(|&cand| {
                        !clique.contains(&cand)
                            && clique
                                .iter()
                                .all(|&member| edges.contains(&canonical_indices(cand, member)))
                    });
                    let Some(cand) = candidate else { break };
                    for &member in clique.iter() {
                        edges.swap_remove(&canonical_indices(cand, member));
                    }
                    clique.push(cand);
                }

                let cst = self
                    .problem
                    .add_constraint(Relation::GreaterEqual, clique.len() as f64 - 1.0);
                for &member in clique.iter() {
                    let y = self.affinity_vars[&canonical_indices(center.index() as u32, member)];
                    self.problem.set_coefficient(cst, y, 1.0);
                }
            }
        }
    }

    /// Searches for simple paths of affinity edges whose two ends interfere
    /// while no interior pair does. The ends are forced apart, so at least
    /// one affinity edge along the path must break.
    fn build_path_constraints(&mut self) {
        let affinities = self.affinities;
        for start in affinities.affinity_nodes() {
            self.find_path_constraints(start);
        }
    }

    /// Depth-first path enumeration from `start`, on an explicit frame stack
    /// with an in-path bitset. Nodes already on the current path are never
    /// revisited; sibling branches may revisit freely.
    fn find_path_constraints(&mut self, start: Node) {
        let affinities = self.affinities;
        let interference = self.interference;

        if self.routine.is_ignored(start) {
            return;
        }

        let mut path: TinyVec<[u32; 16]> = TinyVec::new();
        path.push(start.index() as u32);
        let mut on_path = BitSet::with_capacity(self.routine.node_count());
        on_path.set(start.index());
        // (node, index of the next neighbor to try)
        let mut stack: Vec<(u32, usize)> = vec![(start.index() as u32, 0)];

        while let Some(&(node, next_index)) = stack.last() {
            let neighbors = affinities.neighbors(Node::from_index(node as usize));
            if next_index >= neighbors.len() {
                stack.pop();
                let done = path.pop().unwrap();
                on_path.clear(done as usize);
                continue;
            }
            stack.last_mut().unwrap().1 += 1;

            let cand = neighbors[next_index].0;

            // Do not walk backwards or in circles.
            if on_path.get(cand.index()) {
                continue;
            }
            if self.routine.is_ignored(cand) {
                continue;
            }

            // Interference with an interior node kills the branch.
            if path[1..]
                .iter()
                .any(|&interior| interference.connected(cand, Node::from_index(interior as usize)))
            {
                continue;
            }

            // Interference with the start terminates the path. A single
            // affinity edge back to the start is already covered by a
            // clique-star constraint, so only longer paths get their own.
            if interference.connected(cand, start) {
                if path.len() >= 2 {
                    let cst = self.problem.add_constraint(Relation::GreaterEqual, 1.0);
                    for pair in path.windows(2) {
                        let y = self.affinity_vars[&canonical_indices(pair[0], pair[1])];
                        self.problem.set_coefficient(cst, y, 1.0);
                    }
                    let y = self.affinity_vars
                        [&canonical_indices(*path.last().unwrap(), cand.index() as u32)];
                    self.problem.set_coefficient(cst, y, 1.0);
                }
                continue;
            }

            path.push(cand.index() as u32);
            on_path.set(cand.index());
            stack.push((cand.index() as u32, 0));
        }
    }

    /// Maps the 0/1 vector back onto the routine: a node's new color is the
    /// unique palette color whose variable came back at (numerically) one.
    fn apply(&mut self, solution: &Solution) {
        match solution.status {
            SolutionStatus::Optimal => {}
            SolutionStatus::Feasible => {
                log::warn!("solver stopped before proving optimality, applying the incumbent")
            }
            status => panic!("copy coalescing solution not feasible: {:?}", status),
        }
        debug_assert_eq!(solution.values.len(), self.problem.var_count());

        let n_colors = self.class.n_colors();
        for node in self.routine.nodes() {
            let mut new_color = None;
            for color in 0..n_colors {
                let value = solution.values[self.x_var(node, color).0 as usize];
                if value <= 1.0 - EPSILON {
                    continue;
                }
                assert!(
                    new_color.is_none(),
                    "{} came back with more than one active color",
                    node
                );
                new_color = Some(color);
            }
            match new_color {
                Some(color) => self.routine.set_color(node, color),
                None => panic!("{} came back with no active color", node),
            }
        }

        self.routine.verify_coloring(self.class, self.interference);
    }
}
