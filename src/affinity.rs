use crate::node::Node;
use crate::reg_class::RegClass;
use crate::routine::Routine;
use crate::utils::interference_graph::InterferenceGraph;

/// One optimization unit: a root value and the arguments that would like to
/// share its color — all arguments of a phi together with its result, the
/// tied operands of a two-address instruction, a call argument and the value
/// it is copied from. Each member carries the copy cost saved when it ends
/// up colored like the root.
pub struct OptUnit {
    pub root: Node,
    pub members: Vec<(Node, f64)>,
}

/// The affinity graph over one routine: the optimization units plus the
/// symmetric neighbor adjacency derived from them. Immutable while a model
/// is being built.
pub struct AffinityGraph {
    units: Vec<OptUnit>,
    neighbors: Vec<Vec<(Node, f64)>>,
}

impl AffinityGraph {
    pub fn new(node_count: usize) -> Self {
        Self {
            units: Vec::new(),
            neighbors: vec![Vec::new(); node_count],
        }
    }

    pub fn add_unit(&mut self, root: Node, members: Vec<(Node, f64)>) {
        for &(member, cost) in members.iter() {
            debug_assert!(member != root);
            debug_assert!(cost > 0.0);
            self.neighbors[root.index()].push((member, cost));
            self.neighbors[member.index()].push((root, cost));
        }
        self.units.push(OptUnit { root, members });
    }

    pub fn units(&self) -> &[OptUnit] {
        &self.units
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn neighbors(&self, node: Node) -> &[(Node, f64)] {
        &self.neighbors[node.index()]
    }

    pub fn has_affinities(&self, node: Node) -> bool {
        !self.neighbors[node.index()].is_empty()
    }

    /// Every node that participates in at least one affinity relation.
    pub fn affinity_nodes(&self) -> impl Iterator<Item = Node> + '_ {
        self.neighbors
            .iter()
            .enumerate()
            .filter(|(_, neighbors)| !neighbors.is_empty())
            .map(|(index, _)| Node::from_index(index))
    }

    /// Total cost of the affinity relations violated by the routine's
    /// current coloring.
    pub fn mismatch_cost(&self, routine: &Routine) -> f64 {
        self.units
            .iter()
            .flat_map(|unit| {
                unit.members
                    .iter()
                    .filter(|&&(member, _)| routine.color(member) != routine.color(unit.root))
                    .map(|&(_, cost)| cost)
            })
            .sum()
    }

    /// A combinatorial lower bound on the total copy cost: the cost of every
    /// unit pair that can never share a color, because its endpoints
    /// interfere or because their feasible color sets are disjoint.
    pub fn copy_cost_lower_bound<I: InterferenceGraph>(
        &self,
        routine: &Routine,
        class: &RegClass,
        interference: &I,
    ) -> f64 {
        self.doomed_pair_costs(routine, class, interference, false)
    }

    /// The part of the lower bound that was already decided before this pass
    /// ran: pairs whose endpoints are both pinned to single, distinct colors.
    pub fn fixed_copy_costs<I: InterferenceGraph>(
        &self,
        routine: &Routine,
        class: &RegClass,
        interference: &I,
    ) -> f64 {
        self.doomed_pair_costs(routine, class, interference, true)
    }

    fn doomed_pair_costs<I: InterferenceGraph>(
        &self,
        routine: &Routine,
        class: &RegClass,
        interference: &I,
        pinned_only: bool,
    ) -> f64 {
        let mut total = 0.0;
        for unit in self.units.iter() {
            let root_colors = routine.feasible_colors(unit.root, class);
            for &(member, cost) in unit.members.iter() {
                let member_colors = routine.feasible_colors(member, class);
                let doomed = interference.connected(unit.root, member)
                    || !root_colors.intersects(&member_colors);
                if !doomed {
                    continue;
                }
                if pinned_only
                    && (root_colors.count_ones() != 1 || member_colors.count_ones() != 1)
                {
                    continue;
                }
                total += cost;
            }
        }
        total
    }
}
