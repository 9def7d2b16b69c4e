use crate::node::{Node, RegisterReq};
use crate::reg_class::RegClass;
use crate::utils::bitset::BitSet;
use crate::utils::interference_graph::InterferenceGraph;

/// One allocation problem: the values of a single routine competing for one
/// register class, together with the feasible coloring a heuristic allocator
/// already produced. The color table is the only state the coalescer ever
/// mutates; everything else is read-only input.
pub struct Routine {
    reqs: Vec<RegisterReq>,
    colors: Vec<u32>,
    ignored: BitSet,
}

impl Routine {
    pub fn new() -> Self {
        Self {
            reqs: Vec::new(),
            colors: Vec::new(),
            ignored: BitSet::new(),
        }
    }

    pub fn add_node(&mut self, req: RegisterReq, color: u32) -> Node {
        debug_assert!(req.width >= 1);
        let node = Node::from_index(self.reqs.len());
        self.reqs.push(req);
        self.colors.push(color);
        node
    }

    pub fn node_count(&self) -> usize {
        self.reqs.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = Node> {
        (0..self.reqs.len()).map(Node::from_index)
    }

    pub fn req(&self, node: Node) -> &RegisterReq {
        &self.reqs[node.index()]
    }

    pub fn width(&self, node: Node) -> u32 {
        self.reqs[node.index()].width
    }

    pub fn color(&self, node: Node) -> u32 {
        self.colors[node.index()]
    }

    pub fn set_color(&mut self, node: Node, color: u32) {
        self.colors[node.index()] = color;
    }

    /// Ignored nodes keep their color variables but are never routed through
    /// clique-star or path constraints.
    pub fn set_ignored(&mut self, node: Node) {
        self.ignored.set(node.index());
    }

    pub fn is_ignored(&self, node: Node) -> bool {
        self.ignored.get(node.index())
    }

    /// The colors this node may actually take: its limited set if it has
    /// one, the class's allocatable set otherwise, restricted to aligned
    /// base slots for wide nodes.
    pub fn feasible_colors(&self, node: Node, class: &RegClass) -> BitSet {
        let req = &self.reqs[node.index()];
        let mut colors = match &req.limited {
            Some(limited) => limited.clone(),
            None => class.allocatable_colors().clone(),
        };
        if req.aligned && req.width > 1 {
            for color in 0..class.n_colors() {
                if color % req.width != 0 {
                    colors.clear(color as usize);
                }
            }
        }
        colors
    }

    /// Re-checks the invariants the coalescer must preserve: every node sits
    /// on a feasible, aligned color, and no allocatable slot is occupied by
    /// two members of any interference clique (wide nodes occupy
    /// `color..color + width`). Panics on any violation.
    pub fn verify_coloring<I: InterferenceGraph>(&self, class: &RegClass, interference: &I) {
        for node in self.nodes() {
            let color = self.color(node);
            let feasible = self.feasible_colors(node, class);
            if !feasible.get(color as usize) {
                panic!("{} was assigned color {}, outside its feasible set", node, color);
            }
        }

        interference.for_each_maximal_clique(|clique: &[Node]| {
            for color in class.allocatable_colors().iter_set_bits() {
                let color = color as u32;
                let occupants = clique
                    .iter()
                    .filter(|&&member| {
                        let base = self.color(member);
                        base <= color && color < base + self.width(member)
                    })
                    .count();
                if occupants > 1 {
                    panic!(
                        "color {} is held by {} members of an interference clique",
                        color, occupants
                    );
                }
            }
        });
    }
}

impl Default for Routine {
    fn default() -> Self {
        Self::new()
    }
}
