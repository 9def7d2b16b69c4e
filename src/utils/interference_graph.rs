//! The interference graph as the coalescer sees it. Conceptually a set of
//! node pairs that must not share a register, exposed through exactly two
//! operations: a pair membership test and maximal-clique enumeration.
//! `DenseInterferenceGraph` is the provided implementation, one adjacency
//! bitset row per node; liveness-driven construction lives with the caller.

use crate::node::Node;
use crate::utils::bitset::BitSet;

pub trait InterferenceGraph {
    fn connected(&self, a: Node, b: Node) -> bool;

    /// Calls `f` once per maximal clique, singletons included; callers that
    /// only care about real interference filter on size themselves.
    fn for_each_maximal_clique<F: FnMut(&[Node])>(&self, f: F);
}

pub struct DenseInterferenceGraph {
    rows: Vec<BitSet>,
}

impl DenseInterferenceGraph {
    pub fn new(node_count: usize) -> Self {
        Self {
            rows: vec![BitSet::with_capacity(node_count); node_count],
        }
    }

    pub fn node_count(&self) -> usize {
        self.rows.len()
    }

    pub fn add_edge(&mut self, a: Node, b: Node) {
        if a == b {
            return;
        }
        self.rows[a.index()].set(b.index());
        self.rows[b.index()].set(a.index());
    }

    fn bron_kerbosch<F: FnMut(&[Node])>(
        &self,
        clique: &mut Vec<Node>,
        mut candidates: BitSet,
        mut excluded: BitSet,
        f: &mut F,
    ) {
        if candidates.is_empty() && excluded.is_empty() {
            f(clique);
            return;
        }

        // Branch only on candidates outside the pivot's neighborhood.
        let pivot = candidates
            .first_set()
            .or_else(|| excluded.first_set())
            .unwrap();
        let mut branch = candidates.clone();
        branch.remove_all(&self.rows[pivot]);

        for v in branch.iter_set_bits() {
            let row = &self.rows[v];
            let mut next_candidates = candidates.clone();
            next_candidates.intersect_with(row);
            let mut next_excluded = excluded.clone();
            next_excluded.intersect_with(row);

            clique.push(Node::from_index(v));
            self.bron_kerbosch(clique, next_candidates, next_excluded, f);
            clique.pop();

            candidates.clear(v);
            excluded.set(v);
        }
    }
}

impl InterferenceGraph for DenseInterferenceGraph {
    fn connected(&self, a: Node, b: Node) -> bool {
        self.rows[a.index()].get(b.index())
    }

    fn for_each_maximal_clique<F: FnMut(&[Node])>(&self, mut f: F) {
        if self.rows.is_empty() {
            return;
        }
        let candidates: BitSet = (0..self.rows.len()).collect();
        let mut clique = Vec::new();
        self.bron_kerbosch(&mut clique, candidates, BitSet::new(), &mut f);
    }
}
