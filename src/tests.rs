use crate::affinity::AffinityGraph;
use crate::node::{Node, RegisterReq};
use crate::problem::{Problem, Solution, SolutionStatus, Solver};
use crate::reg_class::RegClass;
use crate::routine::Routine;
use crate::solve_copy_minimization::solve_copy_minimization;
use crate::utils::interference_graph::DenseInterferenceGraph;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Exact enumeration over the binary cube. Small models only, but it
/// returns provably optimal solutions, which is what the scenario tests
/// assert against. Also cross-checks that the installed objective lower
/// bound never exceeds the true optimum.
struct ExhaustiveSolver;

const TOLERANCE: f64 = 1e-9;

impl Solver for ExhaustiveSolver {
    fn solve(&mut self, problem: &Problem) -> Solution {
        let n = problem.var_count();
        assert!(n <= 20, "exhaustive solver is for small models only");

        let mut best: Option<(f64, Vec<f64>)> = None;
        for assignment in 0u64..1 << n {
            let values: Vec<f64> = (0..n).map(|i| ((assignment >> i) & 1) as f64).collect();
            if !problem.is_feasible(&values, TOLERANCE) {
                continue;
            }
            let objective = problem.objective_value(&values);
            if best
                .as_ref()
                .map_or(true, |(incumbent, _)| objective < incumbent - TOLERANCE)
            {
                best = Some((objective, values));
            }
        }

        match best {
            None => Solution {
                status: SolutionStatus::Infeasible,
                values: vec![0.0; n],
            },
            Some((objective, values)) => {
                if let Some(bound) = problem.objective_lower_bound() {
                    assert!(
                        bound <= objective + TOLERANCE,
                        "lower bound {} exceeds the optimum {}",
                        bound,
                        objective
                    );
                }
                Solution {
                    status: SolutionStatus::Optimal,
                    values,
                }
            }
        }
    }
}

/// Downgrades every proven optimum to a mere incumbent.
struct TimedOutSolver(ExhaustiveSolver);

impl Solver for TimedOutSolver {
    fn solve(&mut self, problem: &Problem) -> Solution {
        let mut solution = self.0.solve(problem);
        if solution.status == SolutionStatus::Optimal {
            solution.status = SolutionStatus::Feasible;
        }
        solution
    }
}

struct UnreachableSolver;

impl Solver for UnreachableSolver {
    fn solve(&mut self, _problem: &Problem) -> Solution {
        unreachable!("the solver must not run when there is nothing to coalesce");
    }
}

fn add_scalars(routine: &mut Routine, colors: &[u32]) -> Vec<Node> {
    colors
        .iter()
        .map(|&color| routine.add_node(RegisterReq::scalar(), color))
        .collect()
}

#[test]
fn test_forced_copy_between_interfering_pair() {
    init_logging();

    let class = RegClass::new(2);
    let mut routine = Routine::new();
    let n = add_scalars(&mut routine, &[0, 1]);

    let mut interference = DenseInterferenceGraph::new(2);
    interference.add_edge(n[0], n[1]);

    let mut affinities = AffinityGraph::new(2);
    affinities.add_unit(n[0], vec![(n[1], 5.0)]);

    let optimal = solve_copy_minimization(
        &mut routine,
        &class,
        &interference,
        &affinities,
        &mut ExhaustiveSolver,
    );

    // The pair interferes, so the copy is unavoidable.
    assert!(optimal);
    assert_ne!(routine.color(n[0]), routine.color(n[1]));
    assert_eq!(affinities.mismatch_cost(&routine), 5.0);
}

#[test]
fn test_affinity_chain_collapses_to_one_color() {
    init_logging();

    let class = RegClass::new(2);
    let mut routine = Routine::new();
    let n = add_scalars(&mut routine, &[0, 1, 0]);

    let interference = DenseInterferenceGraph::new(3);

    let mut affinities = AffinityGraph::new(3);
    affinities.add_unit(n[0], vec![(n[1], 3.0)]);
    affinities.add_unit(n[1], vec![(n[2], 4.0)]);

    let optimal = solve_copy_minimization(
        &mut routine,
        &class,
        &interference,
        &affinities,
        &mut ExhaustiveSolver,
    );

    assert!(optimal);
    assert_eq!(routine.color(n[0]), routine.color(n[1]));
    assert_eq!(routine.color(n[1]), routine.color(n[2]));
    assert_eq!(affinities.mismatch_cost(&routine), 0.0);
}

#[test]
fn test_clique_star_keeps_cheapest_two_copies() {
    init_logging();

    // A 3-clique needs all three colors; the external node can match at
    // most one member, so the two cheapest affinities must break.
    let class = RegClass::new(3);
    let mut routine = Routine::new();
    let n = add_scalars(&mut routine, &[0, 1, 2, 0]);

    let mut interference = DenseInterferenceGraph::new(4);
    interference.add_edge(n[0], n[1]);
    interference.add_edge(n[1], n[2]);
    interference.add_edge(n[0], n[2]);

    let mut affinities = AffinityGraph::new(4);
    affinities.add_unit(n[3], vec![(n[0], 1.0), (n[1], 2.0), (n[2], 4.0)]);

    let optimal = solve_copy_minimization(
        &mut routine,
        &class,
        &interference,
        &affinities,
        &mut ExhaustiveSolver,
    );

    assert!(optimal);
    assert_eq!(affinities.mismatch_cost(&routine), 3.0);
    assert_eq!(routine.color(n[3]), routine.color(n[2]));
    assert_ne!(routine.color(n[0]), routine.color(n[1]));
    assert_ne!(routine.color(n[1]), routine.color(n[2]));
    assert_ne!(routine.color(n[0]), routine.color(n[2]));
}

#[test]
fn test_path_breaks_cheaper_edge() {
    init_logging();

    // a - b - c affinity chain, a and c interfere, b interferes with
    // neither: one of the two chain edges must break, the cheaper one wins.
    let class = RegClass::new(2);
    let mut routine = Routine::new();
    let n = add_scalars(&mut routine, &[0, 0, 1]);

    let mut interference = DenseInterferenceGraph::new(3);
    interference.add_edge(n[0], n[2]);

    let mut affinities = AffinityGraph::new(3);
    affinities.add_unit(n[0], vec![(n[1], 2.0)]);
    affinities.add_unit(n[1], vec![(n[2], 7.0)]);

    let optimal = solve_copy_minimization(
        &mut routine,
        &class,
        &interference,
        &affinities,
        &mut ExhaustiveSolver,
    );

    assert!(optimal);
    assert_eq!(affinities.mismatch_cost(&routine), 2.0);
    assert_eq!(routine.color(n[1]), routine.color(n[2]));
    assert_ne!(routine.color(n[0]), routine.color(n[2]));
}

#[test]
fn test_wide_node_stays_aligned() {
    init_logging();

    // One double-width value and two scalars that both interfere with it.
    // The scalars coalesce onto one of the slots the wide value leaves free.
    let class = RegClass::new(4);
    let mut routine = Routine::new();
    let wide = routine.add_node(RegisterReq::wide(2), 0);
    let s = routine.add_node(RegisterReq::scalar(), 2);
    let t = routine.add_node(RegisterReq::scalar(), 3);

    let mut interference = DenseInterferenceGraph::new(3);
    interference.add_edge(wide, s);
    interference.add_edge(wide, t);

    let mut affinities = AffinityGraph::new(3);
    affinities.add_unit(s, vec![(t, 5.0)]);

    let optimal = solve_copy_minimization(
        &mut routine,
        &class,
        &interference,
        &affinities,
        &mut ExhaustiveSolver,
    );

    assert!(optimal);
    assert_eq!(affinities.mismatch_cost(&routine), 0.0);
    assert_eq!(routine.color(s), routine.color(t));
    assert_eq!(routine.color(wide) % 2, 0);
    let occupied = routine.color(wide)..routine.color(wide) + 2;
    assert!(!occupied.contains(&routine.color(s)));
}

#[test]
fn test_limited_node_pulls_partner_onto_its_color() {
    init_logging();

    let class = RegClass::new(2);
    let mut routine = Routine::new();
    let pinned = routine.add_node(
        RegisterReq::scalar().with_limited([1].into_iter().collect()),
        1,
    );
    let free = routine.add_node(RegisterReq::scalar(), 0);

    let interference = DenseInterferenceGraph::new(2);

    let mut affinities = AffinityGraph::new(2);
    affinities.add_unit(pinned, vec![(free, 3.0)]);

    let optimal = solve_copy_minimization(
        &mut routine,
        &class,
        &interference,
        &affinities,
        &mut ExhaustiveSolver,
    );

    assert!(optimal);
    assert_eq!(routine.color(pinned), 1);
    assert_eq!(routine.color(free), 1);
}

#[test]
fn test_never_worse_than_input_and_idempotent() {
    init_logging();

    let class = RegClass::new(2);
    let mut routine = Routine::new();
    let n = add_scalars(&mut routine, &[0, 1, 1, 0, 1]);

    let mut interference = DenseInterferenceGraph::new(5);
    interference.add_edge(n[0], n[1]);
    interference.add_edge(n[2], n[3]);

    let mut affinities = AffinityGraph::new(5);
    affinities.add_unit(n[0], vec![(n[2], 2.0), (n[4], 1.5)]);
    affinities.add_unit(n[1], vec![(n[3], 1.0)]);

    let before = affinities.mismatch_cost(&routine);
    let optimal = solve_copy_minimization(
        &mut routine,
        &class,
        &interference,
        &affinities,
        &mut ExhaustiveSolver,
    );
    let after = affinities.mismatch_cost(&routine);

    assert!(optimal);
    assert!(after <= before);
    assert_eq!(after, 0.0);

    // Solving again from the already-optimal coloring changes nothing.
    let colors: Vec<u32> = routine.nodes().map(|node| routine.color(node)).collect();
    let optimal = solve_copy_minimization(
        &mut routine,
        &class,
        &interference,
        &affinities,
        &mut ExhaustiveSolver,
    );
    assert!(optimal);
    assert_eq!(affinities.mismatch_cost(&routine), after);
    let recolored: Vec<u32> = routine.nodes().map(|node| routine.color(node)).collect();
    assert_eq!(colors, recolored);
}

#[test]
fn test_non_allocatable_color_is_never_assigned() {
    init_logging();

    let mut class = RegClass::new(3);
    class.mark_non_allocatable(0);

    let mut routine = Routine::new();
    let n = add_scalars(&mut routine, &[1, 2]);

    let interference = DenseInterferenceGraph::new(2);

    let mut affinities = AffinityGraph::new(2);
    affinities.add_unit(n[0], vec![(n[1], 2.0)]);

    let optimal = solve_copy_minimization(
        &mut routine,
        &class,
        &interference,
        &affinities,
        &mut ExhaustiveSolver,
    );

    assert!(optimal);
    assert_eq!(routine.color(n[0]), routine.color(n[1]));
    assert_ne!(routine.color(n[0]), 0);
}

#[test]
fn test_nothing_to_coalesce_keeps_coloring() {
    init_logging();

    let class = RegClass::new(2);
    let mut routine = Routine::new();
    let n = add_scalars(&mut routine, &[0, 1]);

    let mut interference = DenseInterferenceGraph::new(2);
    interference.add_edge(n[0], n[1]);

    let affinities = AffinityGraph::new(2);

    let optimal = solve_copy_minimization(
        &mut routine,
        &class,
        &interference,
        &affinities,
        &mut UnreachableSolver,
    );

    assert!(optimal);
    assert_eq!(routine.color(n[0]), 0);
    assert_eq!(routine.color(n[1]), 1);
}

#[test]
fn test_incumbent_without_proof_still_applies() {
    init_logging();

    let class = RegClass::new(2);
    let mut routine = Routine::new();
    let n = add_scalars(&mut routine, &[0, 1, 0]);

    let interference = DenseInterferenceGraph::new(3);

    let mut affinities = AffinityGraph::new(3);
    affinities.add_unit(n[0], vec![(n[1], 3.0)]);
    affinities.add_unit(n[1], vec![(n[2], 4.0)]);

    let optimal = solve_copy_minimization(
        &mut routine,
        &class,
        &interference,
        &affinities,
        &mut TimedOutSolver(ExhaustiveSolver),
    );

    assert!(!optimal);
    assert_eq!(affinities.mismatch_cost(&routine), 0.0);
}

#[test]
#[should_panic(expected = "not feasible")]
fn test_unsolvable_model_is_fatal() {
    let class = RegClass::new(2);
    let mut routine = Routine::new();
    let limited: crate::utils::bitset::BitSet = [0].into_iter().collect();
    let a = routine.add_node(RegisterReq::scalar().with_limited(limited.clone()), 0);
    let b = routine.add_node(RegisterReq::scalar().with_limited(limited), 0);

    let mut interference = DenseInterferenceGraph::new(2);
    interference.add_edge(a, b);

    let mut affinities = AffinityGraph::new(2);
    affinities.add_unit(a, vec![(b, 1.0)]);

    solve_copy_minimization(
        &mut routine,
        &class,
        &interference,
        &affinities,
        &mut ExhaustiveSolver,
    );
}

#[test]
#[should_panic(expected = "unaligned wide node")]
fn test_unaligned_wide_node_rejected() {
    let class = RegClass::new(4);
    let mut routine = Routine::new();
    let bad = routine.add_node(
        RegisterReq {
            width: 2,
            aligned: false,
            limited: None,
        },
        0,
    );
    let other = routine.add_node(RegisterReq::scalar(), 2);

    let interference = DenseInterferenceGraph::new(2);

    let mut affinities = AffinityGraph::new(2);
    affinities.add_unit(bad, vec![(other, 1.0)]);

    solve_copy_minimization(
        &mut routine,
        &class,
        &interference,
        &affinities,
        &mut ExhaustiveSolver,
    );
}
