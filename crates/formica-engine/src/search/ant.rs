//! Ant rollouts: stochastic root-to-leaf walks that reinforce game-tree
//! edges with sugar (credit for White) and toxin (credit for Black).
//!
//! A rollout descends by sampling edges, stops at the first unvisited edge
//! (or a terminal/loop), scores the leaf with the evaluator, and credits the
//! difference against the alpha-beta engine's current assessment back along
//! the path. Rollouts that improve on the assessment deposit pheromone for
//! the root side, rollouts that fall short deposit for the opponent: the
//! colony hunts for moves alpha-beta underestimates rather than competing
//! with it.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use formica_core::{Board, Color, Move, generate_legal_moves};

use crate::eval::evaluate;
use crate::search::alphabeta::AlphaBetaEngine;
use crate::search::ordering::score_move;
use crate::search::tree::{GameTree, MAX_EDGES, NodeGuard};

/// Maximum rollout length in plies.
pub const MAX_PATH: usize = 64;

/// Rollout iterations between alpha-beta-guided ants.
pub(crate) const GUIDED_PERIOD: u32 = 128;

/// Rollout iterations between greedy (max-probability) ants.
pub(crate) const GREEDY_PERIOD: u32 = 128;

/// Leaf score magnitude for mates, shrunk by distance.
const ANT_MATE: f32 = 200_000.0;

/// Score penalty for rollouts ending in stalemate or a repetition loop.
const STALL_PENALTY: f32 = 500.0;

/// How a rollout picks edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AntMode {
    /// Sample proportionally to edge weight.
    Random,
    /// Follow the alpha-beta principal variation while it lasts.
    Guided,
    /// Always take the highest-weighted edge.
    Greedy,
}

/// Per-worker rollout scratch state.
pub(crate) struct AntContext {
    rng: SmallRng,
    path: Vec<(Board, Move)>,
    repetition: [u64; MAX_PATH + 2],
    weights: [f32; MAX_EDGES],
}

impl AntContext {
    pub(crate) fn new() -> AntContext {
        AntContext {
            rng: SmallRng::from_entropy(),
            path: Vec::with_capacity(MAX_PATH),
            repetition: [0; MAX_PATH + 2],
            weights: [0.0; MAX_EDGES],
        }
    }
}

/// How a rollout's descent ended.
enum RolloutEnd {
    /// Reached a first-visit edge; score the leaf with the evaluator.
    Leaf,
    /// The side to move at the end is checkmated.
    Mate,
    Stalemate,
    /// Repetition against game history or the rollout's own path.
    Loop,
    /// Path cap reached without a leaf.
    Truncated,
    /// Lock contention; abandon without updating anything.
    Aborted,
}

/// Legal moves in descending static-score order, ready for edge-list
/// initialisation.
fn ordered_moves(board: &Board) -> Vec<Move> {
    let moves = generate_legal_moves(board);
    let mut scored: Vec<(i32, Move)> = moves
        .iter()
        .map(|mv| (score_move(board, mv, false), mv))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, mv)| mv).collect()
}

/// Sample an edge index proportionally to weight, with the unvisited-first
/// override: whenever sampling lands on an unvisited edge, the first
/// unvisited edge (best static ordering) is taken instead.
fn sample_edge(ctx: &mut AntContext, node: &NodeGuard<'_>, side: Color) -> usize {
    let edges = node.edges();
    let mut total = 0.0f32;
    for (i, edge) in edges.iter().enumerate() {
        let w = edge.weight(side);
        ctx.weights[i] = w;
        total += w;
    }

    let mut roll = ctx.rng.r#gen::<f32>() * total;
    let mut choice = 0;
    for (i, &w) in ctx.weights[..edges.len()].iter().enumerate() {
        roll -= w;
        if roll < 0.0 {
            choice = i;
            break;
        }
    }

    if edges[choice].visits() == 0
        && let Some(first_unvisited) = edges.iter().position(|e| e.visits() == 0)
    {
        choice = first_unvisited;
    }
    choice
}

/// Pick an edge for the current mode. Guided ants degrade to random
/// sampling when the PV runs out or its move is not in the edge list.
fn select_edge(
    ctx: &mut AntContext,
    node: &NodeGuard<'_>,
    side: Color,
    mode: AntMode,
    guide: &[Move],
    ply: usize,
) -> usize {
    match mode {
        AntMode::Greedy => {
            let mut best = 0;
            let mut best_weight = f32::MIN;
            for (i, edge) in node.edges().iter().enumerate() {
                let w = edge.weight(side);
                if w > best_weight {
                    best_weight = w;
                    best = i;
                }
            }
            best
        }
        AntMode::Guided => {
            if let Some(&pv_move) = guide.get(ply)
                && let Some(i) = node.edges().iter().position(|e| e.mv() == pv_move)
            {
                i
            } else {
                sample_edge(ctx, node, side)
            }
        }
        AntMode::Random => sample_edge(ctx, node, side),
    }
}

/// Execute one rollout from `root` and backpropagate its outcome.
pub(crate) fn run_rollout(
    tree: &GameTree,
    ab: &AlphaBetaEngine,
    root: &Board,
    history: &[u64; 16],
    ctx: &mut AntContext,
    mode: AntMode,
) {
    let root_side = root.side_to_move();
    let root_score = ab.best_score() as f32;
    let guide: Vec<Move> = if mode == AntMode::Guided {
        ab.best_line()
    } else {
        Vec::new()
    };

    let mut board = *root;
    let mut ply = 0usize;
    ctx.path.clear();
    ctx.repetition[0] = board.hash();

    let end = loop {
        if ply >= MAX_PATH - 2 {
            break RolloutEnd::Truncated;
        }

        let node = match tree.get(&board) {
            Some(node) => node,
            None => {
                let moves = ordered_moves(&board);
                match tree.put(&board, &moves) {
                    Some(node) => node,
                    None => break RolloutEnd::Aborted,
                }
            }
        };

        if node.edges().is_empty() {
            break if board.in_check(board.side_to_move()) {
                RolloutEnd::Mate
            } else {
                RolloutEnd::Stalemate
            };
        }

        let side = board.side_to_move();
        let choice = select_edge(ctx, &node, side, mode, &guide, ply);
        let mv = node.edges()[choice].mv();
        let first_visit = node.edges()[choice].visits() == 0;
        drop(node);

        ctx.path.push((board, mv));
        board = board.play(mv);
        ply += 1;

        let hash = board.hash();
        if history.contains(&hash) {
            break RolloutEnd::Loop;
        }
        ctx.repetition[ply] = hash;
        let mut i = ply as i32 - 2;
        let mut repeated = false;
        while i >= 0 {
            if ctx.repetition[i as usize] == hash {
                repeated = true;
                break;
            }
            i -= 2;
        }
        if repeated {
            break RolloutEnd::Loop;
        }

        if first_visit {
            break RolloutEnd::Leaf;
        }
    };

    let delta = match end {
        RolloutEnd::Aborted => return,
        RolloutEnd::Leaf => {
            let eval = evaluate(&board) as f32;
            let leaf_score = if board.side_to_move() == root_side {
                eval
            } else {
                -eval
            };
            leaf_score - root_score
        }
        RolloutEnd::Mate => {
            // The side to move at the end is mated; score from the root
            // side's perspective, decayed by distance.
            let magnitude = ANT_MATE - 10_000.0 * ply as f32;
            let leaf_score = if board.side_to_move() == root_side {
                -magnitude
            } else {
                magnitude
            };
            leaf_score - root_score
        }
        RolloutEnd::Stalemate | RolloutEnd::Loop => -STALL_PENALTY,
        RolloutEnd::Truncated => 0.0,
    };

    backpropagate(tree, &ctx.path, root_side, delta);
}

/// Credit `delta` along the rollout path.
///
/// Positive deltas feed the root side's bucket, negative deltas the
/// opponent's; visit counts always increment. Each path node is re-acquired
/// individually and skipped on contention; a lost update only slows
/// convergence.
fn backpropagate(tree: &GameTree, path: &[(Board, Move)], root_side: Color, delta: f32) {
    let bucket = if delta >= 0.0 { root_side } else { !root_side };
    let amount = delta.abs();

    for (board, mv) in path {
        if let Some(mut node) = tree.get(board)
            && let Some(edge) = node.edge_mut(*mv)
        {
            if amount > f32::EPSILON {
                edge.deposit(bucket, amount);
            }
            edge.record_visit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn setup() -> (GameTree, Arc<AlphaBetaEngine>, AntContext) {
        (
            GameTree::new(1 << 14),
            Arc::new(AlphaBetaEngine::new(1 << 12)),
            AntContext::new(),
        )
    }

    #[test]
    fn rollout_creates_root_node_and_visits_an_edge() {
        let (tree, ab, mut ctx) = setup();
        let root = Board::starting_position();
        let history = [0u64; 16];

        run_rollout(&tree, &ab, &root, &history, &mut ctx, AntMode::Random);

        let node = tree.get(&root).expect("rollout created the root node");
        let total_visits: u32 = node.edges().iter().map(|e| e.visits()).sum();
        assert_eq!(total_visits, 1, "exactly one root edge visited per rollout");
    }

    #[test]
    fn rollouts_accumulate_visits_monotonically() {
        let (tree, ab, mut ctx) = setup();
        let root = Board::starting_position();
        let history = [0u64; 16];

        let mut last_total = 0u32;
        for _ in 0..50 {
            run_rollout(&tree, &ab, &root, &history, &mut ctx, AntMode::Random);
            let node = tree.get(&root).expect("root node present");
            let total: u32 = node.edges().iter().map(|e| e.visits()).sum();
            assert!(total >= last_total, "root visits must not decrease");
            last_total = total;
        }
        assert!(last_total >= 40, "most rollouts complete without contention");
    }

    #[test]
    fn pheromone_stays_non_negative() {
        let (tree, ab, mut ctx) = setup();
        let root = Board::starting_position();
        let history = [0u64; 16];

        for i in 0..100 {
            let mode = if i % 3 == 0 {
                AntMode::Greedy
            } else {
                AntMode::Random
            };
            run_rollout(&tree, &ab, &root, &history, &mut ctx, mode);
        }

        let node = tree.get(&root).unwrap();
        for edge in node.edges() {
            assert!(edge.sugar() >= 0.0);
            assert!(edge.toxin() >= 0.0);
            assert!(edge.sugar() + edge.toxin() >= 0.0);
        }
    }

    #[test]
    fn every_root_edge_gets_sampled_eventually() {
        let (tree, ab, mut ctx) = setup();
        let root = Board::starting_position();
        let history = [0u64; 16];

        // 20 root edges; unvisited edges dominate sampling, so every edge
        // is reached in the first rounds of rollouts.
        for _ in 0..200 {
            run_rollout(&tree, &ab, &root, &history, &mut ctx, AntMode::Random);
        }

        let node = tree.get(&root).unwrap();
        let unvisited = node.edges().iter().filter(|e| e.visits() == 0).count();
        assert_eq!(unvisited, 0, "optimistic weighting must reach every edge");
    }

    #[test]
    fn mate_rollout_deposits_toward_the_winner() {
        // White mates in one; rollouts from this position should quickly
        // find Qxf7# and credit the root (White) bucket.
        let (tree, ab, mut ctx) = setup();
        let root: Board = "r1bqkb1r/pppp1ppp/2n2n2/4p2Q/2B1P3/8/PPPP1PPP/RNB1K1NR w KQkq - 4 4"
            .parse()
            .unwrap();
        let history = [0u64; 16];

        for _ in 0..300 {
            run_rollout(&tree, &ab, &root, &history, &mut ctx, AntMode::Random);
        }

        let node = tree.get(&root).unwrap();
        let mate_edge = node
            .edges()
            .iter()
            .find(|e| e.mv().to_string() == "h5f7")
            .expect("mating move is a root edge");
        assert!(
            mate_edge.sugar() > 0.0,
            "the mating edge must carry sugar for White"
        );
    }

    #[test]
    fn history_hash_ends_rollout_in_a_loop() {
        let (tree, ab, mut ctx) = setup();
        let root = Board::starting_position();

        // Mark every position after White's first move as already seen:
        // every rollout terminates at ply 1 as a loop and pays the stall
        // penalty into Black's bucket (delta < 0 for a White root).
        let moves = generate_legal_moves(&root);
        let mut history = [0u64; 16];
        for (i, mv) in moves.iter().take(16).enumerate() {
            history[i] = root.play(mv).hash();
        }

        for _ in 0..100 {
            run_rollout(&tree, &ab, &root, &history, &mut ctx, AntMode::Random);
        }

        let node = tree.get(&root).unwrap();
        let looped = node
            .edges()
            .iter()
            .filter(|e| e.visits() > 0 && e.toxin() > 0.0)
            .count();
        assert!(looped > 0, "looping rollouts must deposit toxin");
    }

    #[test]
    fn ordered_moves_descend_by_static_score() {
        let board: Board = "4k3/8/8/3q4/2P5/8/3Q4/4K3 w - - 0 1".parse().unwrap();
        let moves = ordered_moves(&board);
        assert!(!moves.is_empty());
        // The pawn capture of the queen must sort first.
        assert!(moves[0].is_capture());
        let scores: Vec<i32> = moves.iter().map(|m| score_move(&board, *m, false)).collect();
        for pair in scores.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }
}
