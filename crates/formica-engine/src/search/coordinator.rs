//! The coordinator: owns the game tree and the alpha-beta engine, runs both
//! worker populations against a shared root position, and reports the chosen
//! move through a completion callback exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::debug;

use formica_core::{Board, Move};

use crate::search::OnDone;
use crate::search::alphabeta::AlphaBetaEngine;
use crate::search::ant::{AntContext, AntMode, GREEDY_PERIOD, GUIDED_PERIOD, MAX_PATH, run_rollout};
use crate::search::tree::GameTree;

/// Visit statistics for one root edge, for inspection and tests.
#[derive(Debug, Clone, Copy)]
pub struct EdgeStat {
    /// The move.
    pub mv: Move,
    /// Completed rollouts through this edge.
    pub visits: u32,
    /// Sampling weight from the root side's perspective.
    pub weight: f32,
}

/// Drives the hybrid search: alpha-beta workers via [`AlphaBetaEngine`],
/// ant workers via rollouts into the shared [`GameTree`].
pub struct Coordinator {
    tree: Arc<GameTree>,
    ab: Arc<AlphaBetaEngine>,
    root: Mutex<Board>,
    history: Mutex<[u64; 16]>,
    ants_running: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    /// Create a coordinator with a game tree of `tree_capacity` nodes and a
    /// transposition table of `tt_capacity` entries.
    pub fn new(tree_capacity: usize, tt_capacity: usize) -> Coordinator {
        Coordinator {
            tree: Arc::new(GameTree::new(tree_capacity)),
            ab: Arc::new(AlphaBetaEngine::new(tt_capacity)),
            root: Mutex::new(Board::starting_position()),
            history: Mutex::new([0; 16]),
            ants_running: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Set the root position for subsequent searches. Stops any search in
    /// progress first.
    pub fn set_position(&self, board: Board) {
        self.stop();
        *self.root.lock().expect("root mutex") = board;
    }

    /// The current root position.
    pub fn position(&self) -> Board {
        *self.root.lock().expect("root mutex")
    }

    /// Install hashes of earlier game positions; searches treat them as
    /// draws on sight.
    pub fn set_history(&self, hashes: [u64; 16]) {
        self.ab.set_history(hashes);
        *self.history.lock().expect("history mutex") = hashes;
    }

    /// Start a timed search with `total_threads` workers, `ab_threads` of
    /// them alpha-beta and the rest ants.
    ///
    /// `on_done` fires exactly once: on mate, on time, or immediately when
    /// the root has at most one legal move. A null PV move at completion
    /// falls back to the game tree's most-visited root edge; if that is
    /// also absent the callback receives the null move and the caller emits
    /// nothing.
    pub fn start(&self, total_threads: usize, ab_threads: usize, time_ms: u64, on_done: OnDone) {
        self.stop();

        let root = self.position();
        let history = *self.history.lock().expect("history mutex");

        // Exactly-once wrapper with the game-tree fallback baked in.
        let fired = Arc::new(AtomicBool::new(false));
        let fallback_tree = Arc::clone(&self.tree);
        let wrapped: OnDone = Arc::new(move |mv: Move| {
            if fired.swap(true, Ordering::SeqCst) {
                return;
            }
            let chosen = if mv.is_null() {
                most_visited_root_edge(&fallback_tree, &root).unwrap_or(Move::NULL)
            } else {
                mv
            };
            on_done(chosen);
        });

        self.ab.set_hint_tree(Arc::clone(&self.tree));
        let started = self
            .ab
            .start_search(root, time_ms, ab_threads.max(1), wrapped.clone());
        if !started {
            // No choice at the root: report and skip the worker fan-out.
            wrapped(self.ab.best_move());
            return;
        }

        let ant_threads = total_threads.saturating_sub(ab_threads);
        self.ants_running.store(true, Ordering::SeqCst);
        let mut workers = self.workers.lock().expect("workers mutex");
        for id in 0..ant_threads {
            let tree = Arc::clone(&self.tree);
            let ab = Arc::clone(&self.ab);
            let running = Arc::clone(&self.ants_running);
            workers.push(std::thread::spawn(move || {
                ant_worker(id, &tree, &ab, root, history, &running);
            }));
        }
        debug!(ab_threads, ant_threads, time_ms, "hybrid search started");
    }

    /// Stop both worker populations and join them.
    pub fn stop(&self) {
        self.ab.stop();
        self.ants_running.store(false, Ordering::SeqCst);
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().expect("workers mutex");
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
    }

    /// Best move known right now: the alpha-beta PV move, else the game
    /// tree's most-visited root edge, else null.
    pub fn best_move(&self) -> Move {
        let mv = self.ab.best_move();
        if !mv.is_null() {
            return mv;
        }
        most_visited_root_edge(&self.tree, &self.position()).unwrap_or(Move::NULL)
    }

    /// Reset all cached search state for a fresh game.
    pub fn new_game(&self) {
        self.stop();
        self.tree.clear();
        self.ab.clear();
        *self.history.lock().expect("history mutex") = [0; 16];
        self.ab.set_history([0; 16]);
    }

    /// Visit statistics of the root edges, most-visited first.
    pub fn root_stats(&self) -> Vec<EdgeStat> {
        let root = self.position();
        let side = root.side_to_move();
        let Some(node) = self.tree.get(&root) else {
            return Vec::new();
        };
        let mut stats: Vec<EdgeStat> = node
            .edges()
            .iter()
            .map(|e| EdgeStat {
                mv: e.mv(),
                visits: e.visits(),
                weight: e.weight(side),
            })
            .collect();
        stats.sort_by(|a, b| b.visits.cmp(&a.visits));
        stats
    }

    /// Walk the game tree from the root along most-visited edges, stopping
    /// below `min_visits`. Returns the visited positions, root first.
    pub fn principal_rollout(&self, min_visits: u32) -> Vec<Board> {
        let mut line = vec![self.position()];
        let mut board = self.position();

        while line.len() < MAX_PATH {
            let step = {
                let Some(node) = self.tree.get(&board) else {
                    break;
                };
                match node.most_visited() {
                    Some((mv, visits)) if visits >= min_visits => Some(mv),
                    _ => None,
                }
            };
            match step {
                Some(mv) => {
                    board = board.play(mv);
                    line.push(board);
                }
                None => break,
            }
        }
        line
    }

    /// The shared game tree (for tests and diagnostics).
    pub fn tree(&self) -> &Arc<GameTree> {
        &self.tree
    }

    /// The alpha-beta engine (for tests and diagnostics).
    pub fn alphabeta(&self) -> &Arc<AlphaBetaEngine> {
        &self.ab
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn most_visited_root_edge(tree: &GameTree, root: &Board) -> Option<Move> {
    let node = tree.get(root)?;
    node.most_visited()
        .filter(|&(_, visits)| visits > 0)
        .map(|(mv, _)| mv)
}

/// Ant worker loop: cycle rollout modes by counter until stopped.
fn ant_worker(
    id: usize,
    tree: &GameTree,
    ab: &AlphaBetaEngine,
    root: Board,
    history: [u64; 16],
    running: &AtomicBool,
) {
    debug!(id, "ant worker started");
    let mut ctx = AntContext::new();
    let mut guided_count = 0u32;
    let mut greedy_count = 0u32;

    while running.load(Ordering::Relaxed) {
        guided_count += 1;
        greedy_count += 1;

        let mode = if guided_count > GUIDED_PERIOD {
            guided_count = 0;
            AntMode::Guided
        } else if greedy_count > GREEDY_PERIOD {
            greedy_count = 0;
            AntMode::Greedy
        } else {
            AntMode::Random
        };

        run_rollout(tree, ab, &root, &history, &mut ctx, mode);
    }
    debug!(id, "ant worker stopped");
}
