//! Iterative-deepening negamax with transposition table, aspiration
//! windows, late-move reductions, killer ordering and quiescence, run by a
//! pool of Lazy-SMP workers that share only the transposition table and the
//! ant colony's game tree.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use tracing::debug;

use formica_core::{Board, Move, PieceKind, generate_legal_moves};

use crate::eval::{evaluate, is_insufficient_material};
use crate::search::ordering::{CAPTURE_VALUE, MovePicker};
use crate::search::tree::GameTree;
use crate::search::tt::{Bound, TranspositionTable};
use crate::search::{INF, MATE, MATE_THRESHOLD, MAX_DEPTH, OnDone};

/// Initial aspiration window half-width in centipawns.
const ASPIRATION_WINDOW: i32 = 80;

/// Aspiration windows wider than this fall back to a full window.
const ASPIRATION_CAP: i32 = 1_000;

/// Failed aspiration searches retried before giving up on the window.
const ASPIRATION_ATTEMPTS: u32 = 4;

/// Triangular table of principal-variation lines, one row per ply.
struct PvTable {
    moves: [[Move; MAX_DEPTH]; MAX_DEPTH],
    len: [usize; MAX_DEPTH],
}

impl PvTable {
    fn new() -> PvTable {
        PvTable {
            moves: [[Move::NULL; MAX_DEPTH]; MAX_DEPTH],
            len: [0; MAX_DEPTH],
        }
    }

    fn clear_ply(&mut self, ply: usize) {
        if ply < MAX_DEPTH {
            self.len[ply] = 0;
        }
    }

    /// Set `mv` as the best move at `ply` and pull up the child line.
    fn update(&mut self, ply: usize, mv: Move) {
        if ply >= MAX_DEPTH {
            return;
        }
        self.moves[ply][0] = mv;
        let child = ply + 1;
        if child < MAX_DEPTH {
            let copy_len = self.len[child].min(MAX_DEPTH - 1);
            let (upper, lower) = self.moves.split_at_mut(child);
            upper[ply][1..1 + copy_len].copy_from_slice(&lower[0][..copy_len]);
            self.len[ply] = 1 + copy_len;
        } else {
            self.len[ply] = 1;
        }
    }

    fn root_line(&self) -> &[Move] {
        &self.moves[0][..self.len[0]]
    }
}

/// Per-worker search state. Never shared between threads.
struct SearchCtx {
    ply: usize,
    pv: PvTable,
    killer_primary: [Move; MAX_DEPTH],
    killer_secondary: [Move; MAX_DEPTH],
    /// Hashes along the current search path, checked at even-ply offsets
    /// for in-search repetitions.
    repetition: [u64; MAX_DEPTH + 2],
    /// Hashes of earlier game positions supplied by the shell.
    history: [u64; 16],
    /// The ant colony's game tree, consulted for ordering hints.
    tree: Option<Arc<GameTree>>,
}

impl SearchCtx {
    fn new(history: [u64; 16], tree: Option<Arc<GameTree>>) -> SearchCtx {
        SearchCtx {
            ply: 0,
            pv: PvTable::new(),
            killer_primary: [Move::NULL; MAX_DEPTH],
            killer_secondary: [Move::NULL; MAX_DEPTH],
            repetition: [0; MAX_DEPTH + 2],
            history,
            tree,
        }
    }
}

/// Reduction in plies for the `m`-th move at `depth`.
fn lmr_reduction(move_index: usize, depth: i32, is_pv: bool, order: i32) -> i32 {
    let mut r = (0.8 + 0.3 * (move_index as f32).log2() + 0.5 * (depth as f32).log2()) as i32;
    if r > 0 && is_pv {
        r -= 1;
    }
    if r > 0 && order >= 100 {
        r -= 1;
    }
    r.max(0)
}

/// The alpha-beta half of the hybrid searcher.
///
/// Owns the transposition table and the worker pool. All coordination state
/// is atomic or mutex-held so the engine is driven through `&self` from any
/// thread.
pub struct AlphaBetaEngine {
    tt: TranspositionTable,
    running: AtomicBool,
    score: AtomicI32,
    line: Mutex<Vec<Move>>,
    hint_tree: Mutex<Option<Arc<GameTree>>>,
    history: Mutex<[u64; 16]>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AlphaBetaEngine {
    /// Create an engine with a transposition table of roughly
    /// `tt_capacity` entries.
    pub fn new(tt_capacity: usize) -> AlphaBetaEngine {
        AlphaBetaEngine {
            tt: TranspositionTable::new(tt_capacity),
            running: AtomicBool::new(false),
            score: AtomicI32::new(0),
            line: Mutex::new(Vec::new()),
            hint_tree: Mutex::new(None),
            history: Mutex::new([0; 16]),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Register the game tree whose reinforced edges bias move ordering.
    pub fn set_hint_tree(&self, tree: Arc<GameTree>) {
        *self.hint_tree.lock().expect("hint tree mutex") = Some(tree);
    }

    /// Install the hashes of earlier game positions (draw detection).
    pub fn set_history(&self, history: [u64; 16]) {
        *self.history.lock().expect("history mutex") = history;
    }

    /// Whether workers are currently searching.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Best score of the last published iteration, side-to-move perspective.
    pub fn best_score(&self) -> i32 {
        self.score.load(Ordering::Relaxed)
    }

    /// First move of the published principal variation.
    pub fn best_move(&self) -> Move {
        self.line
            .lock()
            .expect("line mutex")
            .first()
            .copied()
            .unwrap_or(Move::NULL)
    }

    /// The published principal variation.
    pub fn best_line(&self) -> Vec<Move> {
        self.line.lock().expect("line mutex").clone()
    }

    /// Clear the transposition table and the published result.
    pub fn clear(&self) {
        self.tt.clear();
        self.score.store(0, Ordering::Relaxed);
        self.line.lock().expect("line mutex").clear();
    }

    /// Synchronous fixed-depth search, single-threaded.
    ///
    /// Returns the score and the best move. Positions with no legal move
    /// return the static evaluation and a null move; a single legal move is
    /// returned without searching.
    pub fn search(&self, board: &Board, depth: u8) -> (i32, Move) {
        let moves = generate_legal_moves(board);
        if moves.is_empty() {
            return (evaluate(board), Move::NULL);
        }
        if moves.len() == 1 {
            return (evaluate(board), moves[0]);
        }

        let tree = self.hint_tree.lock().expect("hint tree mutex").clone();
        let history = *self.history.lock().expect("history mutex");
        let mut ctx = SearchCtx::new(history, tree);
        ctx.repetition[0] = board.hash();

        let was_running = self.running.swap(true, Ordering::SeqCst);
        let score = self.negamax(&mut ctx, board, depth as i32, -INF, INF, 0);
        if !was_running {
            self.running.store(false, Ordering::SeqCst);
        }

        let best = ctx.pv.root_line().first().copied().unwrap_or(Move::NULL);
        (score, best)
    }

    /// Launch `threads` iterative-deepening workers against `board`.
    ///
    /// Returns `false` without starting anything when the root has at most
    /// one legal move; the single move (if any) is published as the best
    /// line so [`best_move`](Self::best_move) still answers. Worker 0
    /// publishes results and fires `on_done` on mate or when the time
    /// budget cannot cover another iteration.
    pub fn start_search(
        self: &Arc<Self>,
        board: Board,
        time_ms: u64,
        threads: usize,
        on_done: OnDone,
    ) -> bool {
        self.stop();
        self.tt.clear();
        self.score.store(0, Ordering::Relaxed);

        let moves = generate_legal_moves(&board);
        {
            let mut line = self.line.lock().expect("line mutex");
            line.clear();
            if moves.len() == 1 {
                line.push(moves[0]);
            }
        }
        if moves.len() <= 1 {
            return false;
        }

        self.running.store(true, Ordering::SeqCst);
        let tree = self.hint_tree.lock().expect("hint tree mutex").clone();
        let history = *self.history.lock().expect("history mutex");

        let mut workers = self.workers.lock().expect("workers mutex");
        for id in 0..threads.max(1) {
            let engine = Arc::clone(self);
            let tree = tree.clone();
            let on_done = on_done.clone();
            workers.push(std::thread::spawn(move || {
                engine.worker_loop(id, board, time_ms, tree, history, on_done);
            }));
        }
        true
    }

    /// Signal all workers to stop and join them.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().expect("workers mutex");
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn worker_loop(
        &self,
        id: usize,
        board: Board,
        time_ms: u64,
        tree: Option<Arc<GameTree>>,
        history: [u64; 16],
        on_done: OnDone,
    ) {
        let mut ctx = SearchCtx::new(history, tree);
        let mut remaining = time_ms as i64;

        for depth in 2..=MAX_DEPTH {
            if !self.is_running() {
                break;
            }
            ctx.repetition[0] = board.hash();
            let started = Instant::now();

            let score = self.aspiration(&mut ctx, &board, depth as i32);

            let elapsed = started.elapsed().as_millis() as i64;
            if !self.is_running() {
                break;
            }
            if id != 0 {
                continue;
            }

            // Worker 0 publishes and watches the clock.
            let line = ctx.pv.root_line();
            if !line.is_empty() {
                self.score.store(score, Ordering::Relaxed);
                *self.line.lock().expect("line mutex") = line.to_vec();
                debug!(depth, score, elapsed_ms = elapsed, best = %line[0], "iteration complete");
            }

            if score.abs() > MATE_THRESHOLD {
                on_done(self.best_move());
                self.running.store(false, Ordering::SeqCst);
                break;
            }

            if time_ms > 0 {
                if elapsed < remaining {
                    remaining -= elapsed;
                }
                if remaining < elapsed {
                    on_done(self.best_move());
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    /// One iteration at `depth` behind an aspiration window around the last
    /// published score, doubling on fail-high/low up to the cap.
    fn aspiration(&self, ctx: &mut SearchCtx, board: &Board, depth: i32) -> i32 {
        let prev = self.best_score();
        let mut use_window = prev != 0 && prev.abs() < MATE_THRESHOLD;
        let mut window = ASPIRATION_WINDOW;
        let mut attempts = 0;

        loop {
            let (alpha, beta) = if use_window {
                (prev - window, prev + window)
            } else {
                (-INF, INF)
            };
            let score = self.negamax(ctx, board, depth, alpha, beta, 0);
            if !self.is_running() {
                return score;
            }
            if use_window && (score <= alpha || score >= beta) {
                attempts += 1;
                window *= 2;
                if attempts >= ASPIRATION_ATTEMPTS || window > ASPIRATION_CAP {
                    use_window = false;
                }
                continue;
            }
            return score;
        }
    }

    fn negamax(
        &self,
        ctx: &mut SearchCtx,
        board: &Board,
        depth: i32,
        mut alpha: i32,
        beta: i32,
        move_order: i32,
    ) -> i32 {
        let ply = ctx.ply;
        if ply >= MAX_DEPTH {
            return 0;
        }
        if is_insufficient_material(board) {
            return 0;
        }

        let hash = board.hash();
        if ply > 0 {
            if ctx.history.contains(&hash) {
                return 0;
            }
            // Repetition along the current path: same side to move, so
            // compare at even offsets only.
            let mut i = ply as i32 - 2;
            while i >= 0 {
                if ctx.repetition[i as usize] == hash {
                    return 0;
                }
                i -= 2;
            }
        }

        let is_pv = beta - alpha > 1;

        let probe = self.tt.probe(board, alpha, beta, depth.max(0) as u8, ply as u8);
        if !is_pv
            && ply > 0
            && let Some(score) = probe.score
        {
            return score;
        }
        let tt_move = probe.best_move;

        let us = board.side_to_move();
        let in_check = board.in_check(us);

        ctx.pv.clear_ply(ply);

        if depth < 1 && !in_check {
            return self.quiescence(&ctx.history, board, alpha, beta, ply);
        }

        // Static pruning, only where the parent's ordering hint says this
        // node was not reached by a capture or a threat.
        let mut futile = false;
        if !is_pv && ply > 0 && !in_check && move_order < 100 && alpha.abs() < MATE_THRESHOLD {
            let static_eval = evaluate(board);
            if move_order < 70 {
                let margin = 320 * depth;
                if static_eval - margin >= beta {
                    return (static_eval + beta) / 2;
                }
            }
            if static_eval + 220 * depth < alpha {
                futile = true;
            }
        }

        let moves = generate_legal_moves(board);
        if moves.is_empty() {
            return if in_check { ply as i32 - MATE } else { 0 };
        }

        // Ordering hint from the ant colony: its most-reinforced edge.
        let tree_move = ctx
            .tree
            .as_deref()
            .and_then(|tree| tree.get(board))
            .and_then(|node| node.best_weighted(us))
            .unwrap_or(Move::NULL);

        let killers = [ctx.killer_primary[ply], ctx.killer_secondary[ply]];
        let mut picker = MovePicker::new(&moves, board, tt_move, tree_move, killers);

        let mut best_move = Move::NULL;
        let mut bound = Bound::UpperBound;
        let mut index = 0usize;

        while let Some((mv, order)) = picker.next() {
            if !self.is_running() {
                break;
            }
            // Extended futility: hopeless nodes stop after the first few
            // (well-ordered) moves.
            if futile && index >= 4 {
                break;
            }

            let next = board.play(mv);
            ctx.ply += 1;
            ctx.repetition[ctx.ply] = next.hash();

            let mut score = i32::MAX;
            let reduce = index > 0 && depth > 1 && !in_check;
            if reduce {
                let mut reduction = lmr_reduction(index, depth, is_pv, order);
                loop {
                    score =
                        -self.negamax(ctx, &next, depth - 1 - reduction, -alpha - 1, -alpha, order);
                    if score > alpha && reduction > 0 {
                        // The reduced search beat alpha; verify at full depth.
                        reduction = 0;
                        continue;
                    }
                    break;
                }
            }
            if score > alpha {
                score = -self.negamax(ctx, &next, depth - 1, -beta, -alpha, order);
            }

            ctx.ply -= 1;
            index += 1;

            if score > alpha {
                alpha = score;
                best_move = mv;
                bound = Bound::Exact;
                ctx.pv.update(ply, mv);

                if alpha >= beta {
                    ctx.killer_secondary[ply] = ctx.killer_primary[ply];
                    ctx.killer_primary[ply] = mv;
                    bound = Bound::LowerBound;
                    break;
                }
            }
        }

        if self.is_running() {
            self.tt
                .store(board, alpha, best_move, depth.max(0) as u8, bound, ply as u8);
        }
        alpha
    }

    /// Quiescence: stand pat, then resolve captures, promotions and checks
    /// (every evasion when in check) with delta pruning.
    fn quiescence(&self, history: &[u64; 16], board: &Board, mut alpha: i32, beta: i32, ply: usize) -> i32 {
        if ply >= MAX_DEPTH {
            return 0;
        }
        if is_insufficient_material(board) {
            return 0;
        }
        if history.contains(&board.hash()) {
            return 0;
        }
        if !self.is_running() {
            return alpha;
        }

        let us = board.side_to_move();
        let in_check = board.in_check(us);

        let mut stand_pat = 0;
        if !in_check {
            stand_pat = evaluate(board);
            if stand_pat >= beta {
                return beta;
            }
            if stand_pat > alpha {
                alpha = stand_pat;
            }
        }

        let moves = generate_legal_moves(board);
        if moves.is_empty() {
            return if in_check { ply as i32 - MATE } else { alpha };
        }

        let mut picker = MovePicker::new_quiescence(&moves, board, in_check);
        while let Some((mv, _)) = picker.next() {
            if !in_check && mv.is_capture() && !mv.is_en_passant() {
                // Delta pruning: even winning this capture cannot lift alpha.
                let victim = board.piece_on(mv.to()).unwrap_or(PieceKind::Pawn);
                if stand_pat + CAPTURE_VALUE[victim.index()] + 600 <= alpha {
                    continue;
                }
            }

            let next = board.play(mv);
            let score = -self.quiescence(history, &next, -beta, -alpha, ply + 1);
            if score > alpha {
                alpha = score;
                if alpha >= beta {
                    break;
                }
            }
        }

        alpha
    }
}

impl std::fmt::Debug for AlphaBetaEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlphaBetaEngine")
            .field("tt", &self.tt)
            .field("running", &self.is_running())
            .finish()
    }
}
