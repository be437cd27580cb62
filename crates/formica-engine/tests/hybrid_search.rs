//! Integration tests for the hybrid search: alpha-beta and ant workers
//! running concurrently against a shared root through the coordinator.
//!
//! Verifies correctness (legal moves, mate detection, draw handling) and
//! robustness (stop joins workers, restarts, game-tree statistics) under
//! realistic thread mixes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use formica_core::{Board, Move, generate_legal_moves};
use formica_engine::{Coordinator, OnDone};

const SCHOLARS_MATE_FEN: &str =
    "r1bqkb1r/pppp1ppp/2n2n2/4p2Q/2B1P3/8/PPPP1PPP/RNB1K1NR w KQkq - 4 4";

const SICILIAN_FEN: &str = "rnbqkbnr/pp1ppppp/8/2p5/4P3/8/PPPP1PPP/RNBQKBNR w KQkq c6 0 2";

const ENDGAME_FEN: &str = "8/8/8/3k4/8/3K4/4P3/8 w - - 0 1";

fn coordinator() -> Coordinator {
    Coordinator::new(1 << 15, 1 << 15)
}

/// Run a timed hybrid search and wait for the completion callback.
fn search_timed(coord: &Coordinator, board: Board, time_ms: u64, threads: (usize, usize)) -> Move {
    coord.set_position(board);
    let (tx, rx) = mpsc::channel();
    let done: OnDone = Arc::new(move |mv| {
        let _ = tx.send(mv);
    });
    coord.start(threads.0, threads.1, time_ms, done);
    let mv = rx
        .recv_timeout(Duration::from_millis(time_ms + 30_000))
        .expect("completion callback fires");
    coord.stop();
    mv
}

#[test]
fn startpos_returns_a_legal_move() {
    let coord = coordinator();
    let board = Board::starting_position();
    let mv = search_timed(&coord, board, 400, (4, 2));
    assert!(
        generate_legal_moves(&board).iter().any(|m| m == mv),
        "hybrid search must return a legal move, got {mv}"
    );
}

#[test]
fn hybrid_finds_mate_in_one() {
    let coord = coordinator();
    let board: Board = SCHOLARS_MATE_FEN.parse().unwrap();
    let started = Instant::now();
    let mv = search_timed(&coord, board, 30_000, (8, 4));
    assert_eq!(mv.to_string(), "h5f7", "hybrid search should find Qxf7#");
    assert!(
        started.elapsed() < Duration::from_secs(20),
        "mate must stop the search before the budget runs out"
    );
}

#[test]
fn various_positions_yield_legal_moves() {
    let coord = coordinator();
    for (name, fen) in [
        ("Sicilian Defence", SICILIAN_FEN),
        ("King+pawn endgame", ENDGAME_FEN),
    ] {
        let board: Board = fen.parse().unwrap_or_else(|_| panic!("invalid FEN for {name}"));
        let mv = search_timed(&coord, board, 300, (4, 2));
        assert!(
            generate_legal_moves(&board).iter().any(|m| m == mv),
            "{name}: chosen move {mv} is not legal"
        );
    }
}

#[test]
fn stop_joins_workers_promptly() {
    let coord = coordinator();
    coord.set_position(Board::starting_position());
    let done: OnDone = Arc::new(|_mv| {});
    coord.start(6, 2, 60_000, done);

    std::thread::sleep(Duration::from_millis(300));
    let started = Instant::now();
    coord.stop();
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "stop must join all workers within a bounded time"
    );
}

#[test]
fn restart_cycle_produces_moves_each_time() {
    let coord = coordinator();
    let board = Board::starting_position();
    for _ in 0..3 {
        let mv = search_timed(&coord, board, 200, (4, 2));
        assert!(!mv.is_null());
    }
}

#[test]
fn completion_callback_fires_exactly_once() {
    let coord = coordinator();
    coord.set_position(SCHOLARS_MATE_FEN.parse().unwrap());

    let fired = Arc::new(AtomicU32::new(0));
    let fired_clone = Arc::clone(&fired);
    let done: OnDone = Arc::new(move |_mv| {
        fired_clone.fetch_add(1, Ordering::SeqCst);
    });
    coord.start(6, 3, 2_000, done);

    // Give the mate path and the timeout path every chance to race.
    std::thread::sleep(Duration::from_millis(3_000));
    coord.stop();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn ant_workers_accumulate_tree_statistics() {
    let coord = coordinator();
    coord.set_position(Board::starting_position());

    let done: OnDone = Arc::new(|_mv| {});
    coord.start(6, 1, 10_000, done);
    std::thread::sleep(Duration::from_millis(600));
    coord.stop();

    let stats = coord.root_stats();
    assert!(!stats.is_empty(), "rollouts must build the root node");

    let total_visits: u32 = stats.iter().map(|s| s.visits).sum();
    assert!(total_visits > 0);
    for stat in &stats {
        assert!(stat.weight >= 0.0, "edge weights are never negative");
    }

    // The most-visited continuation is playable from the root.
    let path = coord.principal_rollout(1);
    assert!(path.len() >= 2, "some continuation should be well-visited");
}

#[test]
fn game_history_steers_away_from_repetition() {
    // Searching with a filled history must still produce a legal move.
    let coord = coordinator();
    let board = Board::starting_position();
    let mut history = [0u64; 16];
    let moves = generate_legal_moves(&board);
    for (i, mv) in moves.iter().take(16).enumerate() {
        history[i] = board.play(mv).hash();
    }
    coord.set_position(board);
    coord.set_history(history);

    let (tx, rx) = mpsc::channel();
    let done: OnDone = Arc::new(move |mv| {
        let _ = tx.send(mv);
    });
    coord.start(4, 2, 300, done);
    let mv = rx
        .recv_timeout(Duration::from_secs(30))
        .expect("search completes");
    coord.stop();
    assert!(generate_legal_moves(&board).iter().any(|m| m == mv));
}
