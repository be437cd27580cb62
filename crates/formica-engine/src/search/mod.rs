//! The hybrid search: alpha-beta workers and ant-colony rollout workers
//! cooperating through a shared game tree and transposition table.

pub mod alphabeta;
pub mod ant;
pub mod coordinator;
pub mod ordering;
pub mod tree;
pub mod tt;

use std::sync::Arc;

use formica_core::Move;

/// Completion callback: receives the chosen move (possibly null) exactly
/// once per started search.
pub type OnDone = Arc<dyn Fn(Move) + Send + Sync>;

/// Maximum alpha-beta search depth in plies (array sizing and recursion cap).
pub const MAX_DEPTH: usize = 32;

/// Base checkmate score; mate at ply `p` scores `MATE - p`.
pub const MATE: i32 = 500_000;

/// Scores beyond this magnitude are forced mates.
pub const MATE_THRESHOLD: i32 = MATE - 1_000;

/// Unreachable bound for full-window searches.
pub const INF: i32 = 1_000_000;
