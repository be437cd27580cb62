//! Search and evaluation for formica: a hybrid of iterative-deepening
//! alpha-beta and ant-colony rollouts over a shared game tree.

pub mod eval;
pub mod search;
pub mod time;

pub use eval::weights::{GenomeError, install_genome, load_genome};
pub use eval::{evaluate, is_insufficient_material};
pub use search::OnDone;
pub use search::alphabeta::AlphaBetaEngine;
pub use search::coordinator::{Coordinator, EdgeStat};
pub use search::tree::GameTree;
pub use time::choose_think_time;
