//! Event-driven protocol shell.
//!
//! A reader thread feeds stdin lines into an event channel; search
//! completion callbacks and a per-search deadline timer feed the same
//! channel, so the main loop stays single-threaded and never blocks on the
//! search. Every search is tagged with an id so stale completions and
//! stale deadlines from an earlier `go` are discarded.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use tracing::{debug, info, warn};

use formica_core::{Board, Move, Promotion, generate_legal_moves};
use formica_engine::{Coordinator, OnDone, choose_think_time};

use crate::command::{Command, GoClocks, PositionSetup, parse_command};
use crate::error::ProtocolError;

/// Game-tree capacity in nodes.
const TREE_CAPACITY: usize = 1 << 18;

/// Transposition-table capacity in entries. Slots carry the full packed
/// position, so an entry is 80 bytes.
const TT_CAPACITY: usize = 1 << 19;

/// Worker threads per search: total and the alpha-beta share.
const TOTAL_THREADS: usize = 8;
const AB_THREADS: usize = 4;

/// Earlier game positions remembered for draw detection.
const HISTORY_SLOTS: usize = 16;

/// Slack added to the think time before the shell-side deadline fires.
const DEADLINE_GRACE_MS: u64 = 250;

enum ShellEvent {
    Line(String),
    InputClosed,
    SearchDone { id: u64, mv: Move },
    Deadline { id: u64 },
}

/// The protocol shell: current position, game history, and the hybrid
/// search coordinator.
pub struct Shell {
    board: Board,
    history: VecDeque<u64>,
    coordinator: Coordinator,
    searching: bool,
    search_id: u64,
}

impl Shell {
    /// Create a shell at the starting position.
    pub fn new() -> Shell {
        Shell {
            board: Board::starting_position(),
            history: VecDeque::new(),
            coordinator: Coordinator::new(TREE_CAPACITY, TT_CAPACITY),
            searching: false,
            search_id: 0,
        }
    }

    /// Run the event loop until `quit` or stdin closes.
    pub fn run(mut self) -> Result<(), ProtocolError> {
        let (tx, rx) = mpsc::channel::<ShellEvent>();

        let reader_tx = tx.clone();
        std::thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        let trimmed = line.trim().to_string();
                        if trimmed.is_empty() {
                            continue;
                        }
                        if reader_tx.send(ShellEvent::Line(trimmed)).is_err() {
                            return;
                        }
                    }
                    Err(_) => break,
                }
            }
            let _ = reader_tx.send(ShellEvent::InputClosed);
        });

        for event in &rx {
            match event {
                ShellEvent::Line(line) => {
                    debug!(line = %line, "command received");
                    if !self.dispatch(&line, &tx) {
                        break;
                    }
                }
                ShellEvent::SearchDone { id, mv } => {
                    if self.searching && id == self.search_id {
                        self.finish_search(mv);
                    }
                }
                ShellEvent::Deadline { id } => {
                    if self.searching && id == self.search_id {
                        debug!("deadline reached before completion callback");
                        let mv = self.coordinator.best_move();
                        self.finish_search(mv);
                    }
                }
                ShellEvent::InputClosed => break,
            }
        }

        self.coordinator.stop();
        info!("shell shutting down");
        Ok(())
    }

    /// Handle one command line. Returns `false` on `quit`.
    fn dispatch(&mut self, line: &str, tx: &mpsc::Sender<ShellEvent>) -> bool {
        match parse_command(line) {
            Command::Init => respond("ready"),
            Command::Ready => respond("readyok"),
            Command::NewGame => self.handle_newgame(),
            Command::Position { setup, moves } => self.handle_position(setup, &moves),
            Command::Go(clocks) => self.handle_go(clocks, tx),
            Command::Stop => self.handle_stop(),
            Command::Quit => {
                self.coordinator.stop();
                self.searching = false;
                return false;
            }
            Command::Diagram => respond(&self.board.pretty().to_string()),
            Command::Unknown(word) => {
                if !word.is_empty() {
                    debug!(command = %word, "ignoring unknown command");
                }
            }
        }
        true
    }

    fn handle_newgame(&mut self) {
        self.coordinator.new_game();
        self.board = Board::starting_position();
        self.history.clear();
    }

    /// Set up the position and apply the move list.
    ///
    /// An invalid FEN leaves everything unchanged; an unmatched move string
    /// is skipped and the remaining moves are still tried, mirroring the
    /// silent-ignore error policy of the protocol.
    fn handle_position(&mut self, setup: PositionSetup, moves: &[String]) {
        let board = match &setup {
            PositionSetup::Start => Board::starting_position(),
            PositionSetup::Fen(fen) => match fen.parse::<Board>() {
                Ok(board) => board,
                Err(source) => {
                    warn!(
                        error = %ProtocolError::InvalidFen { fen: fen.clone(), source },
                        "position ignored"
                    );
                    return;
                }
            },
        };

        self.board = board;
        self.history.clear();

        for text in moves {
            match find_move(&self.board, text) {
                Some(mv) => {
                    self.board = self.board.play(mv);
                    self.history.push_front(self.board.hash());
                    self.history.truncate(HISTORY_SLOTS);
                }
                None => {
                    warn!(error = %ProtocolError::InvalidMove { text: text.clone() }, "move skipped");
                }
            }
        }
    }

    fn handle_go(&mut self, clocks: GoClocks, tx: &mpsc::Sender<ShellEvent>) {
        if self.searching {
            warn!("go received while already searching, ignoring");
            return;
        }

        let white_to_move = self.board.side_to_move() == formica_core::Color::White;
        let (my_time, my_inc) = if white_to_move {
            (clocks.wtime, clocks.winc)
        } else {
            (clocks.btime, clocks.binc)
        };
        let think_ms = choose_think_time(my_time, my_inc);
        debug!(think_ms, "starting timed search");

        self.search_id += 1;
        let id = self.search_id;

        self.coordinator.set_position(self.board);
        self.coordinator.set_history(self.history_array());

        let done_tx = tx.clone();
        let on_done: OnDone = Arc::new(move |mv| {
            let _ = done_tx.send(ShellEvent::SearchDone { id, mv });
        });
        self.coordinator
            .start(TOTAL_THREADS, AB_THREADS, think_ms, on_done);
        self.searching = true;

        // Shell-side safety net: an alpha-beta iteration that overruns the
        // budget cannot delay the reply past the deadline.
        let deadline_tx = tx.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(think_ms + DEADLINE_GRACE_MS));
            let _ = deadline_tx.send(ShellEvent::Deadline { id });
        });
    }

    fn handle_stop(&mut self) {
        if self.searching {
            let mv = self.coordinator.best_move();
            self.finish_search(mv);
        }
    }

    /// Stop workers and publish the chosen move (nothing when null).
    fn finish_search(&mut self, mv: Move) {
        self.coordinator.stop();
        self.searching = false;
        if mv.is_null() {
            warn!("search ended with no move to report");
        } else {
            respond(&format!("bestmove {mv}"));
        }
    }

    fn history_array(&self) -> [u64; HISTORY_SLOTS] {
        let mut hashes = [0u64; HISTORY_SLOTS];
        for (slot, hash) in hashes.iter_mut().zip(self.history.iter()) {
            *slot = *hash;
        }
        hashes
    }
}

impl Default for Shell {
    fn default() -> Shell {
        Shell::new()
    }
}

/// Write one reply line and flush.
fn respond(text: &str) {
    println!("{text}");
    let _ = io::stdout().flush();
}

/// Match a move string (`e2e4`, `e7e8q`) against the legal moves of
/// `board`. Castling and en passant resolve through their king/pawn
/// origin-destination pairs; promotions require the matching piece letter.
fn find_move(board: &Board, text: &str) -> Option<Move> {
    let bytes = text.as_bytes();
    if bytes.len() < 4 || bytes.len() > 5 {
        return None;
    }
    let from = formica_core::Square::from_algebraic(&text[0..2])?;
    let to = formica_core::Square::from_algebraic(&text[2..4])?;
    let promo = if bytes.len() == 5 {
        Some(Promotion::from_letter(bytes[4] as char)?)
    } else {
        None
    };

    generate_legal_moves(board).iter().find(|mv| {
        mv.from() == from
            && mv.to() == to
            && match promo {
                Some(p) => mv.is_promotion() && mv.promotion_piece() == p,
                None => !mv.is_promotion(),
            }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use formica_core::MoveFlag;

    #[test]
    fn find_move_normal() {
        let board = Board::starting_position();
        let mv = find_move(&board, "e2e4").unwrap();
        assert_eq!(mv.to_string(), "e2e4");
        assert_eq!(mv.flag(), MoveFlag::DoublePush);
    }

    #[test]
    fn find_move_rejects_illegal() {
        let board = Board::starting_position();
        assert!(find_move(&board, "e2e5").is_none());
        assert!(find_move(&board, "e7e5").is_none(), "wrong side's move");
        assert!(find_move(&board, "zzzz").is_none());
        assert!(find_move(&board, "e2").is_none());
    }

    #[test]
    fn find_move_resolves_castling() {
        let board: Board = "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1"
            .parse()
            .unwrap();
        let mv = find_move(&board, "e1g1").unwrap();
        assert_eq!(mv.flag(), MoveFlag::CastleKing);
        let mv = find_move(&board, "e1c1").unwrap();
        assert_eq!(mv.flag(), MoveFlag::CastleQueen);
    }

    #[test]
    fn find_move_resolves_promotion_piece() {
        let board: Board = "4k3/4P3/8/8/8/8/8/4K3 w - - 0 1".parse().unwrap();
        let queen = find_move(&board, "e7e8q").unwrap();
        assert_eq!(queen.promotion_piece(), Promotion::Queen);
        let knight = find_move(&board, "e7e8n").unwrap();
        assert_eq!(knight.promotion_piece(), Promotion::Knight);
        assert!(
            find_move(&board, "e7e8").is_none(),
            "promotion requires its piece letter"
        );
    }

    #[test]
    fn position_startpos_with_moves_updates_board_and_history() {
        let mut shell = Shell::new();
        shell.handle_position(
            PositionSetup::Start,
            &["e2e4".into(), "e7e5".into(), "g1f3".into(), "b8c6".into()],
        );
        assert_eq!(shell.history.len(), 4);
        // Most recent position first.
        assert_eq!(shell.history[0], shell.board.hash());
        assert_eq!(shell.board.fullmove_number(), 3);
    }

    #[test]
    fn invalid_fen_keeps_old_position() {
        let mut shell = Shell::new();
        let before = shell.board;
        shell.handle_position(PositionSetup::Fen("not a fen".into()), &[]);
        assert_eq!(shell.board, before);
    }

    #[test]
    fn invalid_move_is_skipped_but_rest_apply() {
        let mut shell = Shell::new();
        shell.handle_position(
            PositionSetup::Start,
            &["e2e4".into(), "e2e4".into(), "e7e5".into()],
        );
        // The duplicate e2e4 is skipped (no white pawn on e2 anymore);
        // e7e5 still applies.
        assert_eq!(shell.history.len(), 2);
    }

    #[test]
    fn history_is_capped_at_sixteen() {
        let mut shell = Shell::new();
        let moves: Vec<String> = [
            "g1f3", "g8f6", "f3g1", "f6g8", "b1c3", "b8c6", "c3b1", "c6b8",
            "g1f3", "g8f6", "f3g1", "f6g8", "b1c3", "b8c6", "c3b1", "c6b8",
            "e2e4", "e7e5",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        shell.handle_position(PositionSetup::Start, &moves);
        assert_eq!(shell.history.len(), 16);
        let array = shell.history_array();
        assert_eq!(array[0], shell.board.hash());
    }
}
