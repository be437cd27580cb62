//! Static move scoring and the incremental selection-sort picker.

use formica_core::{Board, Move, MoveList, PieceKind, Promotion, generate_legal_moves};

/// Ordering value of capturing each piece kind.
pub const CAPTURE_VALUE: [i32; 6] = [136, 782, 830, 1289, 2529, 0];

/// Ordering bonus for the move the transposition table remembers.
pub const TT_MOVE_BONUS: i32 = 1_000_000;

/// Ordering bonus for the game tree's most-reinforced move.
pub const TREE_MOVE_BONUS: i32 = 2_000_000;

/// Ordering bonus for the primary killer at a ply.
pub const KILLER_PRIMARY_BONUS: i32 = 5_000;

/// Ordering bonus for the secondary killer at a ply.
pub const KILLER_SECONDARY_BONUS: i32 = 3_000;

/// Cheap attackers break ties upward: a pawn capturing a queen must order
/// ahead of a queen capturing a queen.
fn attacker_bias(kind: PieceKind) -> i32 {
    match kind {
        PieceKind::Pawn => 5,
        PieceKind::Knight => 3,
        PieceKind::Bishop => 2,
        PieceKind::Rook => 1,
        _ => 0,
    }
}

/// Score a move for search ordering.
///
/// Bands: checks 10000+, queen promotions 3000+, captures 136..2534,
/// threats on heavy pieces 60..98, quiet mobility 1..100, quiet pawn +5.
///
/// With `captures_only` the function stops after the capture and promotion
/// terms and never plays the move out, which keeps quiescence scoring cheap.
pub fn score_move(board: &Board, mv: Move, captures_only: bool) -> i32 {
    let mover = board.piece_on(mv.from()).unwrap_or(PieceKind::Pawn);

    let mut score = if mv.is_capture() {
        let victim = if mv.is_en_passant() {
            PieceKind::Pawn
        } else {
            board.piece_on(mv.to()).unwrap_or(PieceKind::Pawn)
        };
        CAPTURE_VALUE[victim.index()]
    } else {
        0
    };
    if score != 0 {
        score += attacker_bias(mover);
    }
    if mv.is_promotion() && mv.promotion_piece() == Promotion::Queen {
        score += 3_000;
    }
    if captures_only {
        return score;
    }

    let next = board.play(mv);
    let us = board.side_to_move();
    let them = next.side_to_move();

    if next.in_check(them) {
        return score + 10_000;
    }
    if score != 0 {
        return score;
    }

    // A quiet move that newly pressures a heavy enemy piece.
    for (kind, bonus) in [
        (PieceKind::Queen, 90),
        (PieceKind::Rook, 80),
        (PieceKind::Bishop, 70),
        (PieceKind::Knight, 60),
    ] {
        let targets = next.pieces(kind) & next.side(them);
        if Iterator::any(&mut targets.into_iter(), |sq| next.is_square_attacked(sq, us)) {
            score += bonus + attacker_bias(mover);
            break;
        }
    }

    if score == 0 {
        // Mobility: restrict the opponent's replies.
        score += 200 / (generate_legal_moves(&next).len() as i32 + 1);
    }
    if mover == PieceKind::Pawn {
        score += 5;
    }
    score
}

/// Incremental move picker: selection sort over the unselected suffix, so a
/// beta cutoff after the first few moves never pays for a full sort.
pub struct MovePicker {
    moves: [Move; 256],
    scores: [i32; 256],
    len: usize,
    cursor: usize,
    min_score: i32,
}

impl MovePicker {
    /// Picker for interior nodes, layering the table and killer bonuses on
    /// top of the static score.
    pub fn new(
        moves: &MoveList,
        board: &Board,
        tt_move: Move,
        tree_move: Move,
        killers: [Move; 2],
    ) -> MovePicker {
        let mut picker = MovePicker {
            moves: [Move::NULL; 256],
            scores: [0; 256],
            len: moves.len(),
            cursor: 0,
            min_score: i32::MIN,
        };
        for (i, mv) in moves.iter().enumerate() {
            let mut score = score_move(board, mv, false);
            if !tt_move.is_null() && mv == tt_move {
                score += TT_MOVE_BONUS;
            }
            if !tree_move.is_null() && mv == tree_move {
                score += TREE_MOVE_BONUS;
            }
            if mv == killers[0] {
                score += KILLER_PRIMARY_BONUS;
            } else if mv == killers[1] {
                score += KILLER_SECONDARY_BONUS;
            }
            picker.moves[i] = mv;
            picker.scores[i] = score;
        }
        picker
    }

    /// Picker for quiescence: yields captures, promotions and checking moves
    /// only, or every move when the side to move is in check.
    pub fn new_quiescence(moves: &MoveList, board: &Board, in_check: bool) -> MovePicker {
        let mut picker = MovePicker {
            moves: [Move::NULL; 256],
            scores: [0; 256],
            len: moves.len(),
            cursor: 0,
            min_score: 0,
        };
        for (i, mv) in moves.iter().enumerate() {
            let score = score_move(board, mv, false);
            let tactical =
                in_check || mv.is_capture() || mv.is_promotion() || score >= 10_000;
            picker.moves[i] = mv;
            picker.scores[i] = if tactical { score } else { -1 };
        }
        picker
    }

    /// The next highest-scored move and its score, `None` once exhausted or
    /// once every remaining move falls below the picker's floor.
    pub fn next(&mut self) -> Option<(Move, i32)> {
        if self.cursor >= self.len {
            return None;
        }

        let mut best = self.cursor;
        for i in (self.cursor + 1)..self.len {
            if self.scores[i] > self.scores[best] {
                best = i;
            }
        }
        if self.scores[best] < self.min_score {
            return None;
        }

        self.moves.swap(self.cursor, best);
        self.scores.swap(self.cursor, best);
        let picked = (self.moves[self.cursor], self.scores[self.cursor]);
        self.cursor += 1;
        Some(picked)
    }
}
