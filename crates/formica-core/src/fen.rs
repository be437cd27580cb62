//! Forsyth-Edwards notation parsing and formatting.

use std::str::FromStr;

use crate::bitboard::Bitboard;
use crate::board::Board;
use crate::castle::{CastleSide, Castling};
use crate::color::Color;
use crate::error::FenError;
use crate::piece::PieceKind;
use crate::square::Square;

/// FEN of the standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

impl FromStr for Board {
    type Err = FenError;

    /// Parse a FEN string.
    ///
    /// The halfmove and fullmove counters are optional and default to `0 1`;
    /// when present they are stored but do not participate in position
    /// equality.
    fn from_str(s: &str) -> Result<Board, FenError> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(FenError::WrongFieldCount { found: fields.len() });
        }

        let (kinds, sides) = parse_placement(fields[0])?;

        let stm = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => {
                return Err(FenError::InvalidSideToMove {
                    found: other.to_string(),
                });
            }
        };

        let castling = parse_castling(fields[2])?;

        let ep = match fields[3] {
            "-" => None,
            s => Some(Square::from_algebraic(s).ok_or_else(|| FenError::InvalidEnPassant {
                found: s.to_string(),
            })?),
        };

        let halfmove = match fields.get(4) {
            None => 0,
            Some(s) => s.parse().map_err(|_| FenError::InvalidCounter {
                field: "halfmove clock",
                found: s.to_string(),
            })?,
        };
        let fullmove = match fields.get(5) {
            None => 1,
            Some(s) => s.parse().map_err(|_| FenError::InvalidCounter {
                field: "fullmove number",
                found: s.to_string(),
            })?,
        };

        for color in Color::ALL {
            let kings = (kinds[PieceKind::King.index()] & sides[color.index()]).count();
            if kings != 1 {
                return Err(FenError::InvalidPosition {
                    reason: "each side must have exactly one king",
                });
            }
        }
        let pawns = kinds[PieceKind::Pawn.index()];
        if (pawns & (Bitboard::RANK_1 | Bitboard::RANK_8)).any() {
            return Err(FenError::InvalidPosition {
                reason: "pawns may not stand on the back ranks",
            });
        }

        Ok(Board::from_parts(
            kinds, sides, stm, castling, ep, halfmove, fullmove,
        ))
    }
}

fn parse_placement(field: &str) -> Result<([Bitboard; 6], [Bitboard; 2]), FenError> {
    let mut kinds = [Bitboard::EMPTY; 6];
    let mut sides = [Bitboard::EMPTY; 2];

    let ranks: Vec<&str> = field.split('/').collect();
    if ranks.len() != 8 {
        return Err(FenError::BadPlacement {
            reason: "expected 8 ranks",
        });
    }

    for (i, rank_str) in ranks.iter().enumerate() {
        let rank = 7 - i as u8; // FEN lists rank 8 first
        let mut file = 0u8;
        for c in rank_str.chars() {
            if let Some(skip) = c.to_digit(10) {
                file += skip as u8;
                continue;
            }
            if file >= 8 {
                return Err(FenError::BadPlacement {
                    reason: "rank describes more than 8 squares",
                });
            }
            let (color, kind) =
                PieceKind::from_fen_char(c).ok_or(FenError::InvalidPiece { character: c })?;
            let sq = Square::new(rank, file);
            kinds[kind.index()] |= sq.bb();
            sides[color.index()] |= sq.bb();
            file += 1;
        }
        if file != 8 {
            return Err(FenError::BadPlacement {
                reason: "rank describes fewer than 8 squares",
            });
        }
    }

    Ok((kinds, sides))
}

fn parse_castling(field: &str) -> Result<Castling, FenError> {
    if field == "-" {
        return Ok(Castling::NONE);
    }
    let mut rights = Castling::NONE;
    for c in field.chars() {
        rights = match c {
            'K' => rights.with(Color::White, CastleSide::King),
            'Q' => rights.with(Color::White, CastleSide::Queen),
            'k' => rights.with(Color::Black, CastleSide::King),
            'q' => rights.with(Color::Black, CastleSide::Queen),
            _ => return Err(FenError::InvalidCastling { character: c }),
        };
    }
    Ok(rights)
}

/// Format a board as a FEN string.
pub fn to_fen(board: &Board) -> String {
    let mut out = String::new();

    for rank in (0..8).rev() {
        let mut empty = 0;
        for file in 0..8 {
            let sq = Square::new(rank, file);
            match (board.piece_on(sq), board.color_on(sq)) {
                (Some(kind), Some(color)) => {
                    if empty > 0 {
                        out.push(char::from_digit(empty, 10).expect("digit"));
                        empty = 0;
                    }
                    out.push(kind.to_fen_char(color));
                }
                _ => empty += 1,
            }
        }
        if empty > 0 {
            out.push(char::from_digit(empty, 10).expect("digit"));
        }
        if rank > 0 {
            out.push('/');
        }
    }

    out.push(' ');
    out.push_str(&board.side_to_move().to_string());
    out.push(' ');
    out.push_str(&board.castling().to_string());
    out.push(' ');
    match board.en_passant() {
        Some(sq) => out.push_str(&sq.to_string()),
        None => out.push('-'),
    }
    out.push_str(&format!(
        " {} {}",
        board.halfmove_clock(),
        board.fullmove_number()
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_fen_roundtrip() {
        let board: Board = STARTING_FEN.parse().unwrap();
        assert_eq!(to_fen(&board), STARTING_FEN);
    }

    #[test]
    fn arbitrary_fen_roundtrip() {
        let fens = [
            "r7/p3p1k1/1p1p1bBp/8/5P1P/1Rn4K/P1P3P1/4R3 w - - 4 29",
            "1r5k/5p2/3Q1n1b/3Pp2n/2Pq4/5PB1/1r1N2RP/3RKB2 b - - 3 28",
            "8/4RR2/4p1kp/pp3p2/2p4P/P3qPP1/4P1K1/8 w - - 4 33",
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1",
        ];
        for fen in fens {
            let board: Board = fen.parse().unwrap();
            assert_eq!(to_fen(&board), fen, "roundtrip failed for {fen}");
        }
    }

    #[test]
    fn counters_default_when_missing() {
        let board: Board = "4k3/8/8/8/8/8/8/4K3 w - -".parse().unwrap();
        assert_eq!(board.halfmove_clock(), 0);
        assert_eq!(board.fullmove_number(), 1);
    }

    #[test]
    fn rejects_bad_field_count() {
        assert!(matches!(
            "4k3/8/8/8/8/8/8/4K3 w".parse::<Board>(),
            Err(FenError::WrongFieldCount { found: 2 })
        ));
    }

    #[test]
    fn rejects_bad_rank_count() {
        assert!("4k3/8/8/8/8/8/4K3 w - - 0 1".parse::<Board>().is_err());
    }

    #[test]
    fn rejects_bad_piece_char() {
        assert!(matches!(
            "4x3/8/8/8/8/8/8/4K3 w - - 0 1".parse::<Board>(),
            Err(FenError::InvalidPiece { character: 'x' })
        ));
    }

    #[test]
    fn rejects_missing_king() {
        assert!(matches!(
            "8/8/8/8/8/8/8/4K3 w - - 0 1".parse::<Board>(),
            Err(FenError::InvalidPosition { .. })
        ));
    }

    #[test]
    fn rejects_pawn_on_back_rank() {
        assert!("P3k3/8/8/8/8/8/8/4K3 w - - 0 1".parse::<Board>().is_err());
    }

    #[test]
    fn rejects_bad_side_to_move() {
        assert!(matches!(
            "4k3/8/8/8/8/8/8/4K3 x - - 0 1".parse::<Board>(),
            Err(FenError::InvalidSideToMove { .. })
        ));
    }
}
