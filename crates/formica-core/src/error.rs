//! FEN parsing errors.

/// Why a FEN string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FenError {
    /// Not enough space-separated fields (piece placement through move counters).
    #[error("expected at least 4 FEN fields, found {found}")]
    WrongFieldCount {
        /// Number of fields found.
        found: usize,
    },

    /// The piece placement does not describe exactly 8 ranks of 8 squares.
    #[error("malformed piece placement: {reason}")]
    BadPlacement {
        /// What was wrong with the placement field.
        reason: &'static str,
    },

    /// An unrecognized piece letter.
    #[error("invalid piece character '{character}'")]
    InvalidPiece {
        /// The offending character.
        character: char,
    },

    /// The side-to-move field is not `w` or `b`.
    #[error("invalid side to move \"{found}\"")]
    InvalidSideToMove {
        /// The offending field.
        found: String,
    },

    /// An unrecognized castling-rights character.
    #[error("invalid castling character '{character}'")]
    InvalidCastling {
        /// The offending character.
        character: char,
    },

    /// The en-passant field is neither `-` nor a valid square.
    #[error("invalid en passant square \"{found}\"")]
    InvalidEnPassant {
        /// The offending field.
        found: String,
    },

    /// A move counter is not a number.
    #[error("invalid {field} \"{found}\"")]
    InvalidCounter {
        /// Which counter ("halfmove clock" or "fullmove number").
        field: &'static str,
        /// The offending field.
        found: String,
    },

    /// The described position is structurally impossible.
    #[error("invalid position: {reason}")]
    InvalidPosition {
        /// What structural rule was violated.
        reason: &'static str,
    },
}
