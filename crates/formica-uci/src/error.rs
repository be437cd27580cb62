//! Protocol errors.
//!
//! The shell's policy is to ignore malformed input (bad FENs leave the
//! position untouched, bad moves are skipped), so these errors end up in
//! log output rather than on the wire.

/// Why a protocol line could not be honoured.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The `position` command named neither `startpos` nor `fen`.
    #[error("position command needs startpos or fen")]
    MalformedPosition,

    /// A FEN string failed to parse.
    #[error("invalid FEN \"{fen}\": {source}")]
    InvalidFen {
        /// The FEN text.
        fen: String,
        /// The underlying parse error.
        #[source]
        source: formica_core::FenError,
    },

    /// A move string did not match any legal move.
    #[error("invalid or illegal move \"{text}\"")]
    InvalidMove {
        /// The move text as received.
        text: String,
    },

    /// Reading stdin failed.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}
