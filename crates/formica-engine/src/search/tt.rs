//! Lockless transposition table with XOR-verified slots.
//!
//! Each slot holds the full position packed into eight words, plus a pair
//! of `AtomicU64` words: `data` packs the search result and
//! `key = hash ^ data`. A writer stores the position words, then `data`,
//! then `key`; a reader recomputes the XOR and rejects any slot where
//! `key ^ data != probed_hash`, so a torn write of the result pair (one
//! word old, one new) is never accepted. Entries are further verified by
//! comparing the stored position words against the probed board, which
//! rejects both genuine hash collisions and position words torn by a
//! concurrent overwrite. All accesses are `Relaxed`: no ordering between
//! entries is required, only per-slot consistency, which the two checks
//! provide together.
//!
//! Buckets hold two slots; replacement evicts the shallower entry, and an
//! existing deeper entry for the same position is never overwritten.

use std::sync::atomic::{AtomicU64, Ordering};

use formica_core::{Board, Color, Move, PieceKind};

use crate::search::MATE_THRESHOLD;

/// How the stored score bounds the true value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Bound {
    /// Empty slot.
    None = 0,
    /// Exact score (PV node).
    Exact = 1,
    /// Score is a lower bound (beta cutoff).
    LowerBound = 2,
    /// Score is an upper bound (failed low).
    UpperBound = 3,
}

impl Bound {
    const fn from_bits(bits: u8) -> Bound {
        match bits & 0x03 {
            1 => Bound::Exact,
            2 => Bound::LowerBound,
            3 => Bound::UpperBound,
            _ => Bound::None,
        }
    }
}

/// Slots per bucket.
const BUCKET_SIZE: usize = 2;

/// Words in a packed position.
const POSITION_WORDS: usize = 8;

/// Outcome of a probe: a usable score when the bound allows a cutoff, and
/// the stored move for ordering whenever the position matched at all.
#[derive(Debug, Clone, Copy)]
pub struct TtProbe {
    /// Cutoff score, already filtered by bound and window.
    pub score: Option<i32>,
    /// Stored best move, [`Move::NULL`] on a miss.
    pub best_move: Move,
}

/// Convert a score to its ply-independent stored form.
fn score_to_tt(score: i32, ply: u8) -> i32 {
    if score > MATE_THRESHOLD {
        score + ply as i32
    } else if score < -MATE_THRESHOLD {
        score - ply as i32
    } else {
        score
    }
}

/// Reverse [`score_to_tt`].
fn score_from_tt(score: i32, ply: u8) -> i32 {
    if score > MATE_THRESHOLD {
        score - ply as i32
    } else if score < -MATE_THRESHOLD {
        score + ply as i32
    } else {
        score
    }
}

/// Pack a board's identity into eight words: the six piece-kind masks,
/// White's side mask, and a state word (side to move, castling rights,
/// en-passant square). Black's side mask is the union of the kind masks
/// minus White's, so it needs no word of its own.
fn pack_position(board: &Board) -> [u64; POSITION_WORDS] {
    let mut words = [0u64; POSITION_WORDS];
    for kind in PieceKind::ALL {
        words[kind.index()] = board.pieces(kind).bits();
    }
    words[6] = board.side(Color::White).bits();
    let ep = board.en_passant().map_or(64, |sq| sq.index() as u64);
    words[7] = board.side_to_move().index() as u64
        | ((board.castling().bits() as u64) << 1)
        | (ep << 8);
    words
}

/// Pack a search result into a data word.
///
/// Layout: `[63:56] bound | [55:48] depth | [47:32] move | [31:0] score`.
fn pack(score: i32, mv: Move, depth: u8, bound: Bound) -> u64 {
    (score as u32 as u64)
        | ((mv.raw() as u64) << 32)
        | ((depth as u64) << 48)
        | ((bound as u8 as u64) << 56)
}

fn unpack_score(data: u64) -> i32 {
    data as u32 as i32
}

fn unpack_move(data: u64) -> Move {
    Move::from_raw((data >> 32) as u16)
}

fn unpack_depth(data: u64) -> u8 {
    (data >> 48) as u8
}

fn unpack_bound(data: u64) -> Bound {
    Bound::from_bits((data >> 56) as u8)
}

struct Slot {
    key: AtomicU64,
    data: AtomicU64,
    position: [AtomicU64; POSITION_WORDS],
}

impl Slot {
    fn new() -> Slot {
        Slot {
            key: AtomicU64::new(0),
            data: AtomicU64::new(0),
            position: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Load the data word iff the XOR check confirms it belongs to `hash`
    /// and the stored position words match `position` exactly.
    fn load_verified(&self, hash: u64, position: &[u64; POSITION_WORDS]) -> Option<u64> {
        let key = self.key.load(Ordering::Relaxed);
        let data = self.data.load(Ordering::Relaxed);
        if key ^ data != hash || unpack_bound(data) == Bound::None {
            return None;
        }
        for (stored, expected) in self.position.iter().zip(position) {
            if stored.load(Ordering::Relaxed) != *expected {
                return None;
            }
        }
        Some(data)
    }
}

/// Shared, lock-free transposition table. All methods take `&self`.
pub struct TranspositionTable {
    slots: Box<[Slot]>,
    num_buckets: u64,
}

impl TranspositionTable {
    /// Allocate a table with room for roughly `capacity` entries.
    pub fn new(capacity: usize) -> TranspositionTable {
        let num_buckets = (capacity / BUCKET_SIZE).max(1);
        let slots: Box<[Slot]> = (0..num_buckets * BUCKET_SIZE).map(|_| Slot::new()).collect();
        TranspositionTable {
            slots,
            num_buckets: num_buckets as u64,
        }
    }

    fn bucket(&self, hash: u64) -> &[Slot] {
        let base = (hash % self.num_buckets) as usize * BUCKET_SIZE;
        &self.slots[base..base + BUCKET_SIZE]
    }

    /// Reset every slot to empty.
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.data.store(0, Ordering::Relaxed);
            slot.key.store(0, Ordering::Relaxed);
            for word in &slot.position {
                word.store(0, Ordering::Relaxed);
            }
        }
    }

    /// Probe for `board` with the caller's window and required depth.
    ///
    /// A slot is accepted only when its XOR check matches the board's hash
    /// and its stored position equals the board. The score is returned only
    /// when the stored depth covers `depth` and the stored bound resolves
    /// against `(alpha, beta)`: exact scores pass through, lower bounds
    /// return `beta` when `score >= beta`, upper bounds return `alpha` when
    /// `score <= alpha`. The stored move is surfaced whenever the position
    /// matches, cutoff or not, for use in move ordering.
    pub fn probe(&self, board: &Board, alpha: i32, beta: i32, depth: u8, ply: u8) -> TtProbe {
        let hash = board.hash();
        let position = pack_position(board);
        let mut result = TtProbe {
            score: None,
            best_move: Move::NULL,
        };

        for slot in self.bucket(hash) {
            let Some(data) = slot.load_verified(hash, &position) else {
                continue;
            };
            result.best_move = unpack_move(data);

            if unpack_depth(data) >= depth && result.score.is_none() {
                let score = score_from_tt(unpack_score(data), ply);
                result.score = match unpack_bound(data) {
                    Bound::Exact => Some(score),
                    Bound::LowerBound if score >= beta => Some(beta),
                    Bound::UpperBound if score <= alpha => Some(alpha),
                    _ => None,
                };
            }
        }

        result
    }

    /// Store a search result for `board`.
    ///
    /// Refuses to replace a deeper entry for the same position; otherwise
    /// overwrites the shallower slot of the bucket. The position words are
    /// written first, then the data word, then the key word, so concurrent
    /// readers reject every half-written state through the XOR check and
    /// the position comparison.
    pub fn store(&self, board: &Board, score: i32, best_move: Move, depth: u8, bound: Bound, ply: u8) {
        let hash = board.hash();
        let position = pack_position(board);
        let bucket = self.bucket(hash);

        let mut victim = 0;
        let mut victim_depth = u8::MAX;
        for (i, slot) in bucket.iter().enumerate() {
            let data = slot.data.load(Ordering::Relaxed);

            if slot.load_verified(hash, &position).is_some() && unpack_depth(data) > depth {
                return;
            }

            let slot_depth = if unpack_bound(data) == Bound::None {
                0
            } else {
                unpack_depth(data)
            };
            if slot_depth < victim_depth {
                victim_depth = slot_depth;
                victim = i;
            }
        }

        let slot = &bucket[victim];
        for (word, value) in slot.position.iter().zip(&position) {
            word.store(*value, Ordering::Relaxed);
        }
        let data = pack(score_to_tt(score, ply), best_move, depth, bound);
        slot.data.store(data, Ordering::Relaxed);
        slot.key.store(hash ^ data, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for TranspositionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranspositionTable")
            .field("slots", &self.slots.len())
            .finish()
    }
}
