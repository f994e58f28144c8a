//! Live clocks derived from the last authoritative base times.
//!
//! The backend only reports each side's remaining time as of the last move,
//! plus the timestamp of that move. Everything shown between snapshots is
//! computed here from wall time; nothing in this module ever ends a game.

use chess::Color;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::game::rules::RulesEngine;
use crate::game::utils::format_clock;
use crate::models::{ClockView, GameRecord, GameStatus};

/// Source of wall-clock time in milliseconds since the Unix epoch
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Hand-driven time source
#[derive(Debug, Default)]
pub struct ManualTime(AtomicU64);

impl ManualTime {
    pub fn new(now_ms: u64) -> Self {
        ManualTime(AtomicU64::new(now_ms))
    }

    pub fn set(&self, now_ms: u64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by_ms: u64) {
        self.0.fetch_add(by_ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTime {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockInputs {
    pub white_base: u64,
    pub black_base: u64,
    pub last_move_at_ms: Option<u64>,
    pub active_side: Color,
    pub status: GameStatus,
}

impl ClockInputs {
    pub fn from_record(record: &GameRecord, rules: &dyn RulesEngine) -> Self {
        ClockInputs {
            white_base: record.white_time_left,
            black_base: record.black_time_left,
            last_move_at_ms: record.last_move_at_ms,
            active_side: rules.side_to_move(&record.position),
            status: record.status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSnapshot {
    pub white_remaining: u64,
    pub black_remaining: u64,
    pub active_side: Color,
    pub running: bool,
}

impl ClockSnapshot {
    pub fn remaining(&self, side: Color) -> u64 {
        match side {
            Color::White => self.white_remaining,
            Color::Black => self.black_remaining,
        }
    }

    /// Side whose derived time ran out while the game is still running
    pub fn flagged(&self) -> Option<Color> {
        (self.running && self.remaining(self.active_side) == 0).then_some(self.active_side)
    }

    pub fn to_view(&self) -> ClockView {
        ClockView {
            white_remaining: self.white_remaining,
            black_remaining: self.black_remaining,
            white_display: format_clock(self.white_remaining),
            black_display: format_clock(self.black_remaining),
            active_side: self.active_side,
            running: self.running,
        }
    }
}

/// Remaining time per side at `now_ms`.
///
/// Only the side to move loses time, in whole elapsed seconds since the last
/// move. Outside `IN_PROGRESS`, or before the first move is stamped, both
/// clocks stay at their base values.
pub fn derive_clocks(inputs: &ClockInputs, now_ms: u64) -> ClockSnapshot {
    let running = inputs.status == GameStatus::InProgress;
    let mut snapshot = ClockSnapshot {
        white_remaining: inputs.white_base,
        black_remaining: inputs.black_base,
        active_side: inputs.active_side,
        running,
    };

    if let (true, Some(last_move_at)) = (running, inputs.last_move_at_ms) {
        let elapsed = now_ms.saturating_sub(last_move_at) / 1000;
        match inputs.active_side {
            Color::White => snapshot.white_remaining = inputs.white_base.saturating_sub(elapsed),
            Color::Black => snapshot.black_remaining = inputs.black_base.saturating_sub(elapsed),
        }
    }
    snapshot
}

/// Raises the advisory timeout once per flagged side and position
#[derive(Debug, Default)]
pub struct ClockWatch {
    flagged: Option<(Color, usize)>,
}

impl ClockWatch {
    pub fn observe(&mut self, snapshot: &ClockSnapshot, plies: usize) -> Option<Color> {
        let side = snapshot.flagged()?;
        if self.flagged == Some((side, plies)) {
            return None;
        }
        self.flagged = Some((side, plies));
        Some(side)
    }
}
