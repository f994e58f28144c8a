//! Edge predicates over a pair of consecutive snapshots.
//!
//! Each predicate answers one question about the transition from `prev` to
//! `next` and is a no-op (`false` / `None`) when the two are equal, which is
//! what makes reconciliation idempotent under duplicate delivery. `prev` is
//! `None` for the first snapshot of a session.

use chess::Color;

use crate::models::{GameRecord, GameStatus};

/// The game just reached `COMPLETED`
pub fn completion(prev: Option<&GameRecord>, next: &GameRecord) -> bool {
    next.status == GameStatus::Completed
        && prev.map_or(true, |p| p.status != GameStatus::Completed)
}

/// The move list changed
pub fn moves_changed(prev: Option<&GameRecord>, next: &GameRecord) -> bool {
    prev.is_some_and(|p| p.moves != next.moves)
}

/// A draw offer appeared, or passed to the other side; yields the offerer
pub fn draw_offer_appeared(prev: Option<&GameRecord>, next: &GameRecord) -> Option<Color> {
    let offered = next.draw.pending_from()?;
    (prev.and_then(|p| p.draw.pending_from()) != Some(offered)).then_some(offered)
}

/// A draw offer was withdrawn, declined or settled; yields the former offerer
pub fn draw_offer_cleared(prev: Option<&GameRecord>, next: &GameRecord) -> Option<Color> {
    let offered = prev?.draw.pending_from()?;
    next.draw.pending_from().is_none().then_some(offered)
}

pub fn rematch_offer_appeared(prev: Option<&GameRecord>, next: &GameRecord) -> Option<Color> {
    let offered = next.rematch.pending_from()?;
    (prev.and_then(|p| p.rematch.pending_from()) != Some(offered)).then_some(offered)
}

pub fn rematch_offer_cleared(prev: Option<&GameRecord>, next: &GameRecord) -> Option<Color> {
    let offered = prev?.rematch.pending_from()?;
    next.rematch.pending_from().is_none().then_some(offered)
}

/// Successor session manufactured by an accepted rematch, other than this one
pub fn rematch_successor<'a>(session_id: &str, next: &'a GameRecord) -> Option<&'a str> {
    next.rematch
        .accepted_successor()
        .filter(|successor| *successor != session_id)
}

/// `next` is older than `prev` and must not replace it.
///
/// Equal snapshots are never stale; a duplicate is handled by the
/// predicates above being no-ops.
pub fn is_stale(prev: &GameRecord, next: &GameRecord) -> bool {
    if let (Some(applied), Some(incoming)) = (prev.version, next.version) {
        if incoming < applied {
            return true;
        }
    }
    if next.status < prev.status {
        return true;
    }
    if prev.status == GameStatus::Completed
        && (prev.winner != next.winner || prev.finish_reason != next.finish_reason)
    {
        return true;
    }
    next.draw.white_offers < prev.draw.white_offers
        || next.draw.black_offers < prev.draw.black_offers
}
