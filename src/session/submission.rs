use chess::{Board, ChessMove, Color, Piece, Square};
use log::{debug, warn};

use crate::error::{Rejection, TransportError};
use crate::game::rules::{AppliedMove, RulesEngine};
use crate::models::{GameRecord, Notice, Signal};
use crate::session::navigation::NavigationCursor;

/// A move as entered by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRequest {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Piece>,
}

/// Locally applied move shown until the next authoritative snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    pub applied: AppliedMove,
    pub san: String,
}

/// Validate, apply optimistically and submit once
#[derive(Debug, Default)]
pub struct MovePipeline {
    in_flight: bool,
    overlay: Option<Overlay>,
}

impl MovePipeline {
    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Run every local precondition and, when they all hold, install the
    /// overlay and mark the submission in flight. The caller owns the single
    /// network call for the returned move.
    pub fn begin(
        &mut self,
        record: Option<&GameRecord>,
        me: Option<Color>,
        cursor: &NavigationCursor,
        rules: &dyn RulesEngine,
        request: MoveRequest,
    ) -> Result<(ChessMove, Signal), Rejection> {
        let record = record.ok_or(Rejection::NotLoaded)?;
        let me = me.ok_or(Rejection::Spectator)?;
        if !cursor.is_live() {
            return Err(Rejection::Browsing);
        }
        if !record.is_in_progress() || rules.is_terminal(&record.position) {
            return Err(Rejection::NotInProgress);
        }
        if rules.side_to_move(&record.position) != me {
            return Err(Rejection::NotYourTurn);
        }
        if self.in_flight {
            return Err(Rejection::SubmissionInFlight);
        }

        // Always validated against the canonical position, never the overlay
        let applied = rules.apply(&record.position, request.from, request.to, request.promotion)?;
        let san = rules.encode_move(&record.position, applied.mv);
        debug!("Optimistically applying {} in {}", san, record.id);

        let signal = Signal::MoveApplied {
            san: san.clone(),
            class: applied.class,
            by: me,
            optimistic: true,
        };
        self.overlay = Some(Overlay { applied, san });
        self.in_flight = true;
        Ok((applied.mv, signal))
    }

    /// The submission call returned. Failures are reported once and the
    /// overlay is left for the next snapshot to replace.
    pub fn settle(&mut self, result: Result<(), TransportError>) -> Option<Notice> {
        self.in_flight = false;
        match result {
            Ok(()) => None,
            Err(e) => {
                warn!("Move submission failed: {}", e);
                Some(Notice::error("Failed to make move. Please try again."))
            }
        }
    }

    /// An authoritative snapshot arrived
    pub fn supersede(&mut self) {
        self.overlay = None;
    }

    /// Position on screen while the cursor is live
    pub fn displayed<'a>(&'a self, canonical: &'a Board) -> &'a Board {
        self.overlay
            .as_ref()
            .map_or(canonical, |overlay| &overlay.applied.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::rules::ChessRules;
    use crate::models::fixtures::*;
    use crate::models::{GameStatus, MoveClass};

    fn e2e4() -> MoveRequest {
        MoveRequest { from: Square::E2, to: Square::E4, promotion: None }
    }

    #[test]
    fn legal_move_goes_out_once() {
        let record = record();
        let mut pipeline = MovePipeline::default();
        let cursor = NavigationCursor::default();
        let (mv, signal) = pipeline
            .begin(Some(&record), Some(Color::White), &cursor, &ChessRules, e2e4())
            .unwrap();
        assert_eq!(mv, ChessMove::new(Square::E2, Square::E4, None));
        assert_eq!(
            signal,
            Signal::MoveApplied {
                san: "e4".to_string(),
                class: MoveClass::Quiet,
                by: Color::White,
                optimistic: true,
            }
        );
        assert_ne!(pipeline.displayed(&record.position), &record.position);

        let again = pipeline.begin(Some(&record), Some(Color::White), &cursor, &ChessRules, e2e4());
        assert_eq!(again, Err(Rejection::SubmissionInFlight));
    }

    #[test]
    fn preconditions_are_checked_before_legality() {
        let record = record();
        let mut pipeline = MovePipeline::default();
        let mut cursor = NavigationCursor::default();

        let wrong_side = pipeline.begin(Some(&record), Some(Color::Black), &cursor, &ChessRules, e2e4());
        assert_eq!(wrong_side, Err(Rejection::NotYourTurn));

        let spectator = pipeline.begin(Some(&record), None, &cursor, &ChessRules, e2e4());
        assert_eq!(spectator, Err(Rejection::Spectator));

        cursor.go_to_start();
        let browsing = pipeline.begin(Some(&record), Some(Color::White), &cursor, &ChessRules, e2e4());
        assert_eq!(browsing, Err(Rejection::Browsing));

        let mut finished = record.clone();
        finished.status = GameStatus::Completed;
        let live = NavigationCursor::default();
        let over = pipeline.begin(Some(&finished), Some(Color::White), &live, &ChessRules, e2e4());
        assert_eq!(over, Err(Rejection::NotInProgress));

        assert!(!pipeline.in_flight());
        assert!(pipeline.overlay().is_none());
    }

    #[test]
    fn illegal_move_changes_nothing() {
        let record = record();
        let mut pipeline = MovePipeline::default();
        let request = MoveRequest { from: Square::E2, to: Square::E5, promotion: None };
        let result = pipeline.begin(
            Some(&record),
            Some(Color::White),
            &NavigationCursor::default(),
            &ChessRules,
            request,
        );
        assert_eq!(result, Err(Rejection::IllegalMove));
        assert!(!pipeline.in_flight());
        assert!(pipeline.overlay().is_none());
    }

    #[test]
    fn failure_keeps_the_overlay_until_a_snapshot() {
        let record = record();
        let mut pipeline = MovePipeline::default();
        pipeline
            .begin(Some(&record), Some(Color::White), &NavigationCursor::default(), &ChessRules, e2e4())
            .unwrap();
        let notice = pipeline.settle(Err(TransportError::Unavailable)).unwrap();
        assert_eq!(notice.text, "Failed to make move. Please try again.");
        assert!(pipeline.overlay().is_some());
        assert!(!pipeline.in_flight());

        pipeline.supersede();
        assert_eq!(pipeline.displayed(&record.position), &record.position);
    }
}
