//! Merging authoritative snapshots into the session store.

use chess::{Board, Color};
use log::{debug, info, warn};

use crate::error::SnapshotError;
use crate::game::utils::{describe_result, describe_timeout};
use crate::models::{
    ClockView, FinishReason, GameRecord, Notice, ResultBanner, Signal, SnapshotMessage, Winner,
};
use crate::session::edges;
use crate::session::negotiation::DrawPhase;
use crate::session::store::SessionStore;
use crate::transport::SnapshotFrame;

/// What applying one snapshot produced
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub signals: Vec<Signal>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingest {
    Applied(Outcome),
    /// Older than what is already applied; dropped without effect
    Stale,
}

/// One clock recomputation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub clock: ClockView,
    pub timeout: Option<Signal>,
}

impl SessionStore {
    /// Decode and apply one pushed frame. A frame that fails to decode is
    /// discarded whole and the last good record stays in place.
    pub fn ingest(&mut self, frame: &SnapshotFrame) -> Result<Ingest, SnapshotError> {
        let message: SnapshotMessage = serde_json::from_str(&frame.0)?;
        if message.game_id != self.session_id {
            return Err(SnapshotError::WrongSession {
                expected: self.session_id.clone(),
                got: message.game_id,
            });
        }
        let next = message.decode(self.rules.as_ref())?;
        Ok(self.apply(next))
    }

    /// Replace the record with `next`, running every edge predicate against
    /// the record it replaces.
    pub fn apply(&mut self, next: GameRecord) -> Ingest {
        if let Some(prev) = self.record.as_ref() {
            if self.config.enforce_versions && edges::is_stale(prev, &next) {
                warn!(
                    "Dropping stale snapshot for {} (version {:?}, applied {:?})",
                    self.session_id, next.version, prev.version
                );
                return Ingest::Stale;
            }
        }

        let prev = self.record.take();
        let prev = prev.as_ref();
        let me = next.side_of(&self.viewer_id);
        let mut outcome = Outcome::default();

        if prev.is_none() {
            info!("Session {} loaded, viewer seat {:?}", self.session_id, me);
            outcome.signals.push(Signal::GameStarted);
        }

        let moves_changed = edges::moves_changed(prev, &next);
        if moves_changed || prev.is_none() {
            self.sans = san_list(self, &next);
        }
        if moves_changed {
            if self.banner.as_ref().is_some_and(|b| b.provisional) {
                self.banner = None;
            }
            if let Some(signal) = self.move_feedback(&next, me) {
                outcome.signals.push(signal);
            }
        }

        if edges::completion(prev, &next) {
            let text = describe_result(&next, me);
            info!("Session {} ended: {}", self.session_id, text);
            if next.finish_reason == Some(FinishReason::DrawAgreement)
                && self.draw.phase() == DrawPhase::PendingSent
            {
                outcome.notices.push(Notice::success("Draw accepted! Game ends in a draw."));
            }
            if next.finish_reason == Some(FinishReason::Resignation)
                && me.is_some_and(|side| winner_side(next.winner) == Some(side))
            {
                outcome.notices.push(Notice::success("Opponent resigned. You win!"));
            }
            self.banner = Some(ResultBanner {
                text: text.clone(),
                provisional: false,
            });
            outcome.signals.push(Signal::GameEnded { text });
        }

        if let Some(signal) = self.draw.observe(prev, &next, me) {
            match &signal {
                Signal::DrawOffered { from, .. } => {
                    outcome.notices.push(Notice::info(format!("{} offered a draw", from)))
                }
                Signal::DrawDeclined { .. } => {
                    outcome.notices.push(Notice::warning("Draw offer declined"))
                }
                _ => {}
            }
            outcome.signals.push(signal);
        }

        if let Some(signal) = self.rematch.observe(prev, &next, me) {
            match &signal {
                Signal::RematchOffered { from, .. } => {
                    outcome.notices.push(Notice::info(format!("{} wants a rematch", from)))
                }
                Signal::RematchDeclined { .. } => {
                    outcome.notices.push(Notice::warning("Rematch declined"))
                }
                Signal::Redirect { successor_id } => {
                    info!("Session {} continues as {}", self.session_id, successor_id);
                    outcome
                        .notices
                        .push(Notice::success("Rematch accepted! Starting new game..."))
                }
                _ => {}
            }
            outcome.signals.push(signal);
        }

        self.pipeline.supersede();
        debug!(
            "Applied snapshot {:?} to {}: {} signal(s)",
            next.version,
            self.session_id,
            outcome.signals.len()
        );
        self.record = Some(next);
        Ingest::Applied(outcome)
    }

    /// The opponent's move landed and it is the viewer's turn again
    fn move_feedback(&self, next: &GameRecord, me: Option<Color>) -> Option<Signal> {
        let me = me?;
        if self.rules.side_to_move(&next.position) != me {
            return None;
        }
        let (last, earlier) = next.moves.split_last()?;
        let before = self.rules.position_from_moves(earlier);
        Some(Signal::MoveApplied {
            san: self.rules.encode_move(&before, *last),
            class: self.rules.classify(&before, *last),
            by: !me,
            optimistic: false,
        })
    }

    /// Recompute the clocks. The first time the side to move reaches zero
    /// in a position, a provisional result is shown; the game itself only
    /// ends through a snapshot.
    pub fn tick(&mut self, now_ms: u64) -> Option<Tick> {
        let snapshot = self.clock_at(now_ms)?;
        let plies = self.record.as_ref().map_or(0, |r| r.moves.len());
        let me = self.viewer_color();

        let timeout = self.clock_watch.observe(&snapshot, plies).map(|side| {
            let text = describe_timeout(side, me);
            info!("Session {}: {:?} flag fell locally", self.session_id, side);
            if !self.banner.as_ref().is_some_and(|b| !b.provisional) {
                self.banner = Some(ResultBanner {
                    text: text.clone(),
                    provisional: true,
                });
            }
            Signal::LocalTimeout { side, text }
        });

        Some(Tick {
            clock: snapshot.to_view(),
            timeout,
        })
    }
}

fn san_list(store: &SessionStore, record: &GameRecord) -> Vec<String> {
    let mut board = Board::default();
    record
        .moves
        .iter()
        .map(|mv| {
            let san = store.rules.encode_move(&board, *mv);
            board = board.make_move_new(*mv);
            san
        })
        .collect()
}

fn winner_side(winner: Winner) -> Option<Color> {
    match winner {
        Winner::White => Some(Color::White),
        Winner::Black => Some(Color::Black),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::game::rules::ChessRules;
    use crate::models::fixtures::*;
    use crate::models::{GameStatus, MoveClass, RematchStatus};

    fn store(viewer: &str) -> SessionStore {
        SessionStore::new(GAME_ID, viewer, Box::new(ChessRules), SessionConfig::default())
    }

    fn signals(ingest: Ingest) -> Vec<Signal> {
        match ingest {
            Ingest::Applied(outcome) => outcome.signals,
            Ingest::Stale => panic!("snapshot unexpectedly stale"),
        }
    }

    fn frame(record: &GameRecord) -> SnapshotFrame {
        let message = SnapshotMessage::encode(record, &ChessRules);
        SnapshotFrame(serde_json::to_string(&message).unwrap())
    }

    #[test]
    fn duplicate_snapshot_is_silent() {
        let mut store = store(WHITE_ID);
        let snapshot = record_after(&["e4", "e5"]);
        assert_eq!(signals(store.apply(snapshot.clone())), vec![Signal::GameStarted]);
        assert_eq!(signals(store.apply(snapshot)), vec![]);
    }

    #[test]
    fn completion_fires_once() {
        let mut store = store(WHITE_ID);
        store.apply(record_after(&["f3", "e5", "g4"]));
        let mut mated = record_after(&["f3", "e5", "g4", "Qh4"]);
        mated.status = GameStatus::Completed;
        mated.winner = Winner::Black;
        mated.finish_reason = Some(FinishReason::Checkmate);

        let first = signals(store.apply(mated.clone()));
        assert!(first.contains(&Signal::GameEnded { text: "Checkmate - You Lost".to_string() }));
        assert_eq!(signals(store.apply(mated)), vec![]);
    }

    #[test]
    fn first_snapshot_already_completed_is_an_edge() {
        let mut store = store("carol");
        let mut done = record();
        done.status = GameStatus::Completed;
        done.winner = Winner::Draw;
        done.finish_reason = Some(FinishReason::Stalemate);
        let fired = signals(store.apply(done));
        assert_eq!(
            fired,
            vec![Signal::GameStarted, Signal::GameEnded { text: "Draw by Stalemate".to_string() }]
        );
    }

    #[test]
    fn opponent_move_is_classified_for_the_viewer() {
        let mut store = store(BLACK_ID);
        store.apply(record_after(&["e4", "d5"]));
        let fired = signals(store.apply(record_after(&["e4", "d5", "exd5"])));
        assert_eq!(
            fired,
            vec![Signal::MoveApplied {
                san: "exd5".to_string(),
                class: MoveClass::Capture,
                by: Color::White,
                optimistic: false,
            }]
        );
    }

    #[test]
    fn own_confirmed_move_is_not_announced_twice() {
        let mut store = store(WHITE_ID);
        store.apply(record());
        assert_eq!(signals(store.apply(record_after(&["e4"]))), vec![]);
    }

    #[test]
    fn stale_snapshot_is_dropped() {
        let mut store = store(WHITE_ID);
        let mut newer = record_after(&["e4", "e5"]);
        newer.version = Some(4);
        let mut older = record_after(&["e4"]);
        older.version = Some(3);
        store.apply(newer.clone());
        assert_eq!(store.apply(older), Ingest::Stale);
        assert_eq!(store.record(), Some(&newer));
    }

    #[test]
    fn local_timeout_is_advisory_and_superseded() {
        let mut store = store(WHITE_ID);
        let mut running = record();
        running.last_move_at_ms = Some(0);
        store.apply(running);

        let tick = store.tick(301_000).unwrap();
        assert_eq!(
            tick.timeout,
            Some(Signal::LocalTimeout { side: Color::White, text: "You Lose on Time".to_string() })
        );
        assert_eq!(store.record().map(|r| r.status), Some(GameStatus::InProgress));
        assert!(store.view(301_000).result.is_some_and(|b| b.provisional));
        assert_eq!(store.tick(302_000).unwrap().timeout, None);

        let mut settled = record();
        settled.status = GameStatus::Completed;
        settled.winner = Winner::White;
        settled.finish_reason = Some(FinishReason::BlackTimeout);
        let fired = signals(store.apply(settled));
        assert_eq!(fired, vec![Signal::GameEnded { text: "You Win on Time!".to_string() }]);
        let banner = store.view(302_000).result.unwrap();
        assert_eq!(banner.text, "You Win on Time!");
        assert!(!banner.provisional);
        assert!(store.tick(303_000).unwrap().timeout.is_none());
    }

    #[test]
    fn own_accepted_draw_is_announced() {
        let mut store = store(WHITE_ID);
        store.apply(record());
        store.begin_offer(crate::transport::OfferKind::Draw).unwrap();
        let mut offered = record();
        offered.draw.active = true;
        offered.draw.offered_by = Some(Color::White);
        offered.draw.white_offers = 1;
        store.apply(offered.clone());

        let mut agreed = offered;
        agreed.draw.active = false;
        agreed.status = GameStatus::Completed;
        agreed.winner = Winner::Draw;
        agreed.finish_reason = Some(FinishReason::DrawAgreement);
        match store.apply(agreed) {
            Ingest::Applied(outcome) => {
                assert_eq!(
                    outcome.signals,
                    vec![Signal::GameEnded { text: "Draw by Agreement".to_string() }]
                );
                assert_eq!(outcome.notices[0].text, "Draw accepted! Game ends in a draw.");
            }
            Ingest::Stale => panic!("unexpectedly stale"),
        }
    }

    #[test]
    fn redirect_once_through_frames() {
        let mut store = store(BLACK_ID);
        let mut accepted = record();
        accepted.status = GameStatus::Completed;
        accepted.winner = Winner::White;
        accepted.finish_reason = Some(FinishReason::Resignation);
        accepted.rematch.status = RematchStatus::Accepted;
        accepted.rematch.successor_id = Some("G2".to_string());

        let first = signals(store.ingest(&frame(&accepted)).unwrap());
        let redirects = first
            .iter()
            .filter(|s| matches!(s, Signal::Redirect { successor_id } if successor_id == "G2"))
            .count();
        assert_eq!(redirects, 1);
        assert_eq!(signals(store.ingest(&frame(&accepted)).unwrap()), vec![]);
    }

    #[test]
    fn malformed_frames_keep_the_last_good_record() {
        let mut store = store(WHITE_ID);
        store.apply(record_after(&["e4"]));
        assert!(matches!(
            store.ingest(&SnapshotFrame("{ not json".to_string())),
            Err(SnapshotError::Payload(_))
        ));

        let mut foreign = record();
        foreign.id = "G9".to_string();
        assert!(matches!(
            store.ingest(&frame(&foreign)),
            Err(SnapshotError::WrongSession { .. })
        ));
        assert_eq!(store.record(), Some(&record_after(&["e4"])));
    }
}
