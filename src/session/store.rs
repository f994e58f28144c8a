use chess::{Board, ChessMove, Color, Square};
use log::{info, warn};

use crate::config::SessionConfig;
use crate::error::{Rejection, TransportError};
use crate::game::rules::RulesEngine;
use crate::game::utils::check_square;
use crate::models::{
    build_move_rows, ClockView, CursorView, DrawView, GameRecord, LastMove, Notice, RematchView,
    ResultBanner, Signal, ViewModel,
};
use crate::session::clock::{derive_clocks, ClockInputs, ClockSnapshot, ClockWatch};
use crate::session::navigation::{NavCommand, NavigationCursor};
use crate::session::negotiation::{DrawNegotiation, DrawPhase, RematchNegotiation};
use crate::session::submission::{MovePipeline, MoveRequest};
use crate::transport::OfferKind;

/// Everything one session knows: the last applied authoritative record plus
/// the local state layered over it. Only `apply` (see `reconcile`) replaces
/// the record.
pub struct SessionStore {
    pub(super) session_id: String,
    pub(super) viewer_id: String,
    pub(super) rules: Box<dyn RulesEngine>,
    pub(super) config: SessionConfig,
    pub(super) record: Option<GameRecord>,
    /// Canonical moves in SAN, kept in step with `record`
    pub(super) sans: Vec<String>,
    pub(super) cursor: NavigationCursor,
    pub(super) draw: DrawNegotiation,
    pub(super) rematch: RematchNegotiation,
    pub(super) pipeline: MovePipeline,
    pub(super) clock_watch: ClockWatch,
    pub(super) banner: Option<ResultBanner>,
}

impl SessionStore {
    pub fn new(
        session_id: impl Into<String>,
        viewer_id: impl Into<String>,
        rules: Box<dyn RulesEngine>,
        config: SessionConfig,
    ) -> Self {
        let session_id = session_id.into();
        SessionStore {
            rematch: RematchNegotiation::new(session_id.clone()),
            session_id,
            viewer_id: viewer_id.into(),
            rules,
            config,
            record: None,
            sans: Vec::new(),
            cursor: NavigationCursor::default(),
            draw: DrawNegotiation::default(),
            pipeline: MovePipeline::default(),
            clock_watch: ClockWatch::default(),
            banner: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn record(&self) -> Option<&GameRecord> {
        self.record.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Seat of the viewer in the loaded game, `None` for spectators
    pub fn viewer_color(&self) -> Option<Color> {
        self.record.as_ref()?.side_of(&self.viewer_id)
    }

    /// Clocks only run, and the tick timer only exists, while this holds.
    /// A game with no stamped move has frozen clocks, so nothing ticks.
    pub fn is_running(&self) -> bool {
        self.record
            .as_ref()
            .is_some_and(|r| r.is_in_progress() && r.last_move_at_ms.is_some())
    }

    pub fn clock_at(&self, now_ms: u64) -> Option<ClockSnapshot> {
        let record = self.record.as_ref()?;
        Some(derive_clocks(
            &ClockInputs::from_record(record, self.rules.as_ref()),
            now_ms,
        ))
    }

    pub fn begin_move(&mut self, request: MoveRequest) -> Result<(ChessMove, Signal), Rejection> {
        let me = self.viewer_color();
        self.pipeline.begin(
            self.record.as_ref(),
            me,
            &self.cursor,
            self.rules.as_ref(),
            request,
        )
    }

    pub fn settle_move(&mut self, result: Result<(), TransportError>) -> Option<Notice> {
        self.pipeline.settle(result)
    }

    pub fn begin_offer(&mut self, kind: OfferKind) -> Result<(), Rejection> {
        let record = self.record.as_ref().ok_or(Rejection::NotLoaded)?;
        let me = record.side_of(&self.viewer_id);
        match kind {
            OfferKind::Draw => {
                self.draw.check_offer(record, me, self.config.draw_offer_cap)?;
                self.draw.offer_sent();
            }
            OfferKind::Rematch => {
                self.rematch.check_offer(record, me)?;
                self.rematch.offer_sent();
            }
        }
        Ok(())
    }

    /// A failed offer never reached the backend, so the pending flag goes
    pub fn settle_offer(&mut self, kind: OfferKind, result: Result<(), TransportError>) -> Notice {
        match (kind, result) {
            (OfferKind::Draw, Ok(())) => Notice::info("Draw offer sent. Waiting for response..."),
            (OfferKind::Rematch, Ok(())) => Notice::info("Rematch offer sent"),
            (OfferKind::Draw, Err(e)) => {
                warn!("Draw offer in {} failed: {}", self.session_id, e);
                self.draw.offer_failed();
                Notice::error(format!("Failed to offer draw: {}", e))
            }
            (OfferKind::Rematch, Err(e)) => {
                warn!("Rematch offer in {} failed: {}", self.session_id, e);
                self.rematch.offer_failed();
                Notice::error("Failed to send rematch offer")
            }
        }
    }

    pub fn begin_response(&mut self, kind: OfferKind) -> Result<(), Rejection> {
        if self.record.is_none() {
            return Err(Rejection::NotLoaded);
        }
        match kind {
            OfferKind::Draw => {
                self.draw.check_respond()?;
                self.draw.response_sent();
            }
            OfferKind::Rematch => {
                self.rematch.check_respond()?;
                self.rematch.response_sent();
            }
        }
        Ok(())
    }

    pub fn settle_response(
        &mut self,
        kind: OfferKind,
        accept: bool,
        result: Result<(), TransportError>,
    ) -> Option<Notice> {
        match (kind, result) {
            (OfferKind::Draw, Ok(())) if accept => Some(Notice::success("Draw accepted!")),
            (OfferKind::Draw, Ok(())) => Some(Notice::info("Draw offer declined")),
            (OfferKind::Rematch, Ok(())) => None,
            (kind, Err(e)) => {
                warn!("Responding to {} offer in {} failed: {}", kind, self.session_id, e);
                match kind {
                    OfferKind::Draw => self.draw.response_failed(),
                    OfferKind::Rematch => self.rematch.response_failed(),
                }
                Some(Notice::error(format!("Failed to respond to {} offer", kind)))
            }
        }
    }

    pub fn check_resign(&self) -> Result<(), Rejection> {
        let record = self.record.as_ref().ok_or(Rejection::NotLoaded)?;
        record
            .side_of(&self.viewer_id)
            .ok_or(Rejection::Spectator)?;
        if !record.is_in_progress() {
            return Err(Rejection::NotInProgress);
        }
        Ok(())
    }

    pub fn settle_resign(&self, result: Result<(), TransportError>) -> Notice {
        match result {
            Ok(()) => Notice::info("You resigned"),
            Err(e) => {
                warn!("Resigning {} failed: {}", self.session_id, e);
                Notice::error("Failed to resign. Please try again.")
            }
        }
    }

    pub fn navigate(&mut self, command: NavCommand) -> Result<(), Rejection> {
        let total = self.record.as_ref().map_or(0, |r| r.moves.len());
        self.cursor.apply(command, total)?;
        info!("Session {} cursor now {:?}", self.session_id, self.cursor.mode());
        Ok(())
    }

    /// Move input is open: live cursor, viewer's turn, nothing in flight
    pub fn can_move(&self) -> bool {
        let Some(record) = self.record.as_ref() else {
            return false;
        };
        record.is_in_progress()
            && self.cursor.is_live()
            && !self.pipeline.in_flight()
            && !self.rules.is_terminal(&record.position)
            && self.viewer_color() == Some(self.rules.side_to_move(&record.position))
    }

    /// Destinations for the viewer's own piece on `square`, empty whenever
    /// the viewer may not move
    pub fn legal_destinations(&self, square: Square) -> Vec<Square> {
        let Some(record) = self.record.as_ref().filter(|_| self.can_move()) else {
            return Vec::new();
        };
        if record.position.color_on(square) != self.viewer_color() {
            return Vec::new();
        }
        self.rules.legal_destinations(&record.position, square)
    }

    pub fn view(&self, now_ms: u64) -> ViewModel {
        let Some(record) = self.record.as_ref() else {
            return self.empty_view();
        };
        let rules = self.rules.as_ref();
        let me = self.viewer_color();
        let total = record.moves.len();
        let live = self.cursor.is_live();
        let overlay = self.pipeline.overlay().filter(|_| live);

        let displayed: Board = if live {
            *self.pipeline.displayed(&record.position)
        } else {
            self.cursor.position(record, rules)
        };

        let mut sans = self.sans.clone();
        if let Some(overlay) = overlay {
            sans.push(overlay.san.clone());
        }

        let last_move = match overlay {
            Some(overlay) => Some(overlay.applied.mv),
            None => self
                .cursor
                .ply(total)
                .checked_sub(1)
                .and_then(|i| record.moves.get(i).copied()),
        }
        .map(|mv| LastMove {
            from: mv.get_source().to_string(),
            to: mv.get_dest().to_string(),
        });

        let clock = derive_clocks(&ClockInputs::from_record(record, rules), now_ms).to_view();

        ViewModel {
            game_id: self.session_id.clone(),
            status: Some(record.status),
            viewer_color: me,
            white_name: record.display_name(Color::White),
            black_name: record.display_name(Color::Black),
            fen: displayed.to_string(),
            live_fen: record.position.to_string(),
            optimistic: overlay.is_some(),
            cursor: CursorView {
                live,
                ply: self.cursor.ply(total),
                total_plies: total,
            },
            move_rows: build_move_rows(&sans),
            last_move,
            check_square: check_square(&displayed).map(|sq| sq.to_string()),
            is_my_turn: record.is_in_progress() && me == Some(rules.side_to_move(&record.position)),
            can_move: self.can_move(),
            clock,
            draw: self.draw_view(record, me),
            rematch: RematchView {
                phase: self.rematch.phase(),
                can_offer: self.rematch.check_offer(record, me).is_ok(),
                incoming_from: self.rematch.incoming_from().map(|by| record.display_name(by)),
            },
            result: self.banner.clone(),
        }
    }

    fn draw_view(&self, record: &GameRecord, me: Option<Color>) -> DrawView {
        let cap = self.config.draw_offer_cap;
        let used = me.map_or(0, |side| record.draw.offers_by(side));
        let label = match self.draw.phase() {
            DrawPhase::PendingSent => "Draw offer pending…".to_string(),
            _ if used == 0 => "Offer Draw".to_string(),
            _ => format!("Offer Draw ({}/{})", used, cap),
        };
        DrawView {
            phase: self.draw.phase(),
            offers_used: used,
            cap,
            label,
            can_offer: self.draw.check_offer(record, me, cap).is_ok(),
            incoming_from: self.draw.incoming_from().map(|by| record.display_name(by)),
        }
    }

    fn empty_view(&self) -> ViewModel {
        let start = Board::default().to_string();
        ViewModel {
            game_id: self.session_id.clone(),
            status: None,
            viewer_color: None,
            white_name: String::new(),
            black_name: String::new(),
            fen: start.clone(),
            live_fen: start,
            optimistic: false,
            cursor: CursorView {
                live: true,
                ply: 0,
                total_plies: 0,
            },
            move_rows: Vec::new(),
            last_move: None,
            check_square: None,
            is_my_turn: false,
            can_move: false,
            clock: ClockView {
                white_remaining: 0,
                black_remaining: 0,
                white_display: "00:00".to_string(),
                black_display: "00:00".to_string(),
                active_side: Color::White,
                running: false,
            },
            draw: DrawView {
                phase: DrawPhase::None,
                offers_used: 0,
                cap: self.config.draw_offer_cap,
                label: "Offer Draw".to_string(),
                can_offer: false,
                incoming_from: None,
            },
            rematch: RematchView {
                phase: self.rematch.phase(),
                can_offer: false,
                incoming_from: None,
            },
            result: None,
        }
    }
}
