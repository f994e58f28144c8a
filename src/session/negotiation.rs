//! Draw and rematch offer state machines.
//!
//! Prompt visibility is re-derived from every snapshot. The only local
//! memory is what the snapshot cannot tell us: that we sent an offer the
//! backend has not reflected yet, that we already answered, and which
//! successor session we already redirected to.

use chess::Color;
use serde::Serialize;

use crate::error::Rejection;
use crate::models::{GameRecord, GameStatus, RematchStatus, Signal};
use crate::session::edges;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DrawPhase {
    None,
    PendingSent,
    PendingFromOpponent,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RematchPhase {
    None,
    PendingSent,
    PendingFromOpponent,
    AcceptedAwaitingRedirect,
}

#[derive(Debug, Clone, Default)]
pub struct DrawNegotiation {
    pending_sent: bool,
    incoming_from: Option<Color>,
    responded: bool,
}

impl DrawNegotiation {
    pub fn phase(&self) -> DrawPhase {
        if self.incoming_from.is_some() {
            DrawPhase::PendingFromOpponent
        } else if self.pending_sent {
            DrawPhase::PendingSent
        } else {
            DrawPhase::None
        }
    }

    pub fn incoming_from(&self) -> Option<Color> {
        self.incoming_from
    }

    /// Gate for `offer()`; returns the offering side
    pub fn check_offer(
        &self,
        record: &GameRecord,
        me: Option<Color>,
        cap: u8,
    ) -> Result<Color, Rejection> {
        let me = me.ok_or(Rejection::Spectator)?;
        if !record.is_in_progress() {
            return Err(Rejection::NotInProgress);
        }
        if self.phase() != DrawPhase::None {
            return Err(Rejection::OfferPending);
        }
        let used = record.draw.offers_by(me);
        if used >= cap {
            return Err(Rejection::DrawOfferCap(used));
        }
        Ok(me)
    }

    pub fn offer_sent(&mut self) {
        self.pending_sent = true;
    }

    /// The offer request failed, so no offer exists on the backend
    pub fn offer_failed(&mut self) {
        self.pending_sent = false;
    }

    /// Gate for `respond()`
    pub fn check_respond(&self) -> Result<Color, Rejection> {
        let from = self.incoming_from.ok_or(Rejection::NoIncomingOffer)?;
        if self.responded {
            return Err(Rejection::AwaitingSettlement);
        }
        Ok(from)
    }

    pub fn response_sent(&mut self) {
        self.responded = true;
    }

    pub fn response_failed(&mut self) {
        self.responded = false;
    }

    /// Fold one snapshot into the machine, yielding at most one signal
    pub fn observe(
        &mut self,
        prev: Option<&GameRecord>,
        next: &GameRecord,
        me: Option<Color>,
    ) -> Option<Signal> {
        let Some(me) = me else {
            *self = Self::default();
            return None;
        };

        let remote = next.draw.pending_from().filter(|by| *by != me);
        let raised = remote.is_some() && self.incoming_from.is_none();
        self.incoming_from = remote;
        if remote.is_some() {
            // Only one offer can be on the table
            self.pending_sent = false;
        } else {
            self.responded = false;
        }
        if next.draw.pending_from() == Some(me) {
            self.pending_sent = true;
        }

        if let Some(by) = remote.filter(|_| raised) {
            return Some(Signal::DrawOffered {
                by,
                from: next.display_name(by),
            });
        }

        if edges::draw_offer_cleared(prev, next) == Some(me) && self.pending_sent {
            self.pending_sent = false;
            if next.status == GameStatus::InProgress {
                return Some(Signal::DrawDeclined { offered_by: me });
            }
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct RematchNegotiation {
    session_id: String,
    pending_sent: bool,
    incoming_from: Option<Color>,
    responded: bool,
    accepted: bool,
    last_redirect: Option<String>,
}

impl RematchNegotiation {
    pub fn new(session_id: impl Into<String>) -> Self {
        RematchNegotiation {
            session_id: session_id.into(),
            pending_sent: false,
            incoming_from: None,
            responded: false,
            accepted: false,
            last_redirect: None,
        }
    }

    pub fn phase(&self) -> RematchPhase {
        if self.accepted {
            RematchPhase::AcceptedAwaitingRedirect
        } else if self.incoming_from.is_some() {
            RematchPhase::PendingFromOpponent
        } else if self.pending_sent {
            RematchPhase::PendingSent
        } else {
            RematchPhase::None
        }
    }

    pub fn incoming_from(&self) -> Option<Color> {
        self.incoming_from
    }

    pub fn last_redirect(&self) -> Option<&str> {
        self.last_redirect.as_deref()
    }

    pub fn check_offer(&self, record: &GameRecord, me: Option<Color>) -> Result<Color, Rejection> {
        let me = me.ok_or(Rejection::Spectator)?;
        if record.status != GameStatus::Completed {
            return Err(Rejection::RematchUnavailable);
        }
        if self.phase() != RematchPhase::None {
            return Err(Rejection::OfferPending);
        }
        Ok(me)
    }

    pub fn offer_sent(&mut self) {
        self.pending_sent = true;
    }

    pub fn offer_failed(&mut self) {
        self.pending_sent = false;
    }

    pub fn check_respond(&self) -> Result<Color, Rejection> {
        let from = self.incoming_from.ok_or(Rejection::NoIncomingOffer)?;
        if self.responded {
            return Err(Rejection::AwaitingSettlement);
        }
        Ok(from)
    }

    pub fn response_sent(&mut self) {
        self.responded = true;
    }

    pub fn response_failed(&mut self) {
        self.responded = false;
    }

    pub fn observe(
        &mut self,
        prev: Option<&GameRecord>,
        next: &GameRecord,
        me: Option<Color>,
    ) -> Option<Signal> {
        // Spectators follow the players to the successor as well
        if let Some(successor) = edges::rematch_successor(&self.session_id, next) {
            self.accepted = true;
            self.pending_sent = false;
            self.incoming_from = None;
            self.responded = false;
            if self.last_redirect.as_deref() == Some(successor) {
                return None;
            }
            self.last_redirect = Some(successor.to_string());
            return Some(Signal::Redirect {
                successor_id: successor.to_string(),
            });
        }
        self.accepted = false;

        let Some(me) = me else {
            self.pending_sent = false;
            self.incoming_from = None;
            self.responded = false;
            return None;
        };

        let remote = next.rematch.pending_from().filter(|by| *by != me);
        let raised = remote.is_some() && self.incoming_from.is_none();
        self.incoming_from = remote;
        if remote.is_some() {
            self.pending_sent = false;
        } else {
            self.responded = false;
        }
        if next.rematch.pending_from() == Some(me) {
            self.pending_sent = true;
        }

        if let Some(by) = remote.filter(|_| raised) {
            return Some(Signal::RematchOffered {
                by,
                from: next.display_name(by),
            });
        }

        if edges::rematch_offer_cleared(prev, next) == Some(me) && self.pending_sent {
            self.pending_sent = false;
            if next.rematch.status == RematchStatus::Declined {
                return Some(Signal::RematchDeclined { offered_by: me });
            }
        }
        None
    }
}
