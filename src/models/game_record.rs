use chess::{Board, ChessMove, Color};
use serde::{Deserialize, Serialize};

/// Lifecycle of a game. Variants are ordered so that a regression is a
/// plain comparison.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Winner {
    White,
    Black,
    Draw,
    #[default]
    #[serde(rename = "NONE")]
    Undecided,
}

/// Why a game ended. Timeouts name the side whose flag fell.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    Checkmate,
    WhiteTimeout,
    BlackTimeout,
    Resignation,
    Stalemate,
    Threefold,
    InsufficientMaterial,
    DrawAgreement,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RematchStatus {
    #[default]
    #[serde(rename = "none")]
    Idle,
    Pending,
    Accepted,
    Declined,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawOfferState {
    pub active: bool,
    pub offered_by: Option<Color>,
    pub white_offers: u8,
    pub black_offers: u8,
}

impl DrawOfferState {
    /// Side with an offer on the table
    pub fn pending_from(&self) -> Option<Color> {
        self.offered_by.filter(|_| self.active)
    }

    /// Lifetime offers made by `side`
    pub fn offers_by(&self, side: Color) -> u8 {
        match side {
            Color::White => self.white_offers,
            Color::Black => self.black_offers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RematchOfferState {
    pub active: bool,
    pub offered_by: Option<Color>,
    pub status: RematchStatus,
    /// Only ever set while `status` is `Accepted`
    pub successor_id: Option<String>,
}

impl RematchOfferState {
    pub fn pending_from(&self) -> Option<Color> {
        self.offered_by.filter(|_| self.active)
    }

    pub fn accepted_successor(&self) -> Option<&str> {
        match self.status {
            RematchStatus::Accepted => self.successor_id.as_deref(),
            _ => None,
        }
    }
}

/// Last known authoritative description of one game session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRecord {
    pub id: String,
    /// Monotonic per-session counter attached by the transport, when it has one
    pub version: Option<u64>,
    pub status: GameStatus,
    pub position: Board,
    pub moves: Vec<ChessMove>,
    /// Base remaining time in seconds, as of `last_move_at_ms`
    pub white_time_left: u64,
    pub black_time_left: u64,
    pub last_move_at_ms: Option<u64>,
    pub winner: Winner,
    pub finish_reason: Option<FinishReason>,
    pub white_player: Player,
    pub black_player: Option<Player>,
    pub draw: DrawOfferState,
    pub rematch: RematchOfferState,
}

impl GameRecord {
    /// Seat of `player_id`, `None` for spectators
    pub fn side_of(&self, player_id: &str) -> Option<Color> {
        if self.white_player.id == player_id {
            Some(Color::White)
        } else if self.black_player.as_ref().is_some_and(|p| p.id == player_id) {
            Some(Color::Black)
        } else {
            None
        }
    }

    pub fn player(&self, side: Color) -> Option<&Player> {
        match side {
            Color::White => Some(&self.white_player),
            Color::Black => self.black_player.as_ref(),
        }
    }

    pub fn time_left(&self, side: Color) -> u64 {
        match side {
            Color::White => self.white_time_left,
            Color::Black => self.black_time_left,
        }
    }

    /// Display name of `side`, falling back to "Opponent"
    pub fn display_name(&self, side: Color) -> String {
        self.player(side)
            .map(|p| p.username.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "Opponent".to_string())
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == GameStatus::InProgress
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn seats_and_spectators() {
        let record = record();
        assert_eq!(record.side_of(WHITE_ID), Some(Color::White));
        assert_eq!(record.side_of(BLACK_ID), Some(Color::Black));
        assert_eq!(record.side_of("carol"), None);
    }

    #[test]
    fn inactive_offer_has_no_sender() {
        let mut record = record();
        record.draw.offered_by = Some(Color::White);
        assert_eq!(record.draw.pending_from(), None);
        record.draw.active = true;
        assert_eq!(record.draw.pending_from(), Some(Color::White));
    }

    #[test]
    fn status_order_follows_lifecycle() {
        assert!(GameStatus::Pending < GameStatus::InProgress);
        assert!(GameStatus::InProgress < GameStatus::Completed);
    }
}
