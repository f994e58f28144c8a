use chess::Color;
use serde::Serialize;

use crate::game::utils::{serialize_color, serialize_opt_color};
use crate::models::GameStatus;
use crate::session::negotiation::{DrawPhase, RematchPhase};

/// Last move information
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LastMove {
    pub from: String,
    pub to: String,
}

/// One numbered line of the move list
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MoveRow {
    pub number: usize,
    pub white: String,
    pub black: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CursorView {
    pub live: bool,
    /// Plies applied to the displayed position
    pub ply: usize,
    pub total_plies: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ClockView {
    pub white_remaining: u64,
    pub black_remaining: u64,
    pub white_display: String,
    pub black_display: String,
    #[serde(serialize_with = "serialize_color")]
    pub active_side: Color,
    pub running: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DrawView {
    pub phase: DrawPhase,
    pub offers_used: u8,
    pub cap: u8,
    pub label: String,
    pub can_offer: bool,
    /// Name of the opponent whose offer awaits a response
    pub incoming_from: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RematchView {
    pub phase: RematchPhase,
    pub can_offer: bool,
    pub incoming_from: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ResultBanner {
    pub text: String,
    /// Derived from the local clock, awaiting the authoritative result
    pub provisional: bool,
}

/// Presentation-facing summary of one session
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ViewModel {
    pub game_id: String,
    pub status: Option<GameStatus>,
    #[serde(serialize_with = "serialize_opt_color")]
    pub viewer_color: Option<Color>,
    pub white_name: String,
    pub black_name: String,
    /// Position on screen: overlay, browse position or live position
    pub fen: String,
    pub live_fen: String,
    pub optimistic: bool,
    pub cursor: CursorView,
    pub move_rows: Vec<MoveRow>,
    pub last_move: Option<LastMove>,
    pub check_square: Option<String>,
    pub is_my_turn: bool,
    pub can_move: bool,
    pub clock: ClockView,
    pub draw: DrawView,
    pub rematch: RematchView,
    pub result: Option<ResultBanner>,
}

/// Group SAN moves into numbered rows of white and black replies
pub fn build_move_rows(sans: &[String]) -> Vec<MoveRow> {
    sans.chunks(2)
        .enumerate()
        .map(|(i, pair)| MoveRow {
            number: i + 1,
            white: pair[0].clone(),
            black: pair.get(1).cloned(),
        })
        .collect()
}
