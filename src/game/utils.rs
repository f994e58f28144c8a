use chess::{Board, Color, Piece, Square};
use serde::Serializer;

use crate::models::{FinishReason, GameRecord, Winner};

/// Convert a chess color to a string
pub fn color_to_string(color: Color) -> String {
    match color {
        Color::White => "white".to_string(),
        Color::Black => "black".to_string(),
    }
}

/// Serde adapter for `chess::Color`, which carries no serde support of its own
pub fn serialize_color<S: Serializer>(color: &Color, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&color_to_string(*color))
}

pub fn serialize_opt_color<S: Serializer>(
    color: &Option<Color>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match color {
        Some(color) => serializer.serialize_some(&color_to_string(*color)),
        None => serializer.serialize_none(),
    }
}

/// Format remaining seconds as `mm:ss`
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Human-readable result of a finished game, phrased for the viewer.
///
/// Spectators (`viewer == None`) get a neutral phrasing.
pub fn describe_result(record: &GameRecord, viewer: Option<Color>) -> String {
    let winner_side = match record.winner {
        Winner::White => Some(Color::White),
        Winner::Black => Some(Color::Black),
        _ => None,
    };

    match record.finish_reason {
        Some(FinishReason::Checkmate) => match (viewer, winner_side) {
            (Some(me), Some(w)) if me == w => "Checkmate - You Win!".to_string(),
            (Some(_), Some(_)) => "Checkmate - You Lost".to_string(),
            (None, Some(w)) => format!("Checkmate - {} wins", capitalized(w)),
            _ => "Checkmate".to_string(),
        },
        Some(FinishReason::WhiteTimeout) => describe_timeout(Color::White, viewer),
        Some(FinishReason::BlackTimeout) => describe_timeout(Color::Black, viewer),
        Some(FinishReason::Resignation) => match (viewer, winner_side) {
            (Some(me), Some(w)) if me == w => "Opponent Resigned - You Win!".to_string(),
            (Some(_), Some(_)) => "You Resigned - You Lost".to_string(),
            (None, Some(w)) => format!("{} resigned - {} wins", capitalized(!w), capitalized(w)),
            _ => "Resignation".to_string(),
        },
        Some(FinishReason::Stalemate) => "Draw by Stalemate".to_string(),
        Some(FinishReason::Threefold) => "Draw by Threefold Repetition".to_string(),
        Some(FinishReason::InsufficientMaterial) => "Draw by Insufficient Material".to_string(),
        Some(FinishReason::DrawAgreement) => "Draw by Agreement".to_string(),
        None => "Game Over".to_string(),
    }
}

/// Result text for a side whose flag fell
pub fn describe_timeout(flagged: Color, viewer: Option<Color>) -> String {
    match viewer {
        Some(me) if me == flagged => "You Lose on Time".to_string(),
        Some(_) => "You Win on Time!".to_string(),
        None => format!("{} lost on time", capitalized(flagged)),
    }
}

fn capitalized(color: Color) -> &'static str {
    match color {
        Color::White => "White",
        Color::Black => "Black",
    }
}

/// Square of the king in check on `board`, if any
pub fn check_square(board: &Board) -> Option<Square> {
    if board.checkers().popcnt() == 0 {
        return None;
    }
    let side = board.side_to_move();
    (*board.pieces(Piece::King) & *board.color_combined(side))
        .into_iter()
        .next()
}

/// Check if the board has insufficient material for checkmate
pub fn has_insufficient_material(board: &Board) -> bool {
    // Any pawn, rook or queen can still force mate
    let heavy = *board.pieces(Piece::Pawn) | *board.pieces(Piece::Rook) | *board.pieces(Piece::Queen);
    if heavy.popcnt() > 0 {
        return false;
    }

    let knights = *board.pieces(Piece::Knight);
    let bishops = *board.pieces(Piece::Bishop);
    let white_minors = ((knights | bishops) & *board.color_combined(Color::White)).popcnt();
    let black_minors = ((knights | bishops) & *board.color_combined(Color::Black)).popcnt();

    match (white_minors, black_minors) {
        // King vs King, or a single minor piece vs a bare king
        (0, 0) | (1, 0) | (0, 1) => true,
        // King and Bishop vs King and Bishop, bishops on the same square colour
        (1, 1) if knights.popcnt() == 0 => {
            let mut shades = bishops.into_iter().map(is_light_square);
            shades.next() == shades.next()
        }
        _ => false,
    }
}

fn is_light_square(square: Square) -> bool {
    (square.get_rank().to_index() + square.get_file().to_index()) % 2 == 1
}
