use chess::{Board, Color, ALL_COLORS, ALL_PIECES};
use log::debug;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::SnapshotError;
use crate::game::rules::RulesEngine;
use crate::models::{
    ClockView, DrawOfferState, FinishReason, GameRecord, GameStatus, Notice, Player,
    RematchOfferState, RematchStatus, Signal, ViewModel, Winner,
};

/// Authoritative game snapshot as pushed by the backend
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SnapshotMessage {
    pub game_id: String,
    pub version: Option<u64>,
    pub status: GameStatus,
    pub fen: String,
    #[serde(default)]
    pub moves: Vec<String>,
    pub white_time_left: u64,
    pub black_time_left: u64,
    pub last_move_at_ms: Option<u64>,
    #[serde(default)]
    pub winner: Winner,
    pub finish_reason: Option<FinishReason>,
    pub white_player: Player,
    pub black_player: Option<Player>,
    #[serde(default)]
    pub draw_offered: bool,
    pub draw_offered_by: Option<String>,
    #[serde(default)]
    pub white_draw_offers: u8,
    #[serde(default)]
    pub black_draw_offers: u8,
    #[serde(default)]
    pub rematch_offered: bool,
    pub rematch_offered_by: Option<String>,
    #[serde(default)]
    pub rematch_status: RematchStatus,
    pub rematch_game_id: Option<String>,
}

impl SnapshotMessage {
    /// Decode into a canonical record, replaying the move list to check it
    pub fn decode(self, rules: &dyn RulesEngine) -> Result<GameRecord, SnapshotError> {
        let position =
            Board::from_str(&self.fen).map_err(|_| SnapshotError::Position(self.fen.clone()))?;

        let mut board = Board::default();
        let mut moves = Vec::with_capacity(self.moves.len());
        for (ply, text) in self.moves.iter().enumerate() {
            let mv = rules
                .parse_move(&board, text)
                .ok_or_else(|| SnapshotError::Move {
                    ply,
                    text: text.clone(),
                })?;
            board = board.make_move_new(mv);
            moves.push(mv);
        }
        if !same_position(&board, &position) {
            return Err(SnapshotError::Position(self.fen));
        }

        let seat = |id: &str| -> Result<Color, SnapshotError> {
            if self.white_player.id == id {
                Ok(Color::White)
            } else if self.black_player.as_ref().is_some_and(|p| p.id == id) {
                Ok(Color::Black)
            } else {
                Err(SnapshotError::UnknownPlayer(id.to_string()))
            }
        };
        let draw_offered_by = self.draw_offered_by.as_deref().map(&seat).transpose()?;
        let rematch_offered_by = self.rematch_offered_by.as_deref().map(&seat).transpose()?;

        let successor_id = match self.rematch_status {
            RematchStatus::Accepted => self.rematch_game_id,
            _ => {
                if let Some(id) = &self.rematch_game_id {
                    debug!("Ignoring successor {} on a rematch that is not accepted", id);
                }
                None
            }
        };

        Ok(GameRecord {
            id: self.game_id,
            version: self.version,
            status: self.status,
            position,
            moves,
            white_time_left: self.white_time_left,
            black_time_left: self.black_time_left,
            last_move_at_ms: self.last_move_at_ms,
            winner: self.winner,
            finish_reason: self.finish_reason,
            white_player: self.white_player,
            black_player: self.black_player,
            draw: DrawOfferState {
                active: self.draw_offered,
                offered_by: draw_offered_by,
                white_offers: self.white_draw_offers,
                black_offers: self.black_draw_offers,
            },
            rematch: RematchOfferState {
                active: self.rematch_offered,
                offered_by: rematch_offered_by,
                status: self.rematch_status,
                successor_id,
            },
        })
    }

    /// Encode a record back into its wire form, moves in SAN
    pub fn encode(record: &GameRecord, rules: &dyn RulesEngine) -> Self {
        let mut board = Board::default();
        let mut moves = Vec::with_capacity(record.moves.len());
        for mv in &record.moves {
            moves.push(rules.encode_move(&board, *mv));
            board = board.make_move_new(*mv);
        }
        let id_of = |side: Option<Color>| side.and_then(|s| record.player(s)).map(|p| p.id.clone());

        SnapshotMessage {
            game_id: record.id.clone(),
            version: record.version,
            status: record.status,
            fen: record.position.to_string(),
            moves,
            white_time_left: record.white_time_left,
            black_time_left: record.black_time_left,
            last_move_at_ms: record.last_move_at_ms,
            winner: record.winner,
            finish_reason: record.finish_reason,
            white_player: record.white_player.clone(),
            black_player: record.black_player.clone(),
            draw_offered: record.draw.active,
            draw_offered_by: id_of(record.draw.offered_by),
            white_draw_offers: record.draw.white_offers,
            black_draw_offers: record.draw.black_offers,
            rematch_offered: record.rematch.active,
            rematch_offered_by: id_of(record.rematch.offered_by),
            rematch_status: record.rematch.status,
            rematch_game_id: record.rematch.successor_id.clone(),
        }
    }
}

/// Same pieces, side to move and castling rights. Move counters and the
/// en passant square are not compared.
fn same_position(a: &Board, b: &Board) -> bool {
    a.side_to_move() == b.side_to_move()
        && ALL_PIECES.iter().all(|&piece| a.pieces(piece) == b.pieces(piece))
        && ALL_COLORS.iter().all(|&color| {
            a.color_combined(color) == b.color_combined(color)
                && a.castle_rights(color) == b.castle_rights(color)
        })
}

/// Action sent from the browser to the presentation bridge
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientMessage {
    pub message_type: String,
    pub move_from: Option<String>,
    pub move_to: Option<String>,
    pub promote_to: Option<String>,
    pub square: Option<String>,
    pub accept: Option<bool>,
    pub ply: Option<usize>,
}

/// Message sent from the presentation bridge to the browser
#[derive(Serialize, Debug, Clone, Default)]
pub struct ServerMessage {
    pub message_type: String,
    pub game_id: Option<String>,
    pub view: Option<ViewModel>,
    pub signal: Option<Signal>,
    pub notice: Option<Notice>,
    pub clock: Option<ClockView>,
    pub available_moves: Option<Vec<String>>,
    pub error: Option<String>,
}

impl ServerMessage {
    pub fn error(game_id: &str, error: impl Into<String>) -> Self {
        ServerMessage {
            message_type: "error".to_string(),
            game_id: Some(game_id.to_string()),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
