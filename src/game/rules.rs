use chess::{Board, BoardStatus, ChessMove, Color, MoveGen, Piece, Rank, Square};

use crate::error::Rejection;
use crate::game::san;
use crate::game::utils::has_insufficient_material;
use crate::models::MoveClass;

/// Result of applying a legal move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedMove {
    pub mv: ChessMove,
    pub position: Board,
    pub class: MoveClass,
}

/// Move legality and position bookkeeping consumed by the session engine
pub trait RulesEngine {
    /// Apply a move given as squares; pawns reaching the last rank promote
    /// to a queen unless told otherwise.
    fn apply(
        &self,
        position: &Board,
        from: Square,
        to: Square,
        promotion: Option<Piece>,
    ) -> Result<AppliedMove, Rejection>;

    fn legal_destinations(&self, position: &Board, square: Square) -> Vec<Square>;

    /// Checkmate, stalemate or dead position
    fn is_terminal(&self, position: &Board) -> bool;

    fn side_to_move(&self, position: &Board) -> Color;

    /// Replay `moves` from the standard starting position
    fn position_from_moves(&self, moves: &[ChessMove]) -> Board;

    fn classify(&self, position: &Board, mv: ChessMove) -> MoveClass;

    fn parse_move(&self, position: &Board, text: &str) -> Option<ChessMove>;

    fn encode_move(&self, position: &Board, mv: ChessMove) -> String;
}

/// Rules engine backed by the `chess` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct ChessRules;

impl RulesEngine for ChessRules {
    fn apply(
        &self,
        position: &Board,
        from: Square,
        to: Square,
        promotion: Option<Piece>,
    ) -> Result<AppliedMove, Rejection> {
        let promotion = promotion.or_else(|| {
            let last_rank = match position.side_to_move() {
                Color::White => Rank::Eighth,
                Color::Black => Rank::First,
            };
            (position.piece_on(from) == Some(Piece::Pawn) && to.get_rank() == last_rank)
                .then_some(Piece::Queen)
        });
        let mv = ChessMove::new(from, to, promotion);
        if !position.legal(mv) {
            return Err(Rejection::IllegalMove);
        }
        Ok(AppliedMove {
            mv,
            position: position.make_move_new(mv),
            class: self.classify(position, mv),
        })
    }

    fn legal_destinations(&self, position: &Board, square: Square) -> Vec<Square> {
        let mut destinations: Vec<Square> = MoveGen::new_legal(position)
            .filter(|mv| mv.get_source() == square)
            .map(|mv| mv.get_dest())
            .collect();
        // Promotions list the same square once per piece
        destinations.dedup();
        destinations
    }

    fn is_terminal(&self, position: &Board) -> bool {
        position.status() != BoardStatus::Ongoing || has_insufficient_material(position)
    }

    fn side_to_move(&self, position: &Board) -> Color {
        position.side_to_move()
    }

    fn position_from_moves(&self, moves: &[ChessMove]) -> Board {
        moves
            .iter()
            .fold(Board::default(), |board, mv| board.make_move_new(*mv))
    }

    fn classify(&self, position: &Board, mv: ChessMove) -> MoveClass {
        if san::is_capture(position, mv) {
            return MoveClass::Capture;
        }
        if position.make_move_new(mv).checkers().popcnt() > 0 {
            return MoveClass::Check;
        }
        if san::is_castle(position, mv) {
            return MoveClass::Castle;
        }
        if mv.get_promotion().is_some() {
            return MoveClass::Promotion;
        }
        MoveClass::Quiet
    }

    fn parse_move(&self, position: &Board, text: &str) -> Option<ChessMove> {
        san::parse_move(position, text)
    }

    fn encode_move(&self, position: &Board, mv: ChessMove) -> String {
        san::to_san(position, mv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn replay(rules: &ChessRules, texts: &[&str]) -> (Vec<ChessMove>, Board) {
        let mut board = Board::default();
        let mut moves = Vec::new();
        for text in texts {
            let mv = rules.parse_move(&board, text).unwrap();
            board = board.make_move_new(mv);
            moves.push(mv);
        }
        (moves, board)
    }

    #[test]
    fn rejects_illegal_moves() {
        let rules = ChessRules;
        let result = rules.apply(&Board::default(), Square::E2, Square::E5, None);
        assert_eq!(result, Err(Rejection::IllegalMove));
    }

    #[test]
    fn promotes_to_queen_by_default() {
        let rules = ChessRules;
        let board = Board::from_str("8/4P3/8/8/8/8/k7/4K3 w - - 0 1").unwrap();
        let applied = rules.apply(&board, Square::E7, Square::E8, None).unwrap();
        assert_eq!(applied.mv.get_promotion(), Some(Piece::Queen));
        assert_eq!(applied.class, MoveClass::Promotion);
    }

    #[test]
    fn classification_prefers_capture_then_check() {
        let rules = ChessRules;
        let (_, board) = replay(&rules, &["e4", "d5"]);
        let applied = rules.apply(&board, Square::E4, Square::D5, None).unwrap();
        assert_eq!(applied.class, MoveClass::Capture);

        let (_, board) = replay(&rules, &["e4", "f5"]);
        let applied = rules.apply(&board, Square::D1, Square::H5, None).unwrap();
        assert_eq!(applied.class, MoveClass::Check);

        let applied = rules.apply(&Board::default(), Square::G1, Square::F3, None).unwrap();
        assert_eq!(applied.class, MoveClass::Quiet);
    }

    #[test]
    fn replay_matches_incremental_play() {
        let rules = ChessRules;
        let (moves, board) = replay(&rules, &["e4", "e5", "Nf3"]);
        assert_eq!(rules.position_from_moves(&moves), board);
        assert_eq!(rules.side_to_move(&board), Color::Black);
    }

    #[test]
    fn destinations_of_a_knight() {
        let rules = ChessRules;
        let mut targets = rules.legal_destinations(&Board::default(), Square::G1);
        targets.sort_by_key(|sq| sq.to_index());
        assert_eq!(targets, vec![Square::F3, Square::H3]);
    }

    #[test]
    fn terminal_positions() {
        let rules = ChessRules;
        let (_, mated) = replay(&rules, &["f3", "e5", "g4", "Qh4"]);
        assert!(rules.is_terminal(&mated));
        assert!(!rules.is_terminal(&Board::default()));
    }
}
