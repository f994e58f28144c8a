//! Standard algebraic notation for move lists.

use chess::{Board, BoardStatus, ChessMove, MoveGen, Piece, Square};

fn piece_letter(piece: Piece) -> Option<char> {
    match piece {
        Piece::Pawn => None,
        Piece::Knight => Some('N'),
        Piece::Bishop => Some('B'),
        Piece::Rook => Some('R'),
        Piece::Queen => Some('Q'),
        Piece::King => Some('K'),
    }
}

fn file_char(square: Square) -> char {
    (b'a' + square.get_file().to_index() as u8) as char
}

fn rank_char(square: Square) -> char {
    (b'1' + square.get_rank().to_index() as u8) as char
}

/// True when `mv` takes a piece, en passant included
pub fn is_capture(board: &Board, mv: ChessMove) -> bool {
    if board.piece_on(mv.get_dest()).is_some() {
        return true;
    }
    board.piece_on(mv.get_source()) == Some(Piece::Pawn)
        && mv.get_source().get_file() != mv.get_dest().get_file()
}

/// True when `mv` is a king move of two files
pub fn is_castle(board: &Board, mv: ChessMove) -> bool {
    board.piece_on(mv.get_source()) == Some(Piece::King)
        && mv
            .get_source()
            .get_file()
            .to_index()
            .abs_diff(mv.get_dest().get_file().to_index())
            == 2
}

/// SAN of a legal move, without the check suffix
fn bare_san(board: &Board, mv: ChessMove) -> String {
    let source = mv.get_source();
    let dest = mv.get_dest();
    let Some(piece) = board.piece_on(source) else {
        return mv.to_string();
    };

    if is_castle(board, mv) {
        return if dest.get_file() > source.get_file() {
            "O-O".to_string()
        } else {
            "O-O-O".to_string()
        };
    }

    let mut san = String::new();
    let capture = is_capture(board, mv);

    match piece_letter(piece) {
        None => {
            if capture {
                san.push(file_char(source));
            }
        }
        Some(letter) => {
            san.push(letter);
            // Other pieces of the same kind that could reach the same square
            let rivals: Vec<Square> = MoveGen::new_legal(board)
                .filter(|other| {
                    other.get_dest() == dest
                        && other.get_source() != source
                        && board.piece_on(other.get_source()) == Some(piece)
                })
                .map(|other| other.get_source())
                .collect();
            if !rivals.is_empty() {
                let shares_file = rivals.iter().any(|sq| sq.get_file() == source.get_file());
                let shares_rank = rivals.iter().any(|sq| sq.get_rank() == source.get_rank());
                if !shares_file {
                    san.push(file_char(source));
                } else if !shares_rank {
                    san.push(rank_char(source));
                } else {
                    san.push(file_char(source));
                    san.push(rank_char(source));
                }
            }
        }
    }

    if capture {
        san.push('x');
    }
    san.push_str(&dest.to_string());

    if let Some(promotion) = mv.get_promotion() {
        san.push('=');
        if let Some(letter) = piece_letter(promotion) {
            san.push(letter);
        }
    }
    san
}

/// Render a legal move on `board` in SAN, with `+` or `#` suffix
pub fn to_san(board: &Board, mv: ChessMove) -> String {
    let mut san = bare_san(board, mv);
    let after = board.make_move_new(mv);
    if after.status() == BoardStatus::Checkmate {
        san.push('#');
    } else if after.checkers().popcnt() > 0 {
        san.push('+');
    }
    san
}

/// Find the legal move on `board` written as `text`.
///
/// Accepts coordinate notation (`e2e4`, `e7e8q`) and SAN (`Nf3`, `exd5`,
/// `O-O`, `e8=Q+`); annotation suffixes are ignored.
pub fn parse_move(board: &Board, text: &str) -> Option<ChessMove> {
    let wanted = text
        .trim()
        .trim_end_matches(['+', '#', '!', '?'])
        .replace('0', "O");
    if wanted.is_empty() {
        return None;
    }
    let lowered = wanted.to_lowercase();
    MoveGen::new_legal(board).find(|mv| mv.to_string() == lowered || bare_san(board, *mv) == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn play(moves: &[&str]) -> Board {
        moves.iter().fold(Board::default(), |board, text| {
            let mv = parse_move(&board, text).unwrap_or_else(|| panic!("illegal {text}"));
            board.make_move_new(mv)
        })
    }

    #[test]
    fn parses_san_and_coordinates_alike() {
        let board = Board::default();
        assert_eq!(parse_move(&board, "e4"), parse_move(&board, "e2e4"));
        assert_eq!(parse_move(&board, "Nf3"), parse_move(&board, "g1f3"));
        assert!(parse_move(&board, "e5").is_none());
        assert!(parse_move(&board, "").is_none());
    }

    #[test]
    fn renders_checks_and_captures() {
        let board = play(&["e4", "d5"]);
        let capture = parse_move(&board, "exd5").unwrap();
        assert_eq!(to_san(&board, capture), "exd5");

        let board = play(&["f3", "e5", "g4"]);
        let mate = parse_move(&board, "Qh4").unwrap();
        assert_eq!(to_san(&board, mate), "Qh4#");
    }

    #[test]
    fn renders_castling() {
        let board = play(&["e4", "e5", "Nf3", "Nc6", "Bc4", "Bc5"]);
        let castle = parse_move(&board, "O-O").unwrap();
        assert!(is_castle(&board, castle));
        assert_eq!(to_san(&board, castle), "O-O");
        assert_eq!(parse_move(&board, "0-0"), Some(castle));
    }

    #[test]
    fn disambiguates_by_file() {
        // Knights on b1 and f3 can both reach d2
        let board = Board::from_str("4k3/8/8/8/8/5N2/8/1N2K3 w - - 0 1").unwrap();
        let mv = parse_move(&board, "b1d2").unwrap();
        assert_eq!(to_san(&board, mv), "Nbd2");
        assert_eq!(parse_move(&board, "Nfd2").map(|m| m.get_source()), Some(Square::F3));
    }

    #[test]
    fn renders_promotion() {
        let board = Board::from_str("8/4P3/8/8/8/8/k7/4K3 w - - 0 1").unwrap();
        let mv = parse_move(&board, "e7e8q").unwrap();
        assert_eq!(to_san(&board, mv), "e8=Q");
        assert_eq!(parse_move(&board, "e8=Q"), Some(mv));
    }
}
