use thiserror::Error;

/// Reasons an action is refused locally, before any network call is made
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Not your turn")]
    NotYourTurn,
    #[error("Illegal move")]
    IllegalMove,
    #[error("Return to the live position to make a move")]
    Browsing,
    #[error("Game is not in progress")]
    NotInProgress,
    #[error("Spectators cannot act in this game")]
    Spectator,
    #[error("Game has not loaded yet")]
    NotLoaded,
    #[error("A move is already being submitted")]
    SubmissionInFlight,
    #[error("You've already used {0} draw offers in this game.")]
    DrawOfferCap(u8),
    #[error("An offer is already pending")]
    OfferPending,
    #[error("There is no offer to respond to")]
    NoIncomingOffer,
    #[error("Response sent, waiting for the game to update")]
    AwaitingSettlement,
    #[error("Rematch is only available once the game is over")]
    RematchUnavailable,
    #[error("Ply {ply} is out of range (game has {len} moves)")]
    OutOfRange { ply: usize, len: usize },
}

/// Reasons an incoming snapshot frame is discarded
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("invalid snapshot payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("snapshot for game {got} delivered to session {expected}")]
    WrongSession { expected: String, got: String },
    #[error("position `{0}` is undecodable or disagrees with the move list")]
    Position(String),
    #[error("undecodable move `{text}` at ply {ply}")]
    Move { ply: usize, text: String },
    #[error("unknown player `{0}`")]
    UnknownPlayer(String),
}

/// Failure reported by a transport request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("{0}")]
    Rejected(String),
    #[error("game {0} not found")]
    GameNotFound(String),
    #[error("transport unavailable")]
    Unavailable,
}
