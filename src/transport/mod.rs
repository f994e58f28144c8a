//! Boundary between a session and whatever backend is authoritative for it.

pub mod loopback;

use chess::ChessMove;
use futures::future::LocalBoxFuture;
use futures::stream::LocalBoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TransportError;

pub use loopback::{LoopbackReferee, LoopbackTransport};

/// One pushed snapshot, still in its JSON wire form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFrame(pub String);

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OfferKind {
    Draw,
    Rematch,
}

impl fmt::Display for OfferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferKind::Draw => write!(f, "draw"),
            OfferKind::Rematch => write!(f, "rematch"),
        }
    }
}

pub type RequestFuture = LocalBoxFuture<'static, Result<(), TransportError>>;

/// Disposer for a push subscription. Runs its teardown exactly once, on
/// `cancel` or on drop, whichever comes first.
pub struct Subscription {
    teardown: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(teardown: impl FnOnce() + 'static) -> Self {
        Subscription {
            teardown: Some(Box::new(teardown)),
        }
    }

    pub fn cancel(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.teardown.is_some())
            .finish()
    }
}

/// Push subscription plus request/response calls, acting as one player.
///
/// Requests only report whether the backend took them; their effect is only
/// ever observed through the next pushed snapshot.
pub trait Transport {
    /// Player this transport acts for
    fn viewer_id(&self) -> &str;

    fn subscribe(
        &self,
        game_id: &str,
    ) -> Result<(LocalBoxStream<'static, SnapshotFrame>, Subscription), TransportError>;

    fn submit_move(&self, game_id: &str, mv: ChessMove) -> RequestFuture;

    fn submit_offer(&self, game_id: &str, kind: OfferKind) -> RequestFuture;

    fn submit_response(&self, game_id: &str, kind: OfferKind, accept: bool) -> RequestFuture;

    fn resign(&self, game_id: &str) -> RequestFuture;
}
