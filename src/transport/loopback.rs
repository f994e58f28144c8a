//! In-process referee acting as the authoritative backend for local play
//! and for tests. Every accepted request mutates the hosted game and pushes
//! a fresh versioned snapshot to all of that game's subscribers.

use chess::{BoardStatus, ChessMove, Color};
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::future::{self, FutureExt};
use futures::stream::{LocalBoxStream, StreamExt};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use super::{OfferKind, RequestFuture, SnapshotFrame, Subscription, Transport};
use crate::config::DEFAULT_DRAW_OFFER_CAP;
use crate::error::TransportError;
use crate::game::rules::ChessRules;
use crate::game::utils::has_insufficient_material;
use crate::models::{
    DrawOfferState, FinishReason, GameRecord, GameStatus, Player, RematchOfferState,
    RematchStatus, SnapshotMessage, Winner,
};
use crate::session::clock::{SystemTimeSource, TimeSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeControl {
    pub initial_ms: u64,
    pub increment_ms: u64,
}

impl TimeControl {
    pub fn minutes(minutes: u64, increment_secs: u64) -> Self {
        TimeControl {
            initial_ms: minutes.saturating_mul(60_000),
            increment_ms: increment_secs.saturating_mul(1000),
        }
    }
}

impl Default for TimeControl {
    fn default() -> Self {
        TimeControl::minutes(10, 0)
    }
}

fn rejected(reason: impl Into<String>) -> TransportError {
    TransportError::Rejected(reason.into())
}

fn winner_of(side: Color) -> Winner {
    match side {
        Color::White => Winner::White,
        Color::Black => Winner::Black,
    }
}

/// Game state for a hosted game
struct HostedGame {
    record: GameRecord,
    control: TimeControl,
    white_ms: u64,
    black_ms: u64,
    /// Hash of every position reached, starting position included
    history: Vec<u64>,
}

impl HostedGame {
    fn new(id: String, white: Player, black: Option<Player>, control: TimeControl, now: u64) -> Self {
        let seated = black.is_some();
        let record = GameRecord {
            id,
            version: Some(1),
            status: if seated { GameStatus::InProgress } else { GameStatus::Pending },
            position: Default::default(),
            moves: Vec::new(),
            white_time_left: control.initial_ms / 1000,
            black_time_left: control.initial_ms / 1000,
            last_move_at_ms: seated.then_some(now),
            winner: Winner::Undecided,
            finish_reason: None,
            white_player: white,
            black_player: black,
            draw: DrawOfferState::default(),
            rematch: RematchOfferState::default(),
        };
        HostedGame {
            history: vec![record.position.get_hash()],
            record,
            control,
            white_ms: control.initial_ms,
            black_ms: control.initial_ms,
        }
    }

    fn remaining_ms(&self, side: Color) -> u64 {
        match side {
            Color::White => self.white_ms,
            Color::Black => self.black_ms,
        }
    }

    fn set_remaining_ms(&mut self, side: Color, ms: u64) {
        match side {
            Color::White => {
                self.white_ms = ms;
                self.record.white_time_left = ms / 1000;
            }
            Color::Black => {
                self.black_ms = ms;
                self.record.black_time_left = ms / 1000;
            }
        }
    }

    fn seat(&self, player_id: &str) -> Result<Color, TransportError> {
        self.record
            .side_of(player_id)
            .ok_or_else(|| rejected("Spectators cannot act in this game"))
    }

    fn require(&self, status: GameStatus) -> Result<(), TransportError> {
        if self.record.status != status {
            return Err(match status {
                GameStatus::Completed => rejected("Game is not over yet"),
                _ => rejected("Game is not in progress"),
            });
        }
        Ok(())
    }

    fn finish(&mut self, winner: Winner, reason: FinishReason) {
        info!("Game {} finished: {:?} ({:?})", self.record.id, winner, reason);
        self.record.status = GameStatus::Completed;
        self.record.winner = winner;
        self.record.finish_reason = Some(reason);
        self.record.draw.active = false;
        self.record.draw.offered_by = None;
    }

    /// Settle the game if the side to move has run out of time
    fn flag_if_expired(&mut self, now: u64) -> bool {
        if self.record.status != GameStatus::InProgress {
            return false;
        }
        let Some(last) = self.record.last_move_at_ms else {
            return false;
        };
        let side = self.record.position.side_to_move();
        if now.saturating_sub(last) < self.remaining_ms(side) {
            return false;
        }
        self.set_remaining_ms(side, 0);
        let reason = match side {
            Color::White => FinishReason::WhiteTimeout,
            Color::Black => FinishReason::BlackTimeout,
        };
        self.finish(winner_of(!side), reason);
        true
    }

    fn play(&mut self, player_id: &str, mv: ChessMove, now: u64) -> Result<(), TransportError> {
        let side = self.seat(player_id)?;
        self.require(GameStatus::InProgress)?;
        if self.record.position.side_to_move() != side {
            return Err(rejected("Not your turn"));
        }
        if !self.record.position.legal(mv) {
            return Err(rejected("Illegal move"));
        }

        let elapsed = self
            .record
            .last_move_at_ms
            .map_or(0, |last| now.saturating_sub(last));
        let left = self.remaining_ms(side).saturating_sub(elapsed);
        self.set_remaining_ms(side, left.saturating_add(self.control.increment_ms));

        self.record.position = self.record.position.make_move_new(mv);
        self.record.moves.push(mv);
        self.record.last_move_at_ms = Some(now);
        self.history.push(self.record.position.get_hash());
        debug!("Game {}: {} played {}", self.record.id, self.record.moves.len(), mv);

        self.settle_position();
        Ok(())
    }

    fn settle_position(&mut self) {
        let board = self.record.position;
        match board.status() {
            BoardStatus::Checkmate => {
                self.finish(winner_of(!board.side_to_move()), FinishReason::Checkmate)
            }
            BoardStatus::Stalemate => self.finish(Winner::Draw, FinishReason::Stalemate),
            BoardStatus::Ongoing => {
                let hash = board.get_hash();
                if has_insufficient_material(&board) {
                    self.finish(Winner::Draw, FinishReason::InsufficientMaterial);
                } else if self.history.iter().filter(|h| **h == hash).count() >= 3 {
                    self.finish(Winner::Draw, FinishReason::Threefold);
                }
            }
        }
    }

    fn offer_draw(&mut self, player_id: &str, cap: u8) -> Result<(), TransportError> {
        let side = self.seat(player_id)?;
        self.require(GameStatus::InProgress)?;
        if self.record.draw.active {
            return Err(rejected("A draw offer is already pending"));
        }
        let used = self.record.draw.offers_by(side);
        if used >= cap {
            return Err(rejected(format!(
                "You've already used {} draw offers in this game.",
                used
            )));
        }
        let draw = &mut self.record.draw;
        draw.active = true;
        draw.offered_by = Some(side);
        match side {
            Color::White => draw.white_offers += 1,
            Color::Black => draw.black_offers += 1,
        }
        Ok(())
    }

    fn respond_draw(&mut self, player_id: &str, accept: bool) -> Result<(), TransportError> {
        let side = self.seat(player_id)?;
        self.require(GameStatus::InProgress)?;
        if self.record.draw.pending_from() != Some(!side) {
            return Err(rejected("There is no draw offer to respond to"));
        }
        if accept {
            self.finish(Winner::Draw, FinishReason::DrawAgreement);
        } else {
            self.record.draw.active = false;
            self.record.draw.offered_by = None;
        }
        Ok(())
    }

    fn offer_rematch(&mut self, player_id: &str) -> Result<(), TransportError> {
        let side = self.seat(player_id)?;
        self.require(GameStatus::Completed)?;
        let rematch = &mut self.record.rematch;
        if rematch.active || rematch.status == RematchStatus::Accepted {
            return Err(rejected("A rematch is already arranged"));
        }
        rematch.active = true;
        rematch.offered_by = Some(side);
        rematch.status = RematchStatus::Pending;
        Ok(())
    }

    /// Accepting yields the successor game, colours swapped
    fn respond_rematch(
        &mut self,
        player_id: &str,
        accept: bool,
        now: u64,
    ) -> Result<Option<HostedGame>, TransportError> {
        let side = self.seat(player_id)?;
        if self.record.rematch.pending_from() != Some(!side) {
            return Err(rejected("There is no rematch offer to respond to"));
        }
        self.record.rematch.active = false;
        if !accept {
            self.record.rematch.status = RematchStatus::Declined;
            return Ok(None);
        }

        let black = self
            .record
            .black_player
            .clone()
            .ok_or_else(|| rejected("Game has no opponent"))?;
        let successor = HostedGame::new(
            Uuid::new_v4().to_string(),
            black,
            Some(self.record.white_player.clone()),
            self.control,
            now,
        );
        self.record.rematch.status = RematchStatus::Accepted;
        self.record.rematch.successor_id = Some(successor.record.id.clone());
        Ok(Some(successor))
    }

    fn resign(&mut self, player_id: &str) -> Result<(), TransportError> {
        let side = self.seat(player_id)?;
        self.require(GameStatus::InProgress)?;
        self.finish(winner_of(!side), FinishReason::Resignation);
        Ok(())
    }

    fn frame(&self) -> Result<SnapshotFrame, serde_json::Error> {
        let message = SnapshotMessage::encode(&self.record, &ChessRules);
        serde_json::to_string(&message).map(SnapshotFrame)
    }
}

#[derive(Default)]
struct RefereeState {
    games: HashMap<String, HostedGame>,
    subscribers: HashMap<String, Vec<(u64, UnboundedSender<SnapshotFrame>)>>,
    next_subscriber: u64,
}

impl RefereeState {
    fn game_mut(&mut self, game_id: &str) -> Result<&mut HostedGame, TransportError> {
        self.games
            .get_mut(game_id)
            .ok_or_else(|| TransportError::GameNotFound(game_id.to_string()))
    }

    /// Bump the version and push the game to its subscribers
    fn publish(&mut self, game_id: &str) {
        let Some(game) = self.games.get_mut(game_id) else {
            return;
        };
        game.record.version = Some(game.record.version.map_or(1, |v| v + 1));
        let frame = match game.frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to serialize game {}: {}", game_id, e);
                return;
            }
        };
        if let Some(subscribers) = self.subscribers.get_mut(game_id) {
            subscribers.retain(|(_, tx)| tx.unbounded_send(frame.clone()).is_ok());
            debug!("Pushed {} to {} subscriber(s)", game_id, subscribers.len());
            if subscribers.is_empty() {
                self.subscribers.remove(game_id);
            }
        }
    }

    /// Remove one subscriber. A finished game nobody watches any more is
    /// dropped with its last subscriber.
    fn detach(&mut self, game_id: &str, subscriber: u64) {
        let Some(subscribers) = self.subscribers.get_mut(game_id) else {
            return;
        };
        subscribers.retain(|(sid, _)| *sid != subscriber);
        if !subscribers.is_empty() {
            return;
        }
        self.subscribers.remove(game_id);
        let finished = self
            .games
            .get(game_id)
            .is_some_and(|game| game.record.status == GameStatus::Completed);
        if finished {
            self.games.remove(game_id);
            info!("Dropped finished game {}", game_id);
        }
    }
}

/// Shared handle to the referee; clones refer to the same games
#[derive(Clone)]
pub struct LoopbackReferee {
    state: Arc<Mutex<RefereeState>>,
    time: Arc<dyn TimeSource>,
    draw_offer_cap: u8,
}

impl Default for LoopbackReferee {
    fn default() -> Self {
        Self::new(Arc::new(SystemTimeSource))
    }
}

impl LoopbackReferee {
    pub fn new(time: Arc<dyn TimeSource>) -> Self {
        LoopbackReferee {
            state: Arc::new(Mutex::new(RefereeState::default())),
            time,
            draw_offer_cap: DEFAULT_DRAW_OFFER_CAP,
        }
    }

    pub fn with_draw_offer_cap(mut self, cap: u8) -> Self {
        self.draw_offer_cap = cap;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, RefereeState>, TransportError> {
        self.state.lock().map_err(|_| TransportError::Unavailable)
    }

    /// Host a new game. Without a black player it waits in `PENDING`.
    pub fn create_game(
        &self,
        white: Player,
        black: Option<Player>,
        control: TimeControl,
    ) -> Result<String, TransportError> {
        let id = Uuid::new_v4().to_string();
        let game = HostedGame::new(id.clone(), white, black, control, self.time.now_ms());
        info!("Hosting game {} ({:?})", id, game.record.status);
        self.lock()?.games.insert(id.clone(), game);
        Ok(id)
    }

    /// Seat `player` as black, starting the game; seated players get their side back
    pub fn join(&self, game_id: &str, player: Player) -> Result<Color, TransportError> {
        let now = self.time.now_ms();
        let mut state = self.lock()?;
        let game = state.game_mut(game_id)?;
        if let Some(side) = game.record.side_of(&player.id) {
            return Ok(side);
        }
        if game.record.black_player.is_some() {
            return Err(rejected("Game is full"));
        }
        info!("Player {} joined game {} as black", player.id, game_id);
        game.record.black_player = Some(player);
        game.record.status = GameStatus::InProgress;
        game.record.last_move_at_ms = Some(now);
        state.publish(game_id);
        Ok(Color::Black)
    }

    pub fn snapshot(&self, game_id: &str) -> Result<GameRecord, TransportError> {
        let state = self.lock()?;
        state
            .games
            .get(game_id)
            .map(|game| game.record.clone())
            .ok_or_else(|| TransportError::GameNotFound(game_id.to_string()))
    }

    /// Run `action` against one game, settling an expired clock first.
    /// The game is published when the action succeeds or a flag fell.
    fn mutate<F>(&self, game_id: &str, action: F) -> Result<(), TransportError>
    where
        F: FnOnce(&mut HostedGame, u64) -> Result<Option<HostedGame>, TransportError>,
    {
        let now = self.time.now_ms();
        let mut state = self.lock()?;
        let game = state.game_mut(game_id)?;
        let flagged = game.flag_if_expired(now);
        let result = action(game, now);
        if flagged || result.is_ok() {
            state.publish(game_id);
        }
        match result {
            Ok(Some(successor)) => {
                info!("Game {} continues as {}", game_id, successor.record.id);
                state.games.insert(successor.record.id.clone(), successor);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                debug!("Game {} refused a request: {}", game_id, e);
                Err(e)
            }
        }
    }

    pub fn play(&self, game_id: &str, player_id: &str, mv: ChessMove) -> Result<(), TransportError> {
        self.mutate(game_id, |game, now| game.play(player_id, mv, now).map(|_| None))
    }

    pub fn offer(&self, game_id: &str, player_id: &str, kind: OfferKind) -> Result<(), TransportError> {
        let cap = self.draw_offer_cap;
        self.mutate(game_id, |game, _| {
            match kind {
                OfferKind::Draw => game.offer_draw(player_id, cap)?,
                OfferKind::Rematch => game.offer_rematch(player_id)?,
            }
            Ok(None)
        })
    }

    pub fn respond(
        &self,
        game_id: &str,
        player_id: &str,
        kind: OfferKind,
        accept: bool,
    ) -> Result<(), TransportError> {
        self.mutate(game_id, |game, now| match kind {
            OfferKind::Draw => game.respond_draw(player_id, accept).map(|_| None),
            OfferKind::Rematch => game.respond_rematch(player_id, accept, now),
        })
    }

    pub fn resign(&self, game_id: &str, player_id: &str) -> Result<(), TransportError> {
        self.mutate(game_id, |game, _| game.resign(player_id).map(|_| None))
    }

    /// Settle every running game whose side to move has run out of time.
    /// Returns how many games ended.
    pub fn sweep(&self) -> usize {
        let now = self.time.now_ms();
        let Ok(mut state) = self.lock() else {
            return 0;
        };
        let flagged: Vec<String> = state
            .games
            .iter_mut()
            .filter_map(|(id, game)| game.flag_if_expired(now).then(|| id.clone()))
            .collect();
        for id in &flagged {
            state.publish(id);
        }
        flagged.len()
    }

    /// Run `sweep` every `period` on the current arbiter
    pub fn spawn_sweeper(&self, period: Duration) -> actix_rt::task::JoinHandle<()> {
        let referee = self.clone();
        actix_rt::spawn(async move {
            let mut interval = actix_rt::time::interval(period);
            loop {
                interval.tick().await;
                let flagged = referee.sweep();
                if flagged > 0 {
                    info!("Flag fell in {} game(s)", flagged);
                }
            }
        })
    }

    /// Push subscription; the current snapshot is delivered first
    pub fn subscribe(
        &self,
        game_id: &str,
    ) -> Result<(LocalBoxStream<'static, SnapshotFrame>, Subscription), TransportError> {
        let (tx, rx) = unbounded();
        let id = {
            let mut state = self.lock()?;
            let frame = state
                .games
                .get(game_id)
                .ok_or_else(|| TransportError::GameNotFound(game_id.to_string()))?
                .frame()
                .map_err(|_| TransportError::Unavailable)?;
            tx.unbounded_send(frame)
                .map_err(|_| TransportError::Unavailable)?;
            let id = state.next_subscriber;
            state.next_subscriber += 1;
            state
                .subscribers
                .entry(game_id.to_string())
                .or_default()
                .push((id, tx));
            id
        };
        debug!("Subscriber {} attached to {}", id, game_id);

        let shared = self.state.clone();
        let game_id = game_id.to_string();
        let subscription = Subscription::new(move || {
            if let Ok(mut state) = shared.lock() {
                state.detach(&game_id, id);
            }
            debug!("Subscriber {} detached from {}", id, game_id);
        });
        Ok((rx.boxed_local(), subscription))
    }

    pub fn transport(&self, player_id: impl Into<String>) -> LoopbackTransport {
        LoopbackTransport {
            referee: self.clone(),
            player_id: player_id.into(),
        }
    }
}

/// `Transport` acting as one player against a `LoopbackReferee`
#[derive(Clone)]
pub struct LoopbackTransport {
    referee: LoopbackReferee,
    player_id: String,
}

impl LoopbackTransport {
    pub fn new(referee: LoopbackReferee, player_id: impl Into<String>) -> Self {
        referee.transport(player_id)
    }
}

impl Transport for LoopbackTransport {
    fn viewer_id(&self) -> &str {
        &self.player_id
    }

    fn subscribe(
        &self,
        game_id: &str,
    ) -> Result<(LocalBoxStream<'static, SnapshotFrame>, Subscription), TransportError> {
        self.referee.subscribe(game_id)
    }

    fn submit_move(&self, game_id: &str, mv: ChessMove) -> RequestFuture {
        future::ready(self.referee.play(game_id, &self.player_id, mv)).boxed_local()
    }

    fn submit_offer(&self, game_id: &str, kind: OfferKind) -> RequestFuture {
        future::ready(self.referee.offer(game_id, &self.player_id, kind)).boxed_local()
    }

    fn submit_response(&self, game_id: &str, kind: OfferKind, accept: bool) -> RequestFuture {
        future::ready(self.referee.respond(game_id, &self.player_id, kind, accept)).boxed_local()
    }

    fn resign(&self, game_id: &str) -> RequestFuture {
        future::ready(self.referee.resign(game_id, &self.player_id)).boxed_local()
    }
}
