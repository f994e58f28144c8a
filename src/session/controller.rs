use actix::prelude::*;
use chess::Square;
use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::error::Rejection;
use crate::game::rules::ChessRules;
use crate::models::{Notice, SessionEvent, SessionUpdate, Signal, ViewModel};
use crate::session::clock::{SystemTimeSource, TimeSource};
use crate::session::navigation::NavCommand;
use crate::session::reconcile::Ingest;
use crate::session::store::SessionStore;
use crate::session::submission::MoveRequest;
use crate::transport::{OfferKind, SnapshotFrame, Subscription, Transport};

/// Submit a move from the live position
#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "Result<(), Rejection>")]
pub struct SubmitMove(pub MoveRequest);

/// Offer a draw or a rematch
#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "Result<(), Rejection>")]
pub struct Offer(pub OfferKind);

/// Answer the opponent's pending offer
#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "Result<(), Rejection>")]
pub struct Respond {
    pub kind: OfferKind,
    pub accept: bool,
}

#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "Result<(), Rejection>")]
pub struct Resign;

#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "Result<(), Rejection>")]
pub struct Navigate(pub NavCommand);

#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "Vec<Square>")]
pub struct LegalDestinations(pub Square);

#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "ViewModel")]
pub struct GetView;

/// Tear the session down
#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "()")]
pub struct Leave;

/// Actor owning one game session: the store, the push subscription and the
/// clock tick. Snapshots, ticks and user actions are all messages to it, so
/// none of them ever interleave.
pub struct SessionController {
    store: SessionStore,
    transport: Box<dyn Transport>,
    time: Arc<dyn TimeSource>,
    events: Recipient<SessionUpdate>,
    subscription: Option<Subscription>,
    stream: Option<SpawnHandle>,
    ticker: Option<SpawnHandle>,
}

impl SessionController {
    pub fn new(
        game_id: impl Into<String>,
        transport: Box<dyn Transport>,
        events: Recipient<SessionUpdate>,
    ) -> Self {
        let store = SessionStore::new(
            game_id,
            transport.viewer_id().to_string(),
            Box::new(ChessRules),
            SessionConfig::default(),
        );
        SessionController {
            store,
            transport,
            time: Arc::new(SystemTimeSource),
            events,
            subscription: None,
            stream: None,
            ticker: None,
        }
    }

    /// Must be called before the actor starts
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.store = SessionStore::new(
            self.store.session_id().to_string(),
            self.store.viewer_id().to_string(),
            Box::new(ChessRules),
            config,
        );
        self
    }

    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    fn emit(&self, event: SessionEvent) {
        self.events.do_send(SessionUpdate {
            session_id: self.store.session_id().to_string(),
            event,
        });
    }

    fn notify(&self, notice: Notice) {
        self.emit(SessionEvent::Notice(notice));
    }

    fn push_view(&self) {
        let view = self.store.view(self.time.now_ms());
        self.emit(SessionEvent::View(Box::new(view)));
    }

    fn reject(&self, rejection: &Rejection) {
        debug!("Rejected locally in {}: {}", self.store.session_id(), rejection);
        self.notify(Notice::warning(rejection.to_string()));
    }

    /// Start the tick while the game runs, stop it otherwise
    fn sync_timer(&mut self, ctx: &mut Context<Self>) {
        match (self.store.is_running(), self.ticker.is_some()) {
            (true, false) => {
                let period = self.store.config().tick_period;
                debug!("Starting clock for {} every {:?}", self.store.session_id(), period);
                self.ticker = Some(ctx.run_interval(period, |act, _ctx| act.on_tick()));
            }
            (false, true) => {
                if let Some(handle) = self.ticker.take() {
                    debug!("Stopping clock for {}", self.store.session_id());
                    ctx.cancel_future(handle);
                }
            }
            _ => {}
        }
    }

    fn on_tick(&mut self) {
        let Some(tick) = self.store.tick(self.time.now_ms()) else {
            return;
        };
        self.emit(SessionEvent::Clock(tick.clock));
        if let Some(timeout) = tick.timeout {
            self.emit(SessionEvent::Signal(timeout));
            self.push_view();
        }
    }

    fn teardown(&mut self, ctx: &mut Context<Self>) {
        if let Some(handle) = self.ticker.take() {
            ctx.cancel_future(handle);
        }
        if let Some(handle) = self.stream.take() {
            ctx.cancel_future(handle);
        }
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }
}

impl Actor for SessionController {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(
            "Session {} starting for viewer {}",
            self.store.session_id(),
            self.store.viewer_id()
        );
        match self.transport.subscribe(self.store.session_id()) {
            Ok((stream, subscription)) => {
                self.subscription = Some(subscription);
                self.stream = Some(ctx.add_stream(stream));
            }
            Err(e) => {
                error!("Subscribing to {} failed: {}", self.store.session_id(), e);
                self.notify(Notice::error("Failed to load game"));
            }
        }
    }

    fn stopping(&mut self, ctx: &mut Self::Context) -> Running {
        self.teardown(ctx);
        info!("Session {} closed", self.store.session_id());
        Running::Stop
    }
}

impl StreamHandler<SnapshotFrame> for SessionController {
    fn handle(&mut self, frame: SnapshotFrame, ctx: &mut Self::Context) {
        match self.store.ingest(&frame) {
            Ok(Ingest::Applied(outcome)) => {
                for signal in outcome.signals {
                    self.emit(SessionEvent::Signal(signal));
                }
                for notice in outcome.notices {
                    self.notify(notice);
                }
                self.push_view();
                self.sync_timer(ctx);
                if !self.store.is_running() {
                    // Final clock values once the game stops
                    self.on_tick();
                }
            }
            Ok(Ingest::Stale) => {}
            Err(e) => {
                warn!("Discarding snapshot for {}: {}", self.store.session_id(), e);
                self.notify(Notice::error("Ignored an invalid game update"));
            }
        }
    }

    fn finished(&mut self, _ctx: &mut Self::Context) {
        // Keep serving the last known state
        info!("Snapshot stream for {} ended", self.store.session_id());
    }
}

impl Handler<SubmitMove> for SessionController {
    type Result = Result<(), Rejection>;

    fn handle(&mut self, msg: SubmitMove, ctx: &mut Self::Context) -> Self::Result {
        let (mv, signal) = match self.store.begin_move(msg.0) {
            Ok(started) => started,
            Err(rejection) => {
                debug!("Move rejected in {}: {}", self.store.session_id(), rejection);
                self.emit(SessionEvent::Signal(Signal::MoveRejected {
                    reason: rejection.to_string(),
                }));
                return Err(rejection);
            }
        };
        self.emit(SessionEvent::Signal(signal));
        self.push_view();

        let request = self.transport.submit_move(self.store.session_id(), mv);
        ctx.spawn(request.into_actor(self).map(|result, act, _ctx| {
            if let Some(notice) = act.store.settle_move(result) {
                act.notify(notice);
            }
            act.push_view();
        }));
        Ok(())
    }
}

impl Handler<Offer> for SessionController {
    type Result = Result<(), Rejection>;

    fn handle(&mut self, msg: Offer, ctx: &mut Self::Context) -> Self::Result {
        let kind = msg.0;
        if let Err(rejection) = self.store.begin_offer(kind) {
            self.reject(&rejection);
            return Err(rejection);
        }
        info!("Offering {} in {}", kind, self.store.session_id());
        self.push_view();

        let request = self.transport.submit_offer(self.store.session_id(), kind);
        ctx.spawn(request.into_actor(self).map(move |result, act, _ctx| {
            let notice = act.store.settle_offer(kind, result);
            act.notify(notice);
            act.push_view();
        }));
        Ok(())
    }
}

impl Handler<Respond> for SessionController {
    type Result = Result<(), Rejection>;

    fn handle(&mut self, msg: Respond, ctx: &mut Self::Context) -> Self::Result {
        let Respond { kind, accept } = msg;
        if let Err(rejection) = self.store.begin_response(kind) {
            self.reject(&rejection);
            return Err(rejection);
        }
        info!(
            "{} {} offer in {}",
            if accept { "Accepting" } else { "Declining" },
            kind,
            self.store.session_id()
        );

        let request = self
            .transport
            .submit_response(self.store.session_id(), kind, accept);
        ctx.spawn(request.into_actor(self).map(move |result, act, _ctx| {
            if let Some(notice) = act.store.settle_response(kind, accept, result) {
                act.notify(notice);
            }
            act.push_view();
        }));
        Ok(())
    }
}

impl Handler<Resign> for SessionController {
    type Result = Result<(), Rejection>;

    fn handle(&mut self, _msg: Resign, ctx: &mut Self::Context) -> Self::Result {
        if let Err(rejection) = self.store.check_resign() {
            self.reject(&rejection);
            return Err(rejection);
        }
        info!("Resigning {}", self.store.session_id());

        let request = self.transport.resign(self.store.session_id());
        ctx.spawn(request.into_actor(self).map(|result, act, _ctx| {
            let notice = act.store.settle_resign(result);
            act.notify(notice);
        }));
        Ok(())
    }
}

impl Handler<Navigate> for SessionController {
    type Result = Result<(), Rejection>;

    fn handle(&mut self, msg: Navigate, _ctx: &mut Self::Context) -> Self::Result {
        if let Err(rejection) = self.store.navigate(msg.0) {
            self.reject(&rejection);
            return Err(rejection);
        }
        self.push_view();
        Ok(())
    }
}

impl Handler<LegalDestinations> for SessionController {
    type Result = MessageResult<LegalDestinations>;

    fn handle(&mut self, msg: LegalDestinations, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.store.legal_destinations(msg.0))
    }
}

impl Handler<GetView> for SessionController {
    type Result = MessageResult<GetView>;

    fn handle(&mut self, _msg: GetView, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.store.view(self.time.now_ms()))
    }
}

impl Handler<Leave> for SessionController {
    type Result = ();

    fn handle(&mut self, _msg: Leave, ctx: &mut Self::Context) {
        info!("Leaving session {}", self.store.session_id());
        ctx.stop();
    }
}
