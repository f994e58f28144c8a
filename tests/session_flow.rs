use actix::prelude::*;
use chess::{Color, Square};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chess_session_client::config::SessionConfig;
use chess_session_client::error::Rejection;
use chess_session_client::models::{
    FinishReason, GameStatus, MoveClass, Player, SessionEvent, SessionUpdate, Signal,
};
use chess_session_client::session::{
    GetView, Leave, LegalDestinations, ManualTime, MoveRequest, NavCommand, Navigate, Offer,
    Resign, Respond, SessionController, SubmitMove,
};
use chess_session_client::transport::loopback::{LoopbackReferee, TimeControl};
use chess_session_client::transport::OfferKind;

/// Records every event one session pushes
struct Collector {
    session_id: String,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Actor for Collector {
    type Context = Context<Self>;
}

impl Handler<SessionUpdate> for Collector {
    type Result = ();

    fn handle(&mut self, update: SessionUpdate, _ctx: &mut Self::Context) {
        assert_eq!(update.session_id, self.session_id);
        self.events.lock().unwrap().push(update.event);
    }
}

struct Seat {
    session: Addr<SessionController>,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Seat {
    fn signals(&self) -> Vec<Signal> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Signal(signal) => Some(signal.clone()),
                _ => None,
            })
            .collect()
    }

    fn notices(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Notice(notice) => Some(notice.text.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, wanted: impl Fn(&Signal) -> bool) -> usize {
        self.signals().iter().filter(|signal| wanted(signal)).count()
    }

    fn clock_ticks(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, SessionEvent::Clock(_)))
            .count()
    }

    fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

struct Table {
    referee: LoopbackReferee,
    time: Arc<ManualTime>,
    game_id: String,
    white: Seat,
    black: Seat,
}

fn player(id: &str, name: &str) -> Player {
    Player {
        id: id.to_string(),
        username: name.to_string(),
    }
}

fn seat(table_ref: (&LoopbackReferee, &Arc<ManualTime>, &str), player_id: &str) -> Seat {
    let (referee, time, game_id) = table_ref;
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = Collector {
        session_id: game_id.to_string(),
        events: events.clone(),
    }
    .start();
    let session = SessionController::new(
        game_id,
        Box::new(referee.transport(player_id)),
        collector.recipient(),
    )
    .with_config(SessionConfig::default().with_tick_period(Duration::from_millis(10)))
    .with_time_source(time.clone())
    .start();
    Seat { session, events }
}

async fn settle() {
    actix_rt::time::sleep(Duration::from_millis(60)).await;
}

async fn table(control: TimeControl) -> Table {
    let time = Arc::new(ManualTime::new(0));
    let referee = LoopbackReferee::new(time.clone());
    let game_id = referee
        .create_game(player("alice-id", "alice"), Some(player("bob-id", "bob")), control)
        .unwrap();
    let white = seat((&referee, &time, &game_id), "alice-id");
    let black = seat((&referee, &time, &game_id), "bob-id");
    settle().await;
    Table {
        referee,
        time,
        game_id,
        white,
        black,
    }
}

fn e2e4() -> SubmitMove {
    SubmitMove(MoveRequest {
        from: Square::E2,
        to: Square::E4,
        promotion: None,
    })
}

#[actix_rt::test]
async fn both_seats_start_and_see_each_other() {
    let table = table(TimeControl::default()).await;
    assert_eq!(table.white.signals(), vec![Signal::GameStarted]);
    assert_eq!(table.black.signals(), vec![Signal::GameStarted]);

    let view = table.black.session.send(GetView).await.unwrap();
    assert_eq!(view.status, Some(GameStatus::InProgress));
    assert_eq!(view.viewer_color, Some(Color::Black));
    assert_eq!(view.white_name, "alice");
    assert!(!view.is_my_turn);
}

#[actix_rt::test]
async fn move_is_optimistic_locally_and_classified_remotely() {
    let table = table(TimeControl::default()).await;
    table.white.session.send(e2e4()).await.unwrap().unwrap();
    settle().await;

    assert_eq!(
        table.white.count(|s| matches!(s, Signal::MoveApplied { optimistic: true, .. })),
        1
    );
    assert_eq!(
        table.black.signals().last(),
        Some(&Signal::MoveApplied {
            san: "e4".to_string(),
            class: MoveClass::Quiet,
            by: Color::White,
            optimistic: false,
        })
    );
    let view = table.black.session.send(GetView).await.unwrap();
    assert!(view.is_my_turn);
    assert_eq!(view.move_rows.len(), 1);

    let hints = table
        .black
        .session
        .send(LegalDestinations(Square::G8))
        .await
        .unwrap();
    assert_eq!(hints.len(), 2);
}

#[actix_rt::test]
async fn out_of_turn_move_never_reaches_the_referee() {
    let table = table(TimeControl::default()).await;
    let result = table
        .black
        .session
        .send(SubmitMove(MoveRequest {
            from: Square::E7,
            to: Square::E5,
            promotion: None,
        }))
        .await
        .unwrap();
    assert_eq!(result, Err(Rejection::NotYourTurn));
    settle().await;
    assert!(table.referee.snapshot(&table.game_id).unwrap().moves.is_empty());
    assert_eq!(
        table.black.count(|s| matches!(s, Signal::MoveRejected { .. })),
        1
    );
}

#[actix_rt::test]
async fn declined_draw_is_reported_once_to_the_offerer() {
    let table = table(TimeControl::default()).await;
    table
        .white
        .session
        .send(Offer(OfferKind::Draw))
        .await
        .unwrap()
        .unwrap();
    settle().await;
    assert_eq!(
        table.black.count(|s| matches!(s, Signal::DrawOffered { by: Color::White, .. })),
        1
    );
    assert!(table.black.notices().contains(&"alice offered a draw".to_string()));

    table
        .black
        .session
        .send(Respond {
            kind: OfferKind::Draw,
            accept: false,
        })
        .await
        .unwrap()
        .unwrap();
    settle().await;

    assert_eq!(
        table.white.count(|s| matches!(s, Signal::DrawDeclined { offered_by: Color::White })),
        1
    );
    assert_eq!(
        table.black.count(|s| matches!(s, Signal::DrawDeclined { .. })),
        0
    );
}

#[actix_rt::test]
async fn fourth_draw_offer_is_refused_without_a_call() {
    let table = table(TimeControl::default()).await;
    for _ in 0..3 {
        table
            .white
            .session
            .send(Offer(OfferKind::Draw))
            .await
            .unwrap()
            .unwrap();
        settle().await;
        table
            .black
            .session
            .send(Respond {
                kind: OfferKind::Draw,
                accept: false,
            })
            .await
            .unwrap()
            .unwrap();
        settle().await;
    }

    let fourth = table.white.session.send(Offer(OfferKind::Draw)).await.unwrap();
    assert_eq!(fourth, Err(Rejection::DrawOfferCap(3)));
    settle().await;
    let record = table.referee.snapshot(&table.game_id).unwrap();
    assert_eq!(record.draw.white_offers, 3);
    assert!(!record.draw.active);
    assert!(table
        .white
        .notices()
        .contains(&"You've already used 3 draw offers in this game.".to_string()));
}

#[actix_rt::test]
async fn accepted_draw_ends_the_game_for_both() {
    let table = table(TimeControl::default()).await;
    table
        .black
        .session
        .send(Offer(OfferKind::Draw))
        .await
        .unwrap()
        .unwrap();
    settle().await;
    table
        .white
        .session
        .send(Respond {
            kind: OfferKind::Draw,
            accept: true,
        })
        .await
        .unwrap()
        .unwrap();
    settle().await;

    let ended = |s: &Signal| matches!(s, Signal::GameEnded { text } if text == "Draw by Agreement");
    assert_eq!(table.white.count(ended), 1);
    assert_eq!(table.black.count(ended), 1);
    assert!(table
        .black
        .notices()
        .contains(&"Draw accepted! Game ends in a draw.".to_string()));
    assert_eq!(table.black.count(|s| matches!(s, Signal::DrawDeclined { .. })), 0);
}

#[actix_rt::test]
async fn accepted_rematch_redirects_both_seats_once() {
    let table = table(TimeControl::default()).await;
    table.white.session.send(Resign).await.unwrap().unwrap();
    settle().await;
    assert_eq!(
        table.black.count(|s| matches!(s, Signal::GameEnded { text } if text == "Opponent Resigned - You Win!")),
        1
    );

    table
        .white
        .session
        .send(Offer(OfferKind::Rematch))
        .await
        .unwrap()
        .unwrap();
    settle().await;
    assert!(table.black.notices().contains(&"alice wants a rematch".to_string()));

    table
        .black
        .session
        .send(Respond {
            kind: OfferKind::Rematch,
            accept: true,
        })
        .await
        .unwrap()
        .unwrap();
    settle().await;

    let successor = table
        .referee
        .snapshot(&table.game_id)
        .unwrap()
        .rematch
        .successor_id
        .unwrap();
    for seat in [&table.white, &table.black] {
        let redirects: Vec<Signal> = seat
            .signals()
            .into_iter()
            .filter(|s| matches!(s, Signal::Redirect { .. }))
            .collect();
        assert_eq!(
            redirects,
            vec![Signal::Redirect {
                successor_id: successor.clone()
            }]
        );
    }
}

#[actix_rt::test]
async fn local_timeout_is_advisory_until_the_referee_settles() {
    let table = table(TimeControl::minutes(1, 0)).await;
    table.time.set(61_000);
    settle().await;

    assert_eq!(
        table.white.signals().iter().filter(|s| matches!(s, Signal::LocalTimeout { .. })).collect::<Vec<_>>(),
        vec![&Signal::LocalTimeout {
            side: Color::White,
            text: "You Lose on Time".to_string(),
        }]
    );
    let view = table.white.session.send(GetView).await.unwrap();
    assert_eq!(view.status, Some(GameStatus::InProgress));
    assert!(view.result.is_some_and(|banner| banner.provisional));

    assert_eq!(table.referee.sweep(), 1);
    settle().await;
    let record = table.referee.snapshot(&table.game_id).unwrap();
    assert_eq!(record.finish_reason, Some(FinishReason::WhiteTimeout));

    assert_eq!(
        table.black.count(|s| matches!(s, Signal::GameEnded { text } if text == "You Win on Time!")),
        1
    );
    let view = table.white.session.send(GetView).await.unwrap();
    let banner = view.result.unwrap();
    assert_eq!(banner.text, "You Lose on Time");
    assert!(!banner.provisional);
    assert!(!view.clock.running);
}

#[actix_rt::test]
async fn browsing_survives_new_moves() {
    let table = table(TimeControl::default()).await;
    table.white.session.send(e2e4()).await.unwrap().unwrap();
    settle().await;
    table
        .white
        .session
        .send(Navigate(NavCommand::Start))
        .await
        .unwrap()
        .unwrap();

    table
        .black
        .session
        .send(SubmitMove(MoveRequest {
            from: Square::E7,
            to: Square::E5,
            promotion: None,
        }))
        .await
        .unwrap()
        .unwrap();
    settle().await;

    let view = table.white.session.send(GetView).await.unwrap();
    assert!(!view.cursor.live);
    assert_eq!(view.cursor.ply, 0);
    assert_eq!(view.cursor.total_plies, 2);
    assert!(!view.can_move);

    let browsing = table.white.session.send(e2e4()).await.unwrap();
    assert_eq!(browsing, Err(Rejection::Browsing));
}

#[actix_rt::test]
async fn leaving_stops_all_delivery() {
    let table = table(TimeControl::default()).await;
    table.black.session.send(Leave).await.unwrap();
    settle().await;
    table.black.clear();

    table.white.session.send(e2e4()).await.unwrap().unwrap();
    table.time.set(5_000);
    settle().await;
    assert!(table.black.events.lock().unwrap().is_empty());
    assert!(!table.black.session.connected());
}

#[actix_rt::test]
async fn clock_ticks_stop_when_the_game_ends_and_resume_in_the_rematch() {
    let table = table(TimeControl::default()).await;
    assert!(table.white.clock_ticks() > 0);
    assert!(table.black.clock_ticks() > 0);

    table.white.session.send(Resign).await.unwrap().unwrap();
    settle().await;
    table.white.clear();
    table.black.clear();

    // Many tick periods with nothing running
    settle().await;
    settle().await;
    assert_eq!(table.white.clock_ticks(), 0);
    assert_eq!(table.black.clock_ticks(), 0);

    table
        .white
        .session
        .send(Offer(OfferKind::Rematch))
        .await
        .unwrap()
        .unwrap();
    settle().await;
    table
        .black
        .session
        .send(Respond {
            kind: OfferKind::Rematch,
            accept: true,
        })
        .await
        .unwrap()
        .unwrap();
    settle().await;
    assert_eq!(table.white.clock_ticks(), 0);

    let successor = table
        .referee
        .snapshot(&table.game_id)
        .unwrap()
        .rematch
        .successor_id
        .unwrap();
    let next = seat((&table.referee, &table.time, &successor), "alice-id");
    settle().await;
    assert!(next.clock_ticks() > 0);
    let view = next.session.send(GetView).await.unwrap();
    assert_eq!(view.viewer_color, Some(Color::Black));
    assert!(view.clock.running);
}
