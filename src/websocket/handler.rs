use actix::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use chess::{Piece, Square};
use log::{debug, info, warn};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::*;
use crate::session::{
    GetView, Leave, LegalDestinations, MoveRequest, NavCommand, Navigate, Offer, Resign, Respond,
    SessionController, SubmitMove,
};
use crate::transport::OfferKind;

/// WebSocket bridge exposing one viewer's session to a browser
pub struct ViewerSocket {
    pub id: String,
    pub player_id: String,
    pub game_id: String,
    pub app_state: web::Data<AppState>,
    pub session: Option<Addr<SessionController>>,
}

impl ViewerSocket {
    /// Start a session controller for `game_id`, replacing any current one
    fn bind(&mut self, game_id: String, ctx: &mut ws::WebsocketContext<Self>) {
        if let Some(previous) = self.session.take() {
            previous.do_send(Leave);
        }
        info!("Connection {} bound to game {}", self.id, game_id);
        self.game_id = game_id;

        let transport = self.app_state.referee.transport(self.player_id.clone());
        let controller = SessionController::new(
            self.game_id.clone(),
            Box::new(transport),
            ctx.address().recipient(),
        )
        .with_config(self.app_state.config.clone())
        .with_time_source(self.app_state.time.clone());
        self.session = Some(controller.start());
    }

    fn send_json(&self, message: &ServerMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(message) {
            Ok(text) => ctx.text(text),
            Err(e) => {
                warn!("Failed to serialize {}: {}", message.message_type, e);
                ctx.text("{\"error\": \"Internal server error\"}");
            }
        }
    }

    fn send_error(&self, error: &str, ctx: &mut ws::WebsocketContext<Self>) {
        warn!("Connection {}: {}", self.id, error);
        self.send_json(&ServerMessage::error(&self.game_id, error), ctx);
    }

    fn message(&self, message_type: &str) -> ServerMessage {
        ServerMessage {
            message_type: message_type.to_string(),
            game_id: Some(self.game_id.clone()),
            ..Default::default()
        }
    }

    pub fn handle_message(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(session) = self.session.clone() else {
            self.send_error("Not in a game", ctx);
            return;
        };
        match msg.message_type.as_str() {
            "move" => self.handle_move(&msg, &session, ctx),
            "get_moves" => self.handle_get_moves(&msg, &session, ctx),
            "get_view" => self.handle_get_view(&session, ctx),
            "offer_draw" => session.do_send(Offer(OfferKind::Draw)),
            "offer_rematch" => session.do_send(Offer(OfferKind::Rematch)),
            "respond_draw" | "respond_rematch" => {
                let kind = if msg.message_type == "respond_draw" {
                    OfferKind::Draw
                } else {
                    OfferKind::Rematch
                };
                match msg.accept {
                    Some(accept) => session.do_send(Respond { kind, accept }),
                    None => self.send_error("No answer provided", ctx),
                }
            }
            "resign" => session.do_send(Resign),
            "navigate_start" => session.do_send(Navigate(NavCommand::Start)),
            "navigate_prev" => session.do_send(Navigate(NavCommand::Prev)),
            "navigate_next" => session.do_send(Navigate(NavCommand::Next)),
            "navigate_end" => session.do_send(Navigate(NavCommand::End)),
            "navigate_jump" => match msg.ply {
                Some(ply) => session.do_send(Navigate(NavCommand::Jump(ply))),
                None => self.send_error("No ply provided", ctx),
            },
            _ => {
                warn!("Unknown message type: {}", msg.message_type);
                self.send_error("Unknown message type", ctx);
            }
        }
    }

    fn handle_move(
        &mut self,
        msg: &ClientMessage,
        session: &Addr<SessionController>,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let (Some(from), Some(to)) = (msg.move_from.as_deref(), msg.move_to.as_deref()) else {
            self.send_error("No move provided", ctx);
            return;
        };
        let (Ok(from), Ok(to)) = (Square::from_str(from), Square::from_str(to)) else {
            self.send_error("Invalid square format", ctx);
            return;
        };
        let promotion = match msg.promote_to.as_deref().map(parse_promotion) {
            Some(None) => {
                self.send_error("Invalid promotion piece", ctx);
                return;
            }
            Some(piece) => piece,
            None => None,
        };
        session.do_send(SubmitMove(MoveRequest { from, to, promotion }));
    }

    fn handle_get_moves(
        &mut self,
        msg: &ClientMessage,
        session: &Addr<SessionController>,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let Some(square) = msg.square.as_deref() else {
            self.send_error("No square provided", ctx);
            return;
        };
        let Ok(square) = Square::from_str(square) else {
            self.send_error("Invalid square format", ctx);
            return;
        };
        session
            .send(LegalDestinations(square))
            .into_actor(self)
            .map(|result, act, ctx| match result {
                Ok(destinations) => {
                    let mut response = act.message("available_moves");
                    response.available_moves =
                        Some(destinations.iter().map(|sq| sq.to_string()).collect());
                    act.send_json(&response, ctx);
                }
                Err(e) => act.send_error(&format!("Session unavailable: {}", e), ctx),
            })
            .wait(ctx);
    }

    fn handle_get_view(&mut self, session: &Addr<SessionController>, ctx: &mut ws::WebsocketContext<Self>) {
        session
            .send(GetView)
            .into_actor(self)
            .map(|result, act, ctx| match result {
                Ok(view) => {
                    let mut response = act.message("view");
                    response.view = Some(view);
                    act.send_json(&response, ctx);
                }
                Err(e) => act.send_error(&format!("Session unavailable: {}", e), ctx),
            })
            .wait(ctx);
    }
}

fn parse_promotion(text: &str) -> Option<Piece> {
    match text.to_ascii_lowercase().as_str() {
        "q" | "queen" => Some(Piece::Queen),
        "r" | "rook" => Some(Piece::Rook),
        "b" | "bishop" => Some(Piece::Bishop),
        "n" | "knight" => Some(Piece::Knight),
        _ => None,
    }
}

impl Actor for ViewerSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(
            "WebSocket connection started: {} (player {})",
            self.id, self.player_id
        );
        let game_id = self.game_id.clone();
        self.bind(game_id, ctx);
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        if let Some(session) = self.session.take() {
            session.do_send(Leave);
        }
        info!("WebSocket connection closed: {}", self.id);
        Running::Stop
    }
}

/// What the socket does with one session update
#[derive(Debug)]
enum Outbound {
    Send(ServerMessage),
    /// Tell the client, then follow the session to its successor
    Redirect(ServerMessage, String),
    /// Left over from a session this socket already moved away from
    Drop,
}

fn outbound(bound_game: &str, update: SessionUpdate) -> Outbound {
    if update.session_id != bound_game {
        return Outbound::Drop;
    }
    let message = |message_type: &str| ServerMessage {
        message_type: message_type.to_string(),
        game_id: Some(bound_game.to_string()),
        ..Default::default()
    };
    match update.event {
        SessionEvent::Signal(Signal::Redirect { successor_id }) => {
            let mut redirect = message("redirect");
            redirect.game_id = Some(successor_id.clone());
            Outbound::Redirect(redirect, successor_id)
        }
        SessionEvent::Signal(signal) => Outbound::Send(ServerMessage {
            signal: Some(signal),
            ..message("signal")
        }),
        SessionEvent::Notice(notice) => Outbound::Send(ServerMessage {
            notice: Some(notice),
            ..message("notice")
        }),
        SessionEvent::View(view) => Outbound::Send(ServerMessage {
            view: Some(*view),
            ..message("view")
        }),
        SessionEvent::Clock(clock) => Outbound::Send(ServerMessage {
            clock: Some(clock),
            ..message("clock")
        }),
    }
}

impl Handler<SessionUpdate> for ViewerSocket {
    type Result = ();

    fn handle(&mut self, update: SessionUpdate, ctx: &mut Self::Context) {
        match outbound(&self.game_id, update) {
            Outbound::Send(message) => self.send_json(&message, ctx),
            Outbound::Redirect(message, successor_id) => {
                self.send_json(&message, ctx);
                self.bind(successor_id, ctx);
            }
            Outbound::Drop => debug!("Connection {}: dropped update from a previous game", self.id),
        }
    }
}

// WebSocket message handler
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ViewerSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Text(text)) => {
                match serde_json::from_str::<ClientMessage>(text.as_ref()) {
                    Ok(client_msg) => {
                        info!("Connection {}: {}", self.id, client_msg.message_type);
                        self.handle_message(client_msg, ctx);
                    }
                    Err(e) => {
                        self.send_error(&format!("Invalid message format: {}", e), ctx);
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                self.send_error("Binary messages are not supported", ctx);
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Connection closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            _ => {
                ctx.stop();
            }
        }
    }
}

/// WebSocket connection handler for `/ws/{game_id}/{player_id}`
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<(String, String)>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (game_id, player_id) = path.into_inner();
    let id = Uuid::new_v4().to_string();
    info!("New WebSocket connection {} for game {}", id, game_id);

    let socket = ViewerSocket {
        id,
        player_id,
        game_id,
        app_state: app_state.clone(),
        session: None,
    };
    ws::start(socket, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::{outbound, parse_promotion, Outbound};
    use crate::models::{Notice, SessionEvent, SessionUpdate, Signal};
    use chess::Piece;

    fn update(session_id: &str, event: SessionEvent) -> SessionUpdate {
        SessionUpdate {
            session_id: session_id.to_string(),
            event,
        }
    }

    #[test]
    fn events_are_tagged_with_the_bound_game() {
        let notice = update("G1", SessionEvent::Notice(Notice::info("Rematch offer sent")));
        match outbound("G1", notice) {
            Outbound::Send(message) => {
                assert_eq!(message.message_type, "notice");
                assert_eq!(message.game_id.as_deref(), Some("G1"));
            }
            other => panic!("expected a message, got {:?}", other),
        }
    }

    #[test]
    fn redirect_names_the_successor() {
        let redirect = update(
            "G1",
            SessionEvent::Signal(Signal::Redirect {
                successor_id: "G2".to_string(),
            }),
        );
        match outbound("G1", redirect) {
            Outbound::Redirect(message, successor) => {
                assert_eq!(message.message_type, "redirect");
                assert_eq!(message.game_id.as_deref(), Some("G2"));
                assert_eq!(successor, "G2");
            }
            other => panic!("expected a redirect, got {:?}", other),
        }
    }

    #[test]
    fn updates_from_the_previous_game_are_dropped() {
        let late = update("G1", SessionEvent::Notice(Notice::success("Rematch accepted! Starting new game...")));
        assert!(matches!(outbound("G2", late), Outbound::Drop));
        let late_signal = update("G1", SessionEvent::Signal(Signal::GameStarted));
        assert!(matches!(outbound("G2", late_signal), Outbound::Drop));
    }

    #[test]
    fn promotion_pieces() {
        assert_eq!(parse_promotion("q"), Some(Piece::Queen));
        assert_eq!(parse_promotion("Knight"), Some(Piece::Knight));
        assert_eq!(parse_promotion("k"), None);
    }
}
