use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder, ResponseError};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::game::rules::ChessRules;
use crate::game::utils::color_to_string;
use crate::models::{AppState, Player, SnapshotMessage};
use crate::transport::loopback::TimeControl;

impl ResponseError for TransportError {
    fn status_code(&self) -> StatusCode {
        match self {
            TransportError::Rejected(_) => StatusCode::CONFLICT,
            TransportError::GameNotFound(_) => StatusCode::NOT_FOUND,
            TransportError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct CreateGameRequest {
    pub white: Player,
    pub black: Option<Player>,
    pub minutes: Option<u64>,
    pub increment: Option<u64>,
}

#[derive(Serialize, Debug)]
pub struct CreateGameResponse {
    pub game_id: String,
}

#[derive(Serialize, Debug)]
pub struct JoinGameResponse {
    pub game_id: String,
    pub color: String,
}

/// HTTP handler for the index page
pub async fn index() -> impl Responder {
    HttpResponse::Ok().body("Chess session bridge")
}

pub async fn create_game(
    body: web::Json<CreateGameRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, TransportError> {
    let request = body.into_inner();
    let control = match request.minutes {
        Some(minutes) => TimeControl::minutes(minutes, request.increment.unwrap_or(0)),
        None => app_state.time_control,
    };
    let game_id = app_state
        .referee
        .create_game(request.white, request.black, control)?;
    info!("Created game {} over HTTP", game_id);
    Ok(HttpResponse::Created().json(CreateGameResponse { game_id }))
}

pub async fn join_game(
    path: web::Path<String>,
    body: web::Json<Player>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, TransportError> {
    let game_id = path.into_inner();
    let color = app_state.referee.join(&game_id, body.into_inner())?;
    Ok(HttpResponse::Ok().json(JoinGameResponse {
        game_id,
        color: color_to_string(color),
    }))
}

pub async fn get_game(
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, TransportError> {
    let record = app_state.referee.snapshot(&path.into_inner())?;
    Ok(HttpResponse::Ok().json(SnapshotMessage::encode(&record, &ChessRules)))
}

/// Configure the HTTP routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/ws/{game_id}/{player_id}")
            .route(web::get().to(crate::websocket::ws_index)),
    )
    .service(web::resource("/api/games").route(web::post().to(create_game)))
    .service(web::resource("/api/games/{game_id}").route(web::get().to(get_game)))
    .service(web::resource("/api/games/{game_id}/join").route(web::post().to(join_game)))
    .service(web::resource("/").route(web::get().to(index)));
}
