use actix_web::{web, App, HttpServer};
use clap::Parser;
use log::info;
use std::sync::Arc;
use std::time::Duration;

use chess_session_client::config::SessionConfig;
use chess_session_client::models::AppState;
use chess_session_client::routes::configure_routes;
use chess_session_client::session::SystemTimeSource;
use chess_session_client::transport::loopback::{LoopbackReferee, TimeControl};

/// Serve chess sessions over websockets against an in-process referee
#[derive(Parser, Debug)]
#[command(version, about)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "CHESS_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Initial clock per side, in minutes
    #[arg(long, env = "CHESS_MINUTES", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..=600))]
    minutes: u64,

    /// Seconds added after each move
    #[arg(long, env = "CHESS_INCREMENT", default_value_t = 0,
          value_parser = clap::value_parser!(u64).range(0..=180))]
    increment: u64,

    /// Clock recomputation period in milliseconds
    #[arg(long, env = "CHESS_TICK_MS", default_value_t = 1000)]
    tick_ms: u64,

    #[arg(long, default_value_t = 3)]
    draw_offer_cap: u8,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let args = ServeArgs::parse();

    let config = SessionConfig::default()
        .with_tick_period(Duration::from_millis(args.tick_ms))
        .with_draw_offer_cap(args.draw_offer_cap);
    let time = Arc::new(SystemTimeSource);
    let referee = LoopbackReferee::new(time.clone()).with_draw_offer_cap(args.draw_offer_cap);
    let _sweeper = referee.spawn_sweeper(config.tick_period);

    let app_state = web::Data::new(AppState {
        referee,
        config,
        time_control: TimeControl::minutes(args.minutes, args.increment),
        time,
    });

    info!("Starting chess session bridge at http://{}", args.bind);

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(configure_routes)
    })
    .bind(&args.bind)?
    .run()
    .await
}
