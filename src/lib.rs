//! Client-side session engine for real-time chess: reconciles pushed
//! authoritative snapshots, derives live clocks, browses history and runs
//! the draw and rematch negotiations, with an actix-web bridge on top.

pub mod config;
pub mod error;
pub mod game;
pub mod models;
pub mod routes;
pub mod session;
pub mod transport;
pub mod websocket;
