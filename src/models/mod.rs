pub mod app_state;
pub mod game_record;
pub mod messages;
pub mod signals;
pub mod view;

// Re-export important types
pub use app_state::*;
pub use game_record::*;
pub use messages::*;
pub use signals::*;
pub use view::*;

#[cfg(test)]
pub(crate) use game_record::fixtures;
