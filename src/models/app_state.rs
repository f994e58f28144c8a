use std::sync::Arc;

use crate::config::SessionConfig;
use crate::session::clock::TimeSource;
use crate::transport::loopback::{LoopbackReferee, TimeControl};

/// Application state shared between connections
pub struct AppState {
    pub referee: LoopbackReferee,
    pub config: SessionConfig,
    /// Time control for games created over HTTP without one
    pub time_control: TimeControl,
    pub time: Arc<dyn TimeSource>,
}
