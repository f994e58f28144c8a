use actix::Message;
use chess::Color;
use serde::Serialize;

use crate::game::utils::serialize_color;
use crate::models::{ClockView, ViewModel};

/// Sound classification of an applied move
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MoveClass {
    Capture,
    Check,
    Castle,
    Promotion,
    Quiet,
}

/// One-shot notification produced by the session engine
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    /// First snapshot of the session arrived
    GameStarted,
    MoveApplied {
        san: String,
        class: MoveClass,
        #[serde(serialize_with = "serialize_color")]
        by: Color,
        /// Rendered locally ahead of the authoritative snapshot
        optimistic: bool,
    },
    MoveRejected {
        reason: String,
    },
    GameEnded {
        text: String,
    },
    /// Advisory only, the game stays in progress until a snapshot says otherwise
    LocalTimeout {
        #[serde(serialize_with = "serialize_color")]
        side: Color,
        text: String,
    },
    DrawOffered {
        #[serde(serialize_with = "serialize_color")]
        by: Color,
        from: String,
    },
    DrawDeclined {
        #[serde(serialize_with = "serialize_color")]
        offered_by: Color,
    },
    RematchOffered {
        #[serde(serialize_with = "serialize_color")]
        by: Color,
        from: String,
    },
    RematchDeclined {
        #[serde(serialize_with = "serialize_color")]
        offered_by: Color,
    },
    Redirect {
        successor_id: String,
    },
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Transient message for the user
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Notice { level: NoticeLevel::Info, text: text.into() }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Notice { level: NoticeLevel::Success, text: text.into() }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Notice { level: NoticeLevel::Warning, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Notice { level: NoticeLevel::Error, text: text.into() }
    }
}

/// Everything a session pushes to its presentation layer
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Signal(Signal),
    Notice(Notice),
    View(Box<ViewModel>),
    Clock(ClockView),
}

/// A session event stamped with the session that produced it
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct SessionUpdate {
    pub session_id: String,
    pub event: SessionEvent,
}
