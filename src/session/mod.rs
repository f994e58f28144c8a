pub mod clock;
pub mod controller;
pub mod edges;
pub mod navigation;
pub mod negotiation;
pub mod reconcile;
pub mod store;
pub mod submission;

pub use clock::{ManualTime, SystemTimeSource, TimeSource};
pub use controller::{
    GetView, Leave, LegalDestinations, Navigate, Offer, Resign, Respond, SessionController,
    SubmitMove,
};
pub use navigation::{CursorMode, NavCommand};
pub use reconcile::{Ingest, Outcome};
pub use store::SessionStore;
pub use submission::MoveRequest;
