mod action;
mod event;
mod state;
mod transition;
pub mod worker;

pub use action::Action;
pub use event::{FsmEvent, TimerId};
pub use state::ConnectionState;
pub use transition::FsmCore;
