//! Reading session lifecycle.

mod manager;
mod observable;
mod state;
mod tasks;

pub use manager::SessionManager;
pub use observable::Observable;
pub use state::{BookType, EndSessionResult, SessionState, format_duration};
