// Authentication module
// Owns the in-memory credential and coordinates token refresh

mod refresh;
mod session;

pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use session::{token_preview, Session};
