//! HTTP status API
//!
//! Read-only view of the running assistant session:
//! - GET /health - Health check
//! - GET /session/status - Session statistics
//! - GET /session/matches - Recent command matches

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
