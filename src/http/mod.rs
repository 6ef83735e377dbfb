//! HTTP status surface
//!
//! Stream control flows over the message bus, never HTTP. This server only
//! answers operational questions:
//! - GET /health - Health check
//! - GET /status - Active meetings and pending authorization flows

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
