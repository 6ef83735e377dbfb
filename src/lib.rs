pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod nats;
pub mod session;
pub mod stream;

pub use auth::{
    AuthChallenge, AuthError, AuthIdentity, AuthResolver, AuthToken, NatsAuthResolver, StreamKey,
};
pub use config::Config;
pub use error::ManagerError;
pub use http::{create_router, AppState};
pub use nats::{BusClient, TerminationSchema};
pub use session::{
    RelayFactory, RelaySession, SessionBinding, SessionError, SessionEvent, SessionFactory,
    StreamSession,
};
pub use stream::{
    Disposition, ManagerCommand, ManagerOptions, ManagerStatus, OutboundEvent, SessionRecord,
    SessionRegistry, StreamManager,
};
