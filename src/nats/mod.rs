pub mod client;
pub mod messages;
pub mod termination;

pub use client::BusClient;
pub use messages::{
    AuthDataMessage, AuthUrlMessage, ErrorNotice, InboundEnvelope, StreamEventKind,
    StreamEventMessage,
};
pub use termination::TerminationSchema;
