//! Stream lifecycle management
//!
//! The heart of the service: a single manager task that owns the
//! meeting-to-session registry and reacts to control messages, session
//! completions, and termination signals. Everything asynchronous re-enters
//! through the command channel, so per-meeting state is never touched from
//! two places at once:
//! - `StreamManager`: the dispatch task
//! - `SessionRegistry`: at most one session per meeting
//! - `ManagerCommand` / `OutboundEvent`: the channel vocabulary

mod events;
mod manager;
mod registry;

pub use events::{Disposition, ManagerCommand, ManagerStatus, OutboundEvent};
pub use manager::{ManagerOptions, StreamManager};
pub use registry::{RegistryError, SessionRecord, SessionRegistry};
