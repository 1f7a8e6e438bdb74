//! The server lifecycle agent (§4.C): boots, registers with the registry,
//! heartbeats, handles evacuation, and shuts down cleanly. One instance per
//! backend process.

pub mod backoff;
pub mod caps;
pub mod environment;
pub mod evacuation;
pub mod identity;
pub mod lifecycle;

pub use caps::{caps_for, detect_server_type, Caps};
pub use identity::{ServerIdentity, ServerStatus};
pub use lifecycle::{AgentConfig, EmptyRoster, PlayerRoster, ServerLifecycleAgent};
