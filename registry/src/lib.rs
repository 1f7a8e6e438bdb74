//! The registry service (§4.D): authoritative `serverId -> metadata` map,
//! id allocation, liveness/crash detection, and re-registration requests.

pub mod allocation;
pub mod record;
pub mod service;

pub use record::{ServerRecord, ServerStatus};
pub use service::{RegistrationOutcome, RegistryService, CRASH_WINDOW};
