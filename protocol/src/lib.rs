//! Wire shapes shared by every process in the fleet: pub/sub channel names,
//! the message envelope, and the payload structs carried inside it.
//!
//! Nothing in this crate does any work — it is the contract the other crates
//! serialize against, so that a registry built from one binary and an agent
//! built from another always agree on byte-exact channel names and field
//! names.

pub mod channels;
pub mod clock;
pub mod envelope;
pub mod messages;

pub use clock::{Clock, FixedClock, SystemClock};
pub use envelope::Envelope;
