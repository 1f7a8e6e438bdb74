//! Redis-backed party coordination (§4.E): invites, membership, roles,
//! presence, and the settlement hooks the reservation service drives.

pub mod constants;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod repository;

pub use coordinator::{PartyCoordinator, PartyMutationResult};
pub use error::{PartyError, PartyResult};
pub use model::{Party, PartyInvite, PartyMember, PartyRole, PartySettings, PartySnapshot};
pub use repository::PartyRepository;
