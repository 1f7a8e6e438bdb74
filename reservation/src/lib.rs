//! Match-reservation token issuance (§4.F): ties a party to a target
//! server and family/variant capacity, independent of the party
//! coordinator's full API via [`sink::PartyReservationSink`].

pub mod catalog;
pub mod constants;
pub mod error;
pub mod model;
pub mod service;
pub mod sink;

pub use catalog::{FamilyVariantCatalog, FamilyVariantInfo};
pub use error::{ReservationError, ReservationResult};
pub use model::{ReservationParticipant, ReservationSnapshot, ReservationToken};
pub use service::ReservationService;
pub use sink::PartyReservationSink;
