//! The narrow capability interface onto the party coordinator (Design
//! Notes §9): the reservation service only ever needs these two mutations,
//! so it depends on this trait rather than the full party crate.

use async_trait::async_trait;

#[async_trait]
pub trait PartyReservationSink: Send + Sync {
    async fn set_active_reservation(
        &self,
        party_id: &str,
        reservation_id: &str,
        target_server_id: &str,
    ) -> Result<(), String>;

    async fn clear_active_reservation(&self, party_id: &str) -> Result<(), String>;
}
