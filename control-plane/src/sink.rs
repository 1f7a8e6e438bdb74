//! Adapts [`party::PartyCoordinator`] to the narrow capability interface the
//! reservation service depends on, rather than the full service. This is
//! composition glue, so it lives here rather than creating a dependency
//! edge between the `party` and `reservation` crates.

use std::sync::Arc;

use async_trait::async_trait;

use party::PartyCoordinator;
use reservation::PartyReservationSink;

pub struct PartyCoordinatorSink {
    coordinator: Arc<PartyCoordinator>,
}

impl PartyCoordinatorSink {
    pub fn new(coordinator: Arc<PartyCoordinator>) -> Arc<Self> {
        Arc::new(PartyCoordinatorSink { coordinator })
    }
}

#[async_trait]
impl PartyReservationSink for PartyCoordinatorSink {
    async fn set_active_reservation(
        &self,
        party_id: &str,
        reservation_id: &str,
        target_server_id: &str,
    ) -> Result<(), String> {
        self.coordinator
            .set_active_reservation(party_id, reservation_id, target_server_id)
            .await
            .map(|_| ())
            .map_err(|error| error.to_string())
    }

    async fn clear_active_reservation(&self, party_id: &str) -> Result<(), String> {
        self.coordinator
            .clear_active_reservation(party_id)
            .await
            .map(|_| ())
            .map_err(|error| error.to_string())
    }
}
