//! The process-wide wiring: one long-lived `Arc` of every service this
//! binary hosts, built once in `main` and shared with both the watchdog
//! tasks and the admin HTTP surface. No hidden globals — every service is
//! an explicit long-lived object constructed at startup and passed by
//! reference.

use std::sync::Arc;

use protocol::Clock;

use bus::Bus;
use data::StorageManager;
use kv::SharedKv;
use party::PartyCoordinator;
use registry::RegistryService;
use reservation::ReservationService;

pub struct AppState {
    pub bus: Arc<dyn Bus>,
    pub kv: Arc<dyn SharedKv>,
    pub clock: Arc<dyn Clock>,
    pub registry: Arc<RegistryService>,
    pub party: Arc<PartyCoordinator>,
    pub reservation: Arc<ReservationService>,
    pub storage: Arc<StorageManager>,
    pub started_at_millis: i64,
}
