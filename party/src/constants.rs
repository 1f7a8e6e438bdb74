//! Tunable constants named but not numerically pinned by §3/§4.E. Values
//! chosen here are recorded in the workspace `DESIGN.md`; all are plain
//! `Duration`/`u32` constants, not environment-configurable, matching how
//! they're presented as fixed defaults.

use std::time::Duration;

/// Absolute party size ceiling. Must exceed the party-of-5 in the §8
/// reservation-cap scenario.
pub const HARD_SIZE_CAP: usize = 8;

/// Default per-party lock TTL (§4.E: "default 5 s").
pub const LOCK_TTL: Duration = Duration::from_secs(5);

/// How long a pending invite stays valid.
pub const INVITE_TTL: Duration = Duration::from_secs(60);

/// Grace period before a solo (size <= 1) party auto-disbands.
pub const IDLE_GRACE: Duration = Duration::from_secs(30);

/// How long an offline member may linger before maintenance removes them.
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(300);

/// Cadence of the maintenance sweep.
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);
