//! Tunables named but not numerically pinned by §4.F; values recorded in
//! the workspace `DESIGN.md`.

use std::time::Duration;

/// Lifetime of an issued reservation token, and of its KV record.
pub const RESERVATION_TOKEN_TTL: Duration = Duration::from_secs(45);
