//! Registration retry backoff (§4.C, §8): `delay = min(INITIAL * 2^(attempt-1), MAX)`,
//! with the exponent capped at 6 so an agent that never hears back doesn't
//! overflow computing `2^attempt` for large attempt counts.

use std::time::Duration;

pub const INITIAL_DELAY_MS: u64 = 5_000;
pub const MAX_DELAY_MS: u64 = 60_000;
pub const MAX_EXPONENT: u32 = 6;

/// Unsuccessful attempts after which the agent starts heartbeating under its
/// temporary id, so the registry can see it even if earlier broadcasts were
/// lost.
pub const TEMP_HEARTBEAT_THRESHOLD: u32 = 5;

/// Seconds to wait for a registration response before treating the attempt
/// as timed out.
pub const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10);

pub fn backoff_delay(attempt: u32) -> Duration {
    let attempt = attempt.max(1);
    let exponent = (attempt - 1).min(MAX_EXPONENT);
    let millis = INITIAL_DELAY_MS.saturating_mul(1u64 << exponent);
    Duration::from_millis(millis.min(MAX_DELAY_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_the_spec_schedule() {
        assert_eq!(backoff_delay(1), Duration::from_secs(5));
        assert_eq!(backoff_delay(2), Duration::from_secs(10));
        assert_eq!(backoff_delay(3), Duration::from_secs(20));
        assert_eq!(backoff_delay(4), Duration::from_secs(40));
        assert_eq!(backoff_delay(5), Duration::from_secs(60));
        assert_eq!(backoff_delay(6), Duration::from_secs(60));
        assert_eq!(backoff_delay(100), Duration::from_secs(60));
    }
}
