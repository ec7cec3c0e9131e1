//! IdGenerator port - event id generation.
//!
//! # Implementations
//! - **UlidGenerator**: ULID from the clock's timestamp plus random bits

use crate::domain::EventId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator hands out event ids.
///
/// Ids from a single generator are time-sortable; two ids minted in the same
/// millisecond are distinct but not ordered.
pub trait IdGenerator: Send + Sync {
    fn generate_event_id(&self) -> EventId;
}

/// ULID-based generator. Takes the timestamp from `C` so a `FixedClock`
/// gives deterministic timestamps in tests.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_event_id(&self) -> EventId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        EventId::from(ulid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_event_id();
        let id2 = id_gen.generate_event_id();

        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("evt-"));
    }

    #[test]
    fn ulid_generator_uses_clock_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id = id_gen.generate_event_id();
        let timestamp = (id.as_ulid().0 >> 80) as u64;
        assert_eq!(timestamp, fixed_time.timestamp_millis() as u64);
    }
}
