use chrono::{DateTime, Utc};

/// A recorded fact.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - **append-only** (history rows are never rewritten)
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "order.status_changed").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn schema_version(&self) -> u32 {
        1
    }

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// Sort events by business time. Ties keep their recorded order.
pub fn chronological<E: Event>(events: &mut [E]) {
    events.sort_by_key(|e| e.occurred_at());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[derive(Debug, Clone)]
    struct Tick {
        label: &'static str,
        at: DateTime<Utc>,
    }

    impl Event for Tick {
        fn event_type(&self) -> &'static str {
            "test.tick"
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[test]
    fn chronological_is_stable_for_equal_timestamps() {
        let t0 = Utc::now();
        let mut events = vec![
            Tick { label: "late", at: t0 + Duration::seconds(5) },
            Tick { label: "first", at: t0 },
            Tick { label: "second", at: t0 },
        ];
        chronological(&mut events);
        let labels: Vec<_> = events.iter().map(|e| e.label).collect();
        assert_eq!(labels, ["first", "second", "late"]);
        assert_eq!(events[0].schema_version(), 1);
    }
}
