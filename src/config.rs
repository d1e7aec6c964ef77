/// Configuration structs for environments, timeouts and resources.

use crate::event::Priority;
use crate::payload::Value;
use crate::time::SimTime;

// ── EnvironmentConfig ─────────────────────────────────────────────────

/// Settings for a new [`Environment`](crate::Environment).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct EnvironmentConfig {
    /// Clock value before the first event. Default `0`.
    pub initial_time: SimTime,
    /// Record a [`Trace`](crate::Trace) of every processed event.
    /// Default `false`.
    pub record_trace: bool,
}

impl EnvironmentConfig {
    /// Start the clock at `ticks`.
    pub fn starting_at(ticks: u64) -> Self {
        EnvironmentConfig {
            initial_time: SimTime::new(ticks),
            ..Self::default()
        }
    }

    /// Enable trace recording.
    pub fn traced(mut self) -> Self {
        self.record_trace = true;
        self
    }
}

// ── TimeoutConfig ─────────────────────────────────────────────────────

/// A timeout fully spelled out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct TimeoutConfig {
    /// Ticks from now. Zero is allowed.
    pub delay: u64,
    /// Delivered to the waiter. Default `Value::None`.
    pub value: Value,
    /// Default `Priority::NORMAL`.
    pub priority: Priority,
}

impl TimeoutConfig {
    /// A plain timeout of `delay` ticks.
    pub fn after(delay: u64) -> Self {
        TimeoutConfig {
            delay,
            ..Self::default()
        }
    }

    /// Deliver `value` when the timeout fires.
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    /// Fire with `priority` among same-time events.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

// ── ResourceConfig ────────────────────────────────────────────────────

/// Settings for a new resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceConfig {
    /// Units that can be held at once. Must be positive. Default `1`.
    pub capacity: usize,
}

impl ResourceConfig {
    /// A resource with `capacity` units.
    pub fn with_capacity(capacity: usize) -> Self {
        ResourceConfig { capacity }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        ResourceConfig { capacity: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let env = EnvironmentConfig::default();
        assert_eq!(env.initial_time, SimTime::ZERO);
        assert!(!env.record_trace);

        let t = TimeoutConfig::default();
        assert_eq!(t.delay, 0);
        assert_eq!(t.value, Value::None);
        assert_eq!(t.priority, Priority::NORMAL);

        assert_eq!(ResourceConfig::default().capacity, 1);
    }

    #[test]
    fn test_builders() {
        let env = EnvironmentConfig::starting_at(100).traced();
        assert_eq!(env.initial_time, SimTime::new(100));
        assert!(env.record_trace);

        let t = TimeoutConfig::after(5)
            .with_value(3i64)
            .with_priority(Priority::URGENT);
        assert_eq!(t.delay, 5);
        assert_eq!(t.value, Value::Int(3));
        assert_eq!(t.priority, Priority::URGENT);
    }

    #[cfg(feature = "serialize")]
    #[test]
    fn test_config_from_json() {
        let cfg: EnvironmentConfig =
            serde_json::from_str(r#"{"record_trace": true}"#).unwrap();
        assert_eq!(cfg.initial_time, SimTime::ZERO);
        assert!(cfg.record_trace);

        let res: ResourceConfig = serde_json::from_str(r#"{"capacity": 2}"#).unwrap();
        assert_eq!(res.capacity, 2);
    }
}
