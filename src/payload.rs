//! Values carried by events and the failure type that replaces them when
//! an event fails.

use crate::process::ProcessId;

// ── Value ─────────────────────────────────────────────────────────────

/// Payload delivered to whoever waits on an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// No payload (plain timeouts, grants).
    #[default]
    None,
    /// An integer.
    Int(i64),
    /// Human-readable text.
    Text(String),
    /// Opaque bytes.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns `true` for `Value::None`.
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// The integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The text payload, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Text(s) => {
                if s.chars().count() > 32 {
                    let head: String = s.chars().take(32).collect();
                    write!(f, "Text(\"{}…\")", head)
                } else {
                    write!(f, "Text({:?})", s)
                }
            }
            Value::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
        }
    }
}

// ── Failure ───────────────────────────────────────────────────────────

/// An error raised inside a process, or attached to an event with
/// [`Environment::fail`](crate::Environment::fail).
///
/// A failure travels with the event it is attached to: whoever waits on
/// that event is resumed with [`Resume::Failed`](crate::Resume::Failed).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[error("{message}")]
pub struct Failure {
    message: String,
    origin: Option<ProcessId>,
}

impl Failure {
    /// Create a failure with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Failure {
            message: message.into(),
            origin: None,
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The process that first raised this failure, if it came from one.
    pub fn origin(&self) -> Option<ProcessId> {
        self.origin
    }

    /// Stamp the originating process unless one is already recorded.
    pub(crate) fn with_origin(mut self, pid: ProcessId) -> Self {
        if self.origin.is_none() {
            self.origin = Some(pid);
        }
        self
    }
}

/// The outcome an event delivers when it fires.
pub type Outcome = Result<Value, Failure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        assert!(Value::None.is_none());
        assert_eq!(Value::from(7i64).as_int(), Some(7));
        assert_eq!(Value::from("car").as_text(), Some("car"));
        assert_eq!(Value::Bytes(vec![1, 2]).as_int(), None);
    }

    #[test]
    fn test_value_display_truncates_long_text() {
        let long = "x".repeat(40);
        let shown = format!("{}", Value::Text(long));
        assert!(shown.ends_with("…\")"));
        assert_eq!(format!("{}", Value::Bytes(vec![0; 3])), "Bytes(3 bytes)");
    }

    #[test]
    fn test_failure_origin_is_sticky() {
        let f = Failure::new("battery empty")
            .with_origin(ProcessId::new(1))
            .with_origin(ProcessId::new(2));
        assert_eq!(f.origin(), Some(ProcessId::new(1)));
        assert_eq!(f.to_string(), "battery empty");
    }
}
