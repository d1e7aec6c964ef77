//! Process ID — a lightweight, ordered, copyable process identifier.

/// A unique identifier for a process within one environment.
///
/// IDs are handed out in creation order, so sorting by `ProcessId`
/// sorts by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessId(u64);

impl ProcessId {
    /// Create a process ID from a raw integer.
    #[inline]
    pub fn new(id: u64) -> Self {
        ProcessId(id)
    }

    /// Return the underlying integer.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}
