/// Logical clock for the simulation kernel.
///
/// `SimTime` is a tick count with no dependency on `std::time`. It only
/// moves when the environment processes an event, and it never moves
/// backward. Gaps between events are skipped in a single jump.

/// A point on the logical clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SimTime(u64);

impl SimTime {
    /// The zero-point of simulation time.
    pub const ZERO: SimTime = SimTime(0);

    /// Create a `SimTime` from a raw tick value.
    #[inline]
    pub fn new(ticks: u64) -> Self {
        SimTime(ticks)
    }

    /// Return the raw tick value.
    #[inline]
    pub fn ticks(self) -> u64 {
        self.0
    }

    /// The absolute time `delay` ticks after `self`.
    /// Returns `None` on overflow.
    #[inline]
    pub fn plus(self, delay: u64) -> Option<SimTime> {
        self.0.checked_add(delay).map(SimTime)
    }

    /// Returns `true` if `self` is strictly before `other`.
    #[inline]
    pub fn is_before(self, other: SimTime) -> bool {
        self.0 < other.0
    }

    /// Ticks elapsed from `earlier` to `self`, or `None` if `earlier`
    /// is actually later.
    #[inline]
    pub fn duration_since(self, earlier: SimTime) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }
}

impl From<u64> for SimTime {
    fn from(ticks: u64) -> Self {
        SimTime(ticks)
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T={}", self.0)
    }
}
