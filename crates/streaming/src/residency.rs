/// Lifecycle of one calendar year in the year cache.
///
/// `Absent → InFlight → Resident`, or `InFlight → Failed` on a 404-class
/// answer, or `InFlight → Absent` on a transient error. `Resident` and
/// `Failed` are terminal for the life of the cache.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum YearResidency {
    Absent,
    InFlight,
    Resident,
    Failed,
}

impl YearResidency {
    /// Only an absent year may start a bulk fetch.
    pub fn accepts_fetch(self) -> bool {
        self == YearResidency::Absent
    }
}

impl Default for YearResidency {
    fn default() -> Self {
        YearResidency::Absent
    }
}
