use foundation::time::IsoDate;

use crate::backend::{BackendError, SnapshotBackend};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DateIndexError {
    EmptyIndex,
}

impl std::fmt::Display for DateIndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateIndexError::EmptyIndex => write!(f, "date index is empty"),
        }
    }
}

impl std::error::Error for DateIndexError {}

/// Ascending, duplicate-free list of dates that have data upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateIndex {
    dates: Vec<IsoDate>,
}

impl DateIndex {
    pub fn new(dates: impl IntoIterator<Item = IsoDate>) -> Self {
        let mut dates: Vec<IsoDate> = dates.into_iter().collect();
        dates.sort_unstable();
        dates.dedup();
        Self { dates }
    }

    pub async fn load(backend: &dyn SnapshotBackend) -> Result<Self, BackendError> {
        let dates = backend.list_available_dates().await?;
        Ok(Self::new(dates))
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[IsoDate] {
        &self.dates
    }

    pub fn get(&self, index: usize) -> Option<IsoDate> {
        self.dates.get(index).copied()
    }

    pub fn first(&self) -> Option<IsoDate> {
        self.dates.first().copied()
    }

    pub fn last(&self) -> Option<IsoDate> {
        self.dates.last().copied()
    }

    pub fn position(&self, date: IsoDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    pub fn contains(&self, date: IsoDate) -> bool {
        self.position(date).is_some()
    }

    /// First date `>= date`, else the last date.
    pub fn nearest_on_or_after(&self, date: IsoDate) -> Result<IsoDate, DateIndexError> {
        let last = self.last().ok_or(DateIndexError::EmptyIndex)?;
        let at = self.dates.partition_point(|d| *d < date);
        Ok(self.dates.get(at).copied().unwrap_or(last))
    }

    pub fn has_year(&self, year: i32) -> bool {
        let at = self.dates.partition_point(|d| d.year() < year);
        self.dates.get(at).is_some_and(|d| d.year() == year)
    }

    /// `(first year, last year)` for timeline labels.
    pub fn year_span(&self) -> Option<(i32, i32)> {
        Some((self.first()?.year(), self.last()?.year()))
    }
}

#[cfg(test)]
mod tests {
    use super::{DateIndex, DateIndexError};
    use foundation::time::IsoDate;

    fn d(s: &str) -> IsoDate {
        IsoDate::parse(s).unwrap()
    }

    fn index() -> DateIndex {
        DateIndex::new([d("2020-03-01"), d("2019-12-31"), d("2020-01-15"), d("2020-01-15")])
    }

    #[test]
    fn sorts_and_dedups() {
        let idx = index();
        assert_eq!(idx.dates(), &[d("2019-12-31"), d("2020-01-15"), d("2020-03-01")]);
        assert_eq!(idx.position(d("2020-01-15")), Some(1));
        assert_eq!(idx.year_span(), Some((2019, 2020)));
    }

    #[test]
    fn nearest_snaps_forward_then_clamps_to_last() {
        let idx = index();
        assert_eq!(idx.nearest_on_or_after(d("2020-01-15")), Ok(d("2020-01-15")));
        assert_eq!(idx.nearest_on_or_after(d("2020-01-16")), Ok(d("2020-03-01")));
        assert_eq!(idx.nearest_on_or_after(d("1990-01-01")), Ok(d("2019-12-31")));
        assert_eq!(idx.nearest_on_or_after(d("2030-01-01")), Ok(d("2020-03-01")));
    }

    #[test]
    fn empty_index_cannot_snap() {
        let idx = DateIndex::default();
        assert_eq!(
            idx.nearest_on_or_after(d("2020-01-01")),
            Err(DateIndexError::EmptyIndex)
        );
        assert_eq!(idx.year_span(), None);
    }

    #[test]
    fn year_membership() {
        let idx = index();
        assert!(idx.has_year(2019));
        assert!(idx.has_year(2020));
        assert!(!idx.has_year(2021));
        assert!(!idx.has_year(2018));
    }
}
