use std::sync::Arc;

use formats::snapshot::Snapshot;
use foundation::handles::{Generation, GenerationCounter};
use foundation::time::IsoDate;
use tracing::{debug, warn};

use crate::backend::BackendError;
use crate::cache::{YearCache, YearEvent};
use crate::date_index::DateIndex;
use crate::request::{DateRequest, YearTicket};

/// What the selected date is currently showing. Exactly one holds at a time.
#[derive(Debug, Clone)]
pub enum SnapshotStatus {
    Loading,
    /// Served from the year cache without touching the network.
    Cached(Arc<Snapshot>),
    /// Served by a single-date fetch.
    Fetched(Arc<Snapshot>),
    Failed(String),
}

impl SnapshotStatus {
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            SnapshotStatus::Cached(snap) | SnapshotStatus::Fetched(snap) => Some(snap),
            SnapshotStatus::Loading | SnapshotStatus::Failed(_) => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SnapshotStatus::Loading)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            SnapshotStatus::Failed(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SnapshotStatus::Loading => "loading",
            SnapshotStatus::Cached(_) => "cache",
            SnapshotStatus::Fetched(_) => "fetched",
            SnapshotStatus::Failed(_) => "error",
        }
    }
}

/// I/O the controller wants performed. The caller executes these and feeds
/// results back through `complete_date_fetch` / the cache.
#[derive(Debug)]
pub enum SnapshotEffect {
    /// Run the bulk fetch for a year and settle it on the shared cache.
    FetchYear(YearTicket),
    /// Fetch one date; report back with [`SnapshotController::complete_date_fetch`].
    FetchDate(DateRequest),
    /// The selected date moved. Overlays keyed to the old date are void.
    DateChanged { previous: IsoDate, current: IsoDate },
}

/// Resolves the selected date to a snapshot.
///
/// Resolution order for a date: year cache hit, else wait on an in-flight
/// bulk fetch for its year, else a single-date fetch. The controller does no
/// I/O itself; it returns [`SnapshotEffect`]s.
#[derive(Debug)]
pub struct SnapshotController {
    cache: Arc<YearCache>,
    index: DateIndex,
    selected: IsoDate,
    status: SnapshotStatus,
    generation: GenerationCounter,
    pending: Option<DateRequest>,
    revision: u64,
}

impl SnapshotController {
    pub fn new(cache: Arc<YearCache>, initial: IsoDate) -> Self {
        Self {
            cache,
            index: DateIndex::default(),
            selected: initial,
            status: SnapshotStatus::Loading,
            generation: GenerationCounter::new(),
            pending: None,
            revision: 0,
        }
    }

    pub fn selected_date(&self) -> IsoDate {
        self.selected
    }

    pub fn status(&self) -> &SnapshotStatus {
        &self.status
    }

    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        self.status.snapshot()
    }

    pub fn index(&self) -> &DateIndex {
        &self.index
    }

    pub fn generation(&self) -> Generation {
        self.generation.current()
    }

    pub fn pending_fetch(&self) -> Option<DateRequest> {
        self.pending
    }

    /// Bumped on every status change; lets a renderer skip unchanged states.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Resolves the initial date.
    pub fn start(&mut self) -> Vec<SnapshotEffect> {
        let mut effects = Vec::new();
        self.ensure_year(&mut effects);
        self.resolve(&mut effects);
        effects
    }

    /// Installs the date index once; later calls are ignored.
    ///
    /// Snaps the selected date onto the nearest indexed date when it has no
    /// data of its own.
    pub fn install_index(&mut self, index: DateIndex) -> Vec<SnapshotEffect> {
        if !self.index.is_empty() {
            debug!("date index already installed; ignoring reload");
            return Vec::new();
        }
        self.index = index;

        let Ok(nearest) = self.index.nearest_on_or_after(self.selected) else {
            warn!("date index is empty; selection stays unvalidated");
            return Vec::new();
        };
        if nearest != self.selected {
            return self.select(nearest);
        }

        let mut effects = Vec::new();
        self.ensure_year(&mut effects);
        effects
    }

    /// Moves the selection by whole days. No clamping to the index.
    pub fn shift_date(&mut self, delta_days: i64) -> Vec<SnapshotEffect> {
        if delta_days == 0 {
            return Vec::new();
        }
        match self.selected.shift_days(delta_days) {
            Some(next) => self.select(next),
            None => Vec::new(),
        }
    }

    /// Selects `iso` if it is a valid `YYYY-MM-DD` date; otherwise a no-op.
    pub fn set_date_from_iso(&mut self, iso: &str) -> Vec<SnapshotEffect> {
        match IsoDate::parse(iso) {
            Ok(date) => self.select(date),
            Err(err) => {
                debug!(error = %err, "ignoring date input");
                Vec::new()
            }
        }
    }

    /// Selects the `position`-th indexed date; out of range is a no-op.
    pub fn select_index(&mut self, position: usize) -> Vec<SnapshotEffect> {
        match self.index.get(position) {
            Some(date) => self.select(date),
            None => Vec::new(),
        }
    }

    /// Re-runs resolution for the current date. The cache is still consulted
    /// first.
    pub fn refetch(&mut self) -> Vec<SnapshotEffect> {
        let mut effects = Vec::new();
        self.resolve(&mut effects);
        effects
    }

    /// Applies a single-date result. Returns `false` when the result belongs
    /// to a superseded selection and was discarded.
    pub fn complete_date_fetch(
        &mut self,
        request: DateRequest,
        result: Result<Snapshot, BackendError>,
    ) -> bool {
        if self.pending != Some(request) {
            debug!(date = %request.date, "discarding stale snapshot result");
            return false;
        }
        self.pending = None;

        let status = match result {
            Ok(snap) => SnapshotStatus::Fetched(Arc::new(snap)),
            Err(err) => {
                warn!(date = %request.date, error = %err, "snapshot fetch failed");
                SnapshotStatus::Failed(err.to_string())
            }
        };
        self.set_status(status);
        true
    }

    /// Re-resolves when a bulk fetch this selection was waiting on settles.
    ///
    /// Never re-issues the bulk fetch itself, so a transient failure falls
    /// through to the single-date path instead of retrying in a loop.
    pub fn on_year_event(&mut self, event: YearEvent) -> Vec<SnapshotEffect> {
        let waiting = self.status.is_loading() && self.pending.is_none();
        if !waiting || event.year() != self.selected.year() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        self.resolve(&mut effects);
        effects
    }

    fn select(&mut self, date: IsoDate) -> Vec<SnapshotEffect> {
        if date == self.selected {
            return Vec::new();
        }
        let previous = self.selected;
        self.selected = date;

        let mut effects = vec![SnapshotEffect::DateChanged {
            previous,
            current: date,
        }];
        self.ensure_year(&mut effects);
        self.resolve(&mut effects);
        effects
    }

    /// Claims the bulk fetch for the selected year when the index confirms
    /// the year exists.
    fn ensure_year(&self, effects: &mut Vec<SnapshotEffect>) {
        let year = self.selected.year();
        if !self.index.has_year(year) {
            return;
        }
        if let Some(ticket) = self.cache.begin_year_fetch(year) {
            effects.push(SnapshotEffect::FetchYear(ticket));
        }
    }

    fn resolve(&mut self, effects: &mut Vec<SnapshotEffect>) {
        let generation = self.generation.bump();
        self.pending = None;

        let date = self.selected;
        let year = date.year();

        if let Some(snap) = self.cache.get(year, date) {
            self.set_status(SnapshotStatus::Cached(snap));
            return;
        }

        self.set_status(SnapshotStatus::Loading);
        if self.cache.is_in_flight(year) {
            debug!(%date, "waiting on in-flight year fetch");
            return;
        }

        let request = DateRequest { date, generation };
        self.pending = Some(request);
        effects.push(SnapshotEffect::FetchDate(request));
    }

    fn set_status(&mut self, status: SnapshotStatus) {
        self.status = status;
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{SnapshotController, SnapshotEffect, SnapshotStatus};
    use crate::backend::BackendError;
    use crate::cache::tests::{d, snap};
    use crate::cache::{YearCache, YearEvent};
    use crate::date_index::DateIndex;
    use crate::request::DateRequest;
    use crate::residency::YearResidency;

    fn year_2020() -> DateIndex {
        let start = d("2020-01-01");
        DateIndex::new((0..366).filter_map(|i| start.shift_days(i)))
    }

    fn fetch_dates(effects: &[SnapshotEffect]) -> Vec<DateRequest> {
        effects
            .iter()
            .filter_map(|e| match e {
                SnapshotEffect::FetchDate(req) => Some(*req),
                _ => None,
            })
            .collect()
    }

    fn year_fetches(effects: &[SnapshotEffect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, SnapshotEffect::FetchYear(_)))
            .count()
    }

    #[test]
    fn cache_hit_never_fetches() {
        let cache = Arc::new(YearCache::new());
        let t = cache.begin_year_fetch(2020).unwrap();
        cache.complete_year_fetch(t, Ok(vec![snap("2020-06-15", "bulk")]));

        let mut ctl = SnapshotController::new(cache, d("2020-06-14"));
        let effects = ctl.set_date_from_iso("2020-06-15");
        assert!(fetch_dates(&effects).is_empty());
        assert!(matches!(ctl.status(), SnapshotStatus::Cached(_)));

        let effects = ctl.refetch();
        assert!(effects.is_empty());
        assert_eq!(ctl.status().label(), "cache");
    }

    #[test]
    fn navigation_within_loading_year_shares_one_bulk_fetch() {
        let cache = Arc::new(YearCache::new());
        let mut ctl = SnapshotController::new(cache.clone(), d("2020-06-01"));
        let _install = ctl.install_index(year_2020());

        let first = ctl.set_date_from_iso("2020-06-15");
        // The index install already claimed 2020 for the initial date.
        assert_eq!(year_fetches(&first), 0);
        assert!(cache.is_in_flight(2020));
        assert!(fetch_dates(&first).is_empty());
        assert!(ctl.status().is_loading());

        let second = ctl.shift_date(1);
        assert_eq!(year_fetches(&second), 0);
        assert!(fetch_dates(&second).is_empty());
        assert_eq!(ctl.selected_date(), d("2020-06-16"));
    }

    #[test]
    fn first_selection_in_uncached_indexed_year_starts_bulk_fetch() {
        let cache = Arc::new(YearCache::new());
        let mut ctl = SnapshotController::new(cache.clone(), d("2020-01-01"));
        let install = ctl.install_index(year_2020());
        assert_eq!(year_fetches(&install), 1);

        let mut ticket = None;
        for effect in install {
            if let SnapshotEffect::FetchYear(t) = effect {
                ticket = Some(t);
            }
        }

        let _ = ctl.set_date_from_iso("2020-06-15");
        let _ = ctl.set_date_from_iso("2020-06-16");
        assert!(ctl.status().is_loading());

        let event = cache.complete_year_fetch(
            ticket.unwrap(),
            Ok(vec![snap("2020-06-15", "bulk"), snap("2020-06-16", "bulk")]),
        );
        let effects = ctl.on_year_event(event);
        assert!(effects.is_empty());
        assert_eq!(ctl.snapshot().unwrap().date(), d("2020-06-16"));

        let _ = ctl.shift_date(-1);
        assert_eq!(ctl.status().label(), "cache");
    }

    #[test]
    fn unindexed_year_uses_single_fetch_and_discards_stale_results() {
        let cache = Arc::new(YearCache::new());
        let mut ctl = SnapshotController::new(cache, d("1999-01-01"));

        let effects = ctl.start();
        let first = fetch_dates(&effects);
        assert_eq!(first.len(), 1);

        let effects = ctl.shift_date(1);
        let second = fetch_dates(&effects);
        assert_eq!(second.len(), 1);
        assert!(matches!(effects[0], SnapshotEffect::DateChanged { .. }));

        assert!(!ctl.complete_date_fetch(first[0], Ok(snap("1999-01-01", "single"))));
        assert!(ctl.status().is_loading());

        assert!(ctl.complete_date_fetch(second[0], Ok(snap("1999-01-02", "single"))));
        assert_eq!(ctl.status().label(), "fetched");
    }

    #[test]
    fn single_fetch_failure_surfaces_message() {
        let cache = Arc::new(YearCache::new());
        let mut ctl = SnapshotController::new(cache, d("1999-01-01"));
        let req = fetch_dates(&ctl.start())[0];
        ctl.complete_date_fetch(req, Err(BackendError::Status(500)));
        assert_eq!(ctl.status().error(), Some("server error 500"));
        assert!(ctl.snapshot().is_none());
    }

    #[test]
    fn failed_year_falls_through_to_single_fetch() {
        let cache = Arc::new(YearCache::new());
        let mut ctl = SnapshotController::new(cache.clone(), d("2020-03-01"));
        let install = ctl.install_index(year_2020());
        let effects = ctl.start();
        assert!(fetch_dates(&effects).is_empty());

        let ticket = install
            .into_iter()
            .find_map(|e| match e {
                SnapshotEffect::FetchYear(t) => Some(t),
                _ => None,
            })
            .unwrap();
        let event = cache.complete_year_fetch(ticket, Err(BackendError::NotFound));

        let effects = ctl.on_year_event(event);
        assert_eq!(fetch_dates(&effects).len(), 1);
        assert_eq!(year_fetches(&effects), 0);
    }

    #[test]
    fn transient_year_failure_falls_through_without_refetching_year() {
        let cache = Arc::new(YearCache::new());
        let mut ctl = SnapshotController::new(cache.clone(), d("2020-03-01"));
        let install = ctl.install_index(year_2020());
        assert!(fetch_dates(&ctl.start()).is_empty());

        let ticket = install
            .into_iter()
            .find_map(|e| match e {
                SnapshotEffect::FetchYear(t) => Some(t),
                _ => None,
            })
            .unwrap();
        let event = cache.complete_year_fetch(ticket, Err(BackendError::Status(503)));
        assert_eq!(event, YearEvent::Retryable { year: 2020 });

        let effects = ctl.on_year_event(event);
        let requests = fetch_dates(&effects);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].date, d("2020-03-01"));
        assert_eq!(year_fetches(&effects), 0);
        assert_eq!(cache.residency(2020), YearResidency::Absent);
        assert!(ctl.status().is_loading());
    }

    #[test]
    fn invalid_and_zero_inputs_are_no_ops() {
        let cache = Arc::new(YearCache::new());
        let mut ctl = SnapshotController::new(cache, d("2020-01-01"));
        let before = ctl.revision();
        assert!(ctl.set_date_from_iso("2020-13-01").is_empty());
        assert!(ctl.set_date_from_iso("not a date").is_empty());
        assert!(ctl.shift_date(0).is_empty());
        assert!(ctl.select_index(3).is_empty());
        assert_eq!(ctl.revision(), before);
        assert_eq!(ctl.selected_date(), d("2020-01-01"));
    }

    #[test]
    fn index_install_snaps_to_nearest_and_freezes() {
        let cache = Arc::new(YearCache::new());
        let mut ctl = SnapshotController::new(cache, d("2019-07-01"));
        let effects = ctl.install_index(DateIndex::new([d("2020-02-01"), d("2020-03-01")]));
        assert_eq!(ctl.selected_date(), d("2020-02-01"));
        assert!(matches!(effects[0], SnapshotEffect::DateChanged { .. }));

        let effects = ctl.install_index(DateIndex::new([d("2021-01-01")]));
        assert!(effects.is_empty());
        assert_eq!(ctl.index().len(), 2);
    }

    #[test]
    fn empty_index_leaves_selection_alone() {
        let cache = Arc::new(YearCache::new());
        let mut ctl = SnapshotController::new(cache, d("2019-07-01"));
        assert!(ctl.install_index(DateIndex::default()).is_empty());
        assert_eq!(ctl.selected_date(), d("2019-07-01"));
    }
}
