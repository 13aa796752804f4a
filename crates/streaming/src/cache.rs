use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use formats::snapshot::Snapshot;
use foundation::time::IsoDate;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, SnapshotBackend};
use crate::request::YearTicket;
use crate::residency::YearResidency;

type YearDays = Arc<BTreeMap<IsoDate, Arc<Snapshot>>>;

/// Outcome of one bulk year fetch, broadcast to every subscriber.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum YearEvent {
    /// The year is resident with `days` snapshots.
    Loaded { year: i32, days: usize },
    /// Upstream has no such year; it will not be requested again.
    Failed { year: i32 },
    /// Transient failure; the next `begin_year_fetch` may retry.
    Retryable { year: i32 },
}

impl YearEvent {
    pub fn year(&self) -> i32 {
        match *self {
            YearEvent::Loaded { year, .. }
            | YearEvent::Failed { year }
            | YearEvent::Retryable { year } => year,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    years: BTreeMap<i32, YearDays>,
    in_flight: BTreeMap<i32, u64>,
    failed: BTreeSet<i32>,
    next_ticket: u64,
}

impl Inner {
    fn residency(&self, year: i32) -> YearResidency {
        if self.years.contains_key(&year) {
            YearResidency::Resident
        } else if self.in_flight.contains_key(&year) {
            YearResidency::InFlight
        } else if self.failed.contains(&year) {
            YearResidency::Failed
        } else {
            YearResidency::Absent
        }
    }
}

/// Session-wide cache of ice-extent snapshots keyed by calendar year.
///
/// Construct one per application session and share it by `Arc`. Invariants:
/// - at most one bulk fetch per year is in flight at any time;
/// - a year becomes visible all at once, never partially filled;
/// - resident years and failed (404) years never change again.
///
/// The in-flight mark is taken synchronously in [`YearCache::begin_year_fetch`],
/// before any I/O is started, so a second caller arriving while the first
/// fetch is pending always observes it.
#[derive(Debug)]
pub struct YearCache {
    shared: Arc<Shared>,
}

/// State reachable from outstanding tickets.
#[derive(Debug)]
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    events: broadcast::Sender<YearEvent>,
}

impl Shared {
    /// Releases the in-flight mark of a ticket dropped without being
    /// redeemed, so the year can be fetched again.
    pub(crate) fn abandon(&self, year: i32, id: u64) {
        {
            let mut inner = self.inner.lock();
            if inner.in_flight.get(&year) != Some(&id) {
                return;
            }
            inner.in_flight.remove(&year);
        }
        warn!(year, ticket = id, "year fetch abandoned; will retry on next request");
        let _ = self.events.send(YearEvent::Retryable { year });
    }
}

impl Default for YearCache {
    fn default() -> Self {
        Self::new()
    }
}

impl YearCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                events,
            }),
        }
    }

    /// Receives a [`YearEvent`] for every bulk fetch that settles from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<YearEvent> {
        self.shared.events.subscribe()
    }

    /// Pure lookup, no I/O.
    pub fn get(&self, year: i32, date: IsoDate) -> Option<Arc<Snapshot>> {
        let inner = self.shared.inner.lock();
        inner.years.get(&year)?.get(&date).cloned()
    }

    pub fn residency(&self, year: i32) -> YearResidency {
        self.shared.inner.lock().residency(year)
    }

    pub fn is_in_flight(&self, year: i32) -> bool {
        self.residency(year) == YearResidency::InFlight
    }

    pub fn has_failed(&self, year: i32) -> bool {
        self.residency(year) == YearResidency::Failed
    }

    pub fn cached_years(&self) -> Vec<i32> {
        self.shared.inner.lock().years.keys().copied().collect()
    }

    pub fn cached_days(&self, year: i32) -> usize {
        self.shared.inner.lock().years.get(&year).map_or(0, |days| days.len())
    }

    /// Claims the bulk fetch for `year`.
    ///
    /// Returns `None` (and changes nothing) when the year is resident,
    /// already in flight, or known to be absent upstream. Otherwise marks it
    /// in flight and hands back the ticket the caller must redeem with
    /// [`YearCache::complete_year_fetch`].
    pub fn begin_year_fetch(&self, year: i32) -> Option<YearTicket> {
        let mut inner = self.shared.inner.lock();
        if !inner.residency(year).accepts_fetch() {
            return None;
        }
        inner.next_ticket += 1;
        let id = inner.next_ticket;
        inner.in_flight.insert(year, id);
        debug!(year, ticket = id, "year fetch started");
        Some(YearTicket::new(year, id, &self.shared))
    }

    /// Settles a bulk fetch and notifies subscribers.
    pub fn complete_year_fetch(
        &self,
        ticket: YearTicket,
        result: Result<Vec<Snapshot>, BackendError>,
    ) -> YearEvent {
        let (year, id) = ticket.redeem();
        let event = {
            let mut inner = self.shared.inner.lock();
            if inner.in_flight.get(&year) != Some(&id) {
                // Only reachable with a ticket issued by another cache.
                warn!(year, ticket = id, "ignoring unknown year ticket");
                return YearEvent::Retryable { year };
            }
            inner.in_flight.remove(&year);

            match result {
                Ok(snapshots) => {
                    let days: BTreeMap<IsoDate, Arc<Snapshot>> = snapshots
                        .into_iter()
                        .filter(|snap| snap.date().year() == year)
                        .map(|snap| (snap.date(), Arc::new(snap)))
                        .collect();
                    let count = days.len();
                    inner.years.insert(year, Arc::new(days));
                    info!(year, days = count, "year cached");
                    YearEvent::Loaded { year, days: count }
                }
                Err(err) if err.is_not_found() => {
                    inner.failed.insert(year);
                    info!(year, "year absent upstream; not retrying this session");
                    YearEvent::Failed { year }
                }
                Err(err) => {
                    warn!(year, error = %err, "year fetch failed; will retry on next request");
                    YearEvent::Retryable { year }
                }
            }
        };

        // No subscribers is fine.
        let _ = self.shared.events.send(event);
        event
    }

    /// Runs the bulk fetch for `year` unless it is resident, in flight, or
    /// failed. Idempotent: any number of calls made before the first fetch
    /// resolves issue exactly one backend request.
    ///
    /// Returns `None` when no fetch was issued by this call. Dropping the
    /// future mid-fetch releases the claim.
    pub async fn ensure_year_loaded(
        &self,
        year: i32,
        backend: &dyn SnapshotBackend,
    ) -> Option<YearEvent> {
        let ticket = self.begin_year_fetch(year)?;
        let result = backend.fetch_year(year).await;
        Some(self.complete_year_fetch(ticket, result))
    }
}
