//! Async host loop for a [`Session`].
//!
//! Runs on a single task: session logic never executes concurrently with
//! itself. Backend I/O is multiplexed through a `FuturesUnordered`, frames
//! come from a fixed-interval ticker, and bulk-fetch outcomes arrive through
//! the cache's broadcast subscription.

use std::sync::Arc;
use std::time::Duration;

use foundation::time::Timestamp;
use futures_util::stream::{FuturesUnordered, StreamExt};
use layers::RenderSink;
use routing::{resolve_route, RouteBackend};
use streaming::{BoxFuture, DateIndex, SnapshotBackend, YearCache};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::session::{Session, SessionCommand, SessionCompletion, SessionEvent, SessionTask};

/// Backends shared by every task of a session.
#[derive(Clone)]
pub struct Backends {
    pub snapshots: Arc<dyn SnapshotBackend>,
    pub routes: Arc<dyn RouteBackend>,
}

/// Whether the host wants the loop to keep running.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Mounts `session` and drives it until `on_event` returns [`Flow::Stop`],
/// an `Unmount` command arrives, or there is nothing left to wait for.
///
/// `on_event` sees every [`SessionEvent`] together with the session state
/// right after the turn that produced it.
pub async fn run_session<S, F>(
    session: &mut Session<S>,
    backends: &Backends,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    frame_interval: Duration,
    mut on_event: F,
) where
    S: RenderSink,
    F: FnMut(&SessionEvent, &Session<S>) -> Flow,
{
    let cache = Arc::clone(session.cache());
    let mut years = cache.subscribe();
    let origin = Instant::now();
    let now = || Timestamp(origin.elapsed().as_secs_f64() * 1000.0);

    let mut inflight = FuturesUnordered::new();
    for task in session.mount() {
        inflight.push(run_task(task, backends, &cache));
    }

    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut commands_open = true;

    loop {
        for event in session.drain_events() {
            if on_event(&event, &*session) == Flow::Stop {
                return;
            }
        }
        if !session.is_mounted() {
            return;
        }
        if !commands_open && inflight.is_empty() && !session.wants_frame() {
            debug!("session idle with no command source; stopping");
            return;
        }

        let tasks = tokio::select! {
            command = commands.recv(), if commands_open => match command {
                Some(command) => session.handle(command),
                None => {
                    commands_open = false;
                    Vec::new()
                }
            },
            Some(done) = inflight.next(), if !inflight.is_empty() => match done {
                Some(completion) => session.complete(completion, now()),
                None => Vec::new(),
            },
            event = years.recv() => match event {
                Ok(event) => session.on_year_event(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "year cache notifications lagged; resyncing");
                    session.resync()
                }
                Err(RecvError::Closed) => Vec::new(),
            },
            _ = ticker.tick(), if session.wants_frame() => {
                session.on_frame_tick(now());
                Vec::new()
            }
        };

        for task in tasks {
            inflight.push(run_task(task, backends, &cache));
        }
    }
}

/// Runs one task. Bulk fetches settle on the cache and yield nothing; the
/// session hears about them through its subscription. A bulk fetch dropped
/// with the loop releases its year through the ticket.
fn run_task<'a>(
    task: SessionTask,
    backends: &'a Backends,
    cache: &Arc<YearCache>,
) -> BoxFuture<'a, Option<SessionCompletion>> {
    match task {
        SessionTask::LoadIndex => Box::pin(async move {
            let result = DateIndex::load(backends.snapshots.as_ref()).await;
            Some(SessionCompletion::Index(result))
        }),
        SessionTask::FetchDate(request) => Box::pin(async move {
            let result = backends.snapshots.fetch_snapshot(request.date).await;
            Some(SessionCompletion::Date(request, result))
        }),
        SessionTask::FetchYear(ticket) => {
            let cache = Arc::clone(cache);
            Box::pin(async move {
                let result = backends.snapshots.fetch_year(ticket.year()).await;
                cache.complete_year_fetch(ticket, result);
                None
            })
        }
        SessionTask::Route(job) => Box::pin(async move {
            let completion = resolve_route(backends.routes.as_ref(), job).await;
            Some(SessionCompletion::Route(completion))
        }),
        SessionTask::LoadReferenceRoute => Box::pin(async move {
            let result = backends.routes.load_fallback_route().await;
            Some(SessionCompletion::ReferenceRoute(result))
        }),
        SessionTask::Predict { params, generation } => Box::pin(async move {
            let result = backends.snapshots.fetch_prediction(params).await;
            Some(SessionCompletion::Prediction { generation, result })
        }),
    }
}
