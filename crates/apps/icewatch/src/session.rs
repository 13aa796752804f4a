//! One mounted map view.
//!
//! [`Session`] couples the snapshot subsystem and the route subsystem,
//! pushes their state into a [`RenderSink`] and reports host-facing events.
//! Like the components it owns it performs no I/O: every entry point returns
//! the [`SessionTask`]s the driver must run, and results come back through
//! [`Session::complete`].

use std::sync::Arc;

use formats::geojson::FeatureCollection;
use formats::snapshot::Snapshot;
use foundation::geo::Position;
use foundation::handles::{Generation, GenerationCounter};
use foundation::time::{IsoDate, Timestamp};
use layers::{LayerId, RenderSink};
use routing::{
    MarkerEffect, MarkerPair, MarkerStateMachine, RouteAnimator, RouteCompletion, RouteJob,
    RouteOutcome, RouteRequestOrchestrator, RouteStatus,
};
use runtime::event_bus::EventBus;
use runtime::scheduler::FrameQueue;
use streaming::{
    BackendError, DateIndex, DateRequest, PredictionParams, SnapshotController, SnapshotEffect,
    SnapshotStatus, YearCache, YearEvent, YearTicket,
};
use tracing::{debug, info, warn};

/// Host input.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    ShiftDate(i64),
    SetDate(String),
    SelectIndex(usize),
    Refetch,
    Click(Position),
    ClearMarkers,
    Predict(PredictionParams),
    ClearPrediction,
    Unmount,
}

/// I/O the driver runs on the session's behalf.
#[derive(Debug)]
pub enum SessionTask {
    LoadIndex,
    FetchDate(DateRequest),
    /// Run the bulk fetch and settle it on the shared cache. The outcome
    /// reaches the session through the cache's event subscription.
    FetchYear(YearTicket),
    Route(RouteJob),
    LoadReferenceRoute,
    Predict {
        params: PredictionParams,
        generation: Generation,
    },
}

/// Result of a [`SessionTask`].
#[derive(Debug)]
pub enum SessionCompletion {
    Index(Result<DateIndex, BackendError>),
    Date(DateRequest, Result<Snapshot, BackendError>),
    Route(RouteCompletion),
    ReferenceRoute(Result<FeatureCollection, BackendError>),
    Prediction {
        generation: Generation,
        result: Result<FeatureCollection, BackendError>,
    },
}

/// Host-facing notifications, drained after each turn.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The date index request settled; `dates` is 0 when it failed.
    IndexLoaded { dates: usize },
    /// The selected date or what it is showing changed.
    SelectionChanged { date: IsoDate, status: &'static str },
    RouteStatusChanged(RouteStatus),
    MarkersChanged(MarkerPair),
    /// A route for the current markers is about to animate.
    RouteResolved { fallback: bool, coordinates: usize },
    PredictionInvalidated,
    PredictionFailed(String),
    AnimationFinished,
}

pub struct Session<S: RenderSink> {
    cache: Arc<YearCache>,
    snapshots: SnapshotController,
    markers: MarkerStateMachine,
    orchestrator: RouteRequestOrchestrator,
    animator: RouteAnimator,
    frames: FrameQueue,
    sink: S,
    events: EventBus<SessionEvent>,
    /// Last extent pushed to the map; the observed routing payload.
    shown: Option<Arc<Snapshot>>,
    rendered_revision: Option<u64>,
    prediction: Option<FeatureCollection>,
    predictions: GenerationCounter,
    index_settled: bool,
    mounted: bool,
}

impl<S: RenderSink> Session<S> {
    pub fn new(cache: Arc<YearCache>, initial: IsoDate, sink: S, use_corridor: bool) -> Self {
        Self {
            snapshots: SnapshotController::new(Arc::clone(&cache), initial),
            cache,
            markers: MarkerStateMachine::new(),
            orchestrator: RouteRequestOrchestrator::new(use_corridor),
            animator: RouteAnimator::new(),
            frames: FrameQueue::new(),
            sink,
            events: EventBus::new(),
            shown: None,
            rendered_revision: None,
            prediction: None,
            predictions: GenerationCounter::new(),
            index_settled: false,
            mounted: false,
        }
    }

    pub fn cache(&self) -> &Arc<YearCache> {
        &self.cache
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn selected_date(&self) -> IsoDate {
        self.snapshots.selected_date()
    }

    pub fn status(&self) -> &SnapshotStatus {
        self.snapshots.status()
    }

    pub fn index(&self) -> &DateIndex {
        self.snapshots.index()
    }

    pub fn index_settled(&self) -> bool {
        self.index_settled
    }

    pub fn marker_pair(&self) -> MarkerPair {
        self.markers.pair()
    }

    /// Whether there is anything for a "clear markers" control to clear.
    pub fn has_markers(&self) -> bool {
        self.markers.has_markers()
    }

    pub fn route_status(&self) -> RouteStatus {
        self.orchestrator.status()
    }

    pub fn prediction(&self) -> Option<&FeatureCollection> {
        self.prediction.as_ref()
    }

    pub fn visible_path(&self) -> &[Position] {
        self.animator.visible_path()
    }

    pub fn is_animating(&self) -> bool {
        self.animator.is_running()
    }

    /// True while a frame callback is pending.
    pub fn wants_frame(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain()
    }

    /// Starts the view: loads the date index and the reference route and
    /// resolves the initial date.
    pub fn mount(&mut self) -> Vec<SessionTask> {
        if self.mounted {
            return Vec::new();
        }
        self.mounted = true;
        self.sink.replace(LayerId::ANIMATED_ROUTE, &FeatureCollection::empty());

        let mut tasks = vec![SessionTask::LoadIndex, SessionTask::LoadReferenceRoute];
        let effects = self.snapshots.start();
        self.apply_snapshot_effects(effects, &mut tasks);
        self.sync_extent();
        tasks
    }

    pub fn handle(&mut self, command: SessionCommand) -> Vec<SessionTask> {
        if !self.mounted {
            debug!(?command, "session not mounted; ignoring command");
            return Vec::new();
        }

        let mut tasks = Vec::new();
        match command {
            SessionCommand::ShiftDate(days) => {
                let effects = self.snapshots.shift_date(days);
                self.apply_snapshot_effects(effects, &mut tasks);
            }
            SessionCommand::SetDate(iso) => {
                let effects = self.snapshots.set_date_from_iso(&iso);
                self.apply_snapshot_effects(effects, &mut tasks);
            }
            SessionCommand::SelectIndex(position) => {
                let effects = self.snapshots.select_index(position);
                self.apply_snapshot_effects(effects, &mut tasks);
            }
            SessionCommand::Refetch => {
                let effects = self.snapshots.refetch();
                self.apply_snapshot_effects(effects, &mut tasks);
            }
            SessionCommand::Click(position) => {
                let effects = self.markers.click(position);
                self.apply_marker_effects(effects, &mut tasks);
            }
            SessionCommand::ClearMarkers => {
                let effects = self.markers.clear();
                self.apply_marker_effects(effects, &mut tasks);
            }
            SessionCommand::Predict(params) => {
                let generation = self.predictions.bump();
                tasks.push(SessionTask::Predict { params, generation });
            }
            SessionCommand::ClearPrediction => {
                self.predictions.bump();
                self.prediction = None;
                self.sink
                    .replace(LayerId::ICE_PREDICTION, &FeatureCollection::empty());
            }
            SessionCommand::Unmount => self.unmount(),
        }
        self.sync_extent();
        tasks
    }

    /// Applies a finished task. `now` is the host clock, used to start an
    /// animation.
    pub fn complete(&mut self, completion: SessionCompletion, now: Timestamp) -> Vec<SessionTask> {
        if !self.mounted {
            debug!("session unmounted; discarding completion");
            return Vec::new();
        }

        let mut tasks = Vec::new();
        match completion {
            SessionCompletion::Index(result) => {
                self.index_settled = true;
                match result {
                    Ok(index) => {
                        let dates = index.len();
                        info!(dates, "date index loaded");
                        self.events.emit(SessionEvent::IndexLoaded { dates });
                        let effects = self.snapshots.install_index(index);
                        self.apply_snapshot_effects(effects, &mut tasks);
                    }
                    Err(err) => {
                        warn!(error = %err, "available dates request failed");
                        self.events.emit(SessionEvent::IndexLoaded { dates: 0 });
                    }
                }
            }
            SessionCompletion::Date(request, result) => {
                self.snapshots.complete_date_fetch(request, result);
            }
            SessionCompletion::Route(completion) => self.finish_route(completion, now),
            SessionCompletion::ReferenceRoute(result) => match result {
                Ok(route) => self.sink.replace(LayerId::REFERENCE_ROUTE, &route),
                Err(err) => warn!(error = %err, "could not load reference route"),
            },
            SessionCompletion::Prediction { generation, result } => {
                self.finish_prediction(generation, result);
            }
        }
        self.sync_extent();
        tasks
    }

    /// Reacts to a settled bulk fetch on the shared cache.
    pub fn on_year_event(&mut self, event: YearEvent) -> Vec<SessionTask> {
        if !self.mounted {
            return Vec::new();
        }
        let mut tasks = Vec::new();
        let effects = self.snapshots.on_year_event(event);
        self.apply_snapshot_effects(effects, &mut tasks);
        self.sync_extent();
        tasks
    }

    /// Recovers after missed cache notifications by re-resolving a selection
    /// that is still waiting on a bulk fetch.
    pub fn resync(&mut self) -> Vec<SessionTask> {
        if !self.mounted {
            return Vec::new();
        }
        let mut tasks = Vec::new();
        if self.snapshots.status().is_loading() && self.snapshots.pending_fetch().is_none() {
            let effects = self.snapshots.refetch();
            self.apply_snapshot_effects(effects, &mut tasks);
        }
        self.sync_extent();
        tasks
    }

    /// Delivers the frames due at `now` to the animator.
    pub fn on_frame_tick(&mut self, now: Timestamp) {
        for frame in self.frames.take_due(now) {
            let Some(reveal) = self.animator.on_frame(frame, &mut self.frames) else {
                continue;
            };
            self.render_path();
            if reveal.finished {
                self.events.emit(SessionEvent::AnimationFinished);
            }
        }
    }

    /// Tears the view down. Later completions are discarded.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        self.animator.reset(&mut self.frames);
        self.markers.clear();
        self.predictions.bump();
        self.sink.remove(LayerId::ANIMATED_ROUTE);
        self.sink.remove(LayerId::REFERENCE_ROUTE);
        debug!("session unmounted");
    }

    fn apply_snapshot_effects(&mut self, effects: Vec<SnapshotEffect>, tasks: &mut Vec<SessionTask>) {
        for effect in effects {
            match effect {
                SnapshotEffect::FetchYear(ticket) => tasks.push(SessionTask::FetchYear(ticket)),
                SnapshotEffect::FetchDate(request) => tasks.push(SessionTask::FetchDate(request)),
                SnapshotEffect::DateChanged { previous, current } => {
                    debug!(%previous, %current, "date changed; dropping prediction");
                    self.predictions.bump();
                    self.prediction = None;
                    self.sink
                        .replace(LayerId::ICE_PREDICTION, &FeatureCollection::empty());
                    self.events.emit(SessionEvent::PredictionInvalidated);
                }
            }
        }
    }

    fn apply_marker_effects(&mut self, effects: Vec<MarkerEffect>, tasks: &mut Vec<SessionTask>) {
        self.events
            .emit(SessionEvent::MarkersChanged(self.markers.pair()));
        for effect in effects {
            match effect {
                MarkerEffect::StopAnimation => self.animator.stop(&mut self.frames),
                MarkerEffect::ClearPath => {
                    self.animator.reset(&mut self.frames);
                    self.render_path();
                }
                MarkerEffect::RequestRoute(target) => {
                    let before = self.orchestrator.status();
                    let observed = self.shown.as_ref().map(|snap| &snap.features);
                    if let Some(job) =
                        self.orchestrator
                            .begin(target, self.prediction.as_ref(), observed)
                    {
                        tasks.push(SessionTask::Route(job));
                    }
                    self.note_route_status(before);
                }
            }
        }
    }

    fn finish_route(&mut self, completion: RouteCompletion, now: Timestamp) {
        let before = self.orchestrator.status();
        let fallback = matches!(completion.outcome, RouteOutcome::Fallback(_));
        let accepted = self
            .orchestrator
            .finish(completion, self.markers.generation());

        if let Some(coordinates) = accepted {
            self.events.emit(SessionEvent::RouteResolved {
                fallback,
                coordinates: coordinates.len(),
            });
            if self.animator.start(coordinates, now, &mut self.frames) {
                self.render_path();
            }
        }
        self.note_route_status(before);
    }

    fn finish_prediction(
        &mut self,
        generation: Generation,
        result: Result<FeatureCollection, BackendError>,
    ) {
        if !self.predictions.is_current(generation) {
            debug!("discarding prediction for a superseded request");
            return;
        }
        match result {
            Ok(overlay) => {
                self.sink.replace(LayerId::ICE_PREDICTION, &overlay);
                self.prediction = Some(overlay);
            }
            Err(err) => {
                warn!(error = %err, "prediction request failed");
                self.prediction = None;
                self.sink
                    .replace(LayerId::ICE_PREDICTION, &FeatureCollection::empty());
                self.events.emit(SessionEvent::PredictionFailed(format!(
                    "Prediction request failed! ({})",
                    err.status_label()
                )));
            }
        }
    }

    fn note_route_status(&mut self, before: RouteStatus) {
        let after = self.orchestrator.status();
        if after != before {
            self.events.emit(SessionEvent::RouteStatusChanged(after));
        }
    }

    fn render_path(&mut self) {
        let path = self.animator.visible_path();
        let payload = if path.is_empty() {
            FeatureCollection::empty()
        } else {
            FeatureCollection::line_string(path.to_vec())
        };
        self.sink.replace(LayerId::ANIMATED_ROUTE, &payload);
    }

    /// Pushes the selection's extent when the controller state moved.
    ///
    /// While loading the previous extent stays on screen; a failed date
    /// empties the layer.
    fn sync_extent(&mut self) {
        let revision = self.snapshots.revision();
        if self.rendered_revision == Some(revision) {
            return;
        }
        self.rendered_revision = Some(revision);

        match self.snapshots.status() {
            SnapshotStatus::Cached(snap) | SnapshotStatus::Fetched(snap) => {
                self.sink.replace(LayerId::ICE_EXTENT, &snap.features);
                self.shown = Some(Arc::clone(snap));
            }
            SnapshotStatus::Failed(_) => {
                self.sink.replace(LayerId::ICE_EXTENT, &FeatureCollection::empty());
                self.shown = None;
            }
            SnapshotStatus::Loading => {}
        }
        self.events.emit(SessionEvent::SelectionChanged {
            date: self.snapshots.selected_date(),
            status: self.snapshots.status().label(),
        });
    }
}
