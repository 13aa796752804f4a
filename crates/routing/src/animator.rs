//! Time-based reveal of a route polyline.
//!
//! The animator owns at most one run. Progress is computed from frame
//! timestamps, not frame counts, so the reveal takes the same wall time at
//! any refresh rate.

use foundation::geo::Position;
use foundation::handles::{Generation, GenerationCounter};
use foundation::time::Timestamp;
use runtime::frame::{Frame, FrameHandle};
use runtime::scheduler::FrameScheduler;
use tracing::trace;

pub const MIN_DURATION_MS: f64 = 3000.0;
pub const MS_PER_COORDINATE: f64 = 30.0;

/// Playback length for a polyline of `len` coordinates.
pub fn duration_for(len: usize) -> f64 {
    (len as f64 * MS_PER_COORDINATE).max(MIN_DURATION_MS)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationRun {
    pub id: Generation,
    pub coordinates: Vec<Position>,
    pub started_at: Timestamp,
    pub duration_ms: f64,
}

impl AnimationRun {
    /// Fraction of the run elapsed at `now`, clamped to `[0, 1]`.
    pub fn progress(&self, now: Timestamp) -> f64 {
        if self.duration_ms <= 0.0 {
            return 1.0;
        }
        (now.elapsed_since(self.started_at) / self.duration_ms).clamp(0.0, 1.0)
    }

    /// Number of leading coordinates visible at `now`.
    ///
    /// Always at least one, and the full length exactly when progress is 1.
    pub fn revealed_len(&self, now: Timestamp) -> usize {
        let len = self.coordinates.len();
        if len == 0 {
            return 0;
        }
        let last = (len - 1) as f64;
        let index = (self.progress(now) * last).floor() as usize;
        index.min(len - 1) + 1
    }
}

/// Result of one frame callback.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Reveal {
    pub len: usize,
    pub finished: bool,
}

#[derive(Debug, Default)]
pub struct RouteAnimator {
    run: Option<AnimationRun>,
    frame: Option<FrameHandle>,
    revealed: usize,
    runs: GenerationCounter,
}

impl RouteAnimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new run, superseding any current one.
    ///
    /// An empty sequence starts nothing and leaves the current state alone.
    pub fn start(
        &mut self,
        coordinates: Vec<Position>,
        now: Timestamp,
        scheduler: &mut dyn FrameScheduler,
    ) -> bool {
        if coordinates.is_empty() {
            return false;
        }
        self.stop(scheduler);

        let duration_ms = duration_for(coordinates.len());
        let id = self.runs.bump();
        trace!(run = id.get(), coordinates = coordinates.len(), duration_ms, "animation started");
        self.run = Some(AnimationRun {
            id,
            coordinates,
            started_at: now,
            duration_ms,
        });
        self.revealed = 0;
        self.frame = Some(scheduler.request_frame());
        true
    }

    /// Cancels the pending frame. The revealed prefix stays as it is.
    pub fn stop(&mut self, scheduler: &mut dyn FrameScheduler) {
        if let Some(handle) = self.frame.take() {
            scheduler.cancel_frame(handle);
        }
    }

    /// Stops and forgets the current run.
    pub fn reset(&mut self, scheduler: &mut dyn FrameScheduler) {
        self.stop(scheduler);
        self.run = None;
        self.revealed = 0;
    }

    /// Advances the reveal. Frames not requested by the current run are
    /// ignored.
    pub fn on_frame(
        &mut self,
        frame: Frame,
        scheduler: &mut dyn FrameScheduler,
    ) -> Option<Reveal> {
        if self.frame != Some(frame.handle) {
            return None;
        }
        self.frame = None;
        let run = self.run.as_ref()?;

        let finished = run.progress(frame.timestamp) >= 1.0;
        self.revealed = self.revealed.max(run.revealed_len(frame.timestamp));
        if finished {
            trace!(run = run.id.get(), "animation finished");
        } else {
            self.frame = Some(scheduler.request_frame());
        }
        Some(Reveal {
            len: self.revealed,
            finished,
        })
    }

    pub fn is_running(&self) -> bool {
        self.frame.is_some()
    }

    pub fn current_run(&self) -> Option<&AnimationRun> {
        self.run.as_ref()
    }

    pub fn visible_path(&self) -> &[Position] {
        match &self.run {
            Some(run) => &run.coordinates[..self.revealed],
            None => &[],
        }
    }
}
