//! Epicenter markers.
//!
//! A persistent main marker sits on the selected epicenter and a pulse task
//! adds an expanding, fading ring every second. Marking a new event always
//! clears the old markers and aborts the old pulse task first, so there is
//! never more than one main marker or one pulse task.
//!
//! ```text
//! Idle --mark--> MainMarkerPlaced --first pulse + timer--> Pulsing
//!   ^                                                        |
//!   +-------------------------- mark / clear ----------------+
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::task::AbortHandle;
use tokio::time::{Instant, interval_at, sleep_until};
use tracing::debug;

use crate::surface::{Surface, SurfaceUpdate};

/// Period between pulses.
pub const PULSE_PERIOD: Duration = Duration::from_secs(1);

/// How long one pulse animates before it is removed.
pub const PULSE_DURATION: Duration = Duration::from_secs(1);

/// Radius of the main marker and of a pulse when it starts.
pub const MARKER_RADIUS: f64 = 15.0;

/// Radius a pulse grows to.
pub const PULSE_END_RADIUS: f64 = 30.0;

/// Opacity of the main marker and of a pulse when it starts.
pub const MARKER_OPACITY: f64 = 0.8;

/// A marker as drawn on the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerView {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub opacity: f64,
    /// Radius at the end of the animation; equals `radius` for the main marker
    pub end_radius: f64,
    /// Animation length, zero for the main marker
    pub duration_ms: u64,
    /// Render generation and list index of the event, echoed back on click
    pub generation: u64,
    pub index: usize,
}

/// Where to put markers and which event they open on click.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerTarget {
    pub generation: u64,
    pub index: usize,
    /// Projected epicenter, `None` when the event has no coordinates
    pub position: Option<(f64, f64)>,
}

/// Marker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerPhase {
    Idle,
    MainMarkerPlaced,
    Pulsing,
}

/// Owns the markers on one surface and the single pulse task.
pub struct MarkerLayer<S: Surface> {
    surface: Arc<S>,
    phase: MarkerPhase,
    main: Option<MarkerView>,
    pulse_task: Option<AbortHandle>,
    next_id: Arc<AtomicU64>,
    /// Bumped on every clear; a pulse task only emits while its epoch is current
    epoch: Arc<Mutex<u64>>,
    timer_starts: u64,
}

impl<S: Surface> MarkerLayer<S> {
    #[must_use]
    pub fn new(surface: Arc<S>) -> Self {
        Self {
            surface,
            phase: MarkerPhase::Idle,
            main: None,
            pulse_task: None,
            next_id: Arc::new(AtomicU64::new(0)),
            epoch: Arc::new(Mutex::new(0)),
            timer_starts: 0,
        }
    }

    #[must_use]
    pub fn phase(&self) -> MarkerPhase {
        self.phase
    }

    /// The main marker, if one is placed.
    #[must_use]
    pub fn main_marker(&self) -> Option<&MarkerView> {
        self.main.as_ref()
    }

    /// How many pulse timers have been started so far.
    #[must_use]
    pub fn timer_starts(&self) -> u64 {
        self.timer_starts
    }

    /// Remove every marker and stop pulsing.
    pub fn clear(&mut self) {
        let mut epoch = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
        *epoch += 1;
        if let Some(task) = self.pulse_task.take() {
            task.abort();
        }
        self.surface.apply(SurfaceUpdate::ClearMarkers);
        drop(epoch);
        self.main = None;
        self.phase = MarkerPhase::Idle;
    }

    /// Mark an event: clear, place the main marker, then start pulsing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn mark(&mut self, target: MarkerTarget) {
        self.clear();

        let Some((x, y)) = target.position else {
            debug!("event {} has no epicenter, leaving markers idle", target.index);
            return;
        };

        let main = MarkerView {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            x,
            y,
            radius: MARKER_RADIUS,
            opacity: MARKER_OPACITY,
            end_radius: MARKER_RADIUS,
            duration_ms: 0,
            generation: target.generation,
            index: target.index,
        };
        self.surface.apply(SurfaceUpdate::MainMarker { marker: main.clone() });
        self.main = Some(main.clone());
        self.phase = MarkerPhase::MainMarkerPlaced;

        let template = MarkerView {
            end_radius: PULSE_END_RADIUS,
            duration_ms: u64::try_from(PULSE_DURATION.as_millis()).unwrap_or(u64::MAX),
            ..main
        };
        let first = emit_pulse(self.surface.as_ref(), &self.next_id, &template);
        let live = VecDeque::from([(first, Instant::now() + PULSE_DURATION)]);

        let mine = *self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
        let task = tokio::spawn(run_pulses(
            Arc::clone(&self.surface),
            Arc::clone(&self.next_id),
            template,
            live,
            Arc::clone(&self.epoch),
            mine,
        ));
        self.pulse_task = Some(task.abort_handle());
        self.timer_starts += 1;
        self.phase = MarkerPhase::Pulsing;
    }
}

impl<S: Surface> Drop for MarkerLayer<S> {
    fn drop(&mut self) {
        if let Some(task) = self.pulse_task.take() {
            task.abort();
        }
    }
}

fn emit_pulse<S: Surface>(surface: &S, ids: &AtomicU64, template: &MarkerView) -> u64 {
    let id = ids.fetch_add(1, Ordering::Relaxed);
    surface.apply(SurfaceUpdate::Pulse {
        marker: MarkerView { id, ..template.clone() },
    });
    id
}

/// Run `f` only while `mine` is still the current epoch.
///
/// The epoch lock is held across `f`, so nothing can be emitted after the
/// `ClearMarkers` that ended this epoch.
fn if_current<T>(epoch: &Mutex<u64>, mine: u64, f: impl FnOnce() -> T) -> Option<T> {
    let current = epoch.lock().unwrap_or_else(PoisonError::into_inner);
    (*current == mine).then(f)
}

/// Add a pulse every period and remove each one when its animation ends.
///
/// Returns as soon as its epoch has been superseded by a clear.
async fn run_pulses<S: Surface>(
    surface: Arc<S>,
    ids: Arc<AtomicU64>,
    template: MarkerView,
    mut live: VecDeque<(u64, Instant)>,
    epoch: Arc<Mutex<u64>>,
    mine: u64,
) {
    let mut ticker = interval_at(Instant::now() + PULSE_PERIOD, PULSE_PERIOD);
    loop {
        let next_expiry = live.front().map(|(_, at)| *at);
        tokio::select! {
            biased;
            () = expiry(next_expiry) => {
                let Some((id, _)) = live.pop_front() else { continue };
                if if_current(&epoch, mine, || surface.apply(SurfaceUpdate::RemovePulse { id })).is_none() {
                    return;
                }
            }
            _ = ticker.tick() => {
                let Some(id) = if_current(&epoch, mine, || emit_pulse(surface.as_ref(), &ids, &template)) else {
                    debug!("pulse epoch {} superseded, stopping", mine);
                    return;
                };
                live.push_back((id, Instant::now() + PULSE_DURATION));
            }
        }
    }
}

async fn expiry(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
