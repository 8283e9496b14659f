//! The polygon drawing state machine.
//!
//! ```text
//! Idle --start--> Collecting(points, timer)
//! Collecting --point (3..11 points)--> Collecting, timer re-armed
//! Collecting --12th point | double commit (3+) | idle timeout (3+)--> Idle, geometry emitted
//! Collecting --cancel--> Idle
//! ```

use crate::event::{DrawingInput, TimerToken};
use core_types::{LatLng, MAX_VERTICES, MIN_VERTICES};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedSender, WeakUnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

/// A finalized polygon outline with between 3 and 12 vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    vertices: Vec<LatLng>,
}

impl Geometry {
    pub fn vertices(&self) -> &[LatLng] {
        &self.vertices
    }

    pub fn into_vertices(self) -> Vec<LatLng> {
        self.vertices
    }
}

/// How the controller finalized (or did not finalize) a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeReason {
    VertexLimit,
    IdleTimeout,
    DoubleCommit,
}

/// The result of feeding one input to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawingOutcome {
    Started,
    /// Still collecting; `count` points so far.
    Collecting { count: usize },
    Finalized {
        geometry: Geometry,
        reason: FinalizeReason,
    },
    Cancelled,
    /// The input is not valid in the current state and changed nothing.
    Ignored(&'static str),
}

/// A cancelable one-shot timer that posts `DrawingInput::IdleTimeout` back to the controller.
///
/// Only a weak sender is kept, so the timer never keeps the input channel open by itself.
pub struct FinalizeTimer {
    delay: Duration,
    inputs: WeakUnboundedSender<DrawingInput>,
    next_token: u64,
    pending: Option<(TimerToken, JoinHandle<()>)>,
}

impl FinalizeTimer {
    pub fn new(delay: Duration, inputs: &UnboundedSender<DrawingInput>) -> Self {
        Self {
            delay,
            inputs: inputs.downgrade(),
            next_token: 0,
            pending: None,
        }
    }

    /// Cancels any pending timeout and starts a new one. Must run inside a tokio runtime.
    pub fn arm(&mut self) -> TimerToken {
        self.disarm();
        self.next_token += 1;
        let token = TimerToken(self.next_token);
        // Deadline is fixed here, not when the task is first polled.
        let deadline = Instant::now() + self.delay;
        let inputs = self.inputs.clone();
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            if let Some(tx) = inputs.upgrade() {
                let _ = tx.send(DrawingInput::IdleTimeout(token));
            }
        });
        self.pending = Some((token, handle));
        token
    }

    pub fn disarm(&mut self) {
        if let Some((_, handle)) = self.pending.take() {
            handle.abort();
        }
    }

    /// The token of the pending timeout, if one is armed.
    pub fn pending(&self) -> Option<TimerToken> {
        self.pending.as_ref().map(|(token, _)| *token)
    }

    /// Consumes the pending arming if `token` is the current one.
    fn take_if_current(&mut self, token: TimerToken) -> bool {
        if self.pending() == Some(token) {
            self.pending = None;
            true
        } else {
            false
        }
    }
}

impl Drop for FinalizeTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}

enum DrawingState {
    Idle,
    Collecting { points: Vec<LatLng> },
}

/// Converts map clicks into a validated polygon.
///
/// Emits exactly one `Geometry` per drawing session, always with 3..=12 vertices.
pub struct DrawingController {
    state: DrawingState,
    timer: FinalizeTimer,
}

impl DrawingController {
    /// `inputs` is the channel the controller's owner drains; idle timeouts are posted to it.
    pub fn new(auto_finalize_delay: Duration, inputs: &UnboundedSender<DrawingInput>) -> Self {
        Self {
            state: DrawingState::Idle,
            timer: FinalizeTimer::new(auto_finalize_delay, inputs),
        }
    }

    pub fn handle(&mut self, input: DrawingInput) -> DrawingOutcome {
        match input {
            DrawingInput::Start => self.start_drawing(),
            DrawingInput::Point(point) => self.accept_point(point),
            DrawingInput::DoubleCommit => self.finalize_by_double_commit(),
            DrawingInput::Cancel => self.cancel(),
            DrawingInput::IdleTimeout(token) => self.finalize_by_timeout(token),
        }
    }

    pub fn start_drawing(&mut self) -> DrawingOutcome {
        match self.state {
            DrawingState::Collecting { .. } => ignored("already drawing"),
            DrawingState::Idle => {
                self.state = DrawingState::Collecting { points: Vec::new() };
                tracing::debug!("Drawing started.");
                DrawingOutcome::Started
            }
        }
    }

    pub fn accept_point(&mut self, point: LatLng) -> DrawingOutcome {
        let DrawingState::Collecting { points } = &mut self.state else {
            return ignored("point outside a drawing session");
        };
        points.push(point);
        let count = points.len();

        if count >= MAX_VERTICES {
            return self.finalize(FinalizeReason::VertexLimit);
        }
        if count >= MIN_VERTICES {
            self.timer.arm();
        }
        DrawingOutcome::Collecting { count }
    }

    /// Handles an idle timeout. Tokens from a superseded or cancelled arming are ignored.
    pub fn finalize_by_timeout(&mut self, token: TimerToken) -> DrawingOutcome {
        if !self.timer.take_if_current(token) {
            return ignored("stale timeout");
        }
        let count = match &self.state {
            DrawingState::Collecting { points } => points.len(),
            DrawingState::Idle => return ignored("timeout while idle"),
        };
        if count >= MIN_VERTICES {
            self.finalize(FinalizeReason::IdleTimeout)
        } else {
            DrawingOutcome::Collecting { count }
        }
    }

    pub fn finalize_by_double_commit(&mut self) -> DrawingOutcome {
        let count = match &self.state {
            DrawingState::Collecting { points } => points.len(),
            DrawingState::Idle => return ignored("double commit while idle"),
        };
        if count < MIN_VERTICES {
            return ignored("fewer than 3 points");
        }
        self.finalize(FinalizeReason::DoubleCommit)
    }

    pub fn cancel(&mut self) -> DrawingOutcome {
        self.timer.disarm();
        match std::mem::replace(&mut self.state, DrawingState::Idle) {
            DrawingState::Collecting { points } => {
                tracing::debug!(discarded = points.len(), "Drawing cancelled.");
                DrawingOutcome::Cancelled
            }
            DrawingState::Idle => ignored("cancel while idle"),
        }
    }

    /// Cancels any pending timer. Called when the controller's owner shuts down.
    pub fn teardown(&mut self) {
        self.timer.disarm();
        self.state = DrawingState::Idle;
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, DrawingState::Collecting { .. })
    }

    /// The in-progress outline, empty when idle.
    pub fn points(&self) -> &[LatLng] {
        match &self.state {
            DrawingState::Collecting { points } => points,
            DrawingState::Idle => &[],
        }
    }

    pub fn pending_timeout(&self) -> Option<TimerToken> {
        self.timer.pending()
    }

    fn finalize(&mut self, reason: FinalizeReason) -> DrawingOutcome {
        self.timer.disarm();
        let DrawingState::Collecting { points } = std::mem::replace(&mut self.state, DrawingState::Idle)
        else {
            return ignored("finalize while idle");
        };
        tracing::info!(vertices = points.len(), ?reason, "Polygon finalized.");
        DrawingOutcome::Finalized {
            geometry: Geometry { vertices: points },
            reason,
        }
    }
}

fn ignored(why: &'static str) -> DrawingOutcome {
    tracing::debug!(reason = why, "Drawing input ignored.");
    DrawingOutcome::Ignored(why)
}
