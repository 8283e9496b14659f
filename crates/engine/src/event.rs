use core_types::LatLng;

/// Identifies one arming of the auto-finalize timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(pub(crate) u64);

/// A unified enum that represents any input the drawing controller can receive.
/// Pointer events come from the map surface; `IdleTimeout` is posted by the controller's own
/// timer onto the same channel, so every transition runs on the task draining it.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawingInput {
    /// The user entered drawing mode.
    Start,
    /// A click on the map.
    Point(LatLng),
    /// The explicit two-step confirmation (double click).
    DoubleCommit,
    Cancel,
    IdleTimeout(TimerToken),
}
