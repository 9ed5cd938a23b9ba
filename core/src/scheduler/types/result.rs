use serde::{Deserialize, Serialize};

/// Named phase durations of one attempt, in milliseconds.
///
/// Phases may overlap; only non-negativity is guaranteed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseTimings {
    pub total_ms: f64,
    pub session_acquire_ms: f64,
    pub reset_ms: f64,
    pub navigation_ms: f64,
    pub ready_wait_ms: f64,
    pub settle_wait_ms: f64,
    pub initial_capture_ms: f64,
    pub steps_ms: f64,
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

impl PhaseTimings {
    /// Clamp negative and non-finite values to zero.
    pub fn sanitized(self) -> Self {
        Self {
            total_ms: non_negative(self.total_ms),
            session_acquire_ms: non_negative(self.session_acquire_ms),
            reset_ms: non_negative(self.reset_ms),
            navigation_ms: non_negative(self.navigation_ms),
            ready_wait_ms: non_negative(self.ready_wait_ms),
            settle_wait_ms: non_negative(self.settle_wait_ms),
            initial_capture_ms: non_negative(self.initial_capture_ms),
            steps_ms: non_negative(self.steps_ms),
        }
    }
}

/// What the task executor returns for a successful attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub worker_id: usize,
    pub attempt: u32,
    pub screenshot_count: u32,
    #[serde(default)]
    pub timings: PhaseTimings,
}
