// Clocks shared by the real-time labs.
// PhaseClock: periodic swing timer. FrameClock: host timestamps to clamped frame deltas.

use serde::{Deserialize, Serialize};

/// Largest simulated step a single frame may take (seconds).
/// Keeps a backgrounded tab from jumping timers forward on return.
pub const MAX_FRAME_DT: f64 = 0.05;

/// Remaining times at or below this are treated as elapsed.
pub const TIME_EPSILON: f64 = 1e-9;

/// Count a timer down by `dt`, snapping float residue to zero.
pub fn decay(value: f64, dt: f64) -> f64 {
    let next = value - dt;
    if next <= TIME_EPSILON {
        0.0
    } else {
        next
    }
}

/// A periodic timer: phase = frac((now - start) / period).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseClock {
    start: f64,
    period: f64,
}

impl PhaseClock {
    /// Create a clock at phase 0 at `start`. Non-positive periods fall back to 1s.
    pub fn new(start: f64, period: f64) -> Self {
        PhaseClock {
            start,
            period: sanitize_period(period).unwrap_or(1.0),
        }
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    /// Phase in [0, 1).
    pub fn phase_at(&self, now: f64) -> f64 {
        let p = (now - self.start) / self.period;
        if !p.is_finite() {
            return 0.0;
        }
        let frac = p - p.floor();
        // frac can round up to exactly 1.0 for tiny negative p.
        if (0.0..1.0).contains(&frac) {
            frac
        } else {
            0.0
        }
    }

    /// Seconds until the next wrap.
    pub fn next_swing_in(&self, now: f64) -> f64 {
        (1.0 - self.phase_at(now)) * self.period
    }

    /// Absolute time of the next wrap.
    pub fn next_swing_at(&self, now: f64) -> f64 {
        now + self.next_swing_in(now)
    }

    /// Move the clock so that its phase at `now` equals `phase`.
    pub fn set_phase(&mut self, now: f64, phase: f64) {
        let phase = phase.clamp(0.0, 1.0);
        self.start = now - phase * self.period;
    }

    /// Restart at phase 0.
    pub fn restart(&mut self, now: f64) {
        self.start = now;
    }

    /// Change the period while keeping the current phase. Invalid periods are ignored.
    pub fn retime(&mut self, now: f64, period: f64) -> bool {
        match sanitize_period(period) {
            Some(period) => {
                let phase = self.phase_at(now);
                self.period = period;
                self.set_phase(now, phase);
                true
            }
            None => false,
        }
    }
}

fn sanitize_period(period: f64) -> Option<f64> {
    (period.is_finite() && period > 0.0).then_some(period)
}

/// Converts host frame timestamps (milliseconds) into clamped deltas (seconds).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameClock {
    last_ms: Option<f64>,
}

impl FrameClock {
    pub fn new() -> Self {
        FrameClock { last_ms: None }
    }

    /// Delta since the previous frame, clamped to [0, MAX_FRAME_DT]. The first frame yields 0.
    pub fn delta(&mut self, now_ms: f64) -> f64 {
        let dt = match self.last_ms {
            Some(last) if now_ms.is_finite() => ((now_ms - last) / 1000.0).clamp(0.0, MAX_FRAME_DT),
            _ => 0.0,
        };
        if now_ms.is_finite() {
            self.last_ms = Some(now_ms);
        }
        dt
    }

    pub fn reset(&mut self) {
        self.last_ms = None;
    }
}
