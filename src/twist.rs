// Shared machinery for the totem twisting labs.
// TwistCore holds the run state every variant has (GCD, mana, coach, challenge);
// the Air and Fire engines add their own slot, timers and rules on top.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{decay, FrameClock, TIME_EPSILON};
use crate::types::{fmt_secs, Coach, CoachLine, Tone};

/// Global cooldown shared by every totem (seconds).
pub const GCD: f64 = 1.5;
pub const DEFAULT_MANA_MAX: f64 = 100.0;
pub const DEFAULT_CHALLENGE_TARGET: f64 = 45.0;
/// Fixed step used by `advance`.
pub const SUB_STEP: f64 = 0.05;
const FAIL_HOLD: f64 = 2.6;
const ARM_HOLD: f64 = 2.2;

// =============================================================================
// Outcomes
// =============================================================================

/// Why a run ended early.
#[derive(Debug, Clone, PartialEq)]
pub enum FailReason {
    WindfuryDropped,
    WindfuryRefreshedEarly { left: f64 },
    WindfuryMissed,
    LateSwapBack,
    NovaCanceled,
    LateBaselineReplace,
    NovaMissed,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::WindfuryDropped => f.write_str("Windfury dropped"),
            FailReason::WindfuryRefreshedEarly { left } => {
                write!(f, "Windfury refreshed too early ({}s left)", fmt_secs(*left, 1))
            }
            FailReason::WindfuryMissed => f.write_str("Windfury missed (out of range)"),
            FailReason::LateSwapBack => f.write_str("Late swap back to Grace"),
            FailReason::NovaCanceled => f.write_str("Canceled Fire Nova early"),
            FailReason::LateBaselineReplace => f.write_str("Late baseline replace"),
            FailReason::NovaMissed => f.write_str("Fire Nova missed (out of range)"),
        }
    }
}

/// Why a cast was refused. State is unchanged apart from counters.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    NotArmed,
    GlobalCooldown { left: f64 },
    NotEnoughMana { cost: f64, mana: f64 },
    OnCooldown { left: f64 },
    OutOfRange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CastResult {
    Accepted,
    Rejected(RejectReason),
}

impl CastResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, CastResult::Accepted)
    }
}

/// Suggested next button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Wait,
    CastPrimary,
    CastBaselineA,
    CastBaselineB,
}

/// Something that happened during a step.
#[derive(Debug, Clone, PartialEq)]
pub enum TwistEvent {
    ChallengeStarted,
    WindfuryDropped,
    Burst,
    BurstMissed,
    ChallengeFailed(FailReason),
    ChallengeCompleted { elapsed: f64 },
}

// =============================================================================
// Challenge
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ChallengeStatus {
    #[default]
    Idle,
    Armed,
    Running,
    Failed(FailReason),
    Completed,
}

/// Timed run: survive `target` seconds without breaking a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    pub status: ChallengeStatus,
    pub elapsed: f64,
    /// Shortest failed run.
    pub best: Option<f64>,
    pub completions: u32,
    /// Seconds to survive. Zero runs until failure.
    pub target: f64,
}

impl Challenge {
    pub fn new(target: f64) -> Self {
        Challenge {
            status: ChallengeStatus::Idle,
            elapsed: 0.0,
            best: None,
            completions: 0,
            target,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ChallengeStatus::Running
    }

    pub fn is_armed(&self) -> bool {
        self.status == ChallengeStatus::Armed
    }

    /// Whether a new run must first clear the previous one.
    pub fn needs_restart(&self) -> bool {
        !matches!(self.status, ChallengeStatus::Idle)
    }

    fn arm(&mut self) {
        self.status = ChallengeStatus::Armed;
        self.elapsed = 0.0;
    }

    fn begin(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        self.status = ChallengeStatus::Running;
        self.elapsed = 0.0;
        true
    }

    fn fail(&mut self, reason: FailReason) -> bool {
        if !self.is_running() {
            return false;
        }
        self.best = Some(self.best.map_or(self.elapsed, |b| b.min(self.elapsed)));
        self.status = ChallengeStatus::Failed(reason);
        true
    }

    fn target_reached(&self) -> bool {
        self.is_running() && self.target > 0.0 && self.elapsed + TIME_EPSILON >= self.target
    }

    pub fn status_label(&self) -> String {
        match &self.status {
            ChallengeStatus::Idle => "Idle".to_string(),
            ChallengeStatus::Armed => "Ready".to_string(),
            ChallengeStatus::Running => "Running".to_string(),
            ChallengeStatus::Failed(reason) => format!("Failed: {reason}"),
            ChallengeStatus::Completed => "Completed".to_string(),
        }
    }

    pub fn view(&self) -> ChallengeView {
        let (failed_reason, button) = match &self.status {
            ChallengeStatus::Failed(reason) => (Some(reason.to_string()), "Start run"),
            ChallengeStatus::Armed | ChallengeStatus::Running => (None, "Restart run"),
            _ => (None, "Start run"),
        };
        ChallengeView {
            status: self.status_label(),
            running: self.is_running(),
            elapsed: self.elapsed,
            best: self.best,
            completions: self.completions,
            target: self.target,
            failed_reason,
            button_label: button.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeView {
    pub status: String,
    pub running: bool,
    pub elapsed: f64,
    pub best: Option<f64>,
    pub completions: u32,
    pub target: f64,
    pub failed_reason: Option<String>,
    pub button_label: String,
}

// =============================================================================
// Core run state
// =============================================================================

/// Run state shared by every twisting lab.
#[derive(Debug, Clone)]
pub struct TwistCore {
    pub armed: bool,
    pub running: bool,
    pub elapsed: f64,
    pub mana: f64,
    pub mana_max: f64,
    pub gcd_left: f64,
    pub coach: Coach,
    pub challenge: Challenge,
    /// Simulation speed applied to frame deltas.
    pub speed: f64,
    frames: FrameClock,
    coach_hold: f64,
}

impl TwistCore {
    pub fn new(mana_max: f64, challenge_target: f64, coach_hold: f64) -> Self {
        TwistCore {
            armed: false,
            running: false,
            elapsed: 0.0,
            mana: mana_max,
            mana_max,
            gcd_left: 0.0,
            coach: Coach::default(),
            challenge: Challenge::new(challenge_target),
            speed: 1.0,
            frames: FrameClock::new(),
            coach_hold,
        }
    }

    /// Show a message for the variant's default hold.
    pub fn say(&mut self, tone: Tone, text: impl Into<String>) {
        let hold = self.coach_hold;
        self.coach.set(tone, text, hold);
    }

    pub fn say_for(&mut self, tone: Tone, text: impl Into<String>, hold: f64) {
        self.coach.set(tone, text, hold);
    }

    pub fn coach_line(&self, fallback: &str) -> CoachLine {
        self.coach.display(fallback)
    }

    /// Arm the engine. Returns false if it already was.
    pub fn arm(&mut self) -> bool {
        if self.armed {
            return false;
        }
        self.armed = true;
        true
    }

    /// Clear the run but keep counters and challenge history.
    pub fn reset_run(&mut self) {
        self.running = false;
        self.armed = false;
        self.elapsed = 0.0;
        self.gcd_left = 0.0;
        self.mana = self.mana_max;
        self.frames.reset();
    }

    /// Full reset: run, coach and challenge.
    pub fn reset(&mut self) {
        self.reset_run();
        self.coach.clear();
        self.challenge = Challenge::new(self.challenge.target);
    }

    /// Cast gate: armed, off GCD, enough mana.
    pub fn check_cast(&self, cost: f64) -> Result<(), RejectReason> {
        if !self.armed {
            return Err(RejectReason::NotArmed);
        }
        if self.gcd_left > 0.0 {
            return Err(RejectReason::GlobalCooldown {
                left: self.gcd_left,
            });
        }
        if self.mana < cost {
            return Err(RejectReason::NotEnoughMana {
                cost,
                mana: self.mana,
            });
        }
        Ok(())
    }

    /// Pay for an accepted cast and trigger the GCD.
    pub fn spend(&mut self, cost: f64) {
        self.mana = (self.mana - cost).clamp(0.0, self.mana_max);
        self.gcd_left = GCD;
    }

    /// Start the clock on the first accepted cast. An armed challenge starts with it.
    pub fn ensure_running(&mut self, events: &mut Vec<TwistEvent>, run_started: &str) {
        if self.running {
            return;
        }
        self.running = true;
        self.frames.reset();
        debug!("twist loop started");
        if self.challenge.is_armed() {
            self.begin_challenge_now(events, run_started);
        }
    }

    fn begin_challenge_now(&mut self, events: &mut Vec<TwistEvent>, run_started: &str) {
        if self.challenge.begin() {
            self.say_for(Tone::Info, run_started, ARM_HOLD);
            debug!(target = self.challenge.target, "twist challenge started");
            events.push(TwistEvent::ChallengeStarted);
        }
    }

    /// Arm a challenge. Starts at once if the loop is already running,
    /// otherwise on the next accepted cast.
    pub fn arm_challenge(&mut self, run_started: &str) -> Vec<TwistEvent> {
        let mut events = Vec::new();
        self.arm();
        self.challenge.arm();
        if self.running {
            self.begin_challenge_now(&mut events, run_started);
        } else {
            self.say_for(Tone::Info, "Run armed. First cast starts the timer.", ARM_HOLD);
        }
        events
    }

    /// End a running challenge. No-op outside one.
    pub fn fail(&mut self, reason: FailReason) -> Option<TwistEvent> {
        if !self.challenge.fail(reason.clone()) {
            return None;
        }
        debug!(%reason, elapsed = self.challenge.elapsed, "twist challenge failed");
        self.say_for(Tone::Bad, format!("Run failed: {reason}"), FAIL_HOLD);
        self.halt();
        self.armed = false;
        Some(TwistEvent::ChallengeFailed(reason))
    }

    /// Stop the loop. The engine stays armed.
    pub fn halt(&mut self) {
        self.running = false;
        self.gcd_left = 0.0;
        self.frames.reset();
    }

    /// Advance the shared timers.
    pub fn tick(&mut self, dt: f64) {
        self.elapsed += dt;
        if self.challenge.is_running() {
            self.challenge.elapsed += dt;
        }
        self.gcd_left = decay(self.gcd_left, dt);
        self.coach.decay(dt);
    }

    /// Complete the challenge once its target is reached.
    pub fn check_completion(&mut self) -> Option<TwistEvent> {
        if !self.running || !self.challenge.target_reached() {
            return None;
        }
        let elapsed = self.challenge.elapsed;
        self.challenge.status = ChallengeStatus::Completed;
        self.challenge.completions += 1;
        self.say_for(
            Tone::Ok,
            format!("Run complete. {}s without a mistake.", fmt_secs(elapsed, 1)),
            FAIL_HOLD,
        );
        debug!(elapsed, "twist challenge completed");
        self.halt();
        self.armed = false;
        Some(TwistEvent::ChallengeCompleted { elapsed })
    }

    /// GCD progress 0-1 for rings and button overlays (1 = ready).
    pub fn gcd_progress(&self) -> f64 {
        (1.0 - self.gcd_left / GCD).clamp(0.0, 1.0)
    }

    /// Clamped frame delta scaled by the simulation speed.
    pub fn frame_delta(&mut self, now_ms: f64) -> f64 {
        self.frames.delta(now_ms) * self.speed
    }

    pub fn reset_frames(&mut self) {
        self.frames.reset();
    }
}

// =============================================================================
// Engine trait
// =============================================================================

/// A twisting lab variant.
pub trait TwistEngine {
    /// Totems that fill the slot between primary casts.
    type Baseline: Copy;

    fn core(&self) -> &TwistCore;
    fn core_mut(&mut self) -> &mut TwistCore;

    /// Arm the engine. The clock starts on the first accepted cast.
    fn start(&mut self);
    fn reset(&mut self);
    fn begin_challenge(&mut self) -> Vec<TwistEvent>;
    fn cast_primary(&mut self) -> CastResult;
    fn cast_baseline(&mut self, kind: Self::Baseline) -> CastResult;
    fn recommend(&self) -> Recommendation;
    /// Advance simulated time by `dt` seconds.
    fn step(&mut self, dt: f64) -> Vec<TwistEvent>;

    /// Advance one animation frame from a host timestamp.
    fn advance_frame(&mut self, now_ms: f64) -> Vec<TwistEvent> {
        if !self.core().running {
            self.core_mut().reset_frames();
            return Vec::new();
        }
        let dt = self.core_mut().frame_delta(now_ms);
        self.step(dt)
    }

    /// Advance `seconds` of simulated time in fixed sub-steps.
    fn advance(&mut self, seconds: f64) -> Vec<TwistEvent> {
        let mut events = Vec::new();
        let mut remaining = seconds.max(0.0);
        while remaining > TIME_EPSILON && self.core().running {
            let dt = remaining.min(SUB_STEP);
            events.extend(self.step(dt));
            remaining -= dt;
        }
        events
    }
}
