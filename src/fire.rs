// Fire twisting lab: weave Fire Nova Totem between baseline fire totems.
// Nova detonates after a fuse, then leaves the slot empty. Replacing it before
// the fuse runs out cancels the burst; replacing the baseline late wastes uptime.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;

use crate::clock::decay;
use crate::lifecycle::{Animated, Mounted};
use crate::registry::SpellRegistry;
use crate::twist::{
    CastResult, ChallengeView, FailReason, Recommendation, RejectReason, TwistCore, TwistEngine,
    TwistEvent, DEFAULT_CHALLENGE_TARGET, DEFAULT_MANA_MAX,
};
use crate::types::{fmt_secs, CoachLine, Tone};
use crate::EngineError;

pub const NOVA_COOLDOWN: f64 = 15.0;
pub const NOVA_COST: f64 = 12.0;
pub const SEARING_COST: f64 = 10.0;
pub const MAGMA_COST: f64 = 14.0;
pub const MAX_TALENT_POINTS: u8 = 2;
/// Canceling with at least this much fuse left is graded bad.
const EARLY_CANCEL_WINDOW: f64 = 0.8;
const LATE_REPLACE: f64 = 0.75;
const READY_NUDGE_HOLD: f64 = 1.6;
const BURST_NUDGE_AT: f64 = 1.2;
const COACH_HOLD: f64 = 2.2;
const MIN_SPEED: f64 = 0.5;
const MAX_SPEED: f64 = 3.0;
const MAX_TARGETS: u8 = 4;

const RUN_STARTED: &str = "Run started. Keep baseline down and weave Fire Nova clean.";

/// Fire Nova fuse for Improved Fire Totems points.
pub fn fuse_for(points: u8) -> f64 {
    match points {
        0 => 4.0,
        1 => 3.0,
        _ => 2.0,
    }
}

/// Totem in the fire slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FireSlot {
    #[default]
    None,
    FireNova,
    Searing,
    Magma,
}

impl FireSlot {
    pub fn spell_key(self) -> Option<&'static str> {
        match self {
            FireSlot::None => None,
            FireSlot::FireNova => Some("fire_nova_totem"),
            FireSlot::Searing => Some("searing_totem"),
            FireSlot::Magma => Some("magma_totem"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireBaseline {
    Searing,
    Magma,
}

impl FireBaseline {
    /// Magma takes over at three or more targets.
    pub fn for_targets(targets: u8) -> Self {
        if targets >= 3 {
            FireBaseline::Magma
        } else {
            FireBaseline::Searing
        }
    }

    pub fn cost(self) -> f64 {
        match self {
            FireBaseline::Searing => SEARING_COST,
            FireBaseline::Magma => MAGMA_COST,
        }
    }

    pub fn slot(self) -> FireSlot {
        match self {
            FireBaseline::Searing => FireSlot::Searing,
            FireBaseline::Magma => FireSlot::Magma,
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            FireBaseline::Searing => "Searing",
            FireBaseline::Magma => "Magma",
        }
    }

    fn recommendation(self) -> Recommendation {
        match self {
            FireBaseline::Searing => Recommendation::CastBaselineA,
            FireBaseline::Magma => Recommendation::CastBaselineB,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FireTwistConfig {
    #[serde(default = "default_mana_max")]
    pub mana_max: f64,
    #[serde(default = "default_challenge_target")]
    pub challenge_target_secs: f64,
    /// Improved Fire Totems points (0-2).
    #[serde(default)]
    pub talent_points: u8,
    #[serde(default = "default_targets")]
    pub target_count: u8,
    #[serde(default = "default_true")]
    pub target_in_range: bool,
    #[serde(default = "default_speed")]
    pub speed: f64,
}

fn default_mana_max() -> f64 {
    DEFAULT_MANA_MAX
}

fn default_challenge_target() -> f64 {
    DEFAULT_CHALLENGE_TARGET
}

fn default_targets() -> u8 {
    1
}

fn default_true() -> bool {
    true
}

fn default_speed() -> f64 {
    1.0
}

impl Default for FireTwistConfig {
    fn default() -> Self {
        FireTwistConfig {
            mana_max: default_mana_max(),
            challenge_target_secs: default_challenge_target(),
            talent_points: 0,
            target_count: default_targets(),
            target_in_range: true,
            speed: default_speed(),
        }
    }
}

impl FireTwistConfig {
    pub fn sanitize(mut self) -> Self {
        if !(self.mana_max.is_finite() && self.mana_max > 0.0) {
            warn!(value = self.mana_max, "ignoring mana pool");
            self.mana_max = default_mana_max();
        }
        if !(self.challenge_target_secs.is_finite() && self.challenge_target_secs >= 0.0) {
            warn!(value = self.challenge_target_secs, "ignoring challenge target");
            self.challenge_target_secs = default_challenge_target();
        }
        self.talent_points = self.talent_points.min(MAX_TALENT_POINTS);
        self.target_count = self.target_count.clamp(1, MAX_TARGETS);
        self.speed = clamp_speed(self.speed).unwrap_or_else(default_speed);
        self
    }
}

fn clamp_speed(speed: f64) -> Option<f64> {
    speed.is_finite().then(|| speed.clamp(MIN_SPEED, MAX_SPEED))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FireCounters {
    pub nova_casts: u32,
    pub bursts: u32,
    pub misses: u32,
    pub cancels: u32,
    /// Nova pressed while still cooling down.
    pub wasted_presses: u32,
    pub late_replaces: u32,
    pub late_replace_total: f64,
    pub slot_uptime: f64,
    pub slot_empty_time: f64,
    pub baseline_time: f64,
}

impl FireCounters {
    pub fn slot_uptime_pct(&self) -> f64 {
        let total = (self.slot_uptime + self.slot_empty_time).max(0.001);
        (self.slot_uptime / total * 100.0).round()
    }

    pub fn average_late_replace(&self) -> f64 {
        if self.late_replaces == 0 {
            0.0
        } else {
            self.late_replace_total / f64::from(self.late_replaces)
        }
    }
}

pub struct FireTwistEngine {
    core: TwistCore,
    slot: FireSlot,
    baseline: FireBaseline,
    nova_cooldown: f64,
    fuse_left: f64,
    fuse_duration: f64,
    nova_dropped_at: Option<f64>,
    burst_at: Option<f64>,
    talent_points: u8,
    target_count: u8,
    target_in_range: bool,
    counters: FireCounters,
    spells: SpellRegistry,
}

impl FireTwistEngine {
    pub fn new(config: FireTwistConfig) -> Self {
        let config = config.sanitize();
        let mut core = TwistCore::new(config.mana_max, config.challenge_target_secs, COACH_HOLD);
        core.speed = config.speed;
        FireTwistEngine {
            core,
            slot: FireSlot::None,
            baseline: FireBaseline::Searing,
            nova_cooldown: 0.0,
            fuse_left: 0.0,
            fuse_duration: fuse_for(config.talent_points),
            nova_dropped_at: None,
            burst_at: None,
            talent_points: config.talent_points,
            target_count: config.target_count,
            target_in_range: config.target_in_range,
            counters: FireCounters::default(),
            spells: SpellRegistry::shaman(),
        }
    }

    pub fn slot(&self) -> FireSlot {
        self.slot
    }

    pub fn fuse_left(&self) -> f64 {
        self.fuse_left
    }

    pub fn fuse_duration(&self) -> f64 {
        self.fuse_duration
    }

    pub fn nova_cooldown(&self) -> f64 {
        self.nova_cooldown
    }

    pub fn counters(&self) -> &FireCounters {
        &self.counters
    }

    pub fn spells_mut(&mut self) -> &mut SpellRegistry {
        &mut self.spells
    }

    /// Baseline totem for the current target count.
    pub fn preferred_baseline(&self) -> FireBaseline {
        FireBaseline::for_targets(self.target_count)
    }

    pub fn cast_fire_nova(&mut self) -> CastResult {
        self.cast_primary()
    }

    pub fn cast_searing(&mut self) -> CastResult {
        self.cast_baseline(FireBaseline::Searing)
    }

    pub fn cast_magma(&mut self) -> CastResult {
        self.cast_baseline(FireBaseline::Magma)
    }

    pub fn set_target_in_range(&mut self, in_range: bool) {
        self.target_in_range = in_range;
        if in_range {
            self.core
                .say_for(Tone::Info, "Target in range. Resume normal decisions.", 1.6);
        } else {
            self.core
                .say_for(Tone::Info, "Target out of range. Do not drop Fire Nova.", 2.0);
        }
    }

    pub fn set_target_count(&mut self, targets: u8) {
        self.target_count = targets.clamp(1, MAX_TARGETS);
        let text = format!(
            "Targets set to {}. Baseline is {}.",
            self.target_count,
            self.preferred_baseline().short_name()
        );
        self.core.say(Tone::Info, text);
    }

    /// Change Improved Fire Totems points. A running fuse keeps its relative progress.
    pub fn set_talent_points(&mut self, points: u8) {
        let points = points.min(MAX_TALENT_POINTS);
        let previous = self.fuse_duration;
        let next = fuse_for(points);
        self.talent_points = points;

        if self.fuse_left > 0.0 && previous > 0.0 {
            let ratio = self.fuse_left / previous;
            self.fuse_left = (ratio * next).clamp(0.0, next);
        }
        self.fuse_duration = next;

        let text = format!(
            "Improved Fire Totems set to {points}. Fire Nova fuse is {}s.",
            fmt_secs(next, 1)
        );
        self.core.say(Tone::Info, text);
    }

    /// Simulation speed multiplier, clamped to 0.5-3. Non-finite values are ignored.
    pub fn set_speed_multiplier(&mut self, speed: f64) {
        match clamp_speed(speed) {
            Some(speed) => self.core.speed = speed,
            None => warn!(value = speed, "ignoring speed multiplier"),
        }
    }

    fn reject(&mut self, reason: RejectReason, spell: &str) -> CastResult {
        match &reason {
            RejectReason::NotArmed => self.core.say_for(Tone::Info, "Press Start first.", 1.8),
            RejectReason::NotEnoughMana { .. } if self.core.running => self
                .core
                .say_for(Tone::Bad, format!("Not enough mana for {spell}."), 2.0),
            _ => {}
        }
        CastResult::Rejected(reason)
    }

    fn reset_run_state(&mut self) {
        self.core.reset_run();
        self.slot = FireSlot::None;
        self.baseline = FireBaseline::Searing;
        self.nova_cooldown = 0.0;
        self.fuse_left = 0.0;
        self.fuse_duration = fuse_for(self.talent_points);
        self.nova_dropped_at = None;
        self.burst_at = None;
    }

    fn default_coach(&self) -> &'static str {
        if !self.core.armed {
            "Press Start. Then keep a baseline fire totem down."
        } else if !self.core.running {
            "Ready. Drop Searing or Magma as baseline, then weave Fire Nova when ready."
        } else if !self.target_in_range {
            "Target out of range. Fire Nova will miss. Keep baseline only."
        } else {
            "Goal: baseline up, Fire Nova on cooldown, never cancel the burst, replace baseline quickly after detonation."
        }
    }

    fn nudge(&mut self) {
        if !self.core.running || !self.core.armed || self.core.coach.is_holding() {
            return;
        }
        if self.slot == FireSlot::None {
            if self.core.gcd_left <= 0.0 {
                self.core
                    .say_for(Tone::Warn, "Fire slot is empty. Drop baseline now.", 1.6);
            }
        } else if self.slot == FireSlot::FireNova {
            if self.fuse_left > 0.0 && self.fuse_left <= BURST_NUDGE_AT {
                self.core.say_for(
                    Tone::Info,
                    "Burst soon. Be ready to replace baseline after detonation.",
                    1.4,
                );
            }
        } else if self.recommend() == Recommendation::CastPrimary {
            self.core.say_for(
                Tone::Warn,
                "Fire Nova is ready. Drop it now.",
                READY_NUDGE_HOLD,
            );
        }
    }

    pub fn state(&self) -> FireTwistState {
        let spell = self
            .slot
            .spell_key()
            .map(|key| self.spells.lookup(key))
            .unwrap_or_else(|| self.spells.lookup("fire_totem"));
        let locked = !self.core.armed || self.core.gcd_left > 0.0;
        let cooldown_progress = if self.nova_cooldown <= 0.0 {
            1.0
        } else {
            1.0 - self.nova_cooldown / NOVA_COOLDOWN
        };
        let fuse_progress = if self.fuse_left <= 0.0 || self.fuse_duration <= 0.0 {
            0.0
        } else {
            self.fuse_left / self.fuse_duration
        };

        FireTwistState {
            armed: self.core.armed,
            running: self.core.running,
            elapsed: self.core.elapsed,
            mana: self.core.mana.round(),
            mana_max: self.core.mana_max,
            gcd_left: self.core.gcd_left,
            gcd_progress: self.core.gcd_progress(),
            slot: self.slot,
            slot_name: if self.slot == FireSlot::None {
                "None".to_string()
            } else {
                spell.name
            },
            slot_icon: spell.icon,
            nova_cooldown: self.nova_cooldown,
            nova_cooldown_progress: cooldown_progress.clamp(0.0, 1.0),
            fuse_left: self.fuse_left,
            fuse_duration: self.fuse_duration,
            fuse_progress: fuse_progress.clamp(0.0, 1.0),
            talent_points: self.talent_points,
            target_count: self.target_count,
            target_in_range: self.target_in_range,
            preferred_baseline: self.preferred_baseline(),
            speed: self.core.speed,
            coach: self.core.coach_line(self.default_coach()),
            recommendation: self.recommend(),
            can_cast_nova: !locked && self.core.mana >= NOVA_COST,
            can_cast_searing: !locked && self.core.mana >= SEARING_COST,
            can_cast_magma: !locked && self.core.mana >= MAGMA_COST,
            slot_uptime_pct: self.counters.slot_uptime_pct(),
            counters: self.counters.clone(),
            challenge: self.core.challenge.view(),
        }
    }
}

impl TwistEngine for FireTwistEngine {
    type Baseline = FireBaseline;

    fn core(&self) -> &TwistCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TwistCore {
        &mut self.core
    }

    fn start(&mut self) {
        if self.core.arm() {
            self.core.say_for(
                Tone::Info,
                "Ready. Drop baseline first, then Fire Nova when it is ready.",
                2.6,
            );
            debug!("fire lab armed");
        }
    }

    fn reset(&mut self) {
        self.reset_run_state();
        self.core.reset();
        self.counters = FireCounters::default();
        debug!("fire lab reset");
    }

    fn begin_challenge(&mut self) -> Vec<TwistEvent> {
        if self.core.challenge.needs_restart() {
            self.reset_run_state();
        }
        self.start();
        self.core.arm_challenge(RUN_STARTED)
    }

    fn cast_primary(&mut self) -> CastResult {
        if let Err(reason) = self.core.check_cast(NOVA_COST) {
            return self.reject(reason, "Fire Nova");
        }
        if self.nova_cooldown > 0.0 {
            self.counters.wasted_presses += 1;
            let left = self.nova_cooldown;
            self.core.say(
                Tone::Warn,
                format!("Fire Nova not ready, {}s left.", fmt_secs(left, 1)),
            );
            return CastResult::Rejected(RejectReason::OnCooldown { left });
        }
        if !self.target_in_range {
            self.core.say_for(
                Tone::Warn,
                "Target out of range. Fire Nova will miss. Wait for range.",
                2.6,
            );
            return CastResult::Rejected(RejectReason::OutOfRange);
        }

        let mut events = Vec::new();
        self.core.ensure_running(&mut events, RUN_STARTED);

        self.counters.nova_casts += 1;
        self.core.spend(NOVA_COST);

        self.slot = FireSlot::FireNova;
        self.nova_cooldown = NOVA_COOLDOWN;
        self.fuse_duration = fuse_for(self.talent_points);
        self.fuse_left = self.fuse_duration;
        self.nova_dropped_at = Some(self.core.elapsed);
        self.burst_at = None;

        self.core.say(
            Tone::Ok,
            "Fire Nova down. Let it detonate, then replace baseline immediately.",
        );
        CastResult::Accepted
    }

    fn cast_baseline(&mut self, kind: FireBaseline) -> CastResult {
        let cost = kind.cost();
        if let Err(reason) = self.core.check_cast(cost) {
            return self.reject(reason, "that totem");
        }

        let mut events = Vec::new();
        self.core.ensure_running(&mut events, RUN_STARTED);
        let mut failure = None;

        if self.slot == FireSlot::FireNova && self.fuse_left > 0.0 {
            self.counters.cancels += 1;
            let left = self.fuse_left;
            if left >= EARLY_CANCEL_WINDOW {
                self.core.say_for(
                    Tone::Bad,
                    format!(
                        "Too early. You canceled the burst with {}s left.",
                        fmt_secs(left, 1)
                    ),
                    3.0,
                );
            } else {
                self.core.say_for(
                    Tone::Warn,
                    "You replaced Fire Nova before it burst. Let it detonate first.",
                    2.6,
                );
            }
            // The fuse is gone; the cooldown keeps running.
            self.fuse_left = 0.0;
            self.nova_dropped_at = None;
            self.burst_at = None;
            failure = Some(FailReason::NovaCanceled);
        } else if let (FireSlot::None, Some(burst_at)) = (self.slot, self.burst_at) {
            self.burst_at = None;
            let delay = self.core.elapsed - burst_at;
            if delay > LATE_REPLACE {
                self.counters.late_replaces += 1;
                self.counters.late_replace_total += delay;
                self.core.say_for(
                    Tone::Warn,
                    format!(
                        "Late baseline replace, {}s of empty fire slot.",
                        fmt_secs(delay, 1)
                    ),
                    2.6,
                );
                failure = Some(FailReason::LateBaselineReplace);
            } else {
                self.core.say_for(
                    Tone::Ok,
                    "Good. Baseline back down quickly after the burst.",
                    1.8,
                );
            }
        } else {
            self.core.say_for(
                Tone::Info,
                format!(
                    "{} Totem down. Weave Fire Nova when it is ready.",
                    kind.short_name()
                ),
                1.8,
            );
        }

        self.core.spend(cost);
        self.slot = kind.slot();
        self.baseline = kind;

        if let Some(reason) = failure {
            self.core.fail(reason);
        }
        CastResult::Accepted
    }

    fn recommend(&self) -> Recommendation {
        if !self.core.running || self.core.gcd_left > 0.0 {
            return Recommendation::Wait;
        }
        let base = self.preferred_baseline();
        match self.slot {
            FireSlot::None => base.recommendation(),
            FireSlot::FireNova => Recommendation::Wait,
            _ if self.nova_cooldown <= 0.0
                && self.target_in_range
                && self.core.mana >= NOVA_COST =>
            {
                Recommendation::CastPrimary
            }
            slot if slot != base.slot() => base.recommendation(),
            _ => Recommendation::Wait,
        }
    }

    fn step(&mut self, dt: f64) -> Vec<TwistEvent> {
        let mut events = Vec::new();
        if !self.core.running {
            return events;
        }

        self.core.tick(dt);
        self.nova_cooldown = decay(self.nova_cooldown, dt);

        if self.slot == FireSlot::None {
            self.counters.slot_empty_time += dt;
        } else {
            self.counters.slot_uptime += dt;
        }
        if self.slot == self.preferred_baseline().slot() {
            self.counters.baseline_time += dt;
        }

        let was_fusing = self.fuse_left > 0.0;
        self.fuse_left = decay(self.fuse_left, dt);

        if was_fusing && self.fuse_left <= 0.0 && self.slot == FireSlot::FireNova {
            if self.target_in_range {
                self.counters.bursts += 1;
                self.core
                    .say_for(Tone::Ok, "Burst happened. Replace baseline now.", 1.8);
                events.push(TwistEvent::Burst);
            } else {
                self.counters.misses += 1;
                self.core
                    .say_for(Tone::Bad, "Burst missed. Target was out of range.", 2.4);
                events.push(TwistEvent::BurstMissed);
                events.extend(self.core.fail(FailReason::NovaMissed));
            }
            self.burst_at = Some(self.core.elapsed);
            self.nova_dropped_at = None;
            self.slot = FireSlot::None;
        }

        if self.core.challenge.is_running() && self.slot == FireSlot::None {
            if let Some(burst_at) = self.burst_at {
                if self.core.elapsed - burst_at > LATE_REPLACE {
                    events.extend(self.core.fail(FailReason::LateBaselineReplace));
                }
            }
        }

        self.nudge();
        events.extend(self.core.check_completion());
        events
    }
}

impl Animated for FireTwistEngine {
    fn frame(&mut self, now_ms: f64) -> bool {
        self.advance_frame(now_ms);
        self.core.running
    }

    fn halt(&mut self) {
        self.core.halt();
    }
}

/// Everything the fire lab page renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireTwistState {
    pub armed: bool,
    pub running: bool,
    pub elapsed: f64,
    pub mana: f64,
    pub mana_max: f64,
    pub gcd_left: f64,
    pub gcd_progress: f64,
    pub slot: FireSlot,
    pub slot_name: String,
    pub slot_icon: String,
    pub nova_cooldown: f64,
    pub nova_cooldown_progress: f64,
    pub fuse_left: f64,
    pub fuse_duration: f64,
    pub fuse_progress: f64,
    pub talent_points: u8,
    pub target_count: u8,
    pub target_in_range: bool,
    pub preferred_baseline: FireBaseline,
    pub speed: f64,
    pub coach: CoachLine,
    pub recommendation: Recommendation,
    pub can_cast_nova: bool,
    pub can_cast_searing: bool,
    pub can_cast_magma: bool,
    pub slot_uptime_pct: f64,
    pub counters: FireCounters,
    pub challenge: ChallengeView,
}

// =============================================================================
// WASM Bindings
// =============================================================================

/// Fire twisting lab handle for JavaScript.
#[wasm_bindgen]
pub struct FireTwistLab {
    mount: Mounted<FireTwistEngine>,
}

#[wasm_bindgen]
impl FireTwistLab {
    /// Mount from a JSON `FireTwistConfig` (`"{}"` for defaults).
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<FireTwistLab, JsValue> {
        let config: FireTwistConfig = serde_json::from_str(config_json)
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        Ok(FireTwistLab {
            mount: Mounted::mount(FireTwistEngine::new(config)),
        })
    }

    pub fn start(&mut self) {
        if let Some(engine) = self.mount.engine_mut() {
            engine.start();
        }
    }

    pub fn reset(&mut self) {
        if let Some(engine) = self.mount.engine_mut() {
            engine.reset();
        }
    }

    pub fn begin_challenge(&mut self) {
        if let Some(engine) = self.mount.engine_mut() {
            engine.begin_challenge();
        }
    }

    pub fn cast_fire_nova(&mut self) -> bool {
        self.mount
            .engine_mut()
            .map_or(false, |engine| engine.cast_fire_nova().is_accepted())
    }

    pub fn cast_searing(&mut self) -> bool {
        self.mount
            .engine_mut()
            .map_or(false, |engine| engine.cast_searing().is_accepted())
    }

    pub fn cast_magma(&mut self) -> bool {
        self.mount
            .engine_mut()
            .map_or(false, |engine| engine.cast_magma().is_accepted())
    }

    pub fn set_target_in_range(&mut self, in_range: bool) {
        if let Some(engine) = self.mount.engine_mut() {
            engine.set_target_in_range(in_range);
        }
    }

    pub fn set_target_count(&mut self, targets: u8) {
        if let Some(engine) = self.mount.engine_mut() {
            engine.set_target_count(targets);
        }
    }

    pub fn set_talent_points(&mut self, points: u8) {
        if let Some(engine) = self.mount.engine_mut() {
            engine.set_talent_points(points);
        }
    }

    pub fn set_speed_multiplier(&mut self, speed: f64) {
        if let Some(engine) = self.mount.engine_mut() {
            engine.set_speed_multiplier(speed);
        }
    }

    pub fn register_spells(&mut self, json: &str) -> Result<usize, JsValue> {
        match self.mount.engine_mut() {
            Some(engine) => Ok(engine.spells_mut().extend_from_json(json)?),
            None => Ok(0),
        }
    }

    pub fn frame(&mut self, now_ms: f64) -> bool {
        self.mount.frame(now_ms)
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        let engine = self
            .mount
            .engine()
            .ok_or_else(|| EngineError::InvalidConfig("fire lab is unmounted".to_string()))?;
        serde_json::to_string(&engine.state()).map_err(|e| EngineError::from(e).into())
    }

    pub fn unmount(&mut self) {
        self.mount.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twist::{ChallengeStatus, GCD};
    use proptest::prelude::*;

    fn engine_with(points: u8) -> FireTwistEngine {
        FireTwistEngine::new(FireTwistConfig {
            talent_points: points,
            ..FireTwistConfig::default()
        })
    }

    #[test]
    fn fuse_depends_on_talent_points() {
        assert_eq!(fuse_for(0), 4.0);
        assert_eq!(fuse_for(1), 3.0);
        assert_eq!(fuse_for(2), 2.0);
        assert_eq!(engine_with(9).state().talent_points, 2);
    }

    #[test]
    fn nova_bursts_then_late_replace_fails_challenge() {
        let mut engine = engine_with(2);
        engine.begin_challenge();
        assert!(engine.cast_fire_nova().is_accepted());
        assert_eq!(engine.slot(), FireSlot::FireNova);
        assert_eq!(engine.fuse_left(), 2.0);

        let events = engine.advance(2.0);
        assert!(events.contains(&TwistEvent::Burst));
        assert_eq!(engine.slot(), FireSlot::None);
        assert_eq!(engine.counters().bursts, 1);
        assert!(engine.core().challenge.is_running());

        let events = engine.advance(0.76);
        assert!(events.contains(&TwistEvent::ChallengeFailed(FailReason::LateBaselineReplace)));
        assert_eq!(
            engine.core().challenge.status,
            ChallengeStatus::Failed(FailReason::LateBaselineReplace)
        );
        assert!(!engine.core().running);
    }

    #[test]
    fn quick_replace_after_burst_is_praised() {
        let mut engine = engine_with(2);
        engine.begin_challenge();
        engine.cast_fire_nova();
        engine.advance(2.0);
        engine.advance(0.3);
        assert!(engine.cast_searing().is_accepted());
        let coach = engine.state().coach;
        assert_eq!(coach.tone, Tone::Ok);
        assert!(coach.text.starts_with("Good."));
        assert!(engine.core().challenge.is_running());
    }

    #[test]
    fn plain_baseline_drop_replaces_ready_prompt() {
        let mut engine = engine_with(0);
        engine.start();
        assert!(engine.state().coach.text.starts_with("Ready."));

        assert!(engine.cast_searing().is_accepted());
        let coach = engine.state().coach;
        assert_eq!(coach.tone, Tone::Info);
        assert_eq!(coach.text, "Searing Totem down. Weave Fire Nova when it is ready.");

        engine.advance(1.6);
        assert!(engine.cast_magma().is_accepted());
        assert_eq!(
            engine.state().coach.text,
            "Magma Totem down. Weave Fire Nova when it is ready."
        );
        assert_eq!(engine.counters().cancels, 0);
    }

    #[test]
    fn late_replace_outside_challenge_is_counted() {
        let mut engine = engine_with(2);
        engine.start();
        engine.cast_fire_nova();
        engine.advance(3.0);
        assert!(engine.cast_magma().is_accepted());
        assert_eq!(engine.counters().late_replaces, 1);
        assert!((engine.counters().average_late_replace() - 1.0).abs() < 1e-6);
        assert_eq!(engine.slot(), FireSlot::Magma);
    }

    #[test]
    fn cancel_with_long_fuse_is_bad() {
        let mut engine = engine_with(0);
        engine.start();
        engine.cast_fire_nova();
        engine.advance(GCD);
        assert!(engine.cast_searing().is_accepted());
        assert_eq!(engine.counters().cancels, 1);
        assert_eq!(engine.state().coach.tone, Tone::Bad);
        assert_eq!(engine.fuse_left(), 0.0);
        assert!(engine.nova_cooldown() > 0.0);

        // No burst after a cancel.
        let events = engine.advance(3.0);
        assert!(!events.contains(&TwistEvent::Burst));
    }

    #[test]
    fn cancel_near_detonation_is_warn() {
        let mut engine = engine_with(1);
        engine.start();
        engine.cast_fire_nova();
        engine.advance(2.5);
        assert!(engine.cast_searing().is_accepted());
        assert_eq!(engine.counters().cancels, 1);
        assert_eq!(engine.state().coach.tone, Tone::Warn);
    }

    #[test]
    fn cancel_fails_challenge() {
        let mut engine = engine_with(0);
        engine.begin_challenge();
        engine.cast_fire_nova();
        engine.advance(GCD);
        engine.cast_searing();
        assert_eq!(
            engine.core().challenge.status,
            ChallengeStatus::Failed(FailReason::NovaCanceled)
        );
        assert!(!engine.core().armed);
        assert_eq!(engine.core().gcd_left, 0.0);
    }

    #[test]
    fn nova_on_cooldown_is_wasted_press() {
        let mut engine = engine_with(2);
        engine.start();
        engine.cast_fire_nova();
        engine.advance(2.0);
        engine.cast_searing();
        engine.advance(GCD);

        let result = engine.cast_fire_nova();
        assert!(matches!(
            result,
            CastResult::Rejected(RejectReason::OnCooldown { .. })
        ));
        assert_eq!(engine.counters().wasted_presses, 1);
        assert_eq!(engine.counters().nova_casts, 1);
    }

    #[test]
    fn nova_out_of_range_is_rejected() {
        let mut engine = engine_with(0);
        engine.start();
        engine.set_target_in_range(false);
        assert_eq!(
            engine.cast_fire_nova(),
            CastResult::Rejected(RejectReason::OutOfRange)
        );
        assert!(!engine.core().running);
        assert_eq!(engine.core().mana, 100.0);
    }

    #[test]
    fn burst_out_of_range_misses() {
        let mut engine = engine_with(2);
        engine.begin_challenge();
        engine.cast_fire_nova();
        engine.set_target_in_range(false);
        let events = engine.advance(2.0);
        assert!(events.contains(&TwistEvent::BurstMissed));
        assert!(events.contains(&TwistEvent::ChallengeFailed(FailReason::NovaMissed)));
        assert_eq!(engine.counters().misses, 1);
    }

    #[test]
    fn talent_change_rescales_running_fuse() {
        let mut engine = engine_with(0);
        engine.start();
        engine.cast_fire_nova();
        engine.advance(1.0);
        assert!((engine.fuse_left() - 3.0).abs() < 1e-9);

        engine.set_talent_points(2);
        assert_eq!(engine.fuse_duration(), 2.0);
        assert!((engine.fuse_left() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn target_count_selects_baseline() {
        let mut engine = engine_with(0);
        assert_eq!(engine.preferred_baseline(), FireBaseline::Searing);
        engine.set_target_count(3);
        assert_eq!(engine.preferred_baseline(), FireBaseline::Magma);
        assert_eq!(engine.state().coach.text, "Targets set to 3. Baseline is Magma.");
        engine.set_target_count(0);
        assert_eq!(engine.state().target_count, 1);
        engine.set_target_count(9);
        assert_eq!(engine.state().target_count, 4);
    }

    #[test]
    fn recommendation_walks_the_rotation() {
        let mut engine = engine_with(2);
        engine.start();
        assert_eq!(engine.recommend(), Recommendation::Wait);

        engine.cast_searing();
        engine.advance(GCD);
        assert_eq!(engine.recommend(), Recommendation::CastPrimary);

        engine.cast_fire_nova();
        engine.advance(GCD);
        assert_eq!(engine.recommend(), Recommendation::Wait);

        engine.advance(0.5);
        assert_eq!(engine.slot(), FireSlot::None);
        assert_eq!(engine.recommend(), Recommendation::CastBaselineA);

        engine.set_target_count(4);
        assert_eq!(engine.recommend(), Recommendation::CastBaselineB);
        engine.cast_magma();
        engine.advance(GCD);
        assert_eq!(engine.recommend(), Recommendation::Wait);

        engine.set_target_count(1);
        assert_eq!(engine.recommend(), Recommendation::CastBaselineA);
    }

    #[test]
    fn speed_multiplier_scales_frames() {
        let mut engine = engine_with(0);
        engine.set_speed_multiplier(2.0);
        engine.set_speed_multiplier(f64::NAN);
        engine.start();
        engine.cast_searing();
        Animated::frame(&mut engine, 0.0);
        Animated::frame(&mut engine, 25.0);
        assert!((engine.core().elapsed - 0.05).abs() < 1e-9);

        engine.set_speed_multiplier(10.0);
        assert_eq!(engine.state().speed, 3.0);
    }

    #[test]
    fn unmount_stops_the_loop() {
        let mut mount = Mounted::mount(engine_with(0));
        if let Some(engine) = mount.engine_mut() {
            engine.start();
            engine.cast_searing();
        }
        assert!(mount.frame(0.0));
        let engine = mount.unmount().expect("mounted");
        assert!(!engine.core().running);
    }

    mod property_tests {
        use super::*;

        proptest! {
            /// Any cancel counts; the grade depends only on the fuse left.
            #[test]
            fn cancel_grade_follows_fuse_left(points in 0u8..=2, wait in 1.5f64..4.0) {
                let mut engine = engine_with(points);
                engine.start();
                engine.cast_fire_nova();
                engine.advance(wait);
                let left = engine.fuse_left();
                prop_assume!(left > 0.0);

                prop_assert!(engine.cast_searing().is_accepted());
                prop_assert_eq!(engine.counters().cancels, 1);
                let expected = if left >= 0.8 { Tone::Bad } else { Tone::Warn };
                prop_assert_eq!(engine.state().coach.tone, expected);
            }

            /// Mana stays within the pool whatever is pressed.
            #[test]
            fn mana_stays_in_pool(presses in proptest::collection::vec(0u8..4, 1..60)) {
                let mut engine = engine_with(1);
                engine.start();
                for press in presses {
                    match press {
                        0 => { engine.cast_fire_nova(); }
                        1 => { engine.cast_searing(); }
                        2 => { engine.cast_magma(); }
                        _ => { engine.advance(0.7); }
                    }
                    let mana = engine.core().mana;
                    prop_assert!((0.0..=engine.core().mana_max).contains(&mana));
                    prop_assert!(engine.core().gcd_left >= 0.0);
                }
            }
        }
    }
}
