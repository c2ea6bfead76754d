// Air twisting lab: keep Windfury Totem's buff up while Grace of Air holds the slot.
// Windfury applies a 10s buff on cast; swapping back to Grace must happen on the
// next GCD. Refreshing too early wastes mana, refreshing too late drops the buff.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;

use crate::clock::decay;
use crate::lifecycle::{Animated, Mounted};
use crate::registry::SpellRegistry;
use crate::twist::{
    CastResult, ChallengeView, FailReason, Recommendation, RejectReason, TwistCore, TwistEngine,
    TwistEvent, DEFAULT_CHALLENGE_TARGET, DEFAULT_MANA_MAX, GCD,
};
use crate::types::{fmt_secs, CoachLine, Tone};
use crate::EngineError;

pub const WINDFURY_DURATION: f64 = 10.0;
pub const WINDFURY_COST: f64 = 8.0;
pub const GRACE_COST: f64 = 8.0;
/// Refreshing with more than this left is wasted.
const EARLY_REFRESH_WASTE: f64 = 3.0;
const RECOMMEND_REFRESH_AT: f64 = 1.8;
const REFRESH_WARN: f64 = 1.6;
/// Allowance past one GCD for the swap back to Grace.
const GRACE_LATE_ALLOWANCE: f64 = 0.6;
const COACH_HOLD: f64 = 2.4;
const RANGE_HOLD: f64 = 3.0;

const RUN_STARTED: &str = "Run started. Keep Windfury up and swap back to Grace quickly.";
const PRESS_START: &str = "Press Start, then cast Windfury or Grace to begin.";

/// Totem in the air slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AirSlot {
    #[default]
    None,
    Windfury,
    GraceOfAir,
}

impl AirSlot {
    pub fn spell_key(self) -> Option<&'static str> {
        match self {
            AirSlot::None => None,
            AirSlot::Windfury => Some("windfury_totem"),
            AirSlot::GraceOfAir => Some("grace_of_air_totem"),
        }
    }
}

/// Baseline totems for the air slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AirBaseline {
    GraceOfAir,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirTwistConfig {
    #[serde(default = "default_mana_max")]
    pub mana_max: f64,
    /// Seconds a clean run must last. Zero runs until failure.
    #[serde(default = "default_challenge_target")]
    pub challenge_target_secs: f64,
    #[serde(default = "default_true")]
    pub party_in_range: bool,
}

fn default_mana_max() -> f64 {
    DEFAULT_MANA_MAX
}

fn default_challenge_target() -> f64 {
    DEFAULT_CHALLENGE_TARGET
}

fn default_true() -> bool {
    true
}

impl Default for AirTwistConfig {
    fn default() -> Self {
        AirTwistConfig {
            mana_max: default_mana_max(),
            challenge_target_secs: default_challenge_target(),
            party_in_range: true,
        }
    }
}

impl AirTwistConfig {
    pub fn sanitize(mut self) -> Self {
        if !(self.mana_max.is_finite() && self.mana_max > 0.0) {
            warn!(value = self.mana_max, "ignoring mana pool");
            self.mana_max = default_mana_max();
        }
        if !(self.challenge_target_secs.is_finite() && self.challenge_target_secs >= 0.0) {
            warn!(value = self.challenge_target_secs, "ignoring challenge target");
            self.challenge_target_secs = default_challenge_target();
        }
        self
    }
}

/// Run statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirCounters {
    pub windfury_casts: u32,
    pub drops: u32,
    pub downtime: f64,
    pub applied_time: f64,
    /// Time Grace held the slot while Windfury's buff was still up.
    pub grace_time: f64,
    pub wasted_refreshes: u32,
    pub total_casts: u32,
}

impl AirCounters {
    /// Share of tracked time spent twisted (0-100).
    pub fn grace_uptime_pct(&self) -> f64 {
        let total = (self.applied_time + self.downtime).max(0.001);
        (self.grace_time / total * 100.0).round()
    }
}

pub struct AirTwistEngine {
    core: TwistCore,
    slot: AirSlot,
    windfury_left: f64,
    windfury_cast_at: Option<f64>,
    grace_cast_at: Option<f64>,
    windfury_drop_at: Option<f64>,
    party_in_range: bool,
    counters: AirCounters,
    spells: SpellRegistry,
}

impl AirTwistEngine {
    pub fn new(config: AirTwistConfig) -> Self {
        let config = config.sanitize();
        AirTwistEngine {
            core: TwistCore::new(config.mana_max, config.challenge_target_secs, COACH_HOLD),
            slot: AirSlot::None,
            windfury_left: 0.0,
            windfury_cast_at: None,
            grace_cast_at: None,
            windfury_drop_at: None,
            party_in_range: config.party_in_range,
            counters: AirCounters::default(),
            spells: SpellRegistry::shaman(),
        }
    }

    pub fn slot(&self) -> AirSlot {
        self.slot
    }

    pub fn windfury_left(&self) -> f64 {
        self.windfury_left
    }

    pub fn counters(&self) -> &AirCounters {
        &self.counters
    }

    pub fn spells_mut(&mut self) -> &mut SpellRegistry {
        &mut self.spells
    }

    pub fn set_party_in_range(&mut self, in_range: bool) {
        self.party_in_range = in_range;
        if in_range {
            self.core.say_for(
                Tone::Info,
                "Party in range. Resume normal twisting decisions.",
                1.8,
            );
        } else {
            self.core
                .say_for(Tone::Info, "Party out of range. Totems will not apply.", 2.2);
        }
    }

    pub fn cast_windfury(&mut self) -> CastResult {
        self.cast_primary()
    }

    pub fn cast_grace(&mut self) -> CastResult {
        self.cast_baseline(AirBaseline::GraceOfAir)
    }

    fn reject(&mut self, reason: RejectReason, spell: &str) -> CastResult {
        match &reason {
            RejectReason::NotArmed => self.core.say_for(Tone::Info, PRESS_START, 2.2),
            RejectReason::NotEnoughMana { .. } if self.core.running => self
                .core
                .say(Tone::Bad, format!("Not enough mana for {spell}.")),
            _ => {}
        }
        CastResult::Rejected(reason)
    }

    /// Clear the run but keep counters and challenge history.
    fn reset_run_state(&mut self) {
        self.core.reset_run();
        self.slot = AirSlot::None;
        self.windfury_left = 0.0;
        self.windfury_cast_at = None;
        self.grace_cast_at = None;
        self.windfury_drop_at = None;
    }

    fn default_coach(&self) -> &'static str {
        if !self.party_in_range {
            "Party out of range. Totems will not apply."
        } else if !self.core.armed {
            PRESS_START
        } else if !self.core.running {
            "Ready. Cast Windfury or Grace to begin."
        } else {
            "Goal: refresh Windfury before it drops, then swap back to Grace on the next GCD."
        }
    }

    fn nudge(&mut self) {
        if !self.core.running || self.core.coach.is_holding() || !self.party_in_range {
            return;
        }
        if self.core.gcd_left > 0.0 {
            return;
        }

        let now = self.core.elapsed;
        if self.windfury_left <= 0.0 {
            self.core
                .say_for(Tone::Bad, "Windfury is down. Cast Windfury now.", 1.8);
        } else if self.windfury_left <= REFRESH_WARN {
            if self.slot != AirSlot::Windfury {
                let text = format!(
                    "Windfury expires in {}s. Refresh now.",
                    fmt_secs(self.windfury_left, 1)
                );
                self.core.say_for(Tone::Warn, text, 1.6);
            }
        } else if self.slot == AirSlot::Windfury {
            let sitting = self
                .windfury_cast_at
                .map_or(false, |at| now - at >= GRACE_LATE_ALLOWANCE);
            if sitting {
                self.core
                    .say_for(Tone::Warn, "Windfury applied. Swap back to Grace of Air.", 1.8);
            }
        }
    }

    pub fn state(&self) -> AirTwistState {
        let spell = self
            .slot
            .spell_key()
            .map(|key| self.spells.lookup(key))
            .unwrap_or_else(|| self.spells.lookup("air_totem"));
        let locked = !self.core.armed || self.core.gcd_left > 0.0;

        AirTwistState {
            armed: self.core.armed,
            running: self.core.running,
            elapsed: self.core.elapsed,
            mana: self.core.mana.round(),
            mana_max: self.core.mana_max,
            gcd_left: self.core.gcd_left,
            gcd_progress: self.core.gcd_progress(),
            slot: self.slot,
            slot_name: if self.slot == AirSlot::None {
                "None".to_string()
            } else {
                spell.name
            },
            slot_icon: spell.icon,
            windfury_left: self.windfury_left,
            windfury_progress: (self.windfury_left / WINDFURY_DURATION).clamp(0.0, 1.0),
            party_in_range: self.party_in_range,
            coach: self.core.coach_line(self.default_coach()),
            recommendation: self.recommend(),
            can_cast_windfury: !locked && self.core.mana >= WINDFURY_COST,
            can_cast_grace: !locked && self.core.mana >= GRACE_COST,
            grace_uptime_pct: self.counters.grace_uptime_pct(),
            counters: self.counters.clone(),
            challenge: self.core.challenge.view(),
        }
    }
}

impl TwistEngine for AirTwistEngine {
    type Baseline = AirBaseline;

    fn core(&self) -> &TwistCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TwistCore {
        &mut self.core
    }

    fn start(&mut self) {
        if self.core.arm() {
            self.core
                .say_for(Tone::Info, "Ready. Cast Windfury or Grace to begin.", 3.0);
            debug!("air lab armed");
        }
    }

    fn reset(&mut self) {
        self.reset_run_state();
        self.core.reset();
        self.counters = AirCounters::default();
        debug!("air lab reset");
    }

    fn begin_challenge(&mut self) -> Vec<TwistEvent> {
        if self.core.challenge.needs_restart() {
            self.reset_run_state();
        }
        self.start();
        self.core.arm_challenge(RUN_STARTED)
    }

    fn cast_primary(&mut self) -> CastResult {
        if let Err(reason) = self.core.check_cast(WINDFURY_COST) {
            return self.reject(reason, "Windfury");
        }

        let mut events = Vec::new();
        self.core.ensure_running(&mut events, RUN_STARTED);

        self.counters.windfury_casts += 1;
        self.counters.total_casts += 1;
        self.core.spend(WINDFURY_COST);

        let now = self.core.elapsed;
        let left_before = self.windfury_left;
        let mut failure = None;

        if let Some(dropped_at) = self.windfury_drop_at.take() {
            let down = now - dropped_at;
            let tone = if down > GRACE_LATE_ALLOWANCE {
                Tone::Bad
            } else {
                Tone::Warn
            };
            self.core.say(
                tone,
                format!(
                    "Windfury dropped for {}s. Refresh earlier next time.",
                    fmt_secs(down, 1)
                ),
            );
        } else if left_before > EARLY_REFRESH_WASTE {
            self.counters.wasted_refreshes += 1;
            self.core.say(
                Tone::Warn,
                format!(
                    "Early refresh, {}s still left. Try to wait longer.",
                    fmt_secs(left_before, 1)
                ),
            );
            failure = Some(FailReason::WindfuryRefreshedEarly { left: left_before });
        } else {
            self.core
                .say(Tone::Ok, "Windfury refreshed. Next cast Grace of Air.");
        }

        self.windfury_cast_at = Some(now);
        self.slot = AirSlot::Windfury;

        if self.party_in_range {
            self.windfury_left = WINDFURY_DURATION;
        } else {
            // The totem still drops; the buff does not reach the party.
            self.core.say_for(
                Tone::Warn,
                "Party out of range. Windfury did not apply.",
                RANGE_HOLD,
            );
            failure.get_or_insert(FailReason::WindfuryMissed);
        }

        if let Some(reason) = failure {
            self.core.fail(reason);
        }
        CastResult::Accepted
    }

    fn cast_baseline(&mut self, kind: AirBaseline) -> CastResult {
        let AirBaseline::GraceOfAir = kind;
        if let Err(reason) = self.core.check_cast(GRACE_COST) {
            return self.reject(reason, "Grace of Air");
        }

        let mut events = Vec::new();
        self.core.ensure_running(&mut events, RUN_STARTED);

        self.counters.total_casts += 1;
        self.core.spend(GRACE_COST);

        let now = self.core.elapsed;
        self.slot = AirSlot::GraceOfAir;
        self.grace_cast_at = Some(now);
        let mut failure = None;

        match self.windfury_cast_at {
            Some(cast_at) => {
                let delay = now - cast_at;
                if delay > GCD + GRACE_LATE_ALLOWANCE {
                    self.core.say(
                        Tone::Warn,
                        format!(
                            "Late swap back, Grace came {}s after Windfury. Aim for the next GCD.",
                            fmt_secs(delay, 1)
                        ),
                    );
                    failure = Some(FailReason::LateSwapBack);
                } else {
                    self.core.say(
                        Tone::Ok,
                        "Good swap back. Track Windfury and refresh before it expires.",
                    );
                }
            }
            None => self.core.say(
                Tone::Info,
                "Grace down. Track Windfury and refresh before it expires.",
            ),
        }

        if !self.party_in_range {
            self.core.say_for(
                Tone::Warn,
                "Party out of range. Totem effects will not apply.",
                RANGE_HOLD,
            );
        }

        if let Some(reason) = failure {
            self.core.fail(reason);
        }
        CastResult::Accepted
    }

    fn recommend(&self) -> Recommendation {
        if !self.core.running || !self.party_in_range || self.core.gcd_left > 0.0 {
            return Recommendation::Wait;
        }
        if self.windfury_left <= RECOMMEND_REFRESH_AT {
            return Recommendation::CastPrimary;
        }
        if self.slot != AirSlot::GraceOfAir {
            return Recommendation::CastBaselineA;
        }
        Recommendation::Wait
    }

    fn step(&mut self, dt: f64) -> Vec<TwistEvent> {
        let mut events = Vec::new();
        if !self.core.running {
            return events;
        }

        self.core.tick(dt);
        let now = self.core.elapsed;

        let was_up = self.windfury_left > 0.0;
        self.windfury_left = decay(self.windfury_left, dt);
        let is_up = self.windfury_left > 0.0;

        if is_up {
            self.counters.applied_time += dt;
        } else {
            self.counters.downtime += dt;
        }
        if self.slot == AirSlot::GraceOfAir && is_up {
            self.counters.grace_time += dt;
        }

        if was_up && !is_up {
            self.counters.drops += 1;
            self.windfury_drop_at = Some(now);
            self.core.say_for(
                Tone::Bad,
                "Windfury dropped. Cast Windfury as soon as GCD allows.",
                3.0,
            );
            events.push(TwistEvent::WindfuryDropped);
            events.extend(self.core.fail(FailReason::WindfuryDropped));
        }

        // Sitting on Windfury past the swap-back window.
        if self.core.challenge.is_running()
            && self.party_in_range
            && self.slot == AirSlot::Windfury
            && self.core.gcd_left <= 0.0
            && self.windfury_left > REFRESH_WARN
        {
            let late = self
                .windfury_cast_at
                .map_or(false, |at| now - at > GCD + GRACE_LATE_ALLOWANCE);
            if late {
                events.extend(self.core.fail(FailReason::LateSwapBack));
            }
        }

        self.nudge();
        events.extend(self.core.check_completion());
        events
    }
}

impl Animated for AirTwistEngine {
    fn frame(&mut self, now_ms: f64) -> bool {
        self.advance_frame(now_ms);
        self.core.running
    }

    fn halt(&mut self) {
        self.core.halt();
    }
}

/// Everything the air lab page renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirTwistState {
    pub armed: bool,
    pub running: bool,
    pub elapsed: f64,
    pub mana: f64,
    pub mana_max: f64,
    pub gcd_left: f64,
    pub gcd_progress: f64,
    pub slot: AirSlot,
    pub slot_name: String,
    pub slot_icon: String,
    pub windfury_left: f64,
    pub windfury_progress: f64,
    pub party_in_range: bool,
    pub coach: CoachLine,
    pub recommendation: Recommendation,
    pub can_cast_windfury: bool,
    pub can_cast_grace: bool,
    pub grace_uptime_pct: f64,
    pub counters: AirCounters,
    pub challenge: ChallengeView,
}

// =============================================================================
// WASM Bindings
// =============================================================================

/// Air twisting lab handle for JavaScript.
#[wasm_bindgen]
pub struct AirTwistLab {
    mount: Mounted<AirTwistEngine>,
}

#[wasm_bindgen]
impl AirTwistLab {
    /// Mount from a JSON `AirTwistConfig` (`"{}"` for defaults).
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<AirTwistLab, JsValue> {
        let config: AirTwistConfig = serde_json::from_str(config_json)
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        Ok(AirTwistLab {
            mount: Mounted::mount(AirTwistEngine::new(config)),
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

    pub fn cast_windfury(&mut self) -> bool {
        self.mount
            .engine_mut()
            .map_or(false, |engine| engine.cast_windfury().is_accepted())
    }

    pub fn cast_grace(&mut self) -> bool {
        self.mount
            .engine_mut()
            .map_or(false, |engine| engine.cast_grace().is_accepted())
    }

    pub fn set_party_in_range(&mut self, in_range: bool) {
        if let Some(engine) = self.mount.engine_mut() {
            engine.set_party_in_range(in_range);
        }
    }

    /// Merge extra spell names/icons from JSON.
    pub fn register_spells(&mut self, json: &str) -> Result<usize, JsValue> {
        match self.mount.engine_mut() {
            Some(engine) => Ok(engine.spells_mut().extend_from_json(json)?),
            None => Ok(0),
        }
    }

    /// Advance one animation frame. Keep scheduling while this returns true.
    pub fn frame(&mut self, now_ms: f64) -> bool {
        self.mount.frame(now_ms)
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        let engine = self
            .mount
            .engine()
            .ok_or_else(|| EngineError::InvalidConfig("air lab is unmounted".to_string()))?;
        serde_json::to_string(&engine.state()).map_err(|e| EngineError::from(e).into())
    }

    pub fn unmount(&mut self) {
        self.mount.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twist::ChallengeStatus;

    fn armed() -> AirTwistEngine {
        let mut engine = AirTwistEngine::new(AirTwistConfig::default());
        engine.start();
        engine
    }

    #[test]
    fn cast_before_start_is_rejected() {
        let mut engine = AirTwistEngine::new(AirTwistConfig::default());
        assert_eq!(
            engine.cast_windfury(),
            CastResult::Rejected(RejectReason::NotArmed)
        );
        assert_eq!(engine.state().coach.text, PRESS_START);
        assert_eq!(engine.core().mana, 100.0);
    }

    #[test]
    fn windfury_applies_buff_and_triggers_gcd() {
        let mut engine = armed();
        assert!(engine.cast_windfury().is_accepted());
        assert!(engine.core().running);
        assert_eq!(engine.windfury_left(), WINDFURY_DURATION);
        assert_eq!(engine.core().mana, 92.0);
        assert_eq!(engine.slot(), AirSlot::Windfury);

        assert_eq!(
            engine.cast_grace(),
            CastResult::Rejected(RejectReason::GlobalCooldown { left: GCD })
        );

        engine.advance(GCD);
        assert!(engine.cast_grace().is_accepted());
        assert_eq!(engine.slot(), AirSlot::GraceOfAir);
        assert_eq!(engine.state().coach.tone, Tone::Ok);
    }

    #[test]
    fn early_refresh_is_wasted_and_ends_challenge() {
        let mut engine = AirTwistEngine::new(AirTwistConfig::default());
        engine.begin_challenge();
        assert!(engine.cast_windfury().is_accepted());
        assert!(engine.core().challenge.is_running());

        engine.advance(GCD);
        assert!(engine.cast_windfury().is_accepted());

        assert_eq!(engine.counters().wasted_refreshes, 1);
        match &engine.core().challenge.status {
            ChallengeStatus::Failed(reason) => {
                assert!(reason.to_string().contains("refreshed too early"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!engine.core().running);
        let best = engine.core().challenge.best.expect("failed run records a time");
        assert!((best - GCD).abs() < 1e-9);
    }

    #[test]
    fn early_refresh_outside_challenge_only_counts() {
        let mut engine = armed();
        engine.cast_windfury();
        engine.advance(GCD);
        engine.cast_windfury();
        assert_eq!(engine.counters().wasted_refreshes, 1);
        assert!(engine.core().running);
    }

    #[test]
    fn windfury_drop_fails_challenge() {
        let mut engine = AirTwistEngine::new(AirTwistConfig {
            challenge_target_secs: 0.0,
            ..AirTwistConfig::default()
        });
        engine.begin_challenge();
        engine.cast_windfury();
        engine.advance(GCD);
        engine.cast_grace();

        let events = engine.advance(WINDFURY_DURATION);
        assert!(events.contains(&TwistEvent::WindfuryDropped));
        assert!(events.contains(&TwistEvent::ChallengeFailed(FailReason::WindfuryDropped)));
        assert_eq!(engine.counters().drops, 1);
    }

    #[test]
    fn drop_outside_challenge_reports_recovery_delay() {
        let mut engine = armed();
        engine.cast_windfury();
        engine.advance(GCD);
        engine.cast_grace();
        engine.advance(WINDFURY_DURATION - GCD + 1.0);
        assert_eq!(engine.counters().drops, 1);

        engine.cast_windfury();
        let coach = engine.state().coach;
        assert_eq!(coach.tone, Tone::Bad);
        assert!(coach.text.starts_with("Windfury dropped for 1.0s"));
    }

    #[test]
    fn late_swap_back_fails_from_frame_check() {
        let mut engine = AirTwistEngine::new(AirTwistConfig::default());
        engine.begin_challenge();
        engine.cast_windfury();
        let events = engine.advance(GCD + GRACE_LATE_ALLOWANCE + 0.1);
        assert!(events.contains(&TwistEvent::ChallengeFailed(FailReason::LateSwapBack)));
    }

    #[test]
    fn out_of_range_windfury_spends_but_does_not_apply() {
        let mut engine = AirTwistEngine::new(AirTwistConfig::default());
        engine.set_party_in_range(false);
        engine.begin_challenge();
        assert!(engine.cast_windfury().is_accepted());
        assert_eq!(engine.windfury_left(), 0.0);
        assert_eq!(engine.core().mana, 92.0);
        assert_eq!(
            engine.core().challenge.status,
            ChallengeStatus::Failed(FailReason::WindfuryMissed)
        );
    }

    #[test]
    fn not_enough_mana_is_rejected() {
        let mut engine = AirTwistEngine::new(AirTwistConfig {
            mana_max: 10.0,
            ..AirTwistConfig::default()
        });
        engine.start();
        engine.cast_windfury();
        engine.advance(GCD);
        assert_eq!(
            engine.cast_grace(),
            CastResult::Rejected(RejectReason::NotEnoughMana {
                cost: GRACE_COST,
                mana: 2.0
            })
        );
        assert_eq!(engine.state().coach.text, "Not enough mana for Grace of Air.");
    }

    #[test]
    fn recommendation_follows_buff_state() {
        let mut engine = armed();
        assert_eq!(engine.recommend(), Recommendation::Wait);

        engine.cast_windfury();
        assert_eq!(engine.recommend(), Recommendation::Wait);
        engine.advance(GCD);
        assert_eq!(engine.recommend(), Recommendation::CastBaselineA);

        engine.cast_grace();
        engine.advance(GCD);
        assert_eq!(engine.recommend(), Recommendation::Wait);

        engine.advance(WINDFURY_DURATION - 2.0 * GCD - RECOMMEND_REFRESH_AT + 0.1);
        assert_eq!(engine.recommend(), Recommendation::CastPrimary);

        engine.set_party_in_range(false);
        assert_eq!(engine.recommend(), Recommendation::Wait);
    }

    #[test]
    fn clean_twisting_completes_challenge() {
        let mut engine = AirTwistEngine::new(AirTwistConfig {
            challenge_target_secs: 20.0,
            ..AirTwistConfig::default()
        });
        engine.begin_challenge();

        let mut completed = false;
        for _ in 0..4 {
            assert!(engine.cast_windfury().is_accepted());
            engine.advance(GCD);
            assert!(engine.cast_grace().is_accepted());
            let events = engine.advance(WINDFURY_DURATION - GCD - 1.7);
            if events
                .iter()
                .any(|e| matches!(e, TwistEvent::ChallengeCompleted { .. }))
            {
                completed = true;
                break;
            }
        }
        assert!(completed);
        assert_eq!(engine.core().challenge.completions, 1);
        assert_eq!(engine.counters().wasted_refreshes, 0);
        assert_eq!(engine.counters().drops, 0);
    }

    #[test]
    fn restarting_challenge_keeps_counters() {
        let mut engine = AirTwistEngine::new(AirTwistConfig::default());
        engine.begin_challenge();
        engine.cast_windfury();
        engine.advance(GCD);
        engine.cast_windfury();
        assert!(matches!(
            engine.core().challenge.status,
            ChallengeStatus::Failed(_)
        ));

        engine.begin_challenge();
        assert!(engine.core().challenge.is_armed());
        assert!(engine.core().armed);
        assert_eq!(engine.windfury_left(), 0.0);
        assert_eq!(engine.counters().wasted_refreshes, 1);
        assert_eq!(engine.state().challenge.status, "Ready");
    }

    #[test]
    fn reset_clears_everything() {
        let mut engine = armed();
        engine.cast_windfury();
        engine.advance(3.0);
        engine.reset();
        let state = engine.state();
        assert!(!state.armed);
        assert_eq!(state.elapsed, 0.0);
        assert_eq!(state.mana, 100.0);
        assert_eq!(state.counters, AirCounters::default());
        assert_eq!(state.slot_name, "None");
        assert_eq!(state.challenge.status, "Idle");
    }

    #[test]
    fn frames_drive_the_loop() {
        let mut engine = armed();
        engine.cast_windfury();
        assert!(Animated::frame(&mut engine, 1_000.0));
        Animated::frame(&mut engine, 1_040.0);
        assert!((engine.core().elapsed - 0.04).abs() < 1e-9);
        // Tab in the background: the step is clamped.
        Animated::frame(&mut engine, 9_000.0);
        assert!((engine.core().elapsed - 0.09).abs() < 1e-9);
    }

    #[test]
    fn state_names_active_totem() {
        let mut engine = armed();
        engine.cast_windfury();
        let state = engine.state();
        assert_eq!(state.slot_name, "Windfury Totem");
        assert!(state.slot_icon.contains("spell_nature_windfury"));
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"slot\":\"windfury\""));
    }
}
