// Swing timing lab: two independent weapon swing timers and their sync state.
// Practice mode shows the live main hand / off hand delta; challenge mode asks
// for a number of clean syncs (off hand lands within 0.5s after main hand).

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;

use crate::clock::PhaseClock;
use crate::lifecycle::{Animated, Mounted};
use crate::procs::ProcState;
use crate::types::{fmt_secs, Feed, FeedEntry, Hand, Tone};
use crate::EngineError;

/// Two swings closer than this count as synced (seconds).
pub const SYNC_WINDOW: f64 = 0.5;
pub const DEFAULT_ROUNDS: u32 = 10;
/// Tolerance when pairing a swing with its anchor.
const PAIR_EPSILON: f64 = 0.004;
/// Forced desyncs land at least this far outside the window.
pub const DESYNC_MARGIN: f64 = 0.15;
const DESYNC_ATTEMPTS: u32 = 60;
/// Phase the slower-period hand is parked at when random desync gives up.
const DESYNC_FALLBACK_PHASE: f64 = 0.98;
const MAX_LATENCY_MS: f64 = 350.0;
/// The off-hand macro only works once the swing is past this phase.
const DELAY_MIN_PHASE: f64 = 0.5;
const FEED_LEN: usize = 8;
/// Half-width of the delta meter (seconds).
const DELTA_METER_RANGE: f64 = 1.5;

// =============================================================================
// Configuration
// =============================================================================

/// Which way the swing dots travel on screen. Timing math is unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VisualDirection {
    /// Start on the right, hit on the left.
    #[default]
    Rtl,
    Ltr,
}

impl VisualDirection {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rtl" => Some(VisualDirection::Rtl),
            "ltr" => Some(VisualDirection::Ltr),
            _ => None,
        }
    }

    /// Horizontal dot position (0-1) for a swing phase.
    pub fn dot_position(self, phase: f64) -> f64 {
        let p = phase.clamp(0.0, 1.0);
        let p = match self {
            VisualDirection::Rtl => 1.0 - p,
            VisualDirection::Ltr => p,
        };
        p.clamp(0.005, 0.995)
    }

    /// Track end labels, left then right.
    pub fn track_labels(self) -> (&'static str, &'static str) {
        match self {
            VisualDirection::Rtl => ("Hit", "Start"),
            VisualDirection::Ltr => ("Start", "Hit"),
        }
    }
}

/// Swing lab configuration passed from JS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwingConfig {
    /// Main hand weapon speed (seconds per swing).
    #[serde(default = "default_weapon_speed")]
    pub main_hand_speed: f64,
    /// Off hand weapon speed (seconds per swing).
    #[serde(default = "default_weapon_speed")]
    pub off_hand_speed: f64,
    /// Input latency applied to the off-hand macro (milliseconds).
    #[serde(default = "default_latency_ms")]
    pub latency_ms: f64,
    #[serde(default)]
    pub direction: VisualDirection,
    /// Clean syncs needed to finish a challenge.
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    /// Seed for desync and proc rolls.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_weapon_speed() -> f64 {
    2.6
}

fn default_latency_ms() -> f64 {
    60.0
}

fn default_rounds() -> u32 {
    DEFAULT_ROUNDS
}

impl Default for SwingConfig {
    fn default() -> Self {
        SwingConfig {
            main_hand_speed: default_weapon_speed(),
            off_hand_speed: default_weapon_speed(),
            latency_ms: default_latency_ms(),
            direction: VisualDirection::default(),
            rounds: default_rounds(),
            seed: None,
        }
    }
}

impl SwingConfig {
    /// Replace out-of-range values with defaults.
    pub fn sanitize(mut self) -> Self {
        if !valid_speed(self.main_hand_speed) {
            warn!(value = self.main_hand_speed, "ignoring main hand speed");
            self.main_hand_speed = default_weapon_speed();
        }
        if !valid_speed(self.off_hand_speed) {
            warn!(value = self.off_hand_speed, "ignoring off hand speed");
            self.off_hand_speed = default_weapon_speed();
        }
        if !valid_latency(self.latency_ms) {
            warn!(value = self.latency_ms, "ignoring latency");
            self.latency_ms = default_latency_ms();
        }
        if self.rounds == 0 {
            self.rounds = default_rounds();
        }
        self
    }
}

fn valid_speed(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn valid_latency(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

// =============================================================================
// Sync classification
// =============================================================================

/// Sync classification of the current main hand / off hand pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncClass {
    InWindowMainHandLeads,
    InWindowOffHandLeads,
    OutOfWindow,
}

impl SyncClass {
    pub fn label(self) -> &'static str {
        match self {
            SyncClass::InWindowMainHandLeads => "In window, main hand leads",
            SyncClass::InWindowOffHandLeads => "In window, off hand leads",
            SyncClass::OutOfWindow => "Out of window",
        }
    }

    /// Status tone: good when main hand leads, warn when off hand leads.
    pub fn tone(self) -> Tone {
        match self {
            SyncClass::InWindowMainHandLeads => Tone::Ok,
            SyncClass::InWindowOffHandLeads => Tone::Warn,
            SyncClass::OutOfWindow => Tone::Bad,
        }
    }
}

/// Live sync reading. `delta` is off hand minus main hand (seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    pub delta: f64,
    pub abs_delta: f64,
    pub label: String,
    pub class: SyncClass,
}

impl SyncSnapshot {
    pub fn from_delta(delta: f64) -> Self {
        let abs_delta = delta.abs();
        let class = if abs_delta <= SYNC_WINDOW {
            if delta >= 0.0 {
                SyncClass::InWindowMainHandLeads
            } else {
                SyncClass::InWindowOffHandLeads
            }
        } else {
            SyncClass::OutOfWindow
        };
        SyncSnapshot {
            delta,
            abs_delta,
            label: class.label().to_string(),
            class,
        }
    }

    /// Needle position (0-1) on the delta meter.
    pub fn meter_position(&self) -> f64 {
        (self.delta.clamp(-DELTA_METER_RANGE, DELTA_METER_RANGE) + DELTA_METER_RANGE)
            / (2.0 * DELTA_METER_RANGE)
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Something that happened during a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SwingEvent {
    Swing { hand: Hand, at: f64 },
    RoundWon { round: u32, offset: f64 },
    ChallengeComplete { elapsed: f64, new_best: bool },
    OffHandDelayed { at: f64 },
    DelayTooEarly { phase: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwingMode {
    Idle,
    Practice,
    Challenge,
}

/// The most recent unpaired swing.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PairAnchor {
    hand: Hand,
    at: f64,
}

#[derive(Debug, Clone)]
struct SyncChallenge {
    round: u32,
    total_rounds: u32,
    started_at: f64,
    /// Latched main hand swing waiting for an off hand partner.
    pending_main_hand: Option<f64>,
}

pub struct SwingEngine {
    config: SwingConfig,
    main: PhaseClock,
    off: PhaseClock,
    prev_main_phase: f64,
    prev_off_phase: f64,
    last_swing_main: Option<f64>,
    last_swing_off: Option<f64>,
    anchor: Option<PairAnchor>,
    running: bool,
    challenge: Option<SyncChallenge>,
    challenge_result: String,
    last_completion: Option<f64>,
    best_time: Option<f64>,
    /// Fire time of the outstanding off-hand macro, if any.
    pending_delay: Option<f64>,
    procs: ProcState,
    feed: Feed,
    snapshot: SyncSnapshot,
    status: String,
    last_now: f64,
    rng: ChaCha8Rng,
}

impl SwingEngine {
    pub fn new(config: SwingConfig, now: f64) -> Self {
        let config = config.sanitize();
        let rng = ChaCha8Rng::seed_from_u64(config.seed.unwrap_or(0x5EED_5EED));
        let main = PhaseClock::new(now, config.main_hand_speed);
        let off = PhaseClock::new(now, config.off_hand_speed);

        SwingEngine {
            config,
            main,
            off,
            prev_main_phase: 0.0,
            prev_off_phase: 0.0,
            last_swing_main: None,
            last_swing_off: None,
            anchor: None,
            running: false,
            challenge: None,
            challenge_result: String::new(),
            last_completion: None,
            best_time: None,
            pending_delay: None,
            procs: ProcState::default(),
            feed: Feed::with_capacity(FEED_LEN),
            snapshot: SyncSnapshot::from_delta(0.0),
            status: "Ready".to_string(),
            last_now: now,
            rng,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn snapshot(&self) -> &SyncSnapshot {
        &self.snapshot
    }

    pub fn best_time(&self) -> Option<f64> {
        self.best_time
    }

    pub fn config(&self) -> &SwingConfig {
        &self.config
    }

    pub fn mode(&self) -> SwingMode {
        match (self.running, self.challenge.is_some()) {
            (false, _) => SwingMode::Idle,
            (true, true) => SwingMode::Challenge,
            (true, false) => SwingMode::Practice,
        }
    }

    /// Update timings. Invalid values are ignored and the last good value kept.
    pub fn configure(
        &mut self,
        main_hand_speed: f64,
        off_hand_speed: f64,
        latency_ms: f64,
        direction: VisualDirection,
        now: f64,
    ) {
        if valid_speed(main_hand_speed) && self.main.retime(now, main_hand_speed) {
            self.config.main_hand_speed = main_hand_speed;
        } else {
            warn!(value = main_hand_speed, "ignoring main hand speed");
        }
        if valid_speed(off_hand_speed) && self.off.retime(now, off_hand_speed) {
            self.config.off_hand_speed = off_hand_speed;
        } else {
            warn!(value = off_hand_speed, "ignoring off hand speed");
        }
        if valid_latency(latency_ms) {
            self.config.latency_ms = latency_ms;
        } else {
            warn!(value = latency_ms, "ignoring latency");
        }
        self.config.direction = direction;
    }

    /// Both hands restart at phase 0 and the loop begins. Ends any challenge.
    pub fn start_practice(&mut self, now: f64) {
        self.challenge = None;
        self.challenge_result.clear();
        self.reset_procs();

        self.main.restart(now);
        self.off.restart(now);
        self.prev_main_phase = 0.0;
        self.prev_off_phase = 0.0;
        self.reset_swing_memory();
        self.pending_delay = None;

        self.running = true;
        self.feed.push(Tone::Info, "Practice started");
        debug!("swing practice started");
        self.publish(now);
    }

    /// Take over the loop and play `total_rounds` rounds, each from a forced desync.
    pub fn start_challenge(&mut self, now: f64, total_rounds: u32) {
        let total_rounds = if total_rounds == 0 {
            self.config.rounds
        } else {
            total_rounds
        };

        self.reset_procs();
        self.pending_delay = None;
        self.challenge_result.clear();
        self.challenge = Some(SyncChallenge {
            round: 0,
            total_rounds,
            started_at: now,
            pending_main_hand: None,
        });

        self.feed.push(
            Tone::Info,
            format!("Challenge started. Earn {total_rounds} clean syncs."),
        );
        self.feed
            .push(Tone::Info, "Score condition: MH hit then OH hit within 0.5s.");

        self.running = true;
        debug!(total_rounds, "swing challenge started");
        self.next_round(now);
        self.publish(now);
    }

    /// Throw both hands out of sync. Starts practice if idle.
    pub fn force_desync(&mut self, now: f64) -> &SyncSnapshot {
        if !self.running {
            self.start_practice(now);
        }

        self.randomize_out_of_sync(now);
        self.reset_swing_memory();
        self.prev_main_phase = self.main.phase_at(now);
        self.prev_off_phase = self.off.phase_at(now);
        self.publish(now);

        if self.challenge.is_some() {
            self.challenge_result = "Manual desync applied".to_string();
        }
        self.feed.push(Tone::Warn, "Desync applied. Hands randomized.");
        &self.snapshot
    }

    /// Queue the off-hand macro. It lands after the configured latency.
    /// A second request replaces the outstanding one.
    pub fn apply_latency_delay_to_off_hand(&mut self, now: f64) -> bool {
        if !self.running {
            return false;
        }
        let delay = self.config.latency_ms.clamp(0.0, MAX_LATENCY_MS) / 1000.0;
        if self.pending_delay.is_some() {
            debug!("replacing pending off hand delay");
        }
        self.pending_delay = Some(now + delay);
        true
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.challenge = None;
        self.pending_delay = None;
        self.status = "Stopped".to_string();
        debug!("swing lab stopped");
    }

    /// Back to idle: loop stopped, clocks at phase 0, memory and feed cleared.
    pub fn reset(&mut self, now: f64) {
        self.running = false;
        self.challenge = None;
        self.challenge_result.clear();
        self.last_completion = None;
        self.pending_delay = None;

        self.main.restart(now);
        self.off.restart(now);
        self.prev_main_phase = 0.0;
        self.prev_off_phase = 0.0;
        self.reset_swing_memory();
        self.reset_procs();

        self.snapshot = SyncSnapshot::from_delta(0.0);
        self.status = "Ready".to_string();
        self.last_now = now;
    }

    /// Restart the current drill without stopping: a new drift for the
    /// current challenge round, or both hands back to phase 0 in practice.
    pub fn restart_round(&mut self, now: f64) {
        if !self.running {
            return;
        }
        self.main.restart(now);
        self.off.restart(now);
        self.reset_swing_memory();

        if let Some(round) = self.challenge.as_ref().map(|c| c.round) {
            self.randomize_out_of_sync(now);
            self.reset_swing_memory();
            self.feed.push(Tone::Warn, format!("Round {round}: reset"));
        } else {
            self.feed.push(Tone::Info, "Reset");
        }
        self.prev_main_phase = self.main.phase_at(now);
        self.prev_off_phase = self.off.phase_at(now);
        self.publish(now);
    }

    /// Feed a swing that did not come from the clocks (replays, tests).
    pub fn inject_swing(&mut self, hand: Hand, at: f64) -> Vec<SwingEvent> {
        let mut events = Vec::new();
        if !self.running {
            return events;
        }
        self.on_swing(hand, at, &mut events);
        self.publish(at);
        events
    }

    /// Per-frame update.
    pub fn tick(&mut self, now: f64) -> Vec<SwingEvent> {
        let mut events = Vec::new();
        if !self.running {
            return events;
        }

        self.run_pending_delay(now, &mut events);

        let main_phase = self.main.phase_at(now);
        let off_phase = self.off.phase_at(now);

        if main_phase < self.prev_main_phase {
            self.on_swing(Hand::MainHand, now, &mut events);
        }
        if off_phase < self.prev_off_phase {
            self.on_swing(Hand::OffHand, now, &mut events);
        }

        // A scored round re-randomizes the clocks, so read them again.
        self.prev_main_phase = self.main.phase_at(now);
        self.prev_off_phase = self.off.phase_at(now);

        self.publish(now);
        events
    }

    pub fn state(&self) -> SwingState {
        let now = self.last_now;
        let direction = self.config.direction;
        let hand_state = |clock: &PhaseClock| {
            let phase = clock.phase_at(now);
            HandState {
                phase,
                speed: clock.period(),
                next_swing_in: clock.next_swing_in(now),
                dot_position: direction.dot_position(phase),
            }
        };

        let challenge = match &self.challenge {
            Some(c) => ChallengeView {
                active: true,
                round: c.round,
                total_rounds: c.total_rounds,
                elapsed: now - c.started_at,
                best: self.best_time,
                result: self.challenge_result.clone(),
            },
            None => ChallengeView {
                active: false,
                round: 0,
                total_rounds: self.config.rounds,
                elapsed: self.last_completion.unwrap_or(0.0),
                best: self.best_time,
                result: self.challenge_result.clone(),
            },
        };

        SwingState {
            mode: self.mode(),
            running: self.running,
            main_hand: hand_state(&self.main),
            off_hand: hand_state(&self.off),
            sync: self.snapshot.clone(),
            delta_text: format!("{}s", fmt_secs(self.snapshot.delta, 3)),
            meter_position: self.snapshot.meter_position(),
            status: self.status.clone(),
            challenge,
            flurry_charges: self.procs.flurry_charges,
            windfury: self.procs.windfury_label(now),
            feed: self.feed.entries().cloned().collect(),
            latency_ms: self.config.latency_ms,
            direction,
        }
    }

    fn reset_procs(&mut self) {
        self.procs.reset();
        self.feed.clear();
    }

    fn reset_swing_memory(&mut self) {
        self.last_swing_main = None;
        self.last_swing_off = None;
        self.anchor = None;
        if let Some(challenge) = self.challenge.as_mut() {
            challenge.pending_main_hand = None;
        }
    }

    /// Randomize both phases until the next swings are outside the window.
    /// Returns false when the fixed fallback offset was used.
    fn randomize_out_of_sync(&mut self, now: f64) -> bool {
        let main_period = self.main.period();
        let off_period = self.off.period();

        for _ in 0..DESYNC_ATTEMPTS {
            let main_phase: f64 = self.rng.gen();
            let off_phase: f64 = self.rng.gen();
            let main_next = (1.0 - main_phase) * main_period;
            let off_next = (1.0 - off_phase) * off_period;

            if (off_next - main_next).abs() > SYNC_WINDOW + DESYNC_MARGIN {
                self.main.set_phase(now, main_phase);
                self.off.set_phase(now, off_phase);
                return true;
            }
        }

        // The slower hand restarts while the other is about to land.
        if main_period >= off_period {
            self.main.set_phase(now, 0.0);
            self.off.set_phase(now, DESYNC_FALLBACK_PHASE);
        } else {
            self.off.set_phase(now, 0.0);
            self.main.set_phase(now, DESYNC_FALLBACK_PHASE);
        }
        debug!("desync fell back to fixed offset");
        false
    }

    fn next_round(&mut self, now: f64) {
        let Some(challenge) = self.challenge.as_mut() else {
            return;
        };
        challenge.round += 1;
        let round = challenge.round;
        self.challenge_result.clear();

        self.randomize_out_of_sync(now);
        self.reset_swing_memory();
        self.prev_main_phase = self.main.phase_at(now);
        self.prev_off_phase = self.off.phase_at(now);

        self.feed.push(Tone::Warn, format!("Round {round}: drift applied"));
    }

    fn finish_challenge(&mut self, now: f64, events: &mut Vec<SwingEvent>) {
        let Some(challenge) = self.challenge.take() else {
            return;
        };
        let elapsed = now - challenge.started_at;
        let new_best = self.best_time.map_or(true, |best| elapsed < best);
        if new_best {
            self.best_time = Some(elapsed);
        }
        self.last_completion = Some(elapsed);

        let label = format!("Completed in {}s", fmt_secs(elapsed, 2));
        self.feed.push(Tone::Ok, label.clone());
        match self.best_time {
            Some(best) if new_best => self
                .feed
                .push(Tone::Ok, format!("New best: {}s", fmt_secs(best, 2))),
            Some(best) => self
                .feed
                .push(Tone::Info, format!("Best: {}s", fmt_secs(best, 2))),
            None => {}
        }
        self.challenge_result = label;

        self.running = false;
        self.pending_delay = None;
        self.status = "Challenge complete".to_string();
        debug!(elapsed, new_best, "swing challenge complete");
        events.push(SwingEvent::ChallengeComplete { elapsed, new_best });
    }

    fn run_pending_delay(&mut self, now: f64, events: &mut Vec<SwingEvent>) {
        match self.pending_delay {
            Some(fire_at) if now >= fire_at => self.pending_delay = None,
            _ => return,
        }

        let phase = self.off.phase_at(now);
        if phase <= DELAY_MIN_PHASE {
            let message = "Too early. Wait until off hand passes midpoint.";
            if self.challenge.is_some() {
                self.challenge_result = message.to_string();
            }
            self.feed.push(Tone::Warn, message);
            events.push(SwingEvent::DelayTooEarly { phase });
            return;
        }

        self.off.set_phase(now, DELAY_MIN_PHASE);
        // Pulling the phase back is not a swing.
        self.prev_off_phase = self.off.phase_at(now);
        if self.challenge.is_some() {
            self.challenge_result = "Macro tap applied".to_string();
        }
        events.push(SwingEvent::OffHandDelayed { at: now });
    }

    fn on_swing(&mut self, hand: Hand, at: f64, events: &mut Vec<SwingEvent>) {
        match hand {
            Hand::MainHand => self.last_swing_main = Some(at),
            Hand::OffHand => self.last_swing_off = Some(at),
        }
        self.update_anchor(hand, at);
        events.push(SwingEvent::Swing { hand, at });

        match hand {
            Hand::MainHand => {
                if let Some(challenge) = self.challenge.as_mut() {
                    challenge.pending_main_hand = Some(at);
                }
            }
            Hand::OffHand => self.score_off_hand(at, events),
        }

        self.procs.on_swing(hand, at, &mut self.rng, &mut self.feed);
    }

    fn update_anchor(&mut self, hand: Hand, at: f64) {
        if let Some(anchor) = self.anchor {
            if anchor.hand != hand && at - anchor.at <= SYNC_WINDOW + PAIR_EPSILON {
                // Pair completed; the second hit does not open a new anchor.
                self.anchor = None;
                return;
            }
        }
        self.anchor = Some(PairAnchor { hand, at });
    }

    fn score_off_hand(&mut self, at: f64, events: &mut Vec<SwingEvent>) {
        let Some(challenge) = self.challenge.as_mut() else {
            return;
        };
        let Some(main_at) = challenge.pending_main_hand else {
            return;
        };

        let offset = at - main_at;
        if !(0.0..SYNC_WINDOW).contains(&offset) {
            return;
        }
        challenge.pending_main_hand = None;
        let round = challenge.round;
        let finished = round >= challenge.total_rounds;

        self.feed.push(
            Tone::Ok,
            format!("Score. Off hand after main hand by {}s", fmt_secs(offset, 3)),
        );
        events.push(SwingEvent::RoundWon { round, offset });

        if finished {
            self.finish_challenge(at, events);
        } else {
            self.next_round(at);
        }
    }

    /// Off hand minus main hand, preferring a fresh anchor over next-swing times.
    fn live_delta(&mut self, now: f64, main_next_at: f64, off_next_at: f64) -> f64 {
        if let Some(anchor) = self.anchor {
            if now - anchor.at > SYNC_WINDOW + PAIR_EPSILON {
                self.anchor = None;
            } else {
                let partner_swung = match anchor.hand {
                    Hand::MainHand => self.last_swing_off,
                    Hand::OffHand => self.last_swing_main,
                }
                .map_or(false, |at| at >= anchor.at - PAIR_EPSILON);

                if !partner_swung {
                    return match anchor.hand {
                        Hand::MainHand => off_next_at - anchor.at,
                        Hand::OffHand => anchor.at - main_next_at,
                    };
                }
                self.anchor = None;
            }
        }
        off_next_at - main_next_at
    }

    fn publish(&mut self, now: f64) {
        let main_next_at = self.main.next_swing_at(now);
        let off_next_at = self.off.next_swing_at(now);
        let delta = self.live_delta(now, main_next_at, off_next_at);
        self.snapshot = SyncSnapshot::from_delta(delta);
        if self.running {
            self.status = self.snapshot.label.clone();
        }
        self.last_now = now;
    }
}

impl Animated for SwingEngine {
    fn frame(&mut self, now_ms: f64) -> bool {
        self.tick(now_ms / 1000.0);
        self.running
    }

    fn halt(&mut self) {
        self.stop();
    }
}

/// Per-hand readout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandState {
    pub phase: f64,
    pub speed: f64,
    pub next_swing_in: f64,
    pub dot_position: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeView {
    pub active: bool,
    pub round: u32,
    pub total_rounds: u32,
    pub elapsed: f64,
    pub best: Option<f64>,
    pub result: String,
}

/// Everything the swing lab page renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingState {
    pub mode: SwingMode,
    pub running: bool,
    pub main_hand: HandState,
    pub off_hand: HandState,
    pub sync: SyncSnapshot,
    pub delta_text: String,
    pub meter_position: f64,
    pub status: String,
    pub challenge: ChallengeView,
    pub flurry_charges: u8,
    pub windfury: String,
    pub feed: Vec<FeedEntry>,
    pub latency_ms: f64,
    pub direction: VisualDirection,
}

// =============================================================================
// WASM Bindings
// =============================================================================

/// Swing lab handle for JavaScript. Times are `performance.now()` milliseconds.
#[wasm_bindgen]
pub struct SwingLab {
    mount: Mounted<SwingEngine>,
}

#[wasm_bindgen]
impl SwingLab {
    /// Mount a swing lab from a JSON `SwingConfig`.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str, now_ms: f64) -> Result<SwingLab, JsValue> {
        let mut config: SwingConfig = serde_json::from_str(config_json)
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        if config.seed.is_none() {
            config.seed = Some(crate::host_seed());
        }
        Ok(SwingLab {
            mount: Mounted::mount(SwingEngine::new(config, now_ms / 1000.0)),
        })
    }

    pub fn configure(
        &mut self,
        main_hand_speed: f64,
        off_hand_speed: f64,
        latency_ms: f64,
        direction: &str,
        now_ms: f64,
    ) {
        if let Some(engine) = self.mount.engine_mut() {
            let direction = VisualDirection::parse(direction).unwrap_or(engine.config.direction);
            engine.configure(
                main_hand_speed,
                off_hand_speed,
                latency_ms,
                direction,
                now_ms / 1000.0,
            );
        }
    }

    pub fn start_practice(&mut self, now_ms: f64) {
        if let Some(engine) = self.mount.engine_mut() {
            engine.start_practice(now_ms / 1000.0);
        }
    }

    pub fn start_challenge(&mut self, now_ms: f64, rounds: u32) {
        if let Some(engine) = self.mount.engine_mut() {
            engine.start_challenge(now_ms / 1000.0, rounds);
        }
    }

    pub fn force_desync(&mut self, now_ms: f64) {
        if let Some(engine) = self.mount.engine_mut() {
            engine.force_desync(now_ms / 1000.0);
        }
    }

    pub fn delay_off_hand(&mut self, now_ms: f64) -> bool {
        self.mount
            .engine_mut()
            .map_or(false, |engine| engine.apply_latency_delay_to_off_hand(now_ms / 1000.0))
    }

    pub fn restart_round(&mut self, now_ms: f64) {
        if let Some(engine) = self.mount.engine_mut() {
            engine.restart_round(now_ms / 1000.0);
        }
    }

    pub fn stop(&mut self) {
        if let Some(engine) = self.mount.engine_mut() {
            engine.stop();
        }
    }

    pub fn reset(&mut self, now_ms: f64) {
        if let Some(engine) = self.mount.engine_mut() {
            engine.reset(now_ms / 1000.0);
        }
    }

    /// Advance one animation frame. Keep scheduling while this returns true.
    pub fn frame(&mut self, now_ms: f64) -> bool {
        self.mount.frame(now_ms)
    }

    /// Current `SwingState` as JSON.
    pub fn state_json(&self) -> Result<String, JsValue> {
        let engine = self
            .mount
            .engine()
            .ok_or_else(|| EngineError::InvalidConfig("swing lab is unmounted".to_string()))?;
        serde_json::to_string(&engine.state()).map_err(|e| EngineError::from(e).into())
    }

    /// Stop the loop and release the engine.
    pub fn unmount(&mut self) {
        self.mount.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn seeded(seed: u64) -> SwingConfig {
        SwingConfig {
            seed: Some(seed),
            ..SwingConfig::default()
        }
    }

    /// Step the engine at ~60fps from `from` to `to`, collecting events.
    fn run(engine: &mut SwingEngine, from: f64, to: f64) -> Vec<SwingEvent> {
        let mut events = Vec::new();
        let mut t = from;
        while t < to {
            t = (t + 1.0 / 60.0).min(to);
            events.extend(engine.tick(t));
        }
        events
    }

    #[test]
    fn classification_is_exclusive() {
        assert_eq!(
            SyncSnapshot::from_delta(0.2).class,
            SyncClass::InWindowMainHandLeads
        );
        assert_eq!(
            SyncSnapshot::from_delta(-0.2).class,
            SyncClass::InWindowOffHandLeads
        );
        assert_eq!(SyncSnapshot::from_delta(0.5).class, SyncClass::InWindowMainHandLeads);
        assert_eq!(SyncSnapshot::from_delta(-0.51).class, SyncClass::OutOfWindow);
        assert_eq!(SyncSnapshot::from_delta(0.0).meter_position(), 0.5);
        assert_eq!(SyncSnapshot::from_delta(9.0).meter_position(), 1.0);
    }

    #[test]
    fn desync_falls_back_when_window_cannot_be_cleared() {
        let mut engine = SwingEngine::new(
            SwingConfig {
                main_hand_speed: 0.5,
                off_hand_speed: 0.4,
                ..seeded(3)
            },
            0.0,
        );
        assert!(!engine.randomize_out_of_sync(1.0));
        assert!(engine.main.phase_at(1.0).abs() < 1e-9);
        assert!((engine.off.phase_at(1.0) - 0.98).abs() < 1e-9);

        let mut engine = SwingEngine::new(
            SwingConfig {
                main_hand_speed: 0.3,
                off_hand_speed: 0.6,
                ..seeded(3)
            },
            0.0,
        );
        assert!(!engine.randomize_out_of_sync(1.0));
        assert!(engine.off.phase_at(1.0).abs() < 1e-9);
        assert!((engine.main.phase_at(1.0) - 0.98).abs() < 1e-9);
    }

    #[test]
    fn practice_detects_swings_each_period() {
        let mut engine = SwingEngine::new(seeded(1), 0.0);
        engine.configure(2.0, 3.0, 60.0, VisualDirection::Rtl, 0.0);
        engine.start_practice(0.0);

        let events = run(&mut engine, 0.0, 6.1);
        let main_swings = events
            .iter()
            .filter(|e| matches!(e, SwingEvent::Swing { hand: Hand::MainHand, .. }))
            .count();
        let off_swings = events
            .iter()
            .filter(|e| matches!(e, SwingEvent::Swing { hand: Hand::OffHand, .. }))
            .count();
        assert_eq!(main_swings, 3);
        assert_eq!(off_swings, 2);
    }

    #[test]
    fn invalid_configuration_keeps_last_good_values() {
        let mut engine = SwingEngine::new(seeded(1), 0.0);
        engine.configure(1.8, 1.5, 120.0, VisualDirection::Ltr, 0.0);
        engine.configure(0.0, -2.0, -5.0, VisualDirection::Ltr, 0.0);
        engine.configure(f64::NAN, f64::INFINITY, f64::NAN, VisualDirection::Ltr, 0.0);

        assert_eq!(engine.config().main_hand_speed, 1.8);
        assert_eq!(engine.config().off_hand_speed, 1.5);
        assert_eq!(engine.config().latency_ms, 120.0);
        assert_eq!(engine.config().direction, VisualDirection::Ltr);
    }

    #[test]
    fn main_hand_swing_latches_anchor_for_in_window_off_hand() {
        let mut engine = SwingEngine::new(seeded(3), 0.0);
        engine.configure(2.6, 2.6, 60.0, VisualDirection::Rtl, 0.0);
        engine.start_practice(0.0);

        // Off hand trails the main hand by 0.3s.
        engine.off.restart(0.3);
        engine.prev_off_phase = 0.0;

        // Just before the main hand lands, compare next swings.
        engine.tick(2.55);
        assert_eq!(
            engine.snapshot().class,
            SyncClass::InWindowMainHandLeads
        );

        // The main hand wraps: without the anchor the delta would be about -2.3s.
        let events = engine.tick(2.61);
        assert!(events
            .iter()
            .any(|e| matches!(e, SwingEvent::Swing { hand: Hand::MainHand, .. })));
        let snapshot = engine.snapshot().clone();
        assert_eq!(snapshot.class, SyncClass::InWindowMainHandLeads);
        assert!((snapshot.delta - 0.29).abs() < 0.02, "delta {}", snapshot.delta);
    }

    #[test]
    fn synthetic_main_hand_swing_leaves_out_of_window() {
        let mut engine = SwingEngine::new(seeded(5), 0.0);
        engine.configure(2.6, 2.6, 60.0, VisualDirection::Rtl, 0.0);
        engine.start_practice(0.0);

        // Main hand next at 2.6, off hand next at 0.4: out of window.
        engine.off.set_phase(0.0, 1.0 - 0.4 / 2.6);
        engine.prev_off_phase = engine.off.phase_at(0.0);
        engine.tick(0.0);
        assert_eq!(engine.snapshot().class, SyncClass::OutOfWindow);

        // A main hand swing now pairs with the off hand landing 0.4s later.
        engine.inject_swing(Hand::MainHand, 0.0);
        let snapshot = engine.snapshot();
        assert_ne!(snapshot.class, SyncClass::OutOfWindow);
        assert!((snapshot.delta - 0.4).abs() < 1e-9);
    }

    #[test]
    fn anchor_expires_after_window() {
        let mut engine = SwingEngine::new(seeded(5), 0.0);
        engine.start_practice(0.0);
        engine.off.set_phase(0.0, 0.5);
        engine.prev_off_phase = engine.off.phase_at(0.0);

        engine.inject_swing(Hand::MainHand, 0.0);
        engine.tick(0.6);
        assert!(engine.anchor.is_none());
    }

    #[test]
    fn completed_pair_clears_anchor() {
        let mut engine = SwingEngine::new(seeded(5), 0.0);
        engine.start_practice(0.0);
        engine.inject_swing(Hand::MainHand, 1.0);
        assert!(engine.anchor.is_some());
        engine.inject_swing(Hand::OffHand, 1.2);
        assert!(engine.anchor.is_none());
    }

    #[test]
    fn latency_delay_sets_off_hand_to_midpoint() {
        let mut engine = SwingEngine::new(seeded(9), 0.0);
        engine.configure(2.6, 2.6, 100.0, VisualDirection::Rtl, 0.0);
        engine.start_practice(0.0);
        run(&mut engine, 0.0, 2.0);

        assert!(engine.apply_latency_delay_to_off_hand(2.0));
        let events = run(&mut engine, 2.0, 2.15);
        assert!(events
            .iter()
            .any(|e| matches!(e, SwingEvent::OffHandDelayed { .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, SwingEvent::Swing { hand: Hand::OffHand, .. })));

        let off_phase = engine.state().off_hand.phase;
        assert!(off_phase > 0.5 && off_phase < 0.53, "phase {off_phase}");
    }

    #[test]
    fn latency_delay_too_early_is_a_no_op() {
        let mut engine = SwingEngine::new(seeded(9), 0.0);
        engine.configure(2.6, 2.6, 60.0, VisualDirection::Rtl, 0.0);
        engine.start_practice(0.0);
        run(&mut engine, 0.0, 0.5);

        let start_before = engine.off.start();
        assert!(engine.apply_latency_delay_to_off_hand(0.5));
        let events = run(&mut engine, 0.5, 0.7);
        assert!(events
            .iter()
            .any(|e| matches!(e, SwingEvent::DelayTooEarly { .. })));
        assert_eq!(engine.off.start(), start_before);
        assert_eq!(
            engine.feed.latest().map(|e| e.text.as_str()),
            Some("Too early. Wait until off hand passes midpoint.")
        );
    }

    #[test]
    fn second_delay_request_replaces_the_first() {
        let mut engine = SwingEngine::new(seeded(9), 0.0);
        engine.configure(2.6, 2.6, 200.0, VisualDirection::Rtl, 0.0);
        engine.start_practice(0.0);
        assert!(engine.apply_latency_delay_to_off_hand(1.5));
        assert!(engine.apply_latency_delay_to_off_hand(1.6));
        let fire_at = engine.pending_delay.expect("delay pending");
        assert!((fire_at - 1.8).abs() < 1e-9);
    }

    #[test]
    fn delay_requires_running_loop() {
        let mut engine = SwingEngine::new(seeded(9), 0.0);
        assert!(!engine.apply_latency_delay_to_off_hand(0.0));
    }

    #[test]
    fn latency_is_clamped_to_350ms() {
        let mut engine = SwingEngine::new(seeded(9), 0.0);
        engine.configure(2.6, 2.6, 5_000.0, VisualDirection::Rtl, 0.0);
        engine.start_practice(0.0);
        engine.apply_latency_delay_to_off_hand(1.0);
        let fire_at = engine.pending_delay.unwrap();
        assert!((fire_at - 1.35).abs() < 1e-9);
    }

    #[test]
    fn desync_starts_practice_when_idle() {
        let mut engine = SwingEngine::new(seeded(11), 0.0);
        let snapshot = engine.force_desync(1.0).clone();
        assert!(engine.is_running());
        assert_eq!(snapshot.class, SyncClass::OutOfWindow);
        assert!(snapshot.abs_delta > SYNC_WINDOW + DESYNC_MARGIN);
    }

    #[test]
    fn desync_fallback_when_periods_leave_no_room() {
        let mut engine = SwingEngine::new(seeded(11), 0.0);
        engine.configure(0.3, 0.3, 60.0, VisualDirection::Rtl, 0.0);
        engine.start_practice(0.0);
        assert!(!engine.randomize_out_of_sync(1.0));
        assert_eq!(engine.main.phase_at(1.0), 0.0);
    }

    #[test]
    fn challenge_scores_rounds_and_records_best() {
        let mut engine = SwingEngine::new(seeded(21), 0.0);
        engine.configure(2.6, 2.6, 60.0, VisualDirection::Rtl, 0.0);
        engine.start_challenge(0.0, 2);
        assert_eq!(engine.mode(), SwingMode::Challenge);

        let mut t = 0.0;
        let mut all = Vec::new();
        for round in 1..=2 {
            // Line the off hand up 0.2s behind the main hand.
            let main_next = engine.main.next_swing_in(t);
            engine.off.set_phase(t, 1.0 - (main_next + 0.2) / 2.6);
            engine.prev_off_phase = engine.off.phase_at(t);
            let events = run(&mut engine, t, t + main_next + 0.3);
            assert!(
                events
                    .iter()
                    .any(|e| matches!(e, SwingEvent::RoundWon { round: r, .. } if *r == round)),
                "round {round} not won"
            );
            t += main_next + 0.3;
            all.extend(events);
        }

        let complete = all.iter().find_map(|e| match e {
            SwingEvent::ChallengeComplete { elapsed, new_best } => Some((*elapsed, *new_best)),
            _ => None,
        });
        let (elapsed, new_best) = complete.expect("challenge completes");
        assert!(new_best);
        assert_eq!(engine.best_time(), Some(elapsed));
        assert!(!engine.is_running());
        assert_eq!(engine.state().status, "Challenge complete");
    }

    #[test]
    fn off_hand_before_main_hand_does_not_score() {
        let mut engine = SwingEngine::new(seeded(21), 0.0);
        engine.start_challenge(0.0, 3);
        let events = engine.inject_swing(Hand::OffHand, 1.0);
        assert!(!events.iter().any(|e| matches!(e, SwingEvent::RoundWon { .. })));

        engine.inject_swing(Hand::MainHand, 2.0);
        let events = engine.inject_swing(Hand::OffHand, 2.6);
        assert!(!events.iter().any(|e| matches!(e, SwingEvent::RoundWon { .. })));

        engine.inject_swing(Hand::MainHand, 4.0);
        let events = engine.inject_swing(Hand::OffHand, 4.1);
        assert!(events.iter().any(|e| matches!(e, SwingEvent::RoundWon { round: 1, .. })));
    }

    #[test]
    fn stop_and_reset_return_to_idle() {
        let mut engine = SwingEngine::new(seeded(2), 0.0);
        engine.start_challenge(0.0, 10);
        engine.apply_latency_delay_to_off_hand(0.1);
        engine.stop();
        assert_eq!(engine.mode(), SwingMode::Idle);
        assert!(engine.pending_delay.is_none());
        assert!(engine.tick(1.0).is_empty());
        assert_eq!(engine.state().status, "Stopped");

        engine.start_practice(2.0);
        run(&mut engine, 2.0, 3.0);
        engine.reset(3.0);
        let state = engine.state();
        assert_eq!(state.mode, SwingMode::Idle);
        assert_eq!(state.main_hand.phase, 0.0);
        assert_eq!(state.challenge.elapsed, 0.0);
        assert_eq!(state.status, "Ready");
    }

    #[test]
    fn restart_round_redrifts_current_round() {
        let mut engine = SwingEngine::new(seeded(4), 0.0);
        engine.start_challenge(0.0, 10);
        engine.restart_round(1.0);
        assert_eq!(engine.state().challenge.round, 1);
        assert_eq!(
            engine.feed.latest().map(|e| e.text.as_str()),
            Some("Round 1: reset")
        );
        assert_eq!(engine.snapshot().class, SyncClass::OutOfWindow);
    }

    #[test]
    fn state_reflects_visual_direction() {
        let mut engine = SwingEngine::new(seeded(4), 0.0);
        engine.start_practice(0.0);
        engine.tick(0.65);
        let rtl = engine.state();
        assert!((rtl.main_hand.dot_position - 0.75).abs() < 1e-9);

        engine.configure(2.6, 2.6, 60.0, VisualDirection::Ltr, 0.65);
        let ltr = engine.state();
        assert!((ltr.main_hand.dot_position - 0.25).abs() < 1e-9);
        assert_eq!(VisualDirection::Rtl.track_labels(), ("Hit", "Start"));
    }

    #[test]
    fn swing_state_serializes() {
        let mut engine = SwingEngine::new(seeded(4), 0.0);
        engine.start_practice(0.0);
        engine.tick(0.5);
        let json = serde_json::to_string(&engine.state()).unwrap();
        assert!(json.contains("\"mode\":\"Practice\""));
        assert!(json.contains("\"flurry_charges\""));
    }

    #[test]
    fn config_json_uses_defaults() {
        let config: SwingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.main_hand_speed, 2.6);
        assert_eq!(config.rounds, DEFAULT_ROUNDS);
        let config: SwingConfig =
            serde_json::from_str(r#"{"main_hand_speed":-1,"direction":"ltr","rounds":0}"#).unwrap();
        let config = config.sanitize();
        assert_eq!(config.main_hand_speed, 2.6);
        assert_eq!(config.direction, VisualDirection::Ltr);
        assert_eq!(config.rounds, DEFAULT_ROUNDS);
    }

    #[test]
    fn unmount_halts_loop() {
        let mut mount = Mounted::mount(SwingEngine::new(seeded(4), 0.0));
        if let Some(engine) = mount.engine_mut() {
            engine.start_practice(0.0);
        }
        assert!(mount.frame(16.0));
        let engine = mount.unmount().expect("mounted");
        assert!(!engine.is_running());
        assert!(!mount.frame(32.0));
    }

    mod property_tests {
        use super::*;

        proptest! {
            /// Forced desync always lands outside the window plus margin.
            #[test]
            fn force_desync_lands_outside_window(
                seed in any::<u64>(),
                main in 1.0f64..4.0,
                off in 1.0f64..4.0,
                now in 0.0f64..10_000.0,
            ) {
                let mut engine = SwingEngine::new(seeded(seed), now);
                engine.configure(main, off, 60.0, VisualDirection::Rtl, now);
                let snapshot = engine.force_desync(now).clone();
                prop_assert!(
                    snapshot.abs_delta > SYNC_WINDOW + DESYNC_MARGIN - 1e-9,
                    "delta {} for periods {} / {}", snapshot.delta, main, off
                );
            }

            /// Both phases stay in [0, 1) while the loop runs.
            #[test]
            fn phases_stay_in_range_while_running(
                seed in any::<u64>(),
                main in 0.1f64..5.0,
                off in 0.1f64..5.0,
                steps in 1usize..200,
            ) {
                let mut engine = SwingEngine::new(seeded(seed), 0.0);
                engine.configure(main, off, 60.0, VisualDirection::Rtl, 0.0);
                engine.start_practice(0.0);
                let mut t = 0.0;
                for _ in 0..steps {
                    t += 0.037;
                    engine.tick(t);
                    let state = engine.state();
                    prop_assert!((0.0..1.0).contains(&state.main_hand.phase));
                    prop_assert!((0.0..1.0).contains(&state.off_hand.phase));
                }
            }
        }
    }
}
