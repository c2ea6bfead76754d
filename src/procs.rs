// Flurry and Windfury proc feed for the swing lab.
// Illustrative only, not a combat simulation: it makes the cost of a desynced
// off hand visible (off-hand swings eating Flurry charges, off-hand procs).

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{Feed, Hand, Tone};

const FLURRY_MAX_CHARGES: u8 = 3;
const FLURRY_CONSUME_WINDOW: f64 = 0.5;
const WINDFURY_ICD: f64 = 3.0;
const WINDFURY_PROC_CHANCE: f64 = 0.22;
const CRIT_CHANCE_MAIN_HAND: f64 = 0.28;
const CRIT_CHANCE_OFF_HAND: f64 = 0.20;
/// Fraction of the crit chance that refreshes Flurry while charges remain.
const REFRESH_WHILE_UP: f64 = 0.35;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcState {
    pub flurry_charges: u8,
    last_flurry_consume: Option<f64>,
    windfury_icd_until: f64,
}

impl Default for ProcState {
    fn default() -> Self {
        ProcState {
            flurry_charges: FLURRY_MAX_CHARGES,
            last_flurry_consume: None,
            windfury_icd_until: 0.0,
        }
    }
}

impl ProcState {
    pub fn reset(&mut self) {
        *self = ProcState::default();
    }

    /// Seconds left on the Windfury internal cooldown at `now`.
    pub fn windfury_icd_left(&self, now: f64) -> f64 {
        (self.windfury_icd_until - now).max(0.0)
    }

    /// "Ready" or "ICD 1.23s".
    pub fn windfury_label(&self, now: f64) -> String {
        let left = self.windfury_icd_left(now);
        if left <= 0.0 {
            "Ready".to_string()
        } else {
            format!("ICD {left:.2}s")
        }
    }

    /// Roll crit, Flurry consumption and Windfury for one swing.
    pub fn on_swing<R: Rng>(&mut self, hand: Hand, at: f64, rng: &mut R, feed: &mut Feed) {
        self.roll_crit(hand, rng, feed);
        self.consume_flurry(hand, at, feed);
        self.roll_windfury(hand, at, rng, feed);
    }

    fn roll_crit<R: Rng>(&mut self, hand: Hand, rng: &mut R, feed: &mut Feed) {
        let roll: f64 = rng.gen();
        let chance = match hand {
            Hand::MainHand => CRIT_CHANCE_MAIN_HAND,
            Hand::OffHand => CRIT_CHANCE_OFF_HAND,
        };

        if self.flurry_charges == 0 && roll < chance {
            self.flurry_charges = FLURRY_MAX_CHARGES;
            feed.push(Tone::Ok, format!("Crit on {hand}. Flurry refreshed to 3 charges"));
        } else if self.flurry_charges > 0 && roll < chance * REFRESH_WHILE_UP {
            self.flurry_charges = FLURRY_MAX_CHARGES;
            feed.push(Tone::Ok, format!("Crit on {hand}. Flurry refreshed"));
        }
    }

    fn consume_flurry(&mut self, hand: Hand, at: f64, feed: &mut Feed) {
        if self.flurry_charges == 0 {
            return;
        }
        let ready = self
            .last_flurry_consume
            .map_or(true, |last| at - last >= FLURRY_CONSUME_WINDOW);
        if !ready {
            return;
        }

        self.flurry_charges -= 1;
        self.last_flurry_consume = Some(at);
        let tone = match hand {
            Hand::MainHand => Tone::Ok,
            Hand::OffHand => Tone::Bad,
        };
        feed.push(
            tone,
            format!("Flurry charge consumed by {hand}. {} left", self.flurry_charges),
        );
        if self.flurry_charges == 0 {
            feed.push(Tone::Info, "Flurry faded");
        }
    }

    fn roll_windfury<R: Rng>(&mut self, hand: Hand, at: f64, rng: &mut R, feed: &mut Feed) {
        if at < self.windfury_icd_until {
            return;
        }
        if rng.gen_bool(WINDFURY_PROC_CHANCE) {
            self.windfury_icd_until = at + WINDFURY_ICD;
            let tone = match hand {
                Hand::MainHand => Tone::Ok,
                Hand::OffHand => Tone::Bad,
            };
            feed.push(tone, format!("Windfury proc on {hand}"));
        }
    }
}
