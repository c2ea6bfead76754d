// totem_lab_engine: Rust/WASM engine for the Enhancement Shaman trainer labs.
// Swing sync, air and fire totem twisting, talent builds. The host page owns
// the DOM and the animation loop; all timing and scoring lives here.

mod clock;
mod error;
mod procs;
mod types;

pub mod air;
pub mod fire;
pub mod lifecycle;
pub mod registry;
pub mod swing;
pub mod talent;
pub mod talent_data;
pub mod twist;

use wasm_bindgen::prelude::*;

pub use air::{AirTwistConfig, AirTwistEngine, AirTwistLab};
pub use clock::{FrameClock, PhaseClock};
pub use error::EngineError;
pub use fire::{FireTwistConfig, FireTwistEngine, FireTwistLab};
pub use lifecycle::{Animated, Mounted};
pub use procs::ProcState;
pub use registry::{SpellRegistry, TooltipRegistry};
pub use swing::{SwingConfig, SwingEngine, SwingLab};
pub use talent::{TalentBuild, TalentIndex, TalentLab, TalentPlanner};
pub use twist::{CastResult, FailReason, Recommendation, TwistEngine, TwistEvent};
pub use types::*;

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Seed for engines whose config leaves it unset.
#[cfg(target_arch = "wasm32")]
pub(crate) fn host_seed() -> u64 {
    (js_sys::Math::random() * 9_007_199_254_740_992.0) as u64
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn host_seed() -> u64 {
    0x5EED_7073_E3A1
}
