// Shared vocabulary for the trainer engines: hands, coaching tones, feed lines.
// Times are f64 seconds of simulated or wall time supplied by the host.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Weapon hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hand {
    MainHand,
    OffHand,
}

impl Hand {
    pub fn other(self) -> Hand {
        match self {
            Hand::MainHand => Hand::OffHand,
            Hand::OffHand => Hand::MainHand,
        }
    }

    pub fn short_label(self) -> &'static str {
        match self {
            Hand::MainHand => "MH",
            Hand::OffHand => "OH",
        }
    }
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_label())
    }
}

/// Severity of a coaching or feed line. Drives the CSS class on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Info,
    Ok,
    Warn,
    Bad,
}

/// A coaching message with a display hold.
///
/// While `hold` is positive the message stays on screen and proactive nudges
/// are suppressed. Once it runs out the engine falls back to its default text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Coach {
    pub tone: Tone,
    pub text: String,
    pub hold: f64,
}

impl Coach {
    pub fn set(&mut self, tone: Tone, text: impl Into<String>, hold: f64) {
        self.tone = tone;
        self.text = text.into();
        self.hold = hold.max(0.0);
    }

    pub fn is_holding(&self) -> bool {
        self.hold > 0.0 && !self.text.is_empty()
    }

    pub fn decay(&mut self, dt: f64) {
        self.hold = (self.hold - dt).max(0.0);
    }

    pub fn clear(&mut self) {
        *self = Coach::default();
    }

    /// The line to display: the held message, or `fallback` at info tone.
    pub fn display(&self, fallback: &str) -> CoachLine {
        if self.is_holding() {
            CoachLine {
                tone: self.tone,
                text: self.text.clone(),
            }
        } else {
            CoachLine {
                tone: Tone::Info,
                text: fallback.to_string(),
            }
        }
    }
}

/// What the coach panel shows this frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachLine {
    pub tone: Tone,
    pub text: String,
}

/// One line of the swing lab feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub text: String,
    pub tone: Tone,
}

/// Newest-first feed with a fixed length.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Feed {
    entries: VecDeque<FeedEntry>,
    capacity: usize,
}

impl Feed {
    pub fn with_capacity(capacity: usize) -> Self {
        Feed {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, tone: Tone, text: impl Into<String>) {
        self.entries.push_front(FeedEntry {
            text: text.into(),
            tone,
        });
        self.entries.truncate(self.capacity);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn latest(&self) -> Option<&FeedEntry> {
        self.entries.front()
    }

    pub fn entries(&self) -> impl Iterator<Item = &FeedEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Format seconds the way the lab readouts do.
pub fn fmt_secs(value: f64, digits: usize) -> String {
    if value.is_finite() {
        format!("{value:.digits$}")
    } else {
        format!("{:.digits$}", 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coach_falls_back_when_hold_expires() {
        let mut coach = Coach::default();
        coach.set(Tone::Bad, "Windfury dropped", 1.0);
        assert_eq!(coach.display("default").tone, Tone::Bad);

        coach.decay(0.6);
        assert!(coach.is_holding());
        coach.decay(0.6);
        assert!(!coach.is_holding());

        let line = coach.display("default");
        assert_eq!(line.tone, Tone::Info);
        assert_eq!(line.text, "default");
    }

    #[test]
    fn feed_keeps_newest_first_and_caps_length() {
        let mut feed = Feed::with_capacity(3);
        for i in 0..5 {
            feed.push(Tone::Info, format!("line {i}"));
        }
        assert_eq!(feed.len(), 3);
        assert_eq!(feed.latest().map(|e| e.text.as_str()), Some("line 4"));
        let texts: Vec<_> = feed.entries().map(|e| e.text.clone()).collect();
        assert_eq!(texts, vec!["line 4", "line 3", "line 2"]);
    }

    #[test]
    fn fmt_secs_handles_non_finite() {
        assert_eq!(fmt_secs(1.23456, 2), "1.23");
        assert_eq!(fmt_secs(f64::NAN, 2), "0.00");
    }

    #[test]
    fn tone_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Tone::Warn).unwrap(), "\"warn\"");
    }
}
