//! Tempo model: bpm bounds, normalization, the ramp starting point and
//! [`TempoPreset`].

use serde::{Deserialize, Serialize};

/// Slowest supported tempo.
pub const MIN_BPM: u32 = 30;

/// Fastest supported tempo.
pub const MAX_BPM: u32 = 300;

/// Goal tempos at or below this start the ramp at [`MIN_BPM`].
const RAMP_FLOOR_GOAL: u32 = 45;

/// Sanitize any tempo into the supported integer domain.
///
/// Values below [`MIN_BPM`] (and NaN) become [`MIN_BPM`], values above
/// [`MAX_BPM`] become [`MAX_BPM`], fractional values in range round down.
///
/// ```
/// use tactus::normalize_bpm;
///
/// assert_eq!(normalize_bpm(12.0), 30);
/// assert_eq!(normalize_bpm(120.9), 120);
/// assert_eq!(normalize_bpm(1000.0), 300);
/// ```
pub fn normalize_bpm(bpm: f64) -> u32 {
    if bpm.is_nan() || bpm < MIN_BPM as f64 {
        return MIN_BPM;
    }
    if bpm > MAX_BPM as f64 {
        return MAX_BPM;
    }
    bpm.floor() as u32
}

/// Starting tempo for a practice ramp toward `goal_bpm`.
///
/// Three quarters of the goal, rounded down, but never below [`MIN_BPM`].
pub fn effective_bpm(goal_bpm: u32) -> u32 {
    if goal_bpm <= RAMP_FLOOR_GOAL {
        MIN_BPM
    } else {
        (goal_bpm as u64 * 3 / 4) as u32
    }
}

/// Length of one beat in seconds.
pub fn beat_seconds(bpm: u32) -> f64 {
    60.0 / bpm.max(1) as f64
}

/// Length of one beat in milliseconds.
pub fn ms_per_beat(bpm: u32) -> f64 {
    60_000.0 / bpm.max(1) as f64
}

/// A named tempo the user practices toward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoPreset {
    pub name: String,
    /// The tempo the user ultimately wants
    pub goal_bpm: u32,
    /// Display ordering, no uniqueness requirement
    pub order: i32,
    /// The effective tempo played right now
    pub bpm: u32,
}

impl TempoPreset {
    /// Create a preset; the goal is normalized and the effective tempo starts
    /// at the ramp's starting point.
    pub fn new(name: impl Into<String>, goal_bpm: u32, order: i32) -> Self {
        let goal_bpm = normalize_bpm(goal_bpm as f64);
        Self {
            name: name.into(),
            goal_bpm,
            order,
            bpm: effective_bpm(goal_bpm),
        }
    }

    /// Replace the effective tempo, normalized.
    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = normalize_bpm(bpm);
    }

    /// Whether the effective tempo has reached the goal.
    pub fn at_goal(&self) -> bool {
        self.bpm >= self.goal_bpm
    }
}
