/// Arpeggiator - splits one keys step into evenly spaced single notes
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::synth::tables::CHORD_NOTES;

pub const MIN_RATE: u8 = 1;
pub const MAX_RATE: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArpMode {
    #[default]
    Up,
    Down,
    Random,
}

impl ArpMode {
    pub const ALL: [ArpMode; 3] = [ArpMode::Up, ArpMode::Down, ArpMode::Random];

    /// Chord member played on the `subdivision`-th slice of a step.
    pub fn note_index(self, subdivision: usize, rng: &mut dyn RngCore) -> usize {
        match self {
            ArpMode::Up => subdivision % CHORD_NOTES,
            ArpMode::Down => CHORD_NOTES - 1 - (subdivision % CHORD_NOTES),
            ArpMode::Random => rng.gen_range(0..CHORD_NOTES),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ArpMode::Up => "up",
            ArpMode::Down => "down",
            ArpMode::Random => "random",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpConfig {
    pub enabled: bool,
    /// Sub-events per step, 1..=8.
    pub rate: u8,
    pub mode: ArpMode,
}

impl Default for ArpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: 2,
            mode: ArpMode::Up,
        }
    }
}

impl ArpConfig {
    pub fn set_rate(&mut self, rate: u8) {
        self.rate = rate.clamp(MIN_RATE, MAX_RATE);
    }

    /// `(offset, note_index)` for each slice of a step lasting `step_duration`.
    pub fn subdivide(&self, step_duration: f64, rng: &mut dyn RngCore) -> Vec<(f64, usize)> {
        let divisions = self.rate.clamp(MIN_RATE, MAX_RATE) as usize;
        let slice = step_duration / divisions as f64;
        (0..divisions)
            .map(|j| (slice * j as f64, self.mode.note_index(j, rng)))
            .collect()
    }
}
