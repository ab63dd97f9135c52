/// Core sequencer state - step grid, track mix and transport parameters
/// The step grid always holds exactly 16 cells per track.
use std::collections::BTreeMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

pub mod arp;
pub mod playback;
pub mod presets;

use arp::{ArpConfig, ArpMode};

pub const STEPS: usize = 16;
pub const MIN_TEMPO: u16 = 60;
pub const MAX_TEMPO: u16 = 180;
pub const MAX_SWING: f32 = 0.5;

/// Track whose hits are arpeggiated when the arp is on.
pub const MELODIC_TRACK: &str = "keys";

pub type StepRow = [bool; STEPS];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    #[serde(alias = "vol")]
    pub volume: f32,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub solo: bool,
}

impl Track {
    pub fn new(id: &str, name: &str, volume: f32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            volume,
            muted: false,
            solo: false,
        }
    }
}

pub fn default_tracks() -> Vec<Track> {
    vec![
        Track::new("kick", "Kick", 0.9),
        Track::new("snare", "Snare", 0.8),
        Track::new("hat", "Hat", 0.6),
        Track::new("clap", "Clap", 0.7),
        Track::new("shaker", "Shaker", 0.55),
        Track::new("rim", "Rimshot", 0.6),
        Track::new("tomL", "Tom Low", 0.75),
        Track::new("tomM", "Tom Mid", 0.7),
        Track::new("tomH", "Tom High", 0.65),
        Track::new("ride", "Ride", 0.55),
        Track::new("crash", "Crash", 0.6),
        Track::new("keys", "Keys", 0.7),
        Track::new("bass", "Bass", 0.8),
    ]
}

/// Step rows keyed by track id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern {
    rows: BTreeMap<String, StepRow>,
}

impl Pattern {
    pub fn empty<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            rows: ids.into_iter().map(|id| (id.to_string(), [false; STEPS])).collect(),
        }
    }

    pub fn get(&self, id: &str, step: usize) -> bool {
        self.rows
            .get(id)
            .and_then(|row| row.get(step))
            .copied()
            .unwrap_or(false)
    }

    pub fn set(&mut self, id: &str, step: usize, value: bool) -> Result<()> {
        if step >= STEPS {
            return Err(EngineError::InvalidStep(step));
        }
        let row = self
            .rows
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownInstrument(id.to_string()))?;
        row[step] = value;
        Ok(())
    }

    /// Flip one cell; returns its new state.
    pub fn toggle(&mut self, id: &str, step: usize) -> Result<bool> {
        let value = !self.get(id, step);
        self.set(id, step, value)?;
        Ok(value)
    }

    pub fn clear(&mut self) {
        for row in self.rows.values_mut() {
            *row = [false; STEPS];
        }
    }

    pub fn row(&self, id: &str) -> Option<&StepRow> {
        self.rows.get(id)
    }

    pub fn track_ids(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn active_count(&self) -> usize {
        self.rows.values().flatten().filter(|cell| **cell).count()
    }
}

/// Everything the scheduler reads when emitting a step.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingConfig {
    pub tempo: u16,
    pub swing: f32,
    pub pattern: Pattern,
    pub arp: ArpConfig,
    pub tracks: Vec<Track>,
}

pub struct Sequencer {
    tracks: Vec<Track>,
    pattern: Pattern,
    tempo: u16,
    swing: f32,
    arp: ArpConfig,
    is_playing: bool,
}

impl Sequencer {
    pub fn new(tempo: u16, swing: f32) -> Self {
        let tracks = default_tracks();
        let pattern = presets::electro(&Pattern::empty(tracks.iter().map(|t| t.id.as_str())));
        Self {
            tracks,
            pattern,
            tempo: tempo.clamp(MIN_TEMPO, MAX_TEMPO),
            swing: swing.clamp(0.0, MAX_SWING),
            arp: ArpConfig::default(),
            is_playing: false,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    fn track_mut(&mut self, id: &str) -> Result<&mut Track> {
        self.tracks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| EngineError::UnknownInstrument(id.to_string()))
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn tempo(&self) -> u16 {
        self.tempo
    }

    pub fn set_tempo(&mut self, tempo: u16) {
        self.tempo = tempo.clamp(MIN_TEMPO, MAX_TEMPO);
    }

    pub fn swing(&self) -> f32 {
        self.swing
    }

    pub fn set_swing(&mut self, swing: f32) {
        self.swing = if swing.is_finite() { swing.clamp(0.0, MAX_SWING) } else { 0.0 };
    }

    pub fn arp(&self) -> ArpConfig {
        self.arp
    }

    pub fn set_arp_enabled(&mut self, enabled: bool) {
        self.arp.enabled = enabled;
    }

    pub fn set_arp_rate(&mut self, rate: u8) {
        self.arp.set_rate(rate);
    }

    pub fn set_arp_mode(&mut self, mode: ArpMode) {
        self.arp.mode = mode;
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.is_playing = playing;
    }

    pub fn toggle_cell(&mut self, id: &str, step: usize) -> Result<bool> {
        self.pattern.toggle(id, step)
    }

    pub fn set_volume(&mut self, id: &str, volume: f32) -> Result<()> {
        let track = self.track_mut(id)?;
        track.volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
        Ok(())
    }

    pub fn toggle_mute(&mut self, id: &str) -> Result<bool> {
        let track = self.track_mut(id)?;
        track.muted = !track.muted;
        Ok(track.muted)
    }

    pub fn toggle_solo(&mut self, id: &str) -> Result<bool> {
        let track = self.track_mut(id)?;
        track.solo = !track.solo;
        Ok(track.solo)
    }

    pub fn clear(&mut self) {
        self.pattern.clear();
    }

    pub fn load_electro(&mut self) {
        self.pattern = presets::electro(&self.pattern);
    }

    pub fn randomize(&mut self, density: f32, rng: &mut dyn RngCore) {
        self.pattern = presets::random(&self.pattern, density, rng);
    }

    /// Replace tracks and pattern together; their key sets must match.
    pub fn replace_grid(&mut self, tracks: Vec<Track>, pattern: Pattern) -> Result<()> {
        ensure_same_keys(&tracks, &pattern)?;
        self.tracks = tracks;
        self.pattern = pattern;
        Ok(())
    }

    /// Length of one 16th-note step in seconds.
    pub fn step_duration(&self) -> f64 {
        step_duration(self.tempo)
    }

    /// Delay applied to `step`; only odd (off-beat) steps swing.
    pub fn swing_offset(&self, step: usize) -> f64 {
        swing_offset(self.tempo, self.swing, step)
    }

    /// Tracks allowed to sound: mute always wins, and any solo narrows the set.
    pub fn audible_tracks(&self) -> impl Iterator<Item = &Track> {
        let any_solo = self.tracks.iter().any(|t| t.solo);
        self.tracks
            .iter()
            .filter(move |t| !t.muted && (!any_solo || t.solo))
    }

    pub fn scheduling_config(&self) -> SchedulingConfig {
        SchedulingConfig {
            tempo: self.tempo,
            swing: self.swing,
            pattern: self.pattern.clone(),
            arp: self.arp,
            tracks: self.tracks.clone(),
        }
    }
}

pub fn step_duration(tempo: u16) -> f64 {
    0.25 * (60.0 / tempo as f64)
}

pub fn swing_offset(tempo: u16, swing: f32, step: usize) -> f64 {
    if step % 2 == 1 {
        swing as f64 * (60.0 / tempo as f64) / 2.0
    } else {
        0.0
    }
}

pub(crate) fn ensure_same_keys(tracks: &[Track], pattern: &Pattern) -> Result<()> {
    let mut track_ids: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
    track_ids.sort_unstable();
    let before = track_ids.len();
    track_ids.dedup();
    if track_ids.len() != before {
        return Err(EngineError::MalformedImport("duplicate track id".into()));
    }
    let pattern_ids: Vec<&str> = pattern.track_ids().collect();
    if track_ids != pattern_ids {
        return Err(EngineError::MalformedImport(
            "pattern rows do not match the track list".into(),
        ));
    }
    Ok(())
}
