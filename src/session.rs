/// Whole-session persistence: JSON snapshots, partial imports and named presets
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::sequencer::arp::{ArpMode, MAX_RATE, MIN_RATE};
use crate::sequencer::{
    ensure_same_keys, Pattern, Sequencer, Track, MAX_SWING, MAX_TEMPO, MIN_TEMPO,
};
use crate::synth::registry::KEYS_ARP;
use crate::synth::InstrumentRegistry;

pub const UNTITLED: &str = "Untitled";

/// Serialized shape of a full session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub name: String,
    pub tempo: u16,
    pub swing: f32,
    pub arp_on: bool,
    pub arp_rate: u8,
    pub arp_mode: ArpMode,
    pub tracks: Vec<Track>,
    pub pattern: Pattern,
    /// Epoch milliseconds at capture time.
    pub ts: i64,
}

impl SessionSnapshot {
    pub fn capture(sequencer: &Sequencer, name: &str) -> Self {
        let arp = sequencer.arp();
        let name = name.trim();
        Self {
            name: if name.is_empty() { UNTITLED.to_string() } else { name.to_string() },
            tempo: sequencer.tempo(),
            swing: sequencer.swing(),
            arp_on: arp.enabled,
            arp_rate: arp.rate,
            arp_mode: arp.mode,
            tracks: sequencer.tracks().to_vec(),
            pattern: sequencer.pattern().clone(),
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// File name used when exporting: spaces become underscores.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.name.replace(' ', "_"))
    }
}

/// A session document where every field is optional. Absent fields leave
/// the current value alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    pub name: Option<String>,
    pub tempo: Option<f64>,
    pub swing: Option<f64>,
    pub arp_on: Option<bool>,
    pub arp_rate: Option<f64>,
    pub arp_mode: Option<ArpMode>,
    pub tracks: Option<Vec<Track>>,
    pub pattern: Option<Pattern>,
    pub ts: Option<i64>,
}

impl From<SessionSnapshot> for SessionPatch {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            name: Some(snapshot.name),
            tempo: Some(snapshot.tempo as f64),
            swing: Some(snapshot.swing as f64),
            arp_on: Some(snapshot.arp_on),
            arp_rate: Some(snapshot.arp_rate as f64),
            arp_mode: Some(snapshot.arp_mode),
            tracks: Some(snapshot.tracks),
            pattern: Some(snapshot.pattern),
            ts: Some(snapshot.ts),
        }
    }
}

fn malformed(msg: impl Into<String>) -> EngineError {
    EngineError::MalformedImport(msg.into())
}

impl SessionPatch {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| malformed(e.to_string()))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Check the patch against the current sequencer and apply it in one go.
    /// On error nothing has been changed.
    pub fn apply(self, sequencer: &mut Sequencer, registry: &InstrumentRegistry) -> Result<()> {
        let tempo = self
            .tempo
            .map(|t| {
                if t.is_finite() && (MIN_TEMPO as f64..=MAX_TEMPO as f64).contains(&t) {
                    Ok(t.round() as u16)
                } else {
                    Err(malformed(format!("tempo {} outside {}..={}", t, MIN_TEMPO, MAX_TEMPO)))
                }
            })
            .transpose()?;
        let swing = self
            .swing
            .map(|s| {
                if s.is_finite() && (0.0..=MAX_SWING as f64).contains(&s) {
                    Ok(s as f32)
                } else {
                    Err(malformed(format!("swing {} outside 0..={}", s, MAX_SWING)))
                }
            })
            .transpose()?;
        let arp_rate = self
            .arp_rate
            .map(|r| {
                if r.fract() == 0.0 && (MIN_RATE as f64..=MAX_RATE as f64).contains(&r) {
                    Ok(r as u8)
                } else {
                    Err(malformed(format!("arpRate {} outside {}..={}", r, MIN_RATE, MAX_RATE)))
                }
            })
            .transpose()?;

        if let Some(tracks) = &self.tracks {
            let current: BTreeSet<&str> =
                sequencer.tracks().iter().map(|t| t.id.as_str()).collect();
            let imported: BTreeSet<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
            if imported != current {
                return Err(malformed("tracks must match the session's track set"));
            }
            for track in tracks {
                if track.id == KEYS_ARP || !registry.contains(&track.id) {
                    return Err(malformed(format!("unknown track id {:?}", track.id)));
                }
                if !track.volume.is_finite() || !(0.0..=1.0).contains(&track.volume) {
                    return Err(malformed(format!("volume of {:?} outside 0..=1", track.id)));
                }
            }
        }

        let grid = match (self.tracks, self.pattern) {
            (None, None) => None,
            (tracks, pattern) => {
                let tracks = tracks.unwrap_or_else(|| sequencer.tracks().to_vec());
                let pattern = pattern.unwrap_or_else(|| sequencer.pattern().clone());
                ensure_same_keys(&tracks, &pattern)?;
                Some((tracks, pattern))
            }
        };

        // validated; from here on nothing can fail
        if let Some((tracks, pattern)) = grid {
            sequencer.replace_grid(tracks, pattern)?;
        }
        if let Some(tempo) = tempo {
            sequencer.set_tempo(tempo);
        }
        if let Some(swing) = swing {
            sequencer.set_swing(swing);
        }
        if let Some(enabled) = self.arp_on {
            sequencer.set_arp_enabled(enabled);
        }
        if let Some(rate) = arp_rate {
            sequencer.set_arp_rate(rate);
        }
        if let Some(mode) = self.arp_mode {
            sequencer.set_arp_mode(mode);
        }
        Ok(())
    }
}

/// Write `snapshot` as pretty JSON into `dir`; returns the file path.
pub fn export_to_dir(snapshot: &SessionSnapshot, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(snapshot.file_name());
    std::fs::write(&path, snapshot.to_json()?)?;
    log::info!("Exported session {:?} to {:?}", snapshot.name, path);
    Ok(path)
}

/// Named presets kept in a single JSON file.
pub struct PresetStore {
    path: PathBuf,
    presets: BTreeMap<String, SessionSnapshot>,
}

impl PresetStore {
    /// Open the store at `path`. A missing or unreadable file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let presets = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                log::warn!("Ignoring corrupt preset file {:?}: {}", path, e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self { path, presets }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Preset names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&SessionSnapshot> {
        self.presets.get(name)
    }

    pub fn save(&mut self, snapshot: SessionSnapshot) -> Result<()> {
        self.presets.insert(snapshot.name.clone(), snapshot);
        self.persist()
    }

    pub fn delete(&mut self, name: &str) -> Result<bool> {
        let removed = self.presets.remove(name).is_some();
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string(&self.presets)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::STEPS;

    fn sequencer() -> Sequencer {
        Sequencer::new(110, 0.1)
    }

    fn without_ts(json: &str) -> serde_json::Value {
        let mut value: serde_json::Value = serde_json::from_str(json).unwrap();
        value.as_object_mut().unwrap().remove("ts");
        value
    }

    #[test]
    fn snapshot_uses_documented_keys() {
        let json = SessionSnapshot::capture(&sequencer(), "Groove").to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let keys = [
            "name", "tempo", "swing", "arpOn", "arpRate", "arpMode", "tracks", "pattern", "ts",
        ];
        for key in keys {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["arpMode"], "up");
        assert_eq!(value["pattern"]["kick"].as_array().unwrap().len(), STEPS);
        assert!((value["tracks"][0]["volume"].as_f64().unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn round_trip_is_stable() {
        let registry = InstrumentRegistry::standard();
        let mut original = sequencer();
        original.toggle_solo("hat").unwrap();
        original.set_arp_enabled(true);
        original.set_arp_mode(ArpMode::Random);
        original.set_swing(0.37);
        let first = SessionSnapshot::capture(&original, "Round").to_json().unwrap();

        let mut restored = Sequencer::new(60, 0.0);
        restored.clear();
        SessionPatch::from_json(&first).unwrap().apply(&mut restored, &registry).unwrap();
        let second = SessionSnapshot::capture(&restored, "Round").to_json().unwrap();

        assert_eq!(without_ts(&first), without_ts(&second));
    }

    #[test]
    fn missing_pattern_keeps_current_grid() {
        let registry = InstrumentRegistry::standard();
        let mut seq = sequencer();
        let before = seq.pattern().clone();

        SessionPatch::from_json(r#"{"tempo": 140}"#)
            .unwrap()
            .apply(&mut seq, &registry)
            .unwrap();
        assert_eq!(seq.tempo(), 140);
        assert_eq!(seq.pattern(), &before);
    }

    #[test]
    fn bad_documents_change_nothing() {
        let registry = InstrumentRegistry::standard();
        let mut seq = sequencer();
        let before = SessionSnapshot::capture(&seq, "x");

        let short_row = r#"{"tempo": 150, "pattern": {"kick": [true, false]}}"#;
        assert!(matches!(
            SessionPatch::from_json(short_row),
            Err(EngineError::MalformedImport(_))
        ));

        let bad_tempo = SessionPatch::from_json(r#"{"tempo": 500, "swing": 0.2}"#).unwrap();
        assert!(matches!(
            bad_tempo.apply(&mut seq, &registry),
            Err(EngineError::MalformedImport(_))
        ));

        // a well-formed row, but only for one of the thirteen tracks
        let row = serde_json::to_string(&[true; STEPS]).unwrap();
        let partial_rows = format!(r#"{{"tempo": 150, "pattern": {{"kick": {}}}}}"#, row);
        let patch = SessionPatch::from_json(&partial_rows).unwrap();
        assert!(matches!(
            patch.apply(&mut seq, &registry),
            Err(EngineError::MalformedImport(_))
        ));

        assert!(SessionPatch::from_json("not json").is_err());

        let after = SessionSnapshot::capture(&seq, "x");
        assert_eq!(before.tempo, after.tempo);
        assert_eq!(before.swing, after.swing);
        assert_eq!(before.pattern, after.pattern);
        assert_eq!(before.tracks, after.tracks);
    }

    #[test]
    fn import_cannot_replace_the_track_set() {
        let registry = InstrumentRegistry::standard();
        let mut seq = sequencer();
        let before = SessionSnapshot::capture(&seq, "x");
        let row = serde_json::to_string(&[true; STEPS]).unwrap();

        let arp_only = format!(
            r#"{{"tracks": [{{"id": "keysArp", "name": "Arp", "volume": 0.5}}],
                "pattern": {{"keysArp": {}}}}}"#,
            row
        );
        let patch = SessionPatch::from_json(&arp_only).unwrap();
        assert!(matches!(
            patch.apply(&mut seq, &registry),
            Err(EngineError::MalformedImport(_))
        ));

        let kick_only = format!(
            r#"{{"tracks": [{{"id": "kick", "name": "Kick", "volume": 0.5}}],
                "pattern": {{"kick": {}}}}}"#,
            row
        );
        let patch = SessionPatch::from_json(&kick_only).unwrap();
        assert!(matches!(
            patch.apply(&mut seq, &registry),
            Err(EngineError::MalformedImport(_))
        ));

        let after = SessionSnapshot::capture(&seq, "x");
        assert_eq!(before.tracks, after.tracks);
        assert_eq!(before.pattern, after.pattern);
    }

    #[test]
    fn import_may_reorder_tracks() {
        let registry = InstrumentRegistry::standard();
        let mut seq = sequencer();
        let mut snapshot = SessionSnapshot::capture(&seq, "x");
        snapshot.tracks.reverse();
        snapshot.tracks[0].volume = 0.4;

        SessionPatch::from(snapshot).apply(&mut seq, &registry).unwrap();
        assert_eq!(seq.tracks()[0].id, "bass");
        assert_eq!(seq.track("bass").unwrap().volume, 0.4);
    }

    #[test]
    fn legacy_track_keys_are_accepted() {
        let json = r#"{"id": "kick", "name": "Kick", "color": "bg-emerald-500",
            "vol": 0.5, "muted": true, "solo": false}"#;
        let track: Track = serde_json::from_str(json).unwrap();
        assert_eq!(track.volume, 0.5);
        assert!(track.muted);
    }

    #[test]
    fn preset_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");

        let mut store = PresetStore::open(&path);
        assert_eq!(store.names().count(), 0);
        store.save(SessionSnapshot::capture(&sequencer(), "B side")).unwrap();
        store.save(SessionSnapshot::capture(&sequencer(), "A side")).unwrap();

        let mut reopened = PresetStore::open(&path);
        let names: Vec<&str> = reopened.names().collect();
        assert_eq!(names, vec!["A side", "B side"]);
        assert_eq!(reopened.get("A side").unwrap().tempo, 110);

        assert!(reopened.delete("A side").unwrap());
        assert!(!reopened.delete("A side").unwrap());
        assert_eq!(PresetStore::open(&path).names().count(), 1);
    }

    #[test]
    fn corrupt_preset_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");
        std::fs::write(&path, "{{{").unwrap();
        assert_eq!(PresetStore::open(&path).names().count(), 0);
    }

    #[test]
    fn export_names_file_after_session() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = SessionSnapshot::capture(&sequencer(), "Late Night Jam");
        let path = export_to_dir(&snapshot, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "Late_Night_Jam.json");

        let patch = SessionPatch::read(&path).unwrap();
        assert_eq!(patch.name.as_deref(), Some("Late Night Jam"));
        assert_eq!(patch.tempo, Some(110.0));
    }
}
