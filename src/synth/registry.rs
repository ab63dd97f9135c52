/// Maps instrument ids to their synthesis recipe
use std::collections::BTreeMap;

use super::Instrument;
use crate::error::{EngineError, Result};

/// Id of the arpeggiated voice used in place of `keys` when the arp is on.
pub const KEYS_ARP: &str = "keysArp";

#[derive(Debug, Clone, Default)]
pub struct InstrumentRegistry {
    entries: BTreeMap<String, Instrument>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock kit: every default track plus the arpeggiated keys voice.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for (id, instrument) in [
            ("kick", Instrument::Kick),
            ("snare", Instrument::Snare),
            ("hat", Instrument::Hat),
            ("clap", Instrument::Clap),
            ("shaker", Instrument::Shaker),
            ("rim", Instrument::Rim),
            (
                "tomL",
                Instrument::Tom {
                    freq: 130.0,
                    level: 0.75,
                },
            ),
            (
                "tomM",
                Instrument::Tom {
                    freq: 170.0,
                    level: 0.7,
                },
            ),
            (
                "tomH",
                Instrument::Tom {
                    freq: 210.0,
                    level: 0.65,
                },
            ),
            ("ride", Instrument::Ride),
            ("crash", Instrument::Crash),
            ("keys", Instrument::Keys),
            (KEYS_ARP, Instrument::KeysArp),
            ("bass", Instrument::Bass),
        ] {
            registry.register(id, instrument);
        }
        registry
    }

    pub fn register(&mut self, id: impl Into<String>, instrument: Instrument) {
        self.entries.insert(id.into(), instrument);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Look up the recipe for `id`. A miss means the track and registry
    /// key sets have diverged.
    pub fn resolve(&self, id: &str) -> Result<Instrument> {
        self.entries
            .get(id)
            .copied()
            .ok_or_else(|| EngineError::UnknownInstrument(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
