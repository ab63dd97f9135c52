/// BEATBOX - A 16-step drum machine engine
///
/// This library provides the core components for building a drum machine:
/// - Pattern and track model with mute/solo and an arpeggiator
/// - Look-ahead scheduler driven by the audio clock
/// - Synthesized percussion and melodic voices
/// - Session persistence and named presets

pub mod audio;
pub mod config;
pub mod error;
pub mod machine;
pub mod sequencer;
pub mod session;
pub mod synth;

// Re-export commonly used types
pub use audio::{AudioSession, OfflineBackend};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use machine::BeatMachine;
pub use sequencer::arp::{ArpConfig, ArpMode};
pub use sequencer::playback::{restart_policy, PlaybackEngine, PlaybackEvent, RestartDecision};
pub use sequencer::{Pattern, Sequencer, Track, STEPS};
pub use session::{PresetStore, SessionPatch, SessionSnapshot};
pub use synth::{Instrument, InstrumentRegistry};
