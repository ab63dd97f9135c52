/// The drum machine as collaborators see it: transport, grid edits, mix
/// controls and session I/O, with the restart policy applied centrally.
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::audio::AudioSession;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::sequencer::arp::ArpMode;
use crate::sequencer::playback::{
    restart_policy, PlaybackEngine, PlaybackEvent, RestartDecision, TickContext,
};
use crate::sequencer::{SchedulingConfig, Sequencer, MELODIC_TRACK};
use crate::session::{SessionPatch, SessionSnapshot};
use crate::synth::registry::KEYS_ARP;
use crate::synth::{Hit, InstrumentRegistry};

/// Lead time for auditioned hits.
const TRIGGER_LEAD: f64 = 0.001;

pub struct BeatMachine {
    sequencer: Sequencer,
    registry: InstrumentRegistry,
    session: AudioSession,
    playback: PlaybackEngine,
    rng: StdRng,
    preset_name: String,
}

impl BeatMachine {
    pub fn new(config: EngineConfig, session: AudioSession) -> Self {
        Self::with_rng(config, session, StdRng::from_entropy())
    }

    pub fn with_rng(config: EngineConfig, session: AudioSession, rng: StdRng) -> Self {
        Self {
            sequencer: Sequencer::new(config.default_tempo, config.default_swing),
            registry: InstrumentRegistry::standard(),
            playback: PlaybackEngine::new(&config),
            session,
            rng,
            preset_name: String::new(),
        }
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn session(&self) -> &AudioSession {
        &self.session
    }

    pub fn playback(&self) -> &PlaybackEngine {
        &self.playback
    }

    pub fn preset_name(&self) -> &str {
        &self.preset_name
    }

    pub fn set_preset_name(&mut self, name: &str) {
        self.preset_name = name.to_string();
    }

    pub fn is_playing(&self) -> bool {
        self.sequencer.is_playing()
    }

    /// Step to highlight in the grid; `None` while stopped.
    pub fn highlighted_step(&self) -> Option<usize> {
        self.playback.highlighted_step()
    }

    pub fn play(&mut self) -> Result<()> {
        if self.playback.is_running() {
            return Ok(());
        }
        self.session.init()?;
        self.sequencer.set_playing(true);
        self.playback.start(self.session.current_time()?, Instant::now());
        Ok(())
    }

    pub fn stop(&mut self) {
        self.sequencer.set_playing(false);
        self.playback.stop();
    }

    pub fn toggle_play(&mut self) -> Result<()> {
        if self.is_playing() {
            self.stop();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Periodic wake from the host loop. Runs a scheduler tick when due and
    /// returns the events produced since the last call.
    pub fn pump(&mut self, now: Instant) -> Result<Vec<PlaybackEvent>> {
        let mut ctx = TickContext {
            sequencer: &self.sequencer,
            registry: &self.registry,
            session: &mut self.session,
            rng: &mut self.rng,
        };
        if let Err(e) = self.playback.pump(now, &mut ctx) {
            self.sequencer.set_playing(false);
            return Err(e);
        }
        Ok(self.playback.poll_events())
    }

    /// Run one scheduler pass immediately, ignoring the timer.
    pub fn tick(&mut self) -> Result<Vec<PlaybackEvent>> {
        let mut ctx = TickContext {
            sequencer: &self.sequencer,
            registry: &self.registry,
            session: &mut self.session,
            rng: &mut self.rng,
        };
        if let Err(e) = self.playback.tick(&mut ctx) {
            self.sequencer.set_playing(false);
            return Err(e);
        }
        Ok(self.playback.poll_events())
    }

    /// Apply an edit, then restart the loop if the policy asks for it.
    fn reconfigure<R>(&mut self, edit: impl FnOnce(&mut Sequencer) -> Result<R>) -> Result<R> {
        let before = self.sequencer.scheduling_config();
        let out = edit(&mut self.sequencer)?;
        self.restart_if_needed(&before)?;
        Ok(out)
    }

    fn restart_if_needed(&mut self, before: &SchedulingConfig) -> Result<()> {
        if !self.playback.is_running() {
            return Ok(());
        }
        if restart_policy(before, &self.sequencer.scheduling_config()) == RestartDecision::Restart {
            log::debug!("Scheduling inputs changed, restarting loop");
            self.playback.stop();
            self.playback.start(self.session.current_time()?, Instant::now());
        }
        Ok(())
    }

    pub fn toggle_cell(&mut self, id: &str, step: usize) -> Result<bool> {
        self.reconfigure(|seq| seq.toggle_cell(id, step))
    }

    pub fn set_volume(&mut self, id: &str, volume: f32) -> Result<()> {
        self.reconfigure(|seq| seq.set_volume(id, volume))
    }

    pub fn toggle_mute(&mut self, id: &str) -> Result<bool> {
        self.reconfigure(|seq| seq.toggle_mute(id))
    }

    pub fn toggle_solo(&mut self, id: &str) -> Result<bool> {
        self.reconfigure(|seq| seq.toggle_solo(id))
    }

    pub fn set_tempo(&mut self, tempo: u16) -> Result<()> {
        self.reconfigure(|seq| {
            seq.set_tempo(tempo);
            Ok(())
        })
    }

    pub fn set_swing(&mut self, swing: f32) -> Result<()> {
        self.reconfigure(|seq| {
            seq.set_swing(swing);
            Ok(())
        })
    }

    pub fn set_arp_enabled(&mut self, enabled: bool) -> Result<()> {
        self.reconfigure(|seq| {
            seq.set_arp_enabled(enabled);
            Ok(())
        })
    }

    pub fn set_arp_rate(&mut self, rate: u8) -> Result<()> {
        self.reconfigure(|seq| {
            seq.set_arp_rate(rate);
            Ok(())
        })
    }

    pub fn set_arp_mode(&mut self, mode: ArpMode) -> Result<()> {
        self.reconfigure(|seq| {
            seq.set_arp_mode(mode);
            Ok(())
        })
    }

    pub fn clear(&mut self) -> Result<()> {
        self.reconfigure(|seq| {
            seq.clear();
            Ok(())
        })
    }

    pub fn load_electro(&mut self) -> Result<()> {
        self.reconfigure(|seq| {
            seq.load_electro();
            Ok(())
        })
    }

    pub fn randomize(&mut self, density: f32) -> Result<()> {
        let before = self.sequencer.scheduling_config();
        self.sequencer.randomize(density, &mut self.rng);
        self.restart_if_needed(&before)
    }

    /// Audition an instrument right now, outside the loop.
    pub fn trigger_now(&mut self, id: &str) -> Result<()> {
        self.session.init()?;
        let velocity = self.sequencer.track(id).map(|t| t.volume).unwrap_or(0.7);
        let time = self.session.current_time()? + TRIGGER_LEAD;
        let step = self.playback.cursor().next_step;
        let arp = self.sequencer.arp();

        if id == MELODIC_TRACK && arp.enabled {
            let instrument = self.registry.resolve(KEYS_ARP)?;
            for (offset, note) in arp.subdivide(self.sequencer.step_duration(), &mut self.rng) {
                let hit = Hit::new(time + offset, velocity, step).with_note(note);
                instrument.render(&hit, &mut self.session, &mut self.rng)?;
            }
        } else {
            let instrument = self.registry.resolve(id)?;
            instrument.render(&Hit::new(time, velocity, step), &mut self.session, &mut self.rng)?;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::capture(&self.sequencer, &self.preset_name)
    }

    pub fn serialize(&self) -> Result<String> {
        self.snapshot().to_json()
    }

    /// Apply a session document. Either every present field is taken or,
    /// on a malformed document, nothing changes.
    pub fn import_json(&mut self, text: &str) -> Result<()> {
        let patch = SessionPatch::from_json(text).inspect_err(|e| {
            log::warn!("Rejected import: {}", e);
        })?;
        self.apply_patch(patch)
    }

    pub fn load_snapshot(&mut self, snapshot: &SessionSnapshot) -> Result<()> {
        self.apply_patch(SessionPatch::from(snapshot.clone()))
    }

    fn apply_patch(&mut self, patch: SessionPatch) -> Result<()> {
        let name = patch.name.clone();
        let before = self.sequencer.scheduling_config();
        patch
            .apply(&mut self.sequencer, &self.registry)
            .inspect_err(|e| log::warn!("Rejected import: {}", e))?;
        self.restart_if_needed(&before)?;
        if let Some(name) = name {
            self.preset_name = name;
        }
        Ok(())
    }

    /// Stop playback and release the audio device.
    pub fn shutdown(&mut self) {
        self.stop();
        self.session.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::OfflineBackend;

    fn machine() -> (BeatMachine, OfflineBackend) {
        let config = EngineConfig::default();
        let backend = OfflineBackend::new(4000, config.master_gain);
        let session = AudioSession::offline(config.clone(), backend.clone());
        let machine = BeatMachine::with_rng(config, session, StdRng::seed_from_u64(3));
        (machine, backend)
    }

    #[test]
    fn play_initializes_audio_lazily() {
        let (mut machine, _) = machine();
        assert!(!machine.session().is_active());
        machine.play().unwrap();
        assert!(machine.session().is_active());
        assert!(machine.is_playing());
        machine.stop();
        assert!(!machine.is_playing());
        assert_eq!(machine.highlighted_step(), None);
    }

    #[test]
    fn tempo_change_restarts_from_step_zero() {
        let (mut machine, backend) = machine();
        machine.play().unwrap();
        backend.set_time(0.5);
        machine.tick().unwrap();
        assert_ne!(machine.playback().cursor().next_step, 0);

        machine.set_tempo(150).unwrap();
        let cursor = machine.playback().cursor();
        assert_eq!(cursor.next_step, 0);
        assert!((cursor.next_time - 0.55).abs() < 1e-9);
        assert!(machine.playback().is_running());
    }

    #[test]
    fn mix_changes_keep_phase() {
        let (mut machine, backend) = machine();
        machine.play().unwrap();
        backend.set_time(0.5);
        machine.tick().unwrap();
        let before = machine.playback().cursor();

        machine.set_volume("kick", 0.2).unwrap();
        machine.toggle_mute("snare").unwrap();
        machine.toggle_solo("hat").unwrap();
        assert_eq!(machine.playback().cursor(), before);
    }

    #[test]
    fn trigger_now_schedules_just_ahead() {
        let (mut machine, backend) = machine();
        backend.set_time(1.0);
        machine.trigger_now("kick").unwrap();
        let voices = backend.submitted();
        assert_eq!(voices.len(), 1);
        assert!((voices[0].start - 1.001).abs() < 1e-9);
        assert!(machine.trigger_now("cowbell").is_err());
    }

    #[test]
    fn trigger_keys_with_arp_plays_each_slice() {
        let (mut machine, backend) = machine();
        machine.set_arp_enabled(true).unwrap();
        machine.set_arp_rate(3).unwrap();
        machine.trigger_now("keys").unwrap();
        assert_eq!(backend.submitted_count(), 3);
    }

    #[test]
    fn import_updates_name_and_rejects_garbage() {
        let (mut machine, _) = machine();
        machine.import_json(r#"{"name": "Imported", "tempo": 95}"#).unwrap();
        assert_eq!(machine.preset_name(), "Imported");
        assert_eq!(machine.sequencer().tempo(), 95);

        assert!(machine.import_json(r#"{"tempo": "fast"}"#).is_err());
        assert_eq!(machine.sequencer().tempo(), 95);
    }

    #[test]
    fn shutdown_disposes_session() {
        let (mut machine, _) = machine();
        machine.play().unwrap();
        machine.shutdown();
        assert!(!machine.is_playing());
        assert!(machine.play().is_err());
    }
}
