/// Synthesis engine: one bespoke recipe per instrument.
///
/// Rendering a hit builds a handful of self-terminating voices and hands them
/// to the audio session. Nothing is retained between calls.
use rand::{Rng, RngCore};

use crate::audio::{AudioSession, Filter, Param, Source, Voice, Waveform, SILENCE};
use crate::error::{EngineError, Result};

pub mod registry;
pub mod tables;

pub use registry::InstrumentRegistry;
use tables::{bass_note, chord_root, distortion_curve, minor7, white_noise, CHORD_NOTES};

/// One trigger of an instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Start time on the session clock, in seconds.
    pub time: f64,
    pub velocity: f32,
    /// Step being played; chooses chord and bass roots.
    pub step: usize,
    /// Chord member for arpeggiated keys.
    pub note_index: usize,
}

impl Hit {
    pub fn new(time: f64, velocity: f32, step: usize) -> Self {
        Self {
            time,
            velocity,
            step,
            note_index: 0,
        }
    }

    pub fn with_note(mut self, note_index: usize) -> Self {
        self.note_index = note_index;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instrument {
    Kick,
    Snare,
    Hat,
    Clap,
    Shaker,
    Rim,
    Tom { freq: f32, level: f32 },
    Ride,
    Crash,
    Keys,
    KeysArp,
    Bass,
}

/// Attack then decay, both exponential, from and back to the silence floor.
fn exp_envelope(time: f64, peak: f32, attack: f64, release: f64) -> Param {
    Param::new(SILENCE)
        .set(time, SILENCE)
        .exp_to(peak, time + attack)
        .exp_to(SILENCE, time + release)
}

/// Linear attack with an exponential tail, for the cymbals.
fn swell_envelope(time: f64, peak: f32, attack: f64, release: f64) -> Param {
    Param::new(SILENCE)
        .set(time, SILENCE)
        .linear_to(peak, time + attack)
        .exp_to(SILENCE, time + release)
}

fn oscillator(waveform: Waveform, freq: f32, time: f64) -> Source {
    Source::Oscillator {
        waveform,
        frequency: Param::new(freq).set(time, freq),
    }
}

fn sweep(waveform: Waveform, from: f32, to: f32, time: f64, over: f64) -> Source {
    Source::Oscillator {
        waveform,
        frequency: Param::new(from).set(time, from).exp_to(to, time + over),
    }
}

impl Instrument {
    pub fn render(
        &self,
        hit: &Hit,
        session: &mut AudioSession,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        if !session.is_active() {
            return Err(EngineError::AudioNotReady);
        }
        let t = hit.time;
        let v = hit.velocity.clamp(0.0, 1.0);

        match *self {
            Instrument::Kick => session.schedule(
                Voice::new(
                    sweep(Waveform::Sine, 130.0, 45.0, t, 0.15),
                    exp_envelope(t, 0.9 * v, 0.002, 0.25),
                    t,
                    t + 0.3,
                )
                .with_shaper(distortion_curve(5.0)),
            ),
            Instrument::Snare => {
                let noise = noise_source(session, rng)?;
                session.schedule(
                    Voice::new(noise, exp_envelope(t, 0.7 * v, 0.002, 0.18), t, t + 0.2)
                        .with_filter(Filter::highpass(1500.0)),
                )?;
                session.schedule(Voice::new(
                    oscillator(Waveform::Triangle, 185.0, t),
                    exp_envelope(t, 0.4 * v, 0.002, 0.12),
                    t,
                    t + 0.15,
                ))
            }
            Instrument::Hat => noise_burst(
                session,
                rng,
                Filter::highpass(6000.0),
                exp_envelope(t, 0.4 * v, 0.001, 0.06),
                t,
                0.07,
            ),
            Instrument::Clap => {
                // three hands, slightly apart
                for offset in [0.0, 0.012, 0.025] {
                    let start = t + offset;
                    noise_burst(
                        session,
                        rng,
                        Filter::bandpass(1200.0),
                        exp_envelope(start, 0.6 * v, 0.003, 0.12),
                        start,
                        0.14,
                    )?;
                }
                Ok(())
            }
            Instrument::Shaker => noise_burst(
                session,
                rng,
                Filter::highpass(8000.0),
                exp_envelope(t, 0.35 * v, 0.002, 0.14),
                t,
                0.16,
            ),
            Instrument::Rim => noise_burst(
                session,
                rng,
                Filter::highpass(3000.0),
                exp_envelope(t, 0.45 * v, 0.001, 0.05),
                t,
                0.06,
            ),
            Instrument::Tom { freq, level } => session.schedule(
                Voice::new(
                    sweep(Waveform::Sine, freq * 1.1, freq * 0.7, t, 0.18),
                    exp_envelope(t, level * v, 0.005, 0.28),
                    t,
                    t + 0.3,
                )
                .with_filter(Filter::bandpass(freq * 2.0)),
            ),
            Instrument::Ride => noise_burst(
                session,
                rng,
                Filter::highpass(7000.0),
                swell_envelope(t, 0.25 * v, 0.01, 0.35),
                t,
                0.4,
            ),
            Instrument::Crash => noise_burst(
                session,
                rng,
                Filter::highpass(3000.0),
                swell_envelope(t, 0.5 * v, 0.005, 0.9),
                t,
                1.0,
            ),
            Instrument::Keys => {
                let chord = minor7(chord_root(hit.step));
                let delay = 0.015 + rng.gen::<f64>() * 0.008;
                let envelope = exp_envelope(t, 0.7 * v, 0.015, 0.35);
                for (idx, freq) in chord.iter().enumerate() {
                    let waveform = if idx % 2 == 1 {
                        Waveform::Sawtooth
                    } else {
                        Waveform::Triangle
                    };
                    session.schedule(
                        Voice::new(oscillator(waveform, *freq, t), envelope.clone(), t, t + 0.45)
                            .with_level(0.6 / CHORD_NOTES as f32)
                            .with_filter(Filter::lowpass(2200.0))
                            .with_delay(delay),
                    )?;
                }
                Ok(())
            }
            Instrument::KeysArp => {
                let chord = minor7(chord_root(hit.step));
                let freq = chord[hit.note_index % CHORD_NOTES];
                session.schedule(
                    Voice::new(
                        oscillator(Waveform::Sawtooth, freq, t),
                        exp_envelope(t, 0.55 * v, 0.008, 0.16),
                        t,
                        t + 0.18,
                    )
                    .with_filter(Filter::lowpass(2400.0)),
                )
            }
            Instrument::Bass => session.schedule(
                Voice::new(
                    oscillator(Waveform::Sawtooth, bass_note(hit.step), t),
                    exp_envelope(t, 0.5 * v, 0.01, 0.3),
                    t,
                    t + 0.35,
                )
                .with_filter(Filter::lowpass(220.0)),
            ),
        }
    }
}

fn noise_source(session: &AudioSession, rng: &mut dyn RngCore) -> Result<Source> {
    let len = (session.config().noise_seconds * session.sample_rate()? as f32) as usize;
    Ok(Source::Noise(white_noise(rng, len)))
}

fn noise_burst(
    session: &mut AudioSession,
    rng: &mut dyn RngCore,
    filter: Filter,
    envelope: Param,
    start: f64,
    length: f64,
) -> Result<()> {
    let noise = noise_source(session, rng)?;
    session.schedule(Voice::new(noise, envelope, start, start + length).with_filter(filter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{FilterKind, OfflineBackend};
    use crate::config::EngineConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn session() -> (AudioSession, OfflineBackend) {
        let backend = OfflineBackend::new(8000, 0.9);
        let mut session = AudioSession::offline(EngineConfig::default(), backend.clone());
        session.init().unwrap();
        (session, backend)
    }

    #[test]
    fn render_before_init_fails() {
        let backend = OfflineBackend::new(8000, 0.9);
        let mut session = AudioSession::offline(EngineConfig::default(), backend);
        let mut rng = StdRng::seed_from_u64(1);
        let err = Instrument::Kick
            .render(&Hit::new(0.1, 1.0, 0), &mut session, &mut rng)
            .unwrap_err();
        assert!(matches!(err, EngineError::AudioNotReady));
    }

    #[test]
    fn kick_sweeps_down_and_stops_itself() {
        let (mut session, backend) = session();
        let mut rng = StdRng::seed_from_u64(1);
        Instrument::Kick
            .render(&Hit::new(1.0, 1.0, 0), &mut session, &mut rng)
            .unwrap();

        let voices = backend.submitted();
        assert_eq!(voices.len(), 1);
        let kick = &voices[0];
        assert_eq!(kick.start, 1.0);
        assert!((kick.stop - 1.3).abs() < 1e-9);
        assert!(kick.shaper.is_some());
        match &kick.source {
            Source::Oscillator { waveform, frequency } => {
                assert_eq!(*waveform, Waveform::Sine);
                assert_eq!(frequency.value_at(1.0), 130.0);
                assert!((frequency.value_at(1.15) - 45.0).abs() < 1e-3);
            }
            other => panic!("unexpected source {:?}", other),
        }
        assert!((kick.gain.value_at(1.002) - 0.9).abs() < 1e-4);
        assert_eq!(kick.gain.value_at(1.25), SILENCE);
    }

    #[test]
    fn clap_layers_three_bursts() {
        let (mut session, backend) = session();
        let mut rng = StdRng::seed_from_u64(2);
        Instrument::Clap
            .render(&Hit::new(0.5, 0.5, 0), &mut session, &mut rng)
            .unwrap();

        let starts: Vec<f64> = backend.submitted().iter().map(|v| v.start - 0.5).collect();
        assert_eq!(starts.len(), 3);
        for (got, want) in starts.iter().zip([0.0, 0.012, 0.025]) {
            assert!((got - want).abs() < 1e-9);
        }
    }

    #[test]
    fn noise_buffers_cover_two_seconds() {
        let (mut session, backend) = session();
        let mut rng = StdRng::seed_from_u64(3);
        Instrument::Hat
            .render(&Hit::new(0.0, 1.0, 0), &mut session, &mut rng)
            .unwrap();

        let voice = &backend.submitted()[0];
        assert_eq!(voice.filter.map(|f| (f.kind, f.cutoff)), Some((FilterKind::Highpass, 6000.0)));
        match &voice.source {
            Source::Noise(buffer) => assert_eq!(buffer.len(), 16_000),
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn crash_rings_long() {
        let (mut session, backend) = session();
        let mut rng = StdRng::seed_from_u64(4);
        Instrument::Crash
            .render(&Hit::new(0.0, 1.0, 0), &mut session, &mut rng)
            .unwrap();
        let voice = &backend.submitted()[0];
        assert_eq!(voice.gain.end_time(), Some(0.9));
        assert!(voice.gain.value_at(0.5) > SILENCE);
    }

    #[test]
    fn keys_voice_a_minor_seventh_on_the_beat_root() {
        let (mut session, backend) = session();
        let mut rng = StdRng::seed_from_u64(5);
        Instrument::Keys
            .render(&Hit::new(0.0, 1.0, 4), &mut session, &mut rng)
            .unwrap();

        let freqs: Vec<f32> = backend
            .submitted()
            .iter()
            .map(|v| match &v.source {
                Source::Oscillator { frequency, .. } => frequency.value_at(0.0),
                _ => 0.0,
            })
            .collect();
        assert_eq!(freqs, minor7(65.41).to_vec());
        assert!(backend.submitted().iter().all(|v| v.delay >= 0.015 && v.delay <= 0.023));
    }

    #[test]
    fn arp_note_index_picks_chord_member() {
        let (mut session, backend) = session();
        let mut rng = StdRng::seed_from_u64(6);
        Instrument::KeysArp
            .render(&Hit::new(0.0, 1.0, 0).with_note(2), &mut session, &mut rng)
            .unwrap();
        match &backend.submitted()[0].source {
            Source::Oscillator { frequency, .. } => {
                assert_eq!(frequency.value_at(0.0), minor7(55.0)[2]);
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn bass_walks_the_scale() {
        let (mut session, backend) = session();
        let mut rng = StdRng::seed_from_u64(7);
        Instrument::Bass
            .render(&Hit::new(0.0, 1.0, 12), &mut session, &mut rng)
            .unwrap();
        let voice = &backend.submitted()[0];
        assert_eq!(voice.filter.map(|f| f.cutoff), Some(220.0));
        match &voice.source {
            Source::Oscillator { waveform, frequency } => {
                assert_eq!(*waveform, Waveform::Sawtooth);
                assert_eq!(frequency.value_at(0.0), 82.41);
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn rendered_kick_is_audible() {
        let (mut session, backend) = session();
        let mut rng = StdRng::seed_from_u64(8);
        Instrument::Kick
            .render(&Hit::new(0.0, 1.0, 0), &mut session, &mut rng)
            .unwrap();
        let out = backend.render_until(0.4);
        let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.01);
        assert!(out[out.len() - 1].abs() < 1e-3);
    }
}
