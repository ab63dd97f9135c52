/// Sample renderer for scheduled voices: the master bus.
///
/// Runs on the backend's realtime thread (or inline for offline rendering).
/// Voices are summed; nothing coordinates them beyond the shared master gain.
use std::f32::consts::PI;

use super::graph::{Filter, FilterKind, Source, Voice};

// RBJ cookbook biquad, transposed direct form II
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Biquad {
    fn new(filter: &Filter, sample_rate: f32) -> Self {
        let w0 = 2.0 * PI * (filter.cutoff / sample_rate).clamp(0.0001, 0.49);
        let alpha = w0.sin() / (2.0 * filter.q.max(0.1));
        let cosw0 = w0.cos();

        let (b0, b1, b2) = match filter.kind {
            FilterKind::Lowpass => ((1.0 - cosw0) / 2.0, 1.0 - cosw0, (1.0 - cosw0) / 2.0),
            FilterKind::Highpass => ((1.0 + cosw0) / 2.0, -(1.0 + cosw0), (1.0 + cosw0) / 2.0),
            FilterKind::Bandpass => (alpha, 0.0, -alpha),
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cosw0;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    fn new(delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; delay_samples.max(1)],
            write_pos: 0,
        }
    }

    fn process(&mut self, x: f32) -> f32 {
        let y = self.buffer[self.write_pos];
        self.buffer[self.write_pos] = x;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        y
    }
}

/// Map `x` through a waveshaper curve the way a shaper node does: [-1, 1]
/// spans the table, with linear interpolation between entries.
pub fn shape(curve: &[f32], x: f32) -> f32 {
    match curve.len() {
        0 => x,
        1 => curve[0],
        n => {
            let pos = (x.clamp(-1.0, 1.0) + 1.0) * 0.5 * (n - 1) as f32;
            let i = (pos.floor() as usize).min(n - 2);
            let frac = pos - i as f32;
            curve[i] + (curve[i + 1] - curve[i]) * frac
        }
    }
}

struct ActiveVoice {
    voice: Voice,
    phase: f64,
    noise_pos: usize,
    filter: Option<Biquad>,
    delay: Option<DelayLine>,
}

impl ActiveVoice {
    fn new(voice: Voice, sample_rate: f32) -> Self {
        let filter = voice.filter.as_ref().map(|f| Biquad::new(f, sample_rate));
        let delay_samples = (voice.delay * sample_rate as f64).round() as usize;
        let delay = (delay_samples > 0).then(|| DelayLine::new(delay_samples));
        Self {
            voice,
            phase: 0.0,
            noise_pos: 0,
            filter,
            delay,
        }
    }

    fn next_sample(&mut self, t: f64, sample_rate: f32) -> f32 {
        let mut x = if t < self.voice.stop {
            match &self.voice.source {
                Source::Oscillator { waveform, frequency } => {
                    let s = waveform.sample(self.phase);
                    let increment = frequency.value_at(t) as f64 / sample_rate as f64;
                    self.phase = (self.phase + increment).fract();
                    s
                }
                Source::Noise(buffer) => {
                    let s = if buffer.is_empty() {
                        0.0
                    } else {
                        buffer[self.noise_pos % buffer.len()]
                    };
                    self.noise_pos += 1;
                    s
                }
            }
        } else {
            0.0
        };

        if let Some(curve) = &self.voice.shaper {
            x = shape(curve, x);
        }
        if let Some(filter) = &mut self.filter {
            x = filter.process(x);
        }
        if let Some(delay) = &mut self.delay {
            x = delay.process(x);
        }
        x * self.voice.level * self.voice.gain.value_at(t)
    }
}

pub struct Mixer {
    sample_rate: f32,
    master_gain: f32,
    frame: u64,
    voices: Vec<ActiveVoice>,
}

impl Mixer {
    pub fn new(sample_rate: u32, master_gain: f32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            master_gain,
            frame: 0,
            voices: Vec::new(),
        }
    }

    pub fn add(&mut self, voice: Voice) {
        self.voices.push(ActiveVoice::new(voice, self.sample_rate));
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Frames rendered so far; the backend clock is derived from this.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn time(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    /// Jump the clock forward without rendering; voices that end before the
    /// new position are dropped.
    pub fn seek(&mut self, frame: u64) {
        self.frame = frame.max(self.frame);
        let now = self.time();
        self.voices.retain(|v| v.voice.end_time() > now);
    }

    /// Fill an interleaved buffer, writing the same mono mix to every channel.
    pub fn render(&mut self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in data.chunks_mut(channels) {
            let t = self.frame as f64 / self.sample_rate as f64;
            let mut sum = 0.0;
            for active in &mut self.voices {
                if t >= active.voice.start && t < active.voice.end_time() {
                    sum += active.next_sample(t, self.sample_rate);
                }
            }
            let out = sum * self.master_gain;
            for sample in frame.iter_mut() {
                *sample = out;
            }
            self.frame += 1;
        }
        let now = self.time();
        self.voices.retain(|v| v.voice.end_time() > now);
    }
}
