/// Audio-graph node descriptions: what a single hit asks the backend to play.
///
/// A `Voice` is a source routed through an optional waveshaper, filter and
/// delay into a gain stage with a scheduled envelope. Every voice carries its
/// own stop time, so the renderer drops it without outside bookkeeping.
use std::sync::Arc;

/// Envelope floor. Exponential ramps can never reach or start from zero.
pub const SILENCE: f32 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    Sine,
    Triangle,
    Sawtooth,
}

impl Waveform {
    /// Sample the waveform at `phase` in [0, 1).
    pub fn sample(self, phase: f64) -> f32 {
        let p = phase as f32;
        match self {
            Waveform::Sine => (p * 2.0 * std::f32::consts::PI).sin(),
            Waveform::Triangle => 1.0 - 4.0 * (p - 0.5).abs(),
            Waveform::Sawtooth => 2.0 * p - 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Bandpass,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Filter {
    pub kind: FilterKind,
    pub cutoff: f32,
    pub q: f32,
}

impl Filter {
    pub fn lowpass(cutoff: f32) -> Self {
        Self {
            kind: FilterKind::Lowpass,
            cutoff,
            q: std::f32::consts::FRAC_1_SQRT_2,
        }
    }

    pub fn highpass(cutoff: f32) -> Self {
        Self {
            kind: FilterKind::Highpass,
            cutoff,
            q: std::f32::consts::FRAC_1_SQRT_2,
        }
    }

    pub fn bandpass(cutoff: f32) -> Self {
        Self {
            kind: FilterKind::Bandpass,
            cutoff,
            q: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Automation {
    Set { time: f64, value: f32 },
    Linear { time: f64, value: f32 },
    Exponential { time: f64, value: f32 },
}

impl Automation {
    fn time(&self) -> f64 {
        match *self {
            Automation::Set { time, .. }
            | Automation::Linear { time, .. }
            | Automation::Exponential { time, .. } => time,
        }
    }

    fn value(&self) -> f32 {
        match *self {
            Automation::Set { value, .. }
            | Automation::Linear { value, .. }
            | Automation::Exponential { value, .. } => value,
        }
    }
}

/// A schedulable parameter: an initial value plus a timeline of set/ramp events.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    initial: f32,
    events: Vec<Automation>,
}

impl Param {
    pub fn new(initial: f32) -> Self {
        Self {
            initial,
            events: Vec::new(),
        }
    }

    pub fn set(mut self, time: f64, value: f32) -> Self {
        self.push(Automation::Set { time, value });
        self
    }

    /// Ramp linearly from the previous event to `value`, arriving at `time`.
    pub fn linear_to(mut self, value: f32, time: f64) -> Self {
        self.push(Automation::Linear { time, value });
        self
    }

    /// Ramp exponentially from the previous event to `value`, arriving at `time`.
    pub fn exp_to(mut self, value: f32, time: f64) -> Self {
        self.push(Automation::Exponential {
            time,
            value: value.max(SILENCE),
        });
        self
    }

    fn push(&mut self, event: Automation) {
        let at = self
            .events
            .iter()
            .position(|e| e.time() > event.time())
            .unwrap_or(self.events.len());
        self.events.insert(at, event);
    }

    /// Time of the last scheduled event, if any.
    pub fn end_time(&self) -> Option<f64> {
        self.events.last().map(Automation::time)
    }

    pub fn value_at(&self, t: f64) -> f32 {
        let mut prev_time = f64::NEG_INFINITY;
        let mut prev_value = self.initial;

        for event in &self.events {
            if event.time() <= t {
                prev_time = event.time();
                prev_value = event.value();
                continue;
            }
            let span = event.time() - prev_time;
            if !span.is_finite() || span <= 0.0 {
                return prev_value;
            }
            let progress = ((t - prev_time) / span) as f32;
            return match *event {
                Automation::Set { .. } => prev_value,
                Automation::Linear { value, .. } => prev_value + (value - prev_value) * progress,
                Automation::Exponential { value, .. } => {
                    if prev_value <= 0.0 {
                        prev_value
                    } else {
                        prev_value * (value / prev_value).powf(progress)
                    }
                }
            };
        }
        prev_value
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Oscillator { waveform: Waveform, frequency: Param },
    /// Looping buffer of uniform white noise.
    Noise(Arc<[f32]>),
}

/// One self-terminating chain of nodes feeding the master bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub source: Source,
    pub shaper: Option<Arc<[f32]>>,
    pub filter: Option<Filter>,
    /// Delay line length in seconds; zero bypasses it.
    pub delay: f64,
    /// Static pre-envelope gain.
    pub level: f32,
    pub gain: Param,
    pub start: f64,
    pub stop: f64,
}

impl Voice {
    pub fn new(source: Source, gain: Param, start: f64, stop: f64) -> Self {
        Self {
            source,
            shaper: None,
            filter: None,
            delay: 0.0,
            level: 1.0,
            gain,
            start,
            stop,
        }
    }

    pub fn with_shaper(mut self, curve: Arc<[f32]>) -> Self {
        self.shaper = Some(curve);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_delay(mut self, seconds: f64) -> Self {
        self.delay = seconds.max(0.0);
        self
    }

    pub fn with_level(mut self, level: f32) -> Self {
        self.level = level;
        self
    }

    /// Time after which the voice contributes nothing to the bus.
    pub fn end_time(&self) -> f64 {
        self.stop + self.delay
    }
}
