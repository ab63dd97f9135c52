/// Playback engine - look-ahead scheduler that coordinates timing and triggers
///
/// A wall-clock timer wakes the engine every few milliseconds. Each wake
/// emits every step whose start falls inside a short window past the audio
/// clock, so hits are timestamped on the audio clock rather than on the
/// jittery timer.
use std::time::{Duration, Instant};

use rand::RngCore;

use super::{SchedulingConfig, Sequencer, MELODIC_TRACK, STEPS};
use crate::audio::AudioSession;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::synth::registry::KEYS_ARP;
use crate::synth::{Hit, InstrumentRegistry};

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Highlighted step after a tick; `None` once stopped.
    StepAdvanced(Option<usize>),
    NoteOn {
        track: String,
        step: usize,
        time: f64,
        velocity: f32,
        note_index: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Running,
}

/// Logical clock of the scheduler: the next step to emit and when it starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
    pub next_step: usize,
    pub next_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Keep,
    Restart,
}

/// Whether a running loop must be torn down and restarted (losing phase)
/// after the scheduling inputs change from `old` to `new`. Tempo, swing,
/// pattern and arpeggiator changes restart; track mix changes apply in place.
pub fn restart_policy(old: &SchedulingConfig, new: &SchedulingConfig) -> RestartDecision {
    if old.tempo != new.tempo
        || old.swing != new.swing
        || old.pattern != new.pattern
        || old.arp != new.arp
    {
        RestartDecision::Restart
    } else {
        RestartDecision::Keep
    }
}

/// Everything a tick reads or feeds.
pub struct TickContext<'a> {
    pub sequencer: &'a Sequencer,
    pub registry: &'a InstrumentRegistry,
    pub session: &'a mut AudioSession,
    pub rng: &'a mut dyn RngCore,
}

#[derive(Debug)]
struct TickTimer {
    interval: Duration,
    next_wake: Option<Instant>,
}

impl TickTimer {
    fn arm(&mut self, now: Instant) {
        self.next_wake = Some(now + self.interval);
    }

    fn cancel(&mut self) {
        self.next_wake = None;
    }

    fn is_due(&self, now: Instant) -> bool {
        self.next_wake.is_some_and(|wake| wake <= now)
    }

    /// Consume a due wake and arm the next one.
    fn take_due(&mut self, now: Instant) -> bool {
        let Some(wake) = self.next_wake else {
            return false;
        };
        if wake > now {
            return false;
        }
        let next = wake + self.interval;
        self.next_wake = Some(if next <= now { now + self.interval } else { next });
        true
    }
}

pub struct PlaybackEngine {
    state: PlaybackState,
    cursor: Cursor,
    timer: TickTimer,
    schedule_ahead: f64,
    start_delay: f64,
    highlighted: Option<usize>,
    events: Vec<PlaybackEvent>,
}

impl PlaybackEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: PlaybackState::Stopped,
            cursor: Cursor {
                next_step: 0,
                next_time: 0.0,
            },
            timer: TickTimer {
                interval: Duration::from_millis(config.lookahead_ms),
                next_wake: None,
            },
            schedule_ahead: config.schedule_ahead_secs,
            start_delay: config.start_delay_secs,
            highlighted: None,
            events: Vec::new(),
        }
    }

    /// Reset the cursor to step 0 just after `audio_now` and arm the timer.
    pub fn start(&mut self, audio_now: f64, wall_now: Instant) {
        self.timer.cancel();
        self.cursor = Cursor {
            next_step: 0,
            next_time: audio_now + self.start_delay,
        };
        self.state = PlaybackState::Running;
        self.timer.arm(wall_now);
        log::info!("Playback started at {:.3}s", self.cursor.next_time);
    }

    pub fn stop(&mut self) {
        self.timer.cancel();
        if self.state == PlaybackState::Running {
            log::info!("Playback stopped");
        }
        self.state = PlaybackState::Stopped;
        self.highlighted = None;
        self.events.push(PlaybackEvent::StepAdvanced(None));
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PlaybackState::Running
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Step shown as current; one step ahead of what is audible.
    pub fn highlighted_step(&self) -> Option<usize> {
        self.highlighted
    }

    pub fn is_due(&self, wall_now: Instant) -> bool {
        self.is_running() && self.timer.is_due(wall_now)
    }

    /// Wall-clock instant of the next wake, if armed.
    pub fn next_wake(&self) -> Option<Instant> {
        self.timer.next_wake
    }

    /// Run a tick if the timer says one is due. Returns whether it ran.
    pub fn pump(&mut self, wall_now: Instant, ctx: &mut TickContext<'_>) -> Result<bool> {
        if !self.is_running() || !self.timer.take_due(wall_now) {
            return Ok(false);
        }
        self.tick(ctx)?;
        Ok(true)
    }

    /// Emit every step that starts before the lookahead horizon. A failure
    /// ends the running session.
    pub fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        let result = self.fill_window(ctx);
        if let Err(e) = &result {
            log::error!("Scheduling failed, stopping playback: {}", e);
            self.stop();
        }
        result
    }

    fn fill_window(&mut self, ctx: &mut TickContext<'_>) -> Result<()> {
        let horizon = ctx.session.current_time()? + self.schedule_ahead;
        let step_duration = ctx.sequencer.step_duration();
        let mut emitted = 0;

        while self.cursor.next_time < horizon {
            self.schedule_note(self.cursor.next_step, self.cursor.next_time, ctx)?;
            self.cursor.next_step = (self.cursor.next_step + 1) % STEPS;
            self.cursor.next_time += step_duration;
            emitted += 1;
        }
        if emitted > 1 {
            log::debug!("Caught up {} steps in one tick", emitted);
        }

        self.highlighted = Some(self.cursor.next_step);
        self.events.push(PlaybackEvent::StepAdvanced(self.highlighted));
        Ok(())
    }

    fn schedule_note(&mut self, step: usize, time: f64, ctx: &mut TickContext<'_>) -> Result<()> {
        let sequencer = ctx.sequencer;
        let registry = ctx.registry;
        let play_at = time + sequencer.swing_offset(step);
        let arp = sequencer.arp();

        for track in sequencer.audible_tracks() {
            if !sequencer.pattern().get(&track.id, step) {
                continue;
            }

            if track.id == MELODIC_TRACK && arp.enabled {
                let instrument = registry.resolve(KEYS_ARP)?;
                for (offset, note) in arp.subdivide(sequencer.step_duration(), ctx.rng) {
                    let hit = Hit::new(play_at + offset, track.volume, step).with_note(note);
                    instrument.render(&hit, ctx.session, ctx.rng)?;
                    self.events.push(PlaybackEvent::NoteOn {
                        track: track.id.clone(),
                        step,
                        time: hit.time,
                        velocity: hit.velocity,
                        note_index: Some(note),
                    });
                }
            } else {
                let instrument = registry.resolve(&track.id)?;
                let hit = Hit::new(play_at, track.volume, step);
                instrument.render(&hit, ctx.session, ctx.rng)?;
                self.events.push(PlaybackEvent::NoteOn {
                    track: track.id.clone(),
                    step,
                    time: hit.time,
                    velocity: hit.velocity,
                    note_index: None,
                });
            }
        }
        Ok(())
    }

    pub fn poll_events(&mut self) -> Vec<PlaybackEvent> {
        std::mem::take(&mut self.events)
    }
}
