/// Audio session ownership and the backends that render scheduled voices
use std::cell::RefCell;
use std::rc::Rc;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

pub mod graph;
pub mod output;
pub mod render;

pub use graph::{Filter, FilterKind, Param, Source, Voice, Waveform, SILENCE};
pub use output::CpalBackend;
pub use render::Mixer;

/// What the scheduler and synthesis engine need from a rendering backend:
/// a monotonic clock and a place to hand future-timestamped voices.
pub trait AudioBackend {
    fn sample_rate(&self) -> u32;
    fn current_time(&self) -> f64;
    fn submit(&mut self, voice: Voice) -> Result<()>;
}

type BackendFactory = Box<dyn FnMut(&EngineConfig) -> Result<Box<dyn AudioBackend>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active,
    Disposed,
}

/// The single owned audio context: backend, master bus settings and lifecycle.
pub struct AudioSession {
    state: SessionState,
    backend: Option<Box<dyn AudioBackend>>,
    factory: BackendFactory,
    config: EngineConfig,
}

impl AudioSession {
    /// Create an uninitialized session; `factory` opens the backend on first use.
    pub fn new<F>(config: EngineConfig, factory: F) -> Self
    where
        F: FnMut(&EngineConfig) -> Result<Box<dyn AudioBackend>> + 'static,
    {
        Self {
            state: SessionState::Uninitialized,
            backend: None,
            factory: Box::new(factory),
            config,
        }
    }

    /// Session that opens the default cpal output device when initialized.
    pub fn cpal(config: EngineConfig) -> Self {
        Self::new(config, |config| {
            let backend = CpalBackend::new(config.master_gain)?;
            Ok(Box::new(backend) as Box<dyn AudioBackend>)
        })
    }

    /// Session backed by a manually clocked offline renderer.
    pub fn offline(config: EngineConfig, backend: OfflineBackend) -> Self {
        Self::new(config, move |_| Ok(Box::new(backend.clone()) as Box<dyn AudioBackend>))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open the backend if needed. Idempotent once active.
    pub fn init(&mut self) -> Result<()> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Disposed => Err(EngineError::AudioNotReady),
            SessionState::Uninitialized => {
                let backend = (self.factory)(&self.config)?;
                log::info!("Audio session active at {} Hz", backend.sample_rate());
                self.backend = Some(backend);
                self.state = SessionState::Active;
                Ok(())
            }
        }
    }

    pub fn dispose(&mut self) {
        if self.backend.take().is_some() {
            log::info!("Audio session disposed");
        }
        self.state = SessionState::Disposed;
    }

    fn backend(&self) -> Result<&dyn AudioBackend> {
        match (&self.state, &self.backend) {
            (SessionState::Active, Some(backend)) => Ok(backend.as_ref()),
            _ => Err(EngineError::AudioNotReady),
        }
    }

    pub fn current_time(&self) -> Result<f64> {
        Ok(self.backend()?.current_time())
    }

    pub fn sample_rate(&self) -> Result<u32> {
        Ok(self.backend()?.sample_rate())
    }

    pub fn schedule(&mut self, voice: Voice) -> Result<()> {
        match (&self.state, &mut self.backend) {
            (SessionState::Active, Some(backend)) => backend.submit(voice),
            _ => Err(EngineError::AudioNotReady),
        }
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

struct OfflineState {
    mixer: Mixer,
    submitted: Vec<Voice>,
}

/// Backend whose clock only moves when told to. Renders in-process on demand
/// and keeps every submitted voice for inspection.
#[derive(Clone)]
pub struct OfflineBackend {
    sample_rate: u32,
    inner: Rc<RefCell<OfflineState>>,
}

impl OfflineBackend {
    pub fn new(sample_rate: u32, master_gain: f32) -> Self {
        Self {
            sample_rate,
            inner: Rc::new(RefCell::new(OfflineState {
                mixer: Mixer::new(sample_rate, master_gain),
                submitted: Vec::new(),
            })),
        }
    }

    fn frame_at(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }

    /// Move the clock to `seconds` without producing audio.
    pub fn set_time(&self, seconds: f64) {
        let frame = self.frame_at(seconds);
        self.inner.borrow_mut().mixer.seek(frame);
    }

    pub fn advance(&self, seconds: f64) {
        let now = self.current_time();
        self.set_time(now + seconds);
    }

    /// Render mono output from the current clock up to `seconds`.
    pub fn render_until(&self, seconds: f64) -> Vec<f32> {
        let mut inner = self.inner.borrow_mut();
        let target = self.frame_at(seconds);
        let frames = target.saturating_sub(inner.mixer.frame()) as usize;
        let mut out = vec![0.0; frames];
        inner.mixer.render(&mut out, 1);
        out
    }

    pub fn submitted(&self) -> Vec<Voice> {
        self.inner.borrow().submitted.clone()
    }

    pub fn submitted_count(&self) -> usize {
        self.inner.borrow().submitted.len()
    }

    pub fn clear_submitted(&self) {
        self.inner.borrow_mut().submitted.clear();
    }
}

impl AudioBackend for OfflineBackend {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.inner.borrow().mixer.time()
    }

    fn submit(&mut self, voice: Voice) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.submitted.push(voice.clone());
        inner.mixer.add(voice);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blip(start: f64) -> Voice {
        Voice::new(
            Source::Noise(vec![0.5; 64].into()),
            Param::new(1.0),
            start,
            start + 0.01,
        )
    }

    #[test]
    fn lifecycle_runs_init_active_disposed() {
        let backend = OfflineBackend::new(8000, 1.0);
        let mut session = AudioSession::offline(EngineConfig::default(), backend);
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(matches!(session.current_time(), Err(EngineError::AudioNotReady)));

        session.init().unwrap();
        session.init().unwrap();
        assert!(session.is_active());

        session.dispose();
        assert_eq!(session.state(), SessionState::Disposed);
        assert!(matches!(session.schedule(blip(0.0)), Err(EngineError::AudioNotReady)));
        assert!(matches!(session.init(), Err(EngineError::AudioNotReady)));
    }

    #[test]
    fn scheduling_before_init_is_rejected() {
        let backend = OfflineBackend::new(8000, 1.0);
        let mut session = AudioSession::offline(EngineConfig::default(), backend.clone());
        assert!(matches!(session.schedule(blip(0.0)), Err(EngineError::AudioNotReady)));
        assert_eq!(backend.submitted_count(), 0);
    }

    #[test]
    fn offline_clock_follows_rendering() {
        let backend = OfflineBackend::new(8000, 1.0);
        let mut session = AudioSession::offline(EngineConfig::default(), backend.clone());
        session.init().unwrap();
        session.schedule(blip(0.5)).unwrap();

        backend.set_time(0.25);
        assert_eq!(session.current_time().unwrap(), 0.25);

        let out = backend.render_until(0.6);
        assert_eq!(out.len(), 2800);
        assert!(out.iter().any(|s| *s != 0.0));
        assert_eq!(session.current_time().unwrap(), 0.6);
    }
}
