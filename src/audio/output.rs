/// Audio output using cpal
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{unbounded, Receiver, Sender};

use super::graph::Voice;
use super::render::Mixer;
use super::AudioBackend;
use crate::error::{EngineError, Result};

/// Realtime device backend. Voices cross to the render thread over a channel;
/// the render thread publishes its frame count back as the session clock.
pub struct CpalBackend {
    _stream: cpal::Stream,
    sender: Sender<Voice>,
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl CpalBackend {
    pub fn new(master_gain: f32) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::Backend("no output device available".into()))?;
        let config = device
            .default_output_config()
            .map_err(|e| EngineError::Backend(e.to_string()))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        let (sender, receiver) = unbounded();
        let frames = Arc::new(AtomicU64::new(0));

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => Self::setup_audio_stream(
                &device,
                &config.into(),
                channels,
                Mixer::new(sample_rate, master_gain),
                receiver,
                Arc::clone(&frames),
            )?,
            format => {
                return Err(EngineError::Backend(format!(
                    "unsupported sample format: {:?}",
                    format
                )))
            }
        };

        stream.play().map_err(|e| EngineError::Backend(e.to_string()))?;
        log::info!(
            "Audio output running at {} Hz, {} channel(s)",
            sample_rate,
            channels
        );

        Ok(Self {
            _stream: stream,
            sender,
            frames,
            sample_rate,
        })
    }

    fn setup_audio_stream(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        channels: usize,
        mut mixer: Mixer,
        receiver: Receiver<Voice>,
        frames: Arc<AtomicU64>,
    ) -> Result<cpal::Stream> {
        device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    while let Ok(voice) = receiver.try_recv() {
                        mixer.add(voice);
                    }
                    mixer.render(data, channels);
                    frames.store(mixer.frame(), Ordering::Release);
                },
                |err| log::error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| EngineError::Backend(e.to_string()))
    }
}

impl AudioBackend for CpalBackend {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn submit(&mut self, voice: Voice) -> Result<()> {
        self.sender
            .send(voice)
            .map_err(|_| EngineError::Backend("audio render thread has stopped".into()))
    }
}
