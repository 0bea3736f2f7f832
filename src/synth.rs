//! Demo audio renderer
//!
//! Turns `event-fired` messages into sound: each category gets a small
//! synthesized voice (pitch-dropping sine for kicks, noise bursts for
//! snare/hat, enveloped sines for bass and tonal events). Voices mix into
//! a cpal output stream for live playback, or into a plain sample buffer
//! for offline WAV rendering. The renderer only ever reads from the bus;
//! it never touches scheduler state.

use crate::analysis::SampleFeed;
use crate::bridge::EngineConfig;
use crate::bus::{BusMessage, EventBus, SubscriberId};
use crate::clock::CycleClock;
use crate::error::{GlitchError, Result};
use crate::pattern::{EventCategory, PatternEvent, PatternTable};
use crate::scheduler::SchedulerCore;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::f32::consts::PI;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::error;

/// Voice cap; the oldest voice is stolen beyond this.
const MAX_VOICES: usize = 64;

/// One playing note/hit.
struct Voice {
    phase: f32,
    phase_inc: f32,
    pitch_drop: f32,
    amp: f32,
    decay: f32,
    noise_mix: f32,
    pan: f32,
}

impl Voice {
    fn from_event(event: &PatternEvent, duration_ms: f64, sample_rate: f32) -> Self {
        // freq, noise character and duration scale per category
        let (freq, noise_mix, drop_to, dur_scale) = match event.category {
            EventCategory::Kick => (110.0, 0.05, 0.35f32, 1.0),
            EventCategory::Snare => (180.0, 0.85, 1.0f32, 0.6),
            EventCategory::Hat => (400.0, 1.0, 1.0f32, 0.3),
            EventCategory::Bass => (event.pitch.unwrap_or(55.0) as f32, 0.0, 1.0f32, 1.0),
            EventCategory::Tonal => (event.pitch.unwrap_or(220.0) as f32, 0.0, 1.0f32, 1.0),
        };

        let dur_samples = (duration_ms / 1000.0 * sample_rate as f64 * dur_scale).max(1.0) as f32;
        Self {
            phase: 0.0,
            phase_inc: freq / sample_rate,
            pitch_drop: drop_to.powf(1.0 / dur_samples),
            amp: event.gain,
            decay: 1e-3f32.powf(1.0 / dur_samples),
            noise_mix,
            pan: event.pan.unwrap_or(0.0).clamp(-1.0, 1.0),
        }
    }

    fn next(&mut self) -> f32 {
        let tone = (2.0 * PI * self.phase).sin();
        let noise = fastrand::f32() * 2.0 - 1.0;
        let sample = (tone * (1.0 - self.noise_mix) + noise * self.noise_mix) * self.amp;

        self.phase = (self.phase + self.phase_inc).fract();
        self.phase_inc *= self.pitch_drop;
        self.amp *= self.decay;
        sample
    }

    /// Equal-power stereo placement.
    fn panned(&self, sample: f32) -> (f32, f32) {
        let theta = (self.pan + 1.0) * PI / 4.0;
        (sample * theta.cos(), sample * theta.sin())
    }

    fn finished(&self) -> bool {
        self.amp < 1e-4
    }
}

fn mix_frame(voices: &mut [Voice]) -> (f32, f32) {
    let mut left = 0.0;
    let mut right = 0.0;
    for voice in voices.iter_mut() {
        let sample = voice.next();
        let (l, r) = voice.panned(sample);
        left += l;
        right += r;
    }
    // soft clip the voice sum
    ((left * 0.8).tanh(), (right * 0.8).tanh())
}

fn push_voice(voices: &mut Vec<Voice>, voice: Voice) {
    if voices.len() >= MAX_VOICES {
        voices.remove(0);
    }
    voices.push(voice);
}

/// Sample rate of the default output device, for wiring an `FftSource`
/// to the same rate the renderer will run at.
pub fn default_output_sample_rate() -> Result<u32> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| GlitchError::Audio("no output device available".to_string()))?;
    let config = device
        .default_output_config()
        .map_err(|e| GlitchError::Audio(e.to_string()))?;
    Ok(config.sample_rate().0)
}

/// Live renderer bound to the default output device.
///
/// Optionally taps its mono mix into a `SampleFeed` so the live FFT
/// source can analyze what is actually playing.
pub struct AudioRenderer {
    _stream: cpal::Stream,
    bus: Arc<EventBus>,
    subscription: SubscriberId,
}

impl AudioRenderer {
    pub fn start(bus: Arc<EventBus>, feed: Option<SampleFeed>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| GlitchError::Audio("no output device available".to_string()))?;
        let config = device
            .default_output_config()
            .map_err(|e| GlitchError::Audio(e.to_string()))?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.config().channels as usize;
        let voices = Arc::new(Mutex::new(Vec::<Voice>::new()));

        let subscription = {
            let voices = Arc::clone(&voices);
            bus.subscribe(move |message| {
                if let BusMessage::EventFired {
                    event, duration_ms, ..
                } = message
                {
                    push_voice(
                        &mut voices.lock().unwrap(),
                        Voice::from_event(event, *duration_ms, sample_rate),
                    );
                }
            })
        };

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                let voices = Arc::clone(&voices);
                let mut tap: Vec<f32> = Vec::new();
                device
                    .build_output_stream(
                        &config.config(),
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            tap.clear();
                            let mut vs = voices.lock().unwrap();
                            for frame in data.chunks_mut(channels) {
                                let (left, right) = mix_frame(&mut vs);
                                if channels >= 2 {
                                    frame[0] = left;
                                    frame[1] = right;
                                    for extra in frame.iter_mut().skip(2) {
                                        *extra = 0.0;
                                    }
                                } else {
                                    frame[0] = (left + right) * 0.5;
                                }
                                tap.push((left + right) * 0.5);
                            }
                            vs.retain(|v| !v.finished());
                            drop(vs);
                            if let Some(feed) = &feed {
                                feed.push(&tap);
                            }
                        },
                        |err| error!("audio stream error: {err}"),
                        None,
                    )
                    .map_err(|e| GlitchError::Audio(e.to_string()))?
            }
            other => {
                return Err(GlitchError::Audio(format!(
                    "unsupported sample format {other:?}"
                )))
            }
        };

        stream
            .play()
            .map_err(|e| GlitchError::Audio(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            bus,
            subscription,
        })
    }
}

impl Drop for AudioRenderer {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.subscription);
    }
}

/// Render a pattern offline: whole cycles into a mono sample buffer.
///
/// Drives the same scheduler core the live engine uses, one tick per
/// block, so offline output and live playback schedule identically.
pub fn render_cycles(
    table: &PatternTable,
    engine: &EngineConfig,
    cycles: u32,
    sample_rate: u32,
) -> Result<Vec<f32>> {
    let cycle_ms = engine.validate()?;
    let sr = sample_rate as f64;
    let clock = CycleClock::with_cycle_ms(0.0, cycle_ms);
    let mut core = SchedulerCore::new(clock, table.clone(), engine.tick_interval_ms);

    let total_samples = (cycle_ms * cycles as f64 / 1000.0 * sr) as usize;
    let block = ((engine.tick_interval_ms / 1000.0 * sr) as usize).max(1);

    let mut voices: Vec<Voice> = Vec::new();
    for fired in core.begin(0.0) {
        let duration_ms = fired.event.duration_cycles() * cycle_ms;
        push_voice(
            &mut voices,
            Voice::from_event(&fired.event, duration_ms, sample_rate as f32),
        );
    }

    let mut out = Vec::with_capacity(total_samples);
    let mut now_ms = 0.0;
    while out.len() < total_samples {
        let n = block.min(total_samples - out.len());
        for _ in 0..n {
            let (left, right) = mix_frame(&mut voices);
            out.push((left + right) * 0.5);
        }
        voices.retain(|v| !v.finished());

        now_ms += engine.tick_interval_ms;
        for fired in core.tick(now_ms) {
            let duration_ms = fired.event.duration_cycles() * cycle_ms;
            push_voice(
                &mut voices,
                Voice::from_event(&fired.event, duration_ms, sample_rate as f32),
            );
        }
    }

    Ok(out)
}

/// Write a mono buffer as 16-bit WAV.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| GlitchError::Audio(e.to_string()))?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(value)
            .map_err(|e| GlitchError::Audio(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| GlitchError::Audio(e.to_string()))?;
    Ok(())
}
