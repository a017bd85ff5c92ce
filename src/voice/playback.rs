//! Audio playback to speakers
//!
//! [`PlaybackScheduler`] places inbound buffers on the output clock so that
//! consecutive buffers play back to back, and flushes everything on
//! interruption. [`CpalSpeaker`] is a small mixer that starts each buffer at
//! its scheduled frame and reports when it finishes.

use std::collections::BTreeSet;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::PLAYBACK_SAMPLE_RATE;
use crate::{Error, Result};

/// Invoked with a buffer id when it finishes playing naturally
pub type FinishedCallback = Box<dyn FnMut(u64) + Send>;

/// An output device
pub trait Speaker: Send {
    /// Open an output sink
    ///
    /// # Errors
    ///
    /// Returns error if no output device can be opened
    fn open(&mut self, on_finished: FinishedCallback) -> Result<Box<dyn OutputSink>>;
}

/// An open output with a monotonic clock
pub trait OutputSink: Send {
    /// Current output clock position in seconds
    fn now(&self) -> f64;

    /// Schedule mono samples at the playback rate to start at `at` seconds
    ///
    /// # Errors
    ///
    /// Returns error if the device rejects the buffer
    fn start(&mut self, id: u64, samples: Vec<f32>, at: f64) -> Result<()>;

    /// Stop a scheduled or playing buffer. Unknown ids are ignored.
    fn stop(&mut self, id: u64);

    /// Set the output gain (1.0 = unity)
    fn set_gain(&mut self, gain: f32);
}

/// Placement of one scheduled buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduled {
    pub id: u64,
    pub start_at: f64,
    pub duration: f64,
}

/// Gapless, ordered playback scheduling with hard interruption
#[derive(Debug)]
pub struct PlaybackScheduler {
    sample_rate: u32,
    next_start_time: f64,
    active: BTreeSet<u64>,
    next_id: u64,
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new(PLAYBACK_SAMPLE_RATE)
    }
}

impl PlaybackScheduler {
    /// A zero rate falls back to [`PLAYBACK_SAMPLE_RATE`]
    #[must_use]
    pub const fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: if sample_rate == 0 {
                PLAYBACK_SAMPLE_RATE
            } else {
                sample_rate
            },
            next_start_time: 0.0,
            active: BTreeSet::new(),
            next_id: 1,
        }
    }

    /// Schedule a decoded buffer right after the previous one, never in the past
    ///
    /// Empty buffers are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the sink rejects the buffer; the timeline is unchanged
    #[allow(clippy::cast_precision_loss)]
    pub fn enqueue(
        &mut self,
        sink: &mut dyn OutputSink,
        samples: Vec<f32>,
    ) -> Result<Option<Scheduled>> {
        if samples.is_empty() {
            return Ok(None);
        }

        let duration = samples.len() as f64 / f64::from(self.sample_rate);
        let start_at = self.next_start_time.max(sink.now());
        let id = self.next_id;
        self.next_id += 1;

        sink.start(id, samples, start_at)?;

        self.next_start_time = start_at + duration;
        self.active.insert(id);

        tracing::trace!(id, start_at, duration, "buffer scheduled");
        Ok(Some(Scheduled {
            id,
            start_at,
            duration,
        }))
    }

    /// Remove a buffer that finished naturally, returning whether it was active
    pub fn finished(&mut self, id: u64) -> bool {
        self.active.remove(&id)
    }

    /// Stop every active buffer and restart the timeline
    ///
    /// Returns the number of buffers stopped.
    pub fn interrupt(&mut self, sink: &mut dyn OutputSink) -> usize {
        let stopped = self.active.len();
        for id in std::mem::take(&mut self.active) {
            sink.stop(id);
        }
        self.next_start_time = 0.0;

        if stopped > 0 {
            tracing::debug!(stopped, "playback interrupted");
        }
        stopped
    }

    /// Forget all buffers without a sink (after the sink is gone)
    pub fn reset(&mut self) {
        self.active.clear();
        self.next_start_time = 0.0;
    }

    #[must_use]
    pub const fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

/// Decode 16-bit little-endian PCM into f32 samples
///
/// # Errors
///
/// Returns error if the byte count is odd
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(Error::Audio(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        .collect())
}

/// Decode a base64 PCM16 payload
///
/// # Errors
///
/// Returns error if the payload is not valid base64 PCM16
pub fn decode_payload(data: &str) -> Result<Vec<f32>> {
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| Error::Audio(format!("invalid base64 audio: {e}")))?;
    decode_pcm16(&bytes)
}

struct Voice {
    id: u64,
    start_frame: u64,
    samples: Vec<f32>,
    position: f64,
}

struct Mixer {
    frames_rendered: u64,
    voices: Vec<Voice>,
    gain: f32,
}

impl Mixer {
    /// Render interleaved output, returning ids of voices that finished
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn render(&mut self, out: &mut [f32], channels: usize, step: f64) -> Vec<u64> {
        let mut finished = Vec::new();

        for (i, frame) in out.chunks_mut(channels).enumerate() {
            let clock = self.frames_rendered + i as u64;
            let mut mixed = 0.0;

            for voice in &mut self.voices {
                if clock < voice.start_frame {
                    continue;
                }
                let index = voice.position as usize;
                if let Some(sample) = voice.samples.get(index) {
                    mixed += sample;
                    voice.position += step;
                }
            }

            let value = (mixed * self.gain).clamp(-1.0, 1.0);
            for sample in frame.iter_mut() {
                *sample = value;
            }
        }

        self.frames_rendered += (out.len() / channels) as u64;

        self.voices.retain(|v| {
            let done = v.position as usize >= v.samples.len();
            if done {
                finished.push(v.id);
            }
            !done
        });

        finished
    }
}

/// Plays to the default output device via cpal
///
/// Buffers are assumed to be mono at `sample_rate`, the same rate the
/// [`PlaybackScheduler`] feeding this speaker was built with.
#[derive(Debug, Clone, Copy)]
pub struct CpalSpeaker {
    sample_rate: u32,
}

impl CpalSpeaker {
    #[must_use]
    pub const fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl Default for CpalSpeaker {
    fn default() -> Self {
        Self::new(PLAYBACK_SAMPLE_RATE)
    }
}

impl Speaker for CpalSpeaker {
    fn open(&mut self, on_finished: FinishedCallback) -> Result<Box<dyn OutputSink>> {
        let mixer = Arc::new(Mutex::new(Mixer {
            frames_rendered: 0,
            voices: Vec::new(),
            gain: 1.0,
        }));

        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let shared = Arc::clone(&mixer);
        let sample_rate = self.sample_rate;

        let handle = std::thread::Builder::new()
            .name("mayra-playback".to_string())
            .spawn(move || {
                let (stream, device_rate) = match build_output_stream(shared, sample_rate, on_finished) {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(device_rate));

                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("audio playback stopped");
            })?;

        let device_rate = ready_rx
            .recv()
            .map_err(|_| Error::Audio("playback thread exited during startup".to_string()))??;

        Ok(Box::new(CpalOutput {
            mixer,
            device_rate,
            stop: Some(stop_tx),
            handle: Some(handle),
        }))
    }
}

fn build_output_stream(
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
    mut on_finished: FinishedCallback,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let target = SampleRate(sample_rate);
    let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
        c.channels() == channels && c.min_sample_rate() <= target && c.max_sample_rate() >= target
    };

    let native = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| supports(c, 1))
        .or_else(|| {
            // Fallback: try stereo
            device
                .supported_output_configs()
                .ok()?
                .find(|c| supports(c, 2))
        })
        .map(|c| c.with_sample_rate(target).config());

    let config: StreamConfig = match native {
        Some(c) => c,
        None => device
            .default_output_config()
            .map_err(|e| Error::Audio(e.to_string()))?
            .config(),
    };

    let channels = usize::from(config.channels);
    let device_rate = config.sample_rate.0;
    let step = f64::from(sample_rate) / f64::from(device_rate);

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        device_rate,
        channels,
        "audio playback initialized"
    );

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let finished = match mixer.lock() {
                    Ok(mut mixer) => mixer.render(data, channels, step),
                    Err(_) => {
                        data.fill(0.0);
                        return;
                    }
                };
                for id in finished {
                    on_finished(id);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    Ok((stream, device_rate))
}

struct CpalOutput {
    mixer: Arc<Mutex<Mixer>>,
    device_rate: u32,
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl OutputSink for CpalOutput {
    #[allow(clippy::cast_precision_loss)]
    fn now(&self) -> f64 {
        let frames = self.mixer.lock().map(|m| m.frames_rendered).unwrap_or(0);
        frames as f64 / f64::from(self.device_rate)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn start(&mut self, id: u64, samples: Vec<f32>, at: f64) -> Result<()> {
        let start_frame = (at * f64::from(self.device_rate)).round() as u64;
        let mut mixer = self
            .mixer
            .lock()
            .map_err(|_| Error::Audio("playback mixer poisoned".to_string()))?;
        mixer.voices.push(Voice {
            id,
            start_frame,
            samples,
            position: 0.0,
        });
        Ok(())
    }

    fn stop(&mut self, id: u64) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.voices.retain(|v| v.id != id);
        }
    }

    fn set_gain(&mut self, gain: f32) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.gain = gain.max(0.0);
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct ClockSink {
        now: f64,
        started: Vec<(u64, f64)>,
        stopped: Vec<u64>,
    }

    impl OutputSink for ClockSink {
        fn now(&self) -> f64 {
            self.now
        }

        fn start(&mut self, id: u64, _samples: Vec<f32>, at: f64) -> Result<()> {
            self.started.push((id, at));
            Ok(())
        }

        fn stop(&mut self, id: u64) {
            self.stopped.push(id);
        }

        fn set_gain(&mut self, _gain: f32) {}
    }

    #[test]
    fn back_to_back_without_gap() {
        let mut sink = ClockSink::default();
        let mut scheduler = PlaybackScheduler::new(100);

        let a = scheduler.enqueue(&mut sink, vec![0.0; 50]).unwrap().unwrap();
        let b = scheduler.enqueue(&mut sink, vec![0.0; 100]).unwrap().unwrap();

        assert!((a.start_at - 0.0).abs() < 1e-9);
        assert!((b.start_at - 0.5).abs() < 1e-9);
        assert!((scheduler.next_start_time() - 1.5).abs() < 1e-9);
        assert_eq!(scheduler.active_count(), 2);
    }

    #[test]
    fn zero_rate_keeps_timeline_finite() {
        let mut sink = ClockSink::default();
        let mut scheduler = PlaybackScheduler::new(0);

        let a = scheduler.enqueue(&mut sink, vec![0.0; 2400]).unwrap().unwrap();
        let b = scheduler.enqueue(&mut sink, vec![0.0; 2400]).unwrap().unwrap();

        assert!((a.duration - 0.1).abs() < 1e-9);
        assert!((b.start_at - 0.1).abs() < 1e-9);
        assert!(scheduler.next_start_time().is_finite());
    }

    #[test]
    fn late_buffer_clamps_to_now() {
        let mut sink = ClockSink::default();
        let mut scheduler = PlaybackScheduler::new(100);

        scheduler.enqueue(&mut sink, vec![0.0; 10]).unwrap();
        sink.now = 3.0;
        let late = scheduler.enqueue(&mut sink, vec![0.0; 10]).unwrap().unwrap();

        assert!((late.start_at - 3.0).abs() < 1e-9);
    }

    #[test]
    fn interrupt_stops_all_and_resets_clock() {
        let mut sink = ClockSink::default();
        let mut scheduler = PlaybackScheduler::new(100);

        let a = scheduler.enqueue(&mut sink, vec![0.0; 10]).unwrap().unwrap();
        let b = scheduler.enqueue(&mut sink, vec![0.0; 10]).unwrap().unwrap();
        assert!(scheduler.finished(a.id));

        assert_eq!(scheduler.interrupt(&mut sink), 1);
        assert_eq!(sink.stopped, vec![b.id]);
        assert_eq!(scheduler.active_count(), 0);
        assert!(scheduler.next_start_time().abs() < f64::EPSILON);

        // Idempotent on an empty set
        assert_eq!(scheduler.interrupt(&mut sink), 0);
        assert_eq!(sink.stopped.len(), 1);
    }

    #[test]
    fn empty_buffers_are_skipped() {
        let mut sink = ClockSink::default();
        let mut scheduler = PlaybackScheduler::default();
        assert!(scheduler.enqueue(&mut sink, Vec::new()).unwrap().is_none());
        assert!(sink.started.is_empty());
    }

    #[test]
    fn decode_pcm16_values() {
        let bytes = [0x00, 0x00, 0xff, 0x7f, 0x00, 0x80];
        let samples = decode_pcm16(&bytes).unwrap();
        assert!(samples[0].abs() < f32::EPSILON);
        assert!((samples[1] - 32767.0 / 32768.0).abs() < 1e-6);
        assert!((samples[2] + 1.0).abs() < f32::EPSILON);

        assert!(decode_pcm16(&[0x00]).is_err());
        assert!(decode_payload("not base64!").is_err());
    }

    #[test]
    fn mixer_starts_at_scheduled_frame_and_reports_finish() {
        let mut mixer = Mixer {
            frames_rendered: 0,
            voices: vec![Voice {
                id: 7,
                start_frame: 2,
                samples: vec![0.5, 0.5],
                position: 0.0,
            }],
            gain: 1.0,
        };

        let mut out = [0.0_f32; 4];
        let finished = mixer.render(&mut out, 1, 1.0);
        assert_eq!(out, [0.0, 0.0, 0.5, 0.5]);
        assert_eq!(finished, vec![7]);
        assert_eq!(mixer.frames_rendered, 4);
        assert!(mixer.voices.is_empty());
    }
}
