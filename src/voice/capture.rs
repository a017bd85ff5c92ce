//! Audio capture from microphone
//!
//! The device stream runs on a dedicated thread (cpal streams are not `Send`)
//! and hands fixed-size mono frames to a callback. [`CapturePipeline`] turns
//! each frame into a smoothed volume reading and a base64 PCM16 chunk.

use std::sync::mpsc;
use std::thread::JoinHandle;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use rubato::{FftFixedIn, Resampler};

use super::{CAPTURE_SAMPLE_RATE, FRAME_SIZE, VOLUME_SMOOTHING};
use crate::config::AudioConfig;
use crate::{Error, Result};

/// Receives each captured frame of mono samples
pub type FrameCallback = Box<dyn FnMut(Vec<f32>) + Send>;

/// A source of microphone frames
pub trait Microphone: Send {
    /// Start capturing, delivering frames to `on_frame` until the stream stops
    ///
    /// # Errors
    ///
    /// Returns `Error::Microphone` if no device is available or access is denied
    fn open(&mut self, on_frame: FrameCallback) -> Result<Box<dyn CaptureStream>>;
}

/// A running capture stream
pub trait CaptureStream: Send {
    /// Stop delivering frames. Idempotent.
    fn stop(&mut self);
}

/// Root-mean-square loudness of a frame, clamped to [0, 1]
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt().clamp(0.0, 1.0)
}

/// Exponentially smoothed volume signal
#[derive(Debug, Clone, Copy)]
pub struct VolumeMeter {
    value: f32,
    smoothing: f32,
}

impl Default for VolumeMeter {
    fn default() -> Self {
        Self::new(VOLUME_SMOOTHING)
    }
}

impl VolumeMeter {
    /// Create a meter; `smoothing` is the weight kept from the previous value
    #[must_use]
    pub const fn new(smoothing: f32) -> Self {
        Self {
            value: 0.0,
            smoothing,
        }
    }

    /// Fold in an instantaneous reading and return the new value
    pub fn update(&mut self, instantaneous: f32) -> f32 {
        self.value = self
            .smoothing
            .mul_add(self.value, (1.0 - self.smoothing) * instantaneous);
        self.value
    }

    #[must_use]
    pub const fn value(&self) -> f32 {
        self.value
    }

    pub const fn reset(&mut self) {
        self.value = 0.0;
    }
}

/// Encode samples as 16-bit little-endian PCM
#[must_use]
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// One realtime-input chunk for the live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Base64 PCM16 payload
    pub data: String,
    /// e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
}

/// Turns captured frames into volume readings and wire chunks
#[derive(Debug, Clone)]
pub struct CapturePipeline {
    meter: VolumeMeter,
    mime_type: String,
}

impl Default for CapturePipeline {
    fn default() -> Self {
        Self::new(&AudioConfig::default())
    }
}

impl CapturePipeline {
    #[must_use]
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            meter: VolumeMeter::new(config.volume_smoothing),
            mime_type: format!("audio/pcm;rate={}", config.input_sample_rate),
        }
    }

    /// Update the volume signal from a frame and encode it
    pub fn process(&mut self, samples: &[f32]) -> AudioChunk {
        self.meter.update(rms(samples));
        AudioChunk {
            data: STANDARD.encode(encode_pcm16(samples)),
            mime_type: self.mime_type.clone(),
        }
    }

    /// Current smoothed volume
    #[must_use]
    pub const fn volume(&self) -> f32 {
        self.meter.value()
    }

    pub const fn reset(&mut self) {
        self.meter.reset();
    }
}

/// Splits a sample stream into fixed-size frames
#[derive(Debug)]
pub struct FrameChunker {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameChunker {
    #[must_use]
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Buffer samples, emitting every complete frame
    pub fn push(&mut self, samples: &[f32], mut emit: impl FnMut(Vec<f32>)) {
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (self.frame_size - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.frame_size {
                let frame =
                    std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_size));
                emit(frame);
            }
        }
    }
}

/// Downmixes interleaved device audio to mono and resamples to the capture rate
struct MonoResampler {
    channels: usize,
    resampler: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
    chunk_size: usize,
}

impl MonoResampler {
    fn new(channels: usize, from_rate: u32, to_rate: u32) -> Result<Self> {
        let resampler = if from_rate == to_rate {
            None
        } else {
            Some(
                FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, 1024, 2, 1)
                    .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?,
            )
        };
        let chunk_size = resampler.as_ref().map_or(1024, |r| r.input_frames_next());

        Ok(Self {
            channels: channels.max(1),
            resampler,
            pending: Vec::new(),
            chunk_size,
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn process(&mut self, interleaved: &[f32]) -> Vec<f32> {
        let channels = self.channels;
        let mono = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32);

        let Some(resampler) = self.resampler.as_mut() else {
            return mono.collect();
        };

        self.pending.extend(mono);

        let mut out = Vec::new();
        while self.pending.len() >= self.chunk_size {
            let chunk: Vec<f32> = self.pending.drain(..self.chunk_size).collect();
            match resampler.process(&[chunk], None) {
                Ok(result) => {
                    if let Some(channel) = result.into_iter().next() {
                        out.extend(channel);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "capture resample failed, dropping chunk"),
            }
        }
        out
    }
}

/// Captures from the default input device via cpal
pub struct CpalMicrophone {
    config: AudioConfig,
}

impl Default for CpalMicrophone {
    fn default() -> Self {
        Self::new(AudioConfig::default())
    }
}

impl CpalMicrophone {
    #[must_use]
    pub const fn new(config: AudioConfig) -> Self {
        Self { config }
    }
}

impl Microphone for CpalMicrophone {
    fn open(&mut self, on_frame: FrameCallback) -> Result<Box<dyn CaptureStream>> {
        let config = self.config;
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name("mayra-capture".to_string())
            .spawn(move || {
                let stream = match build_input_stream(&config, on_frame) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Hold the stream until stopped or the handle is dropped
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("audio capture stopped");
            })?;

        ready_rx
            .recv()
            .map_err(|_| Error::Microphone("capture thread exited during startup".to_string()))??;

        Ok(Box::new(CpalCaptureStream {
            stop: Some(stop_tx),
            handle: Some(handle),
        }))
    }
}

fn build_input_stream(config: &AudioConfig, mut on_frame: FrameCallback) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Microphone("no input device available".to_string()))?;

    let target = SampleRate(config.input_sample_rate);

    // Prefer native mono at the capture rate, otherwise take the device default
    let native = device
        .supported_input_configs()
        .map_err(|e| Error::Microphone(e.to_string()))?
        .find(|c| c.channels() == 1 && c.min_sample_rate() <= target && c.max_sample_rate() >= target)
        .map(|c| c.with_sample_rate(target).config());

    let stream_config: StreamConfig = match native {
        Some(c) => c,
        None => device
            .default_input_config()
            .map_err(|e| Error::Microphone(e.to_string()))?
            .config(),
    };

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        device_rate = stream_config.sample_rate.0,
        channels = stream_config.channels,
        target_rate = config.input_sample_rate,
        "audio capture initialized"
    );

    let mut resampler = MonoResampler::new(
        usize::from(stream_config.channels),
        stream_config.sample_rate.0,
        config.input_sample_rate,
    )?;
    let mut chunker = FrameChunker::new(config.frame_size);

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono = resampler.process(data);
                chunker.push(&mono, &mut on_frame);
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Microphone(e.to_string()))?;

    stream.play().map_err(|e| Error::Microphone(e.to_string()))?;
    Ok(stream)
}

struct CpalCaptureStream {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureStream for CpalCaptureStream {
    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CpalCaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Convert f32 samples to WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_silence_and_full_scale() {
        assert!(rms(&[]).abs() < f32::EPSILON);
        assert!(rms(&[0.0; 64]).abs() < f32::EPSILON);
        assert!((rms(&[1.0, -1.0, 1.0, -1.0]) - 1.0).abs() < 1e-6);
        assert!((rms(&[0.5; 16]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn volume_follows_smoothing_recurrence() {
        let mut meter = VolumeMeter::default();
        let inputs = [1.0, 0.0, 0.5, 0.25, 1.0, 1.0, 0.0];

        let mut expected = 0.0_f32;
        for v in inputs {
            expected = 0.8 * expected + 0.2 * v;
            let got = meter.update(v);
            assert!((got - expected).abs() < 1e-6, "got {got}, expected {expected}");
            assert!((0.0..=1.0).contains(&got));
        }

        meter.reset();
        assert!(meter.value().abs() < f32::EPSILON);
    }

    #[test]
    fn pcm16_is_little_endian_and_clamped() {
        let bytes = encode_pcm16(&[0.0, 1.0, -1.0, 2.0]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 0);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), 32767);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -32767);
        assert_eq!(i16::from_le_bytes([bytes[6], bytes[7]]), 32767);
    }

    #[test]
    fn pipeline_tags_chunks_with_rate() {
        let mut pipeline = CapturePipeline::default();
        let chunk = pipeline.process(&[0.5; 8]);

        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
        assert_eq!(STANDARD.decode(&chunk.data).unwrap().len(), 16);
        assert!((pipeline.volume() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn chunker_emits_full_frames_only() {
        let mut chunker = FrameChunker::new(4);
        let mut frames = Vec::new();

        chunker.push(&[1.0, 2.0, 3.0], |f| frames.push(f));
        assert!(frames.is_empty());

        chunker.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0], |f| frames.push(f));
        assert_eq!(frames, vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]);
    }

    #[test]
    fn resampler_downmixes_stereo() {
        let mut r = MonoResampler::new(2, CAPTURE_SAMPLE_RATE, CAPTURE_SAMPLE_RATE).unwrap();
        let mono = r.process(&[1.0, 0.0, 0.5, 0.5]);
        assert_eq!(mono, vec![0.5, 0.5]);
    }

    #[test]
    fn resampler_changes_rate() {
        let mut r = MonoResampler::new(1, 48000, CAPTURE_SAMPLE_RATE).unwrap();
        let out = r.process(&vec![0.0; 4096]);
        assert!(!out.is_empty());
        assert!(out.len() < 4096 / 2);
    }

    #[test]
    fn wav_header() {
        let wav = samples_to_wav(&[0.0; FRAME_SIZE], CAPTURE_SAMPLE_RATE).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(wav.len(), 44 + FRAME_SIZE * 2);
    }
}
