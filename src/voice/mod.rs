//! Voice processing module
//!
//! Handles microphone capture and loudness metering, PCM16 wire encoding,
//! gapless playback scheduling, and locally synthesized notices.

mod capture;
mod notice;
mod playback;

pub use capture::{
    AudioChunk, CapturePipeline, CaptureStream, CpalMicrophone, FrameCallback, FrameChunker,
    Microphone, VolumeMeter, encode_pcm16, rms, samples_to_wav,
};
pub use notice::{LocalSpeech, SystemSpeech};
pub use playback::{
    CpalSpeaker, FinishedCallback, OutputSink, PlaybackScheduler, Scheduled, Speaker,
    decode_payload, decode_pcm16,
};

/// Capture sample rate sent to the service (16kHz mono)
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Sample rate of inbound speech (24kHz mono)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Samples per capture frame
pub const FRAME_SIZE: usize = 4096;

/// Weight of the previous value when smoothing the volume signal
pub const VOLUME_SMOOTHING: f32 = 0.8;
