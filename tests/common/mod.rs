//! Shared test utilities
//!
//! In-process fakes for every external collaborator of the session
//! controller, so the engine can be driven without audio hardware or network.

#![allow(dead_code, clippy::new_without_default)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tempfile::TempDir;
use tokio::sync::watch;
use url::Url;

use mayra::db::{Message, Stores};
use mayra::session::{EngineDeps, LiveConfig, LiveSession, ServerMessage, SessionEvents, Transport};
use mayra::tools::{
    BatteryStatus, DocumentExporter, DocumentRequest, FileExporter, ToolResponse, UrlOpener,
};
use mayra::voice::{
    AudioChunk, CaptureStream, FinishedCallback, FrameCallback, LocalSpeech, Microphone,
    OutputSink, Speaker,
};
use mayra::{Config, Error, Result, SessionController};

/// Set up in-memory stores
#[must_use]
pub fn setup_test_stores() -> Stores {
    Stores::in_memory().expect("failed to init test stores")
}

/// What the fake remote service has seen
#[derive(Default)]
pub struct TransportLog {
    pub opens: usize,
    pub configs: Vec<LiveConfig>,
    pub events: Option<SessionEvents>,
    pub audio: Vec<AudioChunk>,
    pub tool_responses: Vec<ToolResponse>,
    pub closes: usize,
}

/// Transport that records everything and lets the test drive callbacks
#[derive(Default)]
pub struct FakeTransport {
    pub log: Arc<Mutex<TransportLog>>,
    fail_open: Mutex<bool>,
}

impl FakeTransport {
    pub fn fail_next_open(&self) {
        *self.fail_open.lock().unwrap() = true;
    }

    #[must_use]
    pub fn opens(&self) -> usize {
        self.log.lock().unwrap().opens
    }

    /// Callback handle of the most recently opened session
    #[must_use]
    pub fn events(&self) -> SessionEvents {
        self.log
            .lock()
            .unwrap()
            .events
            .clone()
            .expect("no session opened")
    }

    #[must_use]
    pub fn audio_sent(&self) -> usize {
        self.log.lock().unwrap().audio.len()
    }

    #[must_use]
    pub fn tool_responses(&self) -> Vec<ToolResponse> {
        self.log.lock().unwrap().tool_responses.clone()
    }

    #[must_use]
    pub fn last_config(&self) -> Option<LiveConfig> {
        self.log.lock().unwrap().configs.last().cloned()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(
        &self,
        config: LiveConfig,
        _api_key: &SecretString,
        events: SessionEvents,
    ) -> Result<Box<dyn LiveSession>> {
        let mut log = self.log.lock().unwrap();
        log.opens += 1;
        log.configs.push(config);

        let mut fail = self.fail_open.lock().unwrap();
        if *fail {
            *fail = false;
            return Err(Error::Transport("refused".to_string()));
        }

        log.events = Some(events);
        Ok(Box::new(FakeSession {
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeSession {
    log: Arc<Mutex<TransportLog>>,
}

#[async_trait]
impl LiveSession for FakeSession {
    fn send_audio(&self, chunk: AudioChunk) {
        self.log.lock().unwrap().audio.push(chunk);
    }

    async fn send_tool_responses(&self, responses: Vec<ToolResponse>) -> Result<()> {
        self.log.lock().unwrap().tool_responses.extend(responses);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// Microphone whose frames are pushed by the test
#[derive(Clone, Default)]
pub struct FakeMicrophone {
    callback: Arc<Mutex<Option<FrameCallback>>>,
    pub opens: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    fail: Arc<Mutex<bool>>,
}

impl FakeMicrophone {
    pub fn fail_next_open(&self) {
        *self.fail.lock().unwrap() = true;
    }

    /// Deliver one frame as if captured; returns false when no stream is open
    pub fn push(&self, samples: Vec<f32>) -> bool {
        match self.callback.lock().unwrap().as_mut() {
            Some(callback) => {
                callback(samples);
                true
            }
            None => false,
        }
    }
}

impl Microphone for FakeMicrophone {
    fn open(&mut self, on_frame: FrameCallback) -> Result<Box<dyn CaptureStream>> {
        let mut fail = self.fail.lock().unwrap();
        if *fail {
            *fail = false;
            return Err(Error::Microphone("permission denied".to_string()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        *self.callback.lock().unwrap() = Some(on_frame);
        Ok(Box::new(FakeCapture {
            callback: Arc::clone(&self.callback),
            stops: Arc::clone(&self.stops),
        }))
    }
}

struct FakeCapture {
    callback: Arc<Mutex<Option<FrameCallback>>>,
    stops: Arc<AtomicUsize>,
}

impl CaptureStream for FakeCapture {
    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.callback.lock().unwrap().take();
    }
}

/// What the fake output device has seen
#[derive(Default)]
pub struct SinkLog {
    pub clock: f64,
    pub started: Vec<(u64, usize, f64)>,
    pub stopped: Vec<u64>,
    pub gain: f32,
    pub opens: usize,
}

/// Speaker with a manually advanced clock
#[derive(Clone, Default)]
pub struct FakeSpeaker {
    pub log: Arc<Mutex<SinkLog>>,
    finished: Arc<Mutex<Option<FinishedCallback>>>,
}

impl FakeSpeaker {
    pub fn set_clock(&self, seconds: f64) {
        self.log.lock().unwrap().clock = seconds;
    }

    /// Report that a buffer played to the end
    pub fn finish(&self, id: u64) {
        if let Some(callback) = self.finished.lock().unwrap().as_mut() {
            callback(id);
        }
    }

    #[must_use]
    pub fn started(&self) -> Vec<(u64, usize, f64)> {
        self.log.lock().unwrap().started.clone()
    }

    #[must_use]
    pub fn stopped(&self) -> Vec<u64> {
        self.log.lock().unwrap().stopped.clone()
    }

    #[must_use]
    pub fn gain(&self) -> f32 {
        self.log.lock().unwrap().gain
    }
}

impl Speaker for FakeSpeaker {
    fn open(&mut self, on_finished: FinishedCallback) -> Result<Box<dyn OutputSink>> {
        self.log.lock().unwrap().opens += 1;
        *self.finished.lock().unwrap() = Some(on_finished);
        Ok(Box::new(FakeSink {
            log: Arc::clone(&self.log),
        }))
    }
}

/// Output sink backed by a shared log
pub struct FakeSink {
    pub log: Arc<Mutex<SinkLog>>,
}

impl FakeSink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(SinkLog::default())),
        }
    }
}

impl OutputSink for FakeSink {
    fn now(&self) -> f64 {
        self.log.lock().unwrap().clock
    }

    fn start(&mut self, id: u64, samples: Vec<f32>, at: f64) -> Result<()> {
        self.log.lock().unwrap().started.push((id, samples.len(), at));
        Ok(())
    }

    fn stop(&mut self, id: u64) {
        self.log.lock().unwrap().stopped.push(id);
    }

    fn set_gain(&mut self, gain: f32) {
        self.log.lock().unwrap().gain = gain;
    }
}

/// Records local utterances
#[derive(Default)]
pub struct FakeSpeech {
    pub spoken: Mutex<Vec<String>>,
}

impl LocalSpeech for FakeSpeech {
    fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }
}

/// Records opened URLs
#[derive(Default)]
pub struct FakeOpener {
    pub opened: Mutex<Vec<String>>,
}

impl UrlOpener for FakeOpener {
    fn open(&self, url: &Url) -> Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Exporter that takes a while before writing nothing
pub struct SlowExporter {
    pub delay: Duration,
}

#[async_trait]
impl DocumentExporter for SlowExporter {
    async fn export(&self, doc: &DocumentRequest) -> Result<std::path::PathBuf> {
        tokio::time::sleep(self.delay).await;
        Ok(std::path::PathBuf::from(doc.file_name()))
    }
}

/// A controller wired to fakes, plus handles to inspect them
pub struct Harness {
    pub controller: SessionController,
    pub transport: Arc<FakeTransport>,
    pub microphone: FakeMicrophone,
    pub speaker: FakeSpeaker,
    pub speech: Arc<FakeSpeech>,
    pub opener: Arc<FakeOpener>,
    pub shutdowns: Arc<AtomicUsize>,
    pub battery: watch::Sender<BatteryStatus>,
    pub stores: Stores,
    pub dir: TempDir,
}

impl Harness {
    /// Harness with an API key and a short shutdown grace
    #[must_use]
    pub fn new() -> Self {
        Self::with_stores(setup_test_stores(), true)
    }

    #[must_use]
    pub fn without_api_key() -> Self {
        Self::with_stores(setup_test_stores(), false)
    }

    #[must_use]
    pub fn with_stores(stores: Stores, api_key: bool) -> Self {
        Self::build(stores, api_key, None)
    }

    /// Harness whose documents go through `exporter`
    #[must_use]
    pub fn with_exporter(exporter: Arc<dyn DocumentExporter>) -> Self {
        Self::build(setup_test_stores(), true, Some(exporter))
    }

    fn build(stores: Stores, api_key: bool, exporter: Option<Arc<dyn DocumentExporter>>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::with_data_dir(dir.path());
        if api_key {
            config.session.api_key = Some(SecretString::from("test-key".to_string()));
        }
        config.session.shutdown_grace = Duration::from_millis(10);

        let transport = Arc::new(FakeTransport::default());
        let microphone = FakeMicrophone::default();
        let speaker = FakeSpeaker::default();
        let speech = Arc::new(FakeSpeech::default());
        let opener = Arc::new(FakeOpener::default());
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let (battery, battery_rx) = watch::channel(BatteryStatus::default());

        let hook_count = Arc::clone(&shutdowns);
        let deps = EngineDeps {
            transport: Arc::clone(&transport) as Arc<dyn Transport>,
            microphone: Box::new(microphone.clone()),
            speaker: Box::new(speaker.clone()),
            speech: Arc::clone(&speech) as Arc<dyn LocalSpeech>,
            opener: Arc::clone(&opener) as Arc<dyn UrlOpener>,
            exporter: exporter
                .unwrap_or_else(|| Arc::new(FileExporter::new(dir.path().join("downloads")))),
            battery: battery_rx,
            on_shutdown: Arc::new(move || {
                hook_count.fetch_add(1, Ordering::SeqCst);
            }),
        };

        let controller = SessionController::new(config, stores.clone(), deps);

        Self {
            controller,
            transport,
            microphone,
            speaker,
            speech,
            opener,
            shutdowns,
            battery,
            stores,
            dir,
        }
    }

    /// Power on and complete the handshake
    pub async fn connect(&mut self) {
        self.controller.set_power(true).await;
        self.transport.events().opened();
        self.controller.process_pending().await;
    }

    /// Deliver a server message and process it
    pub async fn deliver(&mut self, message: ServerMessage) {
        self.transport.events().message(message);
        self.controller.process_pending().await;
    }

    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.controller.messages().to_vec()
    }

    #[must_use]
    pub fn spoken(&self) -> Vec<String> {
        self.speech.spoken.lock().unwrap().clone()
    }
}

/// `n` samples of a constant level
#[must_use]
pub fn tone(level: f32, n: usize) -> Vec<f32> {
    vec![level; n]
}

/// Base64 PCM16 payload of `n` silent samples
#[must_use]
pub fn silent_payload(n: usize) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(vec![0u8; n * 2])
}
