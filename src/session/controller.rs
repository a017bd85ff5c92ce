//! Session controller
//!
//! A single-owner actor: every callback (transport, microphone, speaker) is
//! turned into an [`EngineEvent`] on one channel and handled in order by the
//! controller. Each session gets a fresh generation number, and events from
//! an older generation are dropped, so nothing from a superseded session can
//! touch the current one.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use super::recovery::{RecoveryAction, RecoveryPolicy};
use super::transport::{
    EngineEvent, LiveConfig, LiveSession, ServerMessage, SessionEvents, Transport, TransportEvent,
};
use super::{
    CONNECTION_FAILED_ERROR, ConnectionState, EngineStatus, INIT_FAILED_ERROR, MISSING_API_KEY_ERROR,
    OFFLINE_ERROR, OFFLINE_UTTERANCE,
};
use crate::config::Config;
use crate::db::{Message, Stores};
use crate::mode::AssistantMode;
use crate::prompt::{PromptContext, build_system_instruction};
use crate::tools::{
    BatteryStatus, DocumentExporter, FileExporter, SystemOpener, ToolCall, ToolContext,
    ToolDispatcher, ToolEffect, ToolResponse, UrlOpener, tool_declarations,
};
use crate::transcript::{TranscriptAssembler, TranscriptKind};
use crate::voice::{
    CapturePipeline, CaptureStream, CpalMicrophone, CpalSpeaker, LocalSpeech, Microphone,
    OutputSink, PlaybackScheduler, Speaker, SystemSpeech, decode_payload,
};

/// Asks the host to switch the power toggle off
pub type ShutdownHook = Arc<dyn Fn() + Send + Sync>;

/// External collaborators of the controller
pub struct EngineDeps {
    pub transport: Arc<dyn Transport>,
    pub microphone: Box<dyn Microphone>,
    pub speaker: Box<dyn Speaker>,
    pub speech: Arc<dyn LocalSpeech>,
    pub opener: Arc<dyn UrlOpener>,
    pub exporter: Arc<dyn DocumentExporter>,
    pub battery: watch::Receiver<BatteryStatus>,
    pub on_shutdown: ShutdownHook,
}

impl EngineDeps {
    /// Collaborators backed by the default audio devices and desktop integrations
    #[must_use]
    pub fn system(
        config: &Config,
        transport: Arc<dyn Transport>,
        battery: watch::Receiver<BatteryStatus>,
        on_shutdown: ShutdownHook,
    ) -> Self {
        Self {
            transport,
            microphone: Box::new(CpalMicrophone::new(config.audio)),
            speaker: Box::new(CpalSpeaker::new(config.audio.output_sample_rate)),
            speech: Arc::new(SystemSpeech::detect()),
            opener: Arc::new(SystemOpener),
            exporter: Arc::new(FileExporter::new(config.downloads_dir.clone())),
            battery,
            on_shutdown,
        }
    }
}

/// Owns the connection state machine and the active session
pub struct SessionController {
    config: Config,
    stores: Stores,
    transport: Arc<dyn Transport>,
    microphone: Box<dyn Microphone>,
    speaker: Box<dyn Speaker>,
    speech: Arc<dyn LocalSpeech>,
    tools: Arc<ToolDispatcher>,
    tools_in_flight: usize,
    on_shutdown: ShutdownHook,

    state: ConnectionState,
    error: Option<String>,
    generation: u64,
    session: Option<Box<dyn LiveSession>>,
    capture: Option<Box<dyn CaptureStream>>,
    output: Option<Box<dyn OutputSink>>,

    pipeline: CapturePipeline,
    scheduler: PlaybackScheduler,
    transcript: TranscriptAssembler,
    mode: AssistantMode,
    gain: f32,
    persist_transcript: bool,

    power: bool,
    online: bool,
    recovery: RecoveryPolicy,

    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    status_tx: watch::Sender<EngineStatus>,
}

impl SessionController {
    /// Create a controller, restoring the persisted transcript and mode
    #[must_use]
    pub fn new(config: Config, stores: Stores, deps: EngineDeps) -> Self {
        let tools = ToolDispatcher::new(ToolContext {
            stores: stores.clone(),
            battery: deps.battery,
            opener: deps.opener,
            exporter: deps.exporter,
            shutdown_grace: config.session.shutdown_grace,
        });

        let transcript = TranscriptAssembler::with_messages(stores.session.load_messages());
        let mode = stores.session.load_mode();
        let pipeline = CapturePipeline::new(&config.audio);
        let scheduler = PlaybackScheduler::new(config.audio.output_sample_rate);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(EngineStatus::default());

        let controller = Self {
            config,
            stores,
            transport: deps.transport,
            microphone: deps.microphone,
            speaker: deps.speaker,
            speech: deps.speech,
            tools: Arc::new(tools),
            tools_in_flight: 0,
            on_shutdown: deps.on_shutdown,
            state: ConnectionState::Disconnected,
            error: None,
            generation: 0,
            session: None,
            capture: None,
            output: None,
            pipeline,
            scheduler,
            transcript,
            mode,
            gain: 1.0,
            persist_transcript: true,
            power: false,
            online: true,
            recovery: RecoveryPolicy::default(),
            events_tx,
            events_rx,
            status_tx,
        };
        controller.publish();
        controller
    }

    /// Watch engine status snapshots
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status_tx.subscribe()
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub const fn volume(&self) -> f32 {
        self.pipeline.volume()
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    #[must_use]
    pub const fn mode(&self) -> AssistantMode {
        self.mode
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn output_gain(&self) -> f32 {
        self.gain
    }

    #[must_use]
    pub const fn next_start_time(&self) -> f64 {
        self.scheduler.next_start_time()
    }

    #[must_use]
    pub fn active_playback(&self) -> usize {
        self.scheduler.active_count()
    }

    /// Set the power toggle and apply the recovery rule
    pub async fn set_power(&mut self, on: bool) {
        if self.power != on {
            tracing::info!(power = on, "power toggled");
        }
        self.power = on;
        self.publish();
        self.apply_recovery().await;
    }

    /// Set network reachability and apply the recovery rule
    pub async fn set_network(&mut self, online: bool) {
        if self.online != online {
            tracing::info!(online, "network reachability changed");
        }
        self.online = online;
        self.publish();
        self.apply_recovery().await;
    }

    /// Open a live session
    ///
    /// No-op unless power is on and the state is DISCONNECTED or ERROR.
    pub async fn connect(&mut self) {
        if !self.power {
            tracing::debug!("connect ignored, power is off");
            return;
        }
        if self.state.is_active() {
            tracing::debug!(state = %self.state, "connect ignored, session already active");
            return;
        }

        if !self.online {
            tracing::warn!("cannot connect while offline");
            self.error = Some(OFFLINE_ERROR.to_string());
            self.speech.speak(OFFLINE_UTTERANCE);
            self.set_state(ConnectionState::Error);
            (self.on_shutdown)();
            return;
        }

        if self.config.session.api_key.is_none() {
            tracing::warn!("cannot connect without an API key");
            self.error = Some(MISSING_API_KEY_ERROR.to_string());
            self.publish();
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        self.error = None;
        self.persist_transcript = true;
        self.set_state(ConnectionState::Connecting);
        tracing::info!(generation, "connecting");

        if let Err(e) = self.open_audio(generation) {
            tracing::error!(generation, error = %e, "audio setup failed");
            self.fail(INIT_FAILED_ERROR);
            return;
        }

        let live_config = self.live_config();
        let events = SessionEvents::new(generation, self.events_tx.clone());

        let Some(api_key) = self.config.session.api_key.as_ref() else {
            self.fail(MISSING_API_KEY_ERROR);
            return;
        };
        let opened = self.transport.open(live_config, api_key, events).await;

        match opened {
            Ok(session) => {
                self.session = Some(session);
                tracing::debug!(generation, "session handle acquired");
            }
            Err(e) => {
                tracing::error!(generation, error = %e, "failed to open live session");
                self.fail(CONNECTION_FAILED_ERROR);
            }
        }
    }

    /// Close the session and release all audio resources
    ///
    /// Idempotent. Persisted transcript and mode are kept.
    pub async fn disconnect(&mut self) {
        // Invalidate callbacks before closing so the close echo is ignored
        self.generation += 1;

        if let Some(mut session) = self.session.take()
            && let Err(e) = session.close().await
        {
            tracing::warn!(error = %e, "error closing session");
        }

        self.teardown();
        if self.state != ConnectionState::Disconnected {
            tracing::info!("disconnected");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Handle every queued event, then apply the recovery rule
    ///
    /// Tool batches still running are waited for, so their results are
    /// applied before this returns. Returns the number of events handled.
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let event = match self.events_rx.try_recv() {
                Ok(event) => event,
                Err(_) if self.tools_in_flight > 0 => match self.events_rx.recv().await {
                    Some(event) => event,
                    None => break,
                },
                Err(_) => break,
            };
            self.handle_event(event).await;
            handled += 1;
        }
        self.apply_recovery().await;
        handled
    }

    /// Drive the engine from the host's power and network signals
    ///
    /// Returns when either signal's sender is dropped, after disconnecting.
    pub async fn run(&mut self, mut power: watch::Receiver<bool>, mut network: watch::Receiver<bool>) {
        let initial_network = *network.borrow_and_update();
        self.set_network(initial_network).await;
        let initial_power = *power.borrow_and_update();
        self.set_power(initial_power).await;

        loop {
            tokio::select! {
                changed = power.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let on = *power.borrow_and_update();
                    self.set_power(on).await;
                }
                changed = network.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *network.borrow_and_update();
                    self.set_network(online).await;
                }
                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event).await;
                    self.apply_recovery().await;
                }
            }
        }

        tracing::debug!("engine signals closed, shutting down");
        self.disconnect().await;
    }

    async fn apply_recovery(&mut self) {
        while let Some(action) = self.recovery.evaluate(self.power, self.state, self.online) {
            tracing::debug!(?action, state = %self.state, "auto-recovery");
            match action {
                RecoveryAction::Connect => self.connect().await,
                RecoveryAction::Disconnect => self.disconnect().await,
            }
        }
    }

    fn open_audio(&mut self, generation: u64) -> crate::Result<()> {
        let tx = self.events_tx.clone();
        let mut output = self.speaker.open(Box::new(move |id| {
            let _ = tx.send(EngineEvent::PlaybackEnded { generation, id });
        }))?;
        output.set_gain(self.gain);
        self.output = Some(output);

        let tx = self.events_tx.clone();
        let capture = self.microphone.open(Box::new(move |samples| {
            let _ = tx.send(EngineEvent::Frame {
                generation,
                samples,
            });
        }))?;
        self.capture = Some(capture);

        Ok(())
    }

    fn live_config(&self) -> LiveConfig {
        let ctx = PromptContext::gather(&self.stores, self.config.screen_width, self.mode)
            .with_google_search(self.config.session.google_search);

        LiveConfig {
            model: self.config.session.model.clone(),
            response_modality: "AUDIO".to_string(),
            voice_name: self.config.session.voice.clone(),
            system_instruction: build_system_instruction(&ctx),
            tools: tool_declarations(),
            google_search: self.config.session.google_search,
            input_transcription: true,
            output_transcription: true,
        }
    }

    async fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Transport { generation, event } => {
                if generation != self.generation {
                    tracing::debug!(generation, current = self.generation, "ignoring stale session event");
                    return;
                }
                self.handle_transport(event).await;
            }
            EngineEvent::Frame { generation, samples } => {
                if generation != self.generation || self.state != ConnectionState::Connected {
                    return;
                }
                let Some(session) = self.session.as_ref() else {
                    return;
                };
                let chunk = self.pipeline.process(&samples);
                session.send_audio(chunk);

                let volume = self.pipeline.volume();
                self.status_tx.send_modify(|s| s.volume = volume);
            }
            EngineEvent::PlaybackEnded { generation, id } => {
                if generation == self.generation {
                    self.scheduler.finished(id);
                }
            }
            EngineEvent::ToolsDone {
                generation,
                responses,
                effects,
            } => {
                self.tools_in_flight = self.tools_in_flight.saturating_sub(1);
                if generation != self.generation {
                    tracing::debug!(generation, "dropping tool results for a closed session");
                    return;
                }
                self.finish_tools(responses, effects).await;
            }
        }
    }

    async fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                if self.state == ConnectionState::Connecting {
                    tracing::info!(generation = self.generation, "connected");
                    self.set_state(ConnectionState::Connected);
                }
            }
            TransportEvent::Message(message) => self.handle_message(*message).await,
            TransportEvent::Closed => {
                tracing::info!(generation = self.generation, "session closed by remote");
                self.teardown();
                self.set_state(ConnectionState::Disconnected);
            }
            TransportEvent::Failed(reason) => {
                tracing::error!(generation = self.generation, %reason, "session failed");
                self.fail(CONNECTION_FAILED_ERROR);
            }
        }
    }

    async fn handle_message(&mut self, message: ServerMessage) {
        let mut transcript_changed = false;

        if message.interrupted {
            match self.output.as_deref_mut() {
                Some(output) => {
                    self.scheduler.interrupt(output);
                }
                None => self.scheduler.reset(),
            }
            transcript_changed |= self.transcript.finalize_all();
        }

        let grounding = message.grounding.as_deref();
        if let Some(delta) = message.input_transcription.as_deref() {
            transcript_changed |= self.transcript.apply(TranscriptKind::Input, delta, grounding);
        }
        if let Some(delta) = message.output_transcription.as_deref() {
            transcript_changed |= self.transcript.apply(TranscriptKind::Output, delta, grounding);
        }

        if message.turn_complete {
            transcript_changed |= self.transcript.finalize_all();
        }

        if !message.tool_calls.is_empty() {
            self.spawn_tools(message.tool_calls);
        }

        if let Some(audio) = message.audio.as_deref() {
            self.play(audio);
        }

        if transcript_changed {
            self.persist_messages();
        }
        self.publish();
    }

    /// Run a tool batch on its own task; results return as `ToolsDone`
    fn spawn_tools(&mut self, calls: Vec<ToolCall>) {
        let tools = Arc::clone(&self.tools);
        let tx = self.events_tx.clone();
        let generation = self.generation;
        self.tools_in_flight += 1;

        tokio::spawn(async move {
            let (responses, effects) = tools.dispatch_batch(&calls).await;
            let _ = tx.send(EngineEvent::ToolsDone {
                generation,
                responses,
                effects,
            });
        });
    }

    async fn finish_tools(
        &mut self,
        responses: Vec<ToolResponse>,
        effects: Vec<ToolEffect>,
    ) {
        let mut transcript_changed = false;
        for effect in effects {
            transcript_changed |= self.apply_effect(effect);
        }

        if let Some(session) = self.session.as_ref()
            && let Err(e) = session.send_tool_responses(responses).await
        {
            tracing::warn!(error = %e, "failed to send tool responses");
        }

        if transcript_changed {
            self.persist_messages();
        }
        self.publish();
    }

    fn apply_effect(&mut self, effect: ToolEffect) -> bool {
        match effect {
            ToolEffect::ModeChanged(mode) => {
                self.mode = mode;
                false
            }
            ToolEffect::OutputGain(gain) => {
                self.gain = gain;
                if let Some(output) = self.output.as_mut() {
                    output.set_gain(gain);
                }
                false
            }
            ToolEffect::TranscriptCleared => {
                self.transcript.clear();
                true
            }
            ToolEffect::PowerDown(grace) => {
                self.transcript.clear();
                self.mode = AssistantMode::Default;
                // Farewell transcript must not resurrect the cleared session
                self.persist_transcript = false;

                let hook = Arc::clone(&self.on_shutdown);
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    hook();
                });
                false
            }
        }
    }

    fn play(&mut self, payload: &str) {
        let samples = match decode_payload(payload) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable audio payload");
                return;
            }
        };

        let Some(output) = self.output.as_deref_mut() else {
            return;
        };
        if let Err(e) = self.scheduler.enqueue(output, samples) {
            tracing::warn!(error = %e, "failed to schedule playback");
        }
    }

    fn persist_messages(&self) {
        if !self.persist_transcript {
            return;
        }
        if let Err(e) = self.stores.session.save_messages(self.transcript.messages()) {
            tracing::warn!(error = %e, "failed to persist transcript");
        }
    }

    /// Enter ERROR with a user-visible message and release everything
    fn fail(&mut self, error: &str) {
        self.error = Some(error.to_string());
        self.teardown();
        self.set_state(ConnectionState::Error);
    }

    /// Release the session handle and all audio resources. Idempotent.
    fn teardown(&mut self) {
        self.generation += 1;
        self.session = None;

        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }

        match self.output.take() {
            Some(mut output) => {
                self.scheduler.interrupt(output.as_mut());
            }
            None => self.scheduler.reset(),
        }

        self.pipeline.reset();
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "state transition");
        }
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        self.status_tx.send_replace(EngineStatus {
            state: self.state,
            volume: self.pipeline.volume(),
            error: self.error.clone(),
            messages: self.transcript.messages().to_vec(),
            mode: self.mode,
            online: self.online,
            power: self.power,
        });
    }
}
