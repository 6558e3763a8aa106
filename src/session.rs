//! One call: the capture device, output timeline and transport it owns, and
//! the ordered teardown that releases them.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::audio::codec::{self, TARGET_SAMPLE_RATE};
use crate::audio::{AudioBackend, AudioConfig, AudioFormat, AudioSystem, DecoderSet, PlaybackScheduler};
use crate::config::{CallRequest, EndpointConfig};
use crate::error::{AudioError, SessionError};
use crate::net_link::{SessionTransport, TransportHandle};
use crate::observer::{SessionEmitter, SessionObserver, TranscriptEvent};
use crate::protocol::{AudioPayload, Part, ServerContent, ServerMessage, SetupMessage};
use crate::state_machine::SessionState;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Downlink half: decoders plus the playback cursor.
pub(crate) struct Downlink {
    scheduler: Option<PlaybackScheduler>,
    decoders: DecoderSet,
}

impl Downlink {
    pub(crate) fn new(scheduler: Option<PlaybackScheduler>) -> Self {
        Self {
            scheduler,
            decoders: DecoderSet::default(),
        }
    }

    /// Decode one audio part and schedule it. `Ok(false)` once playback is gone.
    fn play(&mut self, payload: &AudioPayload) -> Result<bool, SessionError> {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return Ok(false);
        };
        let format: AudioFormat = payload.format.parse()?;
        if format.sample_rate != scheduler.sample_rate() {
            return Err(SessionError::Protocol(format!(
                "downlink audio at {}Hz, playback runs at {}Hz",
                format.sample_rate,
                scheduler.sample_rate()
            )));
        }
        let bytes = codec::from_wire_text(&payload.data)?;
        let samples = self
            .decoders
            .decode(&format, &bytes)
            .map_err(|e| SessionError::Protocol(format!("{:#}", e)))?;
        if samples.is_empty() {
            return Ok(false);
        }
        scheduler.schedule(samples)?;
        Ok(true)
    }
}

/// Fan one inbound message out to playback and transcript observers.
/// Returns the number of chunks scheduled.
pub(crate) fn route_content(
    content: ServerContent,
    downlink: &mut Downlink,
    emitter: &SessionEmitter,
) -> usize {
    if content.ignored_parts > 0 {
        log::debug!("Ignored {} unrecognised part(s)", content.ignored_parts);
    }

    let is_partial = !content.turn_complete;
    let mut scheduled = 0;
    for part in content.parts {
        match part {
            Part::Text(text) => {
                if !text.is_empty() {
                    emitter.transcript(TranscriptEvent::new(text, is_partial));
                }
            }
            Part::Audio(payload) => match downlink.play(&payload) {
                Ok(true) => scheduled += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Dropping audio part ({}): {}", payload.format, e),
            },
        }
    }
    scheduled
}

struct Resources {
    audio: Option<AudioSystem>,
    transport: Option<TransportHandle>,
    torn_down: bool,
}

pub(crate) struct SessionShared {
    id: Uuid,
    state: Mutex<SessionState>,
    emitter: Arc<SessionEmitter>,
    muted: Arc<AtomicBool>,
    resources: Mutex<Resources>,
    downlink: Mutex<Downlink>,
}

impl SessionShared {
    fn transition(&self, to: SessionState) {
        let mut state = lock(&self.state);
        if state.can_transition(to) {
            log::info!("Session {}: {:?} -> {:?}", self.id, *state, to);
            *state = to;
        } else {
            log::debug!("Session {}: ignoring {:?} -> {:?}", self.id, *state, to);
        }
    }

    pub(crate) fn handle_inbound(&self, text: &str) {
        match ServerMessage::parse(text) {
            Ok(ServerMessage::Content(content)) => {
                let mut downlink = lock(&self.downlink);
                route_content(content, &mut downlink, &self.emitter);
            }
            Ok(ServerMessage::SetupComplete) => log::debug!("Duplicate setupComplete ignored"),
            Err(e) => log::warn!("Ignoring unparseable message: {}", e),
        }
    }

    /// Release everything this session owns. Runs once; later calls return
    /// after the first has finished.
    ///
    /// Order: capture device, capture stage, transport, playback. A failing
    /// step is logged and the remaining steps still run.
    pub(crate) fn teardown(&self, reason: Option<SessionError>) {
        let mut res = lock(&self.resources);
        if res.torn_down {
            return;
        }
        res.torn_down = true;
        self.emitter.silence();

        match reason {
            Some(err) => {
                log::error!("Session {} failed: {}", self.id, err);
                self.transition(SessionState::Error);
                self.emitter.error(&err.to_string());
            }
            None => {
                log::info!("Session {} closing", self.id);
                self.transition(SessionState::Closing);
            }
        }

        // The capture thread drops its device before its processing stage.
        if let Some(audio) = res.audio.as_mut() {
            if let Err(e) = audio.stop_capture() {
                log::warn!("Releasing capture failed: {:#}", e);
            }
        }

        if let Some(mut transport) = res.transport.take() {
            transport.close();
        }

        lock(&self.downlink).scheduler.take();
        if let Some(mut audio) = res.audio.take() {
            if let Err(e) = audio.stop_playback() {
                log::warn!("Releasing playback failed: {:#}", e);
            }
        }

        self.transition(SessionState::Closed);
        self.emitter.closed();
    }
}

/// A live call. Cheap to clone; all clones refer to the same session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<SessionShared>,
}

impl Session {
    pub(crate) fn new(observer: Arc<dyn SessionObserver>, muted: Arc<AtomicBool>) -> Self {
        let shared = SessionShared {
            id: Uuid::new_v4(),
            state: Mutex::new(SessionState::Idle),
            emitter: Arc::new(SessionEmitter::new(observer)),
            muted,
            resources: Mutex::new(Resources {
                audio: None,
                transport: None,
                torn_down: false,
            }),
            downlink: Mutex::new(Downlink::new(None)),
        };
        shared.transition(SessionState::Connecting);
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.shared.state)
    }

    /// Acquire devices, complete the handshake, then start streaming.
    /// On failure everything acquired so far is released and the error is
    /// reported to the observer before being returned.
    pub(crate) async fn open(
        &self,
        endpoint: &EndpointConfig,
        audio: &AudioConfig,
        backend: &dyn AudioBackend,
        request: &CallRequest,
    ) -> Result<(), SessionError> {
        let result = self.try_open(endpoint, audio, backend, request).await;
        if let Err(e) = &result {
            self.shared.teardown(Some(e.clone()));
        }
        result
    }

    async fn try_open(
        &self,
        endpoint: &EndpointConfig,
        audio_config: &AudioConfig,
        backend: &dyn AudioBackend,
        request: &CallRequest,
    ) -> Result<(), SessionError> {
        let shared = &self.shared;
        let url = endpoint.validate()?;
        request.validate()?;

        let (faults_tx, faults_rx) = mpsc::unbounded_channel();

        let mut audio = AudioSystem::open(backend, audio_config)?;
        let scheduler = audio
            .start_playback(faults_tx.clone())
            .map_err(|e| SessionError::from(AudioError::Hardware(format!("{:#}", e))))?;
        lock(&shared.resources).audio = Some(audio);
        *lock(&shared.downlink) = Downlink::new(Some(scheduler));

        let setup = SetupMessage::new(
            endpoint.identifier.trim(),
            request.instruction(),
            AudioFormat::pcm16(TARGET_SAMPLE_RATE),
            AudioFormat::pcm16(audio_config.playback_sample_rate),
        );
        let transport = SessionTransport::connect(endpoint, &url, shared.id, &setup).await?;

        let mut res = lock(&shared.resources);
        if res.torn_down {
            return Err(SessionError::Transport("session closed during setup".into()));
        }
        shared.transition(SessionState::Open);
        shared.emitter.connected();

        let (uplink_tx, uplink_rx) = mpsc::channel(audio_config.uplink_queue_depth.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(transport.run(shared.clone(), uplink_rx, faults_rx, shutdown_rx));
        res.transport = Some(TransportHandle::new(shutdown_tx, task));

        let Some(audio) = res.audio.as_mut() else {
            return Err(SessionError::Device(AudioError::Hardware(
                "audio released during setup".into(),
            )));
        };
        audio
            .start_capture(uplink_tx, shared.emitter.clone(), shared.muted.clone(), faults_tx)
            .map_err(|e| SessionError::from(AudioError::Hardware(format!("{:#}", e))))?;

        log::info!("Session {} open", shared.id);
        Ok(())
    }

    /// Idempotent local hang-up.
    pub fn close(&self) {
        self.shared.teardown(None);
    }
}
