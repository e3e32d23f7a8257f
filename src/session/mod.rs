//! Session lifecycle and event dispatch.
//!
//! [`Session`] owns the state machine for one voice conversation:
//! `Idle -> Authenticating -> Active -> Ending -> Idle`, with `Failed` as the
//! unrecoverable terminal phase. The lifecycle is strictly linear; the only
//! way backward is the reset to `Idle` on session end, disconnect, or
//! authentication failure.
//!
//! A single controller task consumes the transport's inbound event stream in
//! arrival order and is the sole writer of session state; that ordering is
//! the one source of truth. Audio capture, playback and function handlers
//! run concurrently and observe the phase through a watch channel, so none
//! of them can ever block event handling.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::audio::outbound::OUTBOUND_QUEUE_CAPACITY;
use crate::audio::{codec, AudioFrame, OutboundAudio, Playback, PlaybackSink};
use crate::config::SessionOptions;
use crate::error::{SessionError, SessionResult, TransportError};
use crate::functions::{FunctionInvocation, FunctionRegistry, InvocationBroker};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::transport::{MessageTransport, TransportEvent};

/// Capacity of the session event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the control message channel. Control traffic is one message
/// per lifecycle edge, so this never fills in practice.
const CONTROL_QUEUE_CAPACITY: usize = 8;

// =============================================================================
// Phase
// =============================================================================

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No session; a start request is valid
    #[default]
    Idle,
    /// Start sent, waiting for authentication and session-ready
    Authenticating,
    /// Session live; audio and invocations flow
    Active,
    /// Stop sent, waiting for the server to confirm the end
    Ending,
    /// Unrecoverable error; a new session object is required
    Failed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Authenticating => write!(f, "authenticating"),
            SessionPhase::Active => write!(f, "active"),
            SessionPhase::Ending => write!(f, "ending"),
            SessionPhase::Failed => write!(f, "failed"),
        }
    }
}

// =============================================================================
// Session events
// =============================================================================

/// Notifications surfaced to the embedding application.
///
/// Every terminal condition is observable as a distinct event carrying the
/// reason string its source supplied; nothing is silently swallowed.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Authentication accepted; session not yet live
    Authenticated {
        /// Server-authoritative credit balance
        credits_remaining: f64,
    },
    /// Authentication rejected; session is back to idle
    AuthFailed {
        /// Failure reason from the server
        reason: String,
    },
    /// The session is live
    Ready {
        /// Advisory cost per minute
        cost_per_minute: f64,
        /// Function count confirmed by the server
        functions_loaded: u32,
        /// Informational message
        message: String,
    },
    /// Incremental assistant text
    Text {
        /// Text content
        text: String,
    },
    /// The session ended; back to idle
    Ended {
        /// Reason the session ended
        reason: String,
        /// Credits consumed, if reported
        total_credits_used: Option<f64>,
        /// Remaining balance, if reported
        remaining_credits: Option<f64>,
    },
    /// The transport dropped; the session is over and back to idle
    Disconnected {
        /// Reason supplied by the transport
        reason: String,
    },
    /// Server-signaled or internal error
    Error {
        /// Machine-readable category
        error_type: String,
        /// Human-readable message
        message: String,
    },
}

// =============================================================================
// Session
// =============================================================================

/// One voice-conversation session over one transport connection.
///
/// Shared behind an `Arc`: the controller task, the capture path and the
/// embedding application all hold clones. All state mutation funnels through
/// the controller's event handling plus the `start`/`stop` entry points.
pub struct Session {
    options: SessionOptions,
    registry: Arc<FunctionRegistry>,
    phase: watch::Sender<SessionPhase>,
    outgoing: mpsc::Sender<ClientEvent>,
    control: mpsc::Sender<ClientEvent>,
    events: broadcast::Sender<SessionEvent>,
    credits_remaining: Mutex<Option<f64>>,
    cost_per_minute: Mutex<Option<f64>>,
    started_at: Mutex<Option<Instant>>,
    broker: InvocationBroker,
    playback: Playback,
    outbound: OutboundAudio,
    writer: JoinHandle<()>,
}

impl Session {
    /// Build a session over the given transport.
    ///
    /// Spawns the outbound writer task immediately; the inbound controller
    /// is started separately with [`spawn`](Self::spawn) so tests can drive
    /// events by hand.
    pub fn new(
        options: SessionOptions,
        registry: Arc<FunctionRegistry>,
        sink: Arc<dyn PlaybackSink>,
        transport: Arc<dyn MessageTransport>,
    ) -> Arc<Self> {
        let (phase_tx, phase_rx) = watch::channel(SessionPhase::Idle);
        let (control_tx, mut control_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let writer = tokio::spawn(async move {
            loop {
                // Control messages never queue behind audio frames.
                let next = tokio::select! {
                    biased;
                    maybe = control_rx.recv() => maybe,
                    maybe = outgoing_rx.recv() => maybe,
                };
                let Some(event) = next else { break };
                match transport.send(event).await {
                    Ok(()) => {}
                    Err(TransportError::Closed) => {
                        warn!("Transport closed, stopping outbound writer");
                        break;
                    }
                    Err(e) => warn!("Transport send failed: {e}"),
                }
            }
            debug!("Outbound writer stopped");
        });

        Arc::new(Self {
            broker: InvocationBroker::new(registry.clone(), outgoing_tx.clone()),
            playback: Playback::spawn(sink),
            outbound: OutboundAudio::new(phase_rx, outgoing_tx.clone()),
            options,
            registry,
            phase: phase_tx,
            outgoing: outgoing_tx,
            control: control_tx,
            events: events_tx,
            credits_remaining: Mutex::new(None),
            cost_per_minute: Mutex::new(None),
            started_at: Mutex::new(None),
            writer,
        })
    }

    /// Spawn the controller task over the transport's inbound stream.
    pub fn spawn(self: &Arc<Self>, inbound: mpsc::Receiver<TransportEvent>) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move { session.run(inbound).await })
    }

    /// Consume inbound transport events until the stream closes.
    pub async fn run(&self, mut inbound: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = inbound.recv().await {
            self.handle_transport_event(event).await;
        }
        // A transport that vanishes without a close frame still ends the
        // session.
        if self.phase() != SessionPhase::Idle {
            self.teardown(SessionPhase::Idle);
            self.emit(SessionEvent::Disconnected {
                reason: "transport event stream closed".to_string(),
            });
        }
        debug!("Session controller stopped");
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    /// Request a new session.
    ///
    /// Valid only from `Idle`; a start issued in any other phase is rejected
    /// with [`SessionError::InvalidRequest`] and existing state is untouched.
    /// Emits the start message carrying the auth key, instructions, voice and
    /// the full function descriptor set.
    pub async fn start(&self) -> SessionResult<()> {
        let mut transitioned = false;
        self.phase.send_if_modified(|phase| {
            if *phase == SessionPhase::Idle {
                *phase = SessionPhase::Authenticating;
                transitioned = true;
                true
            } else {
                false
            }
        });
        if !transitioned {
            return Err(SessionError::InvalidRequest(format!(
                "start requested while {}",
                self.phase()
            )));
        }

        *self.started_at.lock().expect("session lock poisoned") = Some(Instant::now());

        let event = ClientEvent::Start {
            auth_key: self.options.auth_key.clone(),
            instructions: self.options.instructions.clone(),
            voice: self.options.voice.as_str().to_string(),
            functions: self.registry.descriptors().to_vec(),
        };
        self.send_control(event).await?;

        info!(
            voice = %self.options.voice,
            functions = self.registry.len(),
            "Session start requested"
        );
        Ok(())
    }

    /// Request the active session to stop.
    ///
    /// Pipelines stop accepting new frames immediately; in-flight sends are
    /// allowed to complete. The session returns to idle once the server
    /// confirms with a session-ended event.
    pub async fn stop(&self) -> SessionResult<()> {
        let mut transitioned = false;
        self.phase.send_if_modified(|phase| {
            if *phase == SessionPhase::Active {
                *phase = SessionPhase::Ending;
                transitioned = true;
                true
            } else {
                false
            }
        });
        if !transitioned {
            return Err(SessionError::NotActive);
        }

        self.send_control(ClientEvent::Stop).await?;
        info!("Session stop requested");
        Ok(())
    }

    /// Deliver a control message on the dedicated control channel.
    ///
    /// Control traffic rides ahead of queued audio and is never dropped under
    /// audio backpressure; the only failure is a dead writer, which is
    /// unrecoverable.
    async fn send_control(&self, event: ClientEvent) -> SessionResult<()> {
        if self.control.send(event).await.is_err() {
            let reason = "control channel closed".to_string();
            self.fail(&reason);
            return Err(SessionError::Internal(reason));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Handle for feeding captured PCM into the session.
    pub fn outbound_audio(&self) -> OutboundAudio {
        self.outbound.clone()
    }

    /// Subscribe to session notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Last credit balance reported by the server, if any.
    pub fn credits_remaining(&self) -> Option<f64> {
        *self.credits_remaining.lock().expect("session lock poisoned")
    }

    /// Cost per minute reported at session-ready, if any.
    pub fn cost_per_minute(&self) -> Option<f64> {
        *self.cost_per_minute.lock().expect("session lock poisoned")
    }

    /// Number of inbound frames waiting to play.
    pub fn playback_queue_len(&self) -> usize {
        self.playback.len()
    }

    /// Number of invocations awaiting a result.
    pub fn outstanding_invocations(&self) -> usize {
        self.broker.outstanding_count()
    }

    // -------------------------------------------------------------------------
    // Event handling
    // -------------------------------------------------------------------------

    /// Handle one inbound transport event. Called by the controller task;
    /// public so tests can drive the state machine directly.
    pub async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                debug!("Transport connected");
            }
            TransportEvent::Disconnected { reason } => {
                let phase = self.phase();
                info!(%reason, %phase, "Transport disconnected");
                // Unconditional: no assumption that server-side state
                // survived. A later conversation needs a fresh start.
                self.teardown(SessionPhase::Idle);
                if phase != SessionPhase::Idle {
                    self.emit(SessionEvent::Disconnected { reason });
                }
            }
            TransportEvent::Event(server_event) => {
                self.handle_server_event(server_event).await;
            }
        }
    }

    async fn handle_server_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::AuthSucceeded { credits_remaining } => {
                if self.phase() != SessionPhase::Authenticating {
                    self.protocol_violation("auth_succeeded outside authentication");
                    return;
                }
                debug!(credits_remaining, "Authentication succeeded");
                *self.credits_remaining.lock().expect("session lock poisoned") =
                    Some(credits_remaining);
                self.emit(SessionEvent::Authenticated { credits_remaining });
            }

            ServerEvent::AuthFailed {
                reason,
                credits_remaining,
            } => {
                if self.phase() != SessionPhase::Authenticating {
                    self.protocol_violation("auth_failed outside authentication");
                    return;
                }
                warn!(%reason, ?credits_remaining, "Authentication failed");
                self.teardown(SessionPhase::Idle);
                self.emit(SessionEvent::AuthFailed { reason });
            }

            ServerEvent::SessionReady {
                cost_per_minute,
                functions_loaded,
                message,
            } => {
                if self.phase() != SessionPhase::Authenticating {
                    self.protocol_violation("session_ready outside authentication");
                    return;
                }
                if functions_loaded as usize != self.registry.len() {
                    warn!(
                        functions_loaded,
                        registered = self.registry.len(),
                        "Server confirmed a different function count than registered"
                    );
                }
                *self.cost_per_minute.lock().expect("session lock poisoned") =
                    Some(cost_per_minute);
                self.set_phase(SessionPhase::Active);
                info!(cost_per_minute, functions_loaded, "Session active");
                self.emit(SessionEvent::Ready {
                    cost_per_minute,
                    functions_loaded,
                    message,
                });
            }

            ServerEvent::SessionEnded {
                reason,
                total_credits_used,
                remaining_credits,
            } => {
                match self.phase() {
                    SessionPhase::Active | SessionPhase::Ending => {}
                    _ => {
                        self.protocol_violation("session_ended without a running session");
                        return;
                    }
                }
                let elapsed = self
                    .started_at
                    .lock()
                    .expect("session lock poisoned")
                    .map(|t| t.elapsed());
                info!(%reason, ?total_credits_used, ?elapsed, "Session ended");
                self.teardown(SessionPhase::Idle);
                if let Some(remaining) = remaining_credits {
                    *self.credits_remaining.lock().expect("session lock poisoned") =
                        Some(remaining);
                }
                self.emit(SessionEvent::Ended {
                    reason,
                    total_credits_used,
                    remaining_credits,
                });
            }

            ServerEvent::TextUpdate { text } => {
                trace!(len = text.len(), "Text update");
                self.emit(SessionEvent::Text { text });
            }

            ServerEvent::AudioChunk { audio } => {
                if self.phase() != SessionPhase::Active {
                    trace!("Audio chunk outside active session, dropping");
                    return;
                }
                // Frame-local failure: log and move on, never escalate.
                match codec::from_wire(&audio) {
                    Ok(samples) => self.playback.enqueue(AudioFrame::from_samples(samples)),
                    Err(e) => warn!("Discarding undecodable audio chunk: {e}"),
                }
            }

            ServerEvent::InvocationRequested {
                function_name,
                arguments,
                call_id,
            } => {
                if self.phase() != SessionPhase::Active {
                    self.protocol_violation("invocation_requested outside active session");
                    return;
                }
                debug!(%call_id, %function_name, "Invocation requested");
                self.broker.dispatch(FunctionInvocation {
                    call_id,
                    function_name,
                    arguments,
                });
            }

            ServerEvent::Error {
                error_type,
                message,
            } => {
                warn!(%error_type, %message, "Server error");
                let phase = self.phase();
                self.emit(SessionEvent::Error {
                    error_type,
                    message,
                });
                // Runtime session errors (rate limiting, credit exhaustion)
                // terminate the running session.
                if phase != SessionPhase::Idle && phase != SessionPhase::Failed {
                    self.teardown(SessionPhase::Idle);
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Internal
    // -------------------------------------------------------------------------

    fn set_phase(&self, phase: SessionPhase) {
        self.phase.send_replace(phase);
    }

    /// Reset to the given phase and discard everything in flight: queued
    /// playback never plays, outstanding invocations are forgotten, and the
    /// phase gate stops the capture path.
    fn teardown(&self, next: SessionPhase) {
        self.set_phase(next);
        self.playback.clear();
        self.broker.clear();
        *self.cost_per_minute.lock().expect("session lock poisoned") = None;
        *self.started_at.lock().expect("session lock poisoned") = None;
    }

    /// Move to the unrecoverable terminal phase.
    fn fail(&self, reason: &str) {
        warn!(%reason, "Session failed");
        self.teardown(SessionPhase::Failed);
        self.emit(SessionEvent::Error {
            error_type: "internal".to_string(),
            message: reason.to_string(),
        });
    }

    /// Log an unexpected message for the current phase. Non-fatal.
    fn protocol_violation(&self, what: &str) {
        let err = SessionError::Protocol(what.to_string());
        warn!(phase = %self.phase(), "{err}");
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.writer.abort();
    }
}
