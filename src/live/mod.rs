//! Live results client: stream subscription with backoff and polling fallback.
//!
//! Workers never touch shared state. They post [`ClientEvent`]s into the
//! current session's channel and [`LiveClient::pump`] applies them on the
//! caller's thread, together with any retry, poll or grace deadline that has
//! come due.

mod backend;
mod policy;

use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

pub use backend::{ClientEvent, EventSink, HttpBackend, ScanBackend, SessionId, Ticket, Waker};
pub use policy::ClientConfig;

use backend::Envelope;

use crate::scan::{
    CompletePayload, ScanSession, ScanStatus, ScanStore, StartScanRequest, StreamMessage,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Polling,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Connected => "Live",
            Self::Disconnected => "Reconnecting",
            Self::Polling => "Polling",
        }
    }
}

/// What a handled event or timer means for the session as a whole.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Continue,
    Finished,
}

/// Everything owned by one scan session. Dropping it cancels every worker
/// it started.
struct StreamSession {
    id: SessionId,
    target: String,
    state: ConnectionState,
    retry_count: u32,
    generation: u32,
    cancel: CancellationToken,
    subscription: Option<CancellationToken>,
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
    waker: Option<Waker>,
    retry_at: Option<Instant>,
    next_poll_at: Option<Instant>,
    poll_in_flight: bool,
    fetch_in_flight: bool,
    poll_failures: u32,
    close_at: Option<Instant>,
    completion_applied: bool,
    one_shot: bool,
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl StreamSession {
    fn new(id: SessionId, target: String, waker: Option<Waker>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            id,
            target,
            state: ConnectionState::Connecting,
            retry_count: 0,
            generation: 0,
            cancel: CancellationToken::new(),
            subscription: None,
            tx,
            rx,
            waker,
            retry_at: None,
            next_poll_at: None,
            poll_in_flight: false,
            fetch_in_flight: false,
            poll_failures: 0,
            close_at: None,
            completion_applied: false,
            one_shot: false,
        }
    }

    fn sink(&self, cancel: CancellationToken) -> EventSink {
        EventSink::new(
            Ticket {
                session: self.id,
                generation: self.generation,
            },
            self.tx.clone(),
            cancel,
            self.waker.clone(),
        )
    }

    fn session_sink(&self) -> EventSink {
        self.sink(self.cancel.clone())
    }

    fn open_subscription<B: ScanBackend>(&mut self, backend: &B) {
        self.drop_subscription();
        self.generation = self.generation.wrapping_add(1);
        self.state = ConnectionState::Connecting;

        let token = self.cancel.child_token();
        let sink = self.sink(token.clone());
        self.subscription = Some(token);

        tracing::debug!(
            session = self.id,
            generation = self.generation,
            attempt = self.retry_count,
            "opening subscription"
        );
        backend.subscribe(&self.target, sink);
    }

    fn drop_subscription(&mut self) {
        if let Some(token) = self.subscription.take() {
            token.cancel();
        }
    }

    fn handle<B: ScanBackend>(
        &mut self,
        event: ClientEvent,
        generation: u32,
        store: &mut ScanStore,
        backend: &B,
        config: &ClientConfig,
        now: Instant,
    ) -> Step {
        match event {
            ClientEvent::StartAcknowledged(Ok(())) => {
                tracing::debug!(session = self.id, "scan start acknowledged");
                Step::Continue
            }
            ClientEvent::StartAcknowledged(Err(error)) => {
                if store.is_completed() {
                    tracing::warn!(session = self.id, %error, "scan start reported failure after completion");
                    return Step::Continue;
                }
                tracing::error!(session = self.id, %error, "scan start failed");
                store.fail(format!("Scan start failed: {error}"));
                Step::Finished
            }
            ClientEvent::StreamOpened
            | ClientEvent::StreamMessage(_)
            | ClientEvent::StreamMalformed(_)
            | ClientEvent::StreamFailed(_)
                if generation != self.generation =>
            {
                tracing::debug!(
                    session = self.id,
                    generation,
                    current = self.generation,
                    "dropping event from superseded subscription"
                );
                Step::Continue
            }
            ClientEvent::StreamOpened => {
                if self.state == ConnectionState::Connecting {
                    tracing::info!(session = self.id, target_host = %self.target, "live stream connected");
                    self.state = ConnectionState::Connected;
                    self.retry_count = 0;
                    self.retry_at = None;
                    self.next_poll_at = None;
                }
                Step::Continue
            }
            ClientEvent::StreamMessage(message) => self.dispatch(message, store, config, now),
            ClientEvent::StreamMalformed(reason) => {
                tracing::warn!(session = self.id, %reason, "dropping malformed stream message");
                Step::Continue
            }
            ClientEvent::StreamFailed(reason) => {
                self.on_stream_failed(&reason, config, now);
                Step::Continue
            }
            ClientEvent::StatusPolled(result) => {
                self.poll_in_flight = false;
                match result {
                    Ok(status) => {
                        self.poll_failures = 0;
                        if !status.running && !self.fetch_in_flight && !self.completion_applied {
                            tracing::info!(session = self.id, "backend reports scan finished, fetching results");
                            self.fetch_in_flight = true;
                            backend.fetch_final(&self.target, self.session_sink());
                        }
                        Step::Continue
                    }
                    Err(error) => self.on_poll_failure(&error.to_string(), store, config),
                }
            }
            ClientEvent::FinalResults(result) => {
                self.fetch_in_flight = false;
                match result {
                    Ok(payload) if payload.has_no_ports() && !self.completion_applied => {
                        if self.one_shot {
                            tracing::warn!(session = self.id, target_host = %self.target, "backend has no saved results");
                            store.fail(format!("No saved results for {}", self.target));
                            Step::Finished
                        } else {
                            self.on_poll_failure("backend returned no results", store, config)
                        }
                    }
                    Ok(payload) => {
                        if self.apply_completion(&payload, store) || self.completion_applied {
                            Step::Finished
                        } else if self.one_shot {
                            store.fail(format!("No saved results for {}", self.target));
                            Step::Finished
                        } else {
                            self.on_poll_failure("results belong to another target", store, config)
                        }
                    }
                    Err(error) if self.one_shot => {
                        tracing::error!(session = self.id, %error, "loading saved results failed");
                        store.fail(format!("Could not load results: {error}"));
                        Step::Finished
                    }
                    Err(error) => self.on_poll_failure(&error.to_string(), store, config),
                }
            }
        }
    }

    fn dispatch(
        &mut self,
        message: StreamMessage,
        store: &mut ScanStore,
        config: &ClientConfig,
        now: Instant,
    ) -> Step {
        match message {
            StreamMessage::Port(update) => {
                store.apply_port_update(update.port, &update.service, &update.vulnerabilities);
            }
            StreamMessage::Analysis { analysis } => {
                store.apply_analysis(analysis.into_report());
            }
            StreamMessage::Graph(snapshot) => {
                let exposure = snapshot.exposure();
                let chains = snapshot
                    .attack_chains
                    .map(|chains| chains.into_chains())
                    .unwrap_or_default();
                let nodes = snapshot
                    .graph
                    .nodes
                    .into_iter()
                    .map(|node| node.into_node())
                    .collect();
                let edges = snapshot
                    .graph
                    .edges
                    .into_iter()
                    .enumerate()
                    .map(|(index, edge)| edge.into_edge(index))
                    .collect();
                store.apply_graph_snapshot(nodes, edges, exposure, chains);
            }
            StreamMessage::Complete(payload) => {
                if self.apply_completion(&payload, store) && self.close_at.is_none() {
                    self.retry_at = None;
                    self.next_poll_at = None;
                    self.close_at = Some(now + config.completion_grace);
                }
            }
            StreamMessage::Unknown => {
                tracing::debug!(session = self.id, "ignoring stream message of unknown type");
            }
        }
        Step::Continue
    }

    /// Applies a final result once per session. Returns whether this call
    /// applied it.
    fn apply_completion(&mut self, payload: &CompletePayload, store: &mut ScanStore) -> bool {
        if let Some(target) = payload.target.as_deref()
            && target != self.target
        {
            tracing::warn!(
                session = self.id,
                expected = %self.target,
                received = target,
                "dropping completion for another target"
            );
            return false;
        }
        if self.completion_applied {
            tracing::debug!(session = self.id, "completion already applied");
            return false;
        }

        store.apply_completion(payload);
        self.completion_applied = true;
        let summary = store.summary();
        tracing::info!(
            session = self.id,
            open = summary.open,
            total = summary.total,
            "scan complete"
        );
        true
    }

    fn on_stream_failed(&mut self, reason: &str, config: &ClientConfig, now: Instant) {
        if self.completion_applied {
            tracing::debug!(session = self.id, %reason, "stream ended after completion");
            return;
        }
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return;
        }

        self.drop_subscription();
        self.state = ConnectionState::Disconnected;

        if self.retry_count >= config.max_retries {
            tracing::warn!(
                session = self.id,
                %reason,
                retries = self.retry_count,
                "stream retries exhausted, falling back to polling"
            );
            self.state = ConnectionState::Polling;
            self.next_poll_at = Some(now + config.poll_interval);
            return;
        }

        let delay = config.retry_delay(self.retry_count);
        self.retry_count += 1;
        self.retry_at = Some(now + delay);
        tracing::warn!(
            session = self.id,
            %reason,
            attempt = self.retry_count,
            delay_ms = delay.as_millis() as u64,
            "stream lost, scheduling reconnect"
        );
    }

    fn on_poll_failure(&mut self, reason: &str, store: &mut ScanStore, config: &ClientConfig) -> Step {
        self.poll_failures += 1;
        tracing::warn!(
            session = self.id,
            %reason,
            failures = self.poll_failures,
            "status poll failed"
        );
        if self.poll_failures >= config.max_poll_failures {
            tracing::error!(session = self.id, "giving up on backend after repeated poll failures");
            store.fail(format!("Lost contact with the backend: {reason}"));
            return Step::Finished;
        }
        Step::Continue
    }

    fn fire_timers<B: ScanBackend>(&mut self, backend: &B, config: &ClientConfig, now: Instant) -> Step {
        if self.close_at.is_some_and(|at| now >= at) {
            tracing::debug!(session = self.id, "completion grace elapsed, closing");
            return Step::Finished;
        }

        if self.state == ConnectionState::Disconnected
            && self.retry_at.is_some_and(|at| now >= at)
        {
            self.retry_at = None;
            self.open_subscription(backend);
        }

        if self.state == ConnectionState::Polling
            && self.next_poll_at.is_some_and(|at| now >= at)
        {
            self.next_poll_at = Some(now + config.poll_interval);
            if self.poll_in_flight || self.fetch_in_flight {
                tracing::debug!(session = self.id, "previous poll still in flight");
            } else {
                self.poll_in_flight = true;
                backend.poll_status(self.session_sink());
            }
        }

        Step::Continue
    }

    fn next_deadline(&self) -> Option<Instant> {
        [self.close_at, self.retry_at, self.next_poll_at]
            .into_iter()
            .flatten()
            .min()
    }
}

/// Owns the store and at most one live session.
pub struct LiveClient<B: ScanBackend> {
    backend: B,
    config: ClientConfig,
    store: ScanStore,
    session: Option<StreamSession>,
    last_session_id: SessionId,
    waker: Option<Waker>,
}

impl<B: ScanBackend> LiveClient<B> {
    pub fn new(backend: B, config: ClientConfig) -> Self {
        Self {
            backend,
            config,
            store: ScanStore::new(),
            session: None,
            last_session_id: 0,
            waker: None,
        }
    }

    /// Installs a callback run by workers after they post an event.
    pub fn set_waker(&mut self, waker: Waker) {
        self.waker = Some(waker);
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &ScanStore {
        &self.store
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session
            .as_ref()
            .map_or(ConnectionState::Idle, |session| session.state)
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.session.as_ref().map(|session| session.id)
    }

    pub fn retry_count(&self) -> u32 {
        self.session.as_ref().map_or(0, |session| session.retry_count)
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    fn begin(&mut self, scan: ScanSession) -> StreamSession {
        self.teardown();
        self.last_session_id += 1;

        let target = scan.target.clone();
        self.store.reset(scan);
        self.store.set_status(ScanStatus::Running);
        StreamSession::new(self.last_session_id, target, self.waker.clone())
    }

    /// Starts a new scan, tearing down whatever session was running.
    pub fn launch(&mut self, scan: ScanSession) -> SessionId {
        let request = StartScanRequest::from(&scan);
        let mut session = self.begin(scan);

        tracing::info!(
            session = session.id,
            target_host = %request.target,
            start = request.start,
            end = request.end,
            "launching scan"
        );
        self.backend.start_scan(request, session.session_sink());
        session.open_subscription(&self.backend);

        let id = session.id;
        self.session = Some(session);
        id
    }

    /// Loads the backend's saved results for `scan.target` without starting
    /// a scan.
    pub fn load_saved(&mut self, scan: ScanSession) -> SessionId {
        let mut session = self.begin(scan);
        session.state = ConnectionState::Polling;
        session.one_shot = true;
        session.fetch_in_flight = true;

        tracing::info!(session = session.id, target_host = %session.target, "loading saved results");
        self.backend.fetch_final(&session.target, session.session_sink());

        let id = session.id;
        self.session = Some(session);
        id
    }

    /// Drops the active session and cancels its workers. The store keeps
    /// whatever it already holds.
    pub fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!(session = session.id, "tearing down session");
            if self.store.status() == ScanStatus::Running {
                self.store.set_status(ScanStatus::Idle);
            }
        }
    }

    /// Applies pending worker events and fires due deadlines.
    pub fn pump(&mut self, now: Instant) {
        loop {
            let Some(session) = self.session.as_mut() else {
                return;
            };
            let Ok(envelope) = session.rx.try_recv() else {
                break;
            };

            if envelope.ticket.session != session.id {
                tracing::debug!(
                    session = session.id,
                    stale = envelope.ticket.session,
                    "dropping event from previous session"
                );
                continue;
            }

            let step = session.handle(
                envelope.event,
                envelope.ticket.generation,
                &mut self.store,
                &self.backend,
                &self.config,
                now,
            );
            if step == Step::Finished {
                self.finish();
                return;
            }
        }

        let finished = match self.session.as_mut() {
            Some(session) => session.fire_timers(&self.backend, &self.config, now) == Step::Finished,
            None => false,
        };
        if finished {
            self.finish();
        }
    }

    fn finish(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!(session = session.id, status = self.store.status().label(), "session finished");
        }
    }

    /// Time until the next retry, poll or close deadline.
    pub fn next_wakeup(&self, now: Instant) -> Option<Duration> {
        self.session
            .as_ref()?
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

impl<B: ScanBackend> Drop for LiveClient<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}
