//! Transport seam between the live client and the scan backend.

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread;

use tokio_util::sync::CancellationToken;

use crate::scan::{
    ApiError, CompletePayload, ScanApi, SseError, SseFrame, StartScanRequest, StatusResponse,
    StreamMessage, parse_stream_message,
};

pub type SessionId = u64;

/// Callback used by workers to nudge the UI thread after posting an event.
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// Identifies which session, and which subscription within it, produced an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket {
    pub session: SessionId,
    pub generation: u32,
}

#[derive(Debug)]
pub enum ClientEvent {
    StartAcknowledged(Result<(), ApiError>),
    StreamOpened,
    StreamMessage(StreamMessage),
    StreamMalformed(String),
    StreamFailed(String),
    StatusPolled(Result<StatusResponse, ApiError>),
    FinalResults(Result<CompletePayload, ApiError>),
}

#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) ticket: Ticket,
    pub(crate) event: ClientEvent,
}

/// Handle a worker uses to report back to the session that started it.
///
/// Once the owning session or subscription is cancelled, `send` refuses
/// further events.
#[derive(Clone)]
pub struct EventSink {
    ticket: Ticket,
    tx: Sender<Envelope>,
    cancel: CancellationToken,
    waker: Option<Waker>,
}

impl EventSink {
    pub(crate) fn new(
        ticket: Ticket,
        tx: Sender<Envelope>,
        cancel: CancellationToken,
        waker: Option<Waker>,
    ) -> Self {
        Self {
            ticket,
            tx,
            cancel,
            waker,
        }
    }

    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Posts `event` to the owning session. Returns `false` when the receiver
    /// is gone or the work was cancelled, meaning the worker should stop.
    pub fn send(&self, event: ClientEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let delivered = self
            .tx
            .send(Envelope {
                ticket: self.ticket,
                event,
            })
            .is_ok();
        if delivered && let Some(waker) = &self.waker {
            waker();
        }
        delivered
    }
}

/// Operations the live client needs from a backend. Each call must return
/// promptly; results arrive later through the sink.
pub trait ScanBackend {
    fn start_scan(&self, request: StartScanRequest, sink: EventSink);
    fn subscribe(&self, target: &str, sink: EventSink);
    fn poll_status(&self, sink: EventSink);
    fn fetch_final(&self, target: &str, sink: EventSink);
}

/// `ScanBackend` over HTTP, running each request on its own worker thread.
#[derive(Clone)]
pub struct HttpBackend {
    api: ScanApi,
}

impl HttpBackend {
    pub fn new(api: ScanApi) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ScanApi {
        &self.api
    }

    fn spawn<F>(&self, name: &str, sink: EventSink, job: F)
    where
        F: FnOnce(&ScanApi, &EventSink) + Send + 'static,
    {
        let api = self.api.clone();
        let ticket = sink.ticket();
        let spawned = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || job(&api, &sink));

        if let Err(error) = spawned {
            tracing::error!(
                worker = name,
                session = ticket.session,
                %error,
                "failed to spawn backend worker"
            );
        }
    }
}

impl ScanBackend for HttpBackend {
    fn start_scan(&self, request: StartScanRequest, sink: EventSink) {
        self.spawn("scan-start", sink, move |api, sink| {
            tracing::debug!(target_host = %request.target, "posting scan request");
            let result = api.start_scan(&request).map(|ack| {
                if let Some(message) = ack.message {
                    tracing::debug!(%message, "scan request acknowledged");
                }
            });
            sink.send(ClientEvent::StartAcknowledged(result));
        });
    }

    fn subscribe(&self, target: &str, sink: EventSink) {
        let target = target.to_owned();
        self.spawn("scan-stream", sink, move |api, sink| {
            run_subscription(api, &target, sink);
        });
    }

    fn poll_status(&self, sink: EventSink) {
        self.spawn("scan-poll", sink, |api, sink| {
            if sink.is_cancelled() {
                return;
            }
            sink.send(ClientEvent::StatusPolled(api.scan_status()));
        });
    }

    fn fetch_final(&self, target: &str, sink: EventSink) {
        let target = target.to_owned();
        self.spawn("scan-results", sink, move |api, sink| {
            if sink.is_cancelled() {
                return;
            }
            sink.send(ClientEvent::FinalResults(api.fetch_results(Some(&target))));
        });
    }
}

fn run_subscription(api: &ScanApi, target: &str, sink: &EventSink) {
    let stream = match api.open_stream(target) {
        Ok(stream) => stream,
        Err(error) => {
            sink.send(ClientEvent::StreamFailed(error.to_string()));
            return;
        }
    };

    if !sink.send(ClientEvent::StreamOpened) {
        return;
    }

    if let Some(reason) = forward_frames(stream, sink, api.stream_idle_ticks()) {
        sink.send(ClientEvent::StreamFailed(reason));
    }
}

/// Relays decoded frames into `sink` until the stream ends, fails, stays
/// silent for `max_idle_ticks` read timeouts in a row, or the sink is
/// cancelled. Returns the failure to report, if any.
pub(crate) fn forward_frames<I>(frames: I, sink: &EventSink, max_idle_ticks: u32) -> Option<String>
where
    I: IntoIterator<Item = Result<SseFrame, SseError>>,
{
    let mut idle_ticks = 0u32;

    for frame in frames {
        if sink.is_cancelled() {
            tracing::debug!(generation = sink.ticket().generation, "subscription cancelled");
            return None;
        }

        let event = match frame {
            Ok(frame) => match parse_stream_message(&frame.data) {
                Ok(message) => ClientEvent::StreamMessage(message),
                Err(error) => ClientEvent::StreamMalformed(error.to_string()),
            },
            Err(SseError::Idle) => {
                idle_ticks += 1;
                if idle_ticks >= max_idle_ticks {
                    return Some(format!("stream silent for {idle_ticks} read timeouts"));
                }
                continue;
            }
            Err(error @ SseError::InvalidUtf8) => ClientEvent::StreamMalformed(error.to_string()),
            Err(error) => return Some(error.to_string()),
        };

        idle_ticks = 0;
        if !sink.send(event) {
            return None;
        }
    }

    Some("stream closed by backend".to_owned())
}
