use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use netscan_view::live::{
    ClientConfig, ClientEvent, ConnectionState, EventSink, LiveClient, ScanBackend,
};
use netscan_view::scan::{
    PortState, ScanSession, ScanStatus, StartScanRequest, StatusResponse, StreamMessage,
    parse_stream_message,
};

#[derive(Clone, Default)]
struct FakeBackend {
    streams: Rc<RefCell<Vec<(String, EventSink)>>>,
    starts: Rc<RefCell<Vec<(StartScanRequest, EventSink)>>>,
    polls: Rc<RefCell<Vec<EventSink>>>,
    fetches: Rc<RefCell<Vec<(String, EventSink)>>>,
}

impl FakeBackend {
    fn stream(&self) -> EventSink {
        self.streams.borrow().last().expect("no stream").1.clone()
    }
}

impl ScanBackend for FakeBackend {
    fn start_scan(&self, request: StartScanRequest, sink: EventSink) {
        self.starts.borrow_mut().push((request, sink));
    }

    fn subscribe(&self, target: &str, sink: EventSink) {
        self.streams.borrow_mut().push((target.to_owned(), sink));
    }

    fn poll_status(&self, sink: EventSink) {
        self.polls.borrow_mut().push(sink);
    }

    fn fetch_final(&self, target: &str, sink: EventSink) {
        self.fetches.borrow_mut().push((target.to_owned(), sink));
    }
}

fn frame(json: &str) -> ClientEvent {
    ClientEvent::StreamMessage(parse_stream_message(json).expect("valid frame"))
}

fn completion_json(target: &str) -> String {
    let closed: Vec<String> = (1..=100u16)
        .filter(|port| *port != 22 && *port != 80)
        .map(|port| port.to_string())
        .collect();
    format!(
        r#"{{"type":"complete","target":"{target}","open_ports":{{"22":"ssh","80":"http"}},"closed_ports":[{}],"filtered_ports":[]}}"#,
        closed.join(",")
    )
}

#[test]
fn live_scan_end_to_end() {
    let backend = FakeBackend::default();
    let mut client = LiveClient::new(backend.clone(), ClientConfig::default());
    let t0 = Instant::now();

    client.launch(ScanSession::new("10.0.0.5", 1, 100, 50).unwrap());
    {
        let starts = backend.starts.borrow();
        assert_eq!(starts.len(), 1);
        assert_eq!(
            (starts[0].0.target.as_str(), starts[0].0.start, starts[0].0.end),
            ("10.0.0.5", 1, 100)
        );
    }

    let stream = backend.stream();
    stream.send(ClientEvent::StreamOpened);
    stream.send(frame(r#"{"type":"port","port":22,"service":"ssh","vulnerabilities":["Weak SSH keys"]}"#));
    stream.send(frame(r#"{"type":"port","port":80,"service":"http"}"#));
    stream.send(frame(r#"{"type":"port","port":22,"service":"ssh","vulnerabilities":["Weak SSH keys"]}"#));
    client.pump(t0);

    assert_eq!(client.connection_state(), ConnectionState::Connected);
    assert_eq!(client.store().summary().open, 2);
    assert_eq!(client.store().summary().total, 100);

    stream.send(frame(
        r#"{"type":"graph","graph":{"nodes":[
            {"id":"target","label":"10.0.0.5","risk":"Medium"},
            {"id":"port_22","label":"ssh\n(22)","risk":"High","port":22,"service":"ssh"},
            {"id":"port_80","label":"http\n(80)","risk":"Medium","port":80,"service":"http"}
        ],"edges":[
            {"id":"edge_0","from":"target","to":"port_22","type":"lateral_movement","risk_score":8.0},
            {"id":"edge_1","from":"port_22","to":"port_80","type":"horizontal_movement","risk_score":6.5},
            {"id":"edge_2","from":"port_80","to":"port_443","type":"horizontal_movement","risk_score":6.5}
        ]},"exposure_score":42.0}"#,
    ));
    stream.send(frame(&completion_json("10.0.0.5")));
    client.pump(t0 + Duration::from_millis(100));

    let store = client.store();
    let summary = store.summary();
    assert_eq!((summary.open, summary.closed, summary.total), (2, 98, 100));
    assert_eq!(store.status(), ScanStatus::Complete);
    assert_eq!(store.ports().count(), 100);
    assert_eq!(store.port(22).unwrap().vulnerabilities, vec!["Weak SSH keys"]);
    assert_eq!(store.port(50).unwrap().state, PortState::Closed);
    assert_eq!(store.graph().nodes.len(), 3);
    assert_eq!(store.graph().edges.len(), 2);

    client.pump(t0 + Duration::from_millis(600));
    assert_eq!(client.connection_state(), ConnectionState::Idle);
    assert!(stream.is_cancelled());

    let json = client.store().export_json().unwrap();
    assert!(json.contains("\"10.0.0.5\""));
}

#[test]
fn lost_stream_recovers_through_polling() {
    let backend = FakeBackend::default();
    let mut client = LiveClient::new(backend.clone(), ClientConfig::default());
    let mut now = Instant::now();

    client.launch(ScanSession::new("10.0.0.5", 1, 100, 50).unwrap());
    let first = backend.stream();
    first.send(ClientEvent::StreamOpened);
    first.send(frame(r#"{"type":"port","port":22,"service":"ssh"}"#));
    first.send(ClientEvent::StreamFailed("connection reset".into()));
    client.pump(now);

    let mut delays = Vec::new();
    loop {
        let Some(wait) = client.next_wakeup(now) else {
            break;
        };
        if client.connection_state() == ConnectionState::Polling {
            break;
        }
        delays.push(wait.as_millis());
        now += wait;
        client.pump(now);
        backend.stream().send(ClientEvent::StreamFailed("refused".into()));
        client.pump(now);
    }
    assert_eq!(delays, vec![1000, 2000, 4000, 8000]);
    assert_eq!(client.connection_state(), ConnectionState::Polling);
    assert_eq!(client.next_wakeup(now), Some(Duration::from_millis(2000)));

    now += Duration::from_millis(2000);
    client.pump(now);
    backend.polls.borrow()[0].send(ClientEvent::StatusPolled(Ok(StatusResponse { running: false })));
    client.pump(now);

    let (target, fetch) = backend.fetches.borrow()[0].clone();
    assert_eq!(target, "10.0.0.5");
    let payload = match parse_stream_message(&completion_json("10.0.0.5")).unwrap() {
        StreamMessage::Complete(payload) => payload,
        other => panic!("unexpected {other:?}"),
    };
    fetch.send(ClientEvent::FinalResults(Ok(payload)));
    client.pump(now);

    assert_eq!(client.connection_state(), ConnectionState::Idle);
    let summary = client.store().summary();
    assert_eq!((summary.open, summary.total), (2, 100));
    assert_eq!(client.store().port(22).unwrap().service, "ssh");
}

#[test]
fn relaunch_ignores_previous_session() {
    let backend = FakeBackend::default();
    let mut client = LiveClient::new(backend.clone(), ClientConfig::default());
    let t0 = Instant::now();

    client.launch(ScanSession::new("10.0.0.5", 1, 100, 50).unwrap());
    let old_stream = backend.stream();
    let old_start = backend.starts.borrow()[0].1.clone();

    client.launch(ScanSession::new("10.0.0.9", 1, 10, 5).unwrap());
    assert!(!old_stream.send(frame(&completion_json("10.0.0.5"))));
    assert!(!old_start.send(ClientEvent::StartAcknowledged(Ok(()))));

    let stream = backend.stream();
    stream.send(frame(r#"{"type":"port","port":443,"service":"https"}"#));
    client.pump(t0);

    let store = client.store();
    assert_eq!(store.target(), Some("10.0.0.9"));
    assert_eq!(store.status(), ScanStatus::Running);
    assert_eq!(store.summary().open, 1);
    assert_eq!(store.summary().total, 10);
    assert!(store.port(22).is_none());
}
