//! End-to-end session tests against a scripted fake VM on the other end
//! of a localhost TCP connection.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use vmprobe_frame::{kind, Frame, FrameReader, FrameWriter};
use vmprobe_session::{
    Interest, Message, MessageFactory, MessageListener, Outbound, Session, SessionConfig,
    SessionError, SessionState, DEFAULT_ISOLATE_ID,
};
use vmprobe_transport::{DebugListener, DebugStream};

/// Minimal inbound catalog for the fake VM.
#[derive(Debug)]
enum VmEvent {
    Param { name: String, value: String },
    Trace(String),
    ProcessTag,
    Exit,
    Other { kind: u32 },
}

impl Message for VmEvent {
    fn kind(&self) -> u32 {
        match self {
            VmEvent::Param { .. } => kind::IN_PARAM,
            VmEvent::Trace(_) => kind::IN_TRACE,
            VmEvent::ProcessTag => kind::IN_PROCESS_TAG,
            VmEvent::Exit => kind::IN_EXIT,
            VmEvent::Other { kind } => *kind,
        }
    }

    fn apply(&self, state: &SessionState) {
        if let VmEvent::Param { name, value } = self {
            state.set_parameter(name.clone(), value.clone());
        }
    }
}

struct VmEventFactory;

impl MessageFactory for VmEventFactory {
    type Message = VmEvent;

    fn decode(&self, k: u32, payload: Bytes) -> vmprobe_session::Result<VmEvent> {
        let event = match k {
            kind::IN_PARAM => {
                let text = String::from_utf8_lossy(&payload);
                let mut parts = text.split('\0');
                VmEvent::Param {
                    name: parts.next().unwrap_or_default().to_string(),
                    value: parts.next().unwrap_or_default().to_string(),
                }
            }
            kind::IN_TRACE => VmEvent::Trace(String::from_utf8_lossy(&payload).into_owned()),
            kind::IN_PROCESS_TAG => VmEvent::ProcessTag,
            kind::IN_EXIT => VmEvent::Exit,
            other => VmEvent::Other { kind: other },
        };
        Ok(event)
    }
}

struct ProcessedTag;

impl Outbound for ProcessedTag {
    fn kind(&self) -> u32 {
        kind::OUT_PROCESSED_TAG
    }

    fn target_isolate(&self) -> i32 {
        DEFAULT_ISOLATE_ID
    }

    fn encode(&self) -> Bytes {
        Bytes::new()
    }
}

struct SetOption {
    name: String,
    value: String,
    isolate: i32,
}

impl SetOption {
    fn new(name: &str, value: &str, isolate: i32) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            isolate,
        }
    }
}

impl Outbound for SetOption {
    fn kind(&self) -> u32 {
        kind::OUT_SET_OPTION
    }

    fn target_isolate(&self) -> i32 {
        self.isolate
    }

    fn encode(&self) -> Bytes {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.name.as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.value.as_bytes());
        buf.push(0);
        Bytes::from(buf)
    }
}

/// Accept a connection from a fake VM thread; returns (debugger side,
/// VM side).
fn connect_pair() -> (DebugStream, DebugStream) {
    let listener = DebugListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr();
    let dialer = thread::spawn(move || DebugStream::connect(addr).expect("vm connects"));
    let debugger = listener.accept().expect("accept vm");
    (debugger, dialer.join().expect("vm dial thread"))
}

struct TraceRecorder {
    seen: Mutex<Vec<String>>,
}

impl TraceRecorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }

    fn wait_for(&self, count: usize) -> Vec<String> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let seen = self.seen.lock().unwrap().clone();
            if seen.len() >= count || Instant::now() >= deadline {
                return seen;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

impl MessageListener<VmEvent> for TraceRecorder {
    fn interest(&self) -> Interest {
        Interest::Kind(kind::IN_TRACE)
    }

    fn on_message(&self, msg: Arc<VmEvent>) -> Result<(), Box<dyn std::error::Error>> {
        if let VmEvent::Trace(line) = msg.as_ref() {
            self.seen.lock().unwrap().push(line.clone());
        }
        Ok(())
    }
}

#[test]
fn request_reply_with_interleaved_events() {
    let (debugger, vm_stream) = connect_pair();

    let vm = thread::spawn(move || {
        let mut writer = FrameWriter::new(vm_stream.try_clone().expect("clone vm stream"));
        let mut reader = FrameReader::new(vm_stream);

        writer
            .send(kind::IN_PARAM, b"$console_errors\0true\0")
            .expect("send param");
        writer.send(kind::IN_TRACE, b"hello").expect("send trace");
        writer.send(kind::IN_PROCESS_TAG, b"").expect("send tag");

        // First debugger send switches off the unset isolate, then acks.
        let switch = reader.read_frame().expect("switch frame");
        let ack = reader.read_frame().expect("ack frame");

        writer.send(kind::IN_EXIT, b"").expect("send exit");
        (switch, ack)
    });

    let session = Session::start(debugger, VmEventFactory).expect("session starts");

    let tag = session
        .recv(Interest::Kind(kind::IN_PROCESS_TAG))
        .expect("process tag arrives");
    assert!(matches!(tag.as_ref(), VmEvent::ProcessTag));

    // The param's local effect ran on the reader thread before dispatch.
    assert_eq!(
        session.state().parameter("$console_errors").as_deref(),
        Some("true")
    );

    // The trace was unrelated to our wait and stayed buffered.
    let trace = session
        .recv_timeout(Interest::Kind(kind::IN_TRACE), Duration::from_secs(1))
        .expect("trace retrievable")
        .expect("trace buffered");
    assert!(matches!(trace.as_ref(), VmEvent::Trace(t) if t == "hello"));

    session.send(&ProcessedTag).expect("ack sends");

    let (switch, ack): (Frame, Frame) = vm.join().expect("vm script");
    assert_eq!(switch.kind, kind::OUT_SET_ACTIVE_ISOLATE);
    assert_eq!(switch.payload.as_ref(), &DEFAULT_ISOLATE_ID.to_le_bytes());
    assert_eq!(ack.kind, kind::OUT_PROCESSED_TAG);
    assert_eq!(session.state().active_isolate(), DEFAULT_ISOLATE_ID);

    // The exit sentinel closes the session; a blocked wait for a message
    // that never comes fails instead of hanging.
    let err = session.recv(Interest::Kind(kind::IN_SQUELCH)).unwrap_err();
    assert!(matches!(err, SessionError::Disconnected));
    assert!(session.is_closed());
}

#[test]
fn isolate_switch_injected_once_per_change() {
    let (debugger, vm_stream) = connect_pair();

    let vm = thread::spawn(move || {
        let mut reader = FrameReader::new(vm_stream);
        (0..3)
            .map(|_| reader.read_frame().expect("frame"))
            .collect::<Vec<Frame>>()
    });

    let session = Session::start(debugger, VmEventFactory).expect("session starts");

    session
        .send(&SetOption::new("break_on_fault", "on", 2))
        .expect("first send");
    assert_eq!(session.state().active_isolate(), 2);

    session
        .send(&SetOption::new("enumerate_override", "on", 2))
        .expect("second send");
    assert_eq!(session.state().active_isolate(), 2);

    let frames = vm.join().expect("vm script");
    assert_eq!(frames[0].kind, kind::OUT_SET_ACTIVE_ISOLATE);
    assert_eq!(frames[0].payload.as_ref(), &2i32.to_le_bytes());
    assert_eq!(frames[1].kind, kind::OUT_SET_OPTION);
    assert!(frames[1].payload.starts_with(b"break_on_fault\0"));
    // Same target again: no second switch frame.
    assert_eq!(frames[2].kind, kind::OUT_SET_OPTION);
    assert!(frames[2].payload.starts_with(b"enumerate_override\0"));
}

#[test]
fn late_listener_replays_backlog_then_stays_live() {
    let (debugger, vm_stream) = connect_pair();

    let vm = thread::spawn(move || {
        let mut writer = FrameWriter::new(vm_stream.try_clone().expect("clone vm stream"));
        let mut reader = FrameReader::new(vm_stream);

        writer.send(kind::IN_TRACE, b"one").expect("trace one");
        writer.send(kind::IN_TRACE, b"two").expect("trace two");
        writer.send(kind::IN_TRACE, b"three").expect("trace three");
        writer.send(kind::IN_PROCESS_TAG, b"").expect("sync tag");

        // Wait for the debugger's ack (switch + processed-tag), then one
        // more live trace.
        reader.read_frame().expect("switch frame");
        reader.read_frame().expect("ack frame");
        writer.send(kind::IN_TRACE, b"four").expect("trace four");
    });

    // One delivery worker makes replay-then-live ordering deterministic.
    let config = SessionConfig {
        delivery_workers: 1,
        ..SessionConfig::default()
    };
    let session =
        Session::start_with_config(debugger, VmEventFactory, config).expect("session starts");

    session
        .recv(Interest::Kind(kind::IN_PROCESS_TAG))
        .expect("sync tag arrives");

    let recorder = TraceRecorder::new();
    session.add_listener(recorder.clone() as Arc<dyn MessageListener<VmEvent>>);

    // Backlog replay: exactly the three buffered traces, in order.
    assert_eq!(recorder.wait_for(3), vec!["one", "two", "three"]);

    session.send(&ProcessedTag).expect("ack sends");
    assert_eq!(recorder.wait_for(4), vec!["one", "two", "three", "four"]);

    vm.join().expect("vm script");
}

#[test]
fn concurrent_senders_never_interleave_frame_bytes() {
    let (debugger, vm_stream) = connect_pair();

    const PER_SENDER: usize = 50;

    let vm = thread::spawn(move || {
        let mut reader = FrameReader::new(vm_stream);
        let mut alpha = 0usize;
        let mut beta = 0usize;
        // One switch frame (first send off the unset isolate) plus the
        // command frames from both senders.
        for _ in 0..(2 * PER_SENDER + 1) {
            let frame = reader.read_frame().expect("intact frame");
            match frame.kind {
                kind::OUT_SET_ACTIVE_ISOLATE => {}
                kind::OUT_SET_OPTION if frame.payload.starts_with(b"alpha") => alpha += 1,
                kind::OUT_SET_OPTION if frame.payload.starts_with(b"beta") => beta += 1,
                other => panic!("unexpected frame kind {other:#x}"),
            }
        }
        (alpha, beta)
    });

    let session = Arc::new(Session::start(debugger, VmEventFactory).expect("session starts"));

    let senders: Vec<_> = ["alpha", "beta"]
        .into_iter()
        .map(|tag| {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                for i in 0..PER_SENDER {
                    let value = format!("{i}");
                    session
                        .send(&SetOption::new(tag, &value, DEFAULT_ISOLATE_ID))
                        .expect("send");
                }
            })
        })
        .collect();

    for sender in senders {
        sender.join().expect("sender thread");
    }

    let (alpha, beta) = vm.join().expect("vm script");
    assert_eq!((alpha, beta), (PER_SENDER, PER_SENDER));
}

#[test]
fn dropped_reply_yields_no_match_instead_of_stale_delivery() {
    let (debugger, vm_stream) = connect_pair();

    let vm = thread::spawn(move || {
        let mut writer = FrameWriter::new(vm_stream.try_clone().expect("clone vm stream"));
        let mut reader = FrameReader::new(vm_stream);

        reader.read_frame().expect("switch frame");
        reader.read_frame().expect("option frame");
        writer
            .send(kind::IN_OPTION, b"swf_load_messages\0true\0")
            .expect("echo option");

        // Hold the socket open until the debugger finishes waiting.
        reader.read_frame().ok()
    });

    let session = Session::start(debugger, VmEventFactory).expect("session starts");

    // We expect an option echo but don't care about it.
    session
        .send_ignore_reply(
            &SetOption::new("swf_load_messages", "on", DEFAULT_ISOLATE_ID),
            Interest::Kind(kind::IN_OPTION),
        )
        .expect("send with drop token");

    // The echo arrives, the token eats it, and a bounded wait for the
    // same kind comes back empty rather than delivering stale data.
    let start = Instant::now();
    let reply = session
        .recv_timeout(Interest::Kind(kind::IN_OPTION), Duration::from_millis(150))
        .expect("wait is not an error");
    assert!(reply.is_none());
    assert!(start.elapsed() >= Duration::from_millis(150));

    session.shutdown();
    vm.join().expect("vm script");
}

#[test]
fn negative_length_fails_blocked_waiter() {
    let (debugger, vm_stream) = connect_pair();

    let session = Arc::new(Session::start(debugger, VmEventFactory).expect("session starts"));

    let waiter = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.recv(Interest::Any))
    };

    thread::sleep(Duration::from_millis(50));

    // A negative length means the stream is done; the reader closes the
    // session and the blocked waiter fails instead of hanging.
    {
        use std::io::Write;
        let mut raw = vm_stream;
        raw.write_all(&(-1i32).to_le_bytes()).expect("write length");
        raw.write_all(&0u32.to_le_bytes()).expect("write kind");
        raw.flush().expect("flush");
    }

    let result = waiter.join().expect("waiter thread");
    assert!(matches!(result, Err(SessionError::Disconnected)));
    assert!(session.is_closed());
}

#[test]
fn default_timeout_request_returns_no_match_when_vm_is_silent() {
    let (debugger, vm_stream) = connect_pair();

    let session = Session::start_with_config(
        debugger,
        VmEventFactory,
        SessionConfig {
            response_timeout: Duration::from_millis(100),
            ..SessionConfig::default()
        },
    )
    .expect("session starts");

    let reply = session
        .request_default_timeout(
            &SetOption::new("getter_timeout", "1500", DEFAULT_ISOLATE_ID),
            Interest::Kind(kind::IN_OPTION),
        )
        .expect("bounded wait is not an error");
    assert!(reply.is_none());

    drop(vm_stream);
}

#[test]
fn vm_disappearing_closes_the_session() {
    let (debugger, vm_stream) = connect_pair();

    let vm = thread::spawn(move || {
        let mut writer = FrameWriter::new(vm_stream);
        writer.send(kind::IN_TRACE, b"ok").expect("send trace");
        // Then the VM vanishes mid-session.
    });

    let session = Session::start(debugger, VmEventFactory).expect("session starts");

    let trace = session
        .recv(Interest::Kind(kind::IN_TRACE))
        .expect("first message fine");
    assert!(matches!(trace.as_ref(), VmEvent::Trace(t) if t == "ok"));

    vm.join().expect("vm thread");

    // EOF on the read side closes the session.
    let err = session.recv(Interest::Any).unwrap_err();
    assert!(matches!(err, SessionError::Disconnected));
    assert!(session.is_closed());
}
