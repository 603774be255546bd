//! Channel behaviour against scripted in-process backends.

use std::io::{BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use courier_config::SocketEndpoint;
use courier_wire::{
    Command, CorrelationId, FrameReader, MAX_FRAME_BYTES, RemoteErrorKind, RequestFrame,
    ResponseFrame, write_frame,
};
use socket2::{Domain, Socket, Type};

use super::{ChannelError, ChannelSettings, CommandChannel, MultiplexedChannel};

/// Server side of one accepted connection.
struct Peer {
    frames: FrameReader<BufReader<TcpStream>>,
    writer: TcpStream,
}

impl Peer {
    fn new(stream: TcpStream) -> Self {
        let writer = stream.try_clone().expect("clone peer stream");
        Self {
            frames: FrameReader::new(BufReader::new(stream)),
            writer,
        }
    }

    fn next_request(&mut self) -> Option<RequestFrame> {
        self.frames.read_frame().ok().flatten()
    }

    fn reply(&mut self, frame: &ResponseFrame) {
        let _ = write_frame(&mut self.writer, frame);
    }

    fn write_raw(&mut self, bytes: &[u8]) {
        let _ = self.writer.write_all(bytes);
    }
}

/// Backend that runs `behaviour` for every accepted connection.
struct FakeBackend {
    endpoint: SocketEndpoint,
    connections: Arc<AtomicUsize>,
}

impl FakeBackend {
    fn spawn<F>(behaviour: F) -> Self
    where
        F: Fn(Peer) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind fake backend");
        let port = listener.local_addr().expect("local addr").port();
        let connections = Arc::new(AtomicUsize::new(0));
        let accepted = Arc::clone(&connections);
        let behaviour = Arc::new(behaviour);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                accepted.fetch_add(1, Ordering::SeqCst);
                let behaviour = Arc::clone(&behaviour);
                thread::spawn(move || behaviour(Peer::new(stream)));
            }
        });
        Self {
            endpoint: SocketEndpoint::tcp("127.0.0.1", port),
            connections,
        }
    }

    fn echo() -> Self {
        Self::spawn(|mut peer| {
            while let Some(request) = peer.next_request() {
                let payload = json!(format!("{}:{}", request.command, request.payload));
                peer.reply(&ResponseFrame::success(request.correlation, payload));
            }
        })
    }

    fn channel(&self, request_timeout: Duration) -> MultiplexedChannel {
        MultiplexedChannel::new(
            "fake",
            self.endpoint.clone(),
            ChannelSettings {
                connect_timeout: Duration::from_millis(500),
                request_timeout,
            },
        )
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[fixture]
fn settings() -> ChannelSettings {
    ChannelSettings {
        connect_timeout: Duration::from_millis(500),
        request_timeout: Duration::from_secs(2),
    }
}

fn unreachable_endpoint() -> SocketEndpoint {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("reserve port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    SocketEndpoint::tcp("127.0.0.1", port)
}

#[test]
fn send_returns_response_payload() {
    let backend = FakeBackend::echo();
    let channel = backend.channel(Duration::from_secs(2));

    let payload = channel
        .send(Command::new("get_user", json!("1")))
        .expect("echo response");
    assert_eq!(payload, json!("get_user:\"1\""));
}

#[test]
fn connection_is_reused_across_sends() {
    let backend = FakeBackend::echo();
    let channel = backend.channel(Duration::from_secs(2));

    for id in 0..3 {
        channel
            .send(Command::new("get_form", json!(id)))
            .expect("echo response");
    }
    assert_eq!(backend.connections(), 1);
    assert!(channel.is_connected());
}

#[test]
fn out_of_order_responses_reach_their_callers() {
    const CALLERS: usize = 4;
    let backend = FakeBackend::spawn(|mut peer| {
        let mut requests = Vec::new();
        while requests.len() < CALLERS {
            match peer.next_request() {
                Some(request) => requests.push(request),
                None => return,
            }
        }
        for request in requests.into_iter().rev() {
            peer.reply(&ResponseFrame::success(request.correlation, request.payload));
        }
        while peer.next_request().is_some() {}
    });
    let channel = Arc::new(backend.channel(Duration::from_secs(2)));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let callers: Vec<_> = (0..CALLERS)
        .map(|index| {
            let channel = Arc::clone(&channel);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let result = channel.send(Command::new("get_user", json!(index)));
                (index, result)
            })
        })
        .collect();

    for caller in callers {
        let (index, result) = caller.join().expect("join caller");
        assert_eq!(result.expect("response"), json!(index));
    }
}

#[rstest]
fn unreachable_backend_fails_to_connect(settings: ChannelSettings) {
    let channel = MultiplexedChannel::new("users", unreachable_endpoint(), settings);
    let error = channel
        .send(Command::new("get_user", json!("1")))
        .expect_err("nothing is listening");
    assert!(matches!(error, ChannelError::ConnectionFailed { ref backend, .. } if backend == "users"));
}

#[rstest]
fn empty_command_is_refused_before_connecting(settings: ChannelSettings) {
    let channel = MultiplexedChannel::new("users", unreachable_endpoint(), settings);
    let error = channel
        .send(Command::new("", Value::Null))
        .expect_err("blank command name");
    assert!(matches!(error, ChannelError::InvalidCommand { .. }));
}

#[test]
fn silent_backend_times_out() {
    let backend = FakeBackend::spawn(|mut peer| while peer.next_request().is_some() {});
    let channel = backend.channel(Duration::from_millis(150));

    let started = Instant::now();
    let error = channel
        .send(Command::new("get_user", json!("1")))
        .expect_err("no answer");
    assert!(matches!(error, ChannelError::Timeout { ref command, .. } if command == "get_user"));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn timed_out_requests_leave_nothing_pending() {
    let backend = FakeBackend::spawn(|mut peer| while peer.next_request().is_some() {});
    let channel = backend.channel(Duration::from_millis(100));

    for id in 0..3 {
        let result = channel.send(Command::new("get_user", json!(id)));
        assert!(matches!(result, Err(ChannelError::Timeout { .. })));
    }
    assert!(channel.is_connected());
    assert_eq!(channel.pending_requests(), 0);
}

#[test]
fn backend_that_stops_reading_cannot_stall_senders() {
    let backend = FakeBackend::spawn(|peer| {
        thread::sleep(Duration::from_secs(10));
        drop(peer);
    });
    let channel = backend.channel(Duration::from_millis(200));
    let bulky = json!("x".repeat(900 * 1024));

    for _ in 0..16 {
        let started = Instant::now();
        let result = channel.send(Command::new("put_blob", bulky.clone()));
        assert!(
            matches!(
                result,
                Err(ChannelError::Timeout { .. } | ChannelError::Disconnected { .. })
            ),
            "unexpected result: {result:?}"
        );
        assert!(
            started.elapsed() < Duration::from_secs(1),
            "send blocked for {:?}",
            started.elapsed()
        );
    }

    let started = Instant::now();
    let result = channel.send(Command::new("get_user", json!("1")));
    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[rstest]
fn oversized_commands_are_refused_before_connecting(settings: ChannelSettings) {
    let channel = MultiplexedChannel::new("users", unreachable_endpoint(), settings);
    let error = channel
        .send(Command::new("put_blob", json!("x".repeat(MAX_FRAME_BYTES))))
        .expect_err("frame too large");
    assert!(matches!(error, ChannelError::InvalidCommand { .. }));
    assert!(!channel.is_connected());
}

/// A listener whose accept queue is already full, so further connection
/// attempts hang until their deadline instead of being refused.
fn saturated_endpoint() -> (Socket, Vec<TcpStream>, SocketEndpoint) {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None).expect("create socket");
    let address: std::net::SocketAddr = "127.0.0.1:0".parse().expect("parse address");
    socket.bind(&address.into()).expect("bind socket");
    socket.listen(0).expect("listen");
    let port = socket
        .local_addr()
        .expect("local addr")
        .as_socket()
        .expect("inet address")
        .port();
    let target = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    let fillers = (0..4)
        .filter_map(|_| TcpStream::connect_timeout(&target, Duration::from_millis(100)).ok())
        .collect();
    (socket, fillers, SocketEndpoint::tcp("127.0.0.1", port))
}

#[test]
fn concurrent_callers_share_one_connection_attempt() {
    const CALLERS: usize = 6;
    let (_socket, _fillers, endpoint) = saturated_endpoint();
    let timeout = Duration::from_millis(300);
    let channel = Arc::new(MultiplexedChannel::new(
        "users",
        endpoint,
        ChannelSettings {
            connect_timeout: timeout,
            request_timeout: timeout,
        },
    ));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let callers: Vec<_> = (0..CALLERS)
        .map(|index| {
            let channel = Arc::clone(&channel);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let started = Instant::now();
                let result = channel.send(Command::new("get_user", json!(index)));
                (result, started.elapsed())
            })
        })
        .collect();

    for caller in callers {
        let (result, elapsed) = caller.join().expect("join caller");
        assert!(result.is_err(), "nothing answers on a saturated listener");
        assert!(
            elapsed < timeout * 3,
            "caller waited {elapsed:?}, longer than a shared attempt allows"
        );
    }
}

#[rstest]
fn callers_waiting_on_a_failed_attempt_see_its_error(settings: ChannelSettings) {
    const CALLERS: usize = 4;
    let channel = Arc::new(MultiplexedChannel::new(
        "users",
        unreachable_endpoint(),
        settings,
    ));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let callers: Vec<_> = (0..CALLERS)
        .map(|_| {
            let channel = Arc::clone(&channel);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                channel.send(Command::new("get_user", json!("1")))
            })
        })
        .collect();

    for caller in callers {
        let error = caller.join().expect("join caller").expect_err("refused");
        assert!(
            matches!(error, ChannelError::ConnectionFailed { ref backend, .. } if backend == "users"),
            "unexpected error: {error:?}"
        );
    }
}

#[test]
fn late_responses_are_discarded() {
    let backend = FakeBackend::spawn(|mut peer| {
        let Some(first) = peer.next_request() else { return };
        let Some(second) = peer.next_request() else { return };
        // Answer the abandoned request only after the second one arrives.
        peer.reply(&ResponseFrame::success(first.correlation, json!("late")));
        peer.reply(&ResponseFrame::success(second.correlation, json!("fresh")));
        while peer.next_request().is_some() {}
    });
    let channel = backend.channel(Duration::from_millis(200));

    let first = channel.send(Command::new("get_user", json!("1")));
    assert!(matches!(first, Err(ChannelError::Timeout { .. })));
    let second = channel
        .send(Command::new("get_user", json!("2")))
        .expect("second request answered");
    assert_eq!(second, json!("fresh"));
    assert_eq!(backend.connections(), 1);
}

#[test]
fn responses_for_unissued_tokens_are_protocol_errors() {
    let backend = FakeBackend::spawn(|mut peer| {
        if peer.next_request().is_some() {
            peer.reply(&ResponseFrame::success(CorrelationId::new(999), json!("stray")));
        }
        while peer.next_request().is_some() {}
    });
    let channel = backend.channel(Duration::from_secs(2));

    let error = channel
        .send(Command::new("get_user", json!("1")))
        .expect_err("stray token poisons the connection");
    assert!(
        matches!(error, ChannelError::Protocol { ref message, .. } if message.contains("999")),
        "unexpected error: {error:?}"
    );
    assert!(!channel.is_connected());
}

#[test]
fn backend_hanging_up_disconnects_request() {
    let backend = FakeBackend::spawn(|mut peer| {
        let _ = peer.next_request();
    });
    let channel = backend.channel(Duration::from_secs(2));

    let error = channel
        .send(Command::new("get_form", json!("1")))
        .expect_err("connection dropped");
    assert!(matches!(error, ChannelError::Disconnected { .. }));
}

#[test]
fn channel_reconnects_after_drop() {
    let backend = FakeBackend::spawn(|mut peer| {
        if let Some(request) = peer.next_request() {
            peer.reply(&ResponseFrame::success(request.correlation, json!("once")));
        }
    });
    let channel = backend.channel(Duration::from_secs(2));

    channel
        .send(Command::new("get_form", json!("1")))
        .expect("first connection answers");
    let deadline = Instant::now() + Duration::from_secs(2);
    while channel.is_connected() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    channel
        .send(Command::new("get_form", json!("2")))
        .expect("second connection answers");
    assert_eq!(backend.connections(), 2);
}

#[test]
fn malformed_frame_poisons_connection() {
    let backend = FakeBackend::spawn(|mut peer| {
        if peer.next_request().is_some() {
            peer.write_raw(b"this is not a frame\n");
        }
        while peer.next_request().is_some() {}
    });
    let channel = backend.channel(Duration::from_secs(2));

    let error = channel
        .send(Command::new("get_user", json!("1")))
        .expect_err("garbage response");
    assert!(matches!(error, ChannelError::Protocol { .. }));
    assert!(!channel.is_connected());
}

#[test]
fn remote_errors_carry_kind() {
    let backend = FakeBackend::spawn(|mut peer| {
        while let Some(request) = peer.next_request() {
            peer.reply(&ResponseFrame::failure(
                request.correlation,
                RemoteErrorKind::UnknownCommand,
                format!("no handler for '{}'", request.command),
            ));
        }
    });
    let channel = backend.channel(Duration::from_secs(2));

    let error = channel
        .send(Command::new("get_widget", json!("1")))
        .expect_err("backend rejects");
    match error {
        ChannelError::Remote { source, .. } => {
            assert_eq!(source.kind, RemoteErrorKind::UnknownCommand);
            assert!(source.message.contains("get_widget"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn close_fails_outstanding_requests() {
    let backend = FakeBackend::spawn(|mut peer| while peer.next_request().is_some() {});
    let channel = Arc::new(backend.channel(Duration::from_secs(10)));

    let waiting = {
        let channel = Arc::clone(&channel);
        thread::spawn(move || channel.send(Command::new("get_user", json!("1"))))
    };
    let deadline = Instant::now() + Duration::from_secs(2);
    while !channel.is_connected() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    channel.close();
    let result = waiting.join().expect("join waiter");
    assert!(matches!(result, Err(ChannelError::Disconnected { .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!channel.is_connected());
}
