//! Misbehaving backends for failure scenarios.

use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::thread;

use courier_config::SocketEndpoint;

#[derive(Debug, Clone, Copy)]
pub enum FakeBehaviour {
    /// Reads requests and never answers.
    Silent,
    /// Reads one request, then closes the connection.
    HangUp,
}

/// Starts a fake backend on an ephemeral port.
pub fn spawn_fake_backend(behaviour: FakeBehaviour) -> SocketEndpoint {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind fake backend");
    let port = listener.local_addr().expect("local addr").port();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            thread::spawn(move || {
                let mut lines = BufReader::new(stream).lines();
                match behaviour {
                    FakeBehaviour::Silent => {
                        while let Some(Ok(_)) = lines.next() {}
                    }
                    FakeBehaviour::HangUp => {
                        let _ = lines.next();
                    }
                }
            });
        }
    });
    SocketEndpoint::tcp("127.0.0.1", port)
}
