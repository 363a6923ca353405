#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const WATCH_JSON: &str = r#"?WATCH={"enable":true,"json":true};"#;

/// In-process stand-in for gpsd on an ephemeral local port
///
/// Accepts one client, reads the handshake up to the terminating `;`, then
/// writes each chunk as a separate `write` with a short pause in between.
pub struct FakeGpsd {
    pub port: u16,
    handle: JoinHandle<String>,
}

impl FakeGpsd {
    /// Sends `chunks` and closes the connection
    pub fn serve(chunks: Vec<&'static str>) -> Self {
        Self::spawn(chunks, false)
    }

    /// Sends `chunks` and keeps the connection open until the client goes away
    pub fn serve_and_hold(chunks: Vec<&'static str>) -> Self {
        Self::spawn(chunks, true)
    }

    fn spawn(chunks: Vec<&'static str>, hold_open: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake gpsd");
        let port = listener.local_addr().expect("local addr").port();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept client");
            let handshake = read_handshake(&mut stream);

            // the client may hang up early once it has what it wants
            for chunk in chunks {
                if stream.write_all(chunk.as_bytes()).is_err() || stream.flush().is_err() {
                    return handshake;
                }
                thread::sleep(Duration::from_millis(5));
            }

            if hold_open {
                let mut sink = [0u8; 64];
                while matches!(stream.read(&mut sink), Ok(n) if n > 0) {}
            }
            handshake
        });

        FakeGpsd { port, handle }
    }

    /// Waits for the server thread and returns the handshake it received
    pub fn handshake(self) -> String {
        self.handle.join().expect("fake gpsd thread")
    }
}

fn read_handshake(stream: &mut TcpStream) -> String {
    let mut received = Vec::new();
    let mut byte = [0u8; 1];
    while !received.ends_with(b";") {
        match stream.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => received.push(byte[0]),
            Err(err) => panic!("reading handshake: {err}"),
        }
    }
    String::from_utf8(received).expect("handshake is utf-8")
}

/// Returns a local port nothing is listening on
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe");
    listener.local_addr().expect("local addr").port()
}
