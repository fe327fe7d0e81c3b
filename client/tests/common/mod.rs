#![allow(dead_code)]

use shared::{AudioChunk, ServerEndpoint, StudioError, StudioResult};
use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use studio_client::{CaptureDevice, CaptureStream, ChannelId, OutputBackend, StreamGuard, SynthesisClient};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

// Minimal synthesis server: answers every request with a fixed status and body.
pub struct StubServer {
    pub addr: SocketAddr,
    pub connections: Arc<AtomicUsize>,
    pub requests: mpsc::UnboundedReceiver<String>,
}

impl StubServer {
    pub async fn spawn(status: u16, body: &[u8]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let (tx, requests) = mpsc::unbounded_channel();

        let counter = connections.clone();
        let body = body.to_vec();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let request = read_request(&mut stream).await;
                let _ = tx.send(String::from_utf8_lossy(&request).into_owned());

                let reason = if status == 200 { "OK" } else { "Internal Server Error" };
                let head = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: audio/wav\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    reason,
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes()).await;
                let _ = stream.write_all(&body).await;
                let _ = stream.shutdown().await;
            }
        });

        Self {
            addr,
            connections,
            requests,
        }
    }

    pub fn endpoint(&self) -> ServerEndpoint {
        ServerEndpoint::new("http://127.0.0.1", self.addr.port().to_string())
    }

    pub fn client(&self) -> SynthesisClient {
        client_for(self.endpoint())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

// Client that ignores proxy settings so loopback requests stay local.
pub fn client_for(endpoint: ServerEndpoint) -> SynthesisClient {
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    SynthesisClient::with_http(endpoint, http)
}

// An endpoint nothing is listening on.
pub async fn closed_endpoint() -> ServerEndpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    ServerEndpoint::new("http://127.0.0.1", port.to_string())
}

async fn read_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let Some(header_end) = find(&buf, b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        let received = buf.len() - header_end - 4;
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok());
        match content_length {
            Some(expected) if received >= expected => break,
            None if buf.ends_with(b"0\r\n\r\n") => break,
            _ => {}
        }
    }
    buf
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

// A WAV payload the fake output will accept.
pub fn wav_bytes() -> Vec<u8> {
    let mut bytes = b"RIFF".to_vec();
    bytes.extend_from_slice(&[0x24, 0, 0, 0]);
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes
}

pub struct FlagGuard(pub Arc<AtomicBool>);

impl StreamGuard for FlagGuard {
    fn release(self: Box<Self>) {
        self.0.store(true, Ordering::SeqCst);
    }
}

// Microphone that yields a short burst of audio.
#[derive(Clone, Default)]
pub struct FakeMic {
    pub released: Arc<AtomicBool>,
    pub opened: Arc<AtomicUsize>,
}

impl CaptureDevice for FakeMic {
    fn open(&self) -> StudioResult<CaptureStream> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.released.store(false, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        for _ in 0..8 {
            let _ = tx.send(AudioChunk {
                data: vec![0.1; 441],
                sample_rate: 44_100,
                channels: 1,
            });
        }
        Ok(CaptureStream::new(rx, Box::new(FlagGuard(self.released.clone()))))
    }
}

pub struct MissingMic;

impl CaptureDevice for MissingMic {
    fn open(&self) -> StudioResult<CaptureStream> {
        Err(StudioError::DeviceUnavailable("No default input device available".to_string()))
    }
}

#[derive(Default)]
pub struct OutputLog {
    pub started: Vec<(ChannelId, usize)>,
    pub stopped: Vec<ChannelId>,
    pub finished: Vec<ChannelId>,
}

// Output that records calls instead of making sound.
#[derive(Clone, Default)]
pub struct FakeSpeaker(pub Rc<RefCell<OutputLog>>);

impl OutputBackend for FakeSpeaker {
    fn start(&mut self, channel: ChannelId, audio: Arc<[u8]>) -> StudioResult<()> {
        if !audio.starts_with(b"RIFF") {
            return Err(StudioError::Playback("Decode failed: unrecognized format".to_string()));
        }
        let mut log = self.0.borrow_mut();
        log.started.push((channel, audio.len()));
        log.finished.retain(|c| *c != channel);
        Ok(())
    }

    fn pause(&mut self, _channel: ChannelId) {}

    fn stop(&mut self, channel: ChannelId) {
        self.0.borrow_mut().stopped.push(channel);
    }

    fn position(&self, _channel: ChannelId) -> f64 {
        0.5
    }

    fn duration(&self, _channel: ChannelId) -> f64 {
        f64::INFINITY
    }

    fn is_finished(&self, channel: ChannelId) -> bool {
        self.0.borrow().finished.contains(&channel)
    }
}
