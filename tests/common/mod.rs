//! Shared utilities for integration testing: a scriptable mock broker, a
//! gateway runner, and a raw HTTP/1.1 client.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use harq_gateway::broker::wire::{Envelope, WireAction, WireRequest, WireResponse};
use harq_gateway::broker::Action;
use harq_gateway::config::GatewayConfig;
use harq_gateway::http::{Request, Response};
use harq_gateway::{Gateway, GatewayError, Shutdown};
use prost::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

pub const CONTROL: &str = "/harq-control";
pub const INBOUND: &str = "/harq-http";
pub const REPLY: &str = "/harq-http-reply";

/// What the mock broker saw, in arrival order, tagged with the link number.
#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Action { link: usize, action: Action },
    Request { link: usize, destination: String, request: Request },
}

/// How the mock broker answers one request.
pub enum Reply {
    Now(Response),
    After(Duration, Response),
    Never,
    /// Close the link without answering.
    Hangup,
}

type Responder = Arc<dyn Fn(&Request) -> Reply + Send + Sync>;

/// A broker that records every envelope and answers requests via a closure.
pub struct MockBroker {
    pub addr: SocketAddr,
    pub seen: Arc<Mutex<Vec<Seen>>>,
}

impl MockBroker {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&Request) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let responder: Responder = Arc::new(responder);

        let log = seen.clone();
        tokio::spawn(async move {
            let mut link = 0;
            while let Ok((socket, _)) = listener.accept().await {
                link += 1;
                tokio::spawn(serve_link(link, socket, log.clone(), responder.clone()));
            }
        });

        Self { addr, seen }
    }

    /// Broker that answers every request with 200 and `METHOD url` as body.
    pub async fn echo() -> Self {
        Self::start(|req| Reply::Now(echo_reply(req))).await
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.seen()
            .into_iter()
            .filter_map(|s| match s {
                Seen::Request { request, .. } => Some(request),
                Seen::Action { .. } => None,
            })
            .collect()
    }

    /// Poll until `pred` holds over the log or the deadline passes.
    pub async fn wait_for(&self, pred: impl Fn(&[Seen]) -> bool) -> bool {
        for _ in 0..200 {
            if pred(&self.seen()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

pub fn echo_reply(req: &Request) -> Response {
    Response::new(req.stream_id, 200)
        .with_header("Content-Type", "text/plain")
        .with_body(format!("{} {}", req.method, req.url))
}

async fn serve_link(link: usize, socket: TcpStream, log: Arc<Mutex<Vec<Seen>>>, responder: Responder) {
    let (mut rd, mut wr) = socket.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if wr.write_all(&frame).await.is_err() {
                break;
            }
        }
    });

    loop {
        let len = match rd.read_u32().await {
            Ok(len) => len as usize,
            Err(_) => return,
        };
        let mut payload = vec![0u8; len];
        if rd.read_exact(&mut payload).await.is_err() {
            return;
        }

        let envelope = Envelope::decode(&payload[..]).unwrap();
        if envelope.destination == CONTROL {
            let action = Action::try_from(envelope.open::<WireAction>().unwrap()).unwrap();
            log.lock().unwrap().push(Seen::Action { link, action });
            continue;
        }

        let request = Request::try_from(envelope.open::<WireRequest>().unwrap()).unwrap();
        let reply = responder(&request);
        log.lock().unwrap().push(Seen::Request {
            link,
            destination: envelope.destination.clone(),
            request,
        });

        match reply {
            Reply::Now(rsp) => {
                let _ = tx.send(frame_reply(&rsp));
            }
            Reply::After(delay, rsp) => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(frame_reply(&rsp));
                });
            }
            Reply::Never => {}
            Reply::Hangup => return,
        }
    }
}

/// Length-prefixed reply envelope, as the broker would publish it.
pub fn frame_reply(rsp: &Response) -> Vec<u8> {
    let payload = Envelope::seal(REPLY, &WireResponse::from(rsp)).encode_to_vec();
    let mut out = (payload.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(&payload);
    out
}

/// Gateway configuration pointed at `broker`, listening on an ephemeral port.
pub fn test_config(broker: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.broker.address = broker.to_string();
    config.broker.control_destination = CONTROL.into();
    config.broker.reconnect_base_delay_ms = 10;
    config.broker.reconnect_max_delay_ms = 50;
    config
}

/// A gateway running its event loop on a dedicated thread.
pub struct RunningGateway {
    pub addr: SocketAddr,
    shutdown: Shutdown,
    thread: Option<std::thread::JoinHandle<Result<(), GatewayError>>>,
}

impl RunningGateway {
    pub fn start(config: GatewayConfig) -> Self {
        let mut gateway = Gateway::bind(config).unwrap();
        let addr = gateway.local_addr().unwrap();
        let shutdown = gateway.shutdown_handle();
        let thread = std::thread::spawn(move || gateway.run());
        Self {
            addr,
            shutdown,
            thread: Some(thread),
        }
    }

    /// Trigger shutdown and return the loop's result.
    pub fn stop(mut self) -> Result<(), GatewayError> {
        self.shutdown.trigger();
        match self.thread.take() {
            Some(thread) => thread.join().unwrap(),
            None => Ok(()),
        }
    }
}

impl Drop for RunningGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// A parsed HTTP/1.1 response as seen by a client.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub head: String,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.split("\r\n").skip(1).find_map(|line| {
            let (n, v) = line.split_once(':')?;
            n.eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }
}

/// Raw client connection that can read several responses in sequence.
pub struct HttpClient {
    pub stream: TcpStream,
    buf: Vec<u8>,
}

impl HttpClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            buf: Vec::new(),
        }
    }

    pub async fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    async fn fill(&mut self) -> bool {
        let mut chunk = [0u8; 4096];
        let n = tokio::time::timeout(Duration::from_secs(5), self.stream.read(&mut chunk))
            .await
            .expect("timed out waiting for the gateway")
            .unwrap_or(0);
        self.buf.extend_from_slice(&chunk[..n]);
        n > 0
    }

    /// Read exactly one response; `None` if the gateway closed first.
    pub async fn read_response(&mut self) -> Option<RawResponse> {
        let head_end = loop {
            if let Some(pos) = self.buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            if !self.fill().await {
                return None;
            }
        };

        let head = String::from_utf8(self.buf[..head_end].to_vec()).unwrap();
        let status = head[9..12].parse().unwrap();
        let mut response = RawResponse {
            status,
            head,
            body: Vec::new(),
        };
        let len: usize = response.header("Content-Length").unwrap_or("0").parse().unwrap();

        while self.buf.len() < head_end + len {
            if !self.fill().await {
                return None;
            }
        }
        response.body = self.buf[head_end..head_end + len].to_vec();
        self.buf.drain(..head_end + len);
        Some(response)
    }

    /// Whether the gateway closed the connection (EOF before any bytes).
    pub async fn is_closed(&mut self) -> bool {
        self.buf.is_empty() && !self.fill().await
    }
}

/// One-shot request helper.
pub async fn request(addr: SocketAddr, raw: &[u8]) -> RawResponse {
    let mut client = HttpClient::connect(addr).await;
    client.send(raw).await;
    client.read_response().await.expect("gateway closed before replying")
}
