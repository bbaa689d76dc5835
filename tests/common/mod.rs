//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use auth_service::config::MessagingSettings;
use auth_service::lifecycle::{ListenerActivity, Shutdown, ShutdownSignal};
use auth_service::messaging::{BrokerError, MessageBroker};
use auth_service::net::ListenerError;

/// How a [`FakeListener`] behaves once started.
#[derive(Debug, Clone, Copy)]
pub enum ListenerBehavior {
    /// Serve until closed, then take `drain` to finish.
    UntilClosed { drain: Duration },
    /// Fail with an accept error after the delay.
    FailAfter(Duration),
}

pub struct FakeListener {
    behavior: ListenerBehavior,
}

impl FakeListener {
    pub fn fast() -> Box<Self> {
        Box::new(Self {
            behavior: ListenerBehavior::UntilClosed { drain: Duration::ZERO },
        })
    }

    pub fn slow(drain: Duration) -> Box<Self> {
        Box::new(Self {
            behavior: ListenerBehavior::UntilClosed { drain },
        })
    }

    pub fn failing(after: Duration) -> Box<Self> {
        Box::new(Self {
            behavior: ListenerBehavior::FailAfter(after),
        })
    }
}

#[async_trait]
impl ListenerActivity for FakeListener {
    async fn serve(self: Box<Self>, mut close: ShutdownSignal) -> Result<(), ListenerError> {
        match self.behavior {
            ListenerBehavior::UntilClosed { drain } => {
                close.requested().await;
                tokio::time::sleep(drain).await;
                Ok(())
            }
            ListenerBehavior::FailAfter(after) => {
                tokio::time::sleep(after).await;
                Err(ListenerError::Accept(std::io::Error::other("injected accept failure")))
            }
        }
    }
}

/// How a [`FakeBroker`] run loop behaves.
#[derive(Debug, Clone, Copy)]
pub enum BrokerBehavior {
    UntilClosed,
    FailAfter(Duration),
    IgnoresClose,
}

/// Counts `close` calls.
pub struct FakeBroker {
    behavior: BrokerBehavior,
    closes: AtomicUsize,
    closed: Shutdown,
}

impl FakeBroker {
    pub fn new(behavior: BrokerBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            closes: AtomicUsize::new(0),
            closed: Shutdown::new(),
        })
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageBroker for FakeBroker {
    async fn run(&self) -> Result<(), BrokerError> {
        let mut closing = self.closed.subscribe();
        match self.behavior {
            BrokerBehavior::UntilClosed => {
                closing.requested().await;
                Ok(())
            }
            BrokerBehavior::FailAfter(after) => {
                tokio::select! {
                    () = closing.requested() => Ok(()),
                    () = tokio::time::sleep(after) => Err(BrokerError::Server("injected failure".to_string())),
                }
            }
            BrokerBehavior::IgnoresClose => std::future::pending().await,
        }
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.trigger();
    }
}

/// A single-connection NATS server speaking over WebSocket.
pub struct FakeNats {
    pub addr: SocketAddr,
    /// Every frame the client sent, as text.
    pub received: mpsc::UnboundedReceiver<String>,
    /// Raw protocol text to push to the client.
    pub push: mpsc::UnboundedSender<String>,
}

impl FakeNats {
    pub fn settings(&self) -> MessagingSettings {
        messaging_settings(self.addr, vec!["followers.get".to_string()])
    }

    /// Next frame from the client, failing the test after a second.
    pub async fn next_frame(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(1), self.received.recv())
            .await
            .expect("client frame in time")
            .expect("client still connected")
    }
}

pub const FAKE_INFO: &str =
    "INFO {\"server_id\":\"FAKE\",\"server_name\":\"fake\",\"version\":\"2.10.0\",\"max_payload\":1048576}\r\n";

pub async fn start_fake_nats() -> FakeNats {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (received_tx, received) = mpsc::unbounded_channel();
    let (push, mut push_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(WsMessage::binary(FAKE_INFO.as_bytes().to_vec())).await.unwrap();

        loop {
            tokio::select! {
                frame = ws.next() => {
                    let bytes = match frame {
                        Some(Ok(WsMessage::Binary(bytes))) => bytes.to_vec(),
                        Some(Ok(WsMessage::Text(text))) => text.as_str().as_bytes().to_vec(),
                        Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => continue,
                    };
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    if text == "PING\r\n" {
                        let _ = ws.send(WsMessage::binary(b"PONG\r\n".to_vec())).await;
                    }
                    let _ = received_tx.send(text);
                }
                Some(raw) = push_rx.recv() => {
                    if ws.send(WsMessage::binary(raw.into_bytes())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    FakeNats { addr, received, push }
}

pub fn messaging_settings(addr: SocketAddr, subjects: Vec<String>) -> MessagingSettings {
    MessagingSettings {
        url: Url::parse(&format!("ws://{}", addr)).unwrap(),
        client_name: "auth service".to_string(),
        subjects,
        queue_group: None,
        connect_timeout: Duration::from_secs(2),
    }
}
