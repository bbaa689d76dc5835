//! Message broker client: NATS text protocol over WebSocket.
//!
//! # Responsibilities
//! - Connect and handshake within a bounded timeout
//! - Run the subscription loop: SUB, dispatch MSG, answer PING
//! - Stop cleanly when `close` is requested
//!
//! # Design Decisions
//! - `run` owns the socket for the duration of the loop; it can run once
//! - Handlers run inline, so messages on one connection are handled in order
//! - `close` is a flag, not an I/O call, so it is idempotent and never blocks

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::MessagingSettings;
use crate::lifecycle::shutdown::Shutdown;
use crate::messaging::handler::MessageHandler;
use crate::messaging::protocol::{ClientOp, ConnectOptions, Decoder, ServerOp};
use crate::messaging::types::{BrokerError, Message, ServerInfo};
use crate::messaging::MessageBroker;
use crate::observability::metrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bound on sending our close frame once the loop is asked to stop.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// A subject registered with the broker before the loop starts.
#[derive(Clone)]
pub struct Subscription {
    pub subject: String,
    pub queue_group: Option<String>,
    pub handler: Arc<dyn MessageHandler>,
}

impl Subscription {
    pub fn new(subject: impl Into<String>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            subject: subject.into(),
            queue_group: None,
            handler,
        }
    }

    pub fn with_queue_group(mut self, group: Option<String>) -> Self {
        self.queue_group = group;
        self
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .field("queue_group", &self.queue_group)
            .finish_non_exhaustive()
    }
}

/// Socket plus any bytes read but not yet decoded.
struct Connection {
    ws: WsStream,
    decoder: Decoder,
}

impl Connection {
    async fn send(&mut self, op: ClientOp<'_>) -> Result<(), BrokerError> {
        self.ws.send(WsMessage::binary(op.encode())).await?;
        Ok(())
    }

    /// Read one frame into the decoder. `Ok(false)` means the peer closed.
    async fn read_frame(&mut self) -> Result<bool, BrokerError> {
        match self.ws.next().await {
            Some(Ok(WsMessage::Binary(bytes))) => self.decoder.extend(&bytes),
            Some(Ok(WsMessage::Text(text))) => self.decoder.extend(text.as_str().as_bytes()),
            Some(Ok(WsMessage::Close(_))) | None => return Ok(false),
            // Control frames are answered by tungstenite itself.
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
        Ok(true)
    }

    /// Next decoded operation, reading frames as needed.
    async fn next_op(&mut self) -> Result<ServerOp, BrokerError> {
        loop {
            if let Some(op) = self.decoder.next_op()? {
                return Ok(op);
            }
            if !self.read_frame().await? {
                return Err(BrokerError::Closed);
            }
        }
    }
}

/// Message broker client.
pub struct NatsBroker {
    name: String,
    server: ServerInfo,
    connection: Mutex<Option<Connection>>,
    subscriptions: Vec<Subscription>,
    closed: Shutdown,
}

impl NatsBroker {
    /// Connect to the broker and complete the protocol handshake.
    ///
    /// The whole sequence (WebSocket upgrade, INFO, CONNECT, PING/PONG) is
    /// bounded by `settings.connect_timeout`.
    pub async fn connect(
        settings: &MessagingSettings,
        subscriptions: Vec<Subscription>,
    ) -> Result<Self, BrokerError> {
        let limit = settings.connect_timeout;
        let (connection, server) = timeout(limit, handshake(settings))
            .await
            .map_err(|_| BrokerError::Timeout(limit))??;

        tracing::info!(
            url = %settings.url,
            server_id = %server.server_id,
            server_version = %server.version,
            subscriptions = subscriptions.len(),
            "Connected to message broker"
        );

        Ok(Self {
            name: settings.client_name.clone(),
            server,
            connection: Mutex::new(Some(connection)),
            subscriptions,
            closed: Shutdown::new(),
        })
    }

    /// What the server announced during the handshake.
    pub fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_triggered()
    }

    async fn dispatch(&self, conn: &mut Connection, op: ServerOp) -> Result<(), BrokerError> {
        match op {
            ServerOp::Ping => conn.send(ClientOp::Pong).await,
            ServerOp::Pong | ServerOp::Ok => Ok(()),
            ServerOp::Info(info) => {
                tracing::debug!(server_id = %info.server_id, "Broker sent updated INFO");
                Ok(())
            }
            ServerOp::Err(message) => Err(BrokerError::Server(message)),
            ServerOp::Msg(message) => self.deliver(conn, message).await,
        }
    }

    async fn deliver(&self, conn: &mut Connection, message: Message) -> Result<(), BrokerError> {
        let subscription = (message.sid as usize)
            .checked_sub(1)
            .and_then(|index| self.subscriptions.get(index));
        let Some(subscription) = subscription else {
            tracing::warn!(sid = message.sid, subject = %message.subject, "Message for unknown subscription");
            return Ok(());
        };

        metrics::record_message(&subscription.subject);

        let reply = subscription.handler.handle(&message).await;
        if let (Some(payload), Some(reply_to)) = (reply, message.reply_to.as_deref()) {
            conn.send(ClientOp::Pub {
                subject: reply_to,
                reply_to: None,
                payload: &payload,
            })
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for NatsBroker {
    async fn run(&self) -> Result<(), BrokerError> {
        let mut conn = self
            .connection
            .lock()
            .await
            .take()
            .ok_or(BrokerError::AlreadyRunning)?;
        let mut closing = self.closed.subscribe();

        for (index, subscription) in self.subscriptions.iter().enumerate() {
            let sid = index as u64 + 1;
            conn.send(ClientOp::Sub {
                subject: &subscription.subject,
                queue_group: subscription.queue_group.as_deref(),
                sid,
            })
            .await?;
            tracing::info!(
                client = %self.name,
                subject = %subscription.subject,
                queue_group = ?subscription.queue_group,
                sid,
                "Subscribed"
            );
        }

        loop {
            while let Some(op) = conn.decoder.next_op()? {
                self.dispatch(&mut conn, op).await?;
            }

            tokio::select! {
                () = closing.requested() => {
                    match timeout(CLOSE_HANDSHAKE_TIMEOUT, conn.ws.close(None)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::debug!(error = %e, "WebSocket close handshake failed"),
                        Err(_) => tracing::debug!("WebSocket close handshake timed out"),
                    }
                    tracing::info!(client = %self.name, "Subscription loop stopped");
                    return Ok(());
                }
                frame = conn.read_frame() => {
                    if !frame? {
                        return if closing.is_requested() {
                            Ok(())
                        } else {
                            Err(BrokerError::Closed)
                        };
                    }
                }
            }
        }
    }

    fn close(&self) {
        if self.closed.trigger() {
            tracing::info!(client = %self.name, "Closing message broker connection");
        }
    }
}

async fn handshake(settings: &MessagingSettings) -> Result<(Connection, ServerInfo), BrokerError> {
    let (ws, _response) = connect_async(settings.url.as_str()).await?;
    let mut conn = Connection {
        ws,
        decoder: Decoder::new(),
    };

    let server = match conn.next_op().await? {
        ServerOp::Info(info) => info,
        other => return Err(BrokerError::Handshake(format!("expected INFO, got {:?}", other))),
    };
    if server.max_payload > 0 {
        conn.decoder
            .set_max_payload(usize::try_from(server.max_payload).unwrap_or(usize::MAX));
    }

    let options = ConnectOptions::new(settings.client_name.clone());
    conn.send(ClientOp::Connect(&options)).await?;
    conn.send(ClientOp::Ping).await?;

    // The server answers the PING only once CONNECT was accepted.
    loop {
        match conn.next_op().await? {
            ServerOp::Pong => break,
            ServerOp::Ok | ServerOp::Info(_) => {}
            ServerOp::Ping => conn.send(ClientOp::Pong).await?,
            ServerOp::Err(message) => return Err(BrokerError::Handshake(message)),
            ServerOp::Msg(_) => {
                return Err(BrokerError::Handshake("message before subscription".to_string()));
            }
        }
    }

    Ok((conn, server))
}

/// Convenience for the default subscription list.
pub fn subscriptions_for(settings: &MessagingSettings, handler: Arc<dyn MessageHandler>) -> Vec<Subscription> {
    settings
        .subjects
        .iter()
        .map(|subject| {
            Subscription::new(subject.clone(), Arc::clone(&handler))
                .with_queue_group(settings.queue_group.clone())
        })
        .collect()
}
