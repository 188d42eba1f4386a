//! Per-connection task
//!
//! Upgrades a TCP stream to WebSocket, then shuttles frames between the
//! socket and the broker until either side closes. The broker is always told
//! about the closure, however the loop ends.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::broker::Broker;
use crate::error::{Error, Result};
use crate::server::config::ServerConfig;
use crate::transport::{ChannelTransport, ConnectionId, Frame, Outbound, OutboundQueue, Transport};

/// One accepted client connection
pub struct Connection {
    id: ConnectionId,
    socket: Option<TcpStream>,
    peer_addr: SocketAddr,
    config: ServerConfig,
    broker: Arc<Broker>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        broker: Arc<Broker>,
    ) -> Self {
        Self {
            id,
            socket: Some(socket),
            peer_addr,
            config,
            broker,
        }
    }

    /// Run the connection to completion
    pub async fn run(&mut self) -> Result<()> {
        let socket = self
            .socket
            .take()
            .ok_or_else(|| Error::Io(std::io::ErrorKind::NotConnected.into()))?;

        let ws = tokio::time::timeout(
            self.config.handshake_timeout,
            tokio_tungstenite::accept_async(socket),
        )
        .await
        .map_err(|_| Error::HandshakeTimeout)??;

        tracing::debug!(connection = %self.id, peer = %self.peer_addr, "WebSocket established");

        let (transport, queue) = ChannelTransport::new(self.id, self.config.outbound_capacity);
        let transport: Arc<dyn Transport> = Arc::new(transport);

        let result = self.pump(ws, &transport, queue).await;

        transport.close();
        self.broker.close_connection(self.id).await;

        result
    }

    async fn pump(
        &self,
        ws: WebSocketStream<TcpStream>,
        transport: &Arc<dyn Transport>,
        mut queue: OutboundQueue,
    ) -> Result<()> {
        let (mut sink, mut stream) = ws.split();

        loop {
            tokio::select! {
                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let frame = Frame::Text(text.as_str().to_owned());
                        self.broker.process_message(transport, frame).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        self.broker.process_message(transport, Frame::Binary(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(connection = %self.id, "Peer closed connection");
                        return Ok(());
                    }
                    // Protocol-level ping/pong is answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
                outbound = queue.recv() => match outbound {
                    Outbound::Frame(Frame::Text(text)) => sink.send(Message::text(text)).await?,
                    Outbound::Frame(Frame::Binary(data)) => sink.send(Message::binary(data)).await?,
                    Outbound::Close => {
                        tracing::debug!(connection = %self.id, "Closing connection");
                        let _ = sink.send(Message::Close(None)).await;
                        return Ok(());
                    }
                },
            }
        }
    }
}
