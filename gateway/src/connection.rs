//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Connection lifecycle
//!
//! A [`Connection`] is driven by a single task from accept to close. It owns the
//! inbound and outbound buffers, a [`Protocol`] engine for its transport kind, and the
//! game-facing callbacks. The game layer talks to a running connection through a
//! cloneable [`ConnectionHandle`].
//!
//! ```text
//! Connecting -> Negotiating -> Ready -> Closing -> Closed
//! ```

mod telnet;
mod websocket;

pub use telnet::TelnetConnection;
pub use websocket::WebSocketConnection;

use crate::error::{NetworkError, Result};
use crate::manager::NetworkManager;
use crate::option::Side;
use bytes::{Buf, Bytes, BytesMut};
use futures_util::{Sink, SinkExt, StreamExt};
use muportal_common::telnet::consts::option;
use muportal_common::{ClientCapabilities, StructuredData};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::future::poll_fn;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, instrument, trace, warn};

/// Process-unique connection identifier
pub type ConnectionId = u32;

/// Upper bound on the final flush when a connection closes
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport type
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Raw telnet byte stream
    #[default]
    Telnet,
    /// WebSocket messages, one or more lines each
    WebSocket,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Telnet => write!(f, "telnet"),
            TransportKind::WebSocket => write!(f, "websocket"),
        }
    }
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport accepted, TLS or WebSocket handshake in progress
    Connecting,
    /// Telnet option negotiation in progress
    Negotiating,
    /// Ready for play
    Ready,
    /// Shutting down, final output being flushed
    Closing,
    /// Terminal state
    Closed,
}

/// Something a [`Protocol`] engine reports to its connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// One line of player input
    Command(String),
    /// An out-of-band payload for the game layer
    StructuredData(StructuredData),
    /// Client capabilities changed
    CapabilitiesChanged,
}

/// Requests sent from a [`ConnectionHandle`] to its connection task.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionCommand {
    /// Text; line endings are normalized for the transport
    Text(String),
    /// Application data sent as-is apart from escaping
    Data(Bytes),
    /// A subnegotiation payload for an enabled option
    Subnegotiate(u8, Bytes),
    /// Enable or disable an option after the handshake
    SetOption { code: u8, side: Side, enabled: bool },
    /// Close the connection after flushing pending output
    Disconnect,
}

/// The transport-specific half of a connection.
///
/// Implemented by [`TelnetConnection`] and [`WebSocketConnection`].
pub trait Protocol: Send + std::fmt::Debug {
    fn kind(&self) -> TransportKind;

    /// Queues whatever the protocol sends when the transport comes up.
    fn start(&mut self);

    /// Consumes as much of `inbox` as forms complete messages.
    fn receive(&mut self, inbox: &mut BytesMut);

    /// Consumes what is left of `inbox` once the peer stops sending.
    fn finish_input(&mut self, _inbox: &mut BytesMut) {}

    /// True once every handshake the protocol started has resolved.
    fn is_negotiated(&self) -> bool;

    /// Gives up on outstanding negotiations.
    fn force_ready(&mut self);

    fn send_text(&mut self, text: &str);

    fn send_data(&mut self, data: &[u8]);

    fn send_subnegotiation(&mut self, code: u8, payload: Bytes);

    fn set_option(&mut self, code: u8, side: Side, enabled: bool);

    /// Moves queued output into `outbox`.
    fn take_output(&mut self, outbox: &mut BytesMut);

    fn take_events(&mut self) -> Vec<ProtocolEvent>;

    fn capabilities(&self) -> &ClientCapabilities;
}

pub type DisconnectCallback = Box<dyn FnOnce(ConnectionId) + Send>;
pub type CommandCallback = Box<dyn FnMut(&ConnectionHandle, String) + Send>;
pub type ReadyCallback = Box<dyn FnOnce(&ConnectionHandle) + Send>;
pub type UpdateCallback = Box<dyn FnMut(&ConnectionHandle) + Send>;

/// Game-facing callbacks of one connection.
///
/// All callbacks of a connection run on that connection's task, so they never
/// overlap each other.
#[derive(Default)]
pub struct ConnectionCallbacks {
    /// Fires exactly once when the connection closes
    pub on_disconnect: Option<DisconnectCallback>,
    /// Fires for each line of input once the connection is ready
    pub on_command: Option<CommandCallback>,
    /// Fires exactly once when the connection becomes ready
    pub on_ready: Option<ReadyCallback>,
    /// Fires when client capabilities change after the connection is ready
    pub on_update: Option<UpdateCallback>,
    /// Fires when structured data is waiting in [`ConnectionHandle::take_structured_data`]
    pub on_structured_data: Option<UpdateCallback>,
}

impl ConnectionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_disconnect(mut self, callback: impl FnOnce(ConnectionId) + Send + 'static) -> Self {
        self.on_disconnect = Some(Box::new(callback));
        self
    }

    pub fn on_command(
        mut self,
        callback: impl FnMut(&ConnectionHandle, String) + Send + 'static,
    ) -> Self {
        self.on_command = Some(Box::new(callback));
        self
    }

    pub fn on_ready(mut self, callback: impl FnOnce(&ConnectionHandle) + Send + 'static) -> Self {
        self.on_ready = Some(Box::new(callback));
        self
    }

    pub fn on_update(mut self, callback: impl FnMut(&ConnectionHandle) + Send + 'static) -> Self {
        self.on_update = Some(Box::new(callback));
        self
    }

    pub fn on_structured_data(
        mut self,
        callback: impl FnMut(&ConnectionHandle) + Send + 'static,
    ) -> Self {
        self.on_structured_data = Some(Box::new(callback));
        self
    }
}

impl std::fmt::Debug for ConnectionCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCallbacks")
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_command", &self.on_command.is_some())
            .field("on_ready", &self.on_ready.is_some())
            .field("on_update", &self.on_update.is_some())
            .field("on_structured_data", &self.on_structured_data.is_some())
            .finish()
    }
}

/// Handle for talking to a running connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: SocketAddr,
    kind: TransportKind,
    tls: bool,
    sender: mpsc::UnboundedSender<ConnectionCommand>,
    state: watch::Receiver<ConnectionState>,
    capabilities: watch::Receiver<ClientCapabilities>,
    structured: Arc<Mutex<VecDeque<StructuredData>>>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Snapshot of what is currently known about the client.
    pub fn capabilities(&self) -> ClientCapabilities {
        self.capabilities.borrow().clone()
    }

    /// Sends text, converting `\n` to the transport's line ending.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(ConnectionCommand::Text(text.into()))
    }

    pub fn send_line(&self, text: impl Into<String>) -> Result<()> {
        let mut text = text.into();
        text.push('\n');
        self.send(ConnectionCommand::Text(text))
    }

    pub fn send_bytes(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send(ConnectionCommand::Data(data.into()))
    }

    pub fn send_subnegotiation(&self, code: u8, payload: impl Into<Bytes>) -> Result<()> {
        self.send(ConnectionCommand::Subnegotiate(code, payload.into()))
    }

    pub fn send_gmcp(&self, package: &str, data: Option<&serde_json::Value>) -> Result<()> {
        self.send_subnegotiation(option::GMCP, StructuredData::encode_gmcp(package, data))
    }

    pub fn set_option(&self, code: u8, side: Side, enabled: bool) -> Result<()> {
        self.send(ConnectionCommand::SetOption {
            code,
            side,
            enabled,
        })
    }

    pub fn disconnect(&self) -> Result<()> {
        self.send(ConnectionCommand::Disconnect)
    }

    /// Removes and returns all structured data received so far.
    pub fn take_structured_data(&self) -> Vec<StructuredData> {
        self.structured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    /// Waits until the connection has reached `target` or a later state.
    pub async fn wait_for(&self, target: ConnectionState) -> ConnectionState {
        let mut state = self.state.clone();
        let rank = |state: &ConnectionState| *state as u8;
        match state.wait_for(|current| rank(current) >= rank(&target)).await {
            Ok(current) => *current,
            Err(_) => ConnectionState::Closed,
        }
    }

    pub async fn closed(&self) {
        self.wait_for(ConnectionState::Closed).await;
    }

    fn send(&self, command: ConnectionCommand) -> Result<()> {
        self.sender
            .send(command)
            .map_err(|_| NetworkError::ConnectionClosed(self.id))
    }
}

/// The four transports a connection can run over.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    WebSocket(Box<WebSocketStream<TcpStream>>),
    SecureWebSocket(Box<WebSocketStream<TlsStream<TcpStream>>>),
}

impl Transport {
    /// Performs the TLS handshake and WebSocket upgrade required by `kind`.
    pub async fn establish(
        stream: TcpStream,
        kind: TransportKind,
        tls: Option<&TlsAcceptor>,
    ) -> Result<Self> {
        match (kind, tls) {
            (TransportKind::Telnet, None) => Ok(Transport::Plain(stream)),
            (TransportKind::Telnet, Some(acceptor)) => {
                let stream = acceptor.accept(stream).await?;
                Ok(Transport::Tls(Box::new(stream)))
            }
            (TransportKind::WebSocket, None) => {
                let socket = tokio_tungstenite::accept_async(stream).await?;
                Ok(Transport::WebSocket(Box::new(socket)))
            }
            (TransportKind::WebSocket, Some(acceptor)) => {
                let stream = acceptor.accept(stream).await?;
                let socket = tokio_tungstenite::accept_async(stream).await?;
                Ok(Transport::SecureWebSocket(Box::new(socket)))
            }
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Plain(_) | Transport::Tls(_) => TransportKind::Telnet,
            Transport::WebSocket(_) | Transport::SecureWebSocket(_) => TransportKind::WebSocket,
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Transport::Tls(_) | Transport::SecureWebSocket(_))
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("kind", &self.kind())
            .field("secure", &self.is_secure())
            .finish()
    }
}

/// A single client connection.
///
/// Created and registered by the [`NetworkManager`]; dropping it before it has
/// closed still unregisters it and fires `on_disconnect`.
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    state: ConnectionState,
    inbox: BytesMut,
    outbox: BytesMut,
    protocol: Box<dyn Protocol>,
    callbacks: ConnectionCallbacks,
    handle: ConnectionHandle,
    commands: mpsc::UnboundedReceiver<ConnectionCommand>,
    state_tx: watch::Sender<ConnectionState>,
    capabilities_tx: watch::Sender<ClientCapabilities>,
    early_input: VecDeque<String>,
    handshake_timeout: Duration,
    handshake_deadline: Option<Instant>,
    transport_timeout: Duration,
    max_output: usize,
    manager: Arc<NetworkManager>,
    finished: bool,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        peer: SocketAddr,
        kind: TransportKind,
        tls: bool,
        manager: Arc<NetworkManager>,
    ) -> Self {
        let config = manager.telnet_config();
        let protocol: Box<dyn Protocol> = match kind {
            TransportKind::Telnet => Box::new(TelnetConnection::new(config, tls)),
            TransportKind::WebSocket => Box::new(WebSocketConnection::new(tls)),
        };
        let handshake_timeout = config.handshake_timeout();
        let transport_timeout = config.transport_timeout();
        let max_output = config.max_output;

        let (sender, commands) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (capabilities_tx, capabilities_rx) = watch::channel(protocol.capabilities().clone());
        let handle = ConnectionHandle {
            id,
            peer,
            kind,
            tls,
            sender,
            state: state_rx,
            capabilities: capabilities_rx,
            structured: Arc::new(Mutex::new(VecDeque::new())),
        };

        Self {
            id,
            peer,
            state: ConnectionState::Connecting,
            inbox: BytesMut::with_capacity(4096),
            outbox: BytesMut::with_capacity(4096),
            protocol,
            callbacks: ConnectionCallbacks::default(),
            handle,
            commands,
            state_tx,
            capabilities_tx,
            early_input: VecDeque::new(),
            handshake_timeout,
            handshake_deadline: None,
            transport_timeout,
            max_output,
            manager,
            finished: false,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub(crate) fn set_callbacks(&mut self, callbacks: ConnectionCallbacks) {
        self.callbacks = callbacks;
    }

    /// Establishes the transport over an accepted TCP stream and serves it until it closes.
    #[instrument(name = "connection", skip_all, fields(id = self.id, peer = %self.peer))]
    pub async fn run(self, stream: TcpStream, tls: Option<TlsAcceptor>) {
        let kind = self.handle.kind;
        let establish = Transport::establish(stream, kind, tls.as_ref());
        match timeout(self.transport_timeout, establish).await {
            Ok(Ok(transport)) => self.serve(transport).await,
            Ok(Err(err)) => {
                warn!(%err, "Transport handshake failed");
                let mut connection = self;
                connection.finish();
            }
            Err(_) => {
                warn!(error = %NetworkError::TransportTimeout, "Transport handshake failed");
                let mut connection = self;
                connection.finish();
            }
        }
    }

    pub async fn serve(self, transport: Transport) {
        match transport {
            Transport::Plain(stream) => self.serve_stream(stream).await,
            Transport::Tls(stream) => self.serve_stream(*stream).await,
            Transport::WebSocket(socket) => self.serve_websocket(*socket).await,
            Transport::SecureWebSocket(socket) => self.serve_websocket(*socket).await,
        }
    }

    /// Serves a byte stream transport.
    pub async fn serve_stream<S>(mut self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        self.begin();

        while self.is_open() {
            let deadline = self.handshake_deadline;
            tokio::select! {
                read = reader.read_buf(&mut self.inbox) => match read {
                    Ok(0) => {
                        debug!("Peer closed the connection");
                        self.protocol.finish_input(&mut self.inbox);
                        self.process();
                        self.close();
                    }
                    Ok(_) => {
                        self.protocol.receive(&mut self.inbox);
                        self.process();
                    }
                    Err(err) => {
                        debug!(%err, "Read failed");
                        self.close();
                    }
                },
                written = writer.write(&self.outbox), if !self.outbox.is_empty() => match written {
                    Ok(0) => self.close(),
                    Ok(count) => self.outbox.advance(count),
                    Err(err) => {
                        debug!(%err, "Write failed");
                        self.close();
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => self.close(),
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.handshake_expired();
                }
            }
        }

        if !self.outbox.is_empty() {
            let _ = timeout(FLUSH_TIMEOUT, writer.write_all(&self.outbox)).await;
            self.outbox.clear();
        }
        let _ = timeout(FLUSH_TIMEOUT, writer.shutdown()).await;
        self.finish();
    }

    /// Serves a WebSocket transport.
    pub async fn serve_websocket<S>(mut self, socket: WebSocketStream<S>)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        let (mut sink, mut stream) = socket.split();
        let mut unflushed = false;
        self.begin();

        while self.is_open() {
            let deadline = self.handshake_deadline;
            let sending = unflushed || !self.outbox.is_empty();
            tokio::select! {
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => self.receive(text.as_bytes()),
                    Some(Ok(Message::Binary(data))) => self.receive(&data),
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Peer closed the connection");
                        self.close();
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(%err, "Read failed");
                        self.close();
                    }
                },
                sent = poll_fn(|cx| {
                    poll_send(&mut sink, &mut self.outbox, &mut unflushed, cx)
                }), if sending => {
                    if let Err(err) = sent {
                        debug!(%err, "Write failed");
                        self.close();
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => self.close(),
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.handshake_expired();
                }
            }
        }

        if !self.outbox.is_empty() || unflushed {
            let flush = poll_fn(|cx| poll_send(&mut sink, &mut self.outbox, &mut unflushed, cx));
            let _ = timeout(FLUSH_TIMEOUT, flush).await;
            self.outbox.clear();
        }
        let _ = timeout(FLUSH_TIMEOUT, sink.close()).await;
        self.finish();
    }

    fn receive(&mut self, data: &[u8]) {
        self.inbox.extend_from_slice(data);
        self.protocol.receive(&mut self.inbox);
        self.process();
    }

    fn is_open(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Negotiating | ConnectionState::Ready
        )
    }

    fn set_state(&mut self, state: ConnectionState) {
        trace!(from = ?self.state, to = ?state, "Connection state");
        self.state = state;
        self.state_tx.send_replace(state);
    }

    /// Transport is up: start negotiating and arm the handshake timer.
    fn begin(&mut self) {
        self.set_state(ConnectionState::Negotiating);
        self.handshake_deadline = Instant::now().checked_add(self.handshake_timeout);
        if self.handshake_deadline.is_none() {
            warn!(
                timeout = ?self.handshake_timeout,
                "Handshake timeout out of range, not forcing ready"
            );
        }
        self.protocol.start();
        self.process();
    }

    /// Routes everything the protocol produced since the last call.
    fn process(&mut self) {
        self.take_output();

        let mut capabilities_changed = false;
        let mut structured_data = false;
        for event in self.protocol.take_events() {
            match event {
                ProtocolEvent::Command(line) => {
                    if self.state == ConnectionState::Ready {
                        self.dispatch_command(line);
                    } else {
                        self.early_input.push_back(line);
                    }
                }
                ProtocolEvent::StructuredData(data) => {
                    self.handle
                        .structured
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push_back(data);
                    structured_data = true;
                }
                ProtocolEvent::CapabilitiesChanged => capabilities_changed = true,
            }
        }

        if capabilities_changed {
            self.capabilities_tx
                .send_replace(self.protocol.capabilities().clone());
        }
        if self.state == ConnectionState::Ready {
            if capabilities_changed {
                if let Some(callback) = self.callbacks.on_update.as_mut() {
                    callback(&self.handle);
                }
            }
            if structured_data {
                if let Some(callback) = self.callbacks.on_structured_data.as_mut() {
                    callback(&self.handle);
                }
            }
        } else if self.state == ConnectionState::Negotiating && self.protocol.is_negotiated() {
            self.become_ready();
        }
    }

    /// Moves protocol output to the outbox, closing a peer that has stopped reading.
    fn take_output(&mut self) {
        self.protocol.take_output(&mut self.outbox);
        if self.outbox.len() > self.max_output {
            let error = NetworkError::OutputOverflow {
                pending: self.outbox.len(),
                limit: self.max_output,
            };
            warn!(%error, "Peer is not reading, closing");
            self.outbox.clear();
            self.close();
        }
    }

    fn dispatch_command(&mut self, line: String) {
        match self.callbacks.on_command.as_mut() {
            Some(callback) => callback(&self.handle, line),
            None => trace!(%line, "No command callback"),
        }
    }

    fn become_ready(&mut self) {
        self.handshake_deadline = None;
        self.set_state(ConnectionState::Ready);
        info!(capabilities = ?self.protocol.capabilities(), "Connection ready");

        self.manager.promote(self.id);
        if let Some(callback) = self.callbacks.on_ready.take() {
            callback(&self.handle);
        }

        let has_structured = !self
            .handle
            .structured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty();
        if has_structured {
            if let Some(callback) = self.callbacks.on_structured_data.as_mut() {
                callback(&self.handle);
            }
        }
        while let Some(line) = self.early_input.pop_front() {
            if !self.is_open() {
                break;
            }
            self.dispatch_command(line);
        }
    }

    fn handshake_expired(&mut self) {
        self.handshake_deadline = None;
        if self.state != ConnectionState::Negotiating {
            return;
        }
        info!("Handshake timed out, forcing ready");
        self.protocol.force_ready();
        self.process();
    }

    fn apply(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Text(text) => self.protocol.send_text(&text),
            ConnectionCommand::Data(data) => self.protocol.send_data(&data),
            ConnectionCommand::Subnegotiate(code, payload) => {
                self.protocol.send_subnegotiation(code, payload)
            }
            ConnectionCommand::SetOption {
                code,
                side,
                enabled,
            } => self.protocol.set_option(code, side, enabled),
            ConnectionCommand::Disconnect => {
                debug!("Disconnect requested");
                self.close();
                self.take_output();
                return;
            }
        }
        self.process();
    }

    fn close(&mut self) {
        if self.is_open() {
            self.handshake_deadline = None;
            self.set_state(ConnectionState::Closing);
        }
    }

    /// Unregisters the connection and fires `on_disconnect`. Runs once.
    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.handshake_deadline = None;
        self.set_state(ConnectionState::Closed);
        self.manager.remove(self.id);
        if let Some(callback) = self.callbacks.on_disconnect.take() {
            callback(self.id);
        }
        info!(connection = self.id, peer = %self.peer, "Connection closed");
    }
}

/// Hands the outbox to the sink as one text message once it has room, then flushes.
///
/// Nothing is lost when the returned future is dropped: the outbox is only drained
/// once the sink has accepted the message, and `unflushed` carries over to the next call.
fn poll_send<S>(
    sink: &mut S,
    outbox: &mut BytesMut,
    unflushed: &mut bool,
    cx: &mut Context<'_>,
) -> Poll<std::result::Result<(), WsError>>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    if !outbox.is_empty() {
        ready!(sink.poll_ready_unpin(cx))?;
        let text = String::from_utf8_lossy(outbox).into_owned();
        outbox.clear();
        sink.start_send_unpin(Message::text(text))?;
        *unflushed = true;
    }
    ready!(sink.poll_flush_unpin(cx))?;
    *unflushed = false;
    Poll::Ready(Ok(()))
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.finish();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("protocol", &self.protocol)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
