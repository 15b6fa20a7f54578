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


//! Connection registry and listener ownership

use crate::config::{Configuration, TelnetConfig};
use crate::connection::{
    Connection, ConnectionCallbacks, ConnectionHandle, ConnectionId, TransportKind,
};
use crate::error::{NetworkError, Result};
use crate::listener::Listener;
use crate::tls::load_tls_acceptor;
use dashmap::DashMap;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// Fires when a connection becomes ready
pub type ConnectCallback = Arc<dyn Fn(ConnectionHandle) + Send + Sync>;

/// Builds the callbacks for each new connection
pub type CallbackFactory = Arc<dyn Fn(&ConnectionHandle) -> ConnectionCallbacks + Send + Sync>;

/// Where a connection sits in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Transport or option negotiation still running
    Pending,
    /// Handed to the game layer
    Ready,
}

#[derive(Debug)]
struct RegistryEntry {
    handle: ConnectionHandle,
    registration: Registration,
}

/// A listener to open on [`NetworkManager::start`], with its address and TLS
/// context referenced by name.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerBinding {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub kind: TransportKind,
    pub tls: Option<String>,
}

/// Owns the listeners and the registry of live connections.
pub struct NetworkManager {
    telnet: TelnetConfig,
    addresses: HashMap<String, IpAddr>,
    tls_contexts: HashMap<String, TlsAcceptor>,
    bindings: Vec<ListenerBinding>,
    listeners: DashMap<String, Arc<Listener>>,
    connections: DashMap<ConnectionId, RegistryEntry>,
    next_id: AtomicU32,
    on_connect: Option<ConnectCallback>,
    connection_callbacks: Option<CallbackFactory>,
}

impl NetworkManager {
    pub fn new(telnet: TelnetConfig) -> Self {
        Self {
            telnet,
            addresses: HashMap::new(),
            tls_contexts: HashMap::new(),
            bindings: Vec::new(),
            listeners: DashMap::new(),
            connections: DashMap::new(),
            next_id: AtomicU32::new(1),
            on_connect: None,
            connection_callbacks: None,
        }
    }

    /// Builds a manager from configuration, loading every TLS context up front.
    pub fn from_config(config: &Configuration) -> Result<Self> {
        let mut manager = Self::new(config.telnet.clone());
        for (name, address) in &config.addresses {
            manager.add_address(name.clone(), **address);
        }
        for (name, tls) in &config.tls {
            let acceptor = load_tls_acceptor(tls)?;
            debug!(context = %name, cert = tls.cert_path(), "Loaded TLS context");
            manager.add_tls_context(name.clone(), acceptor);
        }
        for (name, listener) in &config.listeners {
            manager.add_binding(ListenerBinding {
                name: name.clone(),
                address: listener.address.clone(),
                port: *listener.port,
                kind: listener.kind,
                tls: listener.tls.clone(),
            });
        }
        Ok(manager)
    }

    pub fn add_address(&mut self, name: impl Into<String>, address: IpAddr) {
        self.addresses.insert(name.into(), address);
    }

    pub fn add_tls_context(&mut self, name: impl Into<String>, acceptor: TlsAcceptor) {
        self.tls_contexts.insert(name.into(), acceptor);
    }

    pub fn add_binding(&mut self, binding: ListenerBinding) {
        self.bindings.push(binding);
    }

    pub fn set_on_connect(&mut self, callback: impl Fn(ConnectionHandle) + Send + Sync + 'static) {
        self.on_connect = Some(Arc::new(callback));
    }

    pub fn set_connection_callbacks(
        &mut self,
        factory: impl Fn(&ConnectionHandle) -> ConnectionCallbacks + Send + Sync + 'static,
    ) {
        self.connection_callbacks = Some(Arc::new(factory));
    }

    pub fn telnet_config(&self) -> &TelnetConfig {
        &self.telnet
    }

    /// Opens every configured listener.
    ///
    /// Names are resolved before anything is bound, so a bad reference leaves no
    /// listener running.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut resolved = Vec::with_capacity(self.bindings.len());
        for binding in &self.bindings {
            if self.listeners.contains_key(&binding.name)
                || resolved
                    .iter()
                    .any(|listener: &Listener| listener.name() == binding.name)
            {
                return Err(NetworkError::DuplicateListener(binding.name.clone()));
            }
            let address = *self
                .addresses
                .get(&binding.address)
                .ok_or_else(|| NetworkError::UnknownAddress(binding.address.clone()))?;
            let tls = match &binding.tls {
                Some(name) => Some(
                    self.tls_contexts
                        .get(name)
                        .cloned()
                        .ok_or_else(|| NetworkError::UnknownTlsContext(name.clone()))?,
                ),
                None => None,
            };
            resolved.push(Listener::new(
                binding.name.clone(),
                binding.kind,
                address,
                binding.port,
                tls,
            ));
        }

        for listener in resolved {
            let listener = Arc::new(listener);
            listener.listen(Arc::clone(self)).await?;
            self.listeners
                .insert(listener.name().to_string(), listener);
        }
        info!(listeners = self.listeners.len(), "Network manager started");
        Ok(())
    }

    pub fn listener(&self, name: &str) -> Option<Arc<Listener>> {
        self.listeners.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn next_id(&self) -> Result<ConnectionId> {
        self.next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
            .map_err(|_| NetworkError::IdsExhausted)
    }

    /// Allocates an id and registers a new pending connection.
    ///
    /// The caller drives the returned connection with one of its `serve` methods.
    pub fn open_connection(
        self: &Arc<Self>,
        peer: SocketAddr,
        kind: TransportKind,
        tls: bool,
    ) -> Result<Connection> {
        let id = self.next_id()?;
        let mut connection = Connection::new(id, peer, kind, tls, Arc::clone(self));
        if let Some(factory) = &self.connection_callbacks {
            connection.set_callbacks(factory(connection.handle()));
        }
        self.connections.insert(
            id,
            RegistryEntry {
                handle: connection.handle().clone(),
                registration: Registration::Pending,
            },
        );
        debug!(id, %peer, %kind, tls, "Connection registered");
        Ok(connection)
    }

    /// Registers an accepted stream and spawns its connection task.
    pub fn accept(
        self: &Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
        kind: TransportKind,
        tls: Option<TlsAcceptor>,
    ) -> Result<ConnectionId> {
        let connection = self.open_connection(peer, kind, tls.is_some())?;
        let id = connection.id();
        tokio::spawn(connection.run(stream, tls));
        Ok(id)
    }

    /// Moves a connection from pending to ready and fires the connect callback.
    /// Returns false if it was not pending.
    pub(crate) fn promote(&self, id: ConnectionId) -> bool {
        let handle = match self.connections.get_mut(&id) {
            Some(mut entry) if entry.registration == Registration::Pending => {
                entry.registration = Registration::Ready;
                entry.handle.clone()
            }
            _ => return false,
        };
        if let Some(callback) = &self.on_connect {
            callback(handle);
        }
        true
    }

    pub(crate) fn remove(&self, id: ConnectionId) -> bool {
        self.connections.remove(&id).is_some()
    }

    pub fn get(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.get(&id).map(|entry| entry.handle.clone())
    }

    pub fn registration(&self, id: ConnectionId) -> Option<Registration> {
        self.connections.get(&id).map(|entry| entry.registration)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn pending_count(&self) -> usize {
        self.count(|entry| entry.registration == Registration::Pending)
    }

    pub fn ready_count(&self) -> usize {
        self.count(|entry| entry.registration == Registration::Ready)
    }

    pub fn count_by_kind(&self, kind: TransportKind) -> usize {
        self.count(|entry| entry.handle.kind() == kind)
    }

    fn count(&self, predicate: impl Fn(&RegistryEntry) -> bool) -> usize {
        self.connections
            .iter()
            .filter(|entry| predicate(entry.value()))
            .count()
    }

    /// Handles of every ready connection.
    pub fn ready_connections(&self) -> Vec<ConnectionHandle> {
        self.connections
            .iter()
            .filter(|entry| entry.registration == Registration::Ready)
            .map(|entry| entry.handle.clone())
            .collect()
    }

    /// Sends a line to every ready connection, returning how many accepted it.
    pub fn broadcast(&self, line: &str) -> usize {
        self.ready_connections()
            .into_iter()
            .filter(|handle| handle.send_line(line).is_ok())
            .count()
    }

    /// Closes every listener and asks every connection to disconnect.
    pub fn shutdown(&self) {
        for listener in self.listeners.iter() {
            listener.close();
        }
        let handles: Vec<ConnectionHandle> = self
            .connections
            .iter()
            .map(|entry| entry.handle.clone())
            .collect();
        for handle in &handles {
            if let Err(err) = handle.disconnect() {
                warn!(id = handle.id(), %err, "Unable to disconnect");
            }
        }
        info!(connections = handles.len(), "Network manager shut down");
    }
}

impl std::fmt::Debug for NetworkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkManager")
            .field("listeners", &self.listeners.len())
            .field("connections", &self.connections.len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;

    fn peer() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_ids_are_distinct() {
        let manager = Arc::new(NetworkManager::new(TelnetConfig::default()));
        let first = manager.open_connection(peer(), TransportKind::Telnet, false).unwrap();
        let second = manager.open_connection(peer(), TransportKind::WebSocket, true).unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(manager.pending_count(), 2);
        assert_eq!(manager.ready_count(), 0);
        assert_eq!(manager.count_by_kind(TransportKind::WebSocket), 1);
        assert_eq!(first.handle().state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn test_ids_exhausted() {
        let manager = Arc::new(NetworkManager::new(TelnetConfig::default()));
        manager.next_id.store(u32::MAX, Ordering::SeqCst);
        let result = manager.open_connection(peer(), TransportKind::Telnet, false);
        assert!(matches!(result, Err(NetworkError::IdsExhausted)));
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_promote_and_remove() {
        let connected = Arc::new(AtomicU32::new(0));
        let mut manager = NetworkManager::new(TelnetConfig::default());
        let counter = Arc::clone(&connected);
        manager.set_on_connect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let manager = Arc::new(manager);

        let connection = manager.open_connection(peer(), TransportKind::Telnet, false).unwrap();
        let id = connection.id();
        assert_eq!(manager.registration(id), Some(Registration::Pending));

        assert!(manager.promote(id));
        assert!(!manager.promote(id));
        assert_eq!(manager.registration(id), Some(Registration::Ready));
        assert_eq!(connected.load(Ordering::SeqCst), 1);

        drop(connection);
        assert!(manager.get(id).is_none());
        assert!(!manager.remove(id));
    }

    #[tokio::test]
    async fn test_dropped_connection_fires_disconnect() {
        let disconnected = Arc::new(AtomicU32::new(0));
        let mut manager = NetworkManager::new(TelnetConfig::default());
        let counter = Arc::clone(&disconnected);
        manager.set_connection_callbacks(move |_| {
            let counter = Arc::clone(&counter);
            ConnectionCallbacks::new().on_disconnect(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });
        let manager = Arc::new(manager);

        let connection = manager.open_connection(peer(), TransportKind::Telnet, false).unwrap();
        let handle = connection.handle().clone();
        drop(connection);
        assert_eq!(disconnected.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), ConnectionState::Closed);
        assert!(handle.send_line("anyone there?").is_err());
    }

    #[tokio::test]
    async fn test_start_rejects_unknown_names() {
        let mut manager = NetworkManager::new(TelnetConfig::default());
        manager.add_binding(ListenerBinding {
            name: "telnet".to_string(),
            address: "nowhere".to_string(),
            port: 0,
            kind: TransportKind::Telnet,
            tls: None,
        });
        let manager = Arc::new(manager);
        let result = manager.start().await;
        assert!(matches!(result, Err(NetworkError::UnknownAddress(name)) if name == "nowhere"));

        let mut manager = NetworkManager::new(TelnetConfig::default());
        manager.add_address("local", IpAddr::from([127, 0, 0, 1]));
        manager.add_binding(ListenerBinding {
            name: "telnets".to_string(),
            address: "local".to_string(),
            port: 0,
            kind: TransportKind::Telnet,
            tls: Some("missing".to_string()),
        });
        let manager = Arc::new(manager);
        let result = manager.start().await;
        assert!(matches!(result, Err(NetworkError::UnknownTlsContext(name)) if name == "missing"));
        assert!(manager.listener("telnets").is_none());
    }

    #[tokio::test]
    async fn test_start_rejects_duplicate_listener() {
        let mut manager = NetworkManager::new(TelnetConfig::default());
        manager.add_address("local", IpAddr::from([127, 0, 0, 1]));
        for _ in 0..2 {
            manager.add_binding(ListenerBinding {
                name: "telnet".to_string(),
                address: "local".to_string(),
                port: 0,
                kind: TransportKind::Telnet,
                tls: None,
            });
        }
        let manager = Arc::new(manager);
        let result = manager.start().await;
        assert!(matches!(result, Err(NetworkError::DuplicateListener(name)) if name == "telnet"));
    }
}
