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


use crate::connection::TransportKind;
use crate::error::Result;
use crate::manager::NetworkManager;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Whether a listener is taking new connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Running,
    Stopped,
    Closed,
}

/// One bound port accepting connections of a single transport kind.
pub struct Listener {
    name: String,
    kind: TransportKind,
    address: IpAddr,
    port: u16,
    tls: Option<TlsAcceptor>,
    state: watch::Sender<ListenerState>,
    local_addr: OnceLock<SocketAddr>,
}

impl Listener {
    pub fn new(
        name: impl Into<String>,
        kind: TransportKind,
        address: IpAddr,
        port: u16,
        tls: Option<TlsAcceptor>,
    ) -> Self {
        let (state, _) = watch::channel(ListenerState::Stopped);
        Self {
            name: name.into(),
            kind,
            address,
            port,
            tls,
            state,
            local_addr: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn is_secure(&self) -> bool {
        self.tls.is_some()
    }

    /// Bound address, known once [`Listener::listen`] has succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ListenerState::Running
    }

    /// Resumes accepting. Has no effect on a closed listener.
    pub fn start(&self) {
        self.transition(ListenerState::Running);
    }

    /// Pauses accepting; new clients wait in the socket backlog.
    pub fn stop(&self) {
        self.transition(ListenerState::Stopped);
    }

    /// Stops the accept loop for good and releases the port.
    pub fn close(&self) {
        self.transition(ListenerState::Closed);
    }

    fn transition(&self, next: ListenerState) {
        self.state.send_if_modified(|state| {
            if *state == ListenerState::Closed || *state == next {
                return false;
            }
            debug!(listener = %self.name, from = ?state, to = ?next, "Listener state");
            *state = next;
            true
        });
    }

    /// Binds the port and spawns the accept loop, handing every accepted
    /// stream to `manager`.
    pub async fn listen(self: &Arc<Self>, manager: Arc<NetworkManager>) -> Result<SocketAddr> {
        let listener = TcpListener::bind((self.address, self.port)).await?;
        let local_addr = listener.local_addr()?;
        let _ = self.local_addr.set(local_addr);
        info!(
            listener = %self.name,
            %local_addr,
            kind = %self.kind,
            tls = self.is_secure(),
            "Listening"
        );

        self.start();
        let this = Arc::clone(self);
        tokio::spawn(async move { this.accept_loop(listener, manager).await });
        Ok(local_addr)
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener, manager: Arc<NetworkManager>) {
        let mut state = self.state.subscribe();
        loop {
            let current = *state.borrow_and_update();
            match current {
                ListenerState::Closed => break,
                ListenerState::Stopped => {
                    if state.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                ListenerState::Running => {}
            }

            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(err) = stream.set_nodelay(true) {
                            debug!(%peer, %err, "Unable to set TCP_NODELAY");
                        }
                        match manager.accept(stream, peer, self.kind, self.tls.clone()) {
                            Ok(id) => debug!(listener = %self.name, id, %peer, "Accepted connection"),
                            Err(err) => warn!(listener = %self.name, %peer, %err, "Rejected connection"),
                        }
                    }
                    Err(err) => {
                        error!(listener = %self.name, %err, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!(listener = %self.name, "Listener closed");
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("tls", &self.is_secure())
            .field("state", &self.state())
            .finish()
    }
}
