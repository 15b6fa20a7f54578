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


use crate::connection::{Protocol, ProtocolEvent, TransportKind};
use crate::option::Side;
use bytes::{Bytes, BytesMut};
use muportal_common::ClientCapabilities;
use tracing::{debug, trace};

/// WebSocket protocol engine. Each message carries one or more lines and there is
/// nothing to negotiate.
#[derive(Debug)]
pub struct WebSocketConnection {
    capabilities: ClientCapabilities,
    output: BytesMut,
    events: Vec<ProtocolEvent>,
}

impl WebSocketConnection {
    pub fn new(tls: bool) -> Self {
        Self {
            capabilities: ClientCapabilities::websocket(tls),
            output: BytesMut::new(),
            events: Vec::new(),
        }
    }
}

impl Protocol for WebSocketConnection {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn start(&mut self) {}

    fn receive(&mut self, inbox: &mut BytesMut) {
        let message = inbox.split();
        let text = String::from_utf8_lossy(&message);
        let text = text.strip_suffix('\n').unwrap_or(&text);
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            self.events.push(ProtocolEvent::Command(line.to_string()));
        }
    }

    fn is_negotiated(&self) -> bool {
        true
    }

    fn force_ready(&mut self) {}

    fn send_text(&mut self, text: &str) {
        self.output.extend_from_slice(text.as_bytes());
    }

    fn send_data(&mut self, data: &[u8]) {
        self.output.extend_from_slice(data);
    }

    fn send_subnegotiation(&mut self, code: u8, _payload: Bytes) {
        trace!(code, "No subnegotiation over WebSocket");
    }

    fn set_option(&mut self, code: u8, side: Side, enabled: bool) {
        debug!(code, ?side, enabled, "No telnet options over WebSocket");
    }

    fn take_output(&mut self, outbox: &mut BytesMut) {
        outbox.extend_from_slice(&self.output);
        self.output.clear();
    }

    fn take_events(&mut self) -> Vec<ProtocolEvent> {
        std::mem::take(&mut self.events)
    }

    fn capabilities(&self) -> &ClientCapabilities {
        &self.capabilities
    }
}
