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


use crate::config::TelnetConfig;
use crate::connection::{Protocol, ProtocolEvent, TransportKind};
use crate::handshake::Handshakes;
use crate::option::{OptionContext, OptionHandler, OptionNegotiator, Side, default_options};
use bytes::{Bytes, BytesMut};
use muportal_common::telnet::consts;
use muportal_common::{ClientCapabilities, TelnetCodec, TelnetCommand, TelnetMessage};
use std::collections::BTreeMap;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace, warn};

/// Reply to IAC AYT
const ARE_YOU_THERE_REPLY: &[u8] = b"[Yes]\r\n";

/// Telnet protocol engine: framing plus per-option negotiation.
#[derive(Debug)]
pub struct TelnetConnection {
    codec: TelnetCodec,
    options: BTreeMap<u8, OptionNegotiator>,
    handshakes: Handshakes,
    capabilities: ClientCapabilities,
    output: Vec<TelnetMessage>,
    events: Vec<ProtocolEvent>,
}

impl TelnetConnection {
    pub fn new(config: &TelnetConfig, tls: bool) -> Self {
        Self::with_options(default_options(config), config.max_line_length, tls)
    }

    pub fn with_options(
        handlers: Vec<Box<dyn OptionHandler>>,
        max_line_length: usize,
        tls: bool,
    ) -> Self {
        let options = handlers
            .into_iter()
            .map(|handler| (handler.code(), OptionNegotiator::new(handler)))
            .collect();
        let capabilities = ClientCapabilities {
            tls,
            ..ClientCapabilities::default()
        };
        Self {
            codec: TelnetCodec::with_max_length(max_line_length),
            options,
            handshakes: Handshakes::default(),
            capabilities,
            output: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn option(&self, code: u8) -> Option<&OptionNegotiator> {
        self.options.get(&code)
    }

    pub fn handshakes(&self) -> &Handshakes {
        &self.handshakes
    }

    fn split(&mut self) -> (&mut BTreeMap<u8, OptionNegotiator>, OptionContext<'_>) {
        let ctx = OptionContext::new(
            &mut self.output,
            &mut self.handshakes,
            &mut self.capabilities,
            &mut self.events,
        );
        (&mut self.options, ctx)
    }

    fn handle_message(&mut self, message: TelnetMessage) {
        match message {
            TelnetMessage::AppData(line) => {
                let line = String::from_utf8_lossy(&line).into_owned();
                self.events.push(ProtocolEvent::Command(line));
            }
            TelnetMessage::Command(consts::AYT) => {
                self.output
                    .push(TelnetMessage::AppData(Bytes::from_static(ARE_YOU_THERE_REPLY)));
            }
            TelnetMessage::Command(command) => trace!(command, "Ignoring telnet command"),
            TelnetMessage::Negotiation(command, code) => {
                let (options, mut ctx) = self.split();
                match options.get_mut(&code) {
                    Some(negotiator) => negotiator.receive_negotiate(command, &mut ctx),
                    None => match command {
                        TelnetCommand::WILL => ctx.send_negotiate(TelnetCommand::DONT, code),
                        TelnetCommand::DO => ctx.send_negotiate(TelnetCommand::WONT, code),
                        _ => trace!(code, ?command, "Refusal for an unregistered option"),
                    },
                }
            }
            TelnetMessage::Subnegotiation(code, payload) => {
                let (options, mut ctx) = self.split();
                match options.get_mut(&code) {
                    Some(negotiator) => negotiator.receive_subnegotiate(&payload, &mut ctx),
                    None => debug!(code, "Subnegotiation for an unregistered option"),
                }
            }
        }
    }
}

impl Protocol for TelnetConnection {
    fn kind(&self) -> TransportKind {
        TransportKind::Telnet
    }

    fn start(&mut self) {
        let (options, mut ctx) = self.split();
        for negotiator in options.values_mut() {
            negotiator.start(&mut ctx);
        }
    }

    fn receive(&mut self, inbox: &mut BytesMut) {
        loop {
            match self.codec.decode(inbox) {
                Ok(Some(message)) => self.handle_message(message),
                Ok(None) => break,
                Err(err) => {
                    warn!(%err, "Discarding undecodable input");
                    inbox.clear();
                    break;
                }
            }
        }
    }

    fn finish_input(&mut self, inbox: &mut BytesMut) {
        self.receive(inbox);
        while let Ok(Some(message)) = self.codec.decode_eof(inbox) {
            self.handle_message(message);
        }
    }

    fn is_negotiated(&self) -> bool {
        self.handshakes.is_complete()
    }

    fn force_ready(&mut self) {
        let unanswered = self.handshakes.pending();
        let abandoned: Vec<u8> = self
            .options
            .values_mut()
            .filter_map(|negotiator| negotiator.force_disable().then(|| negotiator.code()))
            .collect();
        if !unanswered.is_empty() || !abandoned.is_empty() {
            debug!(?unanswered, ?abandoned, "Abandoning unanswered options");
        }
        self.handshakes.clear();
    }

    fn send_text(&mut self, text: &str) {
        let mut data = Vec::with_capacity(text.len() + 8);
        let mut previous = 0u8;
        for &byte in text.as_bytes() {
            if byte == consts::LF && previous != consts::CR {
                data.push(consts::CR);
            }
            data.push(byte);
            previous = byte;
        }
        self.output.push(TelnetMessage::AppData(data.into()));
    }

    fn send_data(&mut self, data: &[u8]) {
        self.output
            .push(TelnetMessage::AppData(Bytes::copy_from_slice(data)));
    }

    fn send_subnegotiation(&mut self, code: u8, payload: Bytes) {
        match self.options.get(&code) {
            Some(negotiator) if negotiator.local().enabled || negotiator.remote().enabled => {
                self.output
                    .push(TelnetMessage::Subnegotiation(code, payload));
            }
            _ => debug!(code, "Dropping subnegotiation for an option that is not enabled"),
        }
    }

    fn set_option(&mut self, code: u8, side: Side, enabled: bool) {
        let (options, mut ctx) = self.split();
        let Some(negotiator) = options.get_mut(&code) else {
            warn!(code, "Cannot change an unregistered option");
            return;
        };
        let sent = if enabled {
            negotiator.request_enable(side, &mut ctx)
        } else {
            negotiator.request_disable(side, &mut ctx)
        };
        if !sent {
            debug!(code, ?side, enabled, "Option already in the requested state");
        }
    }

    fn take_output(&mut self, outbox: &mut BytesMut) {
        for message in self.output.drain(..) {
            if let Err(err) = self.codec.encode(message, outbox) {
                warn!(%err, "Failed to encode telnet message");
            }
        }
    }

    fn take_events(&mut self) -> Vec<ProtocolEvent> {
        std::mem::take(&mut self.events)
    }

    fn capabilities(&self) -> &ClientCapabilities {
        &self.capabilities
    }
}
