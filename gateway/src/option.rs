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


//! Telnet option negotiation
//!
//! Every option the server understands is an [`OptionNegotiator`] wrapping an
//! [`OptionHandler`]. The negotiator owns the two [`OptionPerspective`]s of its option
//! code and runs the WILL/WONT/DO/DONT state machine; the handler supplies the policy
//! (which side may enable the option, whether the server proposes it) and the hooks
//! that run when the option turns on or off or receives a subnegotiation.

mod generic;
mod mssp;
mod mxp;
mod naws;
mod structured;
mod ttype;

pub use generic::GenericOption;
pub use mssp::MsspOption;
pub use mxp::MxpOption;
pub use naws::NawsOption;
pub use structured::{GmcpOption, MsdpOption};
pub use ttype::TerminalTypeOption;

use crate::config::TelnetConfig;
use crate::connection::ProtocolEvent;
use crate::handshake::{HandshakeTracker, Handshakes};
use bytes::Bytes;
use muportal_common::telnet::consts::option;
use muportal_common::{ClientCapabilities, MudServerStatus, TelnetCommand, TelnetMessage};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Which end of the connection an option applies to.
///
/// `Local` options are performed by the server (we send WILL/WONT, the client answers
/// DO/DONT); `Remote` options are performed by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Local,
    Remote,
}

impl Side {
    /// The command we send to propose or accept the option on this side.
    pub fn affirmative(self) -> TelnetCommand {
        match self {
            Side::Local => TelnetCommand::WILL,
            Side::Remote => TelnetCommand::DO,
        }
    }

    /// The command we send to refuse or switch off the option on this side.
    pub fn negative(self) -> TelnetCommand {
        match self {
            Side::Local => TelnetCommand::WONT,
            Side::Remote => TelnetCommand::DONT,
        }
    }
}

/// One direction of one option.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OptionPerspective {
    pub enabled: bool,
    pub negotiating: bool,
    pub answered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionState {
    Disabled,
    Negotiating,
    Enabled,
}

impl OptionPerspective {
    pub fn state(&self) -> OptionState {
        if self.negotiating {
            OptionState::Negotiating
        } else if self.enabled {
            OptionState::Enabled
        } else {
            OptionState::Disabled
        }
    }
}

/// Connection state an option hook may act on.
pub struct OptionContext<'a> {
    pub(crate) output: &'a mut Vec<TelnetMessage>,
    pub(crate) handshakes: &'a mut Handshakes,
    pub(crate) capabilities: &'a mut ClientCapabilities,
    pub(crate) events: &'a mut Vec<ProtocolEvent>,
}

impl<'a> OptionContext<'a> {
    pub fn new(
        output: &'a mut Vec<TelnetMessage>,
        handshakes: &'a mut Handshakes,
        capabilities: &'a mut ClientCapabilities,
        events: &'a mut Vec<ProtocolEvent>,
    ) -> Self {
        Self {
            output,
            handshakes,
            capabilities,
            events,
        }
    }

    pub fn send_negotiate(&mut self, command: TelnetCommand, code: u8) {
        trace!(?command, code, "Sending negotiation");
        self.output.push(TelnetMessage::Negotiation(command, code));
    }

    pub fn send_subnegotiate(&mut self, code: u8, payload: impl Into<Bytes>) {
        self.output
            .push(TelnetMessage::Subnegotiation(code, payload.into()));
    }

    pub fn handshakes(&mut self) -> &mut Handshakes {
        &mut *self.handshakes
    }

    pub fn capabilities(&mut self) -> &mut ClientCapabilities {
        &mut *self.capabilities
    }

    pub fn emit(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    pub fn capabilities_changed(&mut self) {
        if !self.events.contains(&ProtocolEvent::CapabilitiesChanged) {
            self.events.push(ProtocolEvent::CapabilitiesChanged);
        }
    }

    fn tracker(&mut self, side: Side) -> &mut HandshakeTracker {
        match side {
            Side::Local => &mut self.handshakes.local,
            Side::Remote => &mut self.handshakes.remote,
        }
    }
}

/// Policy and hooks for a single telnet option.
pub trait OptionHandler: Send + std::fmt::Debug {
    fn code(&self) -> u8;

    /// Propose the option for our side when the connection starts
    fn start_will(&self) -> bool {
        false
    }

    /// Ask the client to enable the option when the connection starts
    fn start_do(&self) -> bool {
        false
    }

    /// Whether the server is willing to perform the option
    fn support_local(&self) -> bool {
        false
    }

    /// Whether the server accepts the client performing the option
    fn support_remote(&self) -> bool {
        false
    }

    fn on_connect(&mut self, _ctx: &mut OptionContext<'_>) {}

    fn enable_local(&mut self, _ctx: &mut OptionContext<'_>) {}

    fn disable_local(&mut self, _ctx: &mut OptionContext<'_>) {}

    fn enable_remote(&mut self, _ctx: &mut OptionContext<'_>) {}

    fn disable_remote(&mut self, _ctx: &mut OptionContext<'_>) {}

    fn subnegotiate(&mut self, payload: &[u8], _ctx: &mut OptionContext<'_>) {
        trace!(
            code = self.code(),
            length = payload.len(),
            "Ignoring subnegotiation"
        );
    }
}

/// Negotiation state for one option code.
#[derive(Debug)]
pub struct OptionNegotiator {
    local: OptionPerspective,
    remote: OptionPerspective,
    handler: Box<dyn OptionHandler>,
}

impl OptionNegotiator {
    pub fn new(handler: Box<dyn OptionHandler>) -> Self {
        Self {
            local: OptionPerspective::default(),
            remote: OptionPerspective::default(),
            handler,
        }
    }

    pub fn code(&self) -> u8 {
        self.handler.code()
    }

    pub fn local(&self) -> OptionPerspective {
        self.local
    }

    pub fn remote(&self) -> OptionPerspective {
        self.remote
    }

    pub fn perspective(&self, side: Side) -> OptionPerspective {
        match side {
            Side::Local => self.local,
            Side::Remote => self.remote,
        }
    }

    fn perspective_mut(&mut self, side: Side) -> &mut OptionPerspective {
        match side {
            Side::Local => &mut self.local,
            Side::Remote => &mut self.remote,
        }
    }

    pub fn supports(&self, side: Side) -> bool {
        match side {
            Side::Local => self.handler.support_local(),
            Side::Remote => self.handler.support_remote(),
        }
    }

    /// Sends the initial proposals this option's policy asks for.
    pub fn start(&mut self, ctx: &mut OptionContext<'_>) {
        self.handler.on_connect(ctx);
        if self.handler.start_will() {
            self.request_enable(Side::Local, ctx);
        }
        if self.handler.start_do() {
            self.request_enable(Side::Remote, ctx);
        }
    }

    /// Proposes enabling the option on `side`. Returns false if nothing was sent.
    pub fn request_enable(&mut self, side: Side, ctx: &mut OptionContext<'_>) -> bool {
        if !self.supports(side) {
            return false;
        }
        let code = self.code();
        let perspective = self.perspective_mut(side);
        if perspective.enabled || perspective.negotiating {
            return false;
        }
        perspective.negotiating = true;
        perspective.answered = false;
        ctx.send_negotiate(side.affirmative(), code);
        ctx.tracker(side).register(code);
        true
    }

    /// Switches the option off on `side`. The client must acknowledge, and the
    /// acknowledgement arrives as a refusal for an already disabled option.
    pub fn request_disable(&mut self, side: Side, ctx: &mut OptionContext<'_>) -> bool {
        let code = self.code();
        let perspective = self.perspective_mut(side);
        if !perspective.enabled {
            return false;
        }
        perspective.enabled = false;
        ctx.send_negotiate(side.negative(), code);
        self.disabled(side, ctx);
        true
    }

    /// Handles WILL, WONT, DO or DONT received for this option.
    pub fn receive_negotiate(&mut self, command: TelnetCommand, ctx: &mut OptionContext<'_>) {
        match command {
            TelnetCommand::WILL => self.receive_offer(Side::Remote, ctx),
            TelnetCommand::DO => self.receive_offer(Side::Local, ctx),
            TelnetCommand::WONT => self.receive_refusal(Side::Remote, ctx),
            TelnetCommand::DONT => self.receive_refusal(Side::Local, ctx),
            other => debug!(code = self.code(), ?other, "Not a negotiation command"),
        }
    }

    fn receive_offer(&mut self, side: Side, ctx: &mut OptionContext<'_>) {
        let code = self.code();
        let supported = self.supports(side);
        let perspective = self.perspective_mut(side);
        perspective.answered = true;
        if perspective.negotiating {
            perspective.negotiating = false;
            perspective.enabled = true;
            ctx.tracker(side).resolve(code);
            self.enabled(side, ctx);
        } else if perspective.enabled {
            trace!(code, ?side, "Option already enabled");
        } else if supported {
            perspective.enabled = true;
            ctx.send_negotiate(side.affirmative(), code);
            self.enabled(side, ctx);
        } else {
            ctx.send_negotiate(side.negative(), code);
        }
    }

    fn receive_refusal(&mut self, side: Side, ctx: &mut OptionContext<'_>) {
        let code = self.code();
        let perspective = self.perspective_mut(side);
        if perspective.negotiating {
            perspective.negotiating = false;
            perspective.answered = true;
            perspective.enabled = false;
            ctx.tracker(side).resolve(code);
            self.disabled(side, ctx);
        } else if perspective.enabled {
            perspective.enabled = false;
            perspective.answered = true;
            ctx.send_negotiate(side.negative(), code);
            self.disabled(side, ctx);
        } else {
            debug!(code, ?side, "Refusal for an option that is not enabled");
        }
    }

    /// Hands a subnegotiation payload to the option's handler.
    pub fn receive_subnegotiate(&mut self, payload: &[u8], ctx: &mut OptionContext<'_>) {
        if !self.local.enabled && !self.remote.enabled {
            debug!(code = self.code(), "Subnegotiation for an option that is not enabled");
        }
        self.handler.subnegotiate(payload, ctx);
    }

    /// Abandons any outstanding proposal, leaving that side disabled.
    pub fn force_disable(&mut self) -> bool {
        let mut changed = false;
        for perspective in [&mut self.local, &mut self.remote] {
            if perspective.negotiating {
                perspective.negotiating = false;
                perspective.enabled = false;
                changed = true;
            }
        }
        changed
    }

    fn enabled(&mut self, side: Side, ctx: &mut OptionContext<'_>) {
        debug!(code = self.code(), ?side, "Option enabled");
        ctx.capabilities.set_option(self.code(), true);
        match side {
            Side::Local => self.handler.enable_local(ctx),
            Side::Remote => self.handler.enable_remote(ctx),
        }
        ctx.capabilities_changed();
    }

    fn disabled(&mut self, side: Side, ctx: &mut OptionContext<'_>) {
        debug!(code = self.code(), ?side, "Option disabled");
        let still_enabled = self.local.enabled || self.remote.enabled;
        ctx.capabilities.set_option(self.code(), still_enabled);
        match side {
            Side::Local => self.handler.disable_local(ctx),
            Side::Remote => self.handler.disable_remote(ctx),
        }
        ctx.capabilities_changed();
    }
}

/// Builds the option handlers enabled in `config`.
pub fn default_options(config: &TelnetConfig) -> Vec<Box<dyn OptionHandler>> {
    let enabled = &config.options;
    let mut options: Vec<Box<dyn OptionHandler>> = Vec::new();
    if enabled.sga {
        options.push(Box::new(GenericOption::proposed_local(option::SGA)));
    }
    if enabled.eor {
        options.push(Box::new(GenericOption::proposed_local(option::TELOPT_EOR)));
    }
    if enabled.naws {
        options.push(Box::new(NawsOption::new()));
    }
    if enabled.ttype {
        options.push(Box::new(TerminalTypeOption::new()));
    }
    if enabled.linemode {
        options.push(Box::new(GenericOption::accepted_remote(option::LINEMODE)));
    }
    if enabled.mnes {
        options.push(Box::new(GenericOption::accepted_remote(option::MNES)));
    }
    if enabled.mxp {
        options.push(Box::new(MxpOption::new()));
    }
    if enabled.mssp {
        options.push(Box::new(MsspOption::new(MudServerStatus::from(
            config.mssp.clone(),
        ))));
    }
    if enabled.msdp {
        options.push(Box::new(MsdpOption::new()));
    }
    if enabled.gmcp {
        options.push(Box::new(GmcpOption::new()));
    }
    options
}
