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


use super::{OptionContext, OptionHandler};
use bytes::Bytes;
use muportal_common::telnet::consts::{option, ttype};
use tracing::debug;

/// Terminal Type with the MTTS cycle
///
/// Once the client agrees to TTYPE the server asks for the terminal type up to three
/// times. MTTS clients answer with their client name, then their terminal type, then
/// `MTTS <bits>`; older clients repeat a single answer. The cycle is a special
/// handshake, so the connection is not ready until it ends.
#[derive(Debug, Default)]
pub struct TerminalTypeOption {
    round: u8,
    last: Option<String>,
    done: bool,
}

impl TerminalTypeOption {
    pub fn new() -> Self {
        Self::default()
    }

    fn request(&self, ctx: &mut OptionContext<'_>) {
        ctx.send_subnegotiate(option::TTYPE, Bytes::from_static(&[ttype::SEND]));
    }

    fn finish(&mut self, ctx: &mut OptionContext<'_>) {
        if !self.done {
            self.done = true;
            ctx.handshakes().special.resolve(option::TTYPE);
            ctx.capabilities_changed();
        }
    }
}

impl OptionHandler for TerminalTypeOption {
    fn code(&self) -> u8 {
        option::TTYPE
    }

    fn start_do(&self) -> bool {
        true
    }

    fn support_remote(&self) -> bool {
        true
    }

    fn enable_remote(&mut self, ctx: &mut OptionContext<'_>) {
        self.round = 0;
        self.last = None;
        self.done = false;
        ctx.handshakes().special.register(option::TTYPE);
        self.request(ctx);
    }

    fn disable_remote(&mut self, ctx: &mut OptionContext<'_>) {
        self.finish(ctx);
    }

    fn subnegotiate(&mut self, payload: &[u8], ctx: &mut OptionContext<'_>) {
        let Some((&ttype::IS, name)) = payload.split_first() else {
            debug!("Terminal type subnegotiation without IS");
            return;
        };
        if self.done {
            debug!("Terminal type received after the cycle ended");
            return;
        }
        let name = String::from_utf8_lossy(name).trim().to_string();
        if name.is_empty() || self.last.as_deref() == Some(name.as_str()) {
            self.finish(ctx);
            return;
        }
        debug!(round = self.round, terminal = %name, "Terminal type");

        let capabilities = ctx.capabilities();
        if let Some(bits) = name
            .strip_prefix("MTTS ")
            .and_then(|bits| bits.trim().parse::<u32>().ok())
        {
            capabilities.apply_mtts(bits);
            self.last = Some(name);
            self.finish(ctx);
            return;
        }
        if self.round == 0 {
            let (client, version) = match name.split_once(' ') {
                Some((client, version)) => (client, Some(version.to_string())),
                None => (name.as_str(), None),
            };
            capabilities.client_name = Some(client.to_string());
            capabilities.client_version = version;
        }
        capabilities.apply_terminal_type(&name);

        self.round += 1;
        self.last = Some(name);
        if self.round >= 3 {
            self.finish(ctx);
        } else {
            self.request(ctx);
        }
    }
}
