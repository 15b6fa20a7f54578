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
use crate::connection::ProtocolEvent;
use bytes::Bytes;
use muportal_common::StructuredData;
use muportal_common::telnet::consts::option;
use tracing::warn;

/// MUD Server Data Protocol
///
/// Payloads are queued for the game layer as raw MSDP tables.
#[derive(Debug, Default)]
pub struct MsdpOption;

impl MsdpOption {
    pub fn new() -> Self {
        Self
    }
}

impl OptionHandler for MsdpOption {
    fn code(&self) -> u8 {
        option::MSDP
    }

    fn start_will(&self) -> bool {
        true
    }

    fn support_local(&self) -> bool {
        true
    }

    fn subnegotiate(&mut self, payload: &[u8], ctx: &mut OptionContext<'_>) {
        ctx.emit(ProtocolEvent::StructuredData(StructuredData::Msdp(
            Bytes::copy_from_slice(payload),
        )));
    }
}

/// Generic MUD Communication Protocol
#[derive(Debug, Default)]
pub struct GmcpOption;

impl GmcpOption {
    pub fn new() -> Self {
        Self
    }
}

impl OptionHandler for GmcpOption {
    fn code(&self) -> u8 {
        option::GMCP
    }

    fn start_will(&self) -> bool {
        true
    }

    fn support_local(&self) -> bool {
        true
    }

    fn subnegotiate(&mut self, payload: &[u8], ctx: &mut OptionContext<'_>) {
        match StructuredData::parse_gmcp(payload) {
            Some(message) => ctx.emit(ProtocolEvent::StructuredData(message)),
            None => warn!(
                payload = %String::from_utf8_lossy(payload),
                "Unable to parse GMCP message"
            ),
        }
    }
}
