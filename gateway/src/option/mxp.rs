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
use muportal_common::telnet::consts::option;

/// MUD eXtension Protocol
///
/// After the client agrees to MXP the server sends an empty subnegotiation to switch
/// the client into MXP mode.
#[derive(Debug, Default)]
pub struct MxpOption;

impl MxpOption {
    pub fn new() -> Self {
        Self
    }
}

impl OptionHandler for MxpOption {
    fn code(&self) -> u8 {
        option::MXP
    }

    fn start_will(&self) -> bool {
        true
    }

    fn support_local(&self) -> bool {
        true
    }

    fn enable_local(&mut self, ctx: &mut OptionContext<'_>) {
        ctx.send_subnegotiate(option::MXP, Bytes::new());
    }
}
