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
use muportal_common::MudServerStatus;
use muportal_common::telnet::consts::option;
use tracing::debug;

/// MUD Server Status Protocol
///
/// Crawlers that accept WILL MSSP receive the configured status table once.
#[derive(Debug, Default)]
pub struct MsspOption {
    status: MudServerStatus,
}

impl MsspOption {
    pub fn new(status: MudServerStatus) -> Self {
        Self { status }
    }
}

impl OptionHandler for MsspOption {
    fn code(&self) -> u8 {
        option::MSSP
    }

    fn start_will(&self) -> bool {
        true
    }

    fn support_local(&self) -> bool {
        true
    }

    fn enable_local(&mut self, ctx: &mut OptionContext<'_>) {
        if self.status.is_empty() {
            debug!("No MSSP status configured");
            return;
        }
        ctx.send_subnegotiate(option::MSSP, self.status.encode());
    }
}
