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
use muportal_common::telnet::consts::option;
use muportal_common::telnet::parse_window_size;
use tracing::{debug, warn};

/// Negotiate About Window Size
///
/// The client reports its terminal size after accepting DO NAWS and again whenever
/// the window is resized.
#[derive(Debug, Default)]
pub struct NawsOption;

impl NawsOption {
    pub fn new() -> Self {
        Self
    }
}

impl OptionHandler for NawsOption {
    fn code(&self) -> u8 {
        option::NAWS
    }

    fn start_do(&self) -> bool {
        true
    }

    fn support_remote(&self) -> bool {
        true
    }

    fn subnegotiate(&mut self, payload: &[u8], ctx: &mut OptionContext<'_>) {
        let Some((width, height)) = parse_window_size(payload) else {
            warn!(length = payload.len(), "Short NAWS subnegotiation");
            return;
        };
        debug!(width, height, "Client window size");
        let capabilities = ctx.capabilities();
        if width > 0 {
            capabilities.width = width;
        }
        if height > 0 {
            capabilities.height = height;
        }
        ctx.capabilities_changed();
    }
}
