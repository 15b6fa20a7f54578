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


//! Client terminal capabilities discovered during negotiation.

use crate::telnet::consts::option;
use serde::{Deserialize, Serialize};

/// MTTS capability bits reported in the third terminal type round.
pub mod mtts {
    pub const ANSI: u32 = 1;
    pub const VT100: u32 = 2;
    pub const UTF8: u32 = 4;
    pub const COLORS_256: u32 = 8;
    pub const MOUSE_TRACKING: u32 = 16;
    pub const OSC_COLOR_PALETTE: u32 = 32;
    pub const SCREEN_READER: u32 = 64;
    pub const PROXY: u32 = 128;
    pub const TRUECOLOR: u32 = 256;
    pub const MNES: u32 = 512;
    pub const MSLP: u32 = 1024;
    pub const SSL: u32 = 2048;
}

/// What is known about the client on the other end of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCapabilities {
    pub client_name: Option<String>,
    pub client_version: Option<String>,
    pub terminal_type: Option<String>,
    pub width: u16,
    pub height: u16,
    pub ansi: bool,
    pub vt100: bool,
    pub xterm256: bool,
    pub truecolor: bool,
    pub utf8: bool,
    pub screen_reader: bool,
    pub mouse: bool,
    pub osc_color: bool,
    pub proxy: bool,
    pub tls: bool,

    // Negotiated telnet options
    pub sga: bool,
    pub eor: bool,
    pub echo: bool,
    pub naws: bool,
    pub ttype: bool,
    pub linemode: bool,
    pub mnes: bool,
    pub mxp: bool,
    pub mssp: bool,
    pub msdp: bool,
    pub gmcp: bool,
}

impl Default for ClientCapabilities {
    fn default() -> Self {
        Self {
            client_name: None,
            client_version: None,
            terminal_type: None,
            width: 78,
            height: 24,
            ansi: false,
            vt100: false,
            xterm256: false,
            truecolor: false,
            utf8: false,
            screen_reader: false,
            mouse: false,
            osc_color: false,
            proxy: false,
            tls: false,
            sga: false,
            eor: false,
            echo: false,
            naws: false,
            ttype: false,
            linemode: false,
            mnes: false,
            mxp: false,
            mssp: false,
            msdp: false,
            gmcp: false,
        }
    }
}

impl ClientCapabilities {
    /// Capabilities of a browser client, which renders UTF-8 and full color.
    pub fn websocket(tls: bool) -> Self {
        Self {
            client_name: Some("WEBSOCKET".to_string()),
            ansi: true,
            xterm256: true,
            truecolor: true,
            utf8: true,
            tls,
            ..Self::default()
        }
    }

    /// Records the negotiated state of a telnet option. Unknown codes are ignored.
    pub fn set_option(&mut self, code: u8, enabled: bool) {
        let flag = match code {
            option::ECHO => &mut self.echo,
            option::SGA => &mut self.sga,
            option::TELOPT_EOR => &mut self.eor,
            option::NAWS => &mut self.naws,
            option::TTYPE => &mut self.ttype,
            option::LINEMODE => &mut self.linemode,
            option::MNES => &mut self.mnes,
            option::MXP => &mut self.mxp,
            option::MSSP => &mut self.mssp,
            option::MSDP => &mut self.msdp,
            option::GMCP => &mut self.gmcp,
            _ => return,
        };
        *flag = enabled;
    }

    /// Applies the bit field from an `MTTS <n>` terminal type reply.
    pub fn apply_mtts(&mut self, bits: u32) {
        self.ansi |= bits & mtts::ANSI != 0;
        self.vt100 |= bits & mtts::VT100 != 0;
        self.utf8 |= bits & mtts::UTF8 != 0;
        self.xterm256 |= bits & mtts::COLORS_256 != 0;
        self.mouse |= bits & mtts::MOUSE_TRACKING != 0;
        self.osc_color |= bits & mtts::OSC_COLOR_PALETTE != 0;
        self.screen_reader |= bits & mtts::SCREEN_READER != 0;
        self.proxy |= bits & mtts::PROXY != 0;
        self.truecolor |= bits & mtts::TRUECOLOR != 0;
        self.mnes |= bits & mtts::MNES != 0;
        self.tls |= bits & mtts::SSL != 0;
    }

    /// Infers color support from a terminal type name such as `XTERM-256COLOR`.
    pub fn apply_terminal_type(&mut self, name: &str) {
        let upper = name.to_ascii_uppercase();
        if upper.contains("256COLOR") {
            self.ansi = true;
            self.xterm256 = true;
        } else if upper.starts_with("XTERM") || upper.starts_with("ANSI") {
            self.ansi = true;
        }
        if upper.contains("TRUECOLOR") {
            self.truecolor = true;
        }
        if upper.starts_with("VT100") {
            self.vt100 = true;
        }
        self.terminal_type = Some(name.to_string());
    }
}
