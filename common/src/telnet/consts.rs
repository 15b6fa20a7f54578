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


//! Raw Telnet byte values.

/// Interpret As Command
pub const IAC: u8 = 255;
/// Don't do option
pub const DONT: u8 = 254;
/// Do option
pub const DO: u8 = 253;
/// Won't do option
pub const WONT: u8 = 252;
/// Will do option
pub const WILL: u8 = 251;
/// Subnegotiation begin
pub const SB: u8 = 250;
/// Go ahead
pub const GA: u8 = 249;
/// Erase line
pub const EL: u8 = 248;
/// Erase character
pub const EC: u8 = 247;
/// Are you there
pub const AYT: u8 = 246;
/// Abort output
pub const AO: u8 = 245;
/// Interrupt process
pub const IP: u8 = 244;
/// Break
pub const BRK: u8 = 243;
/// Data mark
pub const DM: u8 = 242;
/// No operation
pub const NOP: u8 = 241;
/// Subnegotiation end
pub const SE: u8 = 240;
/// End of record
pub const EOR: u8 = 239;

pub const CR: u8 = b'\r';
pub const LF: u8 = b'\n';
pub const NUL: u8 = 0;

/// Option codes
pub mod option {
    pub const ECHO: u8 = 1;
    pub const SGA: u8 = 3;
    pub const TTYPE: u8 = 24;
    pub const TELOPT_EOR: u8 = 25;
    pub const NAWS: u8 = 31;
    pub const LINEMODE: u8 = 34;
    pub const MNES: u8 = 39;
    pub const MSDP: u8 = 69;
    pub const MSSP: u8 = 70;
    pub const MCCP2: u8 = 86;
    pub const MCCP3: u8 = 87;
    pub const MXP: u8 = 91;
    pub const GMCP: u8 = 201;
}

/// Terminal type subnegotiation verbs
pub mod ttype {
    pub const IS: u8 = 0;
    pub const SEND: u8 = 1;
}

/// MSSP table markers
pub mod mssp {
    pub const VAR: u8 = 1;
    pub const VAL: u8 = 2;
}

/// MSDP table markers
pub mod msdp {
    pub const VAR: u8 = 1;
    pub const VAL: u8 = 2;
    pub const TABLE_OPEN: u8 = 3;
    pub const TABLE_CLOSE: u8 = 4;
    pub const ARRAY_OPEN: u8 = 5;
    pub const ARRAY_CLOSE: u8 = 6;
}
