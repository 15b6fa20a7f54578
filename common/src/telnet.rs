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


//! Telnet protocol vocabulary
//!
//! This module defines the telnet commands and options understood by the portal,
//! the [`TelnetMessage`] produced by the [`TelnetCodec`], and helpers for building
//! raw negotiation sequences.

mod codec;
pub mod consts;

pub use codec::{CodecError, DEFAULT_MAX_LENGTH, TelnetCodec};

use bytes::{BufMut, Bytes};

/// Telnet command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TelnetCommand {
    /// Interpret As Command
    IAC = 255,
    /// Don't do option
    DONT = 254,
    /// Do option
    DO = 253,
    /// Won't do option
    WONT = 252,
    /// Will do option
    WILL = 251,
    /// Subnegotiation begin
    SB = 250,
    /// Go ahead
    GA = 249,
    /// Erase line
    EL = 248,
    /// Erase character
    EC = 247,
    /// Are you there
    AYT = 246,
    /// Abort output
    AO = 245,
    /// Interrupt process
    IP = 244,
    /// Break
    BRK = 243,
    /// Data mark
    DM = 242,
    /// No operation
    NOP = 241,
    /// Subnegotiation end
    SE = 240,
    /// End of record
    EOR = 239,
}

impl TelnetCommand {
    /// Convert byte to telnet command
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            consts::IAC => Some(Self::IAC),
            consts::DONT => Some(Self::DONT),
            consts::DO => Some(Self::DO),
            consts::WONT => Some(Self::WONT),
            consts::WILL => Some(Self::WILL),
            consts::SB => Some(Self::SB),
            consts::GA => Some(Self::GA),
            consts::EL => Some(Self::EL),
            consts::EC => Some(Self::EC),
            consts::AYT => Some(Self::AYT),
            consts::AO => Some(Self::AO),
            consts::IP => Some(Self::IP),
            consts::BRK => Some(Self::BRK),
            consts::DM => Some(Self::DM),
            consts::NOP => Some(Self::NOP),
            consts::SE => Some(Self::SE),
            consts::EOR => Some(Self::EOR),
            _ => None,
        }
    }

    /// Convert command to byte
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// True for WILL, WONT, DO and DONT.
    pub fn is_negotiation(self) -> bool {
        matches!(self, Self::WILL | Self::WONT | Self::DO | Self::DONT)
    }
}

/// Telnet option codes known to the portal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TelnetOption {
    /// Echo
    Echo = 1,
    /// Suppress go ahead
    SuppressGoAhead = 3,
    /// Terminal type (MTTS)
    TerminalType = 24,
    /// End of record
    EndOfRecord = 25,
    /// Negotiate about window size (NAWS)
    NAWS = 31,
    /// Linemode
    Linemode = 34,
    /// MUD New-Environ Standard
    MNES = 39,
    /// MSDP (MUD Server Data Protocol)
    MSDP = 69,
    /// MSSP (MUD Server Status Protocol)
    MSSP = 70,
    /// MCCP2 (MUD Client Compression Protocol v2)
    MCCP2 = 86,
    /// MCCP3 (MUD Client Compression Protocol v3)
    MCCP3 = 87,
    /// MXP (MUD eXtension Protocol)
    MXP = 91,
    /// GMCP (Generic MUD Communication Protocol)
    GMCP = 201,
}

impl TelnetOption {
    /// Convert byte to telnet option
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            consts::option::ECHO => Some(Self::Echo),
            consts::option::SGA => Some(Self::SuppressGoAhead),
            consts::option::TTYPE => Some(Self::TerminalType),
            consts::option::TELOPT_EOR => Some(Self::EndOfRecord),
            consts::option::NAWS => Some(Self::NAWS),
            consts::option::LINEMODE => Some(Self::Linemode),
            consts::option::MNES => Some(Self::MNES),
            consts::option::MSDP => Some(Self::MSDP),
            consts::option::MSSP => Some(Self::MSSP),
            consts::option::MCCP2 => Some(Self::MCCP2),
            consts::option::MCCP3 => Some(Self::MCCP3),
            consts::option::MXP => Some(Self::MXP),
            consts::option::GMCP => Some(Self::GMCP),
            _ => None,
        }
    }

    /// Convert option to byte
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for TelnetOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.to_byte())
    }
}

/// A single decoded unit of the telnet stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetMessage {
    /// One line of application data with the line terminator stripped.
    AppData(Bytes),
    /// A bare `IAC <command>` such as NOP or GA.
    Command(u8),
    /// `IAC WILL|WONT|DO|DONT <option>`
    Negotiation(TelnetCommand, u8),
    /// `IAC SB <option> ... IAC SE` with the payload unescaped.
    Subnegotiation(u8, Bytes),
}

/// Build a telnet negotiation sequence
pub fn build_negotiation(command: TelnetCommand, option: u8) -> Vec<u8> {
    vec![TelnetCommand::IAC.to_byte(), command.to_byte(), option]
}

/// Build a telnet subnegotiation sequence
pub fn build_subnegotiation(option: u8, data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len() + 5);
    result.extend_from_slice(&[consts::IAC, consts::SB, option]);
    escape_iac_into(data, &mut result);
    result.extend_from_slice(&[consts::IAC, consts::SE]);
    result
}

/// Append `data` to `out`, doubling every IAC byte.
pub fn escape_iac_into<B: BufMut>(data: &[u8], out: &mut B) {
    for &byte in data {
        out.put_u8(byte);
        if byte == consts::IAC {
            out.put_u8(byte);
        }
    }
}

/// Parse window size from NAWS subnegotiation data
pub fn parse_window_size(data: &[u8]) -> Option<(u16, u16)> {
    if data.len() >= 4 {
        let width = u16::from_be_bytes([data[0], data[1]]);
        let height = u16::from_be_bytes([data[2], data[3]]);
        Some((width, height))
    } else {
        None
    }
}
