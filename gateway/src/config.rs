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


use crate::connection::TransportKind;
use crate::error::{NetworkError, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_env_field::EnvField;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Arguments {
    #[arg(
        short = 'c',
        long = "config",
        help = "Path to configuration file",
        default_value = "gateway/config.yaml"
    )]
    pub config_file: String,

    #[arg(short = 'e', long = "env", help = "Path to environment file")]
    pub env_file: Option<String>,
}

impl Default for Arguments {
    fn default() -> Self {
        Self {
            config_file: "gateway/config.yaml".to_string(),
            env_file: None,
        }
    }
}

/// Gateway configuration.
///
/// Listeners refer to addresses and TLS contexts by name so several listeners can
/// share one interface or certificate.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub addresses: BTreeMap<String, EnvField<IpAddr>>,

    #[serde(default)]
    pub tls: BTreeMap<String, TlsConfig>,

    #[serde(default)]
    pub listeners: BTreeMap<String, ListenerConfig>,

    #[serde(default)]
    pub telnet: TelnetConfig,
}

impl Configuration {
    pub fn load(path: &str) -> Result<Self> {
        tracing::debug!("Loading configuration from file: {}", path);
        let file = std::fs::File::open(path)
            .map_err(|e| NetworkError::Config(format!("Failed to open config file: {}", e)))?;

        let conf = serde_yaml::from_reader(file)
            .map_err(|e| NetworkError::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(conf)
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| NetworkError::Config(format!("Failed to parse configuration: {}", e)))
    }
}

/// A certificate chain and private key in PEM format.
#[derive(Debug, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert: EnvField<String>,

    /// Defaults to `cert` for combined PEM files
    #[serde(default)]
    pub key: Option<EnvField<String>>,
}

impl TlsConfig {
    pub fn cert_path(&self) -> &str {
        self.cert.as_str()
    }

    pub fn key_path(&self) -> &str {
        self.key
            .as_ref()
            .map(|key| key.as_str())
            .unwrap_or_else(|| self.cert.as_str())
    }
}

/// One bound port.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Name of an entry in [`Configuration::addresses`]
    pub address: String,

    pub port: EnvField<u16>,

    #[serde(default)]
    pub kind: TransportKind,

    /// Name of an entry in [`Configuration::tls`]
    #[serde(default)]
    pub tls: Option<String>,
}

/// Telnet negotiation settings shared by every telnet connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelnetConfig {
    /// Forced-ready deadline for option negotiation, in milliseconds
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,

    /// Deadline for the TLS handshake and WebSocket upgrade, in milliseconds
    #[serde(default = "default_transport_timeout")]
    pub transport_timeout_ms: u64,

    /// Longest input line or subnegotiation accepted from a client
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,

    /// Pending output a connection may hold before it is closed as stalled, in bytes
    #[serde(default = "default_max_output")]
    pub max_output: usize,

    #[serde(default)]
    pub options: TelnetOptions,

    /// MSSP status table sent to crawlers
    #[serde(default)]
    pub mssp: BTreeMap<String, Vec<String>>,
}

fn default_handshake_timeout() -> u64 {
    2000
}

fn default_transport_timeout() -> u64 {
    10_000
}

fn default_max_line_length() -> usize {
    muportal_common::telnet::DEFAULT_MAX_LENGTH
}

fn default_max_output() -> usize {
    1024 * 1024
}

fn enabled() -> bool {
    true
}

impl TelnetConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.transport_timeout_ms)
    }
}

impl Default for TelnetConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: default_handshake_timeout(),
            transport_timeout_ms: default_transport_timeout(),
            max_line_length: default_max_line_length(),
            max_output: default_max_output(),
            options: TelnetOptions::default(),
            mssp: BTreeMap::new(),
        }
    }
}

/// Which telnet options the server registers a negotiator for.
///
/// A disabled option is refused like any other unknown code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelnetOptions {
    #[serde(default = "enabled")]
    pub sga: bool,
    #[serde(default = "enabled")]
    pub eor: bool,
    #[serde(default = "enabled")]
    pub naws: bool,
    #[serde(default = "enabled")]
    pub ttype: bool,
    #[serde(default = "enabled")]
    pub linemode: bool,
    #[serde(default = "enabled")]
    pub mnes: bool,
    #[serde(default = "enabled")]
    pub mxp: bool,
    #[serde(default = "enabled")]
    pub mssp: bool,
    #[serde(default = "enabled")]
    pub msdp: bool,
    #[serde(default = "enabled")]
    pub gmcp: bool,
}

impl TelnetOptions {
    /// No options at all; every proposal from the client is refused.
    pub fn none() -> Self {
        Self {
            sga: false,
            eor: false,
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

impl Default for TelnetOptions {
    fn default() -> Self {
        Self {
            sga: true,
            eor: true,
            naws: true,
            ttype: true,
            linemode: true,
            mnes: true,
            mxp: true,
            mssp: true,
            msdp: true,
            gmcp: true,
        }
    }
}
