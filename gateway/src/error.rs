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


//! Gateway error types

use crate::connection::ConnectionId;
use muportal_common::telnet::CodecError;

/// Errors raised by listeners, the network manager and connection transports.
///
/// Protocol level problems such as malformed telnet sequences or negotiation
/// conflicts are not errors, they are logged and recovered from in place.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown address '{0}'")]
    UnknownAddress(String),

    #[error("Unknown TLS context '{0}'")]
    UnknownTlsContext(String),

    #[error("Listener '{0}' already exists")]
    DuplicateListener(String),

    #[error("Connection ids exhausted")]
    IdsExhausted,

    #[error("Connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    #[error("Transport handshake timed out")]
    TransportTimeout,

    #[error("Pending output of {pending} bytes exceeds the {limit} byte limit")]
    OutputOverflow { pending: usize, limit: usize },
}

impl From<tokio_tungstenite::tungstenite::Error> for NetworkError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        NetworkError::WebSocket(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, NetworkError>;
