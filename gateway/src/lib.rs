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


//! MUD Portal Gateway Library
//!
//! Network layer of a MUD server: telnet and WebSocket listeners, optional TLS,
//! telnet option negotiation, and the registry that hands ready connections to the
//! game layer.

pub mod config;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod listener;
pub mod manager;
pub mod option;
pub mod tls;

// Re-export commonly used types
pub use config::{Arguments, Configuration, TelnetConfig};
pub use connection::{
    Connection, ConnectionCallbacks, ConnectionHandle, ConnectionId, ConnectionState,
    TransportKind,
};
pub use error::{NetworkError, Result};
pub use listener::Listener;
pub use manager::NetworkManager;
pub use option::{OptionHandler, OptionNegotiator, Side};
