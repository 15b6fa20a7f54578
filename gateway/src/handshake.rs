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


//! Handshake tracking
//!
//! A connection keeps three [`HandshakeTracker`]s: options it proposed itself, options it
//! asked the client to enable, and one-shot exchanges such as the terminal type cycle.
//! The connection is ready for play once all three are empty.

use std::collections::BTreeSet;

/// The set of option codes whose negotiation is still outstanding.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HandshakeTracker {
    pending: BTreeSet<u8>,
}

impl HandshakeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `code` as outstanding. Registering twice has no further effect.
    pub fn register(&mut self, code: u8) {
        self.pending.insert(code);
    }

    /// Marks `code` as resolved. Resolving an unknown code has no effect.
    pub fn resolve(&mut self, code: u8) -> bool {
        self.pending.remove(&code)
    }

    pub fn contains(&self, code: u8) -> bool {
        self.pending.contains(&code)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.pending.iter().copied()
    }
}

/// The local, remote and special trackers owned by one connection.
#[derive(Debug, Default, Clone)]
pub struct Handshakes {
    pub local: HandshakeTracker,
    pub remote: HandshakeTracker,
    pub special: HandshakeTracker,
}

impl Handshakes {
    pub fn is_complete(&self) -> bool {
        self.local.is_empty() && self.remote.is_empty() && self.special.is_empty()
    }

    pub fn clear(&mut self) {
        self.local.clear();
        self.remote.clear();
        self.special.clear();
    }

    /// Every outstanding code, local first, then remote, then special.
    pub fn pending(&self) -> Vec<u8> {
        self.local
            .iter()
            .chain(self.remote.iter())
            .chain(self.special.iter())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let mut tracker = HandshakeTracker::new();
        tracker.register(31);
        tracker.register(31);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.resolve(31));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut tracker = HandshakeTracker::new();
        tracker.register(24);
        assert!(tracker.resolve(24));
        assert!(!tracker.resolve(24));
        assert!(!tracker.resolve(91));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_complete_regardless_of_order() {
        let orders: [[usize; 3]; 3] = [[0, 1, 2], [2, 1, 0], [1, 2, 0]];
        for order in orders {
            let mut handshakes = Handshakes::default();
            handshakes.local.register(91);
            handshakes.remote.register(31);
            handshakes.special.register(24);
            let mut completions = 0;
            for index in order {
                match index {
                    0 => handshakes.local.resolve(91),
                    1 => handshakes.remote.resolve(31),
                    _ => handshakes.special.resolve(24),
                };
                if handshakes.is_complete() {
                    completions += 1;
                }
            }
            assert_eq!(completions, 1, "order {:?}", order);
        }
    }

    #[test]
    fn test_pending_lists_every_tracker() {
        let mut handshakes = Handshakes::default();
        assert!(handshakes.pending().is_empty());
        handshakes.special.register(24);
        handshakes.remote.register(31);
        handshakes.local.register(201);
        handshakes.local.register(3);
        assert_eq!(handshakes.pending(), vec![3, 201, 31, 24]);

        handshakes.remote.resolve(31);
        assert_eq!(handshakes.pending(), vec![3, 201, 24]);
        handshakes.clear();
        assert!(handshakes.pending().is_empty());
    }
}
