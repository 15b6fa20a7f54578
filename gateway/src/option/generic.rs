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


use super::OptionHandler;

/// An option with no behaviour beyond its negotiation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericOption {
    code: u8,
    start_will: bool,
    support_local: bool,
    support_remote: bool,
}

impl GenericOption {
    pub fn new(code: u8) -> Self {
        Self {
            code,
            start_will: false,
            support_local: false,
            support_remote: false,
        }
    }

    /// Offered by the server with WILL at connect.
    pub fn proposed_local(code: u8) -> Self {
        Self {
            start_will: true,
            support_local: true,
            ..Self::new(code)
        }
    }

    /// Accepted if the client offers it, never proposed.
    pub fn accepted_remote(code: u8) -> Self {
        Self {
            support_remote: true,
            ..Self::new(code)
        }
    }

    pub fn set_support_local(&mut self, support: bool) {
        self.support_local = support;
    }

    pub fn set_support_remote(&mut self, support: bool) {
        self.support_remote = support;
    }
}

impl OptionHandler for GenericOption {
    fn code(&self) -> u8 {
        self.code
    }

    fn start_will(&self) -> bool {
        self.start_will
    }

    fn support_local(&self) -> bool {
        self.support_local
    }

    fn support_remote(&self) -> bool {
        self.support_remote
    }
}
